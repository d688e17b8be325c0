//! # pkv
//!
//! Command-line front end for the pipelined client.
//!
//! ```text
//! pkv [--config FILE] [--addr HOST:PORT] get KEY
//! pkv [--config FILE] [--addr HOST:PORT] set KEY VALUE [TTL_SECS]
//! pkv [--config FILE] [--addr HOST:PORT] delete KEY
//! pkv [--config FILE] [--addr HOST:PORT] version
//! pkv [--config FILE] [--addr HOST:PORT] stats
//! ```
//!
//! Logging is controlled with `RUST_LOG` (default `info`).

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pkv_client::{ClientConfig, KVClient};

const USAGE: &str = "usage: pkv [--config FILE] [--addr HOST:PORT] <get KEY | set KEY VALUE [TTL_SECS] | delete KEY | version | stats>";

struct Args {
    config_path: Option<String>,
    addr: Option<String>,
    command: Vec<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config_path: None,
        addr: None,
        command: Vec::new(),
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config_path = Some(iter.next().context("--config needs a path")?),
            "--addr" => args.addr = Some(iter.next().context("--addr needs HOST:PORT")?),
            "-h" | "--help" => bail!(USAGE),
            _ => args.command.push(arg),
        }
    }
    if args.command.is_empty() {
        bail!(USAGE);
    }
    Ok(args)
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config_path {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            ClientConfig::from_json(&text).with_context(|| format!("parsing {path}"))?
        }
        None => ClientConfig::default(),
    };
    if let Some(addr) = &args.addr {
        config.set_addr(addr)?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let config = load_config(&args)?;
    debug!(?config, "loaded configuration");

    let connect_wait = config.connect_timeout() + config.reconnect_interval();
    let client = KVClient::with_config(config)?;
    client
        .wait_connected(connect_wait)
        .await
        .context("server unreachable")?;

    let words: Vec<&str> = args.command.iter().map(String::as_str).collect();
    match words.as_slice() {
        ["get", key] => match client.get(key.as_bytes()).await? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => bail!("not found: {key}"),
        },
        ["set", key, value] => {
            client.set(key.as_bytes(), value.as_bytes()).await?;
            println!("STORED");
        }
        ["set", key, value, ttl] => {
            let ttl: u64 = ttl.parse().with_context(|| format!("invalid ttl {ttl}"))?;
            client
                .set_with_ttl(key.as_bytes(), value.as_bytes(), Duration::from_secs(ttl))
                .await?;
            println!("STORED");
        }
        ["delete", key] => {
            let removed = client.delete(key.as_bytes()).await?;
            println!("{}", if removed { "DELETED" } else { "NOT_FOUND" });
        }
        ["version"] => println!("{}", client.version().await?),
        ["stats"] => {
            client.noop().await?;
            println!("{:#?}", client.stats());
        }
        _ => bail!(USAGE),
    }
    Ok(())
}
