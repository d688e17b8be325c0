use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use pkv_client::{ClientConfig, ClientError, KVClient, Opcode, Response, Status};
use pkv_common::{RequestHeader, HEADER_LEN};

/// A request as seen by the fake server.
struct Request {
    header: RequestHeader,
    extras: Vec<u8>,
    key: Vec<u8>,
    value: Vec<u8>,
}

impl Request {
    fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u8(self.header.opcode)
    }
}

/// Accepts `connections` clients in turn, running `handler(index, stream)` for each.
fn spawn_server<F>(connections: usize, handler: F) -> String
where
    F: Fn(usize, TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();

    thread::spawn(move || {
        for idx in 0..connections {
            let (stream, _) = listener.accept().expect("accept");
            let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
            handler(idx, stream);
        }
    });

    addr
}

fn read_request(stream: &mut TcpStream) -> std::io::Result<Request> {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header)?;
    let header = RequestHeader::decode(&header)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "bad request magic"))?;

    let mut body = vec![0u8; header.total_body_len as usize];
    stream.read_exact(&mut body)?;
    let value = body.split_off(header.extras_len as usize + header.key_len as usize);
    let key = body.split_off(header.extras_len as usize);
    Ok(Request {
        header,
        extras: body,
        key,
        value,
    })
}

fn response(request: &Request, status: Status, value: &[u8]) -> Vec<u8> {
    let opcode = request.opcode().expect("known opcode");
    let extras = if opcode == Opcode::Get && status.is_success() {
        Bytes::from_static(&[0, 0, 0, 0])
    } else {
        Bytes::new()
    };
    let mut buf = BytesMut::new();
    Response::new(
        opcode,
        status,
        request.header.opaque,
        extras,
        Bytes::new(),
        Bytes::copy_from_slice(value),
    )
    .put(&mut buf);
    buf.to_vec()
}

fn write_all(stream: &mut TcpStream, data: &[u8]) {
    let _ = stream.write_all(data);
    let _ = stream.flush();
}

fn config_for(addr: &str) -> ClientConfig {
    let mut config = ClientConfig {
        call_timeout_ms: 2_000,
        reconnect_interval_ms: 50,
        connect_timeout_ms: 500,
        write_timeout_ms: 500,
        ..ClientConfig::default()
    };
    config.set_addr(addr).expect("addr");
    config
}

async fn connected_client(addr: &str) -> KVClient {
    let client = KVClient::with_config(config_for(addr)).expect("client");
    client
        .wait_connected(Duration::from_secs(2))
        .await
        .expect("connected");
    client
}

#[tokio::test]
async fn set_then_get_roundtrip() {
    let addr = spawn_server(1, |_, mut stream| {
        let set = read_request(&mut stream).expect("set");
        assert_eq!(set.opcode(), Some(Opcode::Set));
        assert_eq!(set.key, b"a");
        assert_eq!(set.value, b"1");
        assert_eq!(&set.extras[4..], &60u32.to_be_bytes());
        write_all(&mut stream, &response(&set, Status::NoError, b""));

        let get = read_request(&mut stream).expect("get");
        assert_eq!(get.opcode(), Some(Opcode::Get));
        assert_eq!(get.key, b"a");
        write_all(&mut stream, &response(&get, Status::NoError, b"1"));
    });

    let client = connected_client(&addr).await;
    client
        .set_with_ttl(b"a", b"1", Duration::from_secs(60))
        .await
        .expect("set");
    let value = client.get(b"a").await.expect("get");
    assert_eq!(value.as_deref(), Some(&b"1"[..]));

    let stats = client.stats();
    assert_eq!(stats.requests_total, 2);
    assert_eq!(stats.errors_total, 0);
    assert_eq!(stats.inflight, 0);
    assert_eq!(stats.connects_total, 1);
}

#[tokio::test]
async fn get_missing_key_is_none() {
    let addr = spawn_server(1, |_, mut stream| {
        let get = read_request(&mut stream).expect("get");
        write_all(&mut stream, &response(&get, Status::KeyNotFound, b"Not found"));
    });

    let client = connected_client(&addr).await;
    let value = client.get(b"missing").await.expect("miss is not an error");
    assert_eq!(value, None);
}

#[tokio::test]
async fn pipelined_responses_in_one_chunk_keep_order() {
    let addr = spawn_server(1, |_, mut stream| {
        let first = read_request(&mut stream).expect("first");
        let second = read_request(&mut stream).expect("second");
        assert_ne!(first.header.opaque, second.header.opaque);

        let mut batch = Vec::new();
        for request in [&first, &second] {
            let mut value = b"value-".to_vec();
            value.extend_from_slice(&request.key);
            batch.extend(response(request, Status::NoError, &value));
        }
        write_all(&mut stream, &batch);
    });

    let client = connected_client(&addr).await;
    let (a, b) = tokio::join!(client.get(b"a"), client.get(b"b"));
    assert_eq!(a.expect("a").as_deref(), Some(&b"value-a"[..]));
    assert_eq!(b.expect("b").as_deref(), Some(&b"value-b"[..]));
}

#[tokio::test]
async fn fragmented_response_is_reassembled() {
    let addr = spawn_server(1, |_, mut stream| {
        let get = read_request(&mut stream).expect("get");
        let _ = stream.set_nodelay(true);
        for byte in response(&get, Status::NoError, b"slowly") {
            write_all(&mut stream, &[byte]);
            thread::sleep(Duration::from_millis(1));
        }
    });

    let client = connected_client(&addr).await;
    let value = client.get(b"k").await.expect("get");
    assert_eq!(value.as_deref(), Some(&b"slowly"[..]));
}

#[tokio::test]
async fn close_after_send_fails_with_connection_closed() {
    let addr = spawn_server(1, |_, mut stream| {
        let _ = read_request(&mut stream).expect("get");
        drop(stream);
    });

    let client = connected_client(&addr).await;
    let err = client.get(b"k").await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed), "got {err:?}");
}

#[tokio::test]
async fn reconnects_after_connection_loss() {
    let addr = spawn_server(2, |idx, mut stream| {
        let request = read_request(&mut stream).expect("request");
        if idx == 0 {
            drop(stream);
            return;
        }
        write_all(&mut stream, &response(&request, Status::NoError, b"back"));
        // Stay connected so the second socket is not counted as a loss.
        let mut sink = [0u8; 1];
        let _ = stream.read(&mut sink);
    });

    let client = connected_client(&addr).await;
    assert!(matches!(
        client.get(b"k").await,
        Err(ClientError::ConnectionClosed)
    ));

    client
        .wait_connected(Duration::from_secs(2))
        .await
        .expect("reconnected");
    let value = client.get(b"k").await.expect("get after reconnect");
    assert_eq!(value.as_deref(), Some(&b"back"[..]));

    let stats = client.stats();
    assert_eq!(stats.connects_total, 2);
    assert_eq!(stats.connection_losses_total, 1);
}

#[tokio::test]
async fn unreachable_server_fails_fast_with_no_connection() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").to_string()
    };

    let client = KVClient::with_config(config_for(&addr)).expect("client");
    let err = client.get(b"k").await.unwrap_err();
    assert!(matches!(err, ClientError::NoConnection), "got {err:?}");
    assert!(!client.is_connected());
}

#[tokio::test]
async fn caller_timeout_leaves_session_usable() {
    let addr = spawn_server(1, |_, mut stream| {
        let slow = read_request(&mut stream).expect("slow");
        let fast = read_request(&mut stream).expect("fast");
        // Answer both, late, in order.
        thread::sleep(Duration::from_millis(300));
        let mut batch = response(&slow, Status::NoError, b"late");
        batch.extend(response(&fast, Status::NoError, b"ok"));
        write_all(&mut stream, &batch);
    });

    let client = connected_client(&addr).await;
    let err = client
        .get_with_timeout(b"slow", Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout(_)));

    let value = client.get(b"fast").await.expect("fast");
    assert_eq!(value.as_deref(), Some(&b"ok"[..]));
}

#[tokio::test]
async fn corrupt_response_drops_connection() {
    let addr = spawn_server(2, |idx, mut stream| {
        let request = read_request(&mut stream).expect("request");
        if idx == 0 {
            let mut bad = response(&request, Status::NoError, b"x");
            bad[12..16].copy_from_slice(&(request.header.opaque ^ 0xffff).to_be_bytes());
            write_all(&mut stream, &bad);
            // Hold the socket open; the client must hang up on its own.
            let mut sink = [0u8; 1];
            let _ = stream.read(&mut sink);
            return;
        }
        write_all(&mut stream, &response(&request, Status::NoError, b"fresh"));
    });

    let client = connected_client(&addr).await;
    let err = client.get(b"k").await.unwrap_err();
    assert!(matches!(err, ClientError::Decode(_)), "got {err:?}");

    client
        .wait_connected(Duration::from_secs(2))
        .await
        .expect("reconnected");
    let value = client.get(b"k").await.expect("get after reconnect");
    assert_eq!(value.as_deref(), Some(&b"fresh"[..]));
}

#[tokio::test]
async fn delete_version_and_noop() {
    let addr = spawn_server(1, |_, mut stream| {
        let delete = read_request(&mut stream).expect("delete");
        assert_eq!(delete.opcode(), Some(Opcode::Delete));
        write_all(&mut stream, &response(&delete, Status::KeyNotFound, b"Not found"));

        let version = read_request(&mut stream).expect("version");
        assert_eq!(version.opcode(), Some(Opcode::Version));
        write_all(&mut stream, &response(&version, Status::NoError, b"1.6.21"));

        let noop = read_request(&mut stream).expect("noop");
        assert_eq!(noop.opcode(), Some(Opcode::Noop));
        write_all(&mut stream, &response(&noop, Status::NoError, b""));
    });

    let client = connected_client(&addr).await;
    assert!(!client.delete(b"gone").await.expect("delete"));
    assert_eq!(client.version().await.expect("version"), "1.6.21");
    client.noop().await.expect("noop");
}

#[tokio::test]
async fn server_error_status_is_reported() {
    let addr = spawn_server(1, |_, mut stream| {
        let set = read_request(&mut stream).expect("set");
        write_all(&mut stream, &response(&set, Status::ValueTooLarge, b"Too large."));
    });

    let client = connected_client(&addr).await;
    match client.set(b"big", b"value").await {
        Err(ClientError::Server { status, message }) => {
            assert_eq!(status, Status::ValueTooLarge);
            assert_eq!(&message[..], b"Too large.");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn invalid_key_is_rejected_without_touching_connection() {
    let addr = spawn_server(1, |_, mut stream| {
        let get = read_request(&mut stream).expect("get");
        assert_eq!(get.key, b"ok");
        write_all(&mut stream, &response(&get, Status::NoError, b"v"));
    });

    let client = connected_client(&addr).await;
    let err = client.get(b"").await.unwrap_err();
    assert!(matches!(err, ClientError::Encode(_)), "got {err:?}");
    assert_eq!(client.get(b"ok").await.expect("get").as_deref(), Some(&b"v"[..]));
}

#[tokio::test]
async fn stalled_write_fails_sender_and_pending_callers() {
    let addr = spawn_server(2, |idx, mut stream| {
        if idx == 0 {
            // Take the get, then stop reading so the big set backs up.
            let _ = read_request(&mut stream).expect("get");
            thread::sleep(Duration::from_secs(1));
            return;
        }
        let noop = read_request(&mut stream).expect("noop");
        write_all(&mut stream, &response(&noop, Status::NoError, b""));
        let mut sink = [0u8; 1];
        let _ = stream.read(&mut sink);
    });

    let mut config = config_for(&addr);
    config.write_timeout_ms = 200;
    config.call_timeout_ms = 5_000;
    let client = KVClient::with_config(config).expect("client");
    client
        .wait_connected(Duration::from_secs(2))
        .await
        .expect("connected");

    let parked = tokio::spawn({
        let client = client.clone();
        async move { client.get(b"parked").await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let big = vec![0u8; 60 * 1024 * 1024];
    let err = client.set(b"big", &big).await.unwrap_err();
    assert!(matches!(err, ClientError::WriteFailed(_)), "got {err:?}");

    let parked = parked.await.expect("join");
    assert!(matches!(parked, Err(ClientError::ConnectionClosed)), "got {parked:?}");

    client
        .wait_connected(Duration::from_secs(2))
        .await
        .expect("reconnected");
    client.noop().await.expect("noop after reconnect");
    assert_eq!(client.stats().connection_losses_total, 1);
}
