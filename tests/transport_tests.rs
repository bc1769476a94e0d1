use serde_json::{Value, json};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tplink_smarthome::protocol::{encode, read_frame};
use tplink_smarthome::{SmartDevice, SmartHomeError, SmartPlug, TcpTransport, Transport};

const LOCALHOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Accept one connection, answer with `reply(request)` and close.
async fn fake_device<F>(reply: F) -> (u16, tokio::task::JoinHandle<Value>)
where
    F: FnOnce(&Value) -> Vec<u8> + Send + 'static,
{
    let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let plain = read_frame(&mut stream).await.unwrap();
        let request: Value = serde_json::from_slice(&plain).unwrap();
        stream.write_all(&reply(&request)).await.unwrap();
        stream.shutdown().await.unwrap();
        request
    });
    (port, handle)
}

fn framed(v: Value) -> Vec<u8> {
    encode(v.to_string().as_bytes()).unwrap()
}

#[tokio::test]
async fn test_exchange_round_trip() {
    let (port, server) = fake_device(|_| {
        framed(json!({"system": {"get_sysinfo": {"err_code": 0, "alias": "Desk", "relay_state": 1}}}))
    })
    .await;

    let transport = TcpTransport::new().with_port(port);
    let request = json!({"system": {"get_sysinfo": {}}});
    let response = transport.exchange(LOCALHOST, &request).await.unwrap();

    assert_eq!(response["system"]["get_sysinfo"]["alias"], json!("Desk"));
    assert_eq!(server.await.unwrap(), request);
}

#[tokio::test]
async fn test_plug_over_tcp() {
    let (port, server) = fake_device(|req| {
        assert!(req["system"].get("set_relay_state").is_some());
        framed(json!({"system": {"set_relay_state": {"err_code": 0}}}))
    })
    .await;

    let transport = Arc::new(TcpTransport::new().with_port(port));
    let plug = SmartPlug::with_transport("127.0.0.1", transport).unwrap();
    plug.turn_on().await.unwrap();

    let seen = server.await.unwrap();
    assert_eq!(seen, json!({"system": {"set_relay_state": {"state": 1}}}));
}

#[tokio::test]
async fn test_device_error_over_tcp() {
    let (port, _server) = fake_device(|_| {
        framed(json!({"system": {"set_dev_alias": {"err_code": -2, "err_msg": "member not support"}}}))
    })
    .await;

    let plug = SmartPlug::with_transport("127.0.0.1", Arc::new(TcpTransport::new().with_port(port)))
        .unwrap();
    match plug.set_alias("x").await.unwrap_err() {
        SmartHomeError::Device { namespace, command, result } => {
            assert_eq!(namespace, "system");
            assert_eq!(command, "set_dev_alias");
            assert_eq!(result["err_code"], json!(-2));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let port = {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let transport = TcpTransport::new().with_port(port);
    let err = transport
        .exchange(LOCALHOST, &json!({"system": {"get_sysinfo": {}}}))
        .await
        .unwrap_err();
    assert!(err.is_transport(), "{:?}", err);
}

#[tokio::test]
async fn test_truncated_reply() {
    let (port, _server) = fake_device(|_| {
        let mut frame = framed(json!({"system": {"get_sysinfo": {"err_code": 0}}}));
        frame.truncate(frame.len() - 3);
        frame
    })
    .await;

    let err = TcpTransport::new()
        .with_port(port)
        .exchange(LOCALHOST, &json!({"system": {"get_sysinfo": {}}}))
        .await
        .unwrap_err();
    assert!(matches!(err, SmartHomeError::TruncatedFrame { .. }), "{:?}", err);
}

#[tokio::test]
async fn test_silent_device_times_out() {
    let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let _server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let err = TcpTransport::new()
        .with_port(port)
        .with_timeout(Duration::from_millis(200))
        .exchange(LOCALHOST, &json!({"system": {"get_sysinfo": {}}}))
        .await
        .unwrap_err();
    assert!(matches!(err, SmartHomeError::Timeout), "{:?}", err);
}

#[tokio::test]
async fn test_undecodable_reply_is_protocol_error() {
    let (port, _server) = fake_device(|_| encode(b"not json").unwrap()).await;

    let err = TcpTransport::new()
        .with_port(port)
        .exchange(LOCALHOST, &json!({"system": {"get_sysinfo": {}}}))
        .await
        .unwrap_err();
    assert!(matches!(err, SmartHomeError::Json(_)), "{:?}", err);
}

#[test]
fn test_blocking_api_over_tcp() {
    use std::io::{Read, Write};

    let listener = std::net::TcpListener::bind((LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut header = [0u8; 4];
        stream.read_exact(&mut header).unwrap();
        let mut body = vec![0u8; u32::from_be_bytes(header) as usize];
        stream.read_exact(&mut body).unwrap();
        let reply = json!({"system": {"get_sysinfo": {"err_code": 0, "alias": "Hall", "relay_state": 0}}});
        stream.write_all(&framed(reply)).unwrap();
    });

    let inner = tplink_smarthome::Device::with_transport(
        tplink_smarthome::DeviceFamily::Plug,
        "127.0.0.1",
        Arc::new(TcpTransport::new().with_port(port)),
    )
    .unwrap();
    let dev = tplink_smarthome::sync::Device::from(inner);
    assert_eq!(dev.alias().unwrap().as_deref(), Some("Hall"));
    server.join().unwrap();

    let err = dev.set_brightness(10).unwrap_err();
    assert!(matches!(err, SmartHomeError::InvalidState(_)));
}
