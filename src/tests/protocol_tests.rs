use super::support::{ma, peer_id};
use crate::protocol::*;
use crate::Error;

fn full_request() -> ConnectBackRequest {
    ConnectBackRequest {
        peer_id: peer_id(),
        seen_gateway: Some(ma("/ip4/192.168.1.1")),
        port_mapped: Some(ma("/ip4/203.0.113.5/tcp/9000")),
        listen_addr: ma("/ip4/192.168.1.20/tcp/9000"),
    }
}

#[test]
fn test_request_json_roundtrip() {
    let request = full_request();
    let decoded = ConnectBackRequest::from_json(&request.to_json().unwrap()).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn test_request_optional_fields_absent() {
    let request = ConnectBackRequest::new(peer_id(), ma("/ip4/192.168.1.20/tcp/9000"));
    let json = request.to_json().unwrap();

    let text = String::from_utf8(json.clone()).unwrap();
    assert!(!text.contains("PortMapped"));
    assert!(!text.contains("SeenGateway"));

    assert_eq!(ConnectBackRequest::from_json(&json).unwrap(), request);
}

#[test]
fn test_request_field_names() {
    let value: serde_json::Value =
        serde_json::from_slice(&full_request().to_json().unwrap()).unwrap();
    let object = value.as_object().unwrap();

    for key in ["PeerID", "SeenGateway", "PortMapped", "ListenAddr"] {
        assert!(object.contains_key(key), "missing {}", key);
    }
    assert_eq!(object["ListenAddr"], "/ip4/192.168.1.20/tcp/9000");
}

#[test]
fn test_request_empty_strings_mean_absent() {
    let id = peer_id();
    let json = format!(
        r#"{{"PeerID":"{}","SeenGateway":"","PortMapped":"","ListenAddr":"/ip4/10.0.0.2/tcp/4001"}}"#,
        id
    );

    let request = ConnectBackRequest::from_json(json.as_bytes()).unwrap();
    assert_eq!(request.peer_id, id);
    assert_eq!(request.seen_gateway, None);
    assert_eq!(request.port_mapped, None);
}

#[test]
fn test_request_unknown_fields_ignored() {
    let json = format!(
        r#"{{"PeerID":"{}","ListenAddr":"/ip4/10.0.0.2/tcp/4001","Extra":42}}"#,
        peer_id()
    );
    assert!(ConnectBackRequest::from_json(json.as_bytes()).is_ok());
}

#[test]
fn test_request_bad_address_is_malformed() {
    let json = format!(r#"{{"PeerID":"{}","ListenAddr":"nonsense"}}"#, peer_id());
    assert!(matches!(
        ConnectBackRequest::from_json(json.as_bytes()),
        Err(Error::MalformedPayload(_))
    ));

    assert!(matches!(
        ConnectBackRequest::from_json(b"{\"ListenAddr\":\"/ip4/1.2.3.4/tcp/1\"}"),
        Err(Error::MalformedPayload(_))
    ));
}

#[test]
fn test_result_success_roundtrip() {
    let tried = vec![
        ma("/ip4/192.168.1.20/tcp/9000"),
        ma("/ip4/203.0.113.5/tcp/9000"),
    ];
    let result = ConnectBackResult::success(
        ma("/ip4/203.0.113.5/tcp/51234"),
        ma("/ip4/203.0.113.5/tcp/9000"),
        tried,
    );

    let decoded = ConnectBackResult::from_json(&result.to_json().unwrap()).unwrap();
    assert_eq!(decoded, result);
    assert_eq!(decoded.outcome().unwrap(), &ma("/ip4/203.0.113.5/tcp/9000"));
}

#[test]
fn test_result_failure_roundtrip() {
    let result = ConnectBackResult::failure(
        ma("/ip4/203.0.113.5/tcp/51234"),
        "dial timed out".to_string(),
        vec![ma("/ip4/192.168.1.20/tcp/9000")],
    );

    let decoded = ConnectBackResult::from_json(&result.to_json().unwrap()).unwrap();
    assert_eq!(decoded, result);

    match decoded.outcome() {
        Err(Error::ConnectBackFailed(msg)) => assert_eq!(msg, "dial timed out"),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_result_failure_with_empty_message_roundtrip() {
    let result = ConnectBackResult::failure(ma("/ip4/203.0.113.5/tcp/51234"), String::new(), vec![]);
    assert_eq!(result.failure_message.as_deref(), Some("connect-back failed"));

    let decoded = ConnectBackResult::from_json(&result.to_json().unwrap()).unwrap();
    assert_eq!(decoded, result);
}

#[test]
fn test_result_go_style_failure_payload() {
    let json = br#"{"SeenAddr":"/ip4/203.0.113.5/tcp/51234","ConnectBackSuccess":false,"ConnectBackMsg":"","ConnectBackAddr":"","TriedAddrs":null}"#;

    let result = ConnectBackResult::from_json(json).unwrap();
    assert!(!result.success);
    assert_eq!(result.failure_message, None);
    assert_eq!(result.successful_addr, None);
    assert!(result.tried_addrs.is_empty());
}

#[test]
fn test_result_field_names() {
    let result = ConnectBackResult::failure(
        ma("/ip4/203.0.113.5/tcp/1"),
        "no".to_string(),
        vec![],
    );
    let value: serde_json::Value = serde_json::from_slice(&result.to_json().unwrap()).unwrap();
    let object = value.as_object().unwrap();

    for key in ["SeenAddr", "ConnectBackSuccess", "ConnectBackMsg", "TriedAddrs"] {
        assert!(object.contains_key(key), "missing {}", key);
    }
    assert!(!object.contains_key("ConnectBackAddr"));
}

#[tokio::test]
async fn test_frame_roundtrip() {
    let mut buf: Vec<u8> = Vec::new();
    write_frame(&mut buf, b"hello").await.unwrap();
    assert_eq!(&buf[..4], &5u32.to_be_bytes());

    let mut reader = &buf[..];
    assert_eq!(read_frame(&mut reader).await.unwrap(), b"hello");
}

#[tokio::test]
async fn test_frame_split_across_reads() {
    let payload = b"{\"a\":1}";
    let mut mock = tokio_test::io::Builder::new()
        .read(&(payload.len() as u32).to_be_bytes()[..2])
        .read(&(payload.len() as u32).to_be_bytes()[2..])
        .read(&payload[..3])
        .read(&payload[3..])
        .build();

    assert_eq!(read_frame(&mut mock).await.unwrap(), payload);
}

#[tokio::test]
async fn test_frame_write_matches_wire_format() {
    let mut mock = tokio_test::io::Builder::new()
        .write(&3u32.to_be_bytes())
        .write(b"abc")
        .build();

    write_frame(&mut mock, b"abc").await.unwrap();
}

#[tokio::test]
async fn test_oversized_frame_rejected() {
    let header = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
    let mut reader = &header[..];
    assert!(matches!(
        read_frame(&mut reader).await,
        Err(Error::MalformedPayload(_))
    ));

    let mut sink: Vec<u8> = Vec::new();
    let big = vec![0u8; MAX_FRAME_LEN + 1];
    assert!(matches!(
        write_frame(&mut sink, &big).await,
        Err(Error::MalformedPayload(_))
    ));
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_truncated_frame_is_io_error() {
    let mut data = 10u32.to_be_bytes().to_vec();
    data.extend_from_slice(b"abc");
    let mut reader = &data[..];

    assert!(matches!(read_frame(&mut reader).await, Err(Error::Io(_))));
}

#[tokio::test]
async fn test_message_roundtrip_over_duplex() {
    let (mut a, mut b) = tokio::io::duplex(1024);
    let request = full_request();

    write_message(&mut a, &request).await.unwrap();
    let decoded: ConnectBackRequest = read_message(&mut b).await.unwrap();
    assert_eq!(decoded, request);
}
