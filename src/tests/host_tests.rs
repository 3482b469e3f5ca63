use super::support::ma;
use crate::address::socket_to_multiaddr;
use crate::host::{PeerHost, PeerInfo, TcpHost, TcpHostConfig};
use crate::identity::Keypair;
use crate::protocol::{read_frame, write_frame};
use std::net::SocketAddr;
use std::time::Duration;

async fn loopback_host(port_reuse: bool) -> TcpHost {
    TcpHost::bind(
        SocketAddr::from(([127, 0, 0, 1], 0)),
        Keypair::generate(),
        TcpHostConfig {
            port_reuse,
            ..TcpHostConfig::default()
        },
    )
    .await
    .unwrap()
}

fn info_of(host: &TcpHost) -> PeerInfo {
    PeerInfo::new(host.peer_id().clone(), host.listen_addrs())
}

#[tokio::test]
async fn test_listen_addrs_for_concrete_bind() {
    let host = loopback_host(false).await;
    assert_eq!(host.listen_addrs(), vec![socket_to_multiaddr(host.local_addr())]);
    assert_ne!(host.local_addr().port(), 0);
}

#[tokio::test]
async fn test_connect_returns_working_address() {
    let target = loopback_host(false).await;
    let dialer = loopback_host(false).await;

    let addr = dialer
        .connect(&info_of(&target), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(addr, socket_to_multiaddr(target.local_addr()));
}

#[tokio::test]
async fn test_connect_skips_dead_addresses() {
    let target = loopback_host(false).await;
    let dialer = loopback_host(false).await;

    let good = socket_to_multiaddr(target.local_addr());
    let peer = PeerInfo::new(
        target.peer_id().clone(),
        vec![ma("/ip4/127.0.0.1/tcp/1"), ma("/dns4/example.com/tcp/80"), good.clone()],
    );

    let addr = dialer.connect(&peer, Duration::from_secs(5)).await.unwrap();
    assert_eq!(addr, good);
}

#[tokio::test]
async fn test_connect_rejects_wrong_identity() {
    let target = loopback_host(false).await;
    let dialer = loopback_host(false).await;

    // Right address, someone else's id
    let impostor = PeerInfo::new(
        Keypair::generate().peer_id().clone(),
        target.listen_addrs(),
    );

    assert!(dialer.connect(&impostor, Duration::from_secs(5)).await.is_err());
}

#[tokio::test]
async fn test_connect_without_addresses() {
    let dialer = loopback_host(false).await;
    let peer = PeerInfo::new(Keypair::generate().peer_id().clone(), vec![]);

    assert!(dialer.connect(&peer, Duration::from_secs(1)).await.is_err());
}

#[tokio::test]
async fn test_open_stream_reaches_handler() {
    let target = loopback_host(false).await;
    let dialer = loopback_host(false).await;
    let mut rx = target.handle_protocol("/test/1.0.0").await;

    let mut outbound = dialer
        .open_stream(&info_of(&target), "/test/1.0.0")
        .await
        .unwrap();
    write_frame(&mut outbound, b"ping").await.unwrap();

    let mut inbound = rx.recv().await.unwrap();
    assert_eq!(&inbound.remote_peer, dialer.peer_id());
    assert_eq!(read_frame(&mut inbound.stream).await.unwrap(), b"ping");

    write_frame(&mut inbound.stream, b"pong").await.unwrap();
    assert_eq!(read_frame(&mut outbound).await.unwrap(), b"pong");
}

#[tokio::test]
async fn test_open_stream_unknown_protocol() {
    let target = loopback_host(false).await;
    let dialer = loopback_host(false).await;

    let result = dialer.open_stream(&info_of(&target), "/unknown/1.0.0").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_port_reuse_dials_from_listen_port() {
    let target = loopback_host(false).await;
    let dialer = loopback_host(true).await;
    let mut rx = target.handle_protocol("/test/1.0.0").await;

    let _outbound = dialer
        .open_stream(&info_of(&target), "/test/1.0.0")
        .await
        .unwrap();

    let inbound = rx.recv().await.unwrap();
    assert_eq!(inbound.remote_addr, socket_to_multiaddr(dialer.local_addr()));
}
