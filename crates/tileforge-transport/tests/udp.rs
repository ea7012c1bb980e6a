//! Integration tests for the UDP transport and the envelope over a real socket.

use std::time::Duration;

use tileforge_transport::{DatagramTransport, SecureChannel, UdpTransport, MAX_DATAGRAM_LEN};
use tokio::net::UdpSocket;

async fn client() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.expect("client should bind")
}

#[tokio::test]
async fn test_udp_recv_from_reports_sender() {
    let transport = UdpTransport::bind("127.0.0.1:0").await.expect("should bind");
    let server_addr = transport.local_addr().expect("should have local addr");

    let client = client().await;
    client.send_to(b"PING", server_addr).await.unwrap();

    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    let (len, from) = tokio::time::timeout(Duration::from_secs(2), transport.recv_from(&mut buf))
        .await
        .expect("datagram should arrive")
        .expect("recv should succeed");

    assert_eq!(&buf[..len], b"PING");
    assert_eq!(from, client.local_addr().unwrap());
}

#[tokio::test]
async fn test_udp_send_to_reaches_client() {
    let transport = UdpTransport::bind("127.0.0.1:0").await.expect("should bind");
    let client = client().await;

    transport
        .send_to(b"PONG", client.local_addr().unwrap())
        .await
        .expect("send should succeed");

    let mut buf = [0u8; 64];
    let (len, from) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
        .await
        .expect("datagram should arrive")
        .unwrap();
    assert_eq!(&buf[..len], b"PONG");
    assert_eq!(from, transport.local_addr().unwrap());
}

#[tokio::test]
async fn test_sealed_envelope_survives_the_wire() {
    let channel = SecureChannel::new(&[42u8; 32]);
    let transport = UdpTransport::bind("127.0.0.1:0").await.expect("should bind");
    let server_addr = transport.local_addr().unwrap();

    let client = client().await;
    let envelope = channel.seal(b"REGISTER|alice|secret|blue");
    client.send_to(envelope.as_bytes(), server_addr).await.unwrap();

    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), transport.recv_from(&mut buf))
        .await
        .expect("datagram should arrive")
        .unwrap();

    let text = std::str::from_utf8(&buf[..len]).unwrap();
    assert_eq!(channel.open(text).unwrap(), b"REGISTER|alice|secret|blue");
}
