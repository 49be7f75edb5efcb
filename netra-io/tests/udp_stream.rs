//! UDP video transport over loopback

use netra_io::capture::Frame;
use netra_io::streaming::wire::decode_udp_datagram;
use netra_io::streaming::{SendOutcome, UdpFrameReceiver, UdpFrameServer, UdpReceive};
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::time::Duration;

fn server(client_port: Option<u16>) -> UdpFrameServer {
    UdpFrameServer::bind("127.0.0.1:0", client_port, Vec::new(), Duration::from_millis(300), 70)
        .unwrap()
}

fn viewer_socket() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
    socket
}

fn assert_nothing_arrives(socket: &UdpSocket) {
    let mut buf = [0u8; 2048];
    match socket.recv_from(&mut buf) {
        Ok((n, src)) => panic!("unexpected {}-byte datagram from {}", n, src),
        Err(e) => assert!(
            matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut),
            "{}",
            e
        ),
    }
}

#[test]
fn test_registered_viewer_receives_frames() {
    let viewer = viewer_socket();
    let mut server = server(Some(viewer.local_addr().unwrap().port()));

    viewer.send_to(b"connect", server.local_addr()).unwrap();
    assert!(server.connecting());

    let frame = Frame::placeholder(64, 48);
    assert_eq!(server.send(&frame).unwrap(), SendOutcome::Sent);

    let mut buf = vec![0u8; 65536];
    let (n, src) = viewer.recv_from(&mut buf).unwrap();
    assert_eq!(src, server.local_addr());
    let jpeg = decode_udp_datagram(&buf[..n]).expect("well-formed datagram");
    let decoded = Frame::decode_jpeg(jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 48));
}

#[test]
fn test_silent_socket_is_never_admitted() {
    let stranger = viewer_socket();
    let mut server = server(Some(stranger.local_addr().unwrap().port()));

    // Anything but the handshake token is ignored
    stranger.send_to(b"hello", server.local_addr()).unwrap();
    assert!(!server.connecting());
    assert_eq!(server.send(&Frame::placeholder(32, 24)).unwrap(), SendOutcome::Sent);

    assert!(server.clients().is_empty());
    assert_nothing_arrives(&stranger);
}

#[test]
fn test_frames_go_only_to_the_client_port() {
    let viewer = viewer_socket();
    let bystander = viewer_socket();
    let mut server = server(Some(viewer.local_addr().unwrap().port()));

    viewer.send_to(b"connect", server.local_addr()).unwrap();
    assert!(server.connecting());
    server.send(&Frame::placeholder(32, 24)).unwrap();

    let mut buf = vec![0u8; 65536];
    assert!(viewer.recv_from(&mut buf).is_ok());
    assert_nothing_arrives(&bystander);
}

#[test]
fn test_receiver_end_to_end() {
    // Reserve a port for the receiver, then tell the server about it
    let port = UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let mut server = server(Some(port));
    let mut receiver = UdpFrameReceiver::connect(
        &format!("127.0.0.1:{}", port),
        server.local_addr(),
        Duration::from_millis(500),
    )
    .unwrap();
    assert!(server.connecting());

    server.send(&Frame::placeholder(40, 30)).unwrap();
    match receiver.receive().unwrap() {
        UdpReceive::Frame(frame) => assert_eq!((frame.width(), frame.height()), (40, 30)),
        other => panic!("expected a frame, got {:?}", other),
    }

    // Nothing sent: the receiver times out with a placeholder
    match receiver.receive().unwrap() {
        UdpReceive::Timeout(frame) => assert_eq!((frame.width(), frame.height()), (320, 240)),
        other => panic!("expected a timeout, got {:?}", other),
    }
}
