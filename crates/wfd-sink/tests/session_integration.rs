//! End-to-end tests driving `connector::connect` and `Session::run`
//! together against a scripted peer, the way a real source would dial
//! in and negotiate. Complements the narrower per-message unit tests
//! colocated in `src/session.rs`.

use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use wfd_protocol::capability::Capabilities;
use wfd_protocol::config::CapabilityConfig;
use wfd_protocol::rtsp::{parse_message, Message};

use wfd_sink::connector;
use wfd_sink::media::NoopPlayer;
use wfd_sink::session::{Session, SessionParams};

fn test_params() -> SessionParams {
    SessionParams {
        peer_address: "192.168.173.80".to_string(),
        rtp_port: 1028,
        handshake_timeout: Duration::from_secs(2),
        watchdog_threshold: Duration::from_millis(200),
        tick: Duration::from_millis(10),
    }
}

async fn drive_handshake(reader: &mut BufReader<TcpStream>) {
    reader.get_mut().write_all(b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n").await.unwrap();
    let _m1_resp = parse_message(reader).await.unwrap();

    let _m2_req = parse_message(reader).await.unwrap();
    reader.get_mut().write_all(b"RTSP/1.0 200 OK\r\nCSeq: 100\r\n\r\n").await.unwrap();

    let m3 = b"GET_PARAMETER rtsp://localhost/wfd1.0 RTSP/1.0\r\nCSeq: 2\r\nContent-Length: 0\r\n\r\n";
    reader.get_mut().write_all(m3).await.unwrap();
    let _m3_resp = parse_message(reader).await.unwrap();

    reader.get_mut().write_all(b"SET_PARAMETER rtsp://localhost/wfd1.0 RTSP/1.0\r\nCSeq: 3\r\n\r\n").await.unwrap();
    let _m4_resp = parse_message(reader).await.unwrap();

    reader.get_mut().write_all(b"SET_PARAMETER rtsp://localhost/wfd1.0 RTSP/1.0\r\nCSeq: 4\r\n\r\n").await.unwrap();
    let _m5_resp = parse_message(reader).await.unwrap();

    let _m6_req = parse_message(reader).await.unwrap();
    reader
        .get_mut()
        .write_all(b"RTSP/1.0 200 OK\r\nCSeq: 101\r\nSession: 7C9C5678;timeout=30\r\nTransport: RTP/AVP/UDP;unicast;client_port=1028;server_port=5000\r\n\r\n")
        .await
        .unwrap();

    let _m7_req = parse_message(reader).await.unwrap();
    reader.get_mut().write_all(b"RTSP/1.0 200 OK\r\nCSeq: 102\r\n\r\n").await.unwrap();
}

/// The source's listener isn't up yet when the sink starts dialing; the
/// connector must retry until it appears, then the session negotiates
/// and the player starts exactly once.
#[tokio::test]
async fn connector_retries_then_full_session_negotiates_and_starts_player() {
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let listen_after = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        let listener = TcpListener::bind(addr).await.unwrap();
        let (peer_side, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(peer_side);
        drive_handshake(&mut reader).await;
        drop(reader);
    });

    let stream = connector::connect(addr.ip(), addr.port(), 50, Duration::from_millis(5)).await.unwrap();

    let caps = Capabilities::from_platform_probe(None, &CapabilityConfig::default());
    let session = Session::new(test_params(), caps, Box::new(NoopPlayer::default()));
    let result = session.run(stream).await;

    listen_after.await.unwrap();
    assert!(result.is_err(), "peer drops the connection right after PLAY, ending the steady-state loop");
}

/// A source that never answers exhausts the connector's retry budget
/// without ever reaching session negotiation.
#[tokio::test]
async fn connector_gives_up_before_any_session_is_created() {
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let err = connector::connect(addr.ip(), addr.port(), 3, Duration::from_millis(1)).await.unwrap_err();
    assert!(matches!(err, wfd_sink::error::ConnectError::Timeout { attempts: 3, .. }));
}

/// A full negotiation followed by an explicit TEARDOWN ends the session
/// cleanly, confirming the public `Session`/`connector` surface agrees
/// with the inline per-message unit tests.
#[tokio::test]
async fn teardown_after_connect_ends_session_cleanly() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let peer = tokio::spawn(async move {
        let (peer_side, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(peer_side);
        drive_handshake(&mut reader).await;

        let body = b"wfd_trigger_method: TEARDOWN\r\n";
        let teardown = format!("SET_PARAMETER rtsp://localhost/wfd1.0 RTSP/1.0\r\nCSeq: 5\r\nContent-Length: {}\r\n\r\n", body.len());
        reader.get_mut().write_all(teardown.as_bytes()).await.unwrap();
        reader.get_mut().write_all(body).await.unwrap();

        let resp = parse_message(&mut reader).await.unwrap();
        match resp {
            Message::Response(r) => assert_eq!(r.cseq, 5),
            _ => panic!("expected response"),
        }
        let _sink_teardown = parse_message(&mut reader).await.unwrap();
    });

    let stream = connector::connect(addr.ip(), addr.port(), 5, Duration::from_millis(5)).await.unwrap();
    let caps = Capabilities::from_platform_probe(None, &CapabilityConfig::default());
    let session = Session::new(test_params(), caps, Box::new(NoopPlayer::default()));
    let result = session.run(stream).await;

    peer.await.unwrap();
    assert!(result.is_ok());
}
