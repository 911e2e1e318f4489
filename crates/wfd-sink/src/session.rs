//! The Session Core: drives one M1-M7 capability negotiation to
//! completion and then the steady-state loop, grounded in
//! `original_source/picast/rtspsink.py`'s `cast_seq_m1`..`cast_seq_m7`,
//! `rtspsrv`, and `handle_recv_err`.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use wfd_protocol::capability::Capabilities;
use wfd_protocol::rtsp::{compose_request, compose_response, ok_response, parse_message, Headers, Message, Method};
use wfd_protocol::transport::TransportDescriptor;

use crate::error::SessionError;
use crate::media::MediaControl;

const WFA_REQUIRE: &str = "org.wfa.wfd1.0";
const PUBLIC_METHODS: &str = "org.wfa.wfd1.0, SET_PARAMETER, GET_PARAMETER";
const LOCALHOST_URL: &str = "rtsp://localhost/wfd1.0";

pub struct SessionParams {
    pub peer_address: String,
    pub rtp_port: u16,
    pub handshake_timeout: Duration,
    pub watchdog_threshold: Duration,
    pub tick: Duration,
}

pub struct Session {
    params: SessionParams,
    capabilities: Capabilities,
    player: Box<dyn MediaControl>,
    sink_cseq: u32,
    wfd_session_id: Option<String>,
    server_port: Option<u16>,
    player_started: bool,
}

impl Session {
    pub fn new(params: SessionParams, capabilities: Capabilities, player: Box<dyn MediaControl>) -> Self {
        Session {
            params,
            capabilities,
            player,
            sink_cseq: 0,
            wfd_session_id: None,
            server_port: None,
            player_started: false,
        }
    }

    /// Drive the handshake and steady-state loop for one connection to
    /// completion. Any error aborts the session; the caller (Supervisor)
    /// treats every return, Ok or Err, as "session over, await the next one".
    pub async fn run(mut self, stream: TcpStream) -> Result<(), SessionError> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        self.negotiate(&mut reader, &mut write_half).await?;

        let idr_socket = UdpSocket::bind("127.0.0.1:0").await?;
        info!(idr_addr = %idr_socket.local_addr()?, "session entering streaming state");

        self.ensure_player_started();
        let result = self.steady_state_loop(&mut reader, &mut write_half, &idr_socket).await;
        self.player.stop();
        result
    }

    fn ensure_player_started(&mut self) {
        if !self.player_started {
            self.player.start();
            self.player_started = true;
        }
    }

    async fn recv_request(&self, reader: &mut BufReader<OwnedReadHalf>) -> Result<wfd_protocol::rtsp::Request, SessionError> {
        match timeout(self.params.handshake_timeout, parse_message(reader))
            .await
            .map_err(|_| SessionError::HandshakeTimeout("handshake message"))??
        {
            Message::Request(r) => Ok(r),
            Message::Response(r) => Err(SessionError::Protocol(format!("expected request, got response {}", r.status))),
        }
    }

    async fn recv_response(&self, reader: &mut BufReader<OwnedReadHalf>, expected_cseq: u32) -> Result<wfd_protocol::rtsp::Response, SessionError> {
        match timeout(self.params.handshake_timeout, parse_message(reader))
            .await
            .map_err(|_| SessionError::HandshakeTimeout("handshake response"))??
        {
            Message::Response(r) if r.cseq == expected_cseq => Ok(r),
            Message::Response(r) => Err(SessionError::Protocol(format!("CSeq mismatch: expected {expected_cseq}, got {}", r.cseq))),
            Message::Request(r) => Err(SessionError::Protocol(format!("expected response, got request {}", r.method.as_str()))),
        }
    }

    async fn negotiate(&mut self, reader: &mut BufReader<OwnedReadHalf>, writer: &mut OwnedWriteHalf) -> Result<(), SessionError> {
        self.m1(reader, writer).await?;
        self.m2(reader, writer).await?;
        self.m3(reader, writer).await?;
        self.m4(reader, writer).await?;
        self.m5(reader, writer).await?;
        let (session_id, server_port) = self.m6(reader, writer).await?;
        self.m7(reader, writer, &session_id).await?;
        self.wfd_session_id = Some(session_id);
        self.server_port = server_port;
        info!(server_port = ?self.server_port, "negotiation successful");
        Ok(())
    }

    async fn m1(&mut self, reader: &mut BufReader<OwnedReadHalf>, writer: &mut OwnedWriteHalf) -> Result<(), SessionError> {
        let req = self.recv_request(reader).await?;
        if req.method != Method::Options {
            return Err(SessionError::Protocol(format!("M1: expected OPTIONS, got {}", req.method.as_str())));
        }
        let mut headers = Headers::new();
        headers.insert("Public", PUBLIC_METHODS);
        writer.write_all(&compose_response(200, "OK", req.cseq, &headers, None)).await?;
        Ok(())
    }

    async fn m2(&mut self, reader: &mut BufReader<OwnedReadHalf>, writer: &mut OwnedWriteHalf) -> Result<(), SessionError> {
        self.sink_cseq = 100;
        let mut headers = Headers::new();
        headers.insert("Require", WFA_REQUIRE);
        writer.write_all(&compose_request(Method::Options, "*", self.sink_cseq, &headers, None)).await?;
        let resp = self.recv_response(reader, self.sink_cseq).await?;
        if resp.status != 200 {
            return Err(SessionError::Protocol(format!("M2: peer replied {} to OPTIONS", resp.status)));
        }
        Ok(())
    }

    async fn m3(&mut self, reader: &mut BufReader<OwnedReadHalf>, writer: &mut OwnedWriteHalf) -> Result<(), SessionError> {
        let req = self.recv_request(reader).await?;
        if req.method != Method::GetParameter {
            return Err(SessionError::Protocol(format!("M3: expected GET_PARAMETER, got {}", req.method.as_str())));
        }
        let requested_keys: Vec<String> = req
            .body
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).to_string())
            .unwrap_or_default()
            .split("\r\n")
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect();
        let body = self.capabilities.render_m3_response(&requested_keys);

        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/parameters");
        headers.insert("Content-Length", body.len().to_string());
        writer
            .write_all(&compose_response(200, "OK", req.cseq, &headers, Some(body.as_bytes())))
            .await?;
        Ok(())
    }

    async fn m4(&mut self, reader: &mut BufReader<OwnedReadHalf>, writer: &mut OwnedWriteHalf) -> Result<(), SessionError> {
        let req = self.recv_request(reader).await?;
        if req.method != Method::SetParameter {
            return Err(SessionError::Protocol(format!("M4: expected SET_PARAMETER, got {}", req.method.as_str())));
        }
        // This sink does not select among multiple source-offered formats,
        // matching the original's single-format assumption.
        writer.write_all(&ok_response(req.cseq)).await?;
        Ok(())
    }

    async fn m5(&mut self, reader: &mut BufReader<OwnedReadHalf>, writer: &mut OwnedWriteHalf) -> Result<(), SessionError> {
        let req = self.recv_request(reader).await?;
        if req.method != Method::SetParameter {
            writer.write_all(&compose_response(400, "Bad Request", req.cseq, &Headers::new(), None)).await?;
            return Err(SessionError::Protocol(format!("M5: expected SET_PARAMETER trigger, got {}", req.method.as_str())));
        }
        writer.write_all(&ok_response(req.cseq)).await?;
        Ok(())
    }

    async fn m6(&mut self, reader: &mut BufReader<OwnedReadHalf>, writer: &mut OwnedWriteHalf) -> Result<(String, Option<u16>), SessionError> {
        self.sink_cseq = 101;
        let url = format!("rtsp://{}/wfd1.0/streamid=0", self.params.peer_address);
        let mut headers = Headers::new();
        headers.insert("Transport", TransportDescriptor::format_request_header(self.params.rtp_port));
        writer.write_all(&compose_request(Method::Setup, &url, self.sink_cseq, &headers, None)).await?;

        let resp = self.recv_response(reader, self.sink_cseq).await?;
        if resp.status != 200 {
            return Err(SessionError::Protocol(format!("M6: peer replied {} to SETUP", resp.status)));
        }
        let server_port = match resp.headers.get("Transport") {
            Some(v) => TransportDescriptor::parse(v).ok().and_then(|t| t.server_port),
            None => None,
        };
        let session_id = resp
            .headers
            .get("Session")
            .ok_or(SessionError::Protocol("M6: missing Session header".to_string()))?
            .split(';')
            .next()
            .unwrap_or_default()
            .to_string();
        debug!(%session_id, ?server_port, "M6 complete");
        Ok((session_id, server_port))
    }

    async fn m7(&mut self, reader: &mut BufReader<OwnedReadHalf>, writer: &mut OwnedWriteHalf, session_id: &str) -> Result<(), SessionError> {
        self.sink_cseq = 102;
        let url = format!("rtsp://{}/wfd1.0/streamid=0", self.params.peer_address);
        let mut headers = Headers::new();
        headers.insert("Session", session_id);
        writer.write_all(&compose_request(Method::Play, &url, self.sink_cseq, &headers, None)).await?;

        let resp = self.recv_response(reader, self.sink_cseq).await?;
        if resp.status != 200 {
            return Err(SessionError::Protocol(format!("M7: peer replied {} to PLAY", resp.status)));
        }
        Ok(())
    }

    async fn steady_state_loop(
        &mut self,
        reader: &mut BufReader<OwnedReadHalf>,
        writer: &mut OwnedWriteHalf,
        idr_socket: &UdpSocket,
    ) -> Result<(), SessionError> {
        let mut watchdog_elapsed = Duration::ZERO;
        let mut idr_buf = [0u8; 1024];

        loop {
            tokio::select! {
                biased;
                fill_result = reader.fill_buf() => {
                    match fill_result {
                        Ok(buf) if buf.is_empty() => return Err(SessionError::PeerClosed),
                        Ok(_) => {
                            let msg = parse_message(reader).await?;
                            watchdog_elapsed = Duration::ZERO;
                            if self.handle_steady_state_message(msg, writer).await? {
                                return Ok(());
                            }
                        }
                        Err(e) => return Err(SessionError::Transport(e)),
                    }
                }
                _ = sleep(self.params.tick) => {
                    match idr_socket.try_recv(&mut idr_buf) {
                        Ok(_) => {
                            self.send_idr_request(writer).await?;
                            watchdog_elapsed = Duration::ZERO;
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            watchdog_elapsed += self.params.tick;
                            if watchdog_elapsed >= self.params.watchdog_threshold {
                                warn!(elapsed_secs = watchdog_elapsed.as_secs(), "watchdog expired, tearing down session");
                                return Err(SessionError::WatchdogExpired(watchdog_elapsed.as_secs()));
                            }
                        }
                        Err(e) => return Err(SessionError::Transport(e)),
                    }
                }
            }
        }
    }

    /// Returns `Ok(true)` when the session should end (TEARDOWN handled).
    async fn handle_steady_state_message(&mut self, msg: Message, writer: &mut OwnedWriteHalf) -> Result<bool, SessionError> {
        let req = match msg {
            Message::Request(r) => r,
            Message::Response(r) => {
                debug!(status = r.status, "ignoring unsolicited response in steady state");
                return Ok(false);
            }
        };

        match req.method {
            Method::GetParameter => {
                writer.write_all(&ok_response(req.cseq)).await?;
                Ok(false)
            }
            Method::SetParameter => {
                let body = req.body.as_deref().map(String::from_utf8_lossy).unwrap_or_default();
                if body.contains("wfd_video_formats") {
                    self.ensure_player_started();
                }
                let teardown = body.contains("wfd_trigger_method: TEARDOWN");
                writer.write_all(&ok_response(req.cseq)).await?;
                if teardown {
                    self.sink_cseq += 1;
                    writer
                        .write_all(&compose_request(Method::Teardown, LOCALHOST_URL, self.sink_cseq, &Headers::new(), None))
                        .await?;
                    info!("peer requested teardown");
                    return Ok(true);
                }
                Ok(false)
            }
            other => {
                writer.write_all(&ok_response(req.cseq)).await?;
                debug!(method = other.as_str(), "acknowledged unexpected steady-state request");
                Ok(false)
            }
        }
    }

    async fn send_idr_request(&mut self, writer: &mut OwnedWriteHalf) -> Result<(), SessionError> {
        self.sink_cseq += 1;
        let body = b"wfd-idr-request\r\n";
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/parameters");
        headers.insert("Content-Length", body.len().to_string());
        writer
            .write_all(&compose_request(Method::SetParameter, LOCALHOST_URL, self.sink_cseq, &headers, Some(body)))
            .await?;
        debug!(cseq = self.sink_cseq, "sent IDR refresh request");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::NoopPlayer;
    use tokio::net::TcpListener;
    use wfd_protocol::config::CapabilityConfig;

    fn test_params() -> SessionParams {
        SessionParams {
            peer_address: "192.168.173.80".to_string(),
            rtp_port: 1028,
            handshake_timeout: Duration::from_secs(2),
            watchdog_threshold: Duration::from_millis(100),
            tick: Duration::from_millis(5),
        }
    }

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn happy_path_through_streaming_starts_player_once() {
        let (sink_side, peer_side) = connected_pair().await;
        let caps = Capabilities::from_platform_probe(None, &CapabilityConfig::default());
        let session = Session::new(test_params(), caps, Box::new(NoopPlayer::default()));

        let peer = tokio::spawn(async move {
            let mut reader = BufReader::new(peer_side);

            reader.get_mut().write_all(b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n").await.unwrap();
            let _m1_resp = parse_message(&mut reader).await.unwrap();

            let _m2_req = parse_message(&mut reader).await.unwrap();
            reader.get_mut().write_all(b"RTSP/1.0 200 OK\r\nCSeq: 100\r\n\r\n").await.unwrap();

            let body = b"wfd_client_rtp_ports\r\nwfd_video_formats\r\n";
            let m3 = format!("GET_PARAMETER rtsp://localhost/wfd1.0 RTSP/1.0\r\nCSeq: 2\r\nContent-Length: {}\r\n\r\n", body.len());
            reader.get_mut().write_all(m3.as_bytes()).await.unwrap();
            reader.get_mut().write_all(body).await.unwrap();
            let _m3_resp = parse_message(&mut reader).await.unwrap();

            reader.get_mut().write_all(b"SET_PARAMETER rtsp://localhost/wfd1.0 RTSP/1.0\r\nCSeq: 3\r\n\r\n").await.unwrap();
            let _m4_resp = parse_message(&mut reader).await.unwrap();

            reader.get_mut().write_all(b"SET_PARAMETER rtsp://localhost/wfd1.0 RTSP/1.0\r\nCSeq: 4\r\n\r\n").await.unwrap();
            let _m5_resp = parse_message(&mut reader).await.unwrap();

            let _m6_req = parse_message(&mut reader).await.unwrap();
            reader
                .get_mut()
                .write_all(b"RTSP/1.0 200 OK\r\nCSeq: 101\r\nSession: 7C9C5678;timeout=30\r\nTransport: RTP/AVP/UDP;unicast;client_port=1028;server_port=5000\r\n\r\n")
                .await
                .unwrap();

            let _m7_req = parse_message(&mut reader).await.unwrap();
            reader.get_mut().write_all(b"RTSP/1.0 200 OK\r\nCSeq: 102\r\n\r\n").await.unwrap();

            // Drop the connection right after the handshake to end the steady-state loop deterministically.
            drop(reader);
        });

        let result = session.run(sink_side).await;
        peer.await.unwrap();
        assert!(matches!(result, Err(SessionError::PeerClosed) | Err(SessionError::Transport(_))));
    }

    #[tokio::test]
    async fn malformed_m3_aborts_session_without_starting_player() {
        let (sink_side, peer_side) = connected_pair().await;
        let caps = Capabilities::from_platform_probe(None, &CapabilityConfig::default());
        let session = Session::new(test_params(), caps, Box::new(NoopPlayer::default()));

        let peer = tokio::spawn(async move {
            let mut reader = BufReader::new(peer_side);
            reader.get_mut().write_all(b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n").await.unwrap();
            let _m1_resp = parse_message(&mut reader).await.unwrap();
            let _m2_req = parse_message(&mut reader).await.unwrap();
            reader.get_mut().write_all(b"RTSP/1.0 200 OK\r\nCSeq: 100\r\n\r\n").await.unwrap();
            reader.get_mut().write_all(b"not an rtsp message at all\r\n\r\n").await.unwrap();
        });

        let result = session.run(sink_side).await;
        peer.await.unwrap();
        assert!(result.is_err());
    }

    /// Drives one scripted peer through M1-M7 over `reader`, leaving it
    /// positioned right after PLAY's 200 OK for a steady-state scenario.
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

    #[tokio::test]
    async fn teardown_gets_one_ok_then_session_ends() {
        let (sink_side, peer_side) = connected_pair().await;
        let caps = Capabilities::from_platform_probe(None, &CapabilityConfig::default());
        let session = Session::new(test_params(), caps, Box::new(NoopPlayer::default()));

        let peer = tokio::spawn(async move {
            let mut reader = BufReader::new(peer_side);
            drive_handshake(&mut reader).await;

            let body = b"wfd_trigger_method: TEARDOWN\r\n";
            let teardown = format!("SET_PARAMETER rtsp://localhost/wfd1.0 RTSP/1.0\r\nCSeq: 5\r\nContent-Length: {}\r\n\r\n", body.len());
            reader.get_mut().write_all(teardown.as_bytes()).await.unwrap();
            reader.get_mut().write_all(body).await.unwrap();

            let resp = parse_message(&mut reader).await.unwrap();
            assert_eq!(resp.cseq(), 5);
            let _sink_teardown = parse_message(&mut reader).await.unwrap();
        });

        let result = session.run(sink_side).await;
        peer.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn watchdog_expiry_terminates_idle_session() {
        let (sink_side, peer_side) = connected_pair().await;
        let caps = Capabilities::from_platform_probe(None, &CapabilityConfig::default());
        let mut params = test_params();
        params.watchdog_threshold = Duration::from_millis(20);
        params.tick = Duration::from_millis(5);
        let session = Session::new(params, caps, Box::new(NoopPlayer::default()));

        let peer = tokio::spawn(async move {
            let mut reader = BufReader::new(peer_side);
            drive_handshake(&mut reader).await;
            // Go silent; the sink's watchdog should expire.
            sleep(Duration::from_millis(100)).await;
        });

        let result = session.run(sink_side).await;
        peer.await.unwrap();
        assert!(matches!(result, Err(SessionError::WatchdogExpired(_))));
    }

    #[tokio::test]
    async fn idr_request_uses_next_cseq_after_play() {
        let (sink_side, peer_side) = connected_pair().await;
        let caps = Capabilities::from_platform_probe(None, &CapabilityConfig::default());
        let mut session = Session::new(test_params(), caps, Box::new(NoopPlayer::default()));
        session.sink_cseq = 102; // as left after M7's PLAY

        let (_read_half, mut write_half) = sink_side.into_split();
        session.send_idr_request(&mut write_half).await.unwrap();

        let mut reader = BufReader::new(peer_side);
        let msg = parse_message(&mut reader).await.unwrap();
        match msg {
            Message::Request(r) => {
                assert_eq!(r.method, Method::SetParameter);
                assert_eq!(r.cseq, 103);
                assert_eq!(r.url, LOCALHOST_URL);
                assert_eq!(r.body.as_deref(), Some(b"wfd-idr-request\r\n".as_slice()));
            }
            _ => panic!("expected request"),
        }
    }
}
