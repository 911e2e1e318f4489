use thiserror::Error;
use wfd_protocol::CodecError;

/// Errors that can terminate a single session. Every variant other than
/// `WouldBlock`-equivalents (which never reach this type - non-blocking
/// reads are handled in the steady-state loop directly) aborts the session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("handshake timed out waiting for {0}")]
    HandshakeTimeout(&'static str),
    #[error("watchdog expired after {0}s of inactivity")]
    WatchdogExpired(u64),
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("exhausted {attempts} connection attempts to {peer}:{port}")]
    Timeout { peer: String, port: u16, attempts: u32 },
}

#[derive(Debug, Error)]
pub enum ExternalCommandError {
    #[error("command `{command}` failed: {detail}")]
    Failed { command: String, detail: String },
    #[error("i/o error running `{command}`: {source}")]
    Io { command: String, #[source] source: std::io::Error },
}
