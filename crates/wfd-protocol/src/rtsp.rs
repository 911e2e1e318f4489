//! RTSP/1.0 framing: CRLF-delimited headers with an optional
//! `Content-Length`-governed body. Shared by every step of the M1-M7
//! handshake and by the steady-state loop.

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

pub const RTSP_VERSION: &str = "RTSP/1.0";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("connection closed before a complete message was read")]
    ConnectionClosed,
    #[error("malformed RTSP message: {0}")]
    Malformed(String),
    #[error("unsupported RTSP version: {0}")]
    UnsupportedVersion(String),
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),
    #[error("invalid Content-Length: {0}")]
    InvalidContentLength(String),
    #[error("i/o error reading RTSP message: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    GetParameter,
    SetParameter,
    Setup,
    Play,
    Pause,
    Teardown,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::GetParameter => "GET_PARAMETER",
            Method::SetParameter => "SET_PARAMETER",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Pause => "PAUSE",
            Method::Teardown => "TEARDOWN",
        }
    }

    pub fn parse(s: &str) -> Option<Method> {
        match s {
            "OPTIONS" => Some(Method::Options),
            "GET_PARAMETER" => Some(Method::GetParameter),
            "SET_PARAMETER" => Some(Method::SetParameter),
            "SETUP" => Some(Method::Setup),
            "PLAY" => Some(Method::Play),
            "PAUSE" => Some(Method::Pause),
            "TEARDOWN" => Some(Method::Teardown),
            _ => None,
        }
    }
}

/// Header multimap with case-insensitive lookup. Insertion order is kept
/// so composed messages are deterministic; order is not otherwise meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Headers(Vec::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn content_length(&self) -> Result<Option<usize>, CodecError> {
        match self.get("Content-Length") {
            None => Ok(None),
            Some(v) => v
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| CodecError::InvalidContentLength(v.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub cseq: u32,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub cseq: u32,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn cseq(&self) -> u32 {
        match self {
            Message::Request(r) => r.cseq,
            Message::Response(r) => r.cseq,
        }
    }
}

fn trim_line(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String, CodecError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(CodecError::ConnectionClosed);
    }
    Ok(trim_line(&line).to_string())
}

/// Read one complete RTSP request or response from `reader`.
pub async fn parse_message<R>(reader: &mut R) -> Result<Message, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let first_line = read_line(reader).await?;
    if first_line.is_empty() {
        return Err(CodecError::Malformed("empty first line".to_string()));
    }

    enum Kind {
        Req { method: Method, url: String },
        Resp { status: u16, reason: String },
    }

    let kind = if let Some(rest) = first_line.strip_prefix(RTSP_VERSION) {
        let rest = rest.trim_start();
        let mut parts = rest.splitn(2, ' ');
        let status_str = parts
            .next()
            .ok_or_else(|| CodecError::Malformed(format!("bad status line: {first_line}")))?;
        let status: u16 = status_str
            .parse()
            .map_err(|_| CodecError::Malformed(format!("bad status code: {status_str}")))?;
        let reason = parts.next().unwrap_or("").to_string();
        Kind::Resp { status, reason }
    } else {
        let mut parts = first_line.splitn(3, ' ');
        let method_str = parts
            .next()
            .ok_or_else(|| CodecError::Malformed(format!("bad request line: {first_line}")))?;
        let url = parts
            .next()
            .ok_or_else(|| CodecError::Malformed(format!("bad request line: {first_line}")))?
            .to_string();
        let version = parts
            .next()
            .ok_or_else(|| CodecError::Malformed(format!("bad request line: {first_line}")))?;
        if version != RTSP_VERSION {
            return Err(CodecError::UnsupportedVersion(version.to_string()));
        }
        let method = Method::parse(method_str)
            .ok_or_else(|| CodecError::Malformed(format!("unknown method: {method_str}")))?;
        Kind::Req { method, url }
    };

    let mut headers = Headers::new();
    loop {
        let line = read_line(reader).await?;
        if line.is_empty() {
            break;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| CodecError::Malformed(format!("bad header line: {line}")))?;
        headers.insert(key.trim(), value.trim());
    }

    let cseq_str = headers.get("CSeq").ok_or(CodecError::MissingHeader("CSeq"))?;
    let cseq: u32 = cseq_str
        .trim()
        .parse()
        .map_err(|_| CodecError::Malformed(format!("bad CSeq: {cseq_str}")))?;

    let body = match headers.content_length()? {
        None | Some(0) => None,
        Some(len) => {
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf).await?;
            Some(buf)
        }
    };

    Ok(match kind {
        Kind::Req { method, url } => Message::Request(Request { method, url, cseq, headers, body }),
        Kind::Resp { status, reason } => Message::Response(Response { status, reason, cseq, headers, body }),
    })
}

fn compose_headers(out: &mut String, headers: &Headers) {
    for (k, v) in headers.iter() {
        out.push_str(k);
        out.push_str(": ");
        out.push_str(v);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
}

/// Build a sink-initiated request. `cseq` is the sink's own monotonic CSeq.
pub fn compose_request(method: Method, url: &str, cseq: u32, headers: &Headers, body: Option<&[u8]>) -> Vec<u8> {
    let mut out = format!("{} {} {}\r\n", method.as_str(), url, RTSP_VERSION);
    out.push_str(&format!("CSeq: {cseq}\r\n"));
    compose_headers(&mut out, headers);
    let mut bytes = out.into_bytes();
    if let Some(body) = body {
        bytes.extend_from_slice(body);
    }
    bytes
}

/// Build a response to a peer-originated request, echoing its CSeq.
pub fn compose_response(status: u16, reason: &str, cseq: u32, headers: &Headers, body: Option<&[u8]>) -> Vec<u8> {
    let mut out = format!("{RTSP_VERSION} {status} {reason}\r\n");
    out.push_str(&format!("CSeq: {cseq}\r\n"));
    compose_headers(&mut out, headers);
    let mut bytes = out.into_bytes();
    if let Some(body) = body {
        bytes.extend_from_slice(body);
    }
    bytes
}

/// `RTSP/1.0 200 OK` with the request's CSeq echoed and no extra headers,
/// the standard response for any request the sink accepts but has nothing
/// further to say about.
pub fn ok_response(cseq: u32) -> Vec<u8> {
    compose_response(200, "OK", cseq, &Headers::new(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn parse(bytes: &[u8]) -> Result<Message, CodecError> {
        let mut reader = BufReader::new(bytes);
        parse_message(&mut reader).await
    }

    #[tokio::test]
    async fn parses_options_request() {
        let msg = parse(b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\nRequire: org.wfa.wfd1.0\r\n\r\n")
            .await
            .unwrap();
        match msg {
            Message::Request(r) => {
                assert_eq!(r.method, Method::Options);
                assert_eq!(r.url, "*");
                assert_eq!(r.cseq, 1);
                assert_eq!(r.headers.get("Require"), Some("org.wfa.wfd1.0"));
                assert!(r.body.is_none());
            }
            _ => panic!("expected request"),
        }
    }

    #[tokio::test]
    async fn parses_response_with_body() {
        let raw = b"RTSP/1.0 200 OK\r\nCSeq: 2\r\nContent-Length: 5\r\n\r\nhello";
        let msg = parse(raw).await.unwrap();
        match msg {
            Message::Response(r) => {
                assert_eq!(r.status, 200);
                assert_eq!(r.reason, "OK");
                assert_eq!(r.cseq, 2);
                assert_eq!(r.body.as_deref(), Some(b"hello".as_slice()));
            }
            _ => panic!("expected response"),
        }
    }

    #[tokio::test]
    async fn header_lookup_is_case_insensitive() {
        let msg = parse(b"OPTIONS * RTSP/1.0\r\ncseq: 7\r\n\r\n").await.unwrap();
        assert_eq!(msg.cseq(), 7);
    }

    #[tokio::test]
    async fn rejects_non_rtsp_version() {
        let err = parse(b"OPTIONS * HTTP/1.1\r\nCSeq: 1\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedVersion(_)));
    }

    #[tokio::test]
    async fn rejects_malformed_request_line() {
        let err = parse(b"garbage\r\nCSeq: 1\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[tokio::test]
    async fn eof_before_first_line_is_connection_closed() {
        let err = parse(b"").await.unwrap_err();
        assert!(matches!(err, CodecError::ConnectionClosed));
    }

    #[tokio::test]
    async fn missing_cseq_is_malformed() {
        let err = parse(b"OPTIONS * RTSP/1.0\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, CodecError::MissingHeader("CSeq")));
    }

    #[test]
    fn compose_request_roundtrips_through_parse() {
        let mut headers = Headers::new();
        headers.insert("Require", "org.wfa.wfd1.0");
        let bytes = compose_request(Method::Options, "*", 100, &headers, None);
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert_eq!(text, "OPTIONS * RTSP/1.0\r\nCSeq: 100\r\nRequire: org.wfa.wfd1.0\r\n\r\n");

        let rt = tokio::runtime::Runtime::new().unwrap();
        let msg = rt.block_on(parse(&bytes)).unwrap();
        match msg {
            Message::Request(r) => {
                assert_eq!(r.method, Method::Options);
                assert_eq!(r.cseq, 100);
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn compose_response_includes_body_and_content_length_header() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/parameters");
        headers.insert("Content-Length", "5");
        let bytes = compose_response(200, "OK", 3, &headers, Some(b"hello"));
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "RTSP/1.0 200 OK\r\nCSeq: 3\r\nContent-Type: text/parameters\r\nContent-Length: 5\r\n\r\nhello"
        );
    }

    #[test]
    fn ok_response_echoes_cseq() {
        let bytes = ok_response(42);
        assert_eq!(bytes, b"RTSP/1.0 200 OK\r\nCSeq: 42\r\n\r\n");
    }
}
