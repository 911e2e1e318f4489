//! Parsing for the RTSP `Transport` header, e.g.
//! `RTP/AVP/UDP;unicast;client_port=1028;server_port=5000`.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Udp,
    Tcp,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("malformed Transport header: {0}")]
    Malformed(String),
    #[error("unsupported transport protocol: {0}")]
    UnsupportedProtocol(String),
}

/// The negotiated transport for a session. This sink only ever uses UDP unicast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportDescriptor {
    pub protocol: Protocol,
    pub unicast: bool,
    pub client_port: u16,
    pub server_port: Option<u16>,
}

impl TransportDescriptor {
    pub fn parse(value: &str) -> Result<Self, TransportError> {
        let mut protocol = None;
        let mut unicast = false;
        let mut client_port = None;
        let mut server_port = None;

        for part in value.split(';') {
            let part = part.trim();
            if part.starts_with("RTP") {
                let mut segs = part.split('/');
                let _rtp = segs.next();
                let _avp = segs.next();
                let prot = segs
                    .next()
                    .ok_or_else(|| TransportError::Malformed(value.to_string()))?;
                protocol = Some(match prot {
                    "UDP" => Protocol::Udp,
                    "TCP" => Protocol::Tcp,
                    other => return Err(TransportError::UnsupportedProtocol(other.to_string())),
                });
            } else if part == "unicast" {
                unicast = true;
            } else if let Some(v) = part.strip_prefix("client_port=") {
                client_port = Some(
                    v.parse()
                        .map_err(|_| TransportError::Malformed(format!("bad client_port: {v}")))?,
                );
            } else if let Some(v) = part.strip_prefix("server_port=") {
                server_port = Some(
                    v.parse()
                        .map_err(|_| TransportError::Malformed(format!("bad server_port: {v}")))?,
                );
            }
        }

        Ok(TransportDescriptor {
            protocol: protocol.ok_or_else(|| TransportError::Malformed(value.to_string()))?,
            unicast,
            client_port: client_port.ok_or_else(|| TransportError::Malformed(value.to_string()))?,
            server_port,
        })
    }

    pub fn format_request_header(client_port: u16) -> String {
        format!("RTP/AVP/UDP;unicast;client_port={client_port}")
    }
}
