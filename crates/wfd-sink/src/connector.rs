//! Opens the TCP control channel to the Wi-Fi Display source with bounded
//! retries. The long retry budget is deliberate: the DHCP lease to the
//! peer may not complete before the supplicant signals "group formed".

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::{TcpSocket, TcpStream};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::ConnectError;

pub async fn connect(
    peer: IpAddr,
    port: u16,
    max_attempts: u32,
    retry_interval: Duration,
) -> Result<TcpStream, ConnectError> {
    let addr = SocketAddr::new(peer, port);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match try_connect_once(addr).await {
            Ok(stream) => {
                info!(attempt, %addr, "connected to Wi-Fi Display source");
                return Ok(stream);
            }
            Err(e) => {
                debug!(attempt, %addr, error = %e, "connect attempt failed");
                if attempt >= max_attempts {
                    warn!(attempts = attempt, %addr, "exhausted connection attempts");
                    return Err(ConnectError::Timeout { peer: peer.to_string(), port, attempts: attempt });
                }
                sleep(retry_interval).await;
            }
        }
    }
}

async fn try_connect_once(addr: SocketAddr) -> std::io::Result<TcpStream> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    let stream = socket.connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_immediately_when_peer_is_listening() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let stream = connect(addr.ip(), addr.port(), 5, Duration::from_millis(5)).await.unwrap();
        assert!(stream.peer_addr().is_ok());
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn retries_until_peer_starts_listening() {
        // Bind and immediately drop to reserve a port, then connect against
        // it before anything is listening; the real listener is started
        // from a background task a few retries later.
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let listen_after = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            TcpListener::bind(addr).await.unwrap()
        });

        let stream = connect(addr.ip(), addr.port(), 50, Duration::from_millis(5)).await.unwrap();
        assert!(stream.peer_addr().is_ok());
        listen_after.await.unwrap();
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let err = connect(addr.ip(), addr.port(), 3, Duration::from_millis(1)).await.unwrap_err();
        match err {
            ConnectError::Timeout { attempts, .. } => assert_eq!(attempts, 3),
        }
    }
}
