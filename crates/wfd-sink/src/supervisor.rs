//! Single long-running loop: bring up the P2P interface, DHCP, and mDNS
//! once, then repeatedly connect and drive one session to completion.
//! Grounded in `original_source/picast/rtspsink.py::run` and
//! `picast/wifip2p.py::set_p2p_interface`/`start`.

use std::net::IpAddr;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::sleep;
use tracing::{info, warn};

use wfd_protocol::capability::Capabilities;
use wfd_protocol::config::SinkConfig;

use crate::connector;
use crate::dhcp::DhcpServer;
use crate::display_probe;
use crate::error::ExternalCommandError;
use crate::media;
use crate::mdns::MdnsAdvertiser;
use crate::session::{Session, SessionParams};
use crate::supplicant::{self, Supplicant};

pub struct Supervisor {
    config: SinkConfig,
}

impl Supervisor {
    pub fn new(config: SinkConfig) -> Self {
        Supervisor { config }
    }

    pub async fn run(self) -> Result<(), ExternalCommandError> {
        let mut mdns = match MdnsAdvertiser::new() {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(error = %e, "mdns advertisement unavailable, continuing without it");
                None
            }
        };
        if let Some(advertiser) = mdns.as_mut() {
            match self.config.network.my_address.parse() {
                Ok(addr) => advertiser.register(&self.config.p2p.device_name, addr, self.config.network.rtsp_port),
                Err(e) => warn!(error = %e, "network.my_address is not a valid IPv4 address, skipping mdns"),
            }
        }

        let supplicant = Supplicant::new();
        let interface = self.ensure_p2p_interface(&supplicant).await?;

        let mut dhcp = DhcpServer::new(
            interface.clone(),
            self.config.network.peer_address.clone(),
            self.config.network.netmask.clone(),
            self.config.network.lease_timeout_secs,
        );
        dhcp.start().await?;
        sleep(Duration::from_millis(500)).await;

        let probe = match &self.config.capability.display_probe_command {
            Some(command) => display_probe::probe(command).await,
            None => None,
        };
        if probe.is_none() && self.config.capability.display_probe_command.is_some() {
            warn!("display probe command produced no modes, falling back to the generic bitmap");
        }
        let capabilities = Capabilities::from_platform_probe(probe.as_ref(), &self.config.capability);

        let peer_ip: IpAddr = self
            .config
            .network
            .peer_address
            .parse()
            .map_err(|_| ExternalCommandError::Failed {
                command: "parse network.peer_address".to_string(),
                detail: self.config.network.peer_address.clone(),
            })?;

        loop {
            if let Err(e) = supplicant.wps_pin(&interface, &self.config.p2p.pin, self.config.p2p.wps_timeout_secs).await {
                warn!(error = %e, "failed to arm wps pin, retrying next cycle");
            }

            let connect_result = connector::connect(
                peer_ip,
                self.config.network.rtsp_port,
                self.config.supervisor.connect_max_attempts,
                Duration::from_millis(self.config.supervisor.connect_retry_interval_ms),
            )
            .await;

            match connect_result {
                Ok(stream) => {
                    let player = media::build_player(&self.config.player, self.config.network.rtp_port);
                    let params = SessionParams {
                        peer_address: self.config.network.peer_address.clone(),
                        rtp_port: self.config.network.rtp_port,
                        handshake_timeout: Duration::from_secs(self.config.supervisor.handshake_timeout_secs),
                        watchdog_threshold: Duration::from_secs(self.config.supervisor.watchdog_threshold_secs),
                        tick: Duration::from_millis(self.config.supervisor.steady_state_tick_ms),
                    };
                    let session = Session::new(params, capabilities.clone(), player);
                    match session.run(stream).await {
                        Ok(()) => info!("session ended cleanly"),
                        Err(e) => warn!(error = %e, "session ended with an error"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "connector exhausted retries, backing off before retrying");
                    sleep(Duration::from_secs(self.config.supervisor.connect_backoff_secs)).await;
                }
            }
        }
    }

    async fn ensure_p2p_interface(&self, supplicant: &Supplicant) -> Result<String, ExternalCommandError> {
        if let Some(existing) = supplicant.p2p_interface().await? {
            info!(interface = %existing, "p2p interface already present");
            return Ok(existing);
        }

        info!("no p2p interface found, creating one");
        supplicant.start_p2p_find().await?;
        supplicant.set_device_name(&self.config.p2p.device_name).await?;
        supplicant.set_device_type(&self.config.p2p.device_type).await?;
        supplicant.set_p2p_go_ht40().await?;
        supplicant.wfd_subelem_set(0, &supplicant::wfd_devinfo(self.config.network.rtsp_port)).await?;
        supplicant.wfd_subelem_set(1, &supplicant::wfd_bssid(0)).await?;
        supplicant.wfd_subelem_set(6, &supplicant::wfd_sink_info(0, 0)).await?;
        supplicant.p2p_group_add(&self.config.p2p.group_name).await?;
        sleep(Duration::from_secs(3)).await;

        let interface = supplicant.p2p_interface().await?.ok_or_else(|| ExternalCommandError::Failed {
            command: "p2p_group_add".to_string(),
            detail: "no p2p interface appeared after group creation".to_string(),
        })?;
        info!(%interface, "created p2p interface");

        let status = Command::new("sudo")
            .arg("ifconfig")
            .arg(&interface)
            .arg(&self.config.network.my_address)
            .status()
            .await
            .map_err(|source| ExternalCommandError::Io { command: "ifconfig".to_string(), source })?;
        if !status.success() {
            return Err(ExternalCommandError::Failed {
                command: "ifconfig".to_string(),
                detail: format!("exit status {status}"),
            });
        }

        Ok(interface)
    }
}
