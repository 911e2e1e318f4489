//! Spawns `sudo udhcpd` against a single-lease config file, grounded in
//! `picast/dhcpd.py`.

use std::path::PathBuf;

use tokio::fs;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::ExternalCommandError;

pub struct DhcpServer {
    interface: String,
    peer_address: String,
    netmask: String,
    lease_timeout_secs: u32,
    conf_path: Option<PathBuf>,
    child: Option<Child>,
}

impl DhcpServer {
    pub fn new(interface: String, peer_address: String, netmask: String, lease_timeout_secs: u32) -> Self {
        DhcpServer { interface, peer_address, netmask, lease_timeout_secs, conf_path: None, child: None }
    }

    pub async fn start(&mut self) -> Result<(), ExternalCommandError> {
        if self.child.is_some() {
            return Ok(());
        }
        let conf = render_conf(&self.peer_address, &self.interface, &self.netmask, self.lease_timeout_secs);
        let conf_path = std::env::temp_dir().join(format!("wfd-sink-udhcpd-{}.conf", std::process::id()));
        fs::write(&conf_path, conf).await.map_err(|source| ExternalCommandError::Io {
            command: "write udhcpd.conf".to_string(),
            source,
        })?;
        debug!(path = %conf_path.display(), "wrote udhcpd config");

        let child = Command::new("sudo")
            .arg("udhcpd")
            .arg(&conf_path)
            .spawn()
            .map_err(|source| ExternalCommandError::Io { command: "udhcpd".to_string(), source })?;
        info!(interface = %self.interface, "started dhcp server");
        self.conf_path = Some(conf_path);
        self.child = Some(child);
        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            info!("stopping dhcp server");
            let _ = child.start_kill();
        }
        if let Some(path) = self.conf_path.take() {
            let _ = fs::remove_file(path).await;
        }
    }
}

fn render_conf(peer_address: &str, interface: &str, netmask: &str, lease_timeout_secs: u32) -> String {
    format!(
        "start {peer}\nend {peer}\ninterface {interface}\noption subnet {netmask}\noption lease {lease}\n",
        peer = peer_address,
        interface = interface,
        netmask = netmask,
        lease = lease_timeout_secs,
    )
}
