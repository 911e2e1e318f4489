//! Wraps `sudo wpa_cli` to bring up and drive the Wi-Fi Direct (P2P)
//! interface, grounded in `picast/wpacli.py` and `picast/wifip2p.py`.

use tokio::process::Command;
use tracing::debug;

use crate::error::ExternalCommandError;

pub struct Supplicant;

impl Supplicant {
    pub fn new() -> Self {
        Supplicant
    }

    async fn cmd(&self, argv: &[&str]) -> Result<Vec<String>, ExternalCommandError> {
        debug!(argv = ?argv, "wpa_cli");
        let mut command = Command::new("sudo");
        command.arg("wpa_cli").args(argv);
        let output = command.output().await.map_err(|source| ExternalCommandError::Io {
            command: format!("wpa_cli {}", argv.join(" ")),
            source,
        })?;
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text.lines().map(|l| l.to_string()).collect())
    }

    async fn cmd_expect_ok(&self, argv: &[&str]) -> Result<(), ExternalCommandError> {
        let lines = self.cmd(argv).await?;
        if lines.iter().any(|l| l == "OK") {
            Ok(())
        } else {
            Err(ExternalCommandError::Failed {
                command: format!("wpa_cli {}", argv.join(" ")),
                detail: lines.join("; "),
            })
        }
    }

    pub async fn start_p2p_find(&self) -> Result<(), ExternalCommandError> {
        self.cmd_expect_ok(&["p2p_find", "type=progressive"]).await
    }

    pub async fn stop_p2p_find(&self) -> Result<(), ExternalCommandError> {
        self.cmd_expect_ok(&["p2p_stop_find"]).await
    }

    pub async fn set_device_name(&self, name: &str) -> Result<(), ExternalCommandError> {
        self.cmd_expect_ok(&["set", "device_name", name]).await
    }

    pub async fn set_device_type(&self, device_type: &str) -> Result<(), ExternalCommandError> {
        self.cmd_expect_ok(&["set", "device_type", device_type]).await
    }

    pub async fn set_p2p_go_ht40(&self) -> Result<(), ExternalCommandError> {
        self.cmd_expect_ok(&["set", "p2p_go_ht40", "1"]).await
    }

    pub async fn wfd_subelem_set(&self, key: u32, value: &str) -> Result<(), ExternalCommandError> {
        let key_str = key.to_string();
        self.cmd_expect_ok(&["wfd_subelem_set", &key_str, value]).await
    }

    /// `p2p_group_add` replies `<group-started event>`, not a bare `OK`, so
    /// the original ignores its return status; we do the same.
    pub async fn p2p_group_add(&self, group_name: &str) -> Result<(), ExternalCommandError> {
        self.cmd(&["p2p_group_add", group_name]).await?;
        Ok(())
    }

    pub async fn wps_pin(&self, interface: &str, pin: &str, timeout_secs: u32) -> Result<(), ExternalCommandError> {
        let timeout_str = timeout_secs.to_string();
        self.cmd(&["-i", interface, "wps_pin", "any", pin, &timeout_str]).await?;
        Ok(())
    }

    /// Parses `wpa_cli interface` output: a `Selected interface '...'` line
    /// followed by the list of available interface names.
    pub async fn p2p_interface(&self) -> Result<Option<String>, ExternalCommandError> {
        let lines = self.cmd(&["interface"]).await?;
        for line in &lines {
            if let Some(name) = parse_interface_line(line) {
                if name.starts_with("p2p-wl") {
                    return Ok(Some(name.to_string()));
                }
            }
        }
        Ok(None)
    }
}

fn parse_interface_line(line: &str) -> Option<&str> {
    if line.starts_with("Selected interface") || line.starts_with("Available interfaces:") {
        None
    } else if line.is_empty() {
        None
    } else {
        Some(line.trim())
    }
}

/// WFD device information subelement (id 0), combining primary-sink
/// role, session-available, WSD support, P2P coupled-sink capability.
pub fn wfd_devinfo(rtsp_port: u16) -> String {
    let device_type = 0b01u32;
    let session_available = 0b01 << 4;
    let wsd_supported = 0b01 << 6;
    let coupled_sink_supported = 0b01 << 8;
    let devinfo = device_type | session_available | wsd_supported | coupled_sink_supported;
    format!("0006{devinfo:04x}{rtsp_port:04x}{max_tp:04x}", max_tp = 300u32)
}

/// WFD associated BSSID subelement (id 1).
pub fn wfd_bssid(bssid: u64) -> String {
    format!("0006{bssid:012x}")
}

/// WFD coupled-sink information subelement (id 6).
pub fn wfd_sink_info(status: u8, mac: u64) -> String {
    format!("0007{status:02x}{mac:012x}")
}
