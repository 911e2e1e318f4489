//! Runs the platform's display-mode probe command (`tvservice -m CEA -j` /
//! `-m DMT -j` on Raspberry Pi OS) and parses its JSON into `DisplayModes`,
//! grounded in `original_source/picast/video.py::retrieve_tvservice`.

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};
use wfd_protocol::capability::{DisplayModes, PlatformMode};

#[derive(Debug, Deserialize)]
struct TvServiceMode {
    #[allow(dead_code)]
    code: u32,
    width: u16,
    height: u16,
    rate: u8,
    scan: String,
}

impl From<&TvServiceMode> for PlatformMode {
    fn from(m: &TvServiceMode) -> Self {
        PlatformMode { width: m.width, height: m.height, refresh_hz: m.rate, progressive: m.scan == "p" }
    }
}

/// Runs `<command> -m CEA -j` and `<command> -m DMT -j` and folds the
/// results into a `DisplayModes`. `command` is the probe binary name
/// (`tvservice` on the original platform); absent on most hosts, in which
/// case the Supervisor should fall back to `Capabilities::from_platform_probe(None, ..)`.
pub async fn probe(command: &str) -> Option<DisplayModes> {
    let cea = run_probe(command, "CEA").await;
    let vesa = run_probe(command, "DMT").await;
    if cea.is_none() && vesa.is_none() {
        return None;
    }
    Some(DisplayModes {
        cea: cea.unwrap_or_default().iter().map(PlatformMode::from).collect(),
        vesa: vesa.unwrap_or_default().iter().map(PlatformMode::from).collect(),
        hh: Vec::new(),
    })
}

async fn run_probe(command: &str, group: &str) -> Option<Vec<TvServiceMode>> {
    let output = match Command::new(command).arg("-m").arg(group).arg("-j").output().await {
        Ok(output) => output,
        Err(e) => {
            warn!(command, group, error = %e, "display probe command unavailable");
            return None;
        }
    };
    if !output.status.success() {
        warn!(command, group, status = ?output.status, "display probe command exited non-zero");
        return None;
    }
    match serde_json::from_slice::<Vec<TvServiceMode>>(&output.stdout) {
        Ok(modes) => {
            debug!(group, count = modes.len(), "parsed display probe modes");
            Some(modes)
        }
        Err(e) => {
            warn!(group, error = %e, "failed to parse display probe JSON");
            None
        }
    }
}
