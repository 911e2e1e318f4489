//! The Media Control Interface: a thin start/stop contract the Session Core
//! uses to drive whatever local player consumes the incoming RTP stream.

use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{info, warn};

use wfd_protocol::config::{PlayerBackend, PlayerConfig};

/// Opaque capability the Session Core drives. `start` is idempotent (a
/// second call while already running is a no-op); `stop` is safe to call
/// when not running.
pub trait MediaControl: Send {
    fn start(&mut self);
    fn stop(&mut self);
}

pub fn build_player(config: &PlayerConfig, rtp_port: u16) -> Box<dyn MediaControl> {
    match config.backend {
        PlayerBackend::Gstreamer => Box::new(GstPlayer::new(rtp_port, config.gst_decoder.clone())),
        PlayerBackend::Vlc => Box::new(VlcPlayer::new(rtp_port, config.vlc_custom_args.clone(), config.vlc_log_file.clone())),
        PlayerBackend::Noop => Box::new(NoopPlayer::default()),
    }
}

/// Drives a `gst-launch-1.0` pipeline equivalent to the original's
/// `udpsrc ! rtph264depay ! <decoder> ! videoconvert ! autovideosink`.
pub struct GstPlayer {
    rtp_port: u16,
    decoder: String,
    child: Option<Child>,
}

impl GstPlayer {
    pub fn new(rtp_port: u16, decoder: String) -> Self {
        GstPlayer { rtp_port, decoder, child: None }
    }
}

impl MediaControl for GstPlayer {
    fn start(&mut self) {
        if self.child.is_some() {
            return;
        }
        let caps = "application/x-rtp, media=video";
        let args: Vec<String> = vec![
            "-e".to_string(),
            "udpsrc".to_string(),
            format!("port={}", self.rtp_port),
            format!("caps={caps}"),
            "!".to_string(),
            "rtph264depay".to_string(),
            "!".to_string(),
            self.decoder.clone(),
            "!".to_string(),
            "videoconvert".to_string(),
            "!".to_string(),
            "autovideosink".to_string(),
        ];
        info!(rtp_port = self.rtp_port, decoder = %self.decoder, "starting gstreamer pipeline");
        match Command::new("gst-launch-1.0").args(&args).stdout(Stdio::null()).stderr(Stdio::null()).spawn() {
            Ok(child) => self.child = Some(child),
            Err(e) => warn!(error = %e, "failed to start gstreamer pipeline"),
        }
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            info!("stopping gstreamer pipeline");
            let _ = child.start_kill();
        }
    }
}

/// Drives `cvlc`, matching `src/picast/players/vlc.py`.
pub struct VlcPlayer {
    rtp_port: u16,
    custom_args: Vec<String>,
    log_file: String,
    child: Option<Child>,
}

impl VlcPlayer {
    pub fn new(rtp_port: u16, custom_args: Vec<String>, log_file: String) -> Self {
        VlcPlayer { rtp_port, custom_args, log_file, child: None }
    }
}

impl MediaControl for VlcPlayer {
    fn start(&mut self) {
        if self.child.is_some() {
            return;
        }
        let url = format!("rtp://0.0.0.0:{}/wfd1.0/streamid=0", self.rtp_port);
        info!(url = %url, "starting vlc client");
        match Command::new("cvlc")
            .arg("--fullscreen")
            .args(&self.custom_args)
            .arg("--file-logging")
            .arg("--logfile")
            .arg(&self.log_file)
            .arg(&url)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => self.child = Some(child),
            Err(e) => warn!(error = %e, "failed to start vlc"),
        }
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            info!("stopping vlc client");
            let _ = child.start_kill();
        }
    }
}

/// No-op player for tests: records call counts instead of spawning anything.
#[derive(Default)]
pub struct NoopPlayer {
    pub start_calls: u32,
    pub stop_calls: u32,
}

impl MediaControl for NoopPlayer {
    fn start(&mut self) {
        self.start_calls += 1;
    }

    fn stop(&mut self) {
        self.stop_calls += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_player_counts_calls() {
        let mut player = NoopPlayer::default();
        player.start();
        player.start();
        player.stop();
        assert_eq!(player.start_calls, 2);
        assert_eq!(player.stop_calls, 1);
    }
}
