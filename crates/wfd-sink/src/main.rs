use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use wfd_protocol::config::SinkConfig;

use wfd_sink::cli;
use wfd_sink::supervisor::Supervisor;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = cli::parse_args();

    let mut config = load_config(&args.config_path)?;
    if let Some(port) = args.rtsp_port_override {
        config.network.rtsp_port = port;
    }
    if let Some(peer) = args.peer_address_override {
        config.network.peer_address = peer;
    }
    if let Some(pin) = args.pin_override {
        config.p2p.pin = pin;
    }

    let issues = config.validate();
    let has_errors = issues.iter().any(|i| i.starts_with("ERROR:"));
    for issue in &issues {
        if issue.starts_with("ERROR:") {
            tracing::error!("{issue}");
        } else {
            tracing::warn!("{issue}");
        }
    }
    if has_errors {
        tracing::error!("configuration has {} issue(s), fix the ERROR(s) above and restart", issues.len());
        std::process::exit(1);
    }

    Supervisor::new(config).run().await.context("supervisor exited")?;
    Ok(())
}

fn load_config(path: &std::path::Path) -> Result<SinkConfig> {
    match std::fs::read_to_string(path) {
        Ok(text) => SinkConfig::from_toml_str(&text).context("parsing config file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Ok(SinkConfig::default())
        }
        Err(e) => Err(e).context(format!("reading config file {}", path.display())),
    }
}
