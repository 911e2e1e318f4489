use std::path::PathBuf;

pub struct Args {
    pub config_path: PathBuf,
    pub rtsp_port_override: Option<u16>,
    pub peer_address_override: Option<String>,
    pub pin_override: Option<String>,
}

pub fn parse_args() -> Args {
    let mut config_path = PathBuf::from("/etc/wfd-sink/config.toml");
    let mut rtsp_port_override = None;
    let mut peer_address_override = None;
    let mut pin_override = None;

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-V" | "--version" => {
                println!("wfd-sink {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "-h" | "--help" => {
                println!("wfd-sink - Wi-Fi Display (Miracast) sink");
                println!();
                println!("USAGE:");
                println!("    wfd-sink [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -c, --config <PATH>        Config file [default: /etc/wfd-sink/config.toml]");
                println!("    --rtsp-port <PORT>         Override network.rtsp_port");
                println!("    --peer-address <ADDR>      Override network.peer_address");
                println!("    --pin <PIN>                Override p2p.pin (prefer WFD_SINK_PIN env)");
                println!("    -V, --version              Print version and exit");
                println!("    -h, --help                 Print this help and exit");
                std::process::exit(0);
            }
            "-c" | "--config" => {
                i += 1;
                if let Some(v) = args.get(i) {
                    config_path = PathBuf::from(v);
                }
            }
            "--rtsp-port" => {
                i += 1;
                if let Some(v) = args.get(i) {
                    rtsp_port_override = v.parse().ok();
                }
            }
            "--peer-address" => {
                i += 1;
                if let Some(v) = args.get(i) {
                    peer_address_override = Some(v.clone());
                }
            }
            "--pin" => {
                // Legacy CLI support; prefer WFD_SINK_PIN (CLI args are visible in /proc)
                i += 1;
                if let Some(v) = args.get(i) {
                    pin_override = Some(v.clone());
                }
            }
            _ => {}
        }
        i += 1;
    }

    if pin_override.is_none() {
        pin_override = std::env::var("WFD_SINK_PIN").ok();
    }

    Args { config_path, rtsp_port_override, peer_address_override, pin_override }
}
