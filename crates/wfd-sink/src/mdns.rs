//! Advertises the RTSP control port over mDNS/DNS-SD so generic Wi-Fi
//! Display sources can discover this sink without the P2P-specific WFD
//! information elements. Enrichment beyond the original, which relied
//! solely on WFD subelements broadcast by the supplicant.

use std::net::Ipv4Addr;

use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::{info, warn};

pub struct MdnsAdvertiser {
    daemon: ServiceDaemon,
    fullname: Option<String>,
}

impl MdnsAdvertiser {
    pub fn new() -> Result<Self, mdns_sd::Error> {
        let daemon = ServiceDaemon::new()?;
        Ok(MdnsAdvertiser { daemon, fullname: None })
    }

    pub fn register(&mut self, device_name: &str, my_address: Ipv4Addr, rtsp_port: u16) {
        let host_name = format!("{device_name}.local.");
        let properties: [(&str, &str); 0] = [];
        let info = match ServiceInfo::new(
            "_rtsp._tcp.local.",
            device_name,
            &host_name,
            my_address.to_string().as_str(),
            rtsp_port,
            &properties[..],
        ) {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "failed to build mdns service info");
                return;
            }
        };
        let fullname = info.get_fullname().to_string();
        match self.daemon.register(info) {
            Ok(()) => {
                info!(%fullname, rtsp_port, "advertised rtsp service over mdns");
                self.fullname = Some(fullname);
            }
            Err(e) => warn!(error = %e, "failed to register mdns service"),
        }
    }

    pub fn unregister(&mut self) {
        if let Some(fullname) = self.fullname.take() {
            let _ = self.daemon.unregister(&fullname);
        }
    }
}

impl Drop for MdnsAdvertiser {
    fn drop(&mut self) {
        self.unregister();
    }
}
