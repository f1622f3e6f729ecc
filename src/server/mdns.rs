use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use mac_address::MacAddress;
use mdns_sd::{ServiceDaemon, ServiceInfo};

use crate::error::ApiResult;
use crate::server::service::Service;

pub const HUE_SERVICE_TYPE: &str = "_hue._tcp.local.";

/// Service record announced by real bridges: `Philips Hue - XXXXXX`, where
/// the suffix is the tail of the bridge id.
pub fn service_info(ip: Ipv4Addr, port: u16, mac: MacAddress) -> ApiResult<ServiceInfo> {
    let bridgeid = hue::bridge_id(mac);
    let instance = format!(
        "Philips Hue - {}",
        bridgeid[bridgeid.len() - 6..].to_uppercase()
    );
    let hostname = format!("{bridgeid}.local.");

    let properties = [
        ("bridgeid", bridgeid.as_str()),
        ("modelid", hue::HUE_BRIDGE_V2_MODEL_ID),
    ];

    let addrs: Vec<IpAddr> = if ip.is_unspecified() {
        vec![]
    } else {
        vec![IpAddr::V4(ip)]
    };

    let info = ServiceInfo::new(
        HUE_SERVICE_TYPE,
        &instance,
        &hostname,
        addrs.as_slice(),
        port,
        &properties[..],
    )?;

    if ip.is_unspecified() {
        Ok(info.enable_addr_auto())
    } else {
        Ok(info)
    }
}

pub struct MdnsService {
    ip: Ipv4Addr,
    port: u16,
    mac: MacAddress,
    daemon: Option<ServiceDaemon>,
}

impl MdnsService {
    #[must_use]
    pub const fn new(ip: Ipv4Addr, port: u16, mac: MacAddress) -> Self {
        Self {
            ip,
            port,
            mac,
            daemon: None,
        }
    }
}

#[async_trait]
impl Service for MdnsService {
    async fn start(&mut self) -> ApiResult<()> {
        let info = service_info(self.ip, self.port, self.mac)?;
        log::info!("Registering mdns service [{}]", info.get_fullname());

        let daemon = ServiceDaemon::new()?;
        daemon.register(info)?;
        self.daemon = Some(daemon);

        Ok(())
    }

    async fn run(&mut self) -> ApiResult<()> {
        // the daemon runs on its own thread
        std::future::pending().await
    }

    async fn stop(&mut self) -> ApiResult<()> {
        if let Some(daemon) = self.daemon.take() {
            log::debug!("Shutting down mdns daemon");
            daemon.shutdown()?;
        }
        Ok(())
    }
}
