use std::net::{Ipv4Addr, UdpSocket};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, FileFormat};
use mac_address::MacAddress;
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::error::{ApiError, ApiResult};

pub const ENV_HASS_URL: &str = "HASS_URL";
pub const ENV_HASS_TOKEN: &str = "HASS_TOKEN";
pub const ENV_LABEL_FILTER: &str = "HUE_LABEL_FILTER";

const FALLBACK_MAC_BYTES: [u8; 6] = [0xb6, 0x82, 0xd3, 0x45, 0xac, 0x29];

/// Used when no usable network interface mac address can be found.
#[must_use]
pub fn fallback_mac() -> MacAddress {
    MacAddress::new(FALLBACK_MAC_BYTES)
}

pub const DEFAULT_HTTP_PORT: u16 = 80;
pub const DEFAULT_HTTPS_PORT: u16 = 443;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub name: String,
    pub mac: Option<MacAddress>,
    pub ipaddress: Option<Ipv4Addr>,
    pub netmask: Ipv4Addr,
    pub gateway: Option<Ipv4Addr>,
    pub http_port: u16,
    pub https_port: u16,
    pub use_default_ports_for_discovery: bool,
    pub cert_file: Utf8PathBuf,
    pub light_id_file: Option<Utf8PathBuf>,
    pub users_file: Option<Utf8PathBuf>,
    pub debounce_ms: u64,
}

impl BridgeConfig {
    #[must_use]
    pub fn mac(&self) -> MacAddress {
        self.mac.unwrap_or_else(fallback_mac)
    }

    #[must_use]
    pub fn ipaddress(&self) -> Ipv4Addr {
        self.ipaddress.unwrap_or(Ipv4Addr::UNSPECIFIED)
    }

    #[must_use]
    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway.unwrap_or(Ipv4Addr::UNSPECIFIED)
    }

    /// Http port announced to discovering clients.
    #[must_use]
    pub const fn discovery_http_port(&self) -> u16 {
        if self.use_default_ports_for_discovery {
            DEFAULT_HTTP_PORT
        } else {
            self.http_port
        }
    }

    /// Https port announced to discovering clients.
    #[must_use]
    pub const fn discovery_https_port(&self) -> u16 {
        if self.use_default_ports_for_discovery {
            DEFAULT_HTTPS_PORT
        } else {
            self.https_port
        }
    }

    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HassConfig {
    pub url: Url,
    pub token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_label_filter")]
    pub label_filter: Vec<String>,
    pub refresh_interval_secs: u64,
    pub timeout_secs: u64,
}

impl HassConfig {
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub bridge: BridgeConfig,
    pub hass: HassConfig,
    #[serde(default)]
    pub verbose: bool,
}

/// Accept either a yaml list or a comma-separated string (as found in
/// environment variables).
fn deserialize_label_filter<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Filter {
        List(Vec<String>),
        Csv(String),
    }

    let items = match Filter::deserialize(deserializer)? {
        Filter::List(list) => list,
        Filter::Csv(csv) => csv.split(',').map(ToString::to_string).collect(),
    };

    Ok(items
        .iter()
        .map(|label| label.trim().to_lowercase())
        .filter(|label| !label.is_empty())
        .collect())
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    Config::builder()
        .set_default("bridge.name", "Emulated Hue Bridge")?
        .set_default("bridge.netmask", "255.255.255.0")?
        .set_default("bridge.http_port", DEFAULT_HTTP_PORT)?
        .set_default("bridge.https_port", DEFAULT_HTTPS_PORT)?
        .set_default("bridge.use_default_ports_for_discovery", false)?
        .set_default("bridge.cert_file", "cert.pem")?
        .set_default("bridge.debounce_ms", 100)?
        .set_default("hass.url", "http://127.0.0.1:8123")?
        .set_default("hass.refresh_interval_secs", 30)?
        .set_default("hass.timeout_secs", 5)?
        .set_default("verbose", false)
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

pub fn parse(filename: &Utf8Path) -> ApiResult<AppConfig> {
    let builder = defaults()?
        .add_source(config::File::with_name(filename.as_str()).required(false))
        .add_source(
            Environment::with_prefix("HUE")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("hass.url", env_var(ENV_HASS_URL))?
        .set_override_option("hass.token", env_var(ENV_HASS_TOKEN))?
        .set_override_option("hass.label_filter", env_var(ENV_LABEL_FILTER))?;

    finish(builder)
}

/// Build a configuration from defaults and a yaml document only, ignoring
/// the environment.
pub fn from_yaml(yaml: &str) -> ApiResult<AppConfig> {
    finish(defaults()?.add_source(config::File::from_str(yaml, FileFormat::Yaml)))
}

fn finish(builder: ConfigBuilder<DefaultState>) -> ApiResult<AppConfig> {
    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

impl AppConfig {
    pub fn validate(&self) -> ApiResult<()> {
        let bridge = &self.bridge;

        if bridge.http_port == 0 {
            return Err(ApiError::invalid_config("bridge.http_port must be in 1-65535"));
        }

        if bridge.https_port == 0 {
            return Err(ApiError::invalid_config("bridge.https_port must be in 1-65535"));
        }

        if bridge.http_port == bridge.https_port {
            return Err(ApiError::invalid_config(format!(
                "bridge.http_port and bridge.https_port are both {}",
                bridge.http_port
            )));
        }

        if self.hass.timeout_secs == 0 {
            return Err(ApiError::invalid_config("hass.timeout_secs must be positive"));
        }

        if self.hass.refresh_interval_secs == 0 {
            return Err(ApiError::invalid_config(
                "hass.refresh_interval_secs must be positive",
            ));
        }

        if self.hass.token.as_deref().is_none_or(|tok| tok.trim().is_empty()) {
            return Err(ApiError::invalid_config(format!(
                "No Home Assistant token configured (set {ENV_HASS_TOKEN} or hass.token)"
            )));
        }

        Ok(())
    }

    pub fn log_port_warnings(&self) {
        let bridge = &self.bridge;
        if bridge.http_port != DEFAULT_HTTP_PORT || bridge.https_port != DEFAULT_HTTPS_PORT {
            log::warn!(
                "Non-default http/https ports ({}/{}). Hue apps expect the bridge at 80/443, use at your own risk.",
                bridge.http_port,
                bridge.https_port
            );
            if bridge.use_default_ports_for_discovery {
                log::warn!(
                    "Announcing default ports for discovery while listening on non-default ports. Is a reverse proxy in place?"
                );
            }
        }
    }
}

impl BridgeConfig {
    /// Fill in ip and mac address, when not configured.
    pub fn detect_network(&mut self) {
        if self.ipaddress.is_none() {
            self.ipaddress = detect_local_ip();
            match self.ipaddress {
                Some(ip) => log::info!("Auto-detected listen ip address {ip}"),
                None => log::warn!("Could not detect local ip address, listening on all interfaces"),
            }
        }

        if self.mac.is_none() {
            self.mac = match mac_address::get_mac_address() {
                Ok(Some(mac)) if mac.bytes() != [0; 6] => Some(mac),
                Ok(_) => None,
                Err(err) => {
                    log::warn!("Failed to read interface mac address: {err}");
                    None
                }
            };
            if self.mac.is_none() {
                log::warn!("No usable mac address found, using {}", fallback_mac());
            }
        }
    }
}

/// Find the address of the interface holding the default route. No packets
/// are sent.
fn detect_local_ip() -> Option<Ipv4Addr> {
    let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    sock.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match sock.local_addr().ok()?.ip() {
        std::net::IpAddr::V4(ip) if !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}
