use std::net::Ipv4Addr;

use mac_address::MacAddress;
use serde::Serialize;

pub const UPNP_DEVICE_NAMESPACE: &str = "urn:schemas-upnp-org:device-1-0";
pub const UPNP_BASIC_DEVICE: &str = "urn:schemas-upnp-org:device:basic:1";

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>"#;

#[derive(Debug, Serialize)]
pub struct SpecVersion {
    pub major: u32,
    pub minor: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_type: String,
    pub friendly_name: String,
    pub manufacturer: String,
    #[serde(rename = "manufacturerURL")]
    pub manufacturer_url: String,
    pub model_description: String,
    pub model_name: String,
    pub model_number: String,
    #[serde(rename = "modelURL")]
    pub model_url: String,
    pub serial_number: String,
    #[serde(rename = "UDN")]
    pub udn: String,
    #[serde(rename = "presentationURL")]
    pub presentation_url: String,
}

/// UPnP root device description, served as `/description.xml`.
#[derive(Debug, Serialize)]
#[serde(rename = "root")]
pub struct Description {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,
    #[serde(rename = "specVersion")]
    pub spec_version: SpecVersion,
    #[serde(rename = "URLBase")]
    pub url_base: String,
    pub device: Device,
}

impl Description {
    #[must_use]
    pub fn new(ip: Ipv4Addr, port: u16, mac: MacAddress) -> Self {
        Self {
            xmlns: UPNP_DEVICE_NAMESPACE.to_string(),
            spec_version: SpecVersion { major: 1, minor: 0 },
            url_base: format!("http://{ip}:{port}/"),
            device: Device {
                device_type: UPNP_BASIC_DEVICE.to_string(),
                friendly_name: format!("Philips hue ({ip})"),
                manufacturer: "Signify".to_string(),
                manufacturer_url: "http://www.philips-hue.com".to_string(),
                model_description: "Philips hue Personal Wireless Lighting".to_string(),
                model_name: "Philips hue bridge 2015".to_string(),
                model_number: crate::HUE_BRIDGE_V2_MODEL_ID.to_string(),
                model_url: "http://www.philips-hue.com".to_string(),
                serial_number: crate::bridge_serial(mac),
                udn: format!("uuid:{}", crate::bridge_uuid(mac)),
                presentation_url: "index.html".to_string(),
            },
        }
    }

    pub fn to_xml(&self) -> Result<String, quick_xml::SeError> {
        let body = quick_xml::se::to_string(self)?;
        Ok(format!("{XML_HEADER}\n{body}"))
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use mac_address::MacAddress;

    use crate::upnp::Description;

    #[test]
    fn description_xml_contents() {
        let mac = MacAddress::new([0x01, 0x02, 0x03, 0xaa, 0xbb, 0xcc]);
        let xml = Description::new(Ipv4Addr::new(10, 0, 0, 7), 80, mac)
            .to_xml()
            .unwrap();

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(r#"<root xmlns="urn:schemas-upnp-org:device-1-0">"#));
        assert!(xml.contains("<URLBase>http://10.0.0.7:80/</URLBase>"));
        assert!(xml.contains("<modelNumber>BSB002</modelNumber>"));
        assert!(xml.contains("<serialNumber>010203aabbcc</serialNumber>"));
        assert!(xml.contains("<UDN>uuid:2f402f80-da50-11e1-9b23-010203aabbcc</UDN>"));
    }
}
