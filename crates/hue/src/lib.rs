use mac_address::MacAddress;
use uuid::Uuid;

pub mod date_format;
pub mod error;
pub mod hs;
pub mod legacy_api;
pub mod upnp;

pub const HUE_BRIDGE_V2_MODEL_ID: &str = "BSB002";
pub const HUE_BRIDGE_V2_DEFAULT_SWVERSION: &str = "1967054020";
pub const HUE_BRIDGE_V2_DEFAULT_APIVERSION: &str = "1.67.0";

/// Fixed prefix used by real bridges for their UPnP device uuid. The last
/// six bytes are the bridge mac address.
const BRIDGE_UUID_PREFIX: (u32, u16, u16, [u8; 2]) = (0x2f40_2f80, 0xda50, 0x11e1, [0x9b, 0x23]);

#[must_use]
pub fn best_guess_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "none".to_string())
}

#[must_use]
pub fn bridge_id_raw(mac: MacAddress) -> [u8; 8] {
    let b = mac.bytes();
    [b[0], b[1], b[2], 0xFF, 0xFE, b[3], b[4], b[5]]
}

#[must_use]
#[allow(clippy::format_collect)]
pub fn bridge_id(mac: MacAddress) -> String {
    let bytes = bridge_id_raw(mac);
    bytes
        .into_iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
}

/// Serial number as printed on the bridge (lowercase mac without separators)
#[must_use]
#[allow(clippy::format_collect)]
pub fn bridge_serial(mac: MacAddress) -> String {
    mac.bytes()
        .into_iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
}

#[must_use]
pub fn bridge_uuid(mac: MacAddress) -> Uuid {
    let (d1, d2, d3, head) = BRIDGE_UUID_PREFIX;
    let m = mac.bytes();
    Uuid::from_fields(
        d1,
        d2,
        d3,
        &[head[0], head[1], m[0], m[1], m[2], m[3], m[4], m[5]],
    )
}

#[cfg(test)]
mod tests {
    use mac_address::MacAddress;

    fn mac() -> MacAddress {
        MacAddress::new([0x01, 0x02, 0x03, 0xaa, 0xbb, 0xcc])
    }

    #[test]
    fn bridge_id_inserts_fffe() {
        assert_eq!(crate::bridge_id(mac()), "010203fffeaabbcc");
    }

    #[test]
    fn bridge_serial_is_plain_mac() {
        assert_eq!(crate::bridge_serial(mac()), "010203aabbcc");
    }

    #[test]
    fn bridge_uuid_ends_with_mac() {
        assert_eq!(
            crate::bridge_uuid(mac()).to_string(),
            "2f402f80-da50-11e1-9b23-010203aabbcc"
        );
    }
}
