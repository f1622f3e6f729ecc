use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::fd::AsRawFd;
use std::time::Duration;

use async_trait::async_trait;
use mac_address::MacAddress;
use nix::sys::socket::{self, AddressFamily, SockFlag, SockType, SockaddrIn, sockopt};
use tokio::net::UdpSocket;

use hue::upnp::UPNP_BASIC_DEVICE;

use crate::error::{ApiError, ApiResult};
use crate::server::service::Service;

pub const SSDP_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
pub const SSDP_PORT: u16 = 1900;

const NOTIFY_INTERVAL: Duration = Duration::from_secs(60);
const MAX_AGE: u64 = 100;

/// What the bridge says about itself in SSDP replies and announcements.
#[derive(Clone, Debug)]
pub struct SsdpInfo {
    location: String,
    bridgeid: String,
    uuid: String,
    server: String,
}

impl SsdpInfo {
    #[must_use]
    pub fn new(ip: Ipv4Addr, port: u16, mac: MacAddress) -> Self {
        Self {
            location: format!("http://{ip}:{port}/description.xml"),
            bridgeid: hue::bridge_id(mac).to_uppercase(),
            uuid: format!("uuid:{}", hue::bridge_uuid(mac)),
            server: format!(
                "Linux/3.14.0 UPnP/1.0 IpBridge/{}",
                hue::HUE_BRIDGE_V2_DEFAULT_APIVERSION
            ),
        }
    }

    /// (target, usn) pairs matching a search target.
    fn targets(&self, st: &str) -> Vec<(String, String)> {
        let uuid = &self.uuid;
        let root = ("upnp:rootdevice".to_string(), format!("{uuid}::upnp:rootdevice"));
        let device = (uuid.clone(), uuid.clone());
        let basic = (
            UPNP_BASIC_DEVICE.to_string(),
            format!("{uuid}::{UPNP_BASIC_DEVICE}"),
        );

        match st {
            "ssdp:all" => vec![root, device, basic],
            "upnp:rootdevice" => vec![root],
            UPNP_BASIC_DEVICE => vec![basic],
            st if st.eq_ignore_ascii_case(uuid) => vec![device],
            _ => vec![],
        }
    }

    /// Unicast replies to an `M-SEARCH` for `st`. Empty if the target is not us.
    #[must_use]
    pub fn search_responses(&self, st: &str) -> Vec<String> {
        self.targets(st)
            .into_iter()
            .map(|(st, usn)| {
                format!(
                    "HTTP/1.1 200 OK\r\n\
                     HOST: {SSDP_ADDR}:{SSDP_PORT}\r\n\
                     EXT:\r\n\
                     CACHE-CONTROL: max-age={MAX_AGE}\r\n\
                     LOCATION: {}\r\n\
                     SERVER: {}\r\n\
                     hue-bridgeid: {}\r\n\
                     ST: {st}\r\n\
                     USN: {usn}\r\n\
                     \r\n",
                    self.location, self.server, self.bridgeid
                )
            })
            .collect()
    }

    /// Multicast `NOTIFY` messages, with `nts` being `ssdp:alive` or
    /// `ssdp:byebye`.
    #[must_use]
    pub fn notify_messages(&self, nts: &str) -> Vec<String> {
        self.targets("ssdp:all")
            .into_iter()
            .map(|(nt, usn)| {
                format!(
                    "NOTIFY * HTTP/1.1\r\n\
                     HOST: {SSDP_ADDR}:{SSDP_PORT}\r\n\
                     CACHE-CONTROL: max-age={MAX_AGE}\r\n\
                     LOCATION: {}\r\n\
                     SERVER: {}\r\n\
                     NTS: {nts}\r\n\
                     hue-bridgeid: {}\r\n\
                     NT: {nt}\r\n\
                     USN: {usn}\r\n\
                     \r\n",
                    self.location, self.server, self.bridgeid
                )
            })
            .collect()
    }
}

/// Extract the search target from an `M-SEARCH` request.
///
/// Returns `None` for anything else, including notifications from other
/// devices and garbage.
#[must_use]
pub fn parse_search(msg: &str) -> Option<&str> {
    let mut lines = msg.lines();

    let mut request = lines.next()?.split_whitespace();
    if !request.next()?.eq_ignore_ascii_case("M-SEARCH") || request.next()? != "*" {
        return None;
    }

    let mut discover = false;
    let mut target = None;

    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("MAN") {
            discover = value.trim_matches('"') == "ssdp:discover";
        } else if name.eq_ignore_ascii_case("ST") {
            target = Some(value);
        }
    }

    target.filter(|_| discover)
}

fn bind_multicast(iface: Ipv4Addr) -> ApiResult<UdpSocket> {
    let fd = socket::socket(
        AddressFamily::Inet,
        SockType::Datagram,
        SockFlag::SOCK_CLOEXEC | SockFlag::SOCK_NONBLOCK,
        None,
    )?;

    // other upnp responders usually share this port
    socket::setsockopt(&fd, sockopt::ReuseAddr, &true)?;
    socket::setsockopt(&fd, sockopt::ReusePort, &true)?;

    let addr = SockaddrIn::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, SSDP_PORT));
    socket::bind(fd.as_raw_fd(), &addr)?;

    let sock = UdpSocket::from_std(std::net::UdpSocket::from(fd))?;
    sock.join_multicast_v4(SSDP_ADDR, iface)?;
    sock.set_multicast_loop_v4(false)?;

    Ok(sock)
}

pub struct SsdpService {
    iface: Ipv4Addr,
    info: SsdpInfo,
    socket: Option<UdpSocket>,
}

impl SsdpService {
    #[must_use]
    pub const fn new(iface: Ipv4Addr, info: SsdpInfo) -> Self {
        Self {
            iface,
            info,
            socket: None,
        }
    }

    async fn notify(sock: &UdpSocket, info: &SsdpInfo, nts: &str) {
        let dest = SocketAddr::from((SSDP_ADDR, SSDP_PORT));
        for msg in info.notify_messages(nts) {
            if let Err(err) = sock.send_to(msg.as_bytes(), dest).await {
                log::warn!("Failed to send ssdp notification: {err}");
                return;
            }
        }
    }

    async fn handle_packet(sock: &UdpSocket, info: &SsdpInfo, data: &[u8], peer: SocketAddr) {
        let Some(st) = std::str::from_utf8(data).ok().and_then(parse_search) else {
            return;
        };

        let replies = info.search_responses(st);
        if replies.is_empty() {
            return;
        }

        log::trace!("ssdp search from {peer} for [{st}]");

        for reply in replies {
            if let Err(err) = sock.send_to(reply.as_bytes(), peer).await {
                log::debug!("Failed to send ssdp reply to {peer}: {err}");
                return;
            }
        }
    }
}

#[async_trait]
impl Service for SsdpService {
    async fn start(&mut self) -> ApiResult<()> {
        log::info!(
            "Announcing bridge over ssdp on {}:{SSDP_PORT} ({})",
            self.iface,
            self.info.location
        );
        self.socket = Some(bind_multicast(self.iface)?);
        Ok(())
    }

    async fn run(&mut self) -> ApiResult<()> {
        let sock = self
            .socket
            .as_ref()
            .ok_or_else(|| ApiError::service_error("ssdp socket not bound"))?;

        let mut buf = [0u8; 2048];
        let mut announce = tokio::time::interval(NOTIFY_INTERVAL);

        loop {
            tokio::select! {
                _ = announce.tick() => Self::notify(sock, &self.info, "ssdp:alive").await,
                res = sock.recv_from(&mut buf) => {
                    let (len, peer) = res?;
                    Self::handle_packet(sock, &self.info, &buf[..len], peer).await;
                }
            }
        }
    }

    async fn stop(&mut self) -> ApiResult<()> {
        if let Some(sock) = self.socket.take() {
            Self::notify(&sock, &self.info, "ssdp:byebye").await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use mac_address::MacAddress;

    use crate::server::ssdp::{SsdpInfo, parse_search};

    const UUID: &str = "uuid:2f402f80-da50-11e1-9b23-010203aabbcc";

    fn info() -> SsdpInfo {
        let mac = MacAddress::new([0x01, 0x02, 0x03, 0xaa, 0xbb, 0xcc]);
        SsdpInfo::new(Ipv4Addr::new(10, 0, 0, 7), 80, mac)
    }

    fn search(st: &str) -> String {
        format!(
            "M-SEARCH * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\nMAN: \"ssdp:discover\"\r\nMX: 2\r\nST: {st}\r\n\r\n"
        )
    }

    #[test]
    fn parse_valid_search() {
        assert_eq!(parse_search(&search("ssdp:all")), Some("ssdp:all"));
        assert_eq!(
            parse_search("m-search * HTTP/1.1\nst:upnp:rootdevice\nman:ssdp:discover\n"),
            Some("upnp:rootdevice")
        );
    }

    #[test]
    fn ignore_other_packets() {
        assert_eq!(parse_search(""), None);
        assert_eq!(parse_search("\u{0}\u{1}garbage"), None);
        assert_eq!(
            parse_search("NOTIFY * HTTP/1.1\r\nNT: upnp:rootdevice\r\nNTS: ssdp:alive\r\n\r\n"),
            None
        );
        assert_eq!(
            parse_search("M-SEARCH * HTTP/1.1\r\nST: ssdp:all\r\n\r\n"),
            None
        );
        assert_eq!(
            parse_search("M-SEARCH * HTTP/1.1\r\nMAN: \"ssdp:discover\"\r\n\r\n"),
            None
        );
    }

    #[test]
    fn respond_to_all() {
        let replies = info().search_responses("ssdp:all");
        assert_eq!(replies.len(), 3);
        for reply in &replies {
            assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
            assert!(reply.contains("LOCATION: http://10.0.0.7:80/description.xml\r\n"));
            assert!(reply.contains("hue-bridgeid: 010203FFFEAABBCC\r\n"));
            assert!(reply.ends_with("\r\n\r\n"));
        }
        assert!(replies[0].contains("ST: upnp:rootdevice\r\n"));
        assert!(replies[1].contains(&format!("USN: {UUID}\r\n")));
        assert!(replies[2].contains("ST: urn:schemas-upnp-org:device:basic:1\r\n"));
    }

    #[test]
    fn respond_to_specific_targets() {
        let info = info();
        assert_eq!(info.search_responses("upnp:rootdevice").len(), 1);
        assert_eq!(info.search_responses(UUID).len(), 1);
        assert_eq!(
            info.search_responses("urn:schemas-upnp-org:device:basic:1")
                .len(),
            1
        );
        assert!(info.search_responses("urn:dial-multiscreen-org:service:dial:1").is_empty());
        assert!(info.search_responses("uuid:00000000-0000-0000-0000-000000000000").is_empty());
    }

    #[test]
    fn notify_alive() {
        let msgs = info().notify_messages("ssdp:alive");
        assert_eq!(msgs.len(), 3);
        assert!(msgs.iter().all(|msg| msg.starts_with("NOTIFY * HTTP/1.1\r\n")));
        assert!(msgs.iter().all(|msg| msg.contains("NTS: ssdp:alive\r\n")));
        assert!(msgs[0].contains("NT: upnp:rootdevice\r\n"));
    }
}
