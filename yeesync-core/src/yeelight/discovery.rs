//! SSDP-style bulb discovery.
//!
//! A search request is multicast to `239.255.255.250:1982`; every bulb
//! on the LAN answers with an HTTP-like header block whose `Location`
//! carries its control address:
//!
//! ```text
//! HTTP/1.1 200 OK
//! Location: yeelight://192.168.1.239:55443
//! id: 0x000000000015243f
//! model: color
//! fw_ver: 18
//! support: get_prop set_default set_power toggle set_bright ...
//! name: desk
//! ```

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::error::DeviceError;

pub const MULTICAST_ADDR: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 1982);

const SEARCH_REQUEST: &str = "M-SEARCH * HTTP/1.1\r\n\
HOST: 239.255.255.250:1982\r\n\
MAN: \"ssdp:discover\"\r\n\
ST: wifi_bulb\r\n";

const LOCATION_SCHEME: &str = "yeelight://";

// ── BulbInfo ─────────────────────────────────────────────────────

/// What a bulb advertises about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulbInfo {
    pub id: String,
    pub address: SocketAddr,
    pub model: String,
    pub name: String,
    pub firmware: String,
    /// Methods the bulb reports it supports.
    pub support: Vec<String>,
}

impl BulbInfo {
    /// Info for a bulb known only by address.
    pub fn from_address(address: SocketAddr) -> Self {
        Self {
            id: String::new(),
            address,
            model: String::new(),
            name: String::new(),
            firmware: String::new(),
            support: Vec::new(),
        }
    }
}

/// Parse one discovery response. Returns `None` if it does not carry a
/// usable `Location` and `id`.
pub fn parse_advertisement(text: &str) -> Option<BulbInfo> {
    let mut address = None;
    let mut info = BulbInfo::from_address(SocketAddr::from(([0, 0, 0, 0], 0)));

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "location" => {
                address = value
                    .strip_prefix(LOCATION_SCHEME)
                    .and_then(|addr| addr.trim_end_matches('/').parse().ok());
            }
            "id" => info.id = value.to_string(),
            "model" => info.model = value.to_string(),
            "name" => info.name = value.to_string(),
            "fw_ver" => info.firmware = value.to_string(),
            "support" => info.support = value.split_whitespace().map(str::to_string).collect(),
            _ => {}
        }
    }

    if info.id.is_empty() {
        return None;
    }
    info.address = address?;
    Some(info)
}

/// Multicast a search and collect answers for `timeout` per attempt.
///
/// Attempts repeat (up to `max_retries`, at least once) only while no
/// bulb has answered. Duplicate answers from the same bulb are folded.
pub async fn search(timeout: Duration, max_retries: u32) -> Result<Vec<BulbInfo>, DeviceError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    let attempts = max_retries.max(1);
    let mut found: Vec<BulbInfo> = Vec::new();
    let mut buf = vec![0u8; 2048];

    for attempt in 1..=attempts {
        socket.send_to(SEARCH_REQUEST.as_bytes(), MULTICAST_ADDR).await?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let (n, peer) = match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Err(_) => break,
                Ok(result) => result?,
            };
            let Ok(text) = std::str::from_utf8(&buf[..n]) else {
                trace!("non-utf8 discovery answer from {peer}");
                continue;
            };
            match parse_advertisement(text) {
                Some(info) if !found.iter().any(|b| b.id == info.id) => {
                    debug!("found bulb {} ({}) at {}", info.id, info.model, info.address);
                    found.push(info);
                }
                Some(_) => {}
                None => trace!("ignoring discovery answer from {peer}"),
            }
        }

        if !found.is_empty() {
            break;
        }
        debug!("no bulb answered discovery attempt {attempt}/{attempts}");
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWER: &str = "HTTP/1.1 200 OK\r\n\
Cache-Control: max-age=3600\r\n\
Location: yeelight://192.168.1.239:55443\r\n\
Server: POSIX UPnP/1.0 YGLC/1\r\n\
id: 0x000000000015243f\r\n\
model: color\r\n\
fw_ver: 18\r\n\
support: get_prop set_default set_power toggle set_bright set_rgb set_music\r\n\
power: on\r\n\
name: desk\r\n";

    #[test]
    fn parses_answer() {
        let info = parse_advertisement(ANSWER).unwrap();
        assert_eq!(info.id, "0x000000000015243f");
        assert_eq!(info.address, "192.168.1.239:55443".parse().unwrap());
        assert_eq!(info.model, "color");
        assert_eq!(info.name, "desk");
        assert_eq!(info.firmware, "18");
        assert!(info.support.iter().any(|m| m == "set_music"));
    }

    #[test]
    fn header_keys_are_case_insensitive() {
        let text = "LOCATION: yeelight://10.0.0.5:55443\r\nID: 0x1\r\n";
        let info = parse_advertisement(text).unwrap();
        assert_eq!(info.address.port(), 55443);
    }

    #[test]
    fn rejects_answer_without_location() {
        assert!(parse_advertisement("HTTP/1.1 200 OK\r\nid: 0x1\r\n").is_none());
    }

    #[test]
    fn rejects_foreign_scheme() {
        let text = "Location: http://10.0.0.5:80/desc.xml\r\nid: 0x1\r\n";
        assert!(parse_advertisement(text).is_none());
    }
}
