//! Network interface, lease and ARP summarization for the dashboard.
//!
//! Shells out to `ip` and `nmcli` and parses their text output. Command
//! failures degrade to empty results; this endpoint never takes the server
//! down because a tool is missing.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use tokio::process::Command;
use tracing::debug;

/// Summary of one network interface
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InterfaceSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
    pub mac: Option<String>,
    pub gateway: Option<String>,
    pub up: bool,
}

/// A client currently attached to the hotspot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotspotClient {
    pub ip: String,
    pub mac: String,
    pub host: Option<String>,
}

/// Network info payload
#[derive(Debug, Clone, Serialize)]
pub struct NetworkInfo {
    pub interfaces: HashMap<String, InterfaceSummary>,
    #[serde(rename = "nmActive")]
    pub nm_active: String,
    pub clients: Vec<HotspotClient>,
}

/// Gather the full network summary
pub async fn gather() -> NetworkInfo {
    let ip_route = run_command("ip", &["route"]).await;
    let nm_active = run_command(
        "nmcli",
        &["-t", "-f", "NAME,DEVICE,TYPE,STATE", "connection", "show", "--active"],
    )
    .await;

    let mut interfaces = HashMap::new();
    for (name, kind) in [("eth0", "ethernet"), ("wlan0", "wifi")] {
        let addr_text = run_command("ip", &["addr", "show", name]).await;
        interfaces.insert(
            name.to_string(),
            summarize_interface(name, kind, &addr_text, &ip_route),
        );
    }

    NetworkInfo {
        interfaces,
        nm_active,
        clients: hotspot_clients(),
    }
}

/// Run a command, returning its stdout or an empty string on any failure
async fn run_command(command: &str, args: &[&str]) -> String {
    match Command::new(command).args(args).output().await {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).into_owned()
        }
        Ok(output) => {
            debug!(command, "Command exited with {}", output.status);
            String::new()
        }
        Err(e) => {
            debug!(command, "Command failed to run: {e}");
            String::new()
        }
    }
}

/// Build an interface summary from `ip addr show <name>` and `ip route` text
fn summarize_interface(
    name: &str,
    kind: &str,
    addr_text: &str,
    route_text: &str,
) -> InterfaceSummary {
    let mut summary = InterfaceSummary {
        name: name.to_string(),
        kind: kind.to_string(),
        ..InterfaceSummary::default()
    };

    for line in addr_text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("link/ether ") {
            let mac = rest.split_whitespace().next().unwrap_or_default();
            if !mac.is_empty() && mac != "00:00:00:00:00:00" {
                summary.mac = Some(mac.to_string());
            }
        } else if let Some(rest) = trimmed.strip_prefix("inet ") {
            if let Some(addr) = rest.split_whitespace().next() {
                summary.ipv4 = addr.split('/').next().map(str::to_string);
                summary.up = true;
            }
        } else if let Some(rest) = trimmed.strip_prefix("inet6 ") {
            if let Some(addr) = rest.split_whitespace().next() {
                // Skip link-local addresses
                if !addr.starts_with("fe80") && summary.ipv6.is_none() {
                    summary.ipv6 = addr.split('/').next().map(str::to_string);
                }
            }
        }
    }

    summary.gateway = default_gateway(name, route_text);
    summary
}

/// Gateway from the default route line naming this device
fn default_gateway(name: &str, route_text: &str) -> Option<String> {
    for line in route_text.lines() {
        if !line.starts_with("default ") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let dev_matches = parts
            .windows(2)
            .any(|pair| pair[0] == "dev" && pair[1] == name);
        if !dev_matches {
            continue;
        }
        if let Some(via_index) = parts.iter().position(|p| *p == "via") {
            return parts.get(via_index + 1).map(|s| s.to_string());
        }
    }
    None
}

/// Hotspot clients from dnsmasq lease files, with an ARP table fallback
fn hotspot_clients() -> Vec<HotspotClient> {
    let lease_candidates = [
        "/run/NetworkManager/dnsmasq-Hotspot.leases",
        "/run/nm-dnsmasq-Hotspot.leases",
        "/var/lib/NetworkManager/dnsmasq-Hotspot.leases",
    ];

    for path in lease_candidates {
        if let Ok(text) = fs::read_to_string(path) {
            let clients = parse_leases(&text);
            if !clients.is_empty() {
                return clients;
            }
        }
    }

    fs::read_to_string("/proc/net/arp")
        .map(|text| parse_arp(&text))
        .unwrap_or_default()
}

/// Parse a dnsmasq lease file: whitespace-separated fields per line, with
/// the IP and MAC recognized by shape rather than position
fn parse_leases(text: &str) -> Vec<HotspotClient> {
    let Ok(ip_re) = Regex::new(r"^\d+\.\d+\.\d+\.\d+$") else {
        return Vec::new();
    };
    let Ok(mac_re) = Regex::new(r"^(?i)([0-9a-f]{2}:){5}[0-9a-f]{2}$") else {
        return Vec::new();
    };

    let mut clients = Vec::new();
    for line in text.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        let ip = parts.iter().find(|p| ip_re.is_match(p));
        let mac = parts.iter().find(|p| mac_re.is_match(p));
        let host = parts
            .get(3)
            .filter(|h| **h != "*")
            .map(|h| h.to_string());

        if let (Some(ip), Some(mac)) = (ip, mac) {
            clients.push(HotspotClient {
                ip: ip.to_string(),
                mac: mac.to_string(),
                host,
            });
        }
    }
    clients
}

/// Hotspot clients from /proc/net/arp: wlan0 entries in the 10.42.0.0/16
/// range NetworkManager hands out
fn parse_arp(text: &str) -> Vec<HotspotClient> {
    let mut clients = Vec::new();
    for line in text.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 6 {
            let (ip, mac, dev) = (parts[0], parts[3], parts[5]);
            if dev == "wlan0" && ip.starts_with("10.42.") {
                clients.push(HotspotClient {
                    ip: ip.to_string(),
                    mac: mac.to_string(),
                    host: None,
                });
            }
        }
    }
    clients
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR_TEXT: &str = "\
2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc mq state UP group default qlen 1000
    link/ether dc:a6:32:01:02:03 brd ff:ff:ff:ff:ff:ff
    inet 192.168.1.50/24 brd 192.168.1.255 scope global dynamic noprefixroute eth0
       valid_lft 86000sec preferred_lft 86000sec
    inet6 fe80::1234:5678:9abc:def0/64 scope link noprefixroute
       valid_lft forever preferred_lft forever
    inet6 2601:280:4700::1a2b/64 scope global dynamic
       valid_lft 300sec preferred_lft 300sec
";

    const ROUTE_TEXT: &str = "\
default via 192.168.1.1 dev eth0 proto dhcp src 192.168.1.50 metric 100
10.42.0.0/24 dev wlan0 proto kernel scope link src 10.42.0.1
192.168.1.0/24 dev eth0 proto kernel scope link src 192.168.1.50 metric 100
";

    #[test]
    fn test_summarize_interface() {
        let summary = summarize_interface("eth0", "ethernet", ADDR_TEXT, ROUTE_TEXT);
        assert_eq!(summary.ipv4.as_deref(), Some("192.168.1.50"));
        assert_eq!(summary.ipv6.as_deref(), Some("2601:280:4700::1a2b"));
        assert_eq!(summary.mac.as_deref(), Some("dc:a6:32:01:02:03"));
        assert_eq!(summary.gateway.as_deref(), Some("192.168.1.1"));
        assert!(summary.up);
    }

    #[test]
    fn test_summarize_interface_down() {
        let summary = summarize_interface("wlan0", "wifi", "", ROUTE_TEXT);
        assert!(!summary.up);
        assert_eq!(summary.ipv4, None);
        assert_eq!(summary.gateway, None);
    }

    #[test]
    fn test_default_gateway_matches_device() {
        assert_eq!(
            default_gateway("eth0", ROUTE_TEXT).as_deref(),
            Some("192.168.1.1")
        );
        assert_eq!(default_gateway("wlan0", ROUTE_TEXT), None);
    }

    #[test]
    fn test_parse_leases() {
        let text = "\
1735600000 aa:bb:cc:dd:ee:ff 10.42.0.17 phone-of-sam 01:aa:bb:cc:dd:ee:ff
1735600123 11:22:33:44:55:66 10.42.0.23 * *
";
        let clients = parse_leases(text);
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].ip, "10.42.0.17");
        assert_eq!(clients[0].mac, "aa:bb:cc:dd:ee:ff");
        assert_eq!(clients[0].host.as_deref(), Some("phone-of-sam"));
        assert_eq!(clients[1].host, None);
    }

    #[test]
    fn test_parse_arp_filters_hotspot_range() {
        let text = "\
IP address       HW type     Flags       HW address            Mask     Device
10.42.0.50       0x1         0x2         aa:bb:cc:00:11:22     *        wlan0
192.168.1.1      0x1         0x2         dc:a6:32:99:88:77     *        eth0
";
        let clients = parse_arp(text);
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].ip, "10.42.0.50");
        assert_eq!(clients[0].host, None);
    }
}
