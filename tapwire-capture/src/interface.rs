//! Network interface enumeration and information

use pnet_datalink::{self, NetworkInterface};
use std::net::{IpAddr, Ipv4Addr};
use tapwire_core::{Error, Result};

use crate::device::NetInfo;

/// libpcap pseudo-device capturing on every interface
pub const ANY_DEVICE: &str = "any";

/// An address assigned to an interface together with its prefix length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub ip: IpAddr,
    pub prefix: u8,
}

/// Information about a network interface
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    /// Interface name (e.g., "eth0", "wlan0")
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// MAC address if available
    pub mac: Option<String>,
    /// Addresses assigned to this interface
    pub addresses: Vec<InterfaceAddress>,
    /// Whether the interface is up
    pub is_up: bool,
    /// Whether the interface is a loopback
    pub is_loopback: bool,
    /// Whether the interface supports multicast
    pub is_multicast: bool,
    /// Kernel interface index
    pub index: u32,
}

impl From<&NetworkInterface> for InterfaceInfo {
    fn from(iface: &NetworkInterface) -> Self {
        let mac = iface.mac.map(|mac| {
            format!(
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                mac.0, mac.1, mac.2, mac.3, mac.4, mac.5
            )
        });

        let addresses = iface
            .ips
            .iter()
            .map(|network| InterfaceAddress {
                ip: network.ip(),
                prefix: network.prefix(),
            })
            .collect();

        InterfaceInfo {
            name: iface.name.clone(),
            description: iface.description.clone(),
            mac,
            addresses,
            is_up: iface.is_up(),
            is_loopback: iface.is_loopback(),
            is_multicast: iface.is_multicast(),
            index: iface.index,
        }
    }
}

impl InterfaceInfo {
    /// Check if the interface is suitable for packet capture
    pub fn is_capture_capable(&self) -> bool {
        self.is_up && !self.is_loopback
    }

    /// All assigned IP addresses
    pub fn ips(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.addresses.iter().map(|addr| addr.ip)
    }

    /// Get the primary IPv4 address if available
    pub fn primary_ipv4(&self) -> Option<Ipv4Addr> {
        self.addresses.iter().find_map(|addr| match addr.ip {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
    }

    /// Network and mask of the primary IPv4 address
    pub fn ipv4_net(&self) -> Option<NetInfo> {
        self.addresses.iter().find_map(|addr| match addr.ip {
            IpAddr::V4(ip) => Some(NetInfo::from_prefix(ip, addr.prefix)),
            IpAddr::V6(_) => None,
        })
    }

    /// Net used to compile filters; unknown when no IPv4 address is assigned
    pub fn filter_net(&self) -> NetInfo {
        self.ipv4_net().unwrap_or(NetInfo::UNKNOWN)
    }
}

/// List all available network interfaces
pub fn list_interfaces() -> Result<Vec<InterfaceInfo>> {
    let interfaces = pnet_datalink::interfaces();

    if interfaces.is_empty() {
        return Err(Error::Capture(
            "No network interfaces found. Are you running with sufficient privileges?".to_string(),
        ));
    }

    Ok(interfaces.iter().map(InterfaceInfo::from).collect())
}

/// Get information about a specific interface by name
pub fn get_interface(name: &str) -> Result<InterfaceInfo> {
    pnet_datalink::interfaces()
        .iter()
        .find(|iface| iface.name == name)
        .map(InterfaceInfo::from)
        .ok_or_else(|| Error::InterfaceNotFound(name.to_string()))
}

/// Find the default interface (first non-loopback, up interface)
pub fn default_interface() -> Result<InterfaceInfo> {
    list_interfaces()?
        .into_iter()
        .find(|iface| iface.is_capture_capable())
        .ok_or_else(|| Error::Capture("No suitable default interface found".to_string()))
}

/// List all interfaces suitable for packet capture
pub fn list_capture_interfaces() -> Result<Vec<InterfaceInfo>> {
    let interfaces = list_interfaces()?;
    Ok(interfaces
        .into_iter()
        .filter(|iface| iface.is_capture_capable())
        .collect())
}

/// Resolve the IPv4 network and mask of an interface.
///
/// The `any` pseudo-device and interfaces without an IPv4 address resolve to
/// [`NetInfo::UNKNOWN`], as `pcap_lookupnet` does. Only unknown names fail.
pub fn lookup_net(name: &str) -> Result<NetInfo> {
    if name == ANY_DEVICE {
        return Ok(NetInfo::UNKNOWN);
    }
    let iface = get_interface(name).map_err(|e| Error::DeviceLookup(e.to_string()))?;
    Ok(iface.filter_net())
}
