//! Gateway discovery for different platforms

use crate::connectivity::types::MappingError;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Find the default gateway IP address
///
/// On Linux it reads the routing table, on macOS it parses `netstat`, on
/// Windows `route print`.
pub fn find_default_gateway() -> Result<IpAddr, MappingError> {
    #[cfg(target_os = "linux")]
    {
        find_gateway_linux()
    }

    #[cfg(target_os = "macos")]
    {
        find_gateway_macos()
    }

    #[cfg(target_os = "windows")]
    {
        find_gateway_windows()
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        Err(MappingError::NotSupported)
    }
}

/// Local IPv4 address of the interface carrying the default route
///
/// Connecting a UDP socket sends nothing; it only selects a route.
pub fn local_ip_for_default_route() -> Result<IpAddr, MappingError> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .map_err(|e| MappingError::Internal(format!("Failed to create socket: {}", e)))?;

    socket
        .connect("8.8.8.8:80")
        .map_err(|e| MappingError::Internal(format!("Failed to connect: {}", e)))?;

    let local_addr = socket
        .local_addr()
        .map_err(|e| MappingError::Internal(format!("Failed to get local address: {}", e)))?;

    Ok(local_addr.ip())
}

/// Parse the default gateway out of `/proc/net/route` contents
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_proc_net_route(route_table: &str) -> Option<Ipv4Addr> {
    for line in route_table.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }

        // Default route has destination 00000000; gateway is little-endian hex
        if fields[1] == "00000000" {
            if let Ok(gateway_u32) = u32::from_str_radix(fields[2], 16) {
                return Some(Ipv4Addr::from(gateway_u32.swap_bytes()));
            }
        }
    }

    None
}

#[cfg(target_os = "linux")]
fn find_gateway_linux() -> Result<IpAddr, MappingError> {
    let route_table = std::fs::read_to_string("/proc/net/route")
        .map_err(|e| MappingError::Internal(format!("Failed to read route table: {}", e)))?;

    parse_proc_net_route(&route_table)
        .map(IpAddr::V4)
        .ok_or(MappingError::NoGateway)
}

#[cfg(target_os = "macos")]
fn find_gateway_macos() -> Result<IpAddr, MappingError> {
    use std::process::Command;

    let output = Command::new("netstat")
        .args(["-rn", "-f", "inet"])
        .output()
        .map_err(|e| MappingError::Internal(format!("Failed to run netstat: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);

    for line in stdout.lines() {
        if line.starts_with("default") {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() >= 2 {
                if let Ok(ip) = fields[1].parse::<Ipv4Addr>() {
                    return Ok(IpAddr::V4(ip));
                }
            }
        }
    }

    Err(MappingError::NoGateway)
}

#[cfg(target_os = "windows")]
fn find_gateway_windows() -> Result<IpAddr, MappingError> {
    use std::process::Command;

    let output = Command::new("route")
        .args(["print", "0.0.0.0"])
        .output()
        .map_err(|e| MappingError::Internal(format!("Failed to run route: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);

    for line in stdout.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("0.0.0.0") {
            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            if fields.len() >= 3 {
                if let Ok(ip) = fields[2].parse::<Ipv4Addr>() {
                    return Ok(IpAddr::V4(ip));
                }
            }
        }
    }

    Err(MappingError::NoGateway)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proc_net_route_default() {
        let table = "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\n\
                     eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\n\
                     eth0\t0001A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\n";
        assert_eq!(parse_proc_net_route(table), Some(Ipv4Addr::new(192, 168, 1, 1)));
    }

    #[test]
    fn test_parse_proc_net_route_no_default() {
        let table = "Iface\tDestination\tGateway\n\
                     eth0\t0001A8C0\t00000000\n";
        assert_eq!(parse_proc_net_route(table), None);
    }
}
