//! Target enumeration: IP ranges, CIDR blocks and port specifications
//!
//! Pure functions with no I/O. Every scan task is a pair drawn from the
//! cross product of `expand_targets` and `expand_ports`.

use crate::error::ScanError;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Expand a target specification into individual addresses.
///
/// Three forms are accepted:
/// - a single dotted quad (`end` absent);
/// - an inclusive ascending range `start..=end`;
/// - CIDR notation `a.b.c.d/n` in `start`, which enumerates the whole
///   block including the network and broadcast addresses.
///
/// A range with `start > end` yields an empty list rather than an error;
/// the caller decides whether that is worth reporting.
pub fn expand_targets(start: &str, end: Option<&str>) -> crate::Result<Vec<Ipv4Addr>> {
    if start.contains('/') {
        return expand_cidr(start);
    }

    let start_addr = parse_addr(start)?;

    let end_addr = match end {
        None | Some("") => return Ok(vec![start_addr]),
        Some(e) => parse_addr(e)?,
    };

    let lo = u32::from(start_addr);
    let hi = u32::from(end_addr);
    if lo > hi {
        return Ok(Vec::new());
    }

    Ok((lo..=hi).map(Ipv4Addr::from).collect())
}

/// Expand CIDR notation into every address of the block, in numeric order.
fn expand_cidr(spec: &str) -> crate::Result<Vec<Ipv4Addr>> {
    let (prefix, len) = spec
        .split_once('/')
        .ok_or_else(|| ScanError::InvalidTarget(format!("invalid CIDR: {}", spec)))?;

    let prefix_addr = parse_addr(prefix)?;
    let prefix_len: u8 = len
        .parse()
        .map_err(|_| ScanError::InvalidTarget(format!("invalid prefix length: {}", len)))?;
    if prefix_len < 1 || prefix_len > 32 {
        return Err(ScanError::InvalidTarget(format!(
            "prefix length must be in 1..=32, got {}",
            prefix_len
        )));
    }

    let host_bits = 32 - u32::from(prefix_len);
    let mask = if host_bits == 0 { u32::MAX } else { !((1u32 << host_bits) - 1) };
    let base = u32::from(prefix_addr) & mask;
    let count = 1u64 << host_bits;

    Ok((0..count).map(|i| Ipv4Addr::from(base | i as u32)).collect())
}

fn parse_addr(s: &str) -> crate::Result<Ipv4Addr> {
    Ipv4Addr::from_str(s.trim())
        .map_err(|_| ScanError::InvalidTarget(format!("invalid IPv4 address: {}", s)))
}

/// Expand a port specification into individual ports.
///
/// The spec is a comma-separated list; each token is a decimal port or an
/// inclusive range `a-b`. Duplicates are preserved in order - the engines
/// tolerate probing a port twice.
pub fn expand_ports(spec: &str) -> crate::Result<Vec<u16>> {
    if spec.is_empty() {
        return Err(ScanError::InvalidPorts("no ports specified".to_string()));
    }

    let mut ports = Vec::new();
    for token in spec.split(',') {
        if token.contains('-') {
            let (a, b) = token
                .split_once('-')
                .filter(|(a, b)| !a.contains('-') && !b.contains('-'))
                .ok_or_else(|| ScanError::InvalidPorts(format!("invalid port range: {}", token)))?;
            let start = parse_port(a)?;
            let end = parse_port(b)?;
            if start > end {
                return Err(ScanError::InvalidPorts(format!(
                    "invalid port range: {}-{}",
                    start, end
                )));
            }
            ports.extend(start..=end);
        } else {
            ports.push(parse_port(token)?);
        }
    }

    Ok(ports)
}

fn parse_port(s: &str) -> crate::Result<u16> {
    let port: u32 = s
        .trim()
        .parse()
        .map_err(|_| ScanError::InvalidPorts(format!("invalid port: {}", s)))?;
    if port < 1 || port > 65535 {
        return Err(ScanError::InvalidPorts(format!("port out of range: {}", port)));
    }
    Ok(port as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_address() {
        let ips = expand_targets("192.168.1.1", None).unwrap();
        assert_eq!(ips, vec![Ipv4Addr::new(192, 168, 1, 1)]);
    }

    #[test]
    fn empty_end_means_single_address() {
        let ips = expand_targets("10.0.0.1", Some("")).unwrap();
        assert_eq!(ips.len(), 1);
    }

    #[test]
    fn range_is_inclusive_and_ascending() {
        let ips = expand_targets("10.0.0.1", Some("10.0.0.3")).unwrap();
        assert_eq!(
            ips,
            vec![
                Ipv4Addr::new(10, 0, 0, 1),
                Ipv4Addr::new(10, 0, 0, 2),
                Ipv4Addr::new(10, 0, 0, 3),
            ]
        );
    }

    #[test]
    fn range_crosses_octet_boundary() {
        let ips = expand_targets("10.0.0.254", Some("10.0.1.1")).unwrap();
        assert_eq!(ips.len(), 4);
        assert_eq!(ips[1], Ipv4Addr::new(10, 0, 0, 255));
        assert_eq!(ips[2], Ipv4Addr::new(10, 0, 1, 0));
    }

    #[test]
    fn range_count_matches_bounds() {
        let ips = expand_targets("172.16.0.10", Some("172.16.1.9")).unwrap();
        assert_eq!(ips.len(), 256);
        for pair in ips.windows(2) {
            assert_eq!(u32::from(pair[0]) + 1, u32::from(pair[1]));
        }
    }

    #[test]
    fn inverted_range_is_empty() {
        let ips = expand_targets("10.0.0.9", Some("10.0.0.1")).unwrap();
        assert!(ips.is_empty());
    }

    #[test]
    fn cidr_includes_network_and_broadcast() {
        let ips = expand_targets("192.168.0.0/30", None).unwrap();
        assert_eq!(
            ips,
            vec![
                Ipv4Addr::new(192, 168, 0, 0),
                Ipv4Addr::new(192, 168, 0, 1),
                Ipv4Addr::new(192, 168, 0, 2),
                Ipv4Addr::new(192, 168, 0, 3),
            ]
        );
    }

    #[test]
    fn cidr_masks_host_bits_of_the_prefix() {
        let ips = expand_targets("10.1.2.3/24", None).unwrap();
        assert_eq!(ips.len(), 256);
        assert_eq!(ips[0], Ipv4Addr::new(10, 1, 2, 0));
        assert_eq!(ips[255], Ipv4Addr::new(10, 1, 2, 255));
    }

    #[test]
    fn cidr_32_is_a_single_host() {
        let ips = expand_targets("10.0.0.7/32", None).unwrap();
        assert_eq!(ips, vec![Ipv4Addr::new(10, 0, 0, 7)]);
    }

    #[test]
    fn cidr_successors_increment_by_one() {
        let ips = expand_targets("172.16.4.0/26", None).unwrap();
        assert_eq!(ips.len(), 64);
        for pair in ips.windows(2) {
            assert_eq!(u32::from(pair[0]) + 1, u32::from(pair[1]));
        }
    }

    #[test]
    fn malformed_targets_are_rejected() {
        assert!(expand_targets("not-an-ip", None).is_err());
        assert!(expand_targets("10.0.0.1", Some("nope")).is_err());
        assert!(expand_targets("10.0.0.0/0", None).is_err());
        assert!(expand_targets("10.0.0.0/33", None).is_err());
        assert!(expand_targets("10.0.0.0/x", None).is_err());
        assert!(expand_targets("300.0.0.1/24", None).is_err());
    }

    #[test]
    fn single_port() {
        assert_eq!(expand_ports("80").unwrap(), vec![80]);
    }

    #[test]
    fn port_list_preserves_order_and_duplicates() {
        assert_eq!(
            expand_ports("443,80,443").unwrap(),
            vec![443, 80, 443]
        );
    }

    #[test]
    fn port_range_is_inclusive() {
        assert_eq!(expand_ports("20-25").unwrap(), vec![20, 21, 22, 23, 24, 25]);
    }

    #[test]
    fn mixed_spec() {
        assert_eq!(
            expand_ports("21,80-82,3389").unwrap(),
            vec![21, 80, 81, 82, 3389]
        );
    }

    #[test]
    fn full_range_bounds() {
        let ports = expand_ports("1-65535").unwrap();
        assert_eq!(ports.len(), 65535);
        assert_eq!(ports[0], 1);
        assert_eq!(ports[65534], 65535);
    }

    #[test]
    fn malformed_ports_are_rejected() {
        assert!(expand_ports("").is_err());
        assert!(expand_ports("0").is_err());
        assert!(expand_ports("65536").is_err());
        assert!(expand_ports("80-").is_err());
        assert!(expand_ports("-80").is_err());
        assert!(expand_ports("90-80").is_err());
        assert!(expand_ports("1-2-3").is_err());
        assert!(expand_ports("abc").is_err());
        assert!(expand_ports("80,,443").is_err());
    }
}
