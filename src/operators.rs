//! Built-in matcher operators.
//!
//! All of these are pure predicates over string inputs. They never raise:
//! unparseable patterns, bad regexes and malformed addresses evaluate to
//! `false` so a broken policy row cannot take down an enforcement sweep.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use regex::Regex;

/// Glob match: `*` in `key2` matches any run of characters, everything
/// else is literal. Whole-string anchored. Without `*`, plain equality.
///
/// `keyMatch("/data/file1", "/data/*")` → true
pub fn key_match(key1: &str, key2: &str) -> bool {
    if !key2.contains('*') {
        return key1 == key2;
    }
    let pattern = format!("^{}$", regex::escape(key2).replace(r"\*", ".*"));
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(key1),
        Err(_) => false,
    }
}

/// Path-parameter match: `:name` segments in `key2` match any single
/// segment of `key1`. Falls back to [`key_match`] when `key2` carries no
/// parameter.
///
/// `keyMatch2("/resource/42", "/resource/:id")` → true
pub fn key_match2(key1: &str, key2: &str) -> bool {
    if !key2.contains(':') {
        return key_match(key1, key2);
    }
    let segs1: Vec<&str> = key1.split('/').collect();
    let segs2: Vec<&str> = key2.split('/').collect();
    if segs1.len() != segs2.len() {
        return false;
    }
    segs1
        .iter()
        .zip(&segs2)
        .all(|(s1, s2)| s2.starts_with(':') || s1 == s2)
}

/// Alias of [`key_match`] in this revision.
pub fn key_match3(key1: &str, key2: &str) -> bool {
    key_match(key1, key2)
}

/// Regex match of `key1` against the pattern `key2`, unanchored. A
/// pattern that fails to compile matches nothing.
pub fn regex_match(key1: &str, key2: &str) -> bool {
    match Regex::new(key2) {
        Ok(re) => re.is_match(key1),
        Err(_) => false,
    }
}

/// CIDR containment: `ip2` is either a plain address (equality after
/// parse) or `addr/prefix`, in which case `ip1` must lie inside the
/// network. Address families must match.
///
/// `ipMatch("192.168.2.123", "192.168.2.0/24")` → true
pub fn ip_match(ip1: &str, ip2: &str) -> bool {
    let Ok(addr1) = ip1.parse::<IpAddr>() else {
        return false;
    };

    let Some((net, prefix)) = ip2.split_once('/') else {
        return ip2.parse::<IpAddr>().map(|a| a == addr1).unwrap_or(false);
    };

    let Ok(addr2) = net.parse::<IpAddr>() else {
        return false;
    };
    let Ok(prefix) = prefix.parse::<u8>() else {
        return false;
    };

    match (addr1, addr2) {
        (IpAddr::V4(a), IpAddr::V4(b)) => in_network_v4(a, b, prefix),
        (IpAddr::V6(a), IpAddr::V6(b)) => in_network_v6(a, b, prefix),
        _ => false,
    }
}

fn in_network_v4(addr: Ipv4Addr, net: Ipv4Addr, prefix: u8) -> bool {
    if prefix > 32 {
        return false;
    }
    if prefix == 0 {
        return true;
    }
    let mask = u32::MAX << (32 - prefix);
    (u32::from(addr) & mask) == (u32::from(net) & mask)
}

fn in_network_v6(addr: Ipv6Addr, net: Ipv6Addr, prefix: u8) -> bool {
    if prefix > 128 {
        return false;
    }
    if prefix == 0 {
        return true;
    }
    let mask = u128::MAX << (128 - prefix);
    (u128::from(addr) & mask) == (u128::from(net) & mask)
}
