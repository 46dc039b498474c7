// Basic classification of IP addresses into local and non-local.

use std::net::IpAddr;

use ipnetwork::IpNetwork;

use crate::error::WirelogError;

/// Parses a static netblock literal, panicking on error. Only used for the
/// hard-wired blocks below; operator input goes through [`parse_netblock`].
fn must_parse(s: &str) -> IpNetwork {
    s.parse().expect("static netblock")
}

/// Parse an operator-supplied CIDR netblock.
pub fn parse_netblock(s: &str) -> Result<IpNetwork, WirelogError> {
    s.parse()
        .map_err(|_| WirelogError::Netblock(s.to_string()))
}

/// Classifier for private, link-local, and operator-declared address ranges.
///
/// Constructed once at startup; the optional extra netblock covers setups
/// where NAT is not in use and a routable block is still "local".
pub struct LocalNets {
    std_blocks: Vec<IpNetwork>,
    extra: Option<IpNetwork>,
}

impl LocalNets {
    pub fn new(extra: Option<IpNetwork>) -> Self {
        Self {
            std_blocks: vec![
                must_parse("10.0.0.0/8"), // RFC1918 IPv4 private addresses
                must_parse("172.16.0.0/12"),
                must_parse("192.168.0.0/16"),
                must_parse("fd00::/8"),           // RFC4193 IPv6 private addresses
                must_parse("169.254.0.0/16"),     // RFC3927 IPv4 link-local addresses
                must_parse("fe80::/10"),          // RFC4862 IPv6 link-local/autoconfig
                must_parse("0.0.0.0/32"),         // broadcast source
                must_parse("255.255.255.255/32"), // broadcast destination
            ],
            extra,
        }
    }

    /// Returns true if the IP is a private or link-local address, or falls
    /// within the operator-declared extra netblock.
    pub fn is_local(&self, ip: IpAddr) -> bool {
        if let Some(extra) = &self.extra {
            if extra.contains(ip) {
                return true;
            }
        }
        self.std_blocks.iter().any(|cidr| cidr.contains(ip))
    }

    /// Returns the "most local" of two IP addresses.
    /// If both are local it returns the first; if neither, the second.
    pub fn local(&self, a: IpAddr, b: IpAddr) -> IpAddr {
        if self.is_local(a) {
            a
        } else {
            b
        }
    }
}

impl Default for LocalNets {
    fn default() -> Self {
        Self::new(None)
    }
}
