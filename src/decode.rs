// Raw frame decoder: Ethernet + IPv4/IPv6 + TCP/UDP headers, and DNS
// payloads on UDP port 53.
//
// Decoding is best-effort: whatever layers parse are kept, and a failure in
// an inner layer never discards the outer layers' fields. The capture filter
// restricts the wire to TCP and UDP, so unparseable frames are rare.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::dns::{self, DnsMessage};

// Ethernet
const ETH_HLEN: usize = 14;
const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;

// IPv4
const IPV4_MIN_HLEN: usize = 20;
const IPV4_PROTO_OFFSET: usize = 9;
const IPV4_FLAGS_FRAG_OFFSET: usize = 6;
const IPV4_SRC_OFFSET: usize = 12;
const IPV4_DST_OFFSET: usize = 16;

// IPv6
const IPV6_HLEN: usize = 40;
const IPV6_NEXT_HDR_OFFSET: usize = 6;
const IPV6_SRC_OFFSET: usize = 8;
const IPV6_DST_OFFSET: usize = 24;

// L4 protocol numbers
const PROTO_IPIP: u8 = 4;
const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;
const PROTO_IPV6_ENCAP: u8 = 41; // 6in4

// IPv6 extension headers that can sit between the fixed header and the
// transport layer (IANA next-header numbers).
const IPPROTO_HOPOPTS: u8 = 0;
const IPPROTO_ROUTING: u8 = 43;
const IPPROTO_FRAGMENT: u8 = 44;
const IPPROTO_DSTOPTS: u8 = 60;

const UDP_HLEN: usize = 8;
const DNS_PORT: u16 = 53;

/// Metadata about one captured frame, but not including the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Wall-clock capture time, milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// Original wire length in bytes.
    pub size: u64,
    pub src_ip: Option<IpAddr>,
    pub dst_ip: Option<IpAddr>,
    /// Zero when the transport layer is absent or did not decode.
    pub src_port: u16,
    pub dst_port: u16,
    /// Resolved at decode time; the canonical address form when unknown,
    /// empty when no IP layer decoded.
    pub src_name: String,
    pub dst_name: String,
    pub v6: bool,
}

/// Layer fields extracted from one frame.
#[derive(Debug, Default)]
pub struct DecodedFrame {
    pub src_ip: Option<IpAddr>,
    pub dst_ip: Option<IpAddr>,
    pub v6: bool,
    pub src_port: u16,
    pub dst_port: u16,
    pub dns: Option<DnsMessage>,
}

/// Reusable per-worker decoder starting at Ethernet.
///
/// When a frame carries both IP versions (6in4 and friends), the IPv6
/// addresses win.
pub struct FrameDecoder;

impl FrameDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode one frame. The second element is a description of the first
    /// decode failure, if any; the returned fields are still valid for
    /// whatever layers did decode.
    pub fn decode(&mut self, data: &[u8]) -> (DecodedFrame, Option<String>) {
        let mut out = DecodedFrame::default();
        let issue = parse_ethernet(data, &mut out).err();
        (out, issue)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_ethernet(data: &[u8], out: &mut DecodedFrame) -> Result<(), String> {
    if data.len() < ETH_HLEN {
        return Err("truncated ethernet header".to_string());
    }
    let ethertype = u16::from_be_bytes([data[12], data[13]]);
    let l3 = &data[ETH_HLEN..];
    match ethertype {
        ETHERTYPE_IPV4 => parse_ipv4(l3, out),
        ETHERTYPE_IPV6 => parse_ipv6(l3, out),
        other => Err(format!("unsupported ethertype {other:#06x}")),
    }
}

fn parse_ipv4(data: &[u8], out: &mut DecodedFrame) -> Result<(), String> {
    if data.len() < IPV4_MIN_HLEN {
        return Err("truncated IPv4 header".to_string());
    }
    let ihl = ((data[0] & 0x0F) as usize) * 4;
    if ihl < IPV4_MIN_HLEN || data.len() < ihl {
        return Err("bad IPv4 header length".to_string());
    }

    // An IPv6 layer always wins over IPv4 when both surface.
    if !out.v6 {
        out.src_ip = Some(IpAddr::V4(Ipv4Addr::new(
            data[IPV4_SRC_OFFSET],
            data[IPV4_SRC_OFFSET + 1],
            data[IPV4_SRC_OFFSET + 2],
            data[IPV4_SRC_OFFSET + 3],
        )));
        out.dst_ip = Some(IpAddr::V4(Ipv4Addr::new(
            data[IPV4_DST_OFFSET],
            data[IPV4_DST_OFFSET + 1],
            data[IPV4_DST_OFFSET + 2],
            data[IPV4_DST_OFFSET + 3],
        )));
    }

    // Non-first fragments carry no transport header.
    let flags_frag = u16::from_be_bytes([
        data[IPV4_FLAGS_FRAG_OFFSET],
        data[IPV4_FLAGS_FRAG_OFFSET + 1],
    ]);
    if (flags_frag & 0x1FFF) != 0 {
        return Ok(());
    }

    parse_l4(data[IPV4_PROTO_OFFSET], &data[ihl..], out)
}

fn parse_ipv6(data: &[u8], out: &mut DecodedFrame) -> Result<(), String> {
    if data.len() < IPV6_HLEN {
        return Err("truncated IPv6 header".to_string());
    }

    let src: [u8; 16] = data[IPV6_SRC_OFFSET..IPV6_SRC_OFFSET + 16]
        .try_into()
        .map_err(|_| "truncated IPv6 source".to_string())?;
    let dst: [u8; 16] = data[IPV6_DST_OFFSET..IPV6_DST_OFFSET + 16]
        .try_into()
        .map_err(|_| "truncated IPv6 destination".to_string())?;
    out.src_ip = Some(IpAddr::V6(Ipv6Addr::from(src)));
    out.dst_ip = Some(IpAddr::V6(Ipv6Addr::from(dst)));
    out.v6 = true;

    // Walk the extension chain by splitting each header off the front of
    // the remaining payload.
    let mut proto = data[IPV6_NEXT_HDR_OFFSET];
    let mut rest = &data[IPV6_HLEN..];
    while let Some(len) = ipv6_ext_header_len(proto, rest) {
        if rest.len() < len {
            return Err("truncated IPv6 extension header".to_string());
        }
        // The next-header byte leads every extension header.
        proto = rest[0];
        rest = &rest[len..];
    }
    parse_l4(proto, rest, out)
}

/// Size in bytes of the IPv6 extension header at the front of `data`, or
/// `None` when `proto` is not an extension header (or its length byte is
/// missing). Fragment headers are fixed at 8 bytes; the others carry extra
/// 8-byte units in their second byte.
fn ipv6_ext_header_len(proto: u8, data: &[u8]) -> Option<usize> {
    match proto {
        IPPROTO_FRAGMENT => Some(8),
        IPPROTO_HOPOPTS | IPPROTO_ROUTING | IPPROTO_DSTOPTS => {
            data.get(1).map(|&units| 8 * (1 + usize::from(units)))
        }
        _ => None,
    }
}

fn parse_l4(proto: u8, data: &[u8], out: &mut DecodedFrame) -> Result<(), String> {
    match proto {
        PROTO_TCP => {
            if data.len() < 4 {
                return Err("truncated TCP header".to_string());
            }
            out.src_port = u16::from_be_bytes([data[0], data[1]]);
            out.dst_port = u16::from_be_bytes([data[2], data[3]]);
            Ok(())
        }
        PROTO_UDP => {
            if data.len() < UDP_HLEN {
                return Err("truncated UDP header".to_string());
            }
            out.src_port = u16::from_be_bytes([data[0], data[1]]);
            out.dst_port = u16::from_be_bytes([data[2], data[3]]);
            let payload = &data[UDP_HLEN..];
            if (out.src_port == DNS_PORT || out.dst_port == DNS_PORT) && !payload.is_empty() {
                match dns::parse_dns(payload) {
                    Ok(msg) => out.dns = Some(msg),
                    Err(e) => return Err(e.to_string()),
                }
            }
            Ok(())
        }
        PROTO_IPV6_ENCAP => parse_ipv6(data, out),
        PROTO_IPIP => parse_ipv4(data, out),
        other => Err(format!("unsupported transport protocol {other}")),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
