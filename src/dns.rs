// DNS wire format parser, RFC 1035 Section 4.
//
// Parses the header, walks the question section, and extracts answer records
// with typed rdata. Only the record types the reverse-DNS map consumes (A,
// AAAA, CNAME) are decoded; everything else is skipped by length.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::WirelogError;

/// Step budget for one name read. Labels and compression pointers each
/// spend one step, so a malicious pointer cycle runs out of budget instead
/// of looping.
const NAME_STEP_BUDGET: usize = 256;

/// DNS header size in bytes.
const HEADER_SIZE: usize = 12;

const TYPE_A: u16 = 1;
const TYPE_CNAME: u16 = 5;
const TYPE_AAAA: u16 = 28;

/// The IN class; records of any other class are carried but ignored downstream.
pub const CLASS_IN: u16 = 1;

/// Typed rdata of an answer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Cname(String),
    /// Any record type the pipeline does not consume (MX, TXT, OPT, ...).
    Other(u16),
}

/// A single resource record from the answer section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsAnswer {
    pub name: String,
    pub class: u16,
    pub rdata: RData,
}

/// A parsed DNS message, reduced to what reverse-DNS learning needs.
#[derive(Debug, Clone)]
pub struct DnsMessage {
    pub id: u16,
    pub is_response: bool,
    pub answers: Vec<DnsAnswer>,
}

/// Parse a DNS message from its wire representation.
///
/// `payload` must begin at the DNS header (the UDP payload for standard
/// DNS-over-UDP). Sections after the answers are not walked; nothing the
/// pipeline consumes lives there.
pub fn parse_dns(payload: &[u8]) -> Result<DnsMessage, WirelogError> {
    if payload.len() < HEADER_SIZE {
        return Err(WirelogError::DnsParse {
            offset: 0,
            detail: "truncated DNS header".to_string(),
        });
    }

    let id = u16::from_be_bytes([payload[0], payload[1]]);
    let flags = u16::from_be_bytes([payload[2], payload[3]]);
    let qdcount = u16::from_be_bytes([payload[4], payload[5]]) as usize;
    let ancount = u16::from_be_bytes([payload[6], payload[7]]) as usize;

    let is_response = (flags >> 15) & 1 == 1;

    let mut offset = HEADER_SIZE;

    // Question section: walk past it, nothing to keep.
    for _ in 0..qdcount {
        let (_, new_offset) = read_name(payload, offset)?;
        offset = new_offset;
        if offset + 4 > payload.len() {
            return Err(WirelogError::DnsParse {
                offset,
                detail: "truncated question section".to_string(),
            });
        }
        offset += 4; // qtype + qclass
    }

    let mut answers = Vec::with_capacity(ancount);
    for _ in 0..ancount {
        let (answer, new_offset) = parse_answer(payload, offset)?;
        offset = new_offset;
        answers.push(answer);
    }

    Ok(DnsMessage {
        id,
        is_response,
        answers,
    })
}

/// Parse one answer record starting at `offset`, returning it and the offset
/// immediately after the record.
fn parse_answer(buf: &[u8], offset: usize) -> Result<(DnsAnswer, usize), WirelogError> {
    let (name, mut offset) = read_name(buf, offset)?;

    if offset + 10 > buf.len() {
        return Err(WirelogError::DnsParse {
            offset,
            detail: "truncated resource record header".to_string(),
        });
    }

    let rtype = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
    let class = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]);
    // TTL at offset+4..8 is not consumed; the map keeps the latest binding.
    let rdlength = u16::from_be_bytes([buf[offset + 8], buf[offset + 9]]) as usize;
    offset += 10;

    if offset + rdlength > buf.len() {
        return Err(WirelogError::DnsParse {
            offset,
            detail: "truncated resource record rdata".to_string(),
        });
    }

    let rdata = parse_rdata(buf, offset, rdlength, rtype)?;
    offset += rdlength;

    Ok((DnsAnswer { name, class, rdata }, offset))
}

fn parse_rdata(
    buf: &[u8],
    offset: usize,
    rdlength: usize,
    rtype: u16,
) -> Result<RData, WirelogError> {
    match rtype {
        TYPE_A => {
            if rdlength != 4 {
                return Err(WirelogError::DnsParse {
                    offset,
                    detail: format!("A record rdata length {rdlength} != 4"),
                });
            }
            Ok(RData::A(Ipv4Addr::new(
                buf[offset],
                buf[offset + 1],
                buf[offset + 2],
                buf[offset + 3],
            )))
        }
        TYPE_AAAA => {
            if rdlength != 16 {
                return Err(WirelogError::DnsParse {
                    offset,
                    detail: format!("AAAA record rdata length {rdlength} != 16"),
                });
            }
            let octets: [u8; 16] =
                buf[offset..offset + 16]
                    .try_into()
                    .map_err(|_| WirelogError::DnsParse {
                        offset,
                        detail: "truncated AAAA rdata".to_string(),
                    })?;
            Ok(RData::Aaaa(Ipv6Addr::from(octets)))
        }
        TYPE_CNAME => {
            let (name, _) = read_name(buf, offset)?;
            Ok(RData::Cname(name))
        }
        other => Ok(RData::Other(other)),
    }
}

fn name_error(offset: usize, detail: &str) -> WirelogError {
    WirelogError::DnsParse {
        offset,
        detail: detail.to_string(),
    }
}

/// Read a domain name from `buf` starting at `start`, following RFC 1035
/// Section 4.1.4 compression.
///
/// Returns the labels joined by dots (no trailing dot; the root name is
/// empty) together with the offset of the field that follows the name in
/// the wire. For a compressed name that is right after the first pointer,
/// wherever its target took the cursor.
fn read_name(buf: &[u8], start: usize) -> Result<(String, usize), WirelogError> {
    let mut labels: Vec<&str> = Vec::new();
    let mut cursor = start;
    // Set once the first pointer redirects the cursor; from then on the
    // wire position of the enclosing record no longer advances.
    let mut resume_at: Option<usize> = None;

    for _ in 0..NAME_STEP_BUDGET {
        let tag = *buf
            .get(cursor)
            .ok_or_else(|| name_error(cursor, "truncated name"))?;
        match tag {
            // Root label: the name is complete.
            0 => return Ok((labels.join("."), resume_at.unwrap_or(cursor + 1))),
            // Plain label; the tag range caps labels at 63 bytes.
            1..=0x3F => {
                let body = cursor + 1..cursor + 1 + tag as usize;
                let raw = buf
                    .get(body.clone())
                    .ok_or_else(|| name_error(cursor, "truncated label"))?;
                labels.push(
                    std::str::from_utf8(raw)
                        .map_err(|_| name_error(cursor, "invalid UTF-8 in label"))?,
                );
                cursor = body.end;
            }
            // Compression pointer: 14-bit offset split across two bytes.
            tag if tag & 0xC0 == 0xC0 => {
                let low = *buf
                    .get(cursor + 1)
                    .ok_or_else(|| name_error(cursor, "truncated compression pointer"))?;
                resume_at.get_or_insert(cursor + 2);
                cursor = usize::from(tag & 0x3F) << 8 | usize::from(low);
            }
            // 0x40 and 0x80 label types were never assigned.
            _ => return Err(name_error(cursor, "reserved label type")),
        }
    }

    Err(name_error(start, "compression loop"))
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Wire-format builders shared by the parser and reverse-DNS map tests.

    /// Encode a domain name in DNS wire format (no compression).
    /// "example.com" -> [7, 'e'..'e', 3, 'c','o','m', 0]
    pub fn encode_name(name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        if !name.is_empty() {
            for label in name.split('.') {
                out.push(label.len() as u8);
                out.extend_from_slice(label.as_bytes());
            }
        }
        out.push(0);
        out
    }

    /// Build a DNS response. `answers` is (name, rtype, rclass, rdata bytes).
    pub fn build_response(id: u16, answers: &[(&str, u16, u16, Vec<u8>)]) -> Vec<u8> {
        let mut pkt = Vec::new();
        pkt.extend_from_slice(&id.to_be_bytes());
        pkt.extend_from_slice(&0x8180u16.to_be_bytes()); // QR=1, RD=1, RA=1
        pkt.extend_from_slice(&0u16.to_be_bytes()); // QDCOUNT
        pkt.extend_from_slice(&(answers.len() as u16).to_be_bytes()); // ANCOUNT
        pkt.extend_from_slice(&0u16.to_be_bytes()); // NSCOUNT
        pkt.extend_from_slice(&0u16.to_be_bytes()); // ARCOUNT
        for (name, rtype, rclass, rdata) in answers {
            pkt.extend_from_slice(&encode_name(name));
            pkt.extend_from_slice(&rtype.to_be_bytes());
            pkt.extend_from_slice(&rclass.to_be_bytes());
            pkt.extend_from_slice(&300u32.to_be_bytes()); // TTL
            pkt.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
            pkt.extend_from_slice(rdata);
        }
        pkt
    }

    pub fn a_answer(name: &str, ip: [u8; 4]) -> (&str, u16, u16, Vec<u8>) {
        (name, super::TYPE_A, super::CLASS_IN, ip.to_vec())
    }

    pub fn aaaa_answer(name: &str, ip: [u8; 16]) -> (&str, u16, u16, Vec<u8>) {
        (name, super::TYPE_AAAA, super::CLASS_IN, ip.to_vec())
    }

    pub fn cname_answer<'a>(name: &'a str, target: &str) -> (&'a str, u16, u16, Vec<u8>) {
        (name, super::TYPE_CNAME, super::CLASS_IN, encode_name(target))
    }
}
