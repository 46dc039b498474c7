//! Shared fixtures: raw frame builders, DNS payload builders, and a
//! recording batch writer.

#![allow(dead_code)]

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use wirelog::capture::RawFrame;
use wirelog::decode::Metadata;
use wirelog::sink::BatchWriter;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;

fn ethernet(ethertype: u16) -> Vec<u8> {
    let mut pkt = Vec::new();
    pkt.extend_from_slice(&[0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB]);
    pkt.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    pkt.extend_from_slice(&ethertype.to_be_bytes());
    pkt
}

fn tcp_header(sport: u16, dport: u16) -> Vec<u8> {
    let mut l4 = Vec::new();
    l4.extend_from_slice(&sport.to_be_bytes());
    l4.extend_from_slice(&dport.to_be_bytes());
    l4.extend_from_slice(&0u32.to_be_bytes()); // seq
    l4.extend_from_slice(&0u32.to_be_bytes()); // ack
    l4.push(0x50);
    l4.push(0x02); // SYN
    l4.extend_from_slice(&65535u16.to_be_bytes());
    l4.extend_from_slice(&0u32.to_be_bytes()); // checksum + urgent
    l4
}

fn udp_header(sport: u16, dport: u16, payload_len: usize) -> Vec<u8> {
    let mut l4 = Vec::new();
    l4.extend_from_slice(&sport.to_be_bytes());
    l4.extend_from_slice(&dport.to_be_bytes());
    l4.extend_from_slice(&((8 + payload_len) as u16).to_be_bytes());
    l4.extend_from_slice(&0u16.to_be_bytes());
    l4
}

fn ipv4_packet(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, l4: &[u8]) -> Vec<u8> {
    let mut pkt = ethernet(ETHERTYPE_IPV4);
    let total_len = (20 + l4.len()) as u16;
    pkt.push(0x45);
    pkt.push(0x00);
    pkt.extend_from_slice(&total_len.to_be_bytes());
    pkt.extend_from_slice(&0u32.to_be_bytes()); // id + flags/frag
    pkt.push(64);
    pkt.push(proto);
    pkt.extend_from_slice(&0u16.to_be_bytes());
    pkt.extend_from_slice(&src.octets());
    pkt.extend_from_slice(&dst.octets());
    pkt.extend_from_slice(l4);
    pkt
}

fn ipv6_packet(src: Ipv6Addr, dst: Ipv6Addr, proto: u8, l4: &[u8]) -> Vec<u8> {
    let mut pkt = ethernet(ETHERTYPE_IPV6);
    pkt.push(0x60);
    pkt.extend_from_slice(&[0x00, 0x00, 0x00]);
    pkt.extend_from_slice(&(l4.len() as u16).to_be_bytes());
    pkt.push(proto);
    pkt.push(64);
    pkt.extend_from_slice(&src.octets());
    pkt.extend_from_slice(&dst.octets());
    pkt.extend_from_slice(l4);
    pkt
}

pub fn ipv4_tcp(src: Ipv4Addr, sport: u16, dst: Ipv4Addr, dport: u16) -> Vec<u8> {
    ipv4_packet(src, dst, PROTO_TCP, &tcp_header(sport, dport))
}

pub fn ipv4_udp(src: Ipv4Addr, sport: u16, dst: Ipv4Addr, dport: u16) -> Vec<u8> {
    ipv4_packet(src, dst, PROTO_UDP, &udp_header(sport, dport, 0))
}

pub fn ipv4_udp_with_payload(
    src: Ipv4Addr,
    sport: u16,
    dst: Ipv4Addr,
    dport: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut l4 = udp_header(sport, dport, payload.len());
    l4.extend_from_slice(payload);
    ipv4_packet(src, dst, PROTO_UDP, &l4)
}

pub fn ipv6_tcp(src: Ipv6Addr, sport: u16, dst: Ipv6Addr, dport: u16) -> Vec<u8> {
    ipv6_packet(src, dst, PROTO_TCP, &tcp_header(sport, dport))
}

/// DNS wire-format name: "golang.org" -> [6]golang[3]org[0]
fn encode_name(name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for label in name.split('.') {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    out
}

/// A DNS response payload with one class-IN A answer.
pub fn dns_a_response(name: &str, ip: Ipv4Addr) -> Vec<u8> {
    let mut pkt = Vec::new();
    pkt.extend_from_slice(&0x1234u16.to_be_bytes());
    pkt.extend_from_slice(&0x8180u16.to_be_bytes()); // response flags
    pkt.extend_from_slice(&0u16.to_be_bytes()); // QDCOUNT
    pkt.extend_from_slice(&1u16.to_be_bytes()); // ANCOUNT
    pkt.extend_from_slice(&0u16.to_be_bytes());
    pkt.extend_from_slice(&0u16.to_be_bytes());
    pkt.extend_from_slice(&encode_name(name));
    pkt.extend_from_slice(&1u16.to_be_bytes()); // TYPE A
    pkt.extend_from_slice(&1u16.to_be_bytes()); // CLASS IN
    pkt.extend_from_slice(&300u32.to_be_bytes()); // TTL
    pkt.extend_from_slice(&4u16.to_be_bytes()); // RDLENGTH
    pkt.extend_from_slice(&ip.octets());
    pkt
}

/// Wraps raw frame bytes with capture metadata.
pub fn frame(data: Vec<u8>, wire_len: u32) -> RawFrame {
    RawFrame {
        timestamp: 1_700_000_000_000,
        wire_len,
        data,
    }
}

/// Batch writer that records every shipped batch.
#[derive(Default)]
pub struct RecordingWriter {
    batches: Mutex<Vec<Vec<Metadata>>>,
}

impl RecordingWriter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn batches(&self) -> Vec<Vec<Metadata>> {
        self.batches.lock().unwrap().clone()
    }

    /// Every shipped record, across all batches.
    pub fn records(&self) -> Vec<Metadata> {
        self.batches().into_iter().flatten().collect()
    }

    /// Waits for `n` batches to arrive; full batches ship on fire-and-forget
    /// threads, so arrival can trail the pipeline join.
    pub fn wait_for_batches(&self, n: usize, timeout: Duration) -> Vec<Vec<Metadata>> {
        let deadline = Instant::now() + timeout;
        loop {
            let batches = self.batches();
            if batches.len() >= n || Instant::now() >= deadline {
                return batches;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

impl BatchWriter for RecordingWriter {
    fn write(&self, batch: Vec<Metadata>) -> Vec<Metadata> {
        if batch.is_empty() {
            return batch;
        }
        self.batches.lock().unwrap().push(batch.clone());
        batch
    }
}
