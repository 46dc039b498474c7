// Concurrent-safe reverse DNS map, learned from answers observed on the wire.

use std::net::IpAddr;
use std::sync::RwLock;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::dns::{DnsMessage, RData, CLASS_IN};

/// Maps endpoints back to the names that most recently resolved to them.
///
/// Values are the comma-joined CNAME chain from the terminal A/AAAA name
/// outward, e.g. `dl.l.google.com,dl.google.com`. Reads take the shared
/// lock (one per decoded IP packet); writes take the exclusive lock (one
/// per observed DNS response). The map is never evicted; operators recycle
/// the process.
pub struct ReverseDnsMap {
    map: RwLock<FxHashMap<IpAddr, String>>,
}

impl ReverseDnsMap {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(FxHashMap::default()),
        }
    }

    /// Returns the name that mapped to the endpoint most recently, or the
    /// endpoint's canonical string form if unknown.
    pub fn name(&self, endpoint: IpAddr) -> String {
        let map = self.map.read().unwrap_or_else(|e| e.into_inner());
        match map.get(&endpoint) {
            Some(n) => n.clone(),
            None => endpoint.to_string(),
        }
    }

    /// Resolves both endpoints of a network-layer flow.
    pub fn names(&self, src: IpAddr, dst: IpAddr) -> (String, String) {
        (self.name(src), self.name(dst))
    }

    /// Folds the answers of one DNS message into the map.
    pub fn add(&self, dns: &DnsMessage) {
        // Extract A, quad-A, and CNAME records into useful buckets.
        let mut cnames: FxHashMap<&str, &str> = FxHashMap::default();
        let mut ips: Vec<(IpAddr, &str)> = Vec::new();
        for answer in &dns.answers {
            if answer.class != CLASS_IN {
                continue;
            }
            match &answer.rdata {
                RData::A(ip) => ips.push((IpAddr::V4(*ip), &answer.name)),
                RData::Aaaa(ip) => ips.push((IpAddr::V6(*ip), &answer.name)),
                RData::Cname(target) => {
                    cnames.insert(target.as_str(), &answer.name);
                }
                RData::Other(_) => {}
            }
        }
        if ips.is_empty() {
            return;
        }

        // Chain the CNAME aliases resolving to each IP, terminal name first.
        // A visited set bounds the walk: a malicious answer can contain a
        // CNAME cycle.
        let mut map = self.map.write().unwrap_or_else(|e| e.into_inner());
        for (ip, terminal) in ips {
            let mut chain: Vec<&str> = Vec::new();
            let mut seen: FxHashSet<&str> = FxHashSet::default();
            let mut current = terminal;
            loop {
                chain.push(current);
                seen.insert(current);
                match cnames.get(current) {
                    Some(&alias) if !seen.contains(alias) => current = alias,
                    _ => break,
                }
            }
            map.insert(ip, chain.join(","));
        }
    }

    /// Number of bound endpoints.
    pub fn len(&self) -> usize {
        self.map.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReverseDnsMap {
    fn default() -> Self {
        Self::new()
    }
}
