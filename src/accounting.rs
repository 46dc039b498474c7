// Aggregates packet counts and sizes into lock-free counters.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classify::LocalNets;
use crate::decode::Metadata;

/// A pair of monotonically non-decreasing counters for one total.
/// Mutated exclusively by atomic fetch-and-add; never reset.
#[derive(Debug, Default)]
pub struct Aggregation {
    bytes: AtomicU64,
    packets: AtomicU64,
}

impl Aggregation {
    /// Adds one packet of the given size.
    pub fn add(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AggregationSnapshot {
        AggregationSnapshot {
            bytes: self.bytes.load(Ordering::Relaxed),
            packets: self.packets.load(Ordering::Relaxed),
        }
    }
}

/// A value copy of one [`Aggregation`], as served to the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AggregationSnapshot {
    pub bytes: u64,
    pub packets: u64,
}

/// All flow aggregations. One instance lives in [`crate::capture::Core`].
#[derive(Debug, Default)]
pub struct Values {
    pub total: Aggregation,
    pub up: Aggregation,
    pub down: Aggregation,
    pub internal: Aggregation,
    pub external: Aggregation,
    pub v4: Aggregation,
    pub v6: Aggregation,
}

impl Values {
    /// Accounts for one packet.
    pub fn add_packet(&self, m: &Metadata, locals: &LocalNets) {
        self.total.add(m.size);

        // Classify the flow for the direction subtotals.
        let src_local = m.src_ip.map(|ip| locals.is_local(ip)).unwrap_or(false);
        let dst_local = m.dst_ip.map(|ip| locals.is_local(ip)).unwrap_or(false);
        match (src_local, dst_local) {
            (true, true) => self.internal.add(m.size),
            (true, false) => self.up.add(m.size),
            (false, true) => self.down.add(m.size),
            (false, false) => self.external.add(m.size),
        }

        // Only count toward V4/V6 when the flow crosses the local boundary;
        // intra-local monitoring traffic would dominate these otherwise.
        if !(src_local && dst_local) {
            if m.v6 {
                self.v6.add(m.size);
            } else {
                self.v4.add(m.size);
            }
        }
    }

    /// Returns a value copy of every counter, stamped with the current time.
    /// Snapshots are not atomic across counters; dashboards tolerate a skew
    /// of a few packets.
    pub fn state(&self) -> ValuesSnapshot {
        ValuesSnapshot {
            now: Utc::now(),
            total: self.total.snapshot(),
            up: self.up.snapshot(),
            down: self.down.snapshot(),
            internal: self.internal.snapshot(),
            external: self.external.snapshot(),
            v4: self.v4.snapshot(),
            v6: self.v6.snapshot(),
        }
    }
}

/// The dashboard-facing state of all counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ValuesSnapshot {
    pub now: DateTime<Utc>,
    pub total: AggregationSnapshot,
    pub up: AggregationSnapshot,
    pub down: AggregationSnapshot,
    pub internal: AggregationSnapshot,
    pub external: AggregationSnapshot,
    pub v4: AggregationSnapshot,
    pub v6: AggregationSnapshot,
}
