//! ClusterPartitioner: maps `(bucket, key)` to one Node within a
//! cluster via an R=1024-slot hash ring.
//!
//! A ring is rebuilt wholesale on every membership change and swapped in
//! atomically (`ArcSwap`-style via `arc_swap` would work too, but a
//! `parking_lot::RwLock<Arc<Ring>>` gives the same "readers see a
//! consistent snapshot" guarantee with less new surface, matching the short
//! critical sections the rest of this crate uses for routing state).

use std::sync::Arc;

use parking_lot::RwLock;

use crate::cluster::node::Node;
use crate::utils::hash32_concat;

/// Number of virtual slots per cluster ring. Fixed by the spec,
/// still named so it reads as a constant rather than a magic number.
pub const RING_SLOTS: u32 = 1024;

struct Slot {
    value: u32,
    node: Arc<dyn Node>,
}

/// One cluster's hash ring: `RING_SLOTS` slots sorted ascending by value,
/// ties broken by slot index. Immutable once built; `setup` replaces
/// the whole ring rather than mutating slots in place.
#[derive(Default)]
pub struct ClusterPartitioner {
    ring: RwLock<Vec<Slot>>,
}

impl ClusterPartitioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the ring from scratch for the given node set. Emits exactly
    /// `RING_SLOTS` slots *per cluster*, regardless of node count (O(R)
    /// total memory): slot index `i` is owned by `nodes[i % n]` once nodes
    /// are sorted by name for determinism, and its position on the ring is
    /// `hash(nodeName · slotIndexBytes)`. Assigning slots round-robin over
    /// a sorted node list is what gives every node its ≈`R/n` share.
    pub fn setup(&self, nodes: &[Arc<dyn Node>]) {
        if nodes.is_empty() {
            *self.ring.write() = Vec::new();
            return;
        }
        let mut sorted: Vec<Arc<dyn Node>> = nodes.to_vec();
        sorted.sort_by(|a, b| a.name().cmp(b.name()));

        let mut slots = Vec::with_capacity(RING_SLOTS as usize);
        for slot_index in 0..RING_SLOTS {
            let node = &sorted[slot_index as usize % sorted.len()];
            let value = hash32_concat(node.name().as_bytes(), &slot_index.to_be_bytes());
            slots.push(Slot { value, node: node.clone() });
        }
        // Stable sort: ties on value keep slot-index order because slots
        // are pushed in ascending slot-index order above.
        slots.sort_by_key(|s| s.value);
        *self.ring.write() = slots;
    }

    /// `target = hash(bucket · key)`; return the first slot with value ≥
    /// target, wrapping to slot 0 if none. Bucket-only
    /// lookups pass an empty key, per policy.
    pub fn node_for(&self, bucket: &[u8], key: &[u8]) -> Option<Arc<dyn Node>> {
        let target = hash32_concat(bucket, key);
        let ring = self.ring.read();
        if ring.is_empty() {
            return None;
        }
        let idx = ring.partition_point(|s| s.value < target);
        let idx = if idx == ring.len() { 0 } else { idx };
        Some(ring[idx].node.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.ring.read().is_empty()
    }
}
