//! Fixed-capacity circular store for sampler entries.
//!
//! Owned by exactly one sampler task; no internal synchronization. Storage
//! grows with the entries actually pushed, never past `capacity`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Capacity used when a caller asks for 0.
pub const DEFAULT_CAPACITY: usize = 256;

/// One collected sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

/// Ring buffer holding the most recent `capacity` entries.
#[derive(Debug)]
pub struct RingBuffer {
    items: Vec<SampleEntry>,
    capacity: usize,
    /// Slot overwritten by the next push once the buffer is full.
    head: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity
        };
        Self {
            items: Vec::new(),
            capacity,
            head: 0,
        }
    }

    /// Append an entry, evicting the oldest one when full.
    pub fn push(&mut self, entry: SampleEntry) {
        if self.items.len() < self.capacity {
            self.items.push(entry);
        } else {
            self.items[self.head] = entry;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Entries with `sequence > since`, oldest first.
    pub fn read_since(&self, since: u64) -> Vec<SampleEntry> {
        self.iter().filter(|e| e.sequence > since).cloned().collect()
    }

    /// Every retained entry, oldest first.
    pub fn read_all(&self) -> Vec<SampleEntry> {
        self.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn iter(&self) -> impl Iterator<Item = &SampleEntry> + '_ {
        let (newer, older) = self.items.split_at(self.head);
        older.iter().chain(newer.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn entry(sequence: u64) -> SampleEntry {
        SampleEntry {
            sequence,
            timestamp: Utc::now(),
            data: json!({ "n": sequence }),
        }
    }

    fn sequences(entries: &[SampleEntry]) -> Vec<u64> {
        entries.iter().map(|e| e.sequence).collect()
    }

    #[test]
    fn test_empty_buffer_reads_nothing() {
        let buffer = RingBuffer::new(4);
        assert!(buffer.is_empty());
        assert!(buffer.read_since(0).is_empty());
        assert!(buffer.read_all().is_empty());
    }

    #[test]
    fn test_zero_capacity_uses_default() {
        let buffer = RingBuffer::new(0);
        assert_eq!(buffer.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_huge_capacity_allocates_on_push() {
        let mut buffer = RingBuffer::new(usize::MAX);
        assert_eq!(buffer.capacity(), usize::MAX);
        for seq in 0..3 {
            buffer.push(entry(seq));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(sequences(&buffer.read_all()), vec![0, 1, 2]);
    }

    #[test]
    fn test_eviction_keeps_most_recent() {
        let mut buffer = RingBuffer::new(4);
        for seq in 0..7 {
            buffer.push(entry(seq));
        }
        assert_eq!(buffer.len(), 4);
        assert_eq!(sequences(&buffer.read_since(0)), vec![3, 4, 5, 6]);
        assert_eq!(sequences(&buffer.read_since(4)), vec![5, 6]);
        assert!(buffer.read_since(6).is_empty());
    }

    #[test]
    fn test_read_since_is_strictly_greater() {
        let mut buffer = RingBuffer::new(8);
        for seq in 0..3 {
            buffer.push(entry(seq));
        }
        assert_eq!(sequences(&buffer.read_all()), vec![0, 1, 2]);
        assert_eq!(sequences(&buffer.read_since(0)), vec![1, 2]);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            .. ProptestConfig::default()
        })]

        #[test]
        fn eviction_retains_last_n(capacity in 1usize..32, pushed in 0u64..128) {
            let mut buffer = RingBuffer::new(capacity);
            for seq in 0..pushed {
                buffer.push(entry(seq));
            }
            let held = buffer.read_all();
            let expected_len = (pushed as usize).min(capacity);
            prop_assert_eq!(held.len(), expected_len);
            let first = pushed - expected_len as u64;
            prop_assert_eq!(sequences(&held), (first..pushed).collect::<Vec<_>>());
        }

        #[test]
        fn incremental_reads_have_no_gaps_or_duplicates(
            capacity in 1usize..16,
            batches in proptest::collection::vec(0u64..8, 1..20),
        ) {
            let mut buffer = RingBuffer::new(capacity);
            let mut next = 0u64;
            let mut last_seen: Option<u64> = None;
            let mut seen = Vec::new();

            for batch in batches {
                for _ in 0..batch {
                    buffer.push(entry(next));
                    next += 1;
                }
                let fresh = match last_seen {
                    Some(since) => buffer.read_since(since),
                    None => buffer.read_all(),
                };
                if let Some(last) = fresh.last() {
                    last_seen = Some(last.sequence);
                }
                seen.extend(sequences(&fresh));
            }

            // strictly ascending: no duplicates across reads
            prop_assert!(seen.windows(2).all(|w| w[0] < w[1]));
            // whatever is still retained was observed
            for retained in sequences(&buffer.read_all()) {
                prop_assert!(seen.contains(&retained));
            }
        }
    }
}
