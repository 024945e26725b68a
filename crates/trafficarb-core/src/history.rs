//! Per-lane bounded history of vehicle counts for trend reporting.
//!
//! Each lane owns a fixed-capacity ring. Once full, every push overwrites
//! the oldest count. Snapshots read oldest to newest.

use serde::{Deserialize, Serialize};

// =============================================================================
// CountRing
// =============================================================================

/// Fixed-capacity ring of counts for one lane.
#[derive(Debug, Clone)]
pub struct CountRing {
    buf: Vec<u32>,
    capacity: usize,
    head: usize, // next write position once full
    total: u64,  // counts ever pushed
}

impl CountRing {
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            total: 0,
        }
    }

    /// Append a count, returning the evicted oldest count when full.
    pub fn push(&mut self, count: u32) -> Option<u32> {
        self.total += 1;
        if self.buf.len() < self.capacity {
            self.buf.push(count);
            return None;
        }
        let evicted = std::mem::replace(&mut self.buf[self.head], count);
        self.head = (self.head + 1) % self.capacity;
        Some(evicted)
    }

    /// Counts from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        let (newer, older) = self.buf.split_at(self.head);
        older.iter().chain(newer.iter()).copied()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<u32> {
        self.iter().collect()
    }

    /// Most recent count.
    #[must_use]
    pub fn latest(&self) -> Option<u32> {
        if self.buf.is_empty() {
            return None;
        }
        let idx = if self.buf.len() < self.capacity || self.head == 0 {
            self.buf.len() - 1
        } else {
            self.head - 1
        };
        Some(self.buf[idx])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn total_pushed(&self) -> u64 {
        self.total
    }
}

// =============================================================================
// HistoryBuffer
// =============================================================================

/// One `CountRing` per lane.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    lanes: Vec<CountRing>,
}

impl HistoryBuffer {
    /// # Panics
    ///
    /// Panics if `capacity` is 0; the engine validates this beforehand.
    #[must_use]
    pub fn new(num_lanes: usize, capacity: usize) -> Self {
        Self {
            lanes: (0..num_lanes).map(|_| CountRing::new(capacity)).collect(),
        }
    }

    /// Record `count` for `lane`. Unknown lanes are ignored.
    pub fn push(&mut self, lane: usize, count: u32) {
        if let Some(ring) = self.lanes.get_mut(lane) {
            ring.push(count);
        }
    }

    /// Record one count per lane; missing entries record 0.
    pub fn push_all(&mut self, counts: &[u32]) {
        for (lane, ring) in self.lanes.iter_mut().enumerate() {
            ring.push(counts.get(lane).copied().unwrap_or(0));
        }
    }

    /// Recent counts for `lane`, oldest first. Unknown lanes yield nothing.
    #[must_use]
    pub fn snapshot(&self, lane: usize) -> Vec<u32> {
        self.lanes.get(lane).map(CountRing::snapshot).unwrap_or_default()
    }

    /// Snapshot of every lane.
    #[must_use]
    pub fn snapshot_all(&self) -> Vec<Vec<u32>> {
        self.lanes.iter().map(CountRing::snapshot).collect()
    }

    #[must_use]
    pub fn num_lanes(&self) -> usize {
        self.lanes.len()
    }

    #[must_use]
    pub fn stats(&self) -> HistoryStats {
        let capacity = self.lanes.first().map_or(0, CountRing::capacity);
        HistoryStats {
            lanes: self.lanes.len(),
            capacity,
            depth: self.lanes.first().map_or(0, CountRing::len),
            total_pushed: self.lanes.first().map_or(0, CountRing::total_pushed),
        }
    }
}

/// Serializable summary of the history buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub lanes: usize,
    pub capacity: usize,
    /// Counts currently retained per lane
    pub depth: usize,
    /// Ticks recorded since start
    pub total_pushed: u64,
}
