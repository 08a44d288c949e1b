//! Per-thread round-robin ring buffer (C3).
//!
//! Each thread owns one [`RingBuffer`], sized so its backing storage is
//! approximately 10 MiB. `append` writes at `next` and advances it; when
//! `next` would reach `end` the ring is drained first, synchronously, on the
//! appending thread — there is no cross-thread blocking and no atomic fence
//! on this path.

use crate::record::{Record, RECORD_SIZE};

/// Target footprint for one thread's ring: capacity is chosen so the byte
/// footprint is approximately 10 MiB.
const TARGET_BYTES: usize = 10 * 1024 * 1024;

/// `N = 10*1024*1024 / sizeof(Record)`, rounded down; always at least 1 so a
/// degenerate zero-capacity ring is impossible.
pub const CAPACITY: usize = {
    let n = TARGET_BYTES / RECORD_SIZE;
    if n == 0 {
        1
    } else {
        n
    }
};

/// A fixed-capacity array of records with an append cursor.
///
/// Invariant: `base <= next <= end` where `base` and `end` are implicit
/// (0 and `CAPACITY`); `next == CAPACITY` means the ring is full and must be
/// drained before another append.
pub struct RingBuffer {
    cells: Box<[Record; CAPACITY]>,
    next: usize,
}

/// What an `append` did, so the caller (the runtime's entry points) knows
/// whether to invoke the drain pipeline.
pub enum AppendOutcome {
    /// The record was stored; the ring has room for more.
    Stored,
    /// The record was stored and the ring is now full — the caller must
    /// drain before the next append.
    StoredAndFull,
}

impl RingBuffer {
    pub fn new() -> Self {
        // A placeholder `Record` used only to fill capacity; real slots are
        // always overwritten before being read back (`next` never exceeds
        // the populated prefix).
        let placeholder = Record::FuncEnter(0);
        RingBuffer {
            cells: vec![placeholder; CAPACITY]
                .into_boxed_slice()
                .try_into()
                .unwrap_or_else(|_| unreachable!("CAPACITY-length vec converts to boxed array")),
            next: 0,
        }
    }

    /// Number of populated records since the last drain.
    pub fn len(&self) -> usize {
        self.next
    }

    pub fn is_empty(&self) -> bool {
        self.next == 0
    }

    pub fn is_full(&self) -> bool {
        self.next == CAPACITY
    }

    /// Writes `record` at the current cursor and advances it.
    ///
    /// # Panics
    ///
    /// Panics if called while the ring is already full; callers must drain
    /// between every `StoredAndFull` outcome and the next `append` — by
    /// construction this cannot happen since every call site drains
    /// immediately on `StoredAndFull` before appending again.
    pub fn append(&mut self, record: Record) -> AppendOutcome {
        debug_assert!(self.next < CAPACITY, "append into a full ring");
        self.cells[self.next] = record;
        self.next += 1;
        if self.next == CAPACITY {
            AppendOutcome::StoredAndFull
        } else {
            AppendOutcome::Stored
        }
    }

    /// Returns the populated prefix and resets the cursor to the base.
    ///
    /// An empty ring drains to an empty slice.
    pub fn take(&mut self) -> &[Record] {
        let n = self.next;
        self.next = 0;
        &self.cells[..n]
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AccessFields;

    #[test]
    fn append_advances_cursor() {
        let mut ring = RingBuffer::new();
        assert!(ring.is_empty());
        matches!(
            ring.append(Record::DataRead(AccessFields::new(1, 1, false))),
            AppendOutcome::Stored
        );
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn fills_to_capacity_and_reports_full() {
        let mut ring = RingBuffer::new();
        let mut last_was_full = false;
        for i in 0..CAPACITY {
            let outcome = ring.append(Record::FuncEnter(i as u64));
            last_was_full = matches!(outcome, AppendOutcome::StoredAndFull);
        }
        assert!(last_was_full);
        assert!(ring.is_full());
    }

    #[test]
    fn take_resets_cursor_and_returns_populated_prefix() {
        let mut ring = RingBuffer::new();
        ring.append(Record::FuncEnter(1));
        ring.append(Record::FuncEnter(2));
        let drained = ring.take();
        assert_eq!(drained.len(), 2);
        assert!(ring.is_empty());
    }

    #[test]
    fn empty_ring_drains_to_empty_slice() {
        let mut ring = RingBuffer::new();
        assert_eq!(ring.take().len(), 0);
    }

    #[test]
    fn capacity_targets_roughly_ten_mebibytes() {
        let bytes = CAPACITY * RECORD_SIZE;
        assert!(bytes <= TARGET_BYTES);
        assert!(bytes > TARGET_BYTES - RECORD_SIZE * 2);
    }
}
