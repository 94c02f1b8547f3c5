//! Per-row dirty-flag aggregation with coalesced refresh scheduling.
//!
//! Listener tasks raise dirty bits as events arrive; the first raise after
//! a clean state wins the right to schedule exactly one marshaled refresh.
//! The refresh consumes all raised bits atomically, so N events before the
//! refresh executes collapse into one update that observes their union.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Download/favorite state needs re-rendering.
pub const DIRTY_STATUS: u8 = 1 << 0;
/// Transfer progress needs re-rendering.
pub const DIRTY_PROGRESS: u8 = 1 << 1;
/// Playback position needs re-rendering.
pub const DIRTY_TIME: u8 = 1 << 2;
/// Every per-row concern.
pub const DIRTY_ALL: u8 = DIRTY_STATUS | DIRTY_PROGRESS | DIRTY_TIME;

/// Pending-refresh bitmask, raised from listener tasks and consumed on the
/// UI-thread context.
#[derive(Debug, Default)]
pub struct DirtyFlags {
    bits: AtomicU8,
}

impl DirtyFlags {
    pub fn new() -> Self {
        DirtyFlags::default()
    }

    pub fn raise(&self, flags: u8) {
        self.bits.fetch_or(flags, Ordering::SeqCst);
    }

    /// Atomically consumes every raised flag. A raise racing with this call
    /// either lands in the returned set or stays raised for the next take.
    pub fn take(&self) -> u8 {
        self.bits.swap(0, Ordering::SeqCst)
    }

    pub fn is_clean(&self) -> bool {
        self.bits.load(Ordering::SeqCst) == 0
    }
}

/// {Clean, PendingRefresh} latch deciding who schedules the next refresh.
#[derive(Debug, Default)]
pub struct RefreshLatch {
    pending: AtomicBool,
}

impl RefreshLatch {
    pub fn new() -> Self {
        RefreshLatch::default()
    }

    /// Attempts the Clean → PendingRefresh transition. Returns true when the
    /// caller won and must schedule the refresh.
    pub fn arm(&self) -> bool {
        self.pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Returns to Clean. The refresh handler calls this *before* taking the
    /// dirty flags, so a flag raised concurrently with the refresh either
    /// lands in the taken set or re-arms a new refresh — never lost.
    pub fn disarm(&self) {
        self.pending.store(false, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}
