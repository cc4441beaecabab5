//! Position handles: an opaque token bound to the reader/writer that
//! produced it. The only legal operations on it are `setpos` on that
//! same stream and `release`.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one reader/writer instance so a `Position` can be rejected
/// if it's handed to the wrong stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StreamId(u64);

impl StreamId {
    pub(crate) fn new() -> Self {
        Self(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
pub(crate) enum PositionKind {
    File(u64),
    Slice(u64),
    Queue(u64),
    External { token: u64, readahead: Vec<u8> },
    /// A recorder/accumulator position additionally remembers how many
    /// bytes had been written when it was taken, so a `reset()` between
    /// `getpos` and `setpos` can be detected: `setpos` checks the
    /// generation before trusting the offset, and aborts on a mismatch.
    Buffered { offset: u64, generation: u64 },
}

/// An opaque handle produced by `getpos` and consumed by `setpos`.
#[derive(Debug, Clone)]
pub struct Position {
    pub(crate) origin: StreamId,
    pub(crate) kind: PositionKind,
    /// The reader's state register at capture time, so `setpos` restores
    /// a mid-byte position exactly, not just the backend's byte offset.
    /// Unused (always 0) for writer-side positions, which are only ever
    /// taken while byte-aligned.
    pub(crate) state: u16,
}
