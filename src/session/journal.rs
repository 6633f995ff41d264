//! Structured transaction journal
//!
//! Append-only record of reader activity, bounded at 64 entries. Once the
//! journal is full further events are dropped silently: a saturated
//! journal is a degraded observation window, not a fault, and must never
//! change the outcome of the protocol exchange.

use crate::mfc::BlockData;

/// Maximum number of entries retained per session.
pub const LOG_CAPACITY: usize = 64;

/// Protocol event class recorded in a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Authenticate,
}

impl Operation {
    /// Short label used by the CSV export.
    pub fn label(&self) -> &'static str {
        match self {
            Operation::Read => "READ",
            Operation::Write => "WRITE",
            Operation::Authenticate => "AUTH",
        }
    }
}

/// One observed protocol event. Immutable once appended.
///
/// `data` carries the block contents involved: what the reader saw for a
/// read, what it proposed for a write, zeroes for an authentication.
/// Ticks are coarse; entries recorded in the same tick are ordered by
/// append order, not by timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry {
    pub block: u8,
    pub operation: Operation,
    pub data: BlockData,
    pub tick_ms: u32,
}

/// Bounded append-only journal.
///
/// Drop-newest on overflow, never a ring buffer: the first 64 events of a
/// session survive verbatim and callers must not assume eviction.
#[derive(Debug)]
pub struct TransactionLog {
    entries: Vec<LogEntry>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(LOG_CAPACITY),
        }
    }

    /// Append an entry. A no-op once the journal holds `LOG_CAPACITY`
    /// entries.
    pub fn append(&mut self, entry: LogEntry) {
        if self.entries.len() < LOG_CAPACITY {
            self.entries.push(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == LOG_CAPACITY
    }

    /// Entries in append order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Discard all entries (operator session reset).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new()
    }
}
