//! Emulation session state
//!
//! One session per emulation run: the write-policy mode, activity
//! counters, balance bookkeeping, the bounded journal and key store, and
//! the card image itself. The session is owned by a single engine
//! instance and shared with the display surface behind a lock; there are
//! no process-wide singletons.

pub mod journal;
pub mod keys;

use std::time::Instant;

use crate::card::VirtualCard;
use crate::session::journal::TransactionLog;
use crate::session::keys::KeyStore;

/// Whether writes the reader is granted are committed to the card image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Commit granted writes to the card image.
    Apply,
    /// Deny writes at the protocol level and leave the card untouched.
    /// The reader sees an ordinary rejection.
    Suppress,
}

impl WritePolicy {
    /// The other mode.
    pub fn toggled(&self) -> Self {
        match self {
            WritePolicy::Apply => WritePolicy::Suppress,
            WritePolicy::Suppress => WritePolicy::Apply,
        }
    }

    /// Human-readable mode label for the narrative log and display.
    pub fn label(&self) -> &'static str {
        match self {
            WritePolicy::Apply => "NORMAL (apply writes)",
            WritePolicy::Suppress => "TESTING (ignore writes)",
        }
    }
}

/// All mutable state of one emulation run.
pub struct EmulationSession {
    pub policy: WritePolicy,
    pub emulating: bool,
    pub card: VirtualCard,
    pub log: TransactionLog,
    pub keys: KeyStore,
    /// Last balance the reader wrote or attempted to write, in cents.
    pub balance: u16,
    /// Balance parsed from the card image at session start. Never touched
    /// by protocol traffic.
    pub original_balance: u16,
    pub auth_count: u32,
    pub read_count: u32,
    pub write_count: u32,
    started: Instant,
}

impl EmulationSession {
    /// Create a session around a card image.
    ///
    /// The write policy starts suppressed so nothing the reader does can
    /// change the card until the operator opts in. Both balance fields are
    /// seeded from the card's value block; a card without a parseable
    /// value block starts at zero.
    pub fn new(card: VirtualCard) -> Self {
        let balance = card.balance().map(|v| v.value).unwrap_or(0);
        Self {
            policy: WritePolicy::Suppress,
            emulating: false,
            card,
            log: TransactionLog::new(),
            keys: KeyStore::new(),
            balance,
            original_balance: balance,
            auth_count: 0,
            read_count: 0,
            write_count: 0,
            started: Instant::now(),
        }
    }

    /// Milliseconds since the session started. Coarse and monotonic;
    /// suitable for journal ticks, not for ordering within a tick.
    pub fn tick_ms(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    /// Operator reset: discard captured state and counters, re-seed the
    /// balances from the card image, return the write policy to its
    /// fail-safe suppress default. The card image itself is kept.
    pub fn reset(&mut self) {
        self.log.clear();
        self.keys.clear();
        self.auth_count = 0;
        self.read_count = 0;
        self.write_count = 0;
        let balance = self.card.balance().map(|v| v.value).unwrap_or(0);
        self.balance = balance;
        self.original_balance = balance;
        self.policy = WritePolicy::Suppress;
        self.started = Instant::now();
    }

    /// Point-in-time copy for the display surface.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            policy: self.policy,
            emulating: self.emulating,
            balance: self.balance,
            original_balance: self.original_balance,
            auth_count: self.auth_count,
            read_count: self.read_count,
            write_count: self.write_count,
            keys_captured: self.keys.len(),
            log_entries: self.log.len(),
        }
    }
}

/// What the display surface renders each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub policy: WritePolicy,
    pub emulating: bool,
    pub balance: u16,
    pub original_balance: u16,
    pub auth_count: u32,
    pub read_count: u32,
    pub write_count: u32,
    pub keys_captured: usize,
    pub log_entries: usize,
}
