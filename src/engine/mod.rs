//! Emulation engine
//!
//! The three protocol-event handlers the radio layer drives while a
//! physical reader talks to the emulated card, plus the operator surface
//! the display context uses to observe and steer a running session.
//!
//! Handlers are synchronous and bounded-time: the radio layer blocks on
//! each returned bool to answer the live RF exchange, so nothing in here
//! performs file I/O or waits on the display context. The display side in
//! turn reads through [`EmulationEngine::snapshot`], which tries the lock
//! and skips the frame instead of stalling the exchange.

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::card::VirtualCard;
use crate::export::{ExportError, KeyExporter, LogExporter};
use crate::mfc::{self, BlockData, KeyKind, MfKey, BLOCK_SIZE};
use crate::session::journal::{LogEntry, Operation};
use crate::session::keys::CapturedKey;
use crate::session::{EmulationSession, SessionSnapshot, WritePolicy};

/// Protocol events delivered by the reader-emulation/radio layer.
///
/// The radio layer holds an implementation and invokes it synchronously,
/// one event at a time, in the order the physical reader issues them. The
/// returned bool is fed straight back into the live exchange as the
/// grant/deny outcome, so implementations must never block.
pub trait ReaderEvents {
    /// Reader authenticates to `block` with `key`.
    fn on_authenticate(&self, block: u8, kind: KeyKind, key: &MfKey) -> bool;

    /// Reader reads `block`; `data` is the contents about to be returned
    /// to it.
    fn on_read(&self, block: u8, data: &BlockData) -> bool;

    /// Reader writes `data` to `block`. Returning false rejects the write
    /// at the protocol level and the card image stays as it is.
    fn on_write(&self, block: u8, data: &BlockData) -> bool;
}

/// Owns one emulation session and answers reader events against it.
///
/// Clone the engine to hand the radio context and the display context
/// their own handle onto the same session.
#[derive(Clone)]
pub struct EmulationEngine {
    session: Arc<Mutex<EmulationSession>>,
}

impl EmulationEngine {
    /// Build an engine around a card image. The session starts with the
    /// write policy suppressed and emulation stopped.
    pub fn new(card: VirtualCard) -> Self {
        Self {
            session: Arc::new(Mutex::new(EmulationSession::new(card))),
        }
    }

    /// Begin answering reader events.
    pub fn start(&self) {
        let mut session = self.session.lock();
        session.emulating = true;
        info!("emulation started, mode: {}", session.policy.label());
    }

    /// Stop answering reader events. Captured state stays in place for
    /// inspection and export.
    pub fn stop(&self) {
        let mut session = self.session.lock();
        session.emulating = false;
        info!(
            "emulation stopped: {} auths, {} reads, {} writes, {} keys captured",
            session.auth_count,
            session.read_count,
            session.write_count,
            session.keys.len()
        );
    }

    /// Flip the write policy. The only side effect beyond the flip is the
    /// mode-change line on the narrative log; the session is not reset.
    pub fn toggle_policy(&self) -> WritePolicy {
        let mut session = self.session.lock();
        session.policy = session.policy.toggled();
        info!("mode: {}", session.policy.label());
        session.policy
    }

    /// Non-blocking snapshot for the display surface.
    ///
    /// Returns `None` when the engine context currently holds the lock;
    /// the caller skips a frame rather than stalling the live exchange.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.session.try_lock().map(|session| session.snapshot())
    }

    /// Copy of the captured keys, first-seen order (operator context).
    pub fn captured_keys(&self) -> Vec<CapturedKey> {
        self.session.lock().keys.keys().to_vec()
    }

    /// Copy of the journal entries, append order (operator context).
    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.session.lock().log.entries().to_vec()
    }

    /// Copy of the current card image (operator context).
    pub fn card(&self) -> VirtualCard {
        self.session.lock().card.clone()
    }

    /// Operator reset: discard captured keys, journal, counters and
    /// balance bookkeeping. The card image survives.
    pub fn reset_session(&self) {
        self.session.lock().reset();
        info!("session reset");
    }

    /// Operator balance preset: writes an encoded value block straight
    /// into the card image. This is not reader traffic, so it bypasses the
    /// write-policy gate and the journal.
    pub fn set_balance(&self, cents: u16) {
        let mut session = self.session.lock();
        session.card.set_balance(cents);
        session.balance = cents;
        info!("balance preset to {} cents", cents);
    }

    /// Serialize the captured keys through `exporter`.
    ///
    /// State is copied out under the lock; the file write happens after it
    /// is released so a slow disk never leaks into the event context.
    pub fn export_keys(&self, exporter: &KeyExporter) -> Result<usize, ExportError> {
        let keys = self.captured_keys();
        exporter.write_keys(&keys)
    }

    /// Serialize the journal as CSV through `exporter`.
    pub fn export_log(&self, exporter: &LogExporter) -> Result<usize, ExportError> {
        let entries = self.log_entries();
        exporter.write_log(&entries)
    }

    /// Application teardown: stop emulating and perform the automatic
    /// final key export.
    pub fn shutdown(&self, exporter: &KeyExporter) -> Result<usize, ExportError> {
        self.stop();
        self.export_keys(exporter)
    }
}

impl ReaderEvents for EmulationEngine {
    fn on_authenticate(&self, block: u8, kind: KeyKind, key: &MfKey) -> bool {
        let mut session = self.session.lock();
        let sector = mfc::sector_of(block);

        info!(
            "reader AUTH block {} sector {} (Key {}): {}",
            block,
            sector,
            kind.label(),
            key.hex()
        );
        if kind == KeyKind::B {
            warn!("write key offered for sector {}: {}", sector, key.hex());
        }

        session.auth_count += 1;
        session.keys.record(sector, kind, *key);
        let tick_ms = session.tick_ms();
        session.log.append(LogEntry {
            block,
            operation: Operation::Authenticate,
            data: [0u8; BLOCK_SIZE],
            tick_ms,
        });

        // Granting unconditionally keeps the reader talking; a denial
        // would end the exchange before it reveals any write intent.
        true
    }

    fn on_read(&self, block: u8, data: &BlockData) -> bool {
        let mut session = self.session.lock();

        debug!("reader READ block {}", block);

        session.read_count += 1;
        let tick_ms = session.tick_ms();
        session.log.append(LogEntry {
            block,
            operation: Operation::Read,
            data: *data,
            tick_ms,
        });

        true
    }

    fn on_write(&self, block: u8, data: &BlockData) -> bool {
        let mut session = self.session.lock();

        info!("reader WRITE block {}", block);

        session.write_count += 1;
        let tick_ms = session.tick_ms();
        session.log.append(LogEntry {
            block,
            operation: Operation::Write,
            data: *data,
            tick_ms,
        });

        if mfc::is_balance_block(block) {
            let attempted = mfc::decode_amount(data);
            info!(
                "balance change on block {}: {} -> {} cents",
                block, session.balance, attempted
            );
            // Tracks what the reader attempted, distinct from what gets
            // committed below. A suppressed write still lands here.
            session.balance = attempted;
        }

        match session.policy {
            WritePolicy::Apply => {
                debug!("applying write to block {}", block);
                session.card.write_block(block, data);
                true
            }
            WritePolicy::Suppress => {
                warn!("ignoring write to block {} (testing mode)", block);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mfc::BALANCE_BLOCKS;
    use crate::session::journal::LOG_CAPACITY;
    use crate::session::keys::KEY_CAPACITY;

    fn engine_with_balance(cents: u16) -> EmulationEngine {
        let mut card = VirtualCard::new(vec![0x04, 0x11, 0x22, 0x33]);
        card.set_balance(cents);
        EmulationEngine::new(card)
    }

    fn balance_write(cents: u16) -> BlockData {
        let mut data = [0u8; BLOCK_SIZE];
        data[0] = (cents & 0xFF) as u8;
        data[1] = (cents >> 8) as u8;
        data
    }

    #[test]
    fn test_authenticate_always_grants() {
        let engine = engine_with_balance(0);
        assert!(engine.on_authenticate(0, KeyKind::A, &MfKey([0u8; 6])));
        assert!(engine.on_authenticate(63, KeyKind::B, &MfKey([0xFF; 6])));

        let snap = engine.snapshot().unwrap();
        assert_eq!(snap.auth_count, 2);
        assert_eq!(snap.log_entries, 2);
    }

    #[test]
    fn test_authenticate_dedups_key_across_sectors() {
        // Same key bytes offered for different sectors and roles produce
        // exactly one stored entry, first-seen attribution retained.
        let engine = engine_with_balance(0);
        let shared = MfKey([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

        assert!(engine.on_authenticate(4, KeyKind::B, &shared));
        assert!(engine.on_authenticate(8, KeyKind::A, &shared));

        let keys = engine.captured_keys();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].sector, 1);
        assert_eq!(keys[0].kind, KeyKind::B);
        assert_eq!(keys[0].key, shared);
    }

    #[test]
    fn test_key_store_bounded_by_capacity() {
        let engine = engine_with_balance(0);
        for i in 0..(KEY_CAPACITY as u8 + 10) {
            engine.on_authenticate(0, KeyKind::A, &MfKey([i; 6]));
        }
        assert_eq!(engine.captured_keys().len(), KEY_CAPACITY);
    }

    #[test]
    fn test_read_observes_without_mutating() {
        let engine = engine_with_balance(250);
        let before = engine.card();

        assert!(engine.on_read(4, &[0x42; BLOCK_SIZE]));

        let snap = engine.snapshot().unwrap();
        assert_eq!(snap.read_count, 1);
        assert_eq!(snap.balance, 250);
        assert_eq!(engine.card().block(4), before.block(4));

        let entries = engine.log_entries();
        assert_eq!(entries[0].operation, Operation::Read);
        assert_eq!(entries[0].data, [0x42; BLOCK_SIZE]);
    }

    #[test]
    fn test_suppressed_write_denied_but_tracked() {
        // Default mode suppresses: the write is denied, the card image is
        // untouched, yet the attempted balance is visible to the analyst.
        let engine = engine_with_balance(250);
        let before = *engine.card().block(4).unwrap();

        let granted = engine.on_write(4, &balance_write(100));
        assert!(!granted);

        let snap = engine.snapshot().unwrap();
        assert_eq!(snap.balance, 100);
        assert_eq!(snap.original_balance, 250);
        assert_eq!(snap.write_count, 1);
        assert_eq!(*engine.card().block(4).unwrap(), before);
    }

    #[test]
    fn test_applied_write_commits_to_card() {
        let engine = engine_with_balance(250);
        assert_eq!(engine.toggle_policy(), WritePolicy::Apply);

        let proposed = balance_write(100);
        let granted = engine.on_write(4, &proposed);
        assert!(granted);

        let snap = engine.snapshot().unwrap();
        assert_eq!(snap.balance, 100);
        assert_eq!(*engine.card().block(4).unwrap(), proposed);
    }

    #[test]
    fn test_write_to_plain_block_keeps_balance() {
        let engine = engine_with_balance(250);
        engine.on_write(5, &[0x77; BLOCK_SIZE]);

        let snap = engine.snapshot().unwrap();
        assert_eq!(snap.balance, 250);
        assert_eq!(snap.write_count, 1);
    }

    #[test]
    fn test_write_journals_proposed_data_even_when_suppressed() {
        let engine = engine_with_balance(0);
        let proposed = [0x13; BLOCK_SIZE];
        engine.on_write(9, &proposed);

        let entries = engine.log_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, Operation::Write);
        assert_eq!(entries[0].data, proposed);
    }

    #[test]
    fn test_journal_saturates_at_capacity() {
        let engine = engine_with_balance(0);
        for i in 0..70u32 {
            engine.on_read((i % 60) as u8, &[0u8; BLOCK_SIZE]);
        }

        let entries = engine.log_entries();
        assert_eq!(entries.len(), LOG_CAPACITY);
        // First 64 reads survive in order; the tail was dropped.
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.block, (i % 60) as u8);
        }

        let snap = engine.snapshot().unwrap();
        assert_eq!(snap.read_count, 70);
    }

    #[test]
    fn test_toggle_policy_is_a_pure_flip() {
        let engine = engine_with_balance(100);
        engine.on_authenticate(0, KeyKind::A, &MfKey([0x55; 6]));

        assert_eq!(engine.toggle_policy(), WritePolicy::Apply);
        assert_eq!(engine.toggle_policy(), WritePolicy::Suppress);

        // Toggling never resets the session.
        let snap = engine.snapshot().unwrap();
        assert_eq!(snap.auth_count, 1);
        assert_eq!(snap.keys_captured, 1);
    }

    #[test]
    fn test_balance_preset_bypasses_gate_and_journal() {
        let engine = engine_with_balance(0);
        engine.set_balance(1000);

        let snap = engine.snapshot().unwrap();
        assert_eq!(snap.balance, 1000);
        assert_eq!(snap.write_count, 0);
        assert!(engine.log_entries().is_empty());
        assert_eq!(engine.card().balance().unwrap().value, 1000);

        // The preset survives in the card image across a session reset.
        engine.reset_session();
        let snap = engine.snapshot().unwrap();
        assert_eq!(snap.balance, 1000);
        assert_eq!(snap.original_balance, 1000);
    }

    #[test]
    fn test_start_stop_flag() {
        let engine = engine_with_balance(0);
        assert!(!engine.snapshot().unwrap().emulating);
        engine.start();
        assert!(engine.snapshot().unwrap().emulating);
        engine.stop();
        assert!(!engine.snapshot().unwrap().emulating);
    }

    #[test]
    fn test_radio_layer_sees_a_trait_object() {
        let engine = engine_with_balance(0);
        let handler: &dyn ReaderEvents = &engine;

        assert!(handler.on_authenticate(4, KeyKind::A, &MfKey([0x10; 6])));
        assert!(handler.on_read(4, &[0u8; BLOCK_SIZE]));
        assert!(!handler.on_write(4, &balance_write(60)));
    }

    #[test]
    fn test_shutdown_performs_final_key_export() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let exporter = KeyExporter::new(Some(temp_dir.path().join("keys.txt")));

        let engine = engine_with_balance(0);
        engine.start();
        engine.on_authenticate(4, KeyKind::B, &MfKey([0xAB; 6]));

        assert_eq!(engine.shutdown(&exporter).unwrap(), 1);
        assert!(!engine.snapshot().unwrap().emulating);

        let contents = std::fs::read_to_string(exporter.path()).unwrap();
        assert!(contents.contains("S1:KeyB:ABABABABABAB"));
    }

    #[test]
    fn test_clones_share_one_session() {
        let engine = engine_with_balance(0);
        let display = engine.clone();

        engine.on_authenticate(0, KeyKind::A, &MfKey([0x01; 6]));
        assert_eq!(display.snapshot().unwrap().auth_count, 1);
    }
}
