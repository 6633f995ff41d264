//! MIFARE Classic emulation and interception engine
//!
//! Stands in for a contactless stored-value card: answers a reader's
//! authenticate/read/write operations indistinguishably from the real
//! card, decides per write whether the reader's effect reaches the
//! emulated card image, and harvests every sector key the reader
//! discloses along the way. Authentication is always granted, since
//! refusing would end the exchange before the reader reveals its
//! intentions.
//!
//! The radio/protocol collaborator drives the engine through the
//! [`engine::ReaderEvents`] trait, one event at a time; a display/operator
//! context concurrently observes the session through non-blocking
//! snapshots and triggers mode toggles, resets and exports. The protocol
//! context is never blocked on the display context.

pub mod card;
pub mod engine;
pub mod export;
pub mod mfc;
pub mod session;

pub use card::{CardStore, VirtualCard};
pub use engine::{EmulationEngine, ReaderEvents};
pub use export::{ExportError, KeyExporter, LogExporter};
pub use session::{EmulationSession, SessionSnapshot, WritePolicy};
