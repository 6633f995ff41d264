//! Card image persistence
//!
//! JSON load/save of the emulated card image so a captured card can be
//! re-emulated across runs.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::state::VirtualCard;

/// Directory card images and exports land in when the caller does not
/// supply a path. Checks the `MFC_INTERCEPT_DIR` environment variable
/// first, then falls back to `~/.mfc-intercept`.
pub(crate) fn default_storage_dir() -> PathBuf {
    if let Ok(path) = std::env::var("MFC_INTERCEPT_DIR") {
        return PathBuf::from(path);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".mfc-intercept");
    }
    PathBuf::from("/var/lib/mfc-intercept")
}

/// Handles persistent storage of the card image
pub struct CardStore {
    storage_dir: PathBuf,
    card_file: PathBuf,
}

impl CardStore {
    const DEFAULT_CARD_FILE: &'static str = "card_image.json";

    /// Create a new card store rooted at `storage_path`, or at the default
    /// storage directory when `None`.
    pub fn new(storage_path: Option<PathBuf>) -> Self {
        let storage_dir = storage_path.unwrap_or_else(default_storage_dir);
        let card_file = storage_dir.join(Self::DEFAULT_CARD_FILE);

        Self {
            storage_dir,
            card_file,
        }
    }

    /// Path of the card image file.
    pub fn card_file(&self) -> &Path {
        &self.card_file
    }

    /// Ensure the storage directory exists
    fn ensure_storage_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.storage_dir)
    }

    /// Load a card image from storage.
    ///
    /// Returns `None` when no image exists or the file does not parse; a
    /// corrupt image is reported but never fatal.
    pub fn load(&self) -> Option<VirtualCard> {
        if !self.card_file.exists() {
            info!("no existing card image at {:?}", self.card_file);
            return None;
        }

        match fs::read_to_string(&self.card_file) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(card) => {
                    info!("loaded card image from {:?}", self.card_file);
                    Some(card)
                }
                Err(e) => {
                    warn!("failed to parse card image: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("failed to read card image file: {}", e);
                None
            }
        }
    }

    /// Save the card image to storage. Returns false on any failure, after
    /// reporting it; the in-memory card is unaffected either way.
    pub fn save(&self, card: &VirtualCard) -> bool {
        if let Err(e) = self.ensure_storage_dir() {
            warn!("failed to create storage directory: {}", e);
            return false;
        }

        match serde_json::to_string_pretty(card) {
            Ok(json) => match fs::write(&self.card_file, json) {
                Ok(()) => {
                    debug!("saved card image to {:?}", self.card_file);
                    true
                }
                Err(e) => {
                    warn!("failed to write card image: {}", e);
                    false
                }
            },
            Err(e) => {
                warn!("failed to serialize card image: {}", e);
                false
            }
        }
    }
}
