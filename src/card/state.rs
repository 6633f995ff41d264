//! Emulated card contents
//!
//! The block image presented to the reader. Only committed writes and
//! explicit operator presets mutate it; suppressed writes leave it intact
//! no matter what the reader believes happened.

use serde::{Deserialize, Serialize};

use crate::mfc::{self, BlockData, ValueBlock, BALANCE_BLOCKS, BLOCK_COUNT, BLOCK_SIZE};

/// Custom serde module for base64 encoding of byte vectors
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if bytes.is_empty() {
            serializer.serialize_str("")
        } else {
            serializer.serialize_str(&STANDARD.encode(bytes))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(Vec::new());
        }
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Custom serde module for the block image, stored as one base64 blob of
/// the flattened 1024 bytes.
mod block_image {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::mfc::{BlockData, BLOCK_COUNT, BLOCK_SIZE};

    pub fn serialize<S>(blocks: &[BlockData; BLOCK_COUNT], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut flat = Vec::with_capacity(BLOCK_COUNT * BLOCK_SIZE);
        for block in blocks.iter() {
            flat.extend_from_slice(block);
        }
        serializer.serialize_str(&STANDARD.encode(&flat))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[BlockData; BLOCK_COUNT], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        let flat = STANDARD.decode(&s).map_err(serde::de::Error::custom)?;
        if flat.len() != BLOCK_COUNT * BLOCK_SIZE {
            return Err(serde::de::Error::custom(format!(
                "card image must be {} bytes, got {}",
                BLOCK_COUNT * BLOCK_SIZE,
                flat.len()
            )));
        }
        let mut blocks = [[0u8; BLOCK_SIZE]; BLOCK_COUNT];
        for (i, chunk) in flat.chunks_exact(BLOCK_SIZE).enumerate() {
            blocks[i].copy_from_slice(chunk);
        }
        Ok(blocks)
    }
}

/// The emulated card image: 64 blocks of 16 bytes plus the tag UID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualCard {
    /// ISO14443-3A UID of the emulated tag.
    #[serde(with = "base64_bytes")]
    pub uid: Vec<u8>,
    /// Raw block image.
    #[serde(with = "block_image")]
    blocks: [BlockData; BLOCK_COUNT],
}

impl VirtualCard {
    /// Create a zeroed card image with the given UID.
    pub fn new(uid: Vec<u8>) -> Self {
        Self {
            uid,
            blocks: [[0u8; BLOCK_SIZE]; BLOCK_COUNT],
        }
    }

    /// Contents of `block`, or `None` when the index is off the card.
    pub fn block(&self, block: u8) -> Option<&BlockData> {
        self.blocks.get(block as usize)
    }

    /// Commit `data` into `block`. Returns false when the index is off the
    /// card, leaving the image untouched.
    pub fn write_block(&mut self, block: u8, data: &BlockData) -> bool {
        match self.blocks.get_mut(block as usize) {
            Some(slot) => {
                *slot = *data;
                true
            }
            None => false,
        }
    }

    /// Parse the primary balance block as a value block.
    pub fn balance(&self) -> Option<ValueBlock> {
        self.block(BALANCE_BLOCKS[0]).and_then(mfc::parse_value_block)
    }

    /// Encode `cents` into the primary balance block and mirror the whole
    /// block into the secondary one, the way the stored-value scheme keeps
    /// its redundant copy.
    pub fn set_balance(&mut self, cents: u16) {
        let primary = BALANCE_BLOCKS[0] as usize;
        mfc::encode_amount(&mut self.blocks[primary], cents);
        self.blocks[BALANCE_BLOCKS[1] as usize] = self.blocks[primary];
    }
}

impl Default for VirtualCard {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
