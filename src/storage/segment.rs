use std::fs;
use std::path::Path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::core::types::{DataType, KeyId};
use crate::storage::layout::write_atomic;

/// Location of one key's tree inside the compound file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPage {
    pub key_id: KeyId,
    pub offset: u64,
    pub length: u64,
}

/// Byte range of a section of the compound file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub offset: u64,
    pub length: u64,
}

impl Section {
    pub fn slice<'a>(&self, data: &'a [u8]) -> Result<&'a [u8]> {
        let start = self.offset as usize;
        data.get(start..start + self.length as usize).ok_or_else(|| {
            Error::malformed(format!(
                "section [{}..+{}) beyond compound file of {} bytes",
                self.offset,
                self.length,
                data.len()
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub name: String,
    pub data_type: DataType,
}

/// Descriptor of a published segment (`<version>.ix`).
///
/// Compound file (`<version>.rdb`) layout:
/// ```text
/// [column trees][vector snapshot][postings snapshot][doc hashes: u64 * n][doc addresses: 12 bytes * n]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub doc_count: u64,
    pub keys: Vec<KeyInfo>,           // Indexed by key id
    pub columns: Vec<ColumnPage>,     // Page table, sorted by key id
    pub vectors: Section,
    pub postings: Section,
    pub doc_hash_offset: u64,
    pub doc_address_offset: u64,
}

const MAGIC: [u8; 4] = *b"VDXS";
const FRAME_HEADER_SIZE: usize = 4 + 4;

impl SegmentInfo {
    pub fn column(&self, key_id: KeyId) -> Option<&ColumnPage> {
        self.columns
            .binary_search_by_key(&key_id, |page| page.key_id)
            .ok()
            .map(|i| &self.columns[i])
    }

    pub fn key_id(&self, name: &str) -> Option<KeyId> {
        self.keys.iter().position(|k| k.name == name).map(|i| KeyId(i as u32))
    }

    /// magic | payload length u32 | bincode payload | crc32 of payload
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len() + 4);
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);
        buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < FRAME_HEADER_SIZE + 4 || data[0..4] != MAGIC {
            return Err(Error::malformed("segment descriptor has no valid header"));
        }

        let mut len = [0u8; 4];
        len.copy_from_slice(&data[4..8]);
        let len = u32::from_le_bytes(len) as usize;

        let payload = data
            .get(FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len)
            .ok_or_else(|| Error::malformed("segment descriptor is truncated"))?;
        let stored = data
            .get(FRAME_HEADER_SIZE + len..FRAME_HEADER_SIZE + len + 4)
            .ok_or_else(|| Error::malformed("segment descriptor has no checksum"))?;

        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(stored);
        if crc32fast::hash(payload) != u32::from_le_bytes(checksum) {
            return Err(Error::malformed("segment descriptor checksum mismatch"));
        }

        Ok(bincode::deserialize(payload)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Publishes the descriptor; the version becomes visible to readers here
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_bytes()?)
    }
}
