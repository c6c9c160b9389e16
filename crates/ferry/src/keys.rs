//! Key encodings for typed stores
//!
//! Keys must encode so that byte-lexicographic order in the raw store is the
//! order callers expect when scanning.

use ferry_core::{FerryError, Offset, Result};

/// A type usable as an entity store key
pub trait StoreKey: Sized {
    fn to_key_bytes(&self) -> Vec<u8>;

    fn from_key_bytes(bytes: &[u8]) -> Result<Self>;
}

impl StoreKey for String {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
        String::from_utf8(bytes.to_vec()).map_err(|e| FerryError::Serialization(e.to_string()))
    }
}

impl StoreKey for Vec<u8> {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.clone()
    }

    fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

/// Offsets are stored as 8-byte big-endian so byte order equals numeric
/// order. Only non-negative offsets are ever written.
impl StoreKey for Offset {
    fn to_key_bytes(&self) -> Vec<u8> {
        offset_to_key(*self).to_vec()
    }

    fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
        key_to_offset(bytes).ok_or_else(|| {
            FerryError::Serialization(format!("invalid offset key of {} bytes", bytes.len()))
        })
    }
}

/// Format an offset as big-endian bytes (preserves sort order)
pub fn offset_to_key(offset: Offset) -> [u8; 8] {
    (offset as u64).to_be_bytes()
}

/// Parse an offset from big-endian bytes
pub fn key_to_offset(bytes: &[u8]) -> Option<Offset> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Offset::try_from(u64::from_be_bytes(raw)).ok()
}
