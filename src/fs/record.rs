//! Fixed-layout serialization shared by every on-disk record.
//!
//! Records are encoded with bincode's legacy configuration: fixed-width
//! little-endian integers and no length prefixes for fixed arrays. Each
//! record type therefore has a deterministic encoded size, declared as
//! `DISK_SIZE` and checked by the unit tests of the record modules.

use bincode::config;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

pub(crate) trait DiskRecord: Serialize + DeserializeOwned {
    /// Exact number of bytes this record occupies on disk.
    const DISK_SIZE: usize;

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let bytes = bincode::serde::encode_to_vec(self, config::legacy())?;
        debug_assert_eq!(bytes.len(), Self::DISK_SIZE);
        Ok(bytes)
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let (record, _) = bincode::serde::decode_from_slice(buf, config::legacy())?;
        Ok(record)
    }
}
