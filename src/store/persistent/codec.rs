//! Binary framing for snapshot files.
//!
//! A snapshot file is a header followed by exactly one frame:
//!
//! ```text
//! [magic: "GEOF"][format: 1 byte]
//! [version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
//! ```

use std::io::{ErrorKind, Read};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

use crate::store::StorageError;

/// Current frame version.
const FRAME_VERSION: u8 = 1;

/// Current file format version written after the magic bytes.
pub const FORMAT_VERSION: u8 = 1;

/// Magic bytes identifying geonote snapshot files.
pub const MAGIC: [u8; 4] = *b"GEOF";

/// A geofence collection is small; anything larger is treated as corrupt.
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

fn read_exact(reader: &mut impl Read, buf: &mut [u8], what: &str) -> Result<(), StorageError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            StorageError::Corrupt(format!("truncated {what}"))
        } else {
            StorageError::Io(e)
        }
    })
}

/// Serializes a value into a checksummed frame.
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let data = serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
    if data.len() > MAX_FRAME_SIZE {
        return Err(StorageError::Serialization(format!(
            "snapshot of {} bytes exceeds maximum {}",
            data.len(),
            MAX_FRAME_SIZE
        )));
    }

    let mut hasher = Hasher::new();
    hasher.update(&data);
    let crc = hasher.finalize();

    #[allow(clippy::cast_possible_truncation)]
    let len = data.len() as u32;

    let mut out = Vec::with_capacity(1 + 4 + data.len() + 4);
    out.push(FRAME_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(out)
}

/// Deserializes one frame, verifying its checksum.
pub fn decode_frame<T: DeserializeOwned>(reader: &mut impl Read) -> Result<T, StorageError> {
    let mut version = [0u8; 1];
    read_exact(reader, &mut version, "frame version")?;
    if version[0] != FRAME_VERSION {
        return Err(StorageError::Corrupt(format!(
            "unsupported frame version: {} (expected {})",
            version[0], FRAME_VERSION
        )));
    }

    let mut len_bytes = [0u8; 4];
    read_exact(reader, &mut len_bytes, "frame length")?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(StorageError::Corrupt(format!(
            "frame size {len} exceeds maximum {MAX_FRAME_SIZE}"
        )));
    }

    let mut data = vec![0u8; len];
    read_exact(reader, &mut data, "frame data")?;

    let mut crc_bytes = [0u8; 4];
    read_exact(reader, &mut crc_bytes, "frame checksum")?;
    let stored_crc = u32::from_le_bytes(crc_bytes);

    let mut hasher = Hasher::new();
    hasher.update(&data);
    let computed_crc = hasher.finalize();
    if stored_crc != computed_crc {
        return Err(StorageError::Corrupt(format!(
            "CRC mismatch: stored={stored_crc:08x}, computed={computed_crc:08x}"
        )));
    }

    serde_json::from_slice(&data).map_err(|e| StorageError::Corrupt(format!("invalid snapshot body: {e}")))
}

/// Append the file header (magic + format version).
pub fn write_header(out: &mut Vec<u8>) {
    out.extend_from_slice(&MAGIC);
    out.push(FORMAT_VERSION);
}

/// Read and validate the file header.
pub fn read_header(reader: &mut impl Read) -> Result<(), StorageError> {
    let mut magic = [0u8; 4];
    read_exact(reader, &mut magic, "header")?;
    if magic != MAGIC {
        return Err(StorageError::Corrupt(format!(
            "invalid magic bytes: expected {MAGIC:?}, got {magic:?}"
        )));
    }

    let mut format = [0u8; 1];
    read_exact(reader, &mut format, "header")?;
    if format[0] != FORMAT_VERSION {
        return Err(StorageError::Corrupt(format!(
            "unsupported format version: {}",
            format[0]
        )));
    }
    Ok(())
}
