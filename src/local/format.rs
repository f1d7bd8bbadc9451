//! On-disk layout of backup records and the store manifest.

use crate::error::{Result, StoreError};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for record files.
const RECORD_MAGIC: &[u8; 4] = b"ANR\0";

/// Current record file format version.
const RECORD_VERSION: u8 = 1;

/// Magic bytes for the store manifest.
const MANIFEST_MAGIC: &[u8; 4] = b"ANS\0";

/// Encode one record file: header, key, payload, CRC32 of the payload.
pub(crate) fn encode_record(key: &str, payload: &[u8]) -> Result<Vec<u8>> {
    let key_bytes = key.as_bytes();
    let key_len = u16::try_from(key_bytes.len())
        .map_err(|_| StoreError::InvalidOperation(format!("key too long: {} bytes", key_bytes.len())))?;

    let mut out = Vec::with_capacity(4 + 1 + 2 + key_bytes.len() + 8 + payload.len() + 4);
    out.extend_from_slice(RECORD_MAGIC);
    out.push(RECORD_VERSION);
    out.extend_from_slice(&key_len.to_le_bytes());
    out.extend_from_slice(key_bytes);
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    Ok(out)
}

/// Decode a record file into `(key, payload)`, verifying the checksum.
pub(crate) fn decode_record(mut bytes: &[u8]) -> Result<(String, Vec<u8>)> {
    let mut magic = [0u8; 4];
    bytes.read_exact(&mut magic)?;
    if &magic != RECORD_MAGIC {
        return Err(StoreError::InvalidFormat("Invalid record magic".into()));
    }

    let mut version = [0u8; 1];
    bytes.read_exact(&mut version)?;
    if version[0] != RECORD_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported record version: {}",
            version[0]
        )));
    }

    let mut key_len = [0u8; 2];
    bytes.read_exact(&mut key_len)?;
    let mut key = vec![0u8; u16::from_le_bytes(key_len) as usize];
    bytes.read_exact(&mut key)?;
    let key = String::from_utf8(key)
        .map_err(|e| StoreError::InvalidFormat(format!("record key is not UTF-8: {e}")))?;

    let mut payload_len = [0u8; 8];
    bytes.read_exact(&mut payload_len)?;
    let payload_len = u64::from_le_bytes(payload_len) as usize;
    if payload_len > bytes.len() {
        return Err(StoreError::Corruption(format!(
            "payload length {payload_len} exceeds file size"
        )));
    }
    let mut payload = vec![0u8; payload_len];
    bytes.read_exact(&mut payload)?;

    let mut checksum = [0u8; 4];
    bytes.read_exact(&mut checksum)?;
    let stored = u32::from_le_bytes(checksum);
    let computed = crc32fast::hash(&payload);
    if stored != computed {
        return Err(StoreError::ChecksumMismatch {
            expected: stored,
            got: computed,
        });
    }

    Ok((key, payload))
}

/// Write `bytes` to `path` through a temp sibling, fsynced, then renamed.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Schema version recorded in the manifest, or `None` for a fresh directory.
pub(crate) fn read_manifest(root: &Path) -> Result<Option<u8>> {
    let manifest_path = root.join("MANIFEST");
    if !manifest_path.exists() {
        return Ok(None);
    }

    let mut file = File::open(manifest_path)?;
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != MANIFEST_MAGIC {
        return Err(StoreError::InvalidFormat("Invalid store magic".into()));
    }

    let mut version = [0u8; 1];
    file.read_exact(&mut version)?;
    Ok(Some(version[0]))
}

pub(crate) fn write_manifest(root: &Path, version: u8) -> Result<()> {
    let mut bytes = Vec::with_capacity(5);
    bytes.extend_from_slice(MANIFEST_MAGIC);
    bytes.push(version);
    write_atomic(&root.join("MANIFEST"), &bytes)
}
