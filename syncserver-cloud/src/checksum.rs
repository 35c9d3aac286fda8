//! Provider checksum algorithms.
//!
//! Each provider reports its own digest. A client checksum is only ever
//! compared against the checksum of the provider that stores the file.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use syncserver_types::CloudStorageType;

/// Dropbox hashes content in 4 MiB blocks.
pub const DROPBOX_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Google Drive `md5Checksum`.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// OneDrive `sha1Hash`. Graph reports it upper-case.
pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode_upper(Sha1::digest(data))
}

/// Dropbox `content_hash`: SHA-256 over the concatenated SHA-256 of each block.
pub fn dropbox_content_hash(data: &[u8]) -> String {
    let mut overall = Sha256::new();
    for block in data.chunks(DROPBOX_BLOCK_SIZE) {
        overall.update(Sha256::digest(block));
    }
    hex::encode(overall.finalize())
}

/// Checksum `data` the way the given provider would.
pub fn compute(storage_type: CloudStorageType, data: &[u8]) -> String {
    match storage_type {
        CloudStorageType::Google => md5_hex(data),
        CloudStorageType::Dropbox => dropbox_content_hash(data),
        CloudStorageType::OneDrive => sha1_hex(data),
    }
}

/// Hex digests compare case-insensitively.
pub fn checksums_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
