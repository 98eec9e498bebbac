use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Length of the truncated hashes used in query strings.
pub const SHORT_HASH_LEN: usize = 8;

/// Compute the BLAKE3 hash of a file, returning the hex-encoded digest.
///
/// Streams the file content to minimize memory usage.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn blake3_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Compute the BLAKE3 hash of a byte slice, returning the hex-encoded digest.
#[must_use]
pub fn blake3_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// First [`SHORT_HASH_LEN`] hex characters of the BLAKE3 digest of `data`.
#[must_use]
pub fn short_hash(data: &[u8]) -> String {
    let mut hex = blake3_bytes(data);
    hex.truncate(SHORT_HASH_LEN);
    hex
}
