//! SHA-256 content fingerprints used as cache keys.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Buffer size for reading files (8KB)
const BUFFER_SIZE: usize = 8192;

/// Hex SHA-256 digest of a file's bytes
pub type Fingerprint = String;

/// Fingerprint a file, or `None` when it cannot be read.
///
/// A missing fingerprint disables caching for that file only.
pub fn fingerprint_file(path: &Path) -> Option<Fingerprint> {
    match File::open(path).and_then(|file| fingerprint_reader(BufReader::new(file))) {
        Ok(digest) => Some(digest),
        Err(e) => {
            tracing::warn!("[Fingerprint] Cannot hash {}: {}", path.display(), e);
            None
        }
    }
}

/// Stream any reader through SHA-256 in fixed-size chunks
pub fn fingerprint_reader<R: Read>(mut reader: R) -> io::Result<Fingerprint> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; BUFFER_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
