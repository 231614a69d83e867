//! Content digests.
//!
//! Every digest in hoist is the lowercase hex SHA-256 of the exact bytes it
//! describes. The same string is used as the content-store filename.

use std::io::{Cursor, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{RegistryError, RegistryResult};

/// Length of a hex digest.
pub const DIGEST_HEX_LEN: usize = 64;

pub fn digest_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    digest_reader(Cursor::new(bytes)).expect("reading from a cursor cannot fail")
}

/// Digest a file on disk.
pub fn digest_file(path: &Path) -> RegistryResult<String> {
    let file = std::fs::File::open(path).map_err(|e| RegistryError::io("open", path, e))?;
    digest_reader(std::io::BufReader::new(file)).map_err(|e| RegistryError::io("read", path, e))
}

/// Whether `s` has the shape of a digest produced by this module.
pub fn is_digest(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
