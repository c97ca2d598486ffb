use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::Result;

/// Hex width of a fingerprint.
pub const FINGERPRINT_LEN: usize = 64;

// Read in chunks so large files do not blow up memory.
const BUF_SIZE: usize = 1 << 20;

pub fn hash_file(path: &Path) -> Result<String> {
    let mut f = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
