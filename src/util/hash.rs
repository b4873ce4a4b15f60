//! Hashing utilities for step input records.

use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};

/// Compute the MD5 digest of a byte slice as lowercase hex.
pub fn md5_bytes(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Compute the MD5 digest of a file.
pub fn md5_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::new(file);
    let mut context = md5::Context::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
        if bytes_read == 0 {
            break;
        }
        context.consume(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// Digest recorded for a step input.
///
/// Regular files hash their contents. Directories hash their modification
/// time in nanoseconds (8 bytes, big-endian) so a directory is versioned by
/// the last change to its entries. A missing path hashes as empty content.
pub fn input_digest(path: &Path) -> Result<String> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {
            let modified = meta
                .modified()
                .with_context(|| format!("failed to read mtime of {}", path.display()))?;
            let nanos = modified
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0);
            Ok(md5_bytes(&nanos.to_be_bytes()))
        }
        Ok(_) => md5_file(path),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(md5_bytes(b"")),
        Err(e) => Err(e).with_context(|| format!("failed to stat {}", path.display())),
    }
}
