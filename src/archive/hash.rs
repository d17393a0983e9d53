//! Whole-archive content fingerprints

use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

/// MD5 and exact byte size of a container
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArchiveFingerprint {
    /// Lowercase hex digest
    pub md5: String,
    pub size: u64,
}

/// Fingerprint a file on disk
pub fn fingerprint_file(path: &Path) -> std::io::Result<ArchiveFingerprint> {
    let file = File::open(path)?;
    let reader = BufReader::with_capacity(1024 * 1024, file);
    fingerprint_reader(reader)
}

/// Fingerprint any byte stream, reading it to the end
pub fn fingerprint_reader<R: Read>(mut reader: R) -> std::io::Result<ArchiveFingerprint> {
    let mut context = md5::Context::new();
    let mut size = 0u64;

    let mut buffer = [0u8; 65536];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        context.write_all(&buffer[..bytes_read])?;
        size += bytes_read as u64;
    }

    let digest = context.compute();
    Ok(ArchiveFingerprint {
        md5: format!("{:x}", digest),
        size,
    })
}
