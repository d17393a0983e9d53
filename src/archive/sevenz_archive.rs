//! 7z container access, including 7z payloads embedded in self-extracting executables

use super::{
    build_entries, fingerprint_file, read_head, read_limited, ArchiveError, ArchiveFingerprint, ArchiveFormat, Entry,
    ModArchive, MAX_ENTRY_READ,
};
use sevenz_rust::{Password, SevenZReader};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// 7z signature header
pub(crate) const SIGNATURE: [u8; 6] = [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];

/// An opened 7z archive
pub struct SevenZipArchive {
    path: PathBuf,
    format: ArchiveFormat,
    reader: SevenZReader<OffsetReader<File>>,
    /// Names as stored in the container, used to find entries during extraction
    raw_names: Vec<String>,
    entries: Vec<Entry>,
}

impl SevenZipArchive {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        Self::open_at(path, 0, ArchiveFormat::SevenZip)
    }

    /// Open the 7z payload of a self-extracting executable
    pub fn open_self_extracting(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        let offset = find_signature(BufReader::new(file))?.ok_or_else(|| {
            ArchiveError::Unsupported(format!(
                "{} is an executable without an embedded 7z payload",
                path.display()
            ))
        })?;
        tracing::debug!("Found 7z payload at offset {} in {}", offset, path.display());
        Self::open_at(path, offset, ArchiveFormat::SelfExtracting)
    }

    fn open_at(path: &Path, offset: u64, format: ArchiveFormat) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len().saturating_sub(offset);
        let source = OffsetReader::new(file, offset, len)?;
        let reader = SevenZReader::new(source, len, Password::empty())
            .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

        let raw_names: Vec<String> = reader
            .archive()
            .files
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        let entries = build_entries(
            reader
                .archive()
                .files
                .iter()
                .map(|f| (f.name().to_string(), f.size(), f.is_directory())),
        )?;

        Ok(Self {
            path: path.to_path_buf(),
            format,
            reader,
            raw_names,
            entries,
        })
    }

    fn read_entry(&mut self, index: usize, max_len: Option<usize>) -> Result<Vec<u8>, ArchiveError> {
        let target = self
            .raw_names
            .get(index)
            .cloned()
            .ok_or(ArchiveError::NoSuchEntry(index))?;
        let listed = self.entries.get(index).ok_or(ArchiveError::NoSuchEntry(index))?;
        if max_len.is_none() && listed.size > MAX_ENTRY_READ {
            return Err(ArchiveError::EntryTooLarge {
                path: listed.path.clone(),
                size: listed.size,
            });
        }

        // Entries sharing a name are told apart by their position
        let occurrence = self.raw_names[..index].iter().filter(|n| **n == target).count();
        let mut seen = 0usize;
        let mut found: Option<Result<Vec<u8>, ArchiveError>> = None;

        self.reader
            .for_each_entries(|entry, reader| {
                if entry.name() == target {
                    if seen == occurrence {
                        found = Some(match max_len {
                            Some(max) => read_head(reader, max),
                            None => read_limited(listed, reader, MAX_ENTRY_READ),
                        });
                        return Ok(false);
                    }
                    seen += 1;
                }
                io::copy(reader, &mut io::sink())?;
                Ok(true)
            })
            .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

        // Empty files carry no stream and are never visited
        found.unwrap_or_else(|| Ok(Vec::new()))
    }
}

impl ModArchive for SevenZipArchive {
    fn format(&self) -> ArchiveFormat {
        self.format
    }

    fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn extract(&mut self, index: usize) -> Result<Vec<u8>, ArchiveError> {
        self.read_entry(index, None)
    }

    fn extract_head(&mut self, index: usize, max_len: usize) -> Result<Vec<u8>, ArchiveError> {
        self.read_entry(index, Some(max_len))
    }

    fn fingerprint(&mut self) -> Result<ArchiveFingerprint, ArchiveError> {
        Ok(fingerprint_file(&self.path)?)
    }
}

/// Scan a stream for the first 7z signature
fn find_signature<R: Read>(mut reader: R) -> io::Result<Option<u64>> {
    let mut buffer = vec![0u8; 65536];
    // Bytes carried over from the previous chunk so signatures spanning chunks are found
    let mut carry: Vec<u8> = Vec::new();
    let mut consumed = 0u64;

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            return Ok(None);
        }

        let mut window = std::mem::take(&mut carry);
        let window_start = consumed - window.len() as u64;
        window.extend_from_slice(&buffer[..read]);

        if let Some(pos) = window.windows(SIGNATURE.len()).position(|w| w == SIGNATURE) {
            return Ok(Some(window_start + pos as u64));
        }

        consumed += read as u64;
        let keep = (SIGNATURE.len() - 1).min(window.len());
        carry = window[window.len() - keep..].to_vec();
    }
}

/// Presents a sub-range of a seekable stream as a stream of its own
pub struct OffsetReader<R> {
    inner: R,
    offset: u64,
    len: u64,
}

impl<R: Seek> OffsetReader<R> {
    pub fn new(mut inner: R, offset: u64, len: u64) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(offset))?;
        Ok(Self { inner, offset, len })
    }
}

impl<R: Read> Read for OffsetReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Seek> Seek for OffsetReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(d) => self.len as i64 + d,
            SeekFrom::Current(d) => {
                let current = self.inner.stream_position()? as i64 - self.offset as i64;
                current + d
            }
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of embedded archive",
            ));
        }
        let absolute = self.inner.seek(SeekFrom::Start(self.offset + target as u64))?;
        Ok(absolute - self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_find_signature() {
        let mut bytes = b"MZ\x90\x00 stub program".to_vec();
        let offset = bytes.len() as u64;
        bytes.extend_from_slice(&SIGNATURE);
        bytes.extend_from_slice(b"payload");

        assert_eq!(find_signature(Cursor::new(&bytes)).unwrap(), Some(offset));
        assert_eq!(find_signature(Cursor::new(b"MZ no payload")).unwrap(), None);
    }

    #[test]
    fn test_find_signature_across_chunks() {
        let mut bytes = vec![0u8; 65536 - 3];
        bytes.extend_from_slice(&SIGNATURE);
        assert_eq!(
            find_signature(Cursor::new(&bytes)).unwrap(),
            Some(65536 - 3)
        );
    }

    #[test]
    fn test_offset_reader_seeks_relative_to_payload() {
        let data = b"HEADERpayload".to_vec();
        let mut reader = OffsetReader::new(Cursor::new(data), 6, 7).unwrap();

        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pay");
        assert_eq!(reader.seek(SeekFrom::Current(0)).unwrap(), 3);
        assert_eq!(reader.seek(SeekFrom::End(-4)).unwrap(), 3);
        assert_eq!(reader.seek(SeekFrom::Start(0)).unwrap(), 0);
        assert!(reader.seek(SeekFrom::Current(-1)).is_err());
    }

    #[test]
    fn test_executable_without_payload_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Setup.exe");
        std::fs::write(&path, b"MZ just a program").unwrap();

        assert!(matches!(
            SevenZipArchive::open_self_extracting(&path),
            Err(ArchiveError::Unsupported(_))
        ));
    }
}
