//! In-memory archive used by tests

use super::{
    build_entries, fingerprint_reader, read_head, read_limited, ArchiveError, ArchiveFingerprint, ArchiveFormat, Entry,
    ModArchive, MAX_ENTRY_READ,
};

pub(crate) struct MemoryArchive {
    format: ArchiveFormat,
    entries: Vec<Entry>,
    contents: Vec<Vec<u8>>,
    /// Stands in for the container bytes when fingerprinting
    container: Vec<u8>,
}

impl MemoryArchive {
    /// Build an archive from `(path, contents)` pairs. Paths ending in `/` are directories.
    pub(crate) fn new(format: ArchiveFormat, files: &[(&str, &[u8])]) -> Self {
        let raw = files.iter().map(|(name, contents)| {
            (name.to_string(), contents.len() as u64, name.ends_with('/'))
        });
        let entries = build_entries(raw).expect("test archive paths are safe");
        let contents = files.iter().map(|(_, c)| c.to_vec()).collect();
        let container = files
            .iter()
            .flat_map(|(name, c)| name.as_bytes().iter().chain(c.iter()).copied())
            .collect();

        Self {
            format,
            entries,
            contents,
            container,
        }
    }

    pub(crate) fn zip(files: &[(&str, &[u8])]) -> Self {
        Self::new(ArchiveFormat::Zip, files)
    }

    /// Make the listing claim a different size than the stored bytes
    pub(crate) fn with_declared_size(mut self, index: usize, size: u64) -> Self {
        self.entries[index].size = size;
        self
    }

    fn stream(&self, index: usize) -> Result<&[u8], ArchiveError> {
        self.contents
            .get(index)
            .map(Vec::as_slice)
            .ok_or(ArchiveError::NoSuchEntry(index))
    }
}

impl ModArchive for MemoryArchive {
    fn format(&self) -> ArchiveFormat {
        self.format
    }

    fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn extract(&mut self, index: usize) -> Result<Vec<u8>, ArchiveError> {
        let stream = self.stream(index)?;
        read_limited(&self.entries[index], stream, MAX_ENTRY_READ)
    }

    fn extract_head(&mut self, index: usize, max_len: usize) -> Result<Vec<u8>, ArchiveError> {
        read_head(self.stream(index)?, max_len)
    }

    fn fingerprint(&mut self) -> Result<ArchiveFingerprint, ArchiveError> {
        Ok(fingerprint_reader(&self.container[..])?)
    }
}
