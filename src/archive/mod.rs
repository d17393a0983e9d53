//! Archive access: format detection, entry listing and extraction (zip, 7z, sfx exe)

mod hash;
mod sevenz_archive;
mod zip_archive;

#[cfg(test)]
pub(crate) mod memory;

pub use hash::{fingerprint_file, fingerprint_reader, ArchiveFingerprint};
pub use sevenz_archive::SevenZipArchive;
pub use zip_archive::ZipModArchive;

#[cfg(test)]
pub(crate) use zip_archive::tests::write_zip;

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Largest entry `extract` will read into memory
pub const MAX_ENTRY_READ: u64 = 64 * 1024 * 1024;

/// Errors that make a whole archive unusable
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported archive format: {0}")]
    Unsupported(String),

    #[error("Archive is corrupt or unreadable: {0}")]
    Corrupt(String),

    #[error("Archive contains an unsafe entry path: {0}")]
    Hostile(String),

    #[error("Archive has no entry with index {0}")]
    NoSuchEntry(usize),

    #[error("Entry {path} is too large to read ({size} bytes)")]
    EntryTooLarge { path: String, size: u64 },

    #[error("I/O error reading archive: {0}")]
    Io(#[from] std::io::Error),
}

/// Supported archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ArchiveFormat {
    Zip,
    SevenZip,
    /// Windows executable carrying an embedded 7z payload
    SelfExtracting,
    Rar,
    Unknown,
}

impl ArchiveFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "zip" => Self::Zip,
            "7z" => Self::SevenZip,
            "exe" => Self::SelfExtracting,
            "rar" => Self::Rar,
            _ => Self::Unknown,
        }
    }

    /// Detect format from the first bytes of a file
    pub fn from_magic(bytes: &[u8]) -> Self {
        if bytes.starts_with(&[0x50, 0x4B]) {
            Self::Zip
        } else if bytes.starts_with(&sevenz_archive::SIGNATURE) {
            Self::SevenZip
        } else if bytes.starts_with(&[0x52, 0x61, 0x72, 0x21]) {
            Self::Rar
        } else if bytes.starts_with(b"MZ") {
            Self::SelfExtracting
        } else {
            Self::Unknown
        }
    }

    /// Whether text members of this container are re-extracted and verified
    /// when imported. Only 7z archives qualify.
    pub fn supports_verified_text(&self) -> bool {
        matches!(self, Self::SevenZip)
    }
}

/// One file or directory record inside an archive
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Entry {
    /// Normalized path, forward slashes, no leading slash
    pub path: String,
    pub size: u64,
    /// Position in the archive's entry list
    pub index: usize,
    pub is_directory: bool,
}

impl Entry {
    pub fn new(path: impl Into<String>, size: u64, index: usize, is_directory: bool) -> Self {
        Self {
            path: path.into(),
            size,
            index,
            is_directory,
        }
    }

    /// Base file name
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Lowercased extension without the dot
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        name.rfind('.')
            .filter(|&pos| pos > 0)
            .map(|pos| name[pos + 1..].to_ascii_lowercase())
    }

    /// Containing directory, empty for entries at the archive root
    pub fn parent_dir(&self) -> &str {
        match self.path.rfind('/') {
            Some(pos) => &self.path[..pos],
            None => "",
        }
    }

    /// Whether this entry lives under `root` (case-insensitive).
    /// The empty root contains everything.
    pub fn is_under(&self, root: &str) -> bool {
        is_path_under(&self.path, root)
    }
}

/// Case-insensitive path-prefix test on whole components
pub fn is_path_under(path: &str, root: &str) -> bool {
    if root.is_empty() {
        return true;
    }
    let path = path.to_ascii_lowercase();
    let root = root.trim_end_matches('/').to_ascii_lowercase();
    path == root || path.starts_with(&format!("{}/", root))
}

/// An opened archive. Dropping the handle closes it.
///
/// Handles are not re-entrant: one extraction at a time.
pub trait ModArchive: Send {
    fn format(&self) -> ArchiveFormat;

    fn entries(&self) -> &[Entry];

    /// Read a whole entry into memory, up to [`MAX_ENTRY_READ`] bytes
    fn extract(&mut self, index: usize) -> Result<Vec<u8>, ArchiveError>;

    /// Read at most `max_len` bytes from the start of an entry
    fn extract_head(&mut self, index: usize, max_len: usize) -> Result<Vec<u8>, ArchiveError>;

    /// Hash and size of the whole container
    fn fingerprint(&mut self) -> Result<ArchiveFingerprint, ArchiveError>;

    fn is_self_extracting(&self) -> bool {
        self.format() == ArchiveFormat::SelfExtracting
    }
}

/// Open an archive, detecting its format from the extension and then magic bytes
pub fn open_archive(path: &Path) -> Result<Box<dyn ModArchive>, ArchiveError> {
    if !path.exists() {
        return Err(ArchiveError::NotFound(path.to_path_buf()));
    }

    let mut format = ArchiveFormat::from_path(path);
    if format == ArchiveFormat::Unknown {
        let mut magic = [0u8; 8];
        let mut file = File::open(path)?;
        let read = file.read(&mut magic)?;
        format = ArchiveFormat::from_magic(&magic[..read]);
    }

    tracing::debug!("Opening {} as {:?}", path.display(), format);

    match format {
        ArchiveFormat::Zip => Ok(Box::new(ZipModArchive::open(path)?)),
        ArchiveFormat::SevenZip => Ok(Box::new(SevenZipArchive::open(path)?)),
        ArchiveFormat::SelfExtracting => Ok(Box::new(SevenZipArchive::open_self_extracting(path)?)),
        ArchiveFormat::Rar => Err(ArchiveError::Unsupported(
            "RAR archives cannot be inspected; repack the mod as .7z or .zip".to_string(),
        )),
        ArchiveFormat::Unknown => Err(ArchiveError::Unsupported(format!(
            "{} is not a recognized archive",
            path.display()
        ))),
    }
}

/// Read an entry's stream, refusing entries larger than `limit`.
///
/// The declared size comes from the archive's own directory and is only
/// trusted to reject early; the buffer grows with the bytes actually read.
pub(crate) fn read_limited<R: Read>(entry: &Entry, reader: R, limit: u64) -> Result<Vec<u8>, ArchiveError> {
    let too_large = |size| ArchiveError::EntryTooLarge {
        path: entry.path.clone(),
        size,
    };
    if entry.size > limit {
        return Err(too_large(entry.size));
    }

    let mut bytes = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > limit {
        return Err(too_large(bytes.len() as u64));
    }
    Ok(bytes)
}

/// Read at most `max_len` bytes from an entry's stream
pub(crate) fn read_head<R: Read>(reader: R, max_len: usize) -> Result<Vec<u8>, ArchiveError> {
    let mut bytes = Vec::new();
    reader.take(max_len as u64).read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Normalize an entry path. Returns `None` for paths that escape the archive root.
pub(crate) fn normalize_entry_path(raw: &str) -> Option<String> {
    let unified = raw.replace('\\', "/");
    if unified.starts_with('/') || unified.chars().nth(1) == Some(':') {
        return None;
    }

    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Normalize every raw entry name, rejecting the archive on the first hostile path
pub(crate) fn build_entries<I>(raw: I) -> Result<Vec<Entry>, ArchiveError>
where
    I: IntoIterator<Item = (String, u64, bool)>,
{
    raw.into_iter()
        .enumerate()
        .map(|(index, (name, size, is_directory))| {
            let path = normalize_entry_path(&name).ok_or_else(|| ArchiveError::Hostile(name.clone()))?;
            Ok(Entry::new(path, size, index, is_directory))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(ArchiveFormat::from_path(Path::new("mod.zip")), ArchiveFormat::Zip);
        assert_eq!(ArchiveFormat::from_path(Path::new("mod.7z")), ArchiveFormat::SevenZip);
        assert_eq!(
            ArchiveFormat::from_path(Path::new("Setup.EXE")),
            ArchiveFormat::SelfExtracting
        );
        assert_eq!(ArchiveFormat::from_path(Path::new("mod.ZIP")), ArchiveFormat::Zip);
        assert_eq!(ArchiveFormat::from_magic(b"PK\x03\x04"), ArchiveFormat::Zip);
        assert_eq!(
            ArchiveFormat::from_magic(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C]),
            ArchiveFormat::SevenZip
        );
        assert_eq!(ArchiveFormat::from_magic(b"MZ\x90\x00"), ArchiveFormat::SelfExtracting);
        assert_eq!(ArchiveFormat::from_magic(b"hello"), ArchiveFormat::Unknown);
    }

    #[test]
    fn test_normalize_entry_path() {
        assert_eq!(normalize_entry_path("foo/bar/baz.pcc").as_deref(), Some("foo/bar/baz.pcc"));
        assert_eq!(normalize_entry_path("foo\\bar\\baz.pcc").as_deref(), Some("foo/bar/baz.pcc"));
        assert_eq!(normalize_entry_path("./foo/./bar/").as_deref(), Some("foo/bar"));
        assert_eq!(normalize_entry_path("../../../etc/passwd"), None);
        assert_eq!(normalize_entry_path("/etc/passwd"), None);
        assert_eq!(normalize_entry_path("C:\\Windows\\evil.dll"), None);
    }

    #[test]
    fn test_hostile_entry_rejects_archive() {
        let result = build_entries(vec![
            ("ok/moddesc.ini".to_string(), 10, false),
            ("../escape.txt".to_string(), 10, false),
        ]);
        assert!(matches!(result, Err(ArchiveError::Hostile(_))));
    }

    #[test]
    fn test_entry_helpers() {
        let entry = Entry::new("DLC_MOD_Foo/CookedPCConsole/Default.SFAR", 5, 0, false);
        assert_eq!(entry.file_name(), "Default.SFAR");
        assert_eq!(entry.extension().as_deref(), Some("sfar"));
        assert_eq!(entry.parent_dir(), "DLC_MOD_Foo/CookedPCConsole");
        assert!(entry.is_under("dlc_mod_foo"));
        assert!(!entry.is_under("DLC_MOD_Fo"));
        assert!(entry.is_under(""));

        let root_file = Entry::new("readme.txt", 1, 1, false);
        assert_eq!(root_file.parent_dir(), "");
        assert_eq!(Entry::new(".hidden", 1, 2, false).extension(), None);
    }

    #[test]
    fn test_read_limited_rejects_declared_oversize() {
        let entry = Entry::new("moddesc.ini", 0x7FFF_FFFF_FFFF_FF00, 0, false);
        let result = read_limited(&entry, &b"[ModInfo]"[..], MAX_ENTRY_READ);
        assert!(matches!(
            result,
            Err(ArchiveError::EntryTooLarge { size: 0x7FFF_FFFF_FFFF_FF00, .. })
        ));
    }

    #[test]
    fn test_read_limited_rejects_stream_longer_than_declared() {
        // Directory claims 4 bytes, stream delivers 16
        let entry = Entry::new("queue.biq", 4, 0, false);
        let data = [b'x'; 16];
        assert!(matches!(
            read_limited(&entry, &data[..], 8),
            Err(ArchiveError::EntryTooLarge { size: 9, .. })
        ));
        assert_eq!(read_limited(&entry, &data[..8], 8).unwrap().len(), 8);
    }

    #[test]
    fn test_read_head_stops_at_limit() {
        assert_eq!(read_head(&b"TMOD and more"[..], 4).unwrap(), b"TMOD");
        assert_eq!(read_head(&b"ab"[..], 4).unwrap(), b"ab");
    }
}
