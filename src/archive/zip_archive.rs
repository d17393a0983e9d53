//! ZIP container access

use super::{
    build_entries, fingerprint_file, read_head, read_limited, ArchiveError, ArchiveFingerprint, ArchiveFormat, Entry,
    ModArchive, MAX_ENTRY_READ,
};
use std::fs::File;
use std::path::{Path, PathBuf};

/// An opened ZIP archive
pub struct ZipModArchive {
    path: PathBuf,
    zip: ::zip::ZipArchive<File>,
    entries: Vec<Entry>,
}

impl ZipModArchive {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        let mut zip = ::zip::ZipArchive::new(file).map_err(corrupt)?;

        let mut raw = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let entry = zip.by_index_raw(i).map_err(corrupt)?;
            raw.push((entry.name().to_string(), entry.size(), entry.is_dir()));
        }
        let entries = build_entries(raw)?;

        Ok(Self {
            path: path.to_path_buf(),
            zip,
            entries,
        })
    }
}

impl ModArchive for ZipModArchive {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn extract(&mut self, index: usize) -> Result<Vec<u8>, ArchiveError> {
        let listed = self.entries.get(index).ok_or(ArchiveError::NoSuchEntry(index))?;
        let entry = self.zip.by_index(index).map_err(corrupt)?;
        read_limited(listed, entry, MAX_ENTRY_READ)
    }

    fn extract_head(&mut self, index: usize, max_len: usize) -> Result<Vec<u8>, ArchiveError> {
        if index >= self.entries.len() {
            return Err(ArchiveError::NoSuchEntry(index));
        }
        let entry = self.zip.by_index(index).map_err(corrupt)?;
        read_head(entry, max_len)
    }

    fn fingerprint(&mut self) -> Result<ArchiveFingerprint, ArchiveError> {
        Ok(fingerprint_file(&self.path)?)
    }
}

fn corrupt(e: ::zip::result::ZipError) -> ArchiveError {
    ArchiveError::Corrupt(e.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ::zip::write::SimpleFileOptions;
    use std::io::Write;

    /// Write a ZIP archive with the given files into `dir`
    pub(crate) fn write_zip(dir: &Path, name: &str, files: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        let mut writer = ::zip::ZipWriter::new(file);
        for (entry_name, contents) in files {
            writer
                .start_file(entry_name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_list_and_extract() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zip(
            dir.path(),
            "mod.zip",
            &[
                ("DLC_MOD_Foo/moddesc.ini", b"[ModInfo]\nmodname=Foo\n"),
                ("readme.txt", b"read me"),
            ],
        );

        let mut archive = ZipModArchive::open(&path).unwrap();
        assert_eq!(archive.entries().len(), 2);
        assert_eq!(archive.entries()[0].path, "DLC_MOD_Foo/moddesc.ini");
        assert_eq!(archive.extract(1).unwrap(), b"read me");
        assert_eq!(archive.extract_head(1, 4).unwrap(), b"read");
        assert!(matches!(archive.extract(9), Err(ArchiveError::NoSuchEntry(9))));
    }

    #[test]
    fn test_corrupt_zip_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"PK\x03\x04 definitely not a zip").unwrap();

        assert!(matches!(ZipModArchive::open(&path), Err(ArchiveError::Corrupt(_))));
    }

    #[test]
    fn test_fingerprint_covers_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zip(dir.path(), "mod.zip", &[("a.txt", b"a")]);
        let mut archive = ZipModArchive::open(&path).unwrap();

        let fp = archive.fingerprint().unwrap();
        assert_eq!(fp.size, std::fs::metadata(&path).unwrap().len());
    }

    /// Overwrite the uncompressed size of every central directory record
    fn patch_declared_sizes(path: &Path, size: u32) {
        let mut bytes = std::fs::read(path).unwrap();
        let mut pos = 0;
        while let Some(found) = bytes[pos..].windows(4).position(|w| w == b"PK\x01\x02") {
            let record = pos + found;
            bytes[record + 24..record + 28].copy_from_slice(&size.to_le_bytes());
            pos = record + 4;
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_oversized_declaration_is_refused_without_allocating() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zip(
            dir.path(),
            "hostile.zip",
            &[("DLC_MOD_Foo/moddesc.ini", b"[ModInfo]\nmodname=Foo\n")],
        );
        patch_declared_sizes(&path, 0xFFFF_FFF0);

        let mut archive = ZipModArchive::open(&path).unwrap();
        assert_eq!(archive.entries()[0].size, 0xFFFF_FFF0);
        assert!(matches!(
            archive.extract(0),
            Err(ArchiveError::EntryTooLarge { size: 0xFFFF_FFF0, .. })
        ));
    }
}
