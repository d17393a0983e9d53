//! Command implementations for the CLI

use super::App;
use crate::archive::{fingerprint_file, ArchiveFormat};
use crate::games::GameType;
use crate::import::{BucketKind, ImportOutcome};
use crate::mods::ModDescriptor;
use crate::updates::UpdateCandidate;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

impl App {
    pub async fn cmd_import(&self, path: &Path, game: Option<GameType>, json: bool) -> Result<()> {
        let outcome = self.engine.resolve_path(path, game).await;

        if json {
            let text = serde_json::to_string_pretty(&outcome).context("Failed to serialize import outcome")?;
            println!("{}", text);
        } else {
            for line in outcome_lines(path, &outcome) {
                println!("{}", line);
            }
        }

        if outcome.error.is_some() {
            bail!("Archive could not be imported");
        }
        Ok(())
    }

    pub async fn cmd_scan(&self, dir: &Path, game: Option<GameType>) -> Result<()> {
        if !dir.is_dir() {
            bail!("Not a directory: {}", dir.display());
        }

        let archives = find_archives(dir);
        if archives.is_empty() {
            println!("No archives found under {}.", dir.display());
            return Ok(());
        }

        let mut importable = 0;
        for path in &archives {
            let outcome = self.engine.resolve_path(path, game).await;
            if outcome.valid_descriptors().next().is_some() {
                importable += 1;
            }
            for line in outcome_lines(path, &outcome) {
                println!("{}", line);
            }
            println!();
        }

        println!("{} of {} archives contain importable mods.", importable, archives.len());
        Ok(())
    }

    pub async fn cmd_hash(&self, path: &Path) -> Result<()> {
        let owned = path.to_path_buf();
        let fingerprint = tokio::task::spawn_blocking(move || fingerprint_file(&owned))
            .await
            .context("Hashing task failed")?
            .with_context(|| format!("Failed to read {}", path.display()))?;

        println!("{}  {} bytes  {}", fingerprint.md5, fingerprint.size, path.display());
        Ok(())
    }

    pub async fn cmd_updates(&self, paths: &[PathBuf], restore: bool) -> Result<()> {
        let mut mods: Vec<ModDescriptor> = Vec::new();
        for path in paths {
            let outcome = self.engine.resolve_path(path, None).await;
            if let Some(error) = &outcome.error {
                println!("Skipping {}: {}", path.display(), error);
                continue;
            }
            mods.extend(outcome.descriptors.into_iter().filter(|d| d.is_valid()));
        }

        if mods.is_empty() {
            println!("No mods to check.");
            return Ok(());
        }

        println!("Checking {} mod(s) for updates...", mods.len());
        let candidates = self.updates.check(&mut mods, restore).await;

        if candidates.is_empty() {
            println!("All mods are up to date.");
            return Ok(());
        }

        println!("{:-<60}", "");
        for candidate in &candidates {
            for line in candidate_lines(candidate) {
                println!("{}", line);
            }
        }
        Ok(())
    }

    pub async fn cmd_catalogue_refresh(&self) -> Result<()> {
        println!("Downloading identification catalogues...");
        let (sizes, directories) = self
            .catalogue
            .refresh()
            .await
            .context("Failed to refresh identification catalogues")?;
        println!("Cached {} size/hash records and {} DLC folder records.", sizes, directories);
        Ok(())
    }
}

/// Every file under `dir` with an archive extension, sorted
pub(crate) fn find_archives(dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable path: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| ArchiveFormat::from_path(path) != ArchiveFormat::Unknown)
        .collect();
    found.sort();
    found
}

fn bucket_label(kind: BucketKind) -> &'static str {
    match kind {
        BucketKind::NativeManifest => "native manifests",
        BucketKind::SideloadPackage => "DLC packages",
        BucketKind::ScriptMod => "legacy script mods",
        BucketKind::TextureMod => "texture mods",
        BucketKind::InstallQueue => "install queues",
    }
}

/// Human readable report for one archive
pub(crate) fn outcome_lines(path: &Path, outcome: &ImportOutcome) -> Vec<String> {
    let mut lines = vec![format!("Archive: {}", path.display())];

    if let Some(fp) = &outcome.fingerprint {
        lines.push(format!("  MD5 {} ({} bytes)", fp.md5, fp.size));
    }
    for record in &outcome.records {
        let name = record.display_name().unwrap_or("an unnamed record");
        lines.push(format!("  Identified by {}", name));
    }
    if let Some(error) = &outcome.error {
        lines.push(format!("  ERROR: {}", error));
    }

    for descriptor in &outcome.descriptors {
        match descriptor.failure_reason() {
            None => lines.push(format!(
                "  [OK] {} v{} [{}]",
                descriptor.identity,
                descriptor.version,
                descriptor.kind.label()
            )),
            Some(reason) => lines.push(format!("  [FAILED] {}: {}", descriptor.identity, reason)),
        }
    }

    for kind in [
        BucketKind::NativeManifest,
        BucketKind::SideloadPackage,
        BucketKind::ScriptMod,
        BucketKind::TextureMod,
        BucketKind::InstallQueue,
    ] {
        let count = outcome.remaining.get(kind).len();
        if count > 0 {
            lines.push(format!("  Also contains {} {} (not imported)", count, bucket_label(kind)));
        }
    }
    lines
}

pub(crate) fn candidate_lines(candidate: &UpdateCandidate) -> Vec<String> {
    let mut lines = vec![format!(
        "{}: {} -> {} [{}]{}",
        candidate.identity,
        candidate.local_version,
        candidate.server_version,
        candidate.authority.display_name(),
        if candidate.restore_mode { " (restore)" } else { "" }
    )];
    if !candidate.applicable_patches.is_empty() {
        lines.push(format!("  {} file(s) to update", candidate.applicable_patches.len()));
    }
    if !candidate.deletions.is_empty() {
        lines.push(format!("  {} file(s) to delete", candidate.deletions.len()));
    }
    if let Some(changelog) = candidate.changelog.as_deref().filter(|c| !c.trim().is_empty()) {
        for line in changelog.lines() {
            lines.push(format!("  | {}", line));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveFingerprint, Entry};
    use crate::catalogue::{DirectoryRecord, IdentificationRecord, SizeHashRecord};
    use crate::import::CandidateBuckets;
    use crate::mods::{Identity, SourceKind};
    use crate::updates::UpdateAuthority;

    #[test]
    fn test_find_archives_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        for name in ["b.7z", "a.zip", "nested/c.EXE", "notes.txt", "nested/d.rar"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let found: Vec<String> = find_archives(dir.path())
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(found, vec!["a.zip", "b.7z", "nested/c.EXE", "nested/d.rar"]);
    }

    #[test]
    fn test_outcome_lines() {
        let mut failed = ModDescriptor::failed(
            Identity::new("Broken", "Dev", Some(GameType::ME2)),
            SourceKind::Native,
            "no install jobs",
        );
        failed.source_path = Some("Broken/moddesc.ini".to_string());

        let outcome = ImportOutcome {
            descriptors: vec![failed],
            remaining: CandidateBuckets {
                texture_mods: vec![Entry::new("extra.mem", 4, 1, false)],
                ..Default::default()
            },
            fingerprint: Some(ArchiveFingerprint {
                md5: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
                size: 0,
            }),
            ..Default::default()
        };

        let lines = outcome_lines(Path::new("mod.zip"), &outcome);
        assert_eq!(lines[0], "Archive: mod.zip");
        assert!(lines[1].contains("d41d8cd98f00b204e9800998ecf8427e"));
        assert!(lines.iter().any(|l| l.contains("[FAILED]") && l.contains("no install jobs")));
        assert!(lines.iter().any(|l| l.contains("1 texture mods")));
    }

    #[test]
    fn test_outcome_lines_name_identifying_records() {
        let outcome = ImportOutcome {
            records: vec![
                IdentificationRecord::BySizeAndHash(SizeHashRecord {
                    size: 10,
                    md5: "abc".to_string(),
                    game: None,
                    name: None,
                    version: None,
                    transform: None,
                    custom_manifest: None,
                }),
                IdentificationRecord::ByDirectoryName(DirectoryRecord {
                    folder: "DLC_MOD_Bar".to_string(),
                    game: GameType::ME3,
                    name: "Bar Mod".to_string(),
                    developer: "Bar Dev".to_string(),
                    description: None,
                    update_code: None,
                    prevent_import: false,
                    required_dlc: Vec::new(),
                }),
            ],
            ..Default::default()
        };

        let lines = outcome_lines(Path::new("bar.7z"), &outcome);
        assert_eq!(lines[1], "  Identified by an unnamed record");
        assert_eq!(lines[2], "  Identified by Bar Mod");
    }

    #[test]
    fn test_candidate_lines() {
        let candidate = UpdateCandidate {
            identity: Identity::new("Foo", "Dev", Some(GameType::ME3)),
            authority: UpdateAuthority::ClassicRelay,
            local_version: "1.0".to_string(),
            server_version: "1.1".to_string(),
            changelog: Some("Fixed things\nAdded stuff".to_string()),
            restore_mode: false,
            applicable_patches: vec!["a.pcc".to_string()],
            deletions: Vec::new(),
            nexus: None,
        };

        let lines = candidate_lines(&candidate);
        assert!(lines[0].contains("1.0 -> 1.1"));
        assert!(lines[0].contains("Classic relay"));
        assert_eq!(lines[1], "  1 file(s) to update");
        assert_eq!(lines[2..], ["  | Fixed things", "  | Added stuff"]);
    }
}
