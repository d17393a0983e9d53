//! `moddesc.ini` manifest reader
//!
//! A manifest declares the mod's identity in `[ModInfo]` and one job per
//! install area. Supported jobs:
//! - `[BASEGAME]`: `moddir` plus paired `newfiles`/`replacefiles` lists
//!   (and optional paired `addfiles`/`addfilestargets`)
//! - `[CUSTOMDLC]`: paired `sourcedirs`/`destdirs` lists of DLC folders

use super::ini::{split_list, IniDocument};
use super::{DescriptorVersion, Identity, InstallSource, ModDescriptor, NexusIdentity, SourceKind};
use crate::archive::{is_path_under, Entry};
use crate::games::GameType;
use anyhow::{bail, Result};
use std::collections::BTreeMap;

/// Manifest format version that introduced the `game` key
const FIRST_MULTI_GAME_CMMVER: f32 = 5.0;

/// Outcome of reading one manifest
#[derive(Debug, Clone)]
pub struct ManifestLoad {
    pub descriptor: ModDescriptor,
    /// Archive directories consumed by this manifest's jobs
    pub claimed_roots: Vec<String>,
}

/// Build a descriptor from manifest text.
///
/// `root` is the archive directory that manifest paths are relative to.
/// Never fails: problems become a failed descriptor.
pub fn load_moddesc(
    text: &str,
    root: &str,
    entries: &[Entry],
    kind: SourceKind,
    game_hint: Option<GameType>,
) -> ManifestLoad {
    let doc = IniDocument::parse(text);

    let mut identity = Identity::new(
        doc.get("ModInfo", "modname").unwrap_or("Unknown mod"),
        doc.get("ModInfo", "moddev").unwrap_or("Unknown"),
        game_hint,
    );

    let game = match read_game(&doc) {
        Ok(game) => game,
        Err(e) => {
            return ManifestLoad {
                descriptor: ModDescriptor::failed(identity, kind, e.to_string()),
                claimed_roots: Vec::new(),
            }
        }
    };
    identity.game = Some(game);

    if doc.get("ModInfo", "modname").is_none() {
        return ManifestLoad {
            descriptor: ModDescriptor::failed(identity, kind, "Manifest does not set [ModInfo] modname"),
            claimed_roots: Vec::new(),
        };
    }

    let mut descriptor = ModDescriptor::new(identity, kind);
    descriptor.description = doc.get("ModInfo", "moddesc").map(|d| d.replace("<br>", "\n"));
    descriptor.website = doc.get("ModInfo", "modsite").map(str::to_string);
    descriptor.required_dlc = doc
        .get("ModInfo", "requireddlc")
        .map(|v| split_list(&v.replace(',', ";")))
        .unwrap_or_default();

    if let Some(modver) = doc.get("ModInfo", "modver") {
        descriptor.version = DescriptorVersion::embedded(modver);
    }

    descriptor.updates.classic_code = doc
        .get("ModInfo", "updatecode")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    descriptor.updates.modmaker_id = doc
        .get("ModInfo", "modid")
        .and_then(|v| v.parse().ok())
        .filter(|id| *id > 0);
    descriptor.updates.nexus = doc
        .get("ModInfo", "nexuscode")
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|id| *id > 0)
        .map(|mod_id| NexusIdentity {
            domain: game.nexus_domain().to_string(),
            mod_id,
        });

    match read_jobs(&doc, root, entries) {
        Ok((files, claimed_roots)) => {
            descriptor.installable_files = files;
            ManifestLoad {
                descriptor,
                claimed_roots,
            }
        }
        Err(e) => {
            descriptor.fail(e.to_string());
            ManifestLoad {
                descriptor,
                claimed_roots: Vec::new(),
            }
        }
    }
}

fn read_game(doc: &IniDocument) -> Result<GameType> {
    let cmmver: f32 = doc
        .get("ModManager", "cmmver")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1.0);

    match doc.get("ModInfo", "game") {
        Some(raw) => match GameType::from_id(raw) {
            Some(game) => Ok(game),
            None => bail!("Manifest targets unsupported game '{}'", raw),
        },
        None if cmmver < FIRST_MULTI_GAME_CMMVER => Ok(GameType::ME3),
        None => bail!(
            "Manifest format {:.1} requires [ModInfo] game to be set",
            cmmver
        ),
    }
}

type JobFiles = (BTreeMap<String, InstallSource>, Vec<String>);

fn read_jobs(doc: &IniDocument, root: &str, entries: &[Entry]) -> Result<JobFiles> {
    let mut files = BTreeMap::new();
    let mut claimed = Vec::new();

    if let Some(job) = doc.section("BASEGAME") {
        let moddir = job.get("moddir").unwrap_or("");
        let source_root = join_archive_path(root, moddir)
            .ok_or_else(|| anyhow::anyhow!("[BASEGAME] moddir '{}' leaves the archive", moddir))?;

        let mut pairs = paired_lists(job.get("newfiles"), job.get("replacefiles"), "BASEGAME", "newfiles", "replacefiles")?;
        pairs.extend(paired_lists(
            job.get("addfiles"),
            job.get("addfilestargets"),
            "BASEGAME",
            "addfiles",
            "addfilestargets",
        )?);

        if !pairs.is_empty() {
            claimed.push(source_root.clone());
        }
        for (source, target) in pairs {
            let source_path = join_archive_path(&source_root, &source)
                .ok_or_else(|| anyhow::anyhow!("[BASEGAME] file '{}' leaves the archive", source))?;
            if !entries.iter().any(|e| !e.is_directory && e.path.eq_ignore_ascii_case(&source_path)) {
                bail!("[BASEGAME] references '{}', which is not in the archive", source_path);
            }
            let target = crate::archive::normalize_entry_path(target.trim_start_matches(['/', '\\']))
                .filter(|t| !t.is_empty())
                .ok_or_else(|| anyhow::anyhow!("[BASEGAME] target '{}' is not a valid game path", target))?;
            files.insert(target, InstallSource::File(source_path));
        }
    }

    if let Some(job) = doc.section("CUSTOMDLC") {
        let pairs = paired_lists(job.get("sourcedirs"), job.get("destdirs"), "CUSTOMDLC", "sourcedirs", "destdirs")?;
        for (source, dest) in pairs {
            if !dest.to_ascii_uppercase().starts_with("DLC_") || dest.contains(['/', '\\']) {
                bail!("[CUSTOMDLC] destination '{}' is not a DLC folder name", dest);
            }
            let source_path = join_archive_path(root, &source)
                .ok_or_else(|| anyhow::anyhow!("[CUSTOMDLC] folder '{}' leaves the archive", source))?;
            if !entries
                .iter()
                .any(|e| !e.is_directory && source_path != e.path && is_path_under(&e.path, &source_path))
            {
                bail!("[CUSTOMDLC] folder '{}' is missing or empty in the archive", source_path);
            }
            files.insert(format!("DLC/{}", dest), InstallSource::Directory(source_path.clone()));
            claimed.push(source_path);
        }
    }

    if files.is_empty() {
        bail!("Manifest does not define any installation jobs");
    }

    Ok((files, claimed))
}

fn paired_lists(
    sources: Option<&str>,
    targets: Option<&str>,
    header: &str,
    source_key: &str,
    target_key: &str,
) -> Result<Vec<(String, String)>> {
    let sources = sources.map(split_list).unwrap_or_default();
    let targets = targets.map(split_list).unwrap_or_default();
    if sources.len() != targets.len() {
        bail!(
            "[{}] lists {} {} but {} {}",
            header,
            sources.len(),
            source_key,
            targets.len(),
            target_key
        );
    }
    Ok(sources.into_iter().zip(targets).collect())
}

/// Join a manifest-relative path onto an archive directory, resolving `..`.
/// Returns `None` if the result would leave the archive.
pub(crate) fn join_archive_path(base: &str, relative: &str) -> Option<String> {
    let mut parts: Vec<&str> = base.split('/').filter(|p| !p.is_empty()).collect();
    let relative = relative.replace('\\', "/");
    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}
