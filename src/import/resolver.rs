//! Identification of content that ships without a native manifest.
//!
//! The archive fingerprint is matched against the size/hash catalogue first.
//! A match may carry a transform, a replacement manifest or just a version.
//! Sideload packages are then identified by their DLC folder name.

use super::ImportServices;
use crate::archive::{ArchiveFingerprint, Entry, ModArchive};
use crate::catalogue::{DirectoryRecord, IdentificationRecord, SizeHashRecord};
use crate::games::{GameType, SideloadMarker};
use crate::mods::{
    load_moddesc, DescriptorVersion, Identity, InstallSource, ModDescriptor, SourceKind, TransformDefinition,
};
use crate::remote::TelemetryEvent;
use std::collections::HashSet;

pub(crate) const SELF_EXTRACTING_REFUSAL: &str =
    "This installer is not supported for import. Self-extracting installers must be vetted before they can be imported.";

pub(crate) const IMPORT_PREVENTED: &str =
    "This mod cannot be imported. It must be installed through its own installer.";

/// What the resolver produced for one archive
#[derive(Debug, Default)]
pub(crate) struct Resolution {
    pub descriptors: Vec<ModDescriptor>,
    pub fingerprint: Option<ArchiveFingerprint>,
    pub matched: Option<SizeHashRecord>,
    pub records: Vec<IdentificationRecord>,
    /// Whole-archive failure shown instead of descriptors
    pub error: Option<String>,
    /// DLC folders no catalogue recognized
    pub unrecognized: Vec<String>,
}

pub(crate) struct ThirdPartyResolver<'a> {
    services: &'a ImportServices,
}

impl<'a> ThirdPartyResolver<'a> {
    pub(crate) fn new(services: &'a ImportServices) -> Self {
        Self { services }
    }

    pub(crate) async fn resolve(
        &self,
        archive: &mut dyn ModArchive,
        sideload_packages: &[Entry],
        game_hint: Option<GameType>,
    ) -> Resolution {
        let mut resolution = Resolution::default();

        let fingerprint = match archive.fingerprint() {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                resolution.error = Some(format!("Could not read archive: {}", e));
                return resolution;
            }
        };
        tracing::debug!("Archive fingerprint {} ({} bytes)", fingerprint.md5, fingerprint.size);
        resolution.fingerprint = Some(fingerprint.clone());

        let matched = match self.services.catalogue.lookup_by_size(fingerprint.size).await {
            Ok(records) => records.into_iter().find(|r| r.matches_hash(&fingerprint.md5)),
            Err(e) => {
                tracing::warn!("Identification lookup failed: {:#}", e);
                None
            }
        };

        let Some(record) = matched else {
            if archive.is_self_extracting() {
                tracing::info!("Refusing unidentified self-extracting installer");
                resolution.error = Some(SELF_EXTRACTING_REFUSAL.to_string());
                return resolution;
            }
            self.resolve_sideloads(archive.entries(), sideload_packages, game_hint, None, &mut resolution)
                .await;
            return resolution;
        };

        tracing::info!(
            "Archive identified as {}",
            record.name.as_deref().unwrap_or("an unnamed catalogue entry")
        );
        resolution.records.push(IdentificationRecord::BySizeAndHash(record.clone()));
        let game_hint = record.game.or(game_hint);

        let transform = match &record.transform {
            Some(name) => match self.services.content.fetch_transform(name).await {
                Ok(transform) => Some(transform),
                Err(e) => {
                    tracing::warn!("Could not fetch transform '{}': {:#}", name, e);
                    resolution.descriptors.push(ModDescriptor::failed(
                        record_identity(&record, game_hint),
                        SourceKind::Virtual,
                        format!("Could not fetch import transform '{}': {}", name, e),
                    ));
                    resolution.matched = Some(record);
                    return resolution;
                }
            },
            None => None,
        };

        if let Some(manifest) = &record.custom_manifest {
            let descriptor = match self.services.content.fetch_custom_manifest(manifest).await {
                Ok(text) => {
                    let load = load_moddesc(&text, "", archive.entries(), SourceKind::Virtual, game_hint);
                    let mut descriptor = load.descriptor;
                    if descriptor.is_valid() {
                        if let Some(transform) = &transform {
                            descriptor.attach_transform(transform, &transform.plan(archive.entries()));
                        }
                    }
                    descriptor
                }
                Err(e) => {
                    tracing::warn!("Could not fetch manifest '{}': {:#}", manifest, e);
                    ModDescriptor::failed(
                        record_identity(&record, game_hint),
                        SourceKind::Virtual,
                        format!("Could not fetch manifest '{}': {}", manifest, e),
                    )
                }
            };
            resolution.descriptors.push(descriptor);
            resolution.matched = Some(record);
            return resolution;
        }

        self.resolve_sideloads(
            archive.entries(),
            sideload_packages,
            game_hint,
            transform.as_ref(),
            &mut resolution,
        )
        .await;
        resolution.matched = Some(record);
        resolution
    }

    async fn resolve_sideloads(
        &self,
        entries: &[Entry],
        packages: &[Entry],
        game_hint: Option<GameType>,
        transform: Option<&TransformDefinition>,
        resolution: &mut Resolution,
    ) {
        let mut seen = HashSet::new();

        for entry in packages {
            let Some(marker) = SideloadMarker::from_file_name(entry.file_name()) else {
                continue;
            };
            let Some(dlc_dir) = dlc_directory(entry, marker) else {
                tracing::debug!("Sideload package {} has no DLC folder", entry.path);
                continue;
            };
            if !seen.insert(dlc_dir.to_ascii_lowercase()) {
                continue;
            }

            let folder = dlc_dir.rsplit('/').next().unwrap_or(&dlc_dir).to_string();
            let game = marker.resolve_game(game_hint);

            let record = match self.services.catalogue.lookup_by_directory(&folder, game).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    tracing::info!("DLC folder {} ({}) is not in the identification catalogue", folder, game);
                    self.services.telemetry.track(TelemetryEvent::UnknownDlcFolder {
                        folder: folder.clone(),
                        game: game.id().to_string(),
                    });
                    resolution.unrecognized.push(folder);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Directory lookup for {} failed: {:#}", folder, e);
                    continue;
                }
            };

            resolution
                .records
                .push(IdentificationRecord::ByDirectoryName(record.clone()));
            let mut descriptor = sideload_descriptor(&record, &folder, &dlc_dir, game);
            descriptor.source_path = Some(entry.path.clone());
            if descriptor.is_valid() {
                if let Some(transform) = transform {
                    descriptor.attach_transform(transform, &transform.plan(entries));
                }
            }
            resolution.descriptors.push(descriptor);
        }
    }
}

/// Archive directory of the DLC a marker file belongs to.
///
/// `AutoLoad.ini` sits in the DLC folder itself; the packed markers sit in a
/// cooked-content folder one level below it.
pub(crate) fn dlc_directory(entry: &Entry, marker: SideloadMarker) -> Option<String> {
    let parent = entry.parent_dir();
    let dir = match marker {
        SideloadMarker::AutoLoad => parent,
        SideloadMarker::Sfar | SideloadMarker::MountDlc => match parent.rfind('/') {
            Some(pos) => &parent[..pos],
            None => return None,
        },
    };
    (!dir.is_empty()).then(|| dir.to_string())
}

fn record_identity(record: &SizeHashRecord, game: Option<GameType>) -> Identity {
    Identity::new(
        record.name.clone().unwrap_or_else(|| "Unknown mod".to_string()),
        "Unknown",
        game,
    )
}

/// Descriptor synthesized from a directory record
fn sideload_descriptor(record: &DirectoryRecord, folder: &str, dlc_dir: &str, game: GameType) -> ModDescriptor {
    let identity = Identity::new(&record.name, &record.developer, Some(game));

    if record.prevent_import {
        tracing::info!("{} is marked as not importable", folder);
        return ModDescriptor::failed(identity, SourceKind::Virtual, IMPORT_PREVENTED);
    }

    let mut descriptor = ModDescriptor::new(identity, SourceKind::Virtual);
    descriptor.description = record.description.clone();
    descriptor.required_dlc = record.required_dlc.clone();
    descriptor.installable_files.insert(
        format!("DLC/{}", folder),
        InstallSource::Directory(dlc_dir.to_string()),
    );

    match record.update_code {
        Some(code) => {
            descriptor.version = DescriptorVersion::pending_check();
            descriptor.updates.classic_code = code;
        }
        None => descriptor.version = DescriptorVersion::unresolved(),
    }
    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dlc_directory() {
        let sfar = Entry::new("Pack/DLC_MOD_Bar/CookedPCConsole/Default.sfar", 1, 0, false);
        assert_eq!(dlc_directory(&sfar, SideloadMarker::Sfar).as_deref(), Some("Pack/DLC_MOD_Bar"));

        let autoload = Entry::new("DLC_MOD_Old/AutoLoad.ini", 1, 0, false);
        assert_eq!(
            dlc_directory(&autoload, SideloadMarker::AutoLoad).as_deref(),
            Some("DLC_MOD_Old")
        );

        let shallow = Entry::new("CookedPC/Default.sfar", 1, 0, false);
        assert_eq!(dlc_directory(&shallow, SideloadMarker::Sfar), None);
    }

    #[test]
    fn test_sideload_descriptor_without_update_code() {
        let record = DirectoryRecord {
            folder: "DLC_MOD_Bar".to_string(),
            game: GameType::ME3,
            name: "Bar".to_string(),
            developer: "Dev".to_string(),
            description: Some("Adds a bar".to_string()),
            update_code: None,
            prevent_import: false,
            required_dlc: Vec::new(),
        };

        let descriptor = sideload_descriptor(&record, "DLC_MOD_Bar", "Pack/DLC_MOD_Bar", GameType::ME3);
        assert!(descriptor.is_valid());
        assert_eq!(descriptor.version, DescriptorVersion::unresolved());
        assert_eq!(descriptor.updates.classic_code, 0);
        assert_eq!(
            descriptor.installable_files.get("DLC/DLC_MOD_Bar"),
            Some(&InstallSource::Directory("Pack/DLC_MOD_Bar".to_string()))
        );
    }
}
