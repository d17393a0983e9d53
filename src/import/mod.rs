//! Archive import resolution
//!
//! An archive's entries are classified into candidate buckets. The first
//! non-empty bucket in priority order is handed to its format loader; an
//! archive with none of them goes to the third-party resolver, which
//! identifies content through the remote catalogues.

pub mod classifier;
pub mod loaders;
mod resolver;
mod versioning;

pub use classifier::{classify, BucketKind, CandidateBuckets, Classification};

use crate::archive::{open_archive, ArchiveFingerprint, ModArchive};
use crate::catalogue::{IdentificationCatalogue, IdentificationRecord};
use crate::games::GameType;
use crate::mods::ModDescriptor;
use crate::remote::{ContentStore, RelayService, TelemetrySink};
use resolver::ThirdPartyResolver;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use versioning::{needs_version, VersionReconciler};

pub const NO_MODS_FOUND: &str = "No importable mods were found in this archive.";

/// Remote collaborators used while resolving
#[derive(Clone)]
pub struct ImportServices {
    pub catalogue: Arc<dyn IdentificationCatalogue>,
    pub content: Arc<dyn ContentStore>,
    pub relay: Arc<dyn RelayService>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

/// Result of resolving one archive
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportOutcome {
    pub descriptors: Vec<ModDescriptor>,
    /// Set only when the whole archive could not be imported
    pub error: Option<String>,
    pub dispatched: Option<BucketKind>,
    /// Classified entries of buckets that were not dispatched
    pub remaining: CandidateBuckets,
    pub fingerprint: Option<ArchiveFingerprint>,
    /// Catalogue records that identified content
    pub records: Vec<IdentificationRecord>,
}

impl ImportOutcome {
    fn archive_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn valid_descriptors(&self) -> impl Iterator<Item = &ModDescriptor> {
        self.descriptors.iter().filter(|d| d.is_valid())
    }
}

pub struct ImportEngine {
    services: ImportServices,
}

impl ImportEngine {
    pub fn new(services: ImportServices) -> Self {
        Self { services }
    }

    /// Open, resolve and close an archive on disk
    pub async fn resolve_path(&self, path: &Path, game_hint: Option<GameType>) -> ImportOutcome {
        tracing::info!("Resolving {}", path.display());
        let mut archive = match open_archive(path) {
            Ok(archive) => archive,
            Err(e) => {
                tracing::warn!("Could not open {}: {}", path.display(), e);
                return ImportOutcome::archive_error(e.to_string());
            }
        };
        self.resolve(archive.as_mut(), game_hint).await
    }

    /// Resolve an archive the caller opened. The handle is left open.
    pub async fn resolve(&self, archive: &mut dyn ModArchive, game_hint: Option<GameType>) -> ImportOutcome {
        let mut classification = classify(archive.entries(), archive.is_self_extracting());
        let dispatched = classification.buckets.dispatch_kind();
        let mut outcome = ImportOutcome {
            dispatched,
            ..Default::default()
        };

        match dispatched {
            Some(BucketKind::NativeManifest) => {
                for entry in classification.buckets.take(BucketKind::NativeManifest) {
                    let load = loaders::load_native(archive, &entry, game_hint);
                    for root in &load.claimed_roots {
                        classification.claim_root(root);
                    }
                    outcome.descriptors.push(load.descriptor);
                }
                self.reconcile_local_versions(archive, &mut outcome).await;
            }
            Some(BucketKind::ScriptMod) => {
                for entry in classification.buckets.take(BucketKind::ScriptMod) {
                    outcome.descriptors.push(loaders::load_script_mod(archive, &entry));
                }
            }
            Some(BucketKind::TextureMod) => {
                for entry in classification.buckets.take(BucketKind::TextureMod) {
                    outcome
                        .descriptors
                        .push(loaders::load_texture_mod(archive, &entry, game_hint));
                }
            }
            Some(BucketKind::InstallQueue) => {
                if archive.format().supports_verified_text() {
                    for entry in classification.buckets.take(BucketKind::InstallQueue) {
                        outcome
                            .descriptors
                            .push(loaders::load_install_queue(archive, &entry, game_hint));
                    }
                }
            }
            Some(BucketKind::SideloadPackage) | None => {
                let packages = classification.buckets.take(BucketKind::SideloadPackage);
                self.resolve_third_party(archive, &packages, game_hint, &mut outcome)
                    .await;
            }
        }

        // Queues from unverified containers are never offered, whichever bucket was dispatched
        if !archive.format().supports_verified_text() {
            let queues = classification.buckets.take(BucketKind::InstallQueue);
            if let Some(first) = queues.first() {
                tracing::info!("Refusing {} install queues from a {:?} archive", queues.len(), archive.format());
                if outcome.error.is_none() {
                    outcome
                        .descriptors
                        .push(loaders::reject_install_queue(first, game_hint));
                }
            }
        }

        outcome.remaining = classification.buckets;
        if outcome.descriptors.is_empty() && outcome.error.is_none() {
            outcome.error = Some(NO_MODS_FOUND.to_string());
        }

        tracing::info!(
            "Resolved {} mods ({} valid){}",
            outcome.descriptors.len(),
            outcome.valid_descriptors().count(),
            outcome
                .error
                .as_deref()
                .map(|e| format!(": {}", e))
                .unwrap_or_default()
        );
        outcome
    }

    async fn resolve_third_party(
        &self,
        archive: &mut dyn ModArchive,
        packages: &[crate::archive::Entry],
        game_hint: Option<GameType>,
        outcome: &mut ImportOutcome,
    ) {
        let resolution = ThirdPartyResolver::new(&self.services)
            .resolve(archive, packages, game_hint)
            .await;

        outcome.descriptors = resolution.descriptors;
        outcome.fingerprint = resolution.fingerprint;
        outcome.records = resolution.records;
        if resolution.error.is_some() {
            outcome.error = resolution.error;
            return;
        }

        let record_version = resolution.matched.as_ref().and_then(|r| r.version.as_deref());
        VersionReconciler::new(self.services.relay.as_ref(), self.services.telemetry.as_ref())
            .reconcile(&mut outcome.descriptors, record_version, outcome.fingerprint.as_ref())
            .await;

        if outcome.descriptors.is_empty() && !resolution.unrecognized.is_empty() {
            outcome.error = Some(format!(
                "This archive contains DLC folders that are not recognized: {}",
                resolution.unrecognized.join(", ")
            ));
        }
    }

    /// Versions for native manifests that omit `modver`; hashes the archive only when needed
    async fn reconcile_local_versions(&self, archive: &mut dyn ModArchive, outcome: &mut ImportOutcome) {
        if !outcome.descriptors.iter().any(needs_version) {
            return;
        }

        match archive.fingerprint() {
            Ok(fingerprint) => outcome.fingerprint = Some(fingerprint),
            Err(e) => tracing::warn!("Could not fingerprint archive for a version lookup: {}", e),
        }

        VersionReconciler::new(self.services.relay.as_ref(), self.services.telemetry.as_ref())
            .reconcile(&mut outcome.descriptors, None, outcome.fingerprint.as_ref())
            .await;
    }
}
