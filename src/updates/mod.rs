//! Update checking across the three update authorities

pub mod classic;
pub mod modmaker;

pub use classic::{ClassicUpdateInfo, ClassicUpdateQuery, ClassicUpdateService, HttpClassicUpdates};
pub use modmaker::{HttpModMaker, ModMakerEntry, ModMakerService};

use crate::mods::{Identity, ModDescriptor, ModVersion, NexusIdentity};
use crate::nexus::{NexusApi, NexusModInfo};
use anyhow::anyhow;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Deref;
use std::sync::Arc;

/// Nexus requests in flight at once
const NEXUS_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UpdateAuthority {
    ClassicRelay,
    ModMakerService,
    NexusApi,
}

impl UpdateAuthority {
    pub fn display_name(&self) -> &'static str {
        match self {
            UpdateAuthority::ClassicRelay => "Classic relay",
            UpdateAuthority::ModMakerService => "ModMaker",
            UpdateAuthority::NexusApi => "Nexus Mods",
        }
    }
}

/// One authority's report that a mod has a newer release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateCandidate {
    pub identity: Identity,
    pub authority: UpdateAuthority,
    pub local_version: String,
    pub server_version: String,
    pub changelog: Option<String>,
    pub restore_mode: bool,
    /// Files the classic relay would patch
    pub applicable_patches: Vec<String>,
    /// Files the classic relay would delete
    pub deletions: Vec<String>,
    /// Remote identity the report came from, copied per descriptor
    pub nexus: Option<NexusIdentity>,
}

impl UpdateCandidate {
    fn new(descriptor: &ModDescriptor, authority: UpdateAuthority, server_version: String, restore_mode: bool) -> Self {
        Self {
            identity: descriptor.identity.clone(),
            authority,
            local_version: descriptor.version.raw.clone(),
            server_version,
            changelog: None,
            restore_mode,
            applicable_patches: Vec::new(),
            deletions: Vec::new(),
            nexus: None,
        }
    }
}

/// Whether a descriptor takes part in update checks
fn is_eligible(descriptor: &ModDescriptor) -> bool {
    descriptor.is_valid() && descriptor.updates.is_tracked()
}

/// Flags every eligible descriptor as checking until dropped
struct CheckingGuard<'a> {
    mods: &'a mut [ModDescriptor],
}

impl<'a> CheckingGuard<'a> {
    fn new(mods: &'a mut [ModDescriptor]) -> Self {
        for descriptor in mods.iter_mut().filter(|d| is_eligible(d)) {
            descriptor.checking_for_updates = true;
        }
        Self { mods }
    }
}

impl Deref for CheckingGuard<'_> {
    type Target = [ModDescriptor];

    fn deref(&self) -> &Self::Target {
        self.mods
    }
}

impl Drop for CheckingGuard<'_> {
    fn drop(&mut self) {
        for descriptor in self.mods.iter_mut() {
            descriptor.checking_for_updates = false;
        }
    }
}

/// Queries every update authority and merges their reports
pub struct UpdateReconciler {
    classic: Arc<dyn ClassicUpdateService>,
    modmaker: Arc<dyn ModMakerService>,
    /// Absent without an API key
    nexus: Option<Arc<dyn NexusApi>>,
}

impl UpdateReconciler {
    pub fn new(
        classic: Arc<dyn ClassicUpdateService>,
        modmaker: Arc<dyn ModMakerService>,
        nexus: Option<Arc<dyn NexusApi>>,
    ) -> Self {
        Self {
            classic,
            modmaker,
            nexus,
        }
    }

    /// Check `mods` for updates. Authorities that fail contribute nothing.
    pub async fn check(&self, mods: &mut [ModDescriptor], restore_mode: bool) -> Vec<UpdateCandidate> {
        let guard = CheckingGuard::new(mods);
        let participants: Vec<&ModDescriptor> = guard.iter().filter(|d| is_eligible(d)).collect();
        tracing::info!("Checking {} mods for updates", participants.len());

        let (classic, modmaker, nexus) = tokio::join!(
            self.classic_pass(&participants, restore_mode),
            self.modmaker_pass(&participants, restore_mode),
            self.nexus_pass(&participants, restore_mode),
        );

        let mut seen = HashSet::new();
        let merged: Vec<UpdateCandidate> = classic
            .into_iter()
            .chain(modmaker)
            .chain(nexus)
            .filter(|c| seen.insert(c.identity.clone()))
            .collect();

        tracing::info!("{} updates available", merged.len());
        merged
    }

    async fn classic_pass(&self, mods: &[&ModDescriptor], restore_mode: bool) -> Vec<UpdateCandidate> {
        let tracked: Vec<&ModDescriptor> = mods
            .iter()
            .copied()
            .filter(|d| d.updates.classic_code != 0)
            .collect();
        if tracked.is_empty() {
            return Vec::new();
        }

        let queries: Vec<ClassicUpdateQuery> = tracked
            .iter()
            .map(|d| ClassicUpdateQuery {
                update_code: d.updates.classic_code,
                version: d.version.raw.clone(),
            })
            .collect();

        let answers = match self.classic.check(&queries).await {
            Ok(answers) => answers,
            Err(e) => {
                tracing::warn!("Classic relay update check failed: {:#}", e);
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        for info in answers.iter().filter(|i| i.has_changes()) {
            for descriptor in tracked.iter().filter(|d| d.updates.classic_code == info.update_code) {
                let mut candidate = UpdateCandidate::new(
                    descriptor,
                    UpdateAuthority::ClassicRelay,
                    info.server_version.clone(),
                    restore_mode,
                );
                candidate.applicable_patches = info.applicable_patches.clone();
                candidate.deletions = info.deletions.clone();
                candidate.changelog = info.changelog.clone();
                candidates.push(candidate);
            }
        }
        candidates
    }

    async fn modmaker_pass(&self, mods: &[&ModDescriptor], restore_mode: bool) -> Vec<UpdateCandidate> {
        let tracked: Vec<(&ModDescriptor, u32)> = mods
            .iter()
            .filter_map(|d| d.updates.modmaker_id.map(|id| (*d, id)))
            .collect();
        if tracked.is_empty() {
            return Vec::new();
        }

        let catalogue: HashMap<u32, ModMakerEntry> = match self.modmaker.latest_revisions().await {
            Ok(entries) => entries.into_iter().map(|e| (e.id, e)).collect(),
            Err(e) => {
                tracing::warn!("ModMaker update check failed: {:#}", e);
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        for (descriptor, id) in tracked {
            let Some(entry) = catalogue.get(&id) else {
                tracing::debug!("ModMaker mod {} is not in the catalogue", id);
                continue;
            };

            let server = ModVersion::from_revision(entry.revision);
            if restore_mode || descriptor.version.is_older_than(&server) {
                let mut candidate = UpdateCandidate::new(
                    descriptor,
                    UpdateAuthority::ModMakerService,
                    server.to_string(),
                    restore_mode,
                );
                candidate.changelog = entry.changelog.clone();
                candidates.push(candidate);
            }
        }
        candidates
    }

    async fn nexus_pass(&self, mods: &[&ModDescriptor], restore_mode: bool) -> Vec<UpdateCandidate> {
        let tracked: Vec<(&ModDescriptor, &NexusIdentity)> = mods
            .iter()
            .filter(|d| d.updates.classic_code == 0)
            .filter_map(|d| d.updates.nexus.as_ref().map(|n| (*d, n)))
            .collect();
        if tracked.is_empty() {
            return Vec::new();
        }

        let Some(nexus) = &self.nexus else {
            tracing::debug!("No Nexus API key configured, skipping {} mods", tracked.len());
            return Vec::new();
        };
        if nexus.is_rate_limited() {
            tracing::warn!("Nexus API quota exhausted, skipping Nexus update check");
            return Vec::new();
        }

        let identities: BTreeSet<&NexusIdentity> = tracked.iter().map(|(_, n)| *n).collect();
        let lookups: Vec<_> = stream::iter(identities)
            .map(|n| async move {
                if nexus.is_rate_limited() {
                    return (n, Err(anyhow!("Nexus API quota exhausted")));
                }
                let result = nexus.get_mod(&n.domain, n.mod_id).await;
                (n, result)
            })
            .buffer_unordered(NEXUS_CONCURRENCY)
            .collect()
            .await;

        let mut infos: HashMap<&NexusIdentity, NexusModInfo> = HashMap::new();
        for (identity, result) in lookups {
            match result {
                Ok(info) => {
                    infos.insert(identity, info);
                }
                Err(e) => tracing::warn!(
                    "Nexus lookup for {}/{} failed: {:#}",
                    identity.domain,
                    identity.mod_id,
                    e
                ),
            }
        }

        let mut candidates = Vec::new();
        for (descriptor, identity) in tracked {
            let Some(shared) = infos.get(identity) else {
                continue;
            };
            // One remote mod can back several local descriptors
            let info = shared.clone();
            let server_raw = info.version.unwrap_or_default();
            let newer = ModVersion::parse(&server_raw).is_some_and(|server| descriptor.version.is_older_than(&server));

            if restore_mode || newer {
                let mut candidate =
                    UpdateCandidate::new(descriptor, UpdateAuthority::NexusApi, server_raw, restore_mode);
                candidate.nexus = Some(identity.clone());
                candidates.push(candidate);
            }
        }

        self.attach_nexus_changelogs(&**nexus, &mut candidates).await;
        candidates
    }

    async fn attach_nexus_changelogs(&self, nexus: &dyn NexusApi, candidates: &mut [UpdateCandidate]) {
        let identities: BTreeSet<NexusIdentity> = candidates.iter().filter_map(|c| c.nexus.clone()).collect();
        let fetched: Vec<_> = stream::iter(identities)
            .map(|n| async move {
                if nexus.is_rate_limited() {
                    return (n, Err(anyhow!("Nexus API quota exhausted")));
                }
                let result = nexus.get_changelogs(&n.domain, n.mod_id).await;
                (n, result)
            })
            .buffer_unordered(NEXUS_CONCURRENCY)
            .collect()
            .await;

        let mut changelogs: HashMap<NexusIdentity, BTreeMap<String, Vec<String>>> = HashMap::new();
        for (identity, result) in fetched {
            match result {
                Ok(log) => {
                    changelogs.insert(identity, log);
                }
                Err(e) => tracing::debug!("No changelog for {}/{}: {:#}", identity.domain, identity.mod_id, e),
            }
        }

        for candidate in candidates.iter_mut() {
            let Some(log) = candidate.nexus.as_ref().and_then(|n| changelogs.get(n)) else {
                continue;
            };
            candidate.changelog = changelog_for_version(log, &candidate.server_version);
        }
    }
}

/// Changelog lines for a release, matching version keys loosely
fn changelog_for_version(log: &BTreeMap<String, Vec<String>>, version: &str) -> Option<String> {
    let lines = log.get(version).or_else(|| {
        let wanted = ModVersion::parse(version)?;
        log.iter()
            .find(|(key, _)| ModVersion::parse(key) == Some(wanted))
            .map(|(_, lines)| lines)
    })?;

    let text = lines.join("\n");
    (!text.trim().is_empty()).then_some(text)
}
