//! Sorting archive entries into candidate buckets

use crate::archive::{is_path_under, Entry};
use crate::games::SideloadMarker;
use serde::Serialize;

pub const MODDESC_FILE_NAME: &str = "moddesc.ini";

const SCRIPT_EXTENSIONS: &[&str] = &["mod"];
const TEXTURE_EXTENSIONS: &[&str] = &["mem", "tpf"];
const QUEUE_EXTENSIONS: &[&str] = &["biq2", "biq"];

/// Bucket kinds in dispatch order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BucketKind {
    NativeManifest,
    SideloadPackage,
    ScriptMod,
    TextureMod,
    InstallQueue,
}

impl BucketKind {
    fn of(entry: &Entry) -> Option<Self> {
        let name = entry.file_name();
        if name.eq_ignore_ascii_case(MODDESC_FILE_NAME) {
            return Some(BucketKind::NativeManifest);
        }
        if SideloadMarker::from_file_name(name).is_some() {
            return Some(BucketKind::SideloadPackage);
        }

        let ext = entry.extension()?;
        if SCRIPT_EXTENSIONS.contains(&ext.as_str()) {
            Some(BucketKind::ScriptMod)
        } else if TEXTURE_EXTENSIONS.contains(&ext.as_str()) {
            Some(BucketKind::TextureMod)
        } else if QUEUE_EXTENSIONS.contains(&ext.as_str()) {
            Some(BucketKind::InstallQueue)
        } else {
            None
        }
    }
}

/// Disjoint sets of classified entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CandidateBuckets {
    pub native_manifests: Vec<Entry>,
    pub sideload_packages: Vec<Entry>,
    pub script_mods: Vec<Entry>,
    pub texture_mods: Vec<Entry>,
    pub install_queues: Vec<Entry>,
}

impl CandidateBuckets {
    pub fn get(&self, kind: BucketKind) -> &[Entry] {
        match kind {
            BucketKind::NativeManifest => &self.native_manifests,
            BucketKind::SideloadPackage => &self.sideload_packages,
            BucketKind::ScriptMod => &self.script_mods,
            BucketKind::TextureMod => &self.texture_mods,
            BucketKind::InstallQueue => &self.install_queues,
        }
    }

    fn get_mut(&mut self, kind: BucketKind) -> &mut Vec<Entry> {
        match kind {
            BucketKind::NativeManifest => &mut self.native_manifests,
            BucketKind::SideloadPackage => &mut self.sideload_packages,
            BucketKind::ScriptMod => &mut self.script_mods,
            BucketKind::TextureMod => &mut self.texture_mods,
            BucketKind::InstallQueue => &mut self.install_queues,
        }
    }

    /// Take every entry of one bucket, leaving it empty
    pub fn take(&mut self, kind: BucketKind) -> Vec<Entry> {
        std::mem::take(self.get_mut(kind))
    }

    /// Drop every non-manifest entry under `root`
    pub fn suppress_under(&mut self, root: &str) {
        for kind in [
            BucketKind::SideloadPackage,
            BucketKind::ScriptMod,
            BucketKind::TextureMod,
            BucketKind::InstallQueue,
        ] {
            let bucket = self.get_mut(kind);
            let before = bucket.len();
            bucket.retain(|e| !is_path_under(&e.path, root));
            let removed = before - bucket.len();
            if removed > 0 {
                tracing::debug!("Suppressed {} {:?} entries under '{}'", removed, kind, root);
            }
        }
    }

    /// First bucket in dispatch order that has members, sideload packages excluded
    pub fn dispatch_kind(&self) -> Option<BucketKind> {
        [
            BucketKind::NativeManifest,
            BucketKind::ScriptMod,
            BucketKind::TextureMod,
            BucketKind::InstallQueue,
        ]
        .into_iter()
        .find(|kind| !self.get(*kind).is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.native_manifests.len()
            + self.sideload_packages.len()
            + self.script_mods.len()
            + self.texture_mods.len()
            + self.install_queues.len()
    }
}

/// Classified archive contents
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub buckets: CandidateBuckets,
    /// Directories owned by native manifests
    pub claimed_roots: Vec<String>,
    pub self_extracting: bool,
}

impl Classification {
    /// Record a directory a manifest owns and suppress the entries inside it
    pub fn claim_root(&mut self, root: &str) {
        if self.claimed_roots.iter().any(|r| r.eq_ignore_ascii_case(root)) {
            return;
        }
        self.buckets.suppress_under(root);
        self.claimed_roots.push(root.to_string());
    }
}

/// Classify entries in one pass, then apply manifest root suppression
pub fn classify(entries: &[Entry], self_extracting: bool) -> Classification {
    let mut classification = Classification {
        self_extracting,
        ..Default::default()
    };

    for entry in entries.iter().filter(|e| !e.is_directory) {
        if let Some(kind) = BucketKind::of(entry) {
            classification.buckets.get_mut(kind).push(entry.clone());
        }
    }

    let roots: Vec<String> = classification
        .buckets
        .native_manifests
        .iter()
        .map(|e| e.parent_dir().to_string())
        .collect();
    for root in roots {
        classification.claim_root(&root);
    }

    tracing::debug!(
        "Classified {} of {} entries ({} manifests, {} sideload packages)",
        classification.buckets.len(),
        entries.len(),
        classification.buckets.native_manifests.len(),
        classification.buckets.sideload_packages.len()
    );
    classification
}
