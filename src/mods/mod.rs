//! Resolved mod descriptors and the manifest formats they are read from

pub mod ini;
pub mod moddesc;
pub mod transform;
pub mod version;

pub use moddesc::{load_moddesc, ManifestLoad};
pub use transform::{TransformDefinition, TransformPlan};
pub use version::{DescriptorVersion, ModVersion, VersionSource, VersionState};

use crate::games::GameType;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Who a mod is and which game it targets.
///
/// Two descriptors with the same identity are the same mod for update
/// de-duplication purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Identity {
    pub name: String,
    pub developer: String,
    pub game: Option<GameType>,
}

impl Identity {
    pub fn new(name: impl Into<String>, developer: impl Into<String>, game: Option<GameType>) -> Self {
        Self {
            name: name.into(),
            developer: developer.into(),
            game,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.game {
            Some(game) => write!(f, "{} by {} ({})", self.name, self.developer, game),
            None => write!(f, "{} by {}", self.name, self.developer),
        }
    }
}

/// Which loader produced a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SourceKind {
    /// `moddesc.ini` manifest shipped in the archive
    Native,
    /// Legacy `.mod` script package
    LegacyScript,
    /// Synthesized from remote identification data
    Virtual,
    /// `.mem` / `.tpf` texture package
    Texture,
    /// Batch install queue
    Queue,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Native => "native",
            SourceKind::LegacyScript => "legacy script",
            SourceKind::Virtual => "virtual",
            SourceKind::Texture => "texture",
            SourceKind::Queue => "install queue",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Validity {
    Ok,
    Failed { reason: String },
}

/// Archive content backing one install target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "path", rename_all = "lowercase")]
pub enum InstallSource {
    File(String),
    /// Everything under an archive directory
    Directory(String),
}

/// Nexus Mods identity: platform domain plus mod id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NexusIdentity {
    pub domain: String,
    pub mod_id: i64,
}

/// Identifiers the update authorities know a mod by
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateTracking {
    /// Classic relay update code, 0 when the mod is not tracked there
    pub classic_code: u32,
    pub modmaker_id: Option<u32>,
    pub nexus: Option<NexusIdentity>,
}

impl UpdateTracking {
    pub fn is_tracked(&self) -> bool {
        self.classic_code != 0 || self.modmaker_id.is_some() || self.nexus.is_some()
    }
}

/// One resolved, installable modification
#[derive(Debug, Clone, Serialize)]
pub struct ModDescriptor {
    pub identity: Identity,
    pub kind: SourceKind,
    pub description: Option<String>,
    pub website: Option<String>,
    pub version: DescriptorVersion,
    pub validity: Validity,
    /// Install target path -> archive content
    pub installable_files: BTreeMap<String, InstallSource>,
    /// Archive paths that must not be installed
    pub excluded_entries: Vec<String>,
    #[serde(skip)]
    pub transform: Option<TransformDefinition>,
    pub required_dlc: Vec<String>,
    pub updates: UpdateTracking,
    /// Archive path of the manifest or package this descriptor was read from
    pub source_path: Option<String>,
    /// Set while an update check is running over this descriptor
    #[serde(skip)]
    pub checking_for_updates: bool,
}

impl ModDescriptor {
    pub fn new(identity: Identity, kind: SourceKind) -> Self {
        Self {
            identity,
            kind,
            description: None,
            website: None,
            version: DescriptorVersion::unresolved(),
            validity: Validity::Ok,
            installable_files: BTreeMap::new(),
            excluded_entries: Vec::new(),
            transform: None,
            required_dlc: Vec::new(),
            updates: UpdateTracking::default(),
            source_path: None,
            checking_for_updates: false,
        }
    }

    /// Stub carrying a failure reason and no installable content
    pub fn failed(identity: Identity, kind: SourceKind, reason: impl Into<String>) -> Self {
        let mut descriptor = Self::new(identity, kind);
        descriptor.fail(reason);
        descriptor
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.validity = Validity::Failed {
            reason: reason.into(),
        };
        self.installable_files.clear();
    }

    pub fn is_valid(&self) -> bool {
        self.validity == Validity::Ok
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.validity {
            Validity::Ok => None,
            Validity::Failed { reason } => Some(reason),
        }
    }

    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Attach a transform, applying its exclusions and redirects
    pub fn attach_transform(&mut self, transform: &TransformDefinition, plan: &TransformPlan) {
        for (archive_path, target) in &plan.redirected {
            self.installable_files
                .insert(target.clone(), InstallSource::File(archive_path.clone()));
        }
        for path in &plan.excluded {
            if !self.excluded_entries.contains(path) {
                self.excluded_entries.push(path.clone());
            }
        }
        self.transform = Some(transform.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_descriptor_has_no_files() {
        let mut descriptor = ModDescriptor::new(Identity::new("Foo", "Dev", Some(GameType::ME3)), SourceKind::Native);
        descriptor
            .installable_files
            .insert("DLC/DLC_MOD_Foo".to_string(), InstallSource::Directory("DLC_MOD_Foo".to_string()));
        descriptor.fail("broken");

        assert!(!descriptor.is_valid());
        assert_eq!(descriptor.failure_reason(), Some("broken"));
        assert!(descriptor.installable_files.is_empty());
    }

    #[test]
    fn test_attach_transform() {
        let transform = TransformDefinition {
            name: "Installer".to_string(),
            ..Default::default()
        };
        let plan = TransformPlan {
            excluded: vec!["setup.ini".to_string()],
            redirected: vec![("payload/a.pcc".to_string(), "BIOGame/a.pcc".to_string())],
        };
        let mut descriptor = ModDescriptor::new(Identity::new("Foo", "Dev", None), SourceKind::Virtual);
        descriptor.attach_transform(&transform, &plan);

        assert_eq!(descriptor.excluded_entries, vec!["setup.ini"]);
        assert_eq!(
            descriptor.installable_files.get("BIOGame/a.pcc"),
            Some(&InstallSource::File("payload/a.pcc".to_string()))
        );
        assert_eq!(descriptor.transform.as_ref().map(|t| t.name.as_str()), Some("Installer"));
    }
}
