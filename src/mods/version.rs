//! Mod version parsing, comparison and provenance

use regex_lite::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

/// Text shown for a version that must be re-checked before it can be trusted
pub const PENDING_CHECK_DISPLAY: &str = "0.001";

/// Leading `v`, then one to four dot-separated numbers
fn version_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[vV]?(\d+(?:\.\d+){0,3})").ok())
        .as_ref()
}

/// Numeric mod version with up to four components
///
/// Missing components compare as zero, so `1.2` == `1.2.0`.
#[derive(Debug, Clone, Copy, Eq, Serialize)]
pub struct ModVersion {
    parts: [u32; 4],
    #[serde(skip)]
    len: u8,
}

impl ModVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            parts: [major, minor, 0, 0],
            len: 2,
        }
    }

    /// Baseline version for content whose real version is not known yet
    pub fn zero() -> Self {
        Self::new(0, 0)
    }

    /// Normalize a single-component revision number (e.g. ModMaker's `12`) to `12.0`
    pub fn from_revision(revision: u32) -> Self {
        Self::new(revision, 0)
    }

    /// Lenient parse: accepts a `v` prefix, ignores a trailing non-numeric
    /// suffix (`1.2b`, `2.0 beta`), and pads a single component with `.0`.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = version_pattern()?.captures(raw.trim())?;
        let numeric = caps.get(1)?.as_str();

        let mut parts = [0u32; 4];
        let mut len = 0u8;
        for component in numeric.split('.') {
            parts[len as usize] = component.parse().ok()?;
            len += 1;
        }

        Some(Self {
            parts,
            len: len.max(2),
        })
    }
}

impl PartialEq for ModVersion {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl PartialOrd for ModVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl fmt::Display for ModVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: Vec<String> = self.parts[..self.len as usize]
            .iter()
            .map(|p| p.to_string())
            .collect();
        f.write_str(&shown.join("."))
    }
}

/// Where a descriptor's version came from, most trusted first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum VersionSource {
    /// Written in the mod's own manifest
    Embedded,
    /// Supplied by a matched identification record
    IdentificationRecord,
    /// Answered by the relay service
    RelayQuery,
    /// Content recognized, version not tracked anywhere
    Unknown,
}

/// Interpretation of a descriptor's version text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VersionState {
    Parsed(ModVersion),
    /// Forces an update check: older than any real release
    PendingCheck,
    Unparseable,
}

/// Version envelope carried by every descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptorVersion {
    pub raw: String,
    pub state: VersionState,
    /// `None` until some source has assigned a version
    pub source: Option<VersionSource>,
}

impl DescriptorVersion {
    /// Neutral zero baseline, awaiting resolution
    pub fn unresolved() -> Self {
        Self {
            raw: ModVersion::zero().to_string(),
            state: VersionState::Parsed(ModVersion::zero()),
            source: None,
        }
    }

    /// Sentinel that guarantees one immediate update check
    pub fn pending_check() -> Self {
        Self {
            raw: PENDING_CHECK_DISPLAY.to_string(),
            state: VersionState::PendingCheck,
            source: None,
        }
    }

    /// Version written in the mod's own manifest
    pub fn embedded(raw: &str) -> Self {
        Self {
            raw: raw.trim().to_string(),
            state: Self::interpret(raw),
            source: Some(VersionSource::Embedded),
        }
    }

    fn interpret(raw: &str) -> VersionState {
        match ModVersion::parse(raw) {
            Some(v) => VersionState::Parsed(v),
            None => VersionState::Unparseable,
        }
    }

    /// Assign a version from `source`. Refused when the current version
    /// came from a more trusted (or equally trusted) source.
    pub fn try_assign(&mut self, raw: &str, source: VersionSource) -> bool {
        if let Some(current) = self.source {
            if source >= current {
                tracing::debug!(
                    "Keeping {:?} version '{}' over {:?} value '{}'",
                    current,
                    self.raw,
                    source,
                    raw
                );
                return false;
            }
        }

        self.raw = raw.trim().to_string();
        self.state = Self::interpret(raw);
        self.source = Some(source);
        true
    }

    /// Record that no source knows this version; the current text is kept
    pub fn mark_unknown(&mut self) {
        if self.source.is_none() {
            self.source = Some(VersionSource::Unknown);
        }
    }

    /// Version from a source other than `Unknown`
    pub fn is_trusted(&self) -> bool {
        matches!(self.source, Some(s) if s != VersionSource::Unknown)
    }

    pub fn is_pending_check(&self) -> bool {
        self.state == VersionState::PendingCheck
    }

    /// Whether a server release is newer than this version.
    /// Unparseable versions are never judged outdated.
    pub fn is_older_than(&self, server: &ModVersion) -> bool {
        match self.state {
            VersionState::PendingCheck => true,
            VersionState::Parsed(v) => v < *server,
            VersionState::Unparseable => false,
        }
    }
}

impl fmt::Display for DescriptorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_versions() {
        assert_eq!(ModVersion::parse("1.2").unwrap().to_string(), "1.2");
        assert_eq!(ModVersion::parse("v2.0.1").unwrap().to_string(), "2.0.1");
        assert_eq!(ModVersion::parse("3").unwrap().to_string(), "3.0");
        assert_eq!(ModVersion::parse("1.0b").unwrap(), ModVersion::new(1, 0));
        assert_eq!(ModVersion::parse("2.1 beta").unwrap(), ModVersion::new(2, 1));
        assert_eq!(ModVersion::parse("1.2.3.4.5").unwrap().to_string(), "1.2.3.4");
        assert!(ModVersion::parse("beta").is_none());
        assert!(ModVersion::parse("").is_none());
    }

    #[test]
    fn test_compare_zero_fills() {
        assert_eq!(ModVersion::parse("1.2").unwrap(), ModVersion::parse("1.2.0").unwrap());
        assert!(ModVersion::parse("1.10").unwrap() > ModVersion::parse("1.9").unwrap());
        assert!(ModVersion::from_revision(12) > ModVersion::parse("11.5").unwrap());
        assert_eq!(ModVersion::from_revision(12).to_string(), "12.0");
    }

    #[test]
    fn test_source_trust_order() {
        let mut version = DescriptorVersion::unresolved();
        assert!(version.try_assign("1.1", VersionSource::IdentificationRecord));
        assert!(!version.try_assign("9.9", VersionSource::RelayQuery));
        assert_eq!(version.raw, "1.1");
        assert_eq!(version.source, Some(VersionSource::IdentificationRecord));

        // A more trusted source still wins
        assert!(version.try_assign("1.2", VersionSource::Embedded));
        assert_eq!(version.raw, "1.2");
    }

    #[test]
    fn test_unknown_is_overwritable() {
        let mut version = DescriptorVersion::unresolved();
        version.mark_unknown();
        assert!(!version.is_trusted());
        assert!(version.try_assign("2.0", VersionSource::RelayQuery));
        assert!(version.is_trusted());
    }

    #[test]
    fn test_pending_check_is_older_than_anything() {
        let pending = DescriptorVersion::pending_check();
        assert_eq!(pending.raw, "0.001");
        assert!(pending.is_older_than(&ModVersion::zero()));
        assert!(pending.is_older_than(&ModVersion::new(0, 1)));

        let unparseable = DescriptorVersion::embedded("nightly");
        assert_eq!(unparseable.state, VersionState::Unparseable);
        assert!(!unparseable.is_older_than(&ModVersion::new(99, 0)));
    }
}
