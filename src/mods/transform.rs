//! Archive layout transforms
//!
//! A transform describes how the payload of a self-extracting installer maps
//! onto an importable mod layout: which entries to skip and which entries to
//! route to a different install target.

use crate::archive::Entry;
use anyhow::{Context, Result};
use quick_xml::de::from_str;
use serde::Deserialize;

/// Root element of a transform document
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename = "transform")]
pub struct TransformDefinition {
    #[serde(rename = "@name", default)]
    pub name: String,

    #[serde(rename = "noextract", default)]
    pub no_extract: Vec<NoExtract>,

    #[serde(rename = "alternateredirect", default)]
    pub redirects: Vec<AlternateRedirect>,

    #[serde(rename = "postextractmessage", default)]
    pub post_extract_message: Option<String>,
}

/// Entry that must not be installed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NoExtract {
    #[serde(rename = "@archiveindex")]
    pub archive_index: usize,
}

/// Entry installed to a different path than its archive location
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlternateRedirect {
    #[serde(rename = "@archiveindex")]
    pub archive_index: usize,

    #[serde(rename = "@outfile")]
    pub out_file: String,
}

/// Result of applying a transform to an archive's entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformPlan {
    /// Archive paths that are never installed
    pub excluded: Vec<String>,
    /// (archive path, install target)
    pub redirected: Vec<(String, String)>,
}

impl TransformDefinition {
    pub fn parse(xml: &str) -> Result<Self> {
        from_str(xml).context("Failed to parse transform definition")
    }

    /// Resolve archive indices against the entry list. Unknown indices are skipped.
    pub fn plan(&self, entries: &[Entry]) -> TransformPlan {
        let lookup = |index: usize| entries.iter().find(|e| e.index == index);

        let excluded = self
            .no_extract
            .iter()
            .filter_map(|n| lookup(n.archive_index))
            .map(|e| e.path.clone())
            .collect();

        let redirected = self
            .redirects
            .iter()
            .filter_map(|r| {
                let entry = lookup(r.archive_index)?;
                let target = crate::archive::normalize_entry_path(&r.out_file)?;
                Some((entry.path.clone(), target))
            })
            .collect();

        TransformPlan {
            excluded,
            redirected,
        }
    }
}
