//! JSON shapes of the identification catalogue downloads
//!
//! Numeric fields are published as strings or numbers interchangeably.

use super::{DirectoryRecord, SizeHashRecord};
use crate::games::GameType;
use crate::mods::ini::split_list;
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct SizeHashEntry {
    md5: String,
    #[serde(default, deserialize_with = "lenient_string")]
    game: Option<String>,
    #[serde(default, alias = "modname", deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    version: Option<String>,
    #[serde(default, rename = "exetransform", deserialize_with = "lenient_string")]
    transform: Option<String>,
    #[serde(default, rename = "servermoddescname", deserialize_with = "lenient_string")]
    custom_manifest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    #[serde(rename = "modname")]
    name: String,
    #[serde(default, rename = "moddev", deserialize_with = "lenient_string")]
    developer: Option<String>,
    #[serde(default, rename = "moddesc", deserialize_with = "lenient_string")]
    description: Option<String>,
    #[serde(default, rename = "updatecode", deserialize_with = "lenient_string")]
    update_code: Option<String>,
    #[serde(default, rename = "preventimport", deserialize_with = "lenient_string")]
    prevent_import: Option<String>,
    #[serde(default, rename = "requireddlc", deserialize_with = "lenient_string")]
    required_dlc: Option<String>,
}

/// `{ "<size>": [ { "md5": ..., ... } ] }`
pub(super) fn parse_size_hash_catalogue(body: &str) -> Result<Vec<SizeHashRecord>> {
    let raw: HashMap<String, Vec<SizeHashEntry>> =
        serde_json::from_str(body).context("Failed to parse size/hash catalogue")?;

    let mut records = Vec::new();
    for (size, entries) in raw {
        let Ok(size) = size.trim().parse::<u64>() else {
            tracing::debug!("Skipping catalogue bucket with invalid size '{}'", size);
            continue;
        };
        for entry in entries {
            records.push(SizeHashRecord {
                size,
                md5: entry.md5.trim().to_ascii_lowercase(),
                game: entry.game.as_deref().and_then(GameType::from_id),
                name: entry.name,
                version: entry.version,
                transform: entry.transform,
                custom_manifest: entry.custom_manifest,
            });
        }
    }
    Ok(records)
}

/// `{ "<game>": { "<DLC folder>": { "modname": ..., ... } } }`
pub(super) fn parse_directory_catalogue(body: &str) -> Result<Vec<DirectoryRecord>> {
    let raw: HashMap<String, HashMap<String, DirectoryEntry>> =
        serde_json::from_str(body).context("Failed to parse directory catalogue")?;

    let mut records = Vec::new();
    for (game, folders) in raw {
        let Some(game) = GameType::from_id(&game) else {
            tracing::debug!("Skipping catalogue section for unknown game '{}'", game);
            continue;
        };
        for (folder, entry) in folders {
            records.push(DirectoryRecord {
                folder,
                game,
                name: entry.name,
                developer: entry.developer.unwrap_or_else(|| "Unknown".to_string()),
                description: entry.description,
                update_code: entry
                    .update_code
                    .and_then(|c| c.trim().parse::<u32>().ok())
                    .filter(|c| *c > 0),
                prevent_import: entry
                    .prevent_import
                    .is_some_and(|v| matches!(v.trim(), "1" | "true" | "True")),
                required_dlc: entry
                    .required_dlc
                    .map(|v| split_list(&v.replace(',', ";")))
                    .unwrap_or_default(),
            });
        }
    }
    Ok(records)
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(if b { "1" } else { "0" }.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_hash_catalogue() {
        let body = r#"{
            "1234": [
                {"md5": "ABCDEF", "game": "3", "modname": "Installer Mod", "version": 2.1, "exetransform": "InstallerXform"},
                {"md5": "123456", "servermoddescname": "other.ini", "version": ""}
            ],
            "bogus": []
        }"#;

        let mut records = parse_size_hash_catalogue(body).unwrap();
        records.sort_by(|a, b| a.md5.cmp(&b.md5));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].md5, "123456");
        assert_eq!(records[0].custom_manifest.as_deref(), Some("other.ini"));
        assert_eq!(records[0].version, None);
        assert_eq!(records[1].md5, "abcdef");
        assert_eq!(records[1].size, 1234);
        assert_eq!(records[1].game, Some(GameType::ME3));
        assert_eq!(records[1].version.as_deref(), Some("2.1"));
        assert_eq!(records[1].transform.as_deref(), Some("InstallerXform"));
    }

    #[test]
    fn test_parse_directory_catalogue() {
        let body = r#"{
            "ME3": {
                "DLC_MOD_Bar": {"modname": "Bar", "moddev": "Dev", "updatecode": "42", "requireddlc": "DLC_CON_A,DLC_CON_B"},
                "DLC_MOD_Blocked": {"modname": "Blocked", "preventimport": 1, "updatecode": 0}
            },
            "Unknown": {"DLC_X": {"modname": "X"}}
        }"#;

        let records = parse_directory_catalogue(body).unwrap();
        assert_eq!(records.len(), 2);

        let bar = records.iter().find(|r| r.folder == "DLC_MOD_Bar").unwrap();
        assert_eq!(bar.game, GameType::ME3);
        assert_eq!(bar.update_code, Some(42));
        assert!(!bar.prevent_import);
        assert_eq!(bar.required_dlc, vec!["DLC_CON_A", "DLC_CON_B"]);

        let blocked = records.iter().find(|r| r.folder == "DLC_MOD_Blocked").unwrap();
        assert!(blocked.prevent_import);
        assert_eq!(blocked.update_code, None);
        assert_eq!(blocked.developer, "Unknown");
    }
}
