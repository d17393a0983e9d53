//! Cached identification records

use crate::games::GameType;
use crate::mods::ini::split_list;
use rusqlite::Row;
use serde::Serialize;

/// Identification record keyed by exact archive size, filtered by MD5
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeHashRecord {
    pub size: u64,
    /// Lowercase hex MD5
    pub md5: String,
    pub game: Option<GameType>,
    pub name: Option<String>,
    pub version: Option<String>,
    /// Transform document applied to the archive's entries
    pub transform: Option<String>,
    /// Remote manifest that replaces a missing `moddesc.ini`
    pub custom_manifest: Option<String>,
}

impl SizeHashRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let game: Option<String> = row.get(2)?;
        Ok(Self {
            size: row.get::<_, i64>(0)? as u64,
            md5: row.get(1)?,
            game: game.as_deref().and_then(GameType::from_id),
            name: row.get(3)?,
            version: row.get(4)?,
            transform: row.get(5)?,
            custom_manifest: row.get(6)?,
        })
    }

    pub fn matches_hash(&self, md5: &str) -> bool {
        self.md5.eq_ignore_ascii_case(md5)
    }
}

/// Identification record keyed by DLC folder name and game
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryRecord {
    pub folder: String,
    pub game: GameType,
    pub name: String,
    pub developer: String,
    pub description: Option<String>,
    /// Classic relay update code
    pub update_code: Option<u32>,
    /// Known content that must never be imported
    pub prevent_import: bool,
    pub required_dlc: Vec<String>,
}

impl DirectoryRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let game: String = row.get(1)?;
        let game = GameType::from_id(&game).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("unknown game '{}'", game).into(),
            )
        })?;
        let required_dlc: Option<String> = row.get(7)?;

        Ok(Self {
            folder: row.get(0)?,
            game,
            name: row.get(2)?,
            developer: row.get(3)?,
            description: row.get(4)?,
            update_code: row.get::<_, Option<i64>>(5)?.map(|c| c as u32).filter(|c| *c > 0),
            prevent_import: row.get::<_, i32>(6)? != 0,
            required_dlc: required_dlc.as_deref().map(split_list).unwrap_or_default(),
        })
    }
}

/// Either kind of identification record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentificationRecord {
    BySizeAndHash(SizeHashRecord),
    ByDirectoryName(DirectoryRecord),
}

impl IdentificationRecord {
    /// Name shown to the user, if the record carries one
    pub fn display_name(&self) -> Option<&str> {
        match self {
            IdentificationRecord::BySizeAndHash(r) => r.name.as_deref(),
            IdentificationRecord::ByDirectoryName(r) => Some(&r.name),
        }
    }
}
