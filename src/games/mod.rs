//! Supported games and their per-game conventions

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported games
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GameType {
    ME1,
    ME2,
    ME3,
    LE1,
    LE2,
    LE3,
}

/// Well-known file that marks a directory as a DLC package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideloadMarker {
    /// `Default.sfar` - packed ME3 DLC
    Sfar,
    /// `Mount.dlc` - ME2 and Legendary Edition DLC
    MountDlc,
    /// `AutoLoad.ini` - ME1 DLC
    AutoLoad,
}

impl SideloadMarker {
    /// Every marker, in classification order
    pub fn all() -> &'static [SideloadMarker] {
        &[
            SideloadMarker::Sfar,
            SideloadMarker::MountDlc,
            SideloadMarker::AutoLoad,
        ]
    }

    /// Lowercased file name of the marker
    pub fn file_name(&self) -> &'static str {
        match self {
            SideloadMarker::Sfar => "default.sfar",
            SideloadMarker::MountDlc => "mount.dlc",
            SideloadMarker::AutoLoad => "autoload.ini",
        }
    }

    /// Match a base file name (case-insensitive)
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::all().iter().copied().find(|m| m.file_name() == lower)
    }

    /// Game assumed when nothing else says otherwise
    pub fn default_game(&self) -> GameType {
        match self {
            SideloadMarker::Sfar => GameType::ME3,
            SideloadMarker::MountDlc => GameType::ME2,
            SideloadMarker::AutoLoad => GameType::ME1,
        }
    }

    /// Pick the target game, preferring a hint that uses this marker
    pub fn resolve_game(&self, hint: Option<GameType>) -> GameType {
        match hint {
            Some(game) if game.sideload_marker() == *self => game,
            _ => self.default_game(),
        }
    }
}

impl GameType {
    /// Every supported game
    pub fn all() -> &'static [GameType] {
        &[
            GameType::ME1,
            GameType::ME2,
            GameType::ME3,
            GameType::LE1,
            GameType::LE2,
            GameType::LE3,
        ]
    }

    /// Parse from stable game ID.
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_ascii_uppercase().as_str() {
            "ME1" | "1" => Some(GameType::ME1),
            "ME2" | "2" => Some(GameType::ME2),
            "ME3" | "3" => Some(GameType::ME3),
            "LE1" => Some(GameType::LE1),
            "LE2" => Some(GameType::LE2),
            "LE3" => Some(GameType::LE3),
            _ => None,
        }
    }

    pub fn from_cli(value: &str) -> Result<Self> {
        match Self::from_id(value) {
            Some(game) => Ok(game),
            None => bail!(
                "Unknown game '{}'. Valid games: ME1, ME2, ME3, LE1, LE2, LE3",
                value
            ),
        }
    }

    /// Stable game ID
    pub fn id(&self) -> &'static str {
        match self {
            GameType::ME1 => "ME1",
            GameType::ME2 => "ME2",
            GameType::ME3 => "ME3",
            GameType::LE1 => "LE1",
            GameType::LE2 => "LE2",
            GameType::LE3 => "LE3",
        }
    }

    /// Get the NexusMods game domain
    pub fn nexus_domain(&self) -> &'static str {
        match self {
            GameType::ME1 => "masseffect",
            GameType::ME2 => "masseffect2",
            GameType::ME3 => "masseffect3",
            GameType::LE1 | GameType::LE2 | GameType::LE3 => "masseffectlegendaryedition",
        }
    }

    /// File that marks a DLC directory for this game
    pub fn sideload_marker(&self) -> SideloadMarker {
        match self {
            GameType::ME1 => SideloadMarker::AutoLoad,
            GameType::ME3 => SideloadMarker::Sfar,
            GameType::ME2 | GameType::LE1 | GameType::LE2 | GameType::LE3 => {
                SideloadMarker::MountDlc
            }
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
