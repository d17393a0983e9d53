//! modscout - mod archive import resolution for the Mass Effect trilogy
//!
//! - Classifies archive contents and loads native, legacy and texture mods
//! - Identifies third-party content through remote size/hash and DLC folder catalogues
//! - Checks imported mods against the classic relay, ModMaker and Nexus Mods

pub mod app;
pub mod archive;
pub mod catalogue;
pub mod config;
pub mod db;
pub mod games;
pub mod import;
pub mod mods;
pub mod nexus;
pub mod remote;
pub mod updates;

pub use app::App;
pub use config::Config;
