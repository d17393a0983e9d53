//! Per-format loaders. Each turns one entry into exactly one descriptor;
//! problems produce a failed descriptor instead of an error.

use crate::archive::{Entry, ModArchive};
use crate::games::GameType;
use crate::mods::ini::decode_text;
use crate::mods::{load_moddesc, Identity, InstallSource, ManifestLoad, ModDescriptor, SourceKind};
use anyhow::{bail, Result};

/// Bytes read from a legacy script package to parse its header
const SCRIPT_HEADER_LIMIT: usize = 1024 * 1024;
const TEXTURE_MAGIC_LEN: usize = 4;
const MEM_MAGIC: &[u8] = b"TMOD";
const TPF_MAGIC: &[u8] = b"PK\x03\x04";

const UNKNOWN_DEVELOPER: &str = "Unknown";

pub const QUEUE_REFUSAL: &str =
    "Install queues can only be imported from .7z archives. Ask the queue author for a .7z copy.";

fn file_stem(entry: &Entry) -> &str {
    let name = entry.file_name();
    match name.rfind('.') {
        Some(pos) if pos > 0 => &name[..pos],
        _ => name,
    }
}

/// Load a `moddesc.ini` shipped in the archive
pub fn load_native(archive: &mut dyn ModArchive, entry: &Entry, game_hint: Option<GameType>) -> ManifestLoad {
    let root = entry.parent_dir();
    tracing::debug!("Loading manifest {}", entry.path);

    match archive.extract(entry.index) {
        Ok(bytes) => {
            let text = decode_text(&bytes);
            let load = load_moddesc(&text, root, archive.entries(), SourceKind::Native, game_hint);
            ManifestLoad {
                descriptor: load.descriptor.with_source_path(&entry.path),
                claimed_roots: load.claimed_roots,
            }
        }
        Err(e) => {
            let name = root.rsplit('/').next().filter(|n| !n.is_empty()).unwrap_or("Unknown mod");
            let descriptor = ModDescriptor::failed(
                Identity::new(name, UNKNOWN_DEVELOPER, game_hint),
                SourceKind::Native,
                format!("Could not read manifest: {}", e),
            )
            .with_source_path(&entry.path);
            ManifestLoad {
                descriptor,
                claimed_roots: Vec::new(),
            }
        }
    }
}

/// Parsed header of a legacy `.mod` script package
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScriptHeader {
    version: u32,
    description: Option<String>,
    job_count: u32,
}

fn read_u32(bytes: &[u8], offset: &mut usize) -> Result<u32> {
    let Some(chunk) = bytes.get(*offset..*offset + 4) else {
        bail!("Package header is truncated");
    };
    *offset += 4;
    Ok(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

fn parse_script_header(bytes: &[u8]) -> Result<ScriptHeader> {
    let mut offset = 0;
    let version = read_u32(bytes, &mut offset)?;

    let description = if version >= 3 {
        let len = read_u32(bytes, &mut offset)? as usize;
        let Some(raw) = bytes.get(offset..offset + len) else {
            bail!("Package description is truncated");
        };
        offset += len;
        let text = decode_text(raw).trim().to_string();
        (!text.is_empty()).then_some(text)
    } else {
        None
    };

    let job_count = read_u32(bytes, &mut offset)?;
    if job_count == 0 {
        bail!("Package contains no jobs");
    }

    Ok(ScriptHeader {
        version,
        description,
        job_count,
    })
}

/// Load a legacy `.mod` script package
pub fn load_script_mod(archive: &mut dyn ModArchive, entry: &Entry) -> ModDescriptor {
    let identity = Identity::new(file_stem(entry), UNKNOWN_DEVELOPER, Some(GameType::ME3));

    let header = archive
        .extract_head(entry.index, SCRIPT_HEADER_LIMIT)
        .map_err(anyhow::Error::from)
        .and_then(|bytes| parse_script_header(&bytes));

    match header {
        Ok(header) => {
            tracing::debug!(
                "Legacy package {} (format {}, {} jobs)",
                entry.path,
                header.version,
                header.job_count
            );
            let mut descriptor = ModDescriptor::new(identity, SourceKind::LegacyScript);
            descriptor.description = header.description;
            descriptor
                .installable_files
                .insert(entry.file_name().to_string(), InstallSource::File(entry.path.clone()));
            descriptor.with_source_path(&entry.path)
        }
        Err(e) => ModDescriptor::failed(
            identity,
            SourceKind::LegacyScript,
            format!("Not a valid legacy mod package: {}", e),
        )
        .with_source_path(&entry.path),
    }
}

/// Load a `.mem` or `.tpf` texture package
pub fn load_texture_mod(archive: &mut dyn ModArchive, entry: &Entry, game_hint: Option<GameType>) -> ModDescriptor {
    let identity = Identity::new(
        file_stem(entry),
        UNKNOWN_DEVELOPER,
        Some(game_hint.unwrap_or(GameType::ME3)),
    );
    let expected = match entry.extension().as_deref() {
        Some("tpf") => TPF_MAGIC,
        _ => MEM_MAGIC,
    };

    let failure = match archive.extract_head(entry.index, TEXTURE_MAGIC_LEN.max(expected.len())) {
        Ok(head) if head.starts_with(expected) => None,
        Ok(_) => Some("File is not a texture package".to_string()),
        Err(e) => Some(format!("Could not read texture package: {}", e)),
    };

    match failure {
        None => {
            let mut descriptor = ModDescriptor::new(identity, SourceKind::Texture);
            descriptor
                .installable_files
                .insert(entry.file_name().to_string(), InstallSource::File(entry.path.clone()));
            descriptor.with_source_path(&entry.path)
        }
        Some(reason) => ModDescriptor::failed(identity, SourceKind::Texture, reason).with_source_path(&entry.path),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InstallQueue {
    game: Option<GameType>,
    name: String,
    description: Option<String>,
    members: Vec<String>,
}

fn parse_install_queue(text: &str) -> Result<InstallQueue> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty()).peekable();

    let mut game = None;
    if let Some(value) = lines.peek().copied().and_then(|l| l.strip_prefix("game=")) {
        let Some(parsed) = GameType::from_id(value) else {
            bail!("Queue targets an unknown game '{}'", value);
        };
        game = Some(parsed);
        lines.next();
    }

    let Some(name) = lines.next() else {
        bail!("Queue is empty");
    };
    let description = lines.next().map(str::to_string);
    let members: Vec<String> = lines.map(str::to_string).collect();
    if members.is_empty() {
        bail!("Queue lists no mods");
    }

    Ok(InstallQueue {
        game,
        name: name.to_string(),
        description,
        members,
    })
}

/// Load a batch install queue
pub fn load_install_queue(archive: &mut dyn ModArchive, entry: &Entry, game_hint: Option<GameType>) -> ModDescriptor {
    let fallback = Identity::new(file_stem(entry), UNKNOWN_DEVELOPER, game_hint);

    let queue = archive
        .extract(entry.index)
        .map_err(anyhow::Error::from)
        .and_then(|bytes| parse_install_queue(&decode_text(&bytes)));

    match queue {
        Ok(queue) => {
            let identity = Identity::new(queue.name, UNKNOWN_DEVELOPER, queue.game.or(game_hint));
            let mut descriptor = ModDescriptor::new(identity, SourceKind::Queue);
            let listing = queue.members.join("\n");
            descriptor.description = Some(match queue.description {
                Some(text) => format!("{}\n\n{}", text, listing),
                None => listing,
            });
            descriptor
                .installable_files
                .insert(entry.file_name().to_string(), InstallSource::File(entry.path.clone()));
            descriptor.with_source_path(&entry.path)
        }
        Err(e) => ModDescriptor::failed(fallback, SourceKind::Queue, format!("Invalid install queue: {}", e))
            .with_source_path(&entry.path),
    }
}

/// Failed descriptor for queues shipped in a container whose text cannot be verified
pub fn reject_install_queue(entry: &Entry, game_hint: Option<GameType>) -> ModDescriptor {
    ModDescriptor::failed(
        Identity::new(file_stem(entry), UNKNOWN_DEVELOPER, game_hint),
        SourceKind::Queue,
        QUEUE_REFUSAL,
    )
    .with_source_path(&entry.path)
}
