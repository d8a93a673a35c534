use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use super::{SlackChannel, SlackUser};

pub const USERS_MANIFEST: &str = "users.json";
pub const CHANNELS_MANIFEST: &str = "channels.json";
const HUDDLE_TRANSCRIPTS: &str = "huddle_transcripts.json";
/// Upper bound on the buffer reserved from a member's declared size.
const MAX_PREALLOC: u64 = 1 << 20;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Required file {0} not found in Slack export")]
    MissingManifest(String),

    #[error("Unable to parse JSON from {name}: {reason}")]
    MalformedManifest { name: String, reason: String },

    #[error("Zip error: {0}")]
    Zip(#[from] ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of reading one per-day message file.
#[derive(Debug)]
pub enum DayFile {
    Empty,
    Malformed,
    NotArray,
    Entries(Vec<Value>),
}

/// A folder in the export matched to the channel it holds messages for.
#[derive(Debug, Clone)]
pub struct ChannelFolder {
    pub folder: String,
    pub channel: SlackChannel,
    /// Per-day files, lexically sorted (`YYYY-MM-DD.json` sorts chronologically).
    pub files: Vec<String>,
}

pub struct ExportArchive {
    path: PathBuf,
    zip: ZipArchive<File>,
    users: Vec<SlackUser>,
    channels: Vec<SlackChannel>,
    folders: BTreeMap<String, Vec<String>>,
}

impl ExportArchive {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_path_buf();
        let mut zip = ZipArchive::new(File::open(&path)?)?;

        let users = read_manifest::<SlackUser>(&mut zip, USERS_MANIFEST)?;
        let channels = read_manifest::<SlackChannel>(&mut zip, CHANNELS_MANIFEST)?;
        let folders = index_folders(zip.file_names());

        debug!(
            path = %path.display(),
            users = users.len(),
            channels = channels.len(),
            folders = folders.len(),
            "opened slack export"
        );

        Ok(Self {
            path,
            zip,
            users,
            channels,
            folders,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn users(&self) -> &[SlackUser] {
        &self.users
    }

    pub fn channels(&self) -> &[SlackChannel] {
        &self.channels
    }

    /// Raw folder index: folder name to its sorted per-day files.
    pub fn folders(&self) -> &BTreeMap<String, Vec<String>> {
        &self.folders
    }

    /// Folders whose name matches a channel's `name` or `id`. Anything else in
    /// the archive (canvases, `FC:` entries, stray files) is ignored.
    pub fn channel_folders(&self) -> Vec<ChannelFolder> {
        let mut lookup: BTreeMap<&str, &SlackChannel> = BTreeMap::new();
        for channel in &self.channels {
            if let Some(name) = channel.name.as_deref() {
                lookup.insert(name, channel);
            }
            if let Some(id) = channel.id.as_deref() {
                lookup.insert(id, channel);
            }
        }

        self.folders
            .iter()
            .filter_map(|(folder, files)| {
                let channel = lookup.get(folder.as_str())?;
                channel.name.as_ref()?;
                Some(ChannelFolder {
                    folder: folder.clone(),
                    channel: (*channel).clone(),
                    files: files.clone(),
                })
            })
            .collect()
    }

    /// Reads a single per-day file into memory.
    pub fn read_day_file(&mut self, member: &str) -> DayFile {
        let raw = match read_member(&mut self.zip, member) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(member, error = %e, "failed to read day file");
                return DayFile::Malformed;
            }
        };
        if raw.is_empty() {
            return DayFile::Empty;
        }
        match serde_json::from_slice::<Value>(&raw) {
            Ok(Value::Array(entries)) => DayFile::Entries(entries),
            Ok(_) => DayFile::NotArray,
            Err(e) => {
                warn!(member, error = %e, "malformed day file");
                DayFile::Malformed
            }
        }
    }
}

fn read_member(zip: &mut ZipArchive<File>, member: &str) -> Result<Vec<u8>, ArchiveError> {
    let mut entry = zip.by_name(member)?;
    let mut raw = Vec::with_capacity(initial_capacity(entry.size()));
    entry.read_to_end(&mut raw)?;
    Ok(raw)
}

// The declared size comes from the archive and is not trusted.
fn initial_capacity(declared: u64) -> usize {
    usize::try_from(declared.min(MAX_PREALLOC)).unwrap_or(0)
}

fn read_manifest<T: DeserializeOwned>(
    zip: &mut ZipArchive<File>,
    name: &str,
) -> Result<Vec<T>, ArchiveError> {
    let raw = match read_member(zip, name) {
        Ok(raw) => raw,
        Err(ArchiveError::Zip(ZipError::FileNotFound)) => {
            return Err(ArchiveError::MissingManifest(name.to_string()));
        }
        Err(e) => return Err(e),
    };

    let malformed = |reason: String| ArchiveError::MalformedManifest {
        name: name.to_string(),
        reason,
    };

    let value: Value = serde_json::from_slice(&raw).map_err(|e| malformed(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(malformed("expected a JSON array".to_string()));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(position, item)| {
            if !item.is_object() {
                return Err(malformed(format!("element {} is not an object", position)));
            }
            serde_json::from_value(item)
                .map_err(|e| malformed(format!("element {}: {}", position, e)))
        })
        .collect()
}

fn index_folders<'a>(names: impl Iterator<Item = &'a str>) -> BTreeMap<String, Vec<String>> {
    let mut index: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in names {
        if matches!(name, USERS_MANIFEST | CHANNELS_MANIFEST | HUDDLE_TRANSCRIPTS) {
            continue;
        }
        if !name.ends_with(".json") {
            continue;
        }
        let Some((folder, _)) = name.split_once('/') else {
            continue;
        };
        index
            .entry(folder.to_string())
            .or_default()
            .push(name.to_string());
    }
    for files in index.values_mut() {
        files.sort();
    }
    index
}


#[cfg(test)]
mod tests {
    use super::testing::write_zip;
    use super::*;

    const USERS: &str = r#"[{"id":"U1","name":"ana","profile":{"email":"ana@example.com"}}]"#;
    const CHANNELS: &str = r#"[{"id":"C1","name":"general","members":["U1"]}]"#;

    #[test]
    fn declared_member_size_is_capped() {
        assert_eq!(initial_capacity(10), 10);
        assert_eq!(initial_capacity(u64::MAX), 1 << 20);
    }

    #[test]
    fn indexes_channel_folders_and_skips_root_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.zip");
        write_zip(
            &path,
            &[
                ("users.json", USERS),
                ("channels.json", CHANNELS),
                ("huddle_transcripts.json", "[]"),
                ("general/2024-01-02.json", "[]"),
                ("general/2024-01-01.json", "[]"),
                ("general/notes.txt", "ignored"),
                ("canvases/abc.json", "[]"),
            ],
        );

        let archive = ExportArchive::open(&path).unwrap();
        assert_eq!(archive.users().len(), 1);
        assert_eq!(archive.folders().len(), 2);

        let folders = archive.channel_folders();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].folder, "general");
        assert_eq!(
            folders[0].files,
            vec!["general/2024-01-01.json", "general/2024-01-02.json"]
        );
    }

    #[test]
    fn folder_named_by_channel_id_is_matched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.zip");
        write_zip(
            &path,
            &[
                ("users.json", USERS),
                ("channels.json", CHANNELS),
                ("C1/2024-01-01.json", "[]"),
            ],
        );

        let folders = ExportArchive::open(&path).unwrap().channel_folders();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].channel.name.as_deref(), Some("general"));
    }

    #[test]
    fn missing_manifest_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.zip");
        write_zip(&path, &[("users.json", USERS)]);

        match ExportArchive::open(&path) {
            Err(ArchiveError::MissingManifest(name)) => assert_eq!(name, "channels.json"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn manifest_must_be_an_array_of_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.zip");
        write_zip(
            &path,
            &[("users.json", r#"{"id":"U1"}"#), ("channels.json", CHANNELS)],
        );
        assert!(matches!(
            ExportArchive::open(&path),
            Err(ArchiveError::MalformedManifest { .. })
        ));

        write_zip(
            &path,
            &[("users.json", "[1, 2]"), ("channels.json", CHANNELS)],
        );
        assert!(matches!(
            ExportArchive::open(&path),
            Err(ArchiveError::MalformedManifest { .. })
        ));
    }

    #[test]
    fn day_files_report_their_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.zip");
        write_zip(
            &path,
            &[
                ("users.json", USERS),
                ("channels.json", CHANNELS),
                ("general/2024-01-01.json", ""),
                ("general/2024-01-02.json", "{not json"),
                ("general/2024-01-03.json", "{}"),
                ("general/2024-01-04.json", r#"[{"type":"message"}]"#),
            ],
        );

        let mut archive = ExportArchive::open(&path).unwrap();
        assert!(matches!(
            archive.read_day_file("general/2024-01-01.json"),
            DayFile::Empty
        ));
        assert!(matches!(
            archive.read_day_file("general/2024-01-02.json"),
            DayFile::Malformed
        ));
        assert!(matches!(
            archive.read_day_file("general/2024-01-03.json"),
            DayFile::NotArray
        ));
        assert!(matches!(
            archive.read_day_file("general/2024-01-04.json"),
            DayFile::Entries(entries) if entries.len() == 1
        ));
        assert!(matches!(
            archive.read_day_file("general/absent.json"),
            DayFile::Malformed
        ));
    }
}
