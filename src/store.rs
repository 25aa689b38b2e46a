//! Small persisted key-value state, shaped like browser local storage: every
//! value is a string and callers own the encoding.

use crate::model::{PlaylistId, PlaylistRecord};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const PLAYLISTS_KEY: &str = "playlists";
pub const ACTIVE_PLAYLIST_KEY: &str = "activePlaylistId";
pub const SHUFFLE_KEY: &str = "isShuffle";
pub const VOLUME_KEY: &str = "volume";

pub const DEFAULT_PLAYLIST_NAME: &str = "My First Playlist";

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// String map kept in one JSON file. The whole file is rewritten on every
/// `set`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Opens the store at `path`. A missing file is an empty store, and so
    /// is one that cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                log::warn!("ignoring corrupt state file {}: {err}", path.display());
                BTreeMap::new()
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                log::warn!("failed to read state file {}: {err}", path.display());
                BTreeMap::new()
            }
        };
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }
}

/// Playlist layout and flags read back at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub playlists: Vec<PlaylistRecord>,
    pub active: Option<PlaylistId>,
    pub shuffle: bool,
    pub volume: Option<f32>,
}

/// Rehydrates the saved session.
///
/// With no saved playlists at all, a single default playlist with id
/// `default_id` is created and made active. A saved value that is not a JSON
/// array of playlists yields no playlists.
pub fn load_session(store: &dyn KeyValueStore, default_id: PlaylistId) -> Session {
    let shuffle = store.get(SHUFFLE_KEY).as_deref() == Some("true");
    let volume = store
        .get(VOLUME_KEY)
        .and_then(|raw| raw.trim().parse::<f32>().ok())
        .filter(|volume| volume.is_finite())
        .map(|volume| volume.clamp(0.0, 1.0));

    let saved = store.get(PLAYLISTS_KEY).filter(|raw| !raw.is_empty());
    let Some(raw) = saved else {
        return Session {
            playlists: vec![PlaylistRecord {
                id: default_id.clone(),
                name: DEFAULT_PLAYLIST_NAME.to_string(),
            }],
            active: Some(default_id),
            shuffle,
            volume,
        };
    };

    let playlists = match serde_json::from_str::<Vec<PlaylistRecord>>(&raw) {
        Ok(playlists) => playlists,
        Err(err) => {
            log::warn!("failed to parse saved playlists: {err}");
            Vec::new()
        }
    };

    let saved_active = store.get(ACTIVE_PLAYLIST_KEY).map(PlaylistId);
    let active = saved_active
        .filter(|id| playlists.iter().any(|playlist| &playlist.id == id))
        .or_else(|| playlists.first().map(|playlist| playlist.id.clone()));

    Session {
        playlists,
        active,
        shuffle,
        volume,
    }
}

/// Writes the playlist layout. An empty set is never written, so the last
/// saved layout survives deleting every playlist.
pub fn save_playlists(store: &mut dyn KeyValueStore, playlists: &[PlaylistRecord]) -> Result<()> {
    if playlists.is_empty() {
        return Ok(());
    }
    let json = serde_json::to_string(playlists).context("failed to encode playlists")?;
    store.set(PLAYLISTS_KEY, &json)
}

pub fn save_active(store: &mut dyn KeyValueStore, active: Option<&PlaylistId>) -> Result<()> {
    match active {
        Some(id) => store.set(ACTIVE_PLAYLIST_KEY, id.as_str()),
        None => Ok(()),
    }
}

pub fn save_shuffle(store: &mut dyn KeyValueStore, shuffle: bool) -> Result<()> {
    store.set(SHUFFLE_KEY, if shuffle { "true" } else { "false" })
}

pub fn save_volume(store: &mut dyn KeyValueStore, volume: f32) -> Result<()> {
    store.set(VOLUME_KEY, &format!("{volume:.2}"))
}
