use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongId(pub String);

impl SongId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SongId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaylistId(pub String);

impl PlaylistId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlaylistId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A local file a channel can play. `duration` is the probed length when
/// the container reports one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub path: PathBuf,
    pub duration: Option<Duration>,
}

impl Media {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    pub id: SongId,
    pub name: String,
    pub media: Media,
    /// When false the song is cut down to the snippet window.
    pub play_full: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub id: PlaylistId,
    pub name: String,
    pub songs: Vec<Song>,
}

impl Playlist {
    pub fn new(id: PlaylistId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            songs: Vec::new(),
        }
    }

    pub fn song_ids(&self) -> Vec<SongId> {
        self.songs.iter().map(|song| song.id.clone()).collect()
    }

    pub fn song(&self, id: &SongId) -> Option<&Song> {
        self.songs.iter().find(|song| &song.id == id)
    }

    pub fn position(&self, id: &SongId) -> Option<usize> {
        self.songs.iter().position(|song| &song.id == id)
    }
}

/// The persisted shape of a playlist. Songs hold live file handles and are
/// never written out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRecord {
    pub id: PlaylistId,
    pub name: String,
}

impl From<&Playlist> for PlaylistRecord {
    fn from(playlist: &Playlist) -> Self {
        Self {
            id: playlist.id.clone(),
            name: playlist.name.clone(),
        }
    }
}

impl From<PlaylistRecord> for Playlist {
    fn from(record: PlaylistRecord) -> Self {
        Playlist::new(record.id, record.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
    Paused,
}

impl PlayerState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Stopped",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixSettings {
    #[serde(default = "default_fade_seconds")]
    pub fade_seconds: u16,
    #[serde(default = "default_snippet_seconds")]
    pub snippet_seconds: u16,
    #[serde(default = "default_start_offset_seconds")]
    pub start_offset_seconds: u16,
    #[serde(default = "default_ramp_interval_ms")]
    pub ramp_interval_ms: u16,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u16,
    #[serde(default = "default_volume")]
    pub default_volume: f32,
}

fn default_fade_seconds() -> u16 {
    5
}

fn default_snippet_seconds() -> u16 {
    35
}

fn default_start_offset_seconds() -> u16 {
    20
}

fn default_ramp_interval_ms() -> u16 {
    50
}

fn default_progress_interval_ms() -> u16 {
    250
}

fn default_volume() -> f32 {
    0.8
}

impl MixSettings {
    pub fn fade(&self) -> Duration {
        Duration::from_secs(u64::from(self.fade_seconds))
    }

    pub fn snippet(&self) -> Duration {
        Duration::from_secs(u64::from(self.snippet_seconds))
    }

    pub fn start_offset(&self) -> Duration {
        Duration::from_secs(u64::from(self.start_offset_seconds))
    }

    pub fn ramp_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.ramp_interval_ms.max(1)))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.progress_interval_ms.max(1)))
    }

    /// Number of volume steps one fade takes.
    pub fn ramp_steps(&self) -> u32 {
        let steps = self.fade().as_millis() / self.ramp_interval().as_millis();
        u32::try_from(steps).unwrap_or(u32::MAX)
    }
}

impl Default for MixSettings {
    fn default() -> Self {
        Self {
            fade_seconds: default_fade_seconds(),
            snippet_seconds: default_snippet_seconds(),
            start_offset_seconds: default_start_offset_seconds(),
            ramp_interval_ms: default_ramp_interval_ms(),
            progress_interval_ms: default_progress_interval_ms(),
            default_volume: default_volume(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_give_one_hundred_ramp_steps() {
        let settings = MixSettings::default();
        assert_eq!(settings.fade(), Duration::from_secs(5));
        assert_eq!(settings.ramp_steps(), 100);
    }

    #[test]
    fn partial_settings_fill_in_defaults() {
        let settings: MixSettings =
            serde_json::from_str(r#"{"fade_seconds": 2}"#).expect("parse settings");
        assert_eq!(settings.fade_seconds, 2);
        assert_eq!(settings.snippet_seconds, 35);
        assert_eq!(settings.start_offset_seconds, 20);
        assert_eq!(settings.ramp_steps(), 40);
    }

    #[test]
    fn zero_fade_has_no_ramp_steps() {
        let settings = MixSettings {
            fade_seconds: 0,
            ..MixSettings::default()
        };
        assert_eq!(settings.ramp_steps(), 0);
    }
}
