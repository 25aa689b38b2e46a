use crate::model::{Media, Song, SongId};
use anyhow::{Context, Result, bail};
use lofty::file::AudioFile;
use lofty::probe::Probe;
use rand::Rng;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "aac", "opus"];

pub fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Expands each selected path into songs, in selection order. Folders are
/// walked recursively and sorted by file name; files without an audio
/// extension are skipped.
pub fn songs_from_paths(paths: &[PathBuf]) -> Result<Vec<Song>> {
    let mut songs = Vec::new();
    for path in paths {
        for file in audio_files_under(path)? {
            match song_from_file(&file) {
                Ok(song) => songs.push(song),
                Err(err) => log::warn!("skipping {}: {err:#}", file.display()),
            }
        }
    }
    Ok(songs)
}

fn audio_files_under(path: &Path) -> Result<Vec<PathBuf>> {
    let metadata =
        fs::metadata(path).with_context(|| format!("cannot open {}", path.display()))?;

    if metadata.is_file() {
        if !is_audio(path) {
            bail!("not an audio file: {}", path.display());
        }
        return Ok(vec![path.to_path_buf()]);
    }

    let files = WalkDir::new(path)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_audio(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    Ok(files)
}

pub fn song_from_file(path: &Path) -> Result<Song> {
    let metadata =
        fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    let modified_millis = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |since| since.as_millis());

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tiebreaker = rand::rng().random_range(0..u32::MAX);

    let mut media = Media::new(path);
    media.duration = probe_duration(path);

    Ok(Song {
        id: song_id(&file_name, modified_millis, tiebreaker),
        name: display_name(&file_name),
        media,
        play_full: false,
    })
}

/// Ids join the file name, its modification time and a random number, so
/// adding the same file twice yields two distinct songs.
pub fn song_id(file_name: &str, modified_millis: u128, tiebreaker: u32) -> SongId {
    SongId(format!("{file_name}-{modified_millis}-{tiebreaker}"))
}

/// File name with its last extension removed.
pub fn display_name(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => stem.to_string(),
        _ => file_name.to_string(),
    }
}

pub fn probe_duration(path: &Path) -> Option<Duration> {
    let tagged_file = Probe::open(path).and_then(|entry| entry.read()).ok()?;
    let duration = tagged_file.properties().duration();
    (!duration.is_zero()).then_some(duration)
}
