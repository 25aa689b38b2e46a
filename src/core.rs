use crate::audio::Channel;
use crate::controller::PlaybackController;
use crate::library;
use crate::model::{Playlist, PlaylistId, PlaylistRecord, Song, SongId};
use crate::store::{self, KeyValueStore};
use anyhow::Result;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

const VOLUME_STEP: f32 = 0.05;

/// Playlists, the active selection and persistence wrapped around one
/// playback controller.
pub struct MixCore<C: Channel> {
    playlists: Vec<Playlist>,
    active: Option<PlaylistId>,
    pub selected_song: usize,
    pub dirty: bool,
    pub status: String,
    player: PlaybackController<C>,
    store: Box<dyn KeyValueStore>,
}

impl<C: Channel> MixCore<C> {
    pub fn new(mut player: PlaybackController<C>, store: Box<dyn KeyValueStore>) -> Self {
        let default_id = PlaylistId(format!("playlist-{}", unix_millis()));
        let session = store::load_session(&*store, default_id);
        if let Some(volume) = session.volume {
            player.set_volume(volume);
        }
        if session.shuffle {
            player.set_shuffle(true);
        }

        let mut core = Self {
            playlists: session.playlists.into_iter().map(Playlist::from).collect(),
            active: session.active,
            selected_song: 0,
            dirty: true,
            status: String::from("Ready"),
            player,
            store,
        };
        core.sync_player();
        core.persist();
        core
    }

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    pub fn active_id(&self) -> Option<&PlaylistId> {
        self.active.as_ref()
    }

    pub fn active_playlist(&self) -> Option<&Playlist> {
        let id = self.active.as_ref()?;
        self.playlists.iter().find(|playlist| &playlist.id == id)
    }

    pub fn active_songs(&self) -> &[Song] {
        active_songs_in(&self.playlists, self.active.as_ref())
    }

    pub fn selected_song(&self) -> Option<&Song> {
        self.active_songs().get(self.selected_song)
    }

    pub fn player(&self) -> &PlaybackController<C> {
        &self.player
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        &*self.store
    }

    pub fn create_playlist(&mut self, name: &str) -> Option<PlaylistId> {
        let name = name.trim();
        if name.is_empty() {
            self.set_status("Playlist name cannot be empty");
            return None;
        }

        let id = self.next_playlist_id();
        self.playlists.push(Playlist::new(id.clone(), name));
        self.activate(id.clone());
        self.set_status(&format!("Created playlist {name}"));
        Some(id)
    }

    pub fn rename_playlist(&mut self, id: &PlaylistId, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            self.set_status("Playlist name cannot be empty");
            return;
        }
        let Some(playlist) = self.playlists.iter_mut().find(|playlist| &playlist.id == id) else {
            self.set_status("Playlist not found");
            return;
        };
        playlist.name = name.to_string();
        self.persist();
        self.set_status(&format!("Renamed playlist to {name}"));
    }

    pub fn delete_playlist(&mut self, id: &PlaylistId) {
        let Some(index) = self.playlists.iter().position(|playlist| &playlist.id == id) else {
            self.set_status("Playlist not found");
            return;
        };
        let removed = self.playlists.remove(index);

        if self.active.as_ref() == Some(id) {
            self.player.stop();
            self.active = self.playlists.first().map(|playlist| playlist.id.clone());
            self.selected_song = 0;
            self.sync_player();
        }
        self.persist();
        self.set_status(&format!("Deleted playlist {}", removed.name));
    }

    /// Makes `id` the active playlist. Playback stops first.
    pub fn select_playlist(&mut self, id: &PlaylistId) {
        if !self.playlists.iter().any(|playlist| &playlist.id == id) {
            self.set_status("Playlist not found");
            return;
        }
        self.activate(id.clone());
        if let Some(name) = self.active_playlist().map(|playlist| playlist.name.clone()) {
            self.set_status(&format!("Playlist: {name}"));
        }
    }

    pub fn cycle_playlist(&mut self) {
        if self.playlists.is_empty() {
            self.set_status("No playlists");
            return;
        }
        let next = self
            .active
            .as_ref()
            .and_then(|id| self.playlists.iter().position(|playlist| &playlist.id == id))
            .map_or(0, |index| (index + 1) % self.playlists.len());
        let id = self.playlists[next].id.clone();
        self.select_playlist(&id);
    }

    /// Expands files and folders into songs and appends them to the active
    /// playlist.
    pub fn add_paths(&mut self, paths: &[PathBuf]) {
        if self.active.is_none() {
            self.set_status("Create a playlist first");
            return;
        }

        match library::songs_from_paths(paths) {
            Ok(songs) if songs.is_empty() => self.set_status("No audio files found"),
            Ok(songs) => self.append_songs(songs),
            Err(err) => {
                log::warn!("failed to add songs: {err:#}");
                self.set_status(&format!("Failed to add songs: {err:#}"));
            }
        }
    }

    pub fn append_songs(&mut self, songs: Vec<Song>) {
        let count = songs.len();
        let Some(playlist) = self.active_playlist_mut() else {
            self.set_status("Create a playlist first");
            return;
        };
        playlist.songs.extend(songs);
        self.sync_player();
        self.set_status(&format!("Added {count} songs"));
    }

    pub fn remove_song(&mut self, id: &SongId) {
        if self.player.current_song_id() == Some(id) {
            self.player.stop();
        }

        let Some(playlist) = self.active_playlist_mut() else {
            return;
        };
        let Some(index) = playlist.position(id) else {
            return;
        };
        let removed = playlist.songs.remove(index);
        let remaining = playlist.songs.len();

        self.selected_song = self.selected_song.min(remaining.saturating_sub(1));
        self.sync_player();
        self.set_status(&format!("Removed {}", removed.name));
    }

    pub fn toggle_play_full(&mut self, id: &SongId) {
        let Some(song) = self
            .active_playlist_mut()
            .and_then(|playlist| playlist.songs.iter_mut().find(|song| &song.id == id))
        else {
            return;
        };
        song.play_full = !song.play_full;
        let message = if song.play_full {
            format!("{} plays in full", song.name)
        } else {
            format!("{} plays as a snippet", song.name)
        };
        self.sync_player();
        self.set_status(&message);
    }

    /// Moves `dragged` to the index `target` held before the move.
    pub fn move_song(&mut self, dragged: &SongId, target: &SongId) {
        if dragged == target {
            return;
        }
        let Some(playlist) = self.active_playlist_mut() else {
            return;
        };
        let (Some(from), Some(to)) = (playlist.position(dragged), playlist.position(target)) else {
            return;
        };

        let song = playlist.songs.remove(from);
        playlist.songs.insert(to, song);
        self.selected_song = to;
        self.sync_player();
    }

    pub fn move_selected(&mut self, down: bool) {
        let songs = self.active_songs();
        let target = if down {
            self.selected_song + 1
        } else {
            match self.selected_song.checked_sub(1) {
                Some(index) => index,
                None => return,
            }
        };
        let (Some(dragged), Some(target)) = (songs.get(self.selected_song), songs.get(target))
        else {
            return;
        };
        let (dragged, target) = (dragged.id.clone(), target.id.clone());
        self.move_song(&dragged, &target);
    }

    /// Flips shuffle. Playback stops and the queue is drawn again.
    pub fn toggle_shuffle(&mut self) {
        let shuffle = !self.player.shuffle();
        self.player.set_shuffle(shuffle);
        self.persist();
        self.set_status(if shuffle { "Shuffle on" } else { "Shuffle off" });
    }

    pub fn play_song(&mut self, id: &SongId) {
        let Some(position) = self.player.queue_position(id) else {
            return;
        };
        self.player.jump_to(position);
        self.report_player_error();
        self.dirty = true;
    }

    pub fn play_selected(&mut self) {
        let Some(id) = self.selected_song().map(|song| song.id.clone()) else {
            self.set_status("No song selected");
            return;
        };
        self.play_song(&id);
    }

    pub fn toggle_play_pause(&mut self) {
        if self.player.queue().is_empty() {
            self.set_status("Playlist is empty");
            return;
        }
        self.player.toggle_play_pause();
        self.report_player_error();
        self.dirty = true;
    }

    pub fn play_next(&mut self) {
        self.player.play_next();
        self.report_player_error();
        self.dirty = true;
    }

    pub fn stop(&mut self) {
        self.player.stop();
        self.set_status("Stopped");
    }

    pub fn adjust_volume(&mut self, delta: f32) {
        let volume = (self.player.volume() + delta).clamp(0.0, 1.0);
        self.set_volume(volume);
    }

    pub fn volume_up(&mut self) {
        self.adjust_volume(VOLUME_STEP);
    }

    pub fn volume_down(&mut self) {
        self.adjust_volume(-VOLUME_STEP);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.player.set_volume(volume);
        let volume = self.player.volume();
        if let Err(err) = store::save_volume(&mut *self.store, volume) {
            log::error!("failed to save volume: {err:#}");
        }
        self.set_status(&format!("Volume {:.0}%", volume * 100.0));
    }

    pub fn select_next_song(&mut self) {
        let len = self.active_songs().len();
        if len == 0 {
            return;
        }
        self.selected_song = (self.selected_song + 1).min(len - 1);
        self.dirty = true;
    }

    pub fn select_prev_song(&mut self) {
        self.selected_song = self.selected_song.saturating_sub(1);
        self.dirty = true;
    }

    pub fn tick(&mut self) {
        let before = self.player.now_playing();
        self.player.tick();
        if self.player.now_playing() != before {
            self.dirty = true;
        }
        self.report_player_error();
    }

    fn report_player_error(&mut self) {
        let Some(error) = self.player.last_error() else {
            return;
        };
        if self.status != error {
            let message = error.to_string();
            self.set_status(&message);
        }
    }

    fn activate(&mut self, id: PlaylistId) {
        self.player.stop();
        self.active = Some(id);
        self.selected_song = 0;
        self.sync_player();
        self.persist();
    }

    fn active_playlist_mut(&mut self) -> Option<&mut Playlist> {
        let id = self.active.as_ref()?;
        self.playlists.iter_mut().find(|playlist| &playlist.id == id)
    }

    fn sync_player(&mut self) {
        let songs = active_songs_in(&self.playlists, self.active.as_ref());
        self.player.sync_songs(songs);
        self.dirty = true;
    }

    fn next_playlist_id(&self) -> PlaylistId {
        let base = format!("playlist-{}", unix_millis());
        let taken = |candidate: &str| {
            self.playlists
                .iter()
                .any(|playlist| playlist.id.as_str() == candidate)
        };
        if !taken(&base) {
            return PlaylistId(base);
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{base}-{suffix}");
            if !taken(&candidate) {
                return PlaylistId(candidate);
            }
            suffix += 1;
        }
    }

    fn persist(&mut self) {
        if let Err(err) = self.write_state() {
            log::error!("failed to save state: {err:#}");
            self.set_status(&format!("Failed to save state: {err:#}"));
        }
    }

    fn write_state(&mut self) -> Result<()> {
        let records: Vec<PlaylistRecord> = self.playlists.iter().map(PlaylistRecord::from).collect();
        store::save_playlists(&mut *self.store, &records)?;
        store::save_active(&mut *self.store, self.active.as_ref())?;
        store::save_shuffle(&mut *self.store, self.player.shuffle())?;
        Ok(())
    }

    fn set_status(&mut self, message: &str) {
        self.status = message.to_string();
        self.dirty = true;
    }
}

fn active_songs_in<'a>(playlists: &'a [Playlist], active: Option<&PlaylistId>) -> &'a [Song] {
    active
        .and_then(|id| playlists.iter().find(|playlist| &playlist.id == id))
        .map(|playlist| playlist.songs.as_slice())
        .unwrap_or(&[])
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |since| since.as_millis())
}
