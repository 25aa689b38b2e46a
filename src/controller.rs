use crate::audio::Channel;
use crate::crossfade::{CrossfadeEvent, CrossfadeScheduler, TransitionOutcome};
use crate::model::{MixSettings, PlayerState, Song, SongId};
use crate::queue::compute_queue;
use crate::timer::{Clock, TimerId, Timers};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::rc::Rc;
use std::time::Duration;

/// What the front end shows about playback.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub state: PlayerState,
    /// Elapsed share of the current track, 0 to 100.
    pub progress: f32,
    pub song_name: Option<String>,
    pub play_full: Option<bool>,
    pub shuffle: bool,
    pub volume: f32,
}

pub struct PlaybackController<C: Channel> {
    scheduler: CrossfadeScheduler<C>,
    songs: Vec<Song>,
    queue: Vec<SongId>,
    cursor: Option<usize>,
    state: PlayerState,
    shuffle: bool,
    progress: f32,
    snippet: Duration,
    progress_interval: Duration,
    progress_timer: Option<TimerId>,
    timers: Timers,
    clock: Rc<dyn Clock>,
    rng: SmallRng,
    last_error: Option<String>,
}

impl<C: Channel> PlaybackController<C> {
    pub fn new(a: C, b: C, settings: &MixSettings, clock: Rc<dyn Clock>) -> Self {
        Self {
            scheduler: CrossfadeScheduler::new(a, b, settings, Rc::clone(&clock)),
            songs: Vec::new(),
            queue: Vec::new(),
            cursor: None,
            state: PlayerState::Idle,
            shuffle: false,
            progress: 0.0,
            snippet: settings.snippet(),
            progress_interval: settings.progress_interval(),
            progress_timer: None,
            timers: Timers::new(),
            clock,
            rng: SmallRng::from_os_rng(),
            last_error: None,
        }
    }

    /// Replaces the shuffle source, mostly so tests get a fixed order.
    pub fn with_rng(mut self, rng: SmallRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn queue(&self) -> &[SongId] {
        &self.queue
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn volume(&self) -> f32 {
        self.scheduler.target_volume()
    }

    pub fn is_transitioning(&self) -> bool {
        self.scheduler.is_transitioning()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn scheduler(&self) -> &CrossfadeScheduler<C> {
        &self.scheduler
    }

    pub fn current_song_id(&self) -> Option<&SongId> {
        self.queue.get(self.cursor?)
    }

    pub fn current_song(&self) -> Option<&Song> {
        let id = self.current_song_id()?;
        self.songs.iter().find(|song| &song.id == id)
    }

    pub fn queue_position(&self, id: &SongId) -> Option<usize> {
        self.queue.iter().position(|queued| queued == id)
    }

    pub fn now_playing(&self) -> NowPlaying {
        let song = self.current_song();
        NowPlaying {
            state: self.state,
            progress: self.progress,
            song_name: song.map(|song| song.name.clone()),
            play_full: song.map(|song| song.play_full),
            shuffle: self.shuffle,
            volume: self.volume(),
        }
    }

    /// Takes a new song list for the active playlist and recomputes the
    /// queue. If the current song is no longer in the list, playback stops.
    pub fn sync_songs(&mut self, songs: &[Song]) {
        self.songs = songs.to_vec();
        self.rebuild_queue();
    }

    /// Switches to another playlist's songs. Playback stops first.
    pub fn replace_songs(&mut self, songs: &[Song]) {
        self.stop();
        self.sync_songs(songs);
    }

    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.stop();
        self.shuffle = shuffle;
        self.rebuild_queue();
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.scheduler.set_target_volume(volume);
    }

    /// Starts from the top of the queue when idle, otherwise resumes the
    /// active channel where it was paused.
    pub fn play(&mut self) {
        if self.cursor.is_none() {
            if !self.queue.is_empty() {
                self.start_transition(0);
            }
            return;
        }

        if self.state == PlayerState::Playing {
            return;
        }

        match self.scheduler.resume_active() {
            Ok(()) => self.enter_playing(),
            Err(err) => {
                log::error!("failed to resume playback: {err:#}");
                self.last_error = Some(format!("playback error: {err:#}"));
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state != PlayerState::Playing {
            return;
        }
        self.scheduler.pause_active();
        self.cancel_progress_timer();
        self.state = PlayerState::Paused;
    }

    pub fn toggle_play_pause(&mut self) {
        if self.state == PlayerState::Playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Moves to the next queue position, wrapping at the end. Returns false
    /// when nothing started (empty queue or a transition already running).
    pub fn play_next(&mut self) -> bool {
        if self.queue.is_empty() {
            return false;
        }
        let next = self
            .cursor
            .map_or(0, |current| (current + 1) % self.queue.len());
        self.start_transition(next)
    }

    pub fn jump_to(&mut self, position: usize) -> bool {
        if position >= self.queue.len() {
            return false;
        }
        self.start_transition(position)
    }

    pub fn stop(&mut self) {
        self.scheduler.stop();
        self.cancel_progress_timer();
        self.state = PlayerState::Idle;
        self.cursor = None;
        self.progress = 0.0;
    }

    /// Drives fades and end-of-track detection. Call it often; timing comes
    /// from the clock, not from the call rate.
    pub fn tick(&mut self) {
        for event in self.scheduler.tick() {
            if let CrossfadeEvent::StartFailed { error, .. } = event {
                self.last_error = Some(format!("playback error: {error}"));
            }
        }

        let now = self.clock.now();
        let fired = self.timers.fire_due(now);
        if self
            .progress_timer
            .is_some_and(|timer| fired.contains(&timer))
        {
            self.check_progress();
        }
    }

    fn check_progress(&mut self) {
        if self.state != PlayerState::Playing || self.cursor.is_none() {
            return;
        }

        let Some(play_full) = self.current_song().map(|song| song.play_full) else {
            log::warn!("current song vanished from the queue, stopping");
            self.stop();
            return;
        };

        let Some(channel) = self.scheduler.active_channel() else {
            return;
        };
        if channel.is_finished() {
            if !self.scheduler.is_transitioning() {
                log::info!("track ran out, moving on");
                self.play_next();
            }
            return;
        }
        let Some(position) = channel.position() else {
            return;
        };
        let duration = channel.duration().filter(|duration| !duration.is_zero());

        self.progress = duration.map_or(0.0, |duration| {
            (position.as_secs_f32() / duration.as_secs_f32() * 100.0).clamp(0.0, 100.0)
        });

        // A full track of unknown length only ends through `is_finished`.
        let end = match (play_full, duration) {
            (true, Some(duration)) => duration,
            (true, None) => return,
            (false, duration) => {
                let window_end = self.scheduler.start_offset().saturating_add(self.snippet);
                duration.map_or(window_end, |duration| window_end.min(duration))
            }
        };
        let remaining = end.saturating_sub(position);
        if remaining <= self.scheduler.fade() && !self.scheduler.is_transitioning() {
            self.play_next();
        }
    }

    fn start_transition(&mut self, index: usize) -> bool {
        if self.scheduler.is_transitioning() {
            log::debug!("transition to queue position {index} dropped");
            return false;
        }

        let Some(song) = self
            .queue
            .get(index)
            .and_then(|id| self.songs.iter().find(|song| &song.id == id))
            .cloned()
        else {
            return false;
        };

        let was_playing = self.state == PlayerState::Playing;
        match self.scheduler.begin_transition(&song, was_playing) {
            Ok(TransitionOutcome::Dropped) => return false,
            Ok(TransitionOutcome::Started) => self.last_error = None,
            Err(err) => self.last_error = Some(format!("playback error: {err:#}")),
        }

        self.cursor = Some(index);
        self.enter_playing();
        true
    }

    fn enter_playing(&mut self) {
        self.state = PlayerState::Playing;
        if self.progress_timer.is_none() {
            let now = self.clock.now();
            self.progress_timer = Some(self.timers.every(now, self.progress_interval));
        }
    }

    fn cancel_progress_timer(&mut self) {
        if let Some(timer) = self.progress_timer.take() {
            self.timers.cancel(timer);
        }
    }

    fn rebuild_queue(&mut self) {
        let ids: Vec<SongId> = self.songs.iter().map(|song| song.id.clone()).collect();
        let had_current = self.cursor.is_some();
        let (queue, cursor) =
            compute_queue(&ids, self.shuffle, &self.queue, self.cursor, &mut self.rng);
        self.queue = queue;
        self.cursor = cursor;

        if had_current && cursor.is_none() {
            log::info!("current song left the playlist, stopping playback");
            self.stop();
        }
    }
}
