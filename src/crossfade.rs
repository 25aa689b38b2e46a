//! Two-channel crossfade scheduling.
//!
//! Exactly two channels exist. One of them is active (the one the playback
//! cursor is listening to) and the other is idle until the next transition
//! picks it. Each transition loads the next song into the idle channel, waits
//! for it to become ready, then ramps it up while the old channel ramps down.

use crate::audio::Channel;
use crate::model::{MixSettings, Song};
use crate::timer::{Clock, TimerId, Timers};
use anyhow::Result;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing audible; may still hold a rewound source for reuse.
    Silent,
    /// Media assigned, waiting for the channel to report ready.
    Loading,
    FadingIn,
    Audible,
    FadingOut,
    /// Paused by the user, or left paused by a failed start.
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampDirection {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrossfadeEvent {
    /// The incoming channel started playing and its fade-in began.
    Started { slot: Slot },
    StartFailed { slot: Slot, error: String },
    RampFinished {
        slot: Slot,
        direction: RampDirection,
        steps: u32,
    },
    /// Both ramps are done and the guard is released.
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Started,
    /// Another transition was in flight; nothing changed.
    Dropped,
}

#[derive(Debug)]
struct Ramp {
    direction: RampDirection,
    from: f32,
    to: f32,
    steps: u32,
    taken: u32,
    timer: TimerId,
}

impl Ramp {
    fn volume_at(&self, taken: u32) -> f32 {
        if taken >= self.steps {
            return self.to;
        }
        let step = (self.to - self.from) / self.steps as f32;
        self.from + step * taken as f32
    }
}

pub struct CrossfadeScheduler<C: Channel> {
    channels: [C; 2],
    states: [SlotState; 2],
    ramps: [Option<Ramp>; 2],
    active: Option<Slot>,
    pending: Option<Slot>,
    /// The user paused while the incoming channel was still loading.
    held: bool,
    in_flight: bool,
    target_volume: f32,
    fade: Duration,
    ramp_interval: Duration,
    ramp_steps: u32,
    start_offset: Duration,
    timers: Timers,
    clock: Rc<dyn Clock>,
    events: Vec<CrossfadeEvent>,
}

impl<C: Channel> CrossfadeScheduler<C> {
    pub fn new(a: C, b: C, settings: &MixSettings, clock: Rc<dyn Clock>) -> Self {
        let target_volume = settings.default_volume.clamp(0.0, 1.0);
        let mut channels = [a, b];
        for channel in &mut channels {
            channel.set_volume(target_volume);
        }

        Self {
            channels,
            states: [SlotState::Silent; 2],
            ramps: [None, None],
            active: None,
            pending: None,
            held: false,
            in_flight: false,
            target_volume,
            fade: settings.fade(),
            ramp_interval: settings.ramp_interval(),
            ramp_steps: settings.ramp_steps(),
            start_offset: settings.start_offset(),
            timers: Timers::new(),
            clock,
            events: Vec::new(),
        }
    }

    pub fn active(&self) -> Option<Slot> {
        self.active
    }

    pub fn is_transitioning(&self) -> bool {
        self.in_flight
    }

    pub fn target_volume(&self) -> f32 {
        self.target_volume
    }

    pub fn fade(&self) -> Duration {
        self.fade
    }

    pub fn start_offset(&self) -> Duration {
        self.start_offset
    }

    pub fn slot_state(&self, slot: Slot) -> SlotState {
        self.states[slot.index()]
    }

    pub fn channel(&self, slot: Slot) -> &C {
        &self.channels[slot.index()]
    }

    pub fn active_channel(&self) -> Option<&C> {
        self.active.map(|slot| self.channel(slot))
    }

    /// Number of ramp timers still scheduled.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Starts moving playback to `song` on the idle channel.
    ///
    /// The currently active channel fades out only when `was_playing` is
    /// set and it is actually audible; otherwise it is retired at once. An
    /// `Err` means the song could not be loaded: the new active channel is
    /// left empty and the guard is released.
    pub fn begin_transition(
        &mut self,
        song: &Song,
        was_playing: bool,
    ) -> Result<TransitionOutcome> {
        if self.in_flight {
            log::debug!("transition to {} dropped, another is in flight", song.id);
            return Ok(TransitionOutcome::Dropped);
        }

        let now = self.clock.now();
        let target = self.active.map_or(Slot::A, Slot::other);
        self.retire(target);

        if let Some(outgoing) = self.active {
            let channel = &self.channels[outgoing.index()];
            if was_playing && channel.has_source() && !channel.is_paused() {
                self.start_ramp(outgoing, RampDirection::Out, now);
            } else {
                self.retire(outgoing);
            }
        }

        self.in_flight = true;
        self.held = false;
        self.active = Some(target);
        log::info!("crossfading into {} on channel {target:?}", song.name);

        let start_offset = self.start_offset;
        let channel = &mut self.channels[target.index()];
        channel.set_volume(0.0);
        if let Err(err) = channel
            .load(&song.media)
            .and_then(|()| channel.seek(start_offset))
        {
            channel.clear();
            channel.set_volume(self.target_volume);
            self.states[target.index()] = SlotState::Silent;
            self.in_flight = false;
            log::error!("failed to load {}: {err:#}", song.media.path.display());
            return Err(err);
        }

        self.states[target.index()] = SlotState::Loading;
        self.pending = Some(target);
        self.poll_pending(now);
        Ok(TransitionOutcome::Started)
    }

    /// Advances ramps and starts a loaded channel once it is ready. Returns
    /// everything that happened since the previous call.
    pub fn tick(&mut self) -> Vec<CrossfadeEvent> {
        let now = self.clock.now();

        self.poll_pending(now);
        for timer in self.timers.fire_due(now) {
            let Some(slot) = self.slot_for_timer(timer) else {
                continue;
            };
            self.step_ramp(slot);
        }
        self.settle();

        std::mem::take(&mut self.events)
    }

    /// Pauses the active channel. A channel still fading out is retired on
    /// the spot, and a channel still loading stays paused once it is ready.
    pub fn pause_active(&mut self) {
        let Some(slot) = self.active else {
            return;
        };
        let outgoing = slot.other();
        if self.states[outgoing.index()] == SlotState::FadingOut {
            self.retire(outgoing);
        }

        if self.pending == Some(slot) {
            self.held = true;
            return;
        }
        self.channels[slot.index()].pause();
        if self.states[slot.index()] == SlotState::Audible {
            self.states[slot.index()] = SlotState::Paused;
        }
    }

    pub fn resume_active(&mut self) -> Result<()> {
        let Some(slot) = self.active else {
            return Ok(());
        };
        self.held = false;
        if self.pending == Some(slot) {
            return Ok(());
        }
        let channel = &mut self.channels[slot.index()];
        if !channel.has_source() {
            return Ok(());
        }
        channel.play()?;
        if self.states[slot.index()] == SlotState::Paused {
            self.states[slot.index()] = SlotState::Audible;
        }
        Ok(())
    }

    /// Cancels every ramp and leaves both channels empty and silent.
    pub fn stop(&mut self) {
        self.timers.cancel_all();
        self.ramps = [None, None];
        self.pending = None;
        self.held = false;
        self.in_flight = false;
        self.active = None;
        for (channel, state) in self.channels.iter_mut().zip(self.states.iter_mut()) {
            channel.pause();
            channel.clear();
            channel.set_volume(self.target_volume);
            *state = SlotState::Silent;
        }
    }

    /// New resting volume. Running ramps keep the endpoints they were
    /// started with.
    pub fn set_target_volume(&mut self, volume: f32) {
        self.target_volume = volume.clamp(0.0, 1.0);
        for slot in [Slot::A, Slot::B] {
            if self.ramps[slot.index()].is_some() || self.pending == Some(slot) {
                continue;
            }
            self.channels[slot.index()].set_volume(self.target_volume);
        }
    }

    fn slot_for_timer(&self, timer: TimerId) -> Option<Slot> {
        [Slot::A, Slot::B].into_iter().find(|slot| {
            self.ramps[slot.index()]
                .as_ref()
                .is_some_and(|ramp| ramp.timer == timer)
        })
    }

    fn poll_pending(&mut self, now: Duration) {
        let Some(slot) = self.pending else {
            return;
        };
        let channel = &mut self.channels[slot.index()];
        if !channel.is_ready() {
            return;
        }
        self.pending = None;

        if self.held {
            channel.set_volume(self.target_volume);
            self.states[slot.index()] = SlotState::Paused;
            self.held = false;
            log::debug!("channel {slot:?} ready while paused, holding it");
            return;
        }

        channel.set_volume(0.0);
        let started = channel.play();
        match started {
            Ok(()) => {
                self.start_ramp(slot, RampDirection::In, now);
                self.events.push(CrossfadeEvent::Started { slot });
                if self.ramps[slot.index()].is_none() {
                    self.events.push(CrossfadeEvent::RampFinished {
                        slot,
                        direction: RampDirection::In,
                        steps: 0,
                    });
                }
            }
            Err(err) => {
                self.channels[slot.index()].pause();
                self.states[slot.index()] = SlotState::Paused;
                self.in_flight = false;
                log::error!("playback error on channel {slot:?}: {err:#}");
                self.events.push(CrossfadeEvent::StartFailed {
                    slot,
                    error: format!("{err:#}"),
                });
            }
        }
    }

    fn start_ramp(&mut self, slot: Slot, direction: RampDirection, now: Duration) {
        self.cancel_ramp(slot);

        let (from, to) = match direction {
            RampDirection::In => (0.0, self.target_volume),
            RampDirection::Out => (self.channels[slot.index()].volume(), 0.0),
        };

        if self.ramp_steps == 0 {
            self.channels[slot.index()].set_volume(to);
            self.finish_ramp(slot, direction);
            return;
        }

        let timer = self.timers.every(now, self.ramp_interval);
        self.ramps[slot.index()] = Some(Ramp {
            direction,
            from,
            to,
            steps: self.ramp_steps,
            taken: 0,
            timer,
        });
        self.channels[slot.index()].set_volume(from);
        self.states[slot.index()] = match direction {
            RampDirection::In => SlotState::FadingIn,
            RampDirection::Out => SlotState::FadingOut,
        };
    }

    fn step_ramp(&mut self, slot: Slot) {
        let Some(ramp) = self.ramps[slot.index()].as_mut() else {
            return;
        };
        ramp.taken += 1;
        let volume = ramp.volume_at(ramp.taken);
        self.channels[slot.index()].set_volume(volume);

        if ramp.taken < ramp.steps {
            return;
        }

        let direction = ramp.direction;
        let steps = ramp.taken;
        self.cancel_ramp(slot);
        self.finish_ramp(slot, direction);
        self.events.push(CrossfadeEvent::RampFinished {
            slot,
            direction,
            steps,
        });
    }

    fn finish_ramp(&mut self, slot: Slot, direction: RampDirection) {
        match direction {
            RampDirection::In => {
                let channel = &mut self.channels[slot.index()];
                channel.set_volume(self.target_volume);
                self.states[slot.index()] = if channel.is_paused() {
                    SlotState::Paused
                } else {
                    SlotState::Audible
                };
            }
            RampDirection::Out => {
                let channel = &mut self.channels[slot.index()];
                channel.pause();
                channel.rewind();
                channel.set_volume(self.target_volume);
                self.states[slot.index()] = SlotState::Silent;
            }
        }
    }

    fn cancel_ramp(&mut self, slot: Slot) {
        if let Some(ramp) = self.ramps[slot.index()].take() {
            self.timers.cancel(ramp.timer);
        }
    }

    /// Silences `slot` immediately so it can take new media.
    fn retire(&mut self, slot: Slot) {
        self.cancel_ramp(slot);
        if self.pending == Some(slot) {
            self.pending = None;
        }
        let channel = &mut self.channels[slot.index()];
        channel.pause();
        channel.rewind();
        channel.set_volume(self.target_volume);
        self.states[slot.index()] = SlotState::Silent;
    }

    fn settle(&mut self) {
        if self.in_flight && self.pending.is_none() && self.ramps.iter().all(Option::is_none) {
            self.in_flight = false;
            self.events.push(CrossfadeEvent::Settled);
        }
    }
}
