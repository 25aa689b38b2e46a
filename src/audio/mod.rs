use crate::model::Media;
use crate::timer::Clock;
use anyhow::{Context, Result};
use rodio::Source;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
#[cfg(unix)]
use std::ffi::CString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

/// One audio output slot. The crossfade scheduler owns two of these and is
/// the only thing that drives them.
pub trait Channel {
    /// Replaces whatever the channel held with `media`, paused.
    fn load(&mut self, media: &Media) -> Result<()>;
    fn seek(&mut self, position: Duration) -> Result<()>;
    /// True once the loaded media can start playing.
    fn is_ready(&self) -> bool;
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    /// Back to the start of the loaded media, keeping it loaded.
    fn rewind(&mut self);
    /// Drops the loaded media.
    fn clear(&mut self);
    fn has_source(&self) -> bool;
    fn is_paused(&self) -> bool;
    /// True when the loaded media ran out while playing.
    fn is_finished(&self) -> bool;
    fn position(&self) -> Option<Duration>;
    fn duration(&self) -> Option<Duration>;
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);
}

/// A channel backed by a rodio sink on a shared output stream.
pub struct RodioChannel {
    stream: Rc<OutputStream>,
    sink: Sink,
    media: Option<PathBuf>,
    track_duration: Option<Duration>,
    volume: f32,
}

impl RodioChannel {
    pub fn new(stream: Rc<OutputStream>) -> Self {
        let sink = Sink::connect_new(stream.mixer());
        sink.pause();
        Self {
            stream,
            sink,
            media: None,
            track_duration: None,
            volume: 1.0,
        }
    }

    /// Opens `output` (or the system default) and returns both channels on
    /// it.
    pub fn pair(output: Option<&str>) -> Result<(Self, Self)> {
        let stream = Rc::new(open_output_stream(output)?);
        Ok((Self::new(Rc::clone(&stream)), Self::new(stream)))
    }
}

impl Channel for RodioChannel {
    fn load(&mut self, media: &Media) -> Result<()> {
        self.clear();

        let file = File::open(&media.path)
            .with_context(|| format!("failed to open track {}", media.path.display()))?;
        let source = Decoder::try_from(file)
            .with_context(|| format!("failed to decode {}", media.path.display()))?;
        self.track_duration = source
            .total_duration()
            .or(media.duration)
            .filter(|duration| !duration.is_zero());

        self.sink = Sink::connect_new(self.stream.mixer());
        self.sink.pause();
        self.sink.set_volume(self.volume);
        self.sink.append(source);
        self.media = Some(media.path.clone());
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        if self.media.is_none() {
            return Err(anyhow::anyhow!("no track loaded"));
        }
        let target = self
            .track_duration
            .map_or(position, |duration| position.min(duration));
        self.sink
            .try_seek(target)
            .map_err(|err| anyhow::anyhow!("failed to seek track: {err:?}"))
    }

    fn is_ready(&self) -> bool {
        self.media.is_some() && !self.sink.empty()
    }

    fn play(&mut self) -> Result<()> {
        let Some(path) = &self.media else {
            return Err(anyhow::anyhow!("no track loaded"));
        };
        if self.sink.empty() {
            return Err(anyhow::anyhow!(
                "track {} has nothing left to play",
                path.display()
            ));
        }
        self.sink.play();
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn rewind(&mut self) {
        let Some(path) = &self.media else {
            return;
        };
        if let Err(err) = self.sink.try_seek(Duration::ZERO) {
            log::warn!("failed to rewind {}: {err:?}", path.display());
        }
    }

    fn clear(&mut self) {
        self.sink.stop();
        self.media = None;
        self.track_duration = None;
    }

    fn has_source(&self) -> bool {
        self.media.is_some()
    }

    fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    fn is_finished(&self) -> bool {
        self.media.is_some() && !self.sink.is_paused() && self.sink.empty()
    }

    fn position(&self) -> Option<Duration> {
        self.media.as_ref()?;
        Some(self.sink.get_pos())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.sink.set_volume(self.volume);
    }
}

pub fn output_device_names() -> Vec<String> {
    let mut outputs: Vec<String> = with_silenced_stderr(|| {
        rodio::cpal::default_host()
            .output_devices()
            .ok()
            .into_iter()
            .flatten()
            .filter_map(|device| device.name().ok())
            .collect()
    });
    outputs.sort_by_cached_key(|name| name.to_ascii_lowercase());
    outputs.dedup();
    outputs
}

pub fn open_output_stream(output: Option<&str>) -> Result<OutputStream> {
    let mut stream = with_silenced_stderr(|| {
        let host = rodio::cpal::default_host();
        if let Some(requested) = output {
            let device = host
                .output_devices()
                .context("failed to enumerate output devices")?
                .find(|candidate| candidate.name().ok().as_deref() == Some(requested))
                .with_context(|| format!("audio output device not found: {requested}"))?;
            return OutputStreamBuilder::from_device(device)
                .context("failed to open selected output device")?
                .with_error_callback(|_| {})
                .open_stream_or_fallback()
                .context("failed to start selected output stream");
        }

        let default_err = match OutputStreamBuilder::from_default_device()
            .context("failed to open default system output stream")
            .and_then(|builder| {
                builder
                    .with_error_callback(|_| {})
                    .open_stream_or_fallback()
                    .context("failed to start default output stream")
            }) {
            Ok(stream) => return Ok(stream),
            Err(err) => err,
        };

        let mut candidates: Vec<String> = host
            .output_devices()
            .ok()
            .into_iter()
            .flatten()
            .filter_map(|device| device.name().ok())
            .collect();
        candidates.sort_by_cached_key(|name| {
            let lower = name.to_ascii_lowercase();
            let rank = if lower.contains("pulse") {
                0_u8
            } else if lower.contains("pipewire") {
                1_u8
            } else if lower.contains("default") {
                2_u8
            } else {
                3_u8
            };
            (rank, lower)
        });
        candidates.dedup();

        for candidate in candidates {
            let Some(device) = host
                .output_devices()
                .ok()
                .into_iter()
                .flatten()
                .find(|entry| entry.name().ok().as_deref() == Some(candidate.as_str()))
            else {
                continue;
            };
            let opened = OutputStreamBuilder::from_device(device)
                .context("failed to open fallback output device")
                .and_then(|builder| {
                    builder
                        .with_error_callback(|_| {})
                        .open_stream_or_fallback()
                        .context("failed to start fallback output stream")
                });
            if let Ok(stream) = opened {
                log::info!("default output failed, using {candidate}");
                return Ok(stream);
            }
        }

        Err(anyhow::anyhow!(
            "unable to start any audio output stream after default failed: {default_err:#}"
        ))
    })?;
    stream.log_on_drop(false);
    Ok(stream)
}

#[cfg(unix)]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved < 0 {
        return operation();
    }

    let devnull = CString::new("/dev/null")
        .ok()
        .map(|path| unsafe { libc::open(path.as_ptr(), libc::O_WRONLY) })
        .unwrap_or(-1);

    if devnull >= 0 {
        unsafe {
            libc::dup2(devnull, libc::STDERR_FILENO);
            libc::close(devnull);
        }
    }

    let result = operation();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }

    result
}

#[cfg(not(unix))]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}

/// A silent channel that keeps a logical playhead on a [`Clock`]. Used when
/// no output device can be opened, and by the tests.
pub struct NullChannel {
    clock: Rc<dyn Clock>,
    media: Option<PathBuf>,
    track_duration: Option<Duration>,
    paused: bool,
    started_at: Option<Duration>,
    position_offset: Duration,
    loaded_at: Duration,
    load_latency: Duration,
    volume: f32,
    rejected: Vec<PathBuf>,
}

impl NullChannel {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            media: None,
            track_duration: None,
            paused: true,
            started_at: None,
            position_offset: Duration::ZERO,
            loaded_at: Duration::ZERO,
            load_latency: Duration::ZERO,
            volume: 1.0,
            rejected: Vec::new(),
        }
    }

    /// Media takes `latency` after `load` before it reports ready.
    pub fn with_load_latency(mut self, latency: Duration) -> Self {
        self.load_latency = latency;
        self
    }

    /// `play` fails for this path, as an undecodable file would.
    pub fn rejecting(mut self, path: impl Into<PathBuf>) -> Self {
        self.rejected.push(path.into());
        self
    }

    fn estimate_duration(path: &Path) -> Option<Duration> {
        let file = File::open(path).ok()?;
        let source = Decoder::try_from(file).ok()?;
        source
            .total_duration()
            .filter(|duration| !duration.is_zero())
    }

    fn current_position(&self) -> Duration {
        let mut position = self.position_offset;
        if !self.paused
            && let Some(started_at) = self.started_at
        {
            position = position.saturating_add(self.clock.now().saturating_sub(started_at));
        }
        if let Some(duration) = self.track_duration {
            return position.min(duration);
        }
        position
    }
}

impl Channel for NullChannel {
    fn load(&mut self, media: &Media) -> Result<()> {
        self.clear();
        self.track_duration = media
            .duration
            .filter(|duration| !duration.is_zero())
            .or_else(|| Self::estimate_duration(&media.path));
        self.media = Some(media.path.clone());
        self.loaded_at = self.clock.now();
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        if self.media.is_none() {
            return Err(anyhow::anyhow!("no track loaded"));
        }

        self.position_offset = self
            .track_duration
            .map_or(position, |duration| position.min(duration));
        self.started_at = if self.paused {
            None
        } else {
            Some(self.clock.now())
        };
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.media.is_some() && self.clock.now() >= self.loaded_at.saturating_add(self.load_latency)
    }

    fn play(&mut self) -> Result<()> {
        let Some(path) = &self.media else {
            return Err(anyhow::anyhow!("no track loaded"));
        };
        if self.rejected.iter().any(|rejected| rejected == path) {
            return Err(anyhow::anyhow!("unsupported format: {}", path.display()));
        }
        if self.paused {
            self.started_at = Some(self.clock.now());
            self.paused = false;
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.position_offset = self.current_position();
        self.started_at = None;
        self.paused = true;
    }

    fn rewind(&mut self) {
        self.position_offset = Duration::ZERO;
        self.started_at = (!self.paused).then(|| self.clock.now());
    }

    fn clear(&mut self) {
        self.media = None;
        self.track_duration = None;
        self.paused = true;
        self.started_at = None;
        self.position_offset = Duration::ZERO;
    }

    fn has_source(&self) -> bool {
        self.media.is_some()
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    /// Media with no known length never runs out.
    fn is_finished(&self) -> bool {
        self.media.is_some()
            && !self.paused
            && self
                .track_duration
                .is_some_and(|duration| self.current_position() >= duration)
    }

    fn position(&self) -> Option<Duration> {
        self.media.as_ref()?;
        Some(self.current_position())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::{Channel, NullChannel};
    use crate::model::Media;
    use crate::timer::ManualClock;
    use std::fs;
    use std::path::Path;
    use std::rc::Rc;
    use std::time::Duration;

    fn write_test_wav(path: &Path, duration_ms: u32) {
        let sample_rate: u32 = 44_100;
        let channels: u16 = 1;
        let bits_per_sample: u16 = 16;
        let bytes_per_sample = u32::from(bits_per_sample / 8);
        let total_samples = (u64::from(sample_rate) * u64::from(duration_ms) / 1_000) as u32;
        let data_size = total_samples * u32::from(channels) * bytes_per_sample;
        let byte_rate = sample_rate * u32::from(channels) * bytes_per_sample;
        let block_align = channels * (bits_per_sample / 8);
        let riff_chunk_size = 36_u32.saturating_add(data_size);

        let mut bytes = Vec::with_capacity((44_u32 + data_size) as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&riff_chunk_size.to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16_u32.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&bits_per_sample.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_size.to_le_bytes());
        bytes.resize((44_u32 + data_size) as usize, 0_u8);

        fs::write(path, bytes).expect("wav fixture should be written");
    }

    fn channel(clock: &ManualClock) -> NullChannel {
        NullChannel::new(Rc::new(clock.clone()))
    }

    #[test]
    fn null_channel_position_follows_clock_while_playing() {
        let clock = ManualClock::new();
        let mut channel = channel(&clock);
        channel
            .load(&Media::new("a.mp3").with_duration(Duration::from_secs(60)))
            .expect("load");
        channel.seek(Duration::from_secs(20)).expect("seek");
        channel.play().expect("play");

        clock.advance(Duration::from_secs(3));
        assert_eq!(channel.position(), Some(Duration::from_secs(23)));
    }

    #[test]
    fn null_channel_pause_freezes_position() {
        let clock = ManualClock::new();
        let mut channel = channel(&clock);
        channel.load(&Media::new("a.mp3")).expect("load");
        channel.play().expect("play");
        clock.advance(Duration::from_secs(2));

        channel.pause();
        clock.advance(Duration::from_secs(5));
        assert_eq!(channel.position(), Some(Duration::from_secs(2)));

        channel.play().expect("resume");
        clock.advance(Duration::from_secs(1));
        assert_eq!(channel.position(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn null_channel_seek_is_clamped_to_duration() {
        let clock = ManualClock::new();
        let mut channel = channel(&clock);
        channel
            .load(&Media::new("short.mp3").with_duration(Duration::from_secs(10)))
            .expect("load");
        channel.seek(Duration::from_secs(20)).expect("seek");
        assert_eq!(channel.position(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn null_channel_waits_out_load_latency() {
        let clock = ManualClock::new();
        let mut channel = channel(&clock).with_load_latency(Duration::from_millis(300));
        channel.load(&Media::new("a.mp3")).expect("load");
        assert!(!channel.is_ready());
        clock.advance(Duration::from_millis(300));
        assert!(channel.is_ready());
    }

    #[test]
    fn null_channel_rejects_configured_media() {
        let clock = ManualClock::new();
        let mut channel = channel(&clock).rejecting("broken.xyz");
        channel.load(&Media::new("broken.xyz")).expect("load");
        let err = channel.play().expect_err("play should fail");
        assert!(err.to_string().contains("unsupported format"));
        assert!(channel.is_paused());
    }

    #[test]
    fn null_channel_probes_duration_from_wav() {
        let dir = tempfile::tempdir().expect("tempdir");
        let track = dir.path().join("fixture.wav");
        write_test_wav(&track, 500);

        let clock = ManualClock::new();
        let mut channel = channel(&clock);
        channel.load(&Media::new(&track)).expect("load");
        let duration = channel.duration().expect("duration should be detected");
        assert!(duration >= Duration::from_millis(450));
    }

    #[test]
    fn null_channel_clear_drops_media() {
        let clock = ManualClock::new();
        let mut channel = channel(&clock);
        channel.load(&Media::new("a.mp3")).expect("load");
        channel.set_volume(3.0);
        assert_eq!(channel.volume(), 1.0);
        channel.clear();
        assert!(!channel.has_source());
        assert_eq!(channel.position(), None);
    }

    #[test]
    fn null_channel_finishes_only_when_playing_past_known_length() {
        let clock = ManualClock::new();
        let mut channel = channel(&clock);
        channel
            .load(&Media::new("a.mp3").with_duration(Duration::from_secs(3)))
            .expect("load");
        channel.play().expect("play");
        clock.advance(Duration::from_secs(2));
        assert!(!channel.is_finished());
        clock.advance(Duration::from_secs(1));
        assert!(channel.is_finished());

        channel.pause();
        assert!(!channel.is_finished());

        channel.load(&Media::new("unknown-length.mp3")).expect("load");
        channel.play().expect("play");
        clock.advance(Duration::from_secs(600));
        assert!(!channel.is_finished());
    }
}
