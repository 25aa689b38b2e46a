use mixdj::audio::{Channel, NullChannel};
use mixdj::controller::PlaybackController;
use mixdj::crossfade::Slot;
use mixdj::model::{Media, MixSettings, PlayerState, Song, SongId};
use mixdj::timer::{Clock, ManualClock};
use std::rc::Rc;
use std::time::Duration;

fn song(name: &str, seconds: u64, play_full: bool) -> Song {
    Song {
        id: SongId::from(name),
        name: name.to_string(),
        media: Media::new(format!("{name}.mp3")).with_duration(Duration::from_secs(seconds)),
        play_full,
    }
}

fn player(clock: &ManualClock, settings: &MixSettings) -> PlaybackController<NullChannel> {
    let shared: Rc<dyn Clock> = Rc::new(clock.clone());
    PlaybackController::new(
        NullChannel::new(Rc::clone(&shared)),
        NullChannel::new(Rc::clone(&shared)),
        settings,
        shared,
    )
}

fn step(player: &mut PlaybackController<NullChannel>, clock: &ManualClock, millis: u64) {
    clock.advance(Duration::from_millis(millis));
    player.tick();
}

#[test]
fn automatic_crossfade_overlaps_channels_for_the_fade() {
    let clock = ManualClock::new();
    let mut player = player(&clock, &MixSettings::default());
    player.sync_songs(&[song("a", 200, false), song("b", 200, false)]);
    player.play();

    while player.cursor() == Some(0) {
        step(&mut player, &clock, 50);
    }
    assert_eq!(player.scheduler().active(), Some(Slot::B));

    step(&mut player, &clock, 2_500);
    let outgoing = player.scheduler().channel(Slot::A);
    let incoming = player.scheduler().channel(Slot::B);
    assert!(!outgoing.is_paused());
    assert!(!incoming.is_paused());
    assert!(outgoing.volume() > 0.0 && outgoing.volume() < 0.8);
    assert!(incoming.volume() > 0.0 && incoming.volume() < 0.8);

    for _ in 0..60 {
        step(&mut player, &clock, 50);
    }
    let outgoing = player.scheduler().channel(Slot::A);
    assert!(outgoing.is_paused());
    assert_eq!(outgoing.position(), Some(Duration::ZERO));
    assert!(!player.is_transitioning());
}

#[test]
fn custom_fade_settings_change_trigger_point() {
    let clock = ManualClock::new();
    let settings = MixSettings {
        fade_seconds: 2,
        snippet_seconds: 10,
        start_offset_seconds: 0,
        ..MixSettings::default()
    };
    let mut player = player(&clock, &settings);
    player.sync_songs(&[song("a", 100, false), song("b", 100, false)]);
    player.play();

    while player.cursor() == Some(0) {
        step(&mut player, &clock, 250);
        assert!(clock.now() <= Duration::from_secs(8));
    }
    assert_eq!(clock.now(), Duration::from_secs(8));
}

#[test]
fn stop_mid_fade_leaves_both_channels_silent() {
    let clock = ManualClock::new();
    let mut player = player(&clock, &MixSettings::default());
    player.sync_songs(&[song("a", 200, false), song("b", 200, false)]);
    player.play();
    step(&mut player, &clock, 6_000);
    player.play_next();
    step(&mut player, &clock, 1_000);

    player.stop();
    assert_eq!(player.state(), PlayerState::Idle);
    for slot in [Slot::A, Slot::B] {
        let channel = player.scheduler().channel(slot);
        assert!(channel.is_paused());
        assert!(!channel.has_source());
    }

    let volumes: Vec<f32> = [Slot::A, Slot::B]
        .iter()
        .map(|slot| player.scheduler().channel(*slot).volume())
        .collect();
    step(&mut player, &clock, 10_000);
    let after: Vec<f32> = [Slot::A, Slot::B]
        .iter()
        .map(|slot| player.scheduler().channel(*slot).volume())
        .collect();
    assert_eq!(volumes, after);
}
