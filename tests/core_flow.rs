use mixdj::audio::NullChannel;
use mixdj::controller::PlaybackController;
use mixdj::core::MixCore;
use mixdj::model::{MixSettings, PlayerState};
use mixdj::store::{JsonFileStore, KeyValueStore, SHUFFLE_KEY};
use mixdj::timer::{Clock, ManualClock};
use std::fs;
use std::rc::Rc;
use std::time::Duration;
use tempfile::tempdir;

fn core_at(clock: &ManualClock, state: &std::path::Path) -> MixCore<NullChannel> {
    let shared: Rc<dyn Clock> = Rc::new(clock.clone());
    let player = PlaybackController::new(
        NullChannel::new(Rc::clone(&shared)),
        NullChannel::new(Rc::clone(&shared)),
        &MixSettings::default(),
        shared,
    );
    MixCore::new(player, Box::new(JsonFileStore::open(state)))
}

#[test]
fn playlists_survive_restart_without_songs() {
    let dir = tempdir().expect("tempdir");
    let state = dir.path().join("state.json");
    let music = dir.path().join("music");
    fs::create_dir(&music).expect("mkdir");
    fs::write(music.join("opener.mp3"), b"x").expect("write");

    let clock = ManualClock::new();
    let mut core = core_at(&clock, &state);
    let set = core.create_playlist("Friday Set").expect("created");
    core.add_paths(&[music.clone()]);
    assert_eq!(core.active_songs().len(), 1);
    core.toggle_shuffle();
    drop(core);

    let restored = core_at(&clock, &state);
    assert_eq!(restored.playlists().len(), 2);
    assert_eq!(restored.active_id(), Some(&set));
    assert!(restored.active_songs().is_empty());
    assert!(restored.player().shuffle());
    assert_eq!(restored.store().get(SHUFFLE_KEY).as_deref(), Some("true"));
}

#[test]
fn snippet_set_plays_through_and_wraps() {
    let dir = tempdir().expect("tempdir");
    let clock = ManualClock::new();
    let mut core = core_at(&clock, &dir.path().join("state.json"));

    let songs = ["a", "b", "c"].map(|name| mixdj::model::Song {
        id: mixdj::model::SongId::from(name),
        name: name.to_string(),
        media: mixdj::model::Media::new(format!("{name}.mp3"))
            .with_duration(Duration::from_secs(240)),
        play_full: false,
    });
    core.append_songs(songs.to_vec());
    core.toggle_play_pause();

    let mut heard = vec![core.player().now_playing().song_name];
    for _ in 0..(95 * 20) {
        clock.advance(Duration::from_millis(50));
        core.tick();
        let name = core.player().now_playing().song_name;
        if heard.last() != Some(&name) {
            heard.push(name);
        }
    }

    let heard: Vec<&str> = heard.iter().filter_map(|name| name.as_deref()).collect();
    assert_eq!(heard, vec!["a", "b", "c", "a"]);
    assert_eq!(core.player().state(), PlayerState::Playing);
}

#[test]
fn corrupt_state_file_starts_with_empty_playlist_set() {
    let dir = tempdir().expect("tempdir");
    let state = dir.path().join("state.json");
    fs::write(&state, r#"{"playlists": "not-an-array"}"#).expect("write");

    let clock = ManualClock::new();
    let mut core = core_at(&clock, &state);
    assert!(core.playlists().is_empty());
    assert_eq!(core.active_id(), None);

    core.create_playlist("Recovered");
    let reopened = JsonFileStore::open(&state);
    assert!(
        reopened
            .get("playlists")
            .is_some_and(|raw| raw.contains("Recovered"))
    );
}
