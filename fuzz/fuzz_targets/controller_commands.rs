#![no_main]

use libfuzzer_sys::fuzz_target;
use mixdj::audio::NullChannel;
use mixdj::controller::PlaybackController;
use mixdj::model::{Media, MixSettings, PlayerState, Song, SongId};
use mixdj::timer::{Clock, ManualClock};
use std::rc::Rc;
use std::time::Duration;

fn song(n: usize) -> Song {
    Song {
        id: SongId(format!("song-{n}")),
        name: format!("song {n}"),
        media: Media::new(format!("song_{n}.mp3"))
            .with_duration(Duration::from_secs(30 + (n as u64 % 7) * 20)),
        play_full: n % 3 == 0,
    }
}

fuzz_target!(|data: &[u8]| {
    let clock = ManualClock::new();
    let shared: Rc<dyn Clock> = Rc::new(clock.clone());
    let mut player = PlaybackController::new(
        NullChannel::new(Rc::clone(&shared)),
        NullChannel::new(Rc::clone(&shared)),
        &MixSettings::default(),
        shared,
    );
    let mut songs: Vec<Song> = (0..(data.len() % 12).max(1)).map(song).collect();
    player.sync_songs(&songs);

    for byte in data {
        match byte % 10 {
            0 => player.play(),
            1 => player.pause(),
            2 => {
                player.play_next();
            }
            3 => {
                player.jump_to(usize::from(byte / 10));
            }
            4 => player.stop(),
            5 => {
                let shuffle = !player.shuffle();
                player.set_shuffle(shuffle);
            }
            6 => {
                if !songs.is_empty() {
                    songs.remove(usize::from(*byte) % songs.len());
                    player.sync_songs(&songs);
                }
            }
            7 => {
                songs.push(song(songs.len() + usize::from(*byte)));
                player.sync_songs(&songs);
            }
            8 => player.set_volume(f32::from(*byte) / 200.0),
            _ => {
                clock.advance(Duration::from_millis(u64::from(*byte) * 40));
                player.tick();
            }
        }

        if let Some(cursor) = player.cursor() {
            assert!(cursor < player.queue().len());
        } else {
            assert_eq!(player.state(), PlayerState::Idle);
        }
        assert_eq!(player.queue().len(), songs.len());
    }
});
