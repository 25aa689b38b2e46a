use crate::audio::{Channel, NullChannel, RodioChannel};
use crate::config;
use crate::controller::PlaybackController;
use crate::core::MixCore;
use crate::store::JsonFileStore;
use crate::timer::{Clock, SystemClock};
use anyhow::Result;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
    MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::prelude::Rect;
use std::io::{Stdout, stdout};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

const INPUT_POLL: Duration = Duration::from_millis(33);
const REDRAW_EVERY: Duration = Duration::from_millis(250);

#[derive(Debug, Default, Clone)]
pub struct AppOptions {
    /// Skip the audio device and play silently on the system clock.
    pub null_audio: bool,
    pub output_device: Option<String>,
}

pub fn run(options: AppOptions) -> Result<()> {
    let settings = config::load_settings();
    config::ensure_config_dir()?;
    let store = Box::new(JsonFileStore::open(config::state_path()?));
    let clock: Rc<dyn Clock> = Rc::new(SystemClock::new());

    if !options.null_audio {
        match RodioChannel::pair(options.output_device.as_deref()) {
            Ok((a, b)) => {
                let player = PlaybackController::new(a, b, &settings, clock);
                return run_core(MixCore::new(player, store));
            }
            Err(err) => log::warn!("no audio output, playing silently: {err:#}"),
        }
    }

    let player = PlaybackController::new(
        NullChannel::new(Rc::clone(&clock)),
        NullChannel::new(Rc::clone(&clock)),
        &settings,
        clock,
    );
    let mut core = MixCore::new(player, store);
    core.status = String::from("No audio output, playing silently");
    run_core(core)
}

fn run_core<C: Channel>(mut core: MixCore<C>) -> Result<()> {
    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = event_loop(&mut core, &mut terminal);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    result
}

fn event_loop<C: Channel>(
    core: &mut MixCore<C>,
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
) -> Result<()> {
    let mut command_mode = false;
    let mut command_buffer = String::new();
    let mut last_draw = Instant::now();
    let mut songs_rect = Rect::default();

    loop {
        core.tick();

        if core.dirty || last_draw.elapsed() > REDRAW_EVERY {
            terminal.draw(|frame| {
                songs_rect = crate::ui::songs_rect(frame.area());
                crate::ui::draw(frame, core, command_mode.then_some(command_buffer.as_str()))
            })?;
            core.dirty = false;
            last_draw = Instant::now();
        }

        if !event::poll(INPUT_POLL)? {
            continue;
        }

        let event = event::read()?;
        if let Event::Mouse(mouse) = event {
            handle_mouse(core, mouse, songs_rect);
            continue;
        }

        let Event::Key(key) = event else {
            continue;
        };

        if key.kind != KeyEventKind::Press {
            continue;
        }

        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Ok(());
        }

        if command_mode {
            match key.code {
                KeyCode::Esc => {
                    command_mode = false;
                    command_buffer.clear();
                    core.dirty = true;
                }
                KeyCode::Enter => {
                    run_command(core, &command_buffer);
                    command_mode = false;
                    command_buffer.clear();
                    core.dirty = true;
                }
                KeyCode::Backspace => {
                    command_buffer.pop();
                    core.dirty = true;
                }
                KeyCode::Char(ch) => {
                    command_buffer.push(ch);
                    core.dirty = true;
                }
                _ => {}
            }
            continue;
        }

        match key.code {
            KeyCode::Down | KeyCode::Char('j') => core.select_next_song(),
            KeyCode::Up | KeyCode::Char('k') => core.select_prev_song(),
            KeyCode::Char('J') => core.move_selected(true),
            KeyCode::Char('K') => core.move_selected(false),
            KeyCode::Enter => core.play_selected(),
            KeyCode::Char(' ') => core.toggle_play_pause(),
            KeyCode::Char('n') => core.play_next(),
            KeyCode::Char('x') => core.stop(),
            KeyCode::Char('s') => core.toggle_shuffle(),
            KeyCode::Char('f') => {
                if let Some(id) = core.selected_song().map(|song| song.id.clone()) {
                    core.toggle_play_full(&id);
                }
            }
            KeyCode::Char('d') | KeyCode::Delete => {
                if let Some(id) = core.selected_song().map(|song| song.id.clone()) {
                    core.remove_song(&id);
                }
            }
            KeyCode::Tab => core.cycle_playlist(),
            KeyCode::Char('+') | KeyCode::Char('=') => core.volume_up(),
            KeyCode::Char('-') => core.volume_down(),
            KeyCode::Char(':') => {
                command_mode = true;
                core.dirty = true;
            }
            _ => {}
        }
    }
}

fn handle_mouse<C: Channel>(core: &mut MixCore<C>, mouse: MouseEvent, songs_rect: Rect) {
    let inside_songs = point_in_rect(mouse.column, mouse.row, songs_rect);
    match mouse.kind {
        MouseEventKind::ScrollDown if inside_songs => core.select_next_song(),
        MouseEventKind::ScrollUp if inside_songs => core.select_prev_song(),
        _ => {}
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    if rect.width == 0 || rect.height == 0 {
        return false;
    }
    x >= rect.x
        && x < rect.x.saturating_add(rect.width)
        && y >= rect.y
        && y < rect.y.saturating_add(rect.height)
}

pub fn run_command<C: Channel>(core: &mut MixCore<C>, raw: &str) {
    let input = raw.trim();
    if input.is_empty() {
        core.status = String::from("No command");
        core.dirty = true;
        return;
    }

    let mut command_split = input.splitn(2, char::is_whitespace);
    let command = command_split.next().unwrap_or_default();
    let rest = command_split.next().unwrap_or("").trim();

    match command {
        "help" => {
            core.status = String::from(
                "Commands: add <path> | new <name> | rename <name> | delete | help",
            );
            core.dirty = true;
        }
        "add" => {
            if rest.is_empty() {
                core.status = String::from("Usage: add <path>");
                core.dirty = true;
            } else {
                core.add_paths(&[PathBuf::from(rest)]);
            }
        }
        "new" => {
            core.create_playlist(rest);
        }
        "rename" => {
            let Some(id) = core.active_id().cloned() else {
                core.status = String::from("No active playlist");
                core.dirty = true;
                return;
            };
            core.rename_playlist(&id, rest);
        }
        "delete" => {
            let Some(id) = core.active_id().cloned() else {
                core.status = String::from("No active playlist");
                core.dirty = true;
                return;
            };
            core.delete_playlist(&id);
        }
        _ => {
            core.status = String::from("Unknown command. Use :help");
            core.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MixSettings;
    use crate::store::MemoryStore;
    use crate::timer::ManualClock;
    use std::fs;
    use tempfile::tempdir;

    fn core() -> MixCore<NullChannel> {
        let clock: Rc<dyn Clock> = Rc::new(ManualClock::new());
        let player = PlaybackController::new(
            NullChannel::new(Rc::clone(&clock)),
            NullChannel::new(Rc::clone(&clock)),
            &MixSettings::default(),
            clock,
        );
        MixCore::new(player, Box::new(MemoryStore::new()))
    }

    #[test]
    fn playlist_commands_create_rename_and_delete() {
        let mut core = core();
        run_command(&mut core, "new Sunrise");
        assert_eq!(core.playlists().len(), 2);
        assert_eq!(core.active_playlist().map(|p| p.name.as_str()), Some("Sunrise"));

        run_command(&mut core, "rename  Sunset ");
        assert_eq!(core.active_playlist().map(|p| p.name.as_str()), Some("Sunset"));

        run_command(&mut core, "delete");
        assert_eq!(core.playlists().len(), 1);
        assert_eq!(
            core.active_playlist().map(|p| p.name.as_str()),
            Some("My First Playlist")
        );
    }

    #[test]
    fn add_command_expands_folder() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("one.mp3"), b"x").expect("write");
        fs::write(dir.path().join("two.flac"), b"x").expect("write");

        let mut core = core();
        run_command(&mut core, &format!("add {}", dir.path().display()));
        assert_eq!(core.active_songs().len(), 2);
        assert_eq!(core.player().queue().len(), 2);
        assert_eq!(core.status, "Added 2 songs");
    }

    #[test]
    fn unknown_and_empty_commands_set_status() {
        let mut core = core();
        run_command(&mut core, "   ");
        assert_eq!(core.status, "No command");
        run_command(&mut core, "dance");
        assert_eq!(core.status, "Unknown command. Use :help");
        run_command(&mut core, "add");
        assert_eq!(core.status, "Usage: add <path>");
    }

    #[test]
    fn point_in_rect_excludes_edges() {
        let rect = Rect::new(2, 2, 4, 3);
        assert!(point_in_rect(2, 2, rect));
        assert!(point_in_rect(5, 4, rect));
        assert!(!point_in_rect(6, 4, rect));
        assert!(!point_in_rect(1, 3, rect));
        assert!(!point_in_rect(3, 3, Rect::default()));
    }
}
