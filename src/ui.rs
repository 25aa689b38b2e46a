use crate::audio::Channel;
use crate::core::MixCore;
use crate::model::PlayerState;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use std::time::Duration;

const APP_TITLE: &str = "MixDJ  ";
const KEY_HINTS: &str = "space play/pause  n next  enter play  x stop  s shuffle  f full  d remove  J/K move  tab playlist  +/- volume  : command";

struct Palette {
    bg: Color,
    panel_bg: Color,
    panel_alt_bg: Color,
    border: Color,
    text: Color,
    muted: Color,
    accent: Color,
    alert: Color,
    playlist: Color,
    selected_bg: Color,
}

const PALETTE: Palette = Palette {
    bg: Color::Rgb(10, 15, 24),
    panel_bg: Color::Rgb(19, 29, 43),
    panel_alt_bg: Color::Rgb(24, 38, 58),
    border: Color::Rgb(69, 121, 176),
    text: Color::Rgb(214, 228, 248),
    muted: Color::Rgb(149, 173, 204),
    accent: Color::Rgb(100, 203, 184),
    alert: Color::Rgb(249, 174, 88),
    playlist: Color::Rgb(156, 186, 255),
    selected_bg: Color::Rgb(34, 55, 82),
};

fn layout(area: Rect) -> (Rect, Rect, Rect, Rect, Rect) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(area);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(28), Constraint::Percentage(72)])
        .split(vertical[1]);

    (vertical[0], body[0], body[1], vertical[2], vertical[3])
}

pub fn songs_rect(area: Rect) -> Rect {
    layout(area).2
}

/// Renders one frame. `command` holds the command line while command mode is
/// open.
pub fn draw<C: Channel>(frame: &mut Frame, core: &MixCore<C>, command: Option<&str>) {
    let colors = &PALETTE;
    frame.render_widget(
        Block::default().style(Style::default().bg(colors.bg)),
        frame.area(),
    );
    let (header_area, playlists_area, songs_area, timeline_area, footer_area) =
        layout(frame.area());
    let player = core.player();
    let now = player.now_playing();

    let state_color = match now.state {
        PlayerState::Playing => colors.accent,
        PlayerState::Paused => colors.alert,
        PlayerState::Idle => colors.muted,
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            APP_TITLE,
            Style::default()
                .fg(colors.accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(now.state.label(), Style::default().fg(state_color)),
        Span::styled("  |  ", Style::default().fg(colors.muted)),
        Span::styled(
            now.song_name.as_deref().unwrap_or("-"),
            Style::default().fg(colors.text),
        ),
        Span::styled(
            match now.play_full {
                Some(true) => "  (full)",
                Some(false) => "  (snippet)",
                None => "",
            },
            Style::default().fg(colors.muted),
        ),
        Span::styled("  |  ", Style::default().fg(colors.muted)),
        Span::styled(
            if now.shuffle { "Shuffle on" } else { "Shuffle off" },
            Style::default().fg(colors.alert),
        ),
    ]))
    .block(panel_block("Now Playing", colors.panel_bg, colors.text, colors.border));
    frame.render_widget(header, header_area);

    let active_id = core.active_id();
    let playlist_items: Vec<ListItem> = core
        .playlists()
        .iter()
        .map(|playlist| {
            let active = Some(&playlist.id) == active_id;
            let style = if active {
                Style::default()
                    .fg(colors.playlist)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(colors.muted)
            };
            let marker = if active { "> " } else { "  " };
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(colors.muted)),
                Span::styled(playlist.name.as_str(), style),
                Span::styled(
                    format!(" ({})", playlist.songs.len()),
                    Style::default().fg(colors.muted),
                ),
            ]))
        })
        .collect();
    frame.render_widget(
        List::new(playlist_items).block(panel_block(
            "Playlists",
            colors.panel_alt_bg,
            colors.text,
            colors.border,
        )),
        playlists_area,
    );

    let current = player.current_song_id();
    let songs = core.active_songs();
    let song_items: Vec<ListItem> = songs
        .iter()
        .map(|song| {
            let playing = Some(&song.id) == current;
            let marker = if playing { "  > " } else { "    " };
            let full = if song.play_full { "[full] " } else { "       " };
            let style = if playing {
                Style::default().fg(colors.accent)
            } else {
                Style::default().fg(colors.text)
            };
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(colors.muted)),
                Span::styled(full, Style::default().fg(colors.alert)),
                Span::styled(song.name.as_str(), style),
            ]))
        })
        .collect();

    let mut state = ListState::default();
    state.select((!songs.is_empty()).then_some(core.selected_song));
    let songs_title = core
        .active_playlist()
        .map(|playlist| format!("Songs / {}", playlist.name))
        .unwrap_or_else(|| String::from("Songs"));
    let list = List::new(song_items)
        .block(panel_block(
            &songs_title,
            colors.panel_bg,
            colors.text,
            colors.border,
        ))
        .highlight_style(
            Style::default()
                .bg(colors.selected_bg)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("-> ");
    frame.render_stateful_widget(list, songs_area, &mut state);

    let channel = player.scheduler().active_channel();
    let timeline = timeline_line(
        channel.and_then(|channel| channel.position()),
        channel.and_then(|channel| channel.duration()),
        now.progress,
        now.volume,
    );
    let timeline_block = Paragraph::new(Span::styled(timeline, Style::default().fg(colors.text)))
        .block(panel_block("Timeline", colors.panel_bg, colors.text, colors.border))
        .wrap(Wrap { trim: true });
    frame.render_widget(timeline_block, timeline_area);

    let footer_line = match command {
        Some(buffer) => Line::from(vec![
            Span::styled(":", Style::default().fg(colors.accent)),
            Span::styled(buffer, Style::default().fg(colors.text)),
        ]),
        None => Line::from(vec![
            Span::styled(KEY_HINTS, Style::default().fg(colors.muted)),
            Span::styled("  |  ", Style::default().fg(colors.muted)),
            Span::styled(core.status.as_str(), Style::default().fg(colors.text)),
        ]),
    };
    let footer = Paragraph::new(footer_line).block(panel_block(
        if command.is_some() { "Command" } else { "Message" },
        colors.panel_bg,
        colors.text,
        colors.border,
    ));
    frame.render_widget(footer, footer_area);
}

fn panel_block(title: &str, bg: Color, text: Color, border: Color) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(text).add_modifier(Modifier::BOLD),
        ))
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(bg))
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{minutes:02}:{seconds:02}")
}

fn progress_bar(ratio: f64, width: usize) -> String {
    let clamped = ratio.clamp(0.0, 1.0);
    let filled = (clamped * width as f64).round() as usize;
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    bar.push_str(&"#".repeat(filled));
    bar.push_str(&"-".repeat(width.saturating_sub(filled)));
    bar.push(']');
    bar
}

fn timeline_line(
    position: Option<Duration>,
    duration: Option<Duration>,
    progress: f32,
    volume: f32,
) -> String {
    format!(
        "{} / {} {} {:>3.0}%  |  Vol {} {:>3.0}%",
        position.map_or_else(|| String::from("--:--"), format_duration),
        duration.map_or_else(|| String::from("--:--"), format_duration),
        progress_bar(f64::from(progress) / 100.0, 30),
        progress,
        progress_bar(f64::from(volume), 12),
        volume * 100.0,
    )
}
