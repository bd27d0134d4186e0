use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use chrono::{Local, Utc};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use tracing::warn;

use crate::clipboard::{SystemClipboard, write_to_clipboard};
use crate::config::{AppPaths, PAGE_SIZE, POLL_INTERVAL};
use crate::errors::{ClipError, Result};
use crate::history::History;
use crate::storage::models::{ClipboardEntry, SearchQuery};
use crate::watcher::{self, Watcher};

#[derive(PartialEq)]
enum Mode {
    Normal,
    Search,
    Tag,
    RemoveTag,
    ConfirmDelete(i64),
}

/// In-process capture, driven from the event loop so it shares one thread
/// with key handling.
struct LiveCapture {
    source: SystemClipboard,
    watcher: Watcher,
    updates: Receiver<ClipboardEntry>,
    last_tick: Instant,
}

struct App {
    entries: Vec<ClipboardEntry>,
    list_state: ListState,
    mode: Mode,
    page: usize,
    total: usize,
    query: SearchQuery,
    available_tags: Vec<String>,
    tag_input: String,
    status: String,
    status_time: Option<Instant>,
    preview_scroll: u16,
    should_quit: bool,
}

impl App {
    fn new() -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));
        Self {
            entries: Vec::new(),
            list_state,
            mode: Mode::Normal,
            page: 0,
            total: 0,
            query: SearchQuery::default(),
            available_tags: Vec::new(),
            tag_input: String::new(),
            status: String::new(),
            status_time: None,
            preview_scroll: 0,
            should_quit: false,
        }
    }

    fn set_status(&mut self, msg: String) {
        self.status = msg;
        self.status_time = Some(Instant::now());
    }

    fn page_count(&self) -> usize {
        self.total.div_ceil(PAGE_SIZE).max(1)
    }

    fn selected(&self) -> Option<&ClipboardEntry> {
        self.list_state.selected().and_then(|i| self.entries.get(i))
    }

    fn selected_id(&self) -> Option<i64> {
        self.selected().map(|e| e.timestamp)
    }

    fn select_by(&mut self, delta: isize) {
        if self.entries.is_empty() {
            return;
        }
        let current = self.list_state.selected().unwrap_or(0) as isize;
        let new = (current + delta).clamp(0, self.entries.len() as isize - 1) as usize;
        self.list_state.select(Some(new));
        self.preview_scroll = 0;
    }

    fn clamp_selection(&mut self) {
        if self.entries.is_empty() {
            self.list_state.select(None);
        } else if let Some(i) = self.list_state.selected() {
            if i >= self.entries.len() {
                self.list_state.select(Some(self.entries.len() - 1));
            }
        } else {
            self.list_state.select(Some(0));
        }
    }

    fn load_tags(&mut self, history: &mut History) {
        self.available_tags = history.all_tags();
    }

    fn load_page(&mut self, history: &mut History, page: usize) {
        match history.batch(page * PAGE_SIZE, PAGE_SIZE, &self.query) {
            Ok(entries) => {
                self.entries = entries;
                self.page = page;
            }
            Err(e) => self.set_status(format!("Error: {e}")),
        }
        self.preview_scroll = 0;
        self.clamp_selection();
    }

    /// Recounts and returns to the first page, as after any filter change.
    fn refresh(&mut self, history: &mut History) {
        match history.count(&self.query) {
            Ok(total) => self.total = total,
            Err(e) => self.set_status(format!("Error: {e}")),
        }
        self.load_tags(history);
        self.load_page(history, 0);
    }

    fn next_page(&mut self, history: &mut History) {
        if (self.page + 1) * PAGE_SIZE < self.total {
            self.load_page(history, self.page + 1);
            self.list_state.select(Some(0));
        }
    }

    fn prev_page(&mut self, history: &mut History) {
        if self.page > 0 {
            self.load_page(history, self.page - 1);
            self.list_state.select(Some(0));
        }
    }

    /// Cycles the tag filter through "all" and every known tag.
    fn cycle_tag_filter(&mut self, history: &mut History) {
        self.load_tags(history);
        let next = match self
            .available_tags
            .iter()
            .position(|t| *t == self.query.tag)
        {
            Some(i) => self.available_tags.get(i + 1).cloned().unwrap_or_default(),
            None => self.available_tags.first().cloned().unwrap_or_default(),
        };
        self.query.tag = next;
        self.refresh(history);
    }

    fn clear_filters(&mut self, history: &mut History) {
        self.query = SearchQuery::default();
        self.refresh(history);
        self.set_status("Filters cleared".to_string());
    }

    /// New capture: only the unfiltered first page shows it immediately.
    fn on_new_entry(&mut self, history: &mut History, entry: ClipboardEntry) {
        if !self.query.is_empty() {
            return;
        }
        self.total += 1;
        if self.page == 0 {
            self.entries.insert(0, entry);
            self.entries.truncate(PAGE_SIZE);
            self.clamp_selection();
        }
        self.load_tags(history);
    }

    fn copy_selected(&mut self) {
        let Some(entry) = self.selected() else {
            return;
        };
        let id = entry.timestamp;
        match write_to_clipboard(&entry.text, &entry.html) {
            Ok(()) => self.set_status(format!("Copied {id} to clipboard")),
            Err(e) => self.set_status(format!("Copy failed: {e}")),
        }
    }

    fn request_delete(&mut self) {
        let Some(id) = self.selected_id() else {
            return;
        };
        self.mode = Mode::ConfirmDelete(id);
        self.set_status(format!("Delete {id}? [y/n]"));
    }

    fn confirm_delete(&mut self, history: &mut History, id: i64) {
        match history.delete(id) {
            Ok(true) => {
                self.total = self.total.saturating_sub(1);
                let page = self.page.min(self.page_count() - 1);
                self.load_page(history, page);
                self.load_tags(history);
                self.set_status(format!("Deleted {id}"));
            }
            Ok(false) => self.set_status(format!("{id} not found")),
            Err(e) => self.set_status(format!("Delete error: {e}")),
        }
    }

    fn add_tag(&mut self, history: &mut History) {
        let tag = self.tag_input.trim().to_string();
        self.tag_input.clear();
        if tag.is_empty() {
            self.set_status("Empty tag".to_string());
            return;
        }
        let Some(idx) = self.list_state.selected() else {
            return;
        };
        let Some(id) = self.selected_id() else {
            return;
        };
        match history.add_tag(id, &tag) {
            Ok(true) => {
                if let Some(entry) = self.entries.get_mut(idx) {
                    entry.tags.push(tag.clone());
                }
                self.load_tags(history);
                self.set_status(format!("Tagged {id} \"{tag}\""));
            }
            Ok(false) => self.set_status(format!("{id} already tagged \"{tag}\"")),
            Err(e) => self.set_status(format!("Tag error: {e}")),
        }
    }

    fn remove_tag(&mut self, history: &mut History) {
        let tag = self.tag_input.trim().to_string();
        self.tag_input.clear();
        if tag.is_empty() {
            self.set_status("Empty tag".to_string());
            return;
        }
        let Some(idx) = self.list_state.selected() else {
            return;
        };
        let Some(id) = self.selected_id() else {
            return;
        };
        match history.remove_tag(id, &tag) {
            Ok(true) => {
                if let Some(entry) = self.entries.get_mut(idx) {
                    entry.tags.retain(|t| *t != tag);
                }
                self.load_tags(history);
                self.set_status(format!("Removed tag \"{tag}\" from {id}"));
            }
            Ok(false) => self.set_status(format!("{id} has no tag \"{tag}\"")),
            Err(e) => self.set_status(format!("Remove tag error: {e}")),
        }
    }

    fn toggle_daemon(&mut self, paths: &AppPaths) {
        match watcher::daemon_status(paths) {
            Ok(Some(pid)) => match watcher::stop_daemon(paths) {
                Ok(true) => self.set_status(format!("Stopped daemon (was pid {pid})")),
                Ok(false) => self.set_status("Daemon already stopped".to_string()),
                Err(e) => self.set_status(format!("Stop error: {e}")),
            },
            Ok(None) => match watcher::start_daemon(paths) {
                Ok(pid) => self.set_status(format!("Started daemon (pid {pid})")),
                Err(e) => self.set_status(format!("Start error: {e}")),
            },
            Err(e) => self.set_status(format!("Status error: {e}")),
        }
    }
}

fn format_age(entry: &ClipboardEntry) -> String {
    let Some(at) = entry.captured_at() else {
        return "?".to_string();
    };
    let dur = Utc::now() - at;
    if dur.num_seconds() < 60 {
        "now".to_string()
    } else if dur.num_minutes() < 60 {
        format!("{}m", dur.num_minutes())
    } else if dur.num_hours() < 24 {
        format!("{}h", dur.num_hours())
    } else {
        format!("{}d", dur.num_days())
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{truncated}…")
    } else {
        truncated
    }
}

// ── UI rendering ───────────────────────────────────────────────────

fn draw(frame: &mut Frame, app: &mut App, capturing: bool) {
    let [title_area, filter_area, body_area, help_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    // Title bar
    let capture_info = if capturing {
        "capturing"
    } else {
        "not capturing"
    };
    let title = format!(
        " ClipCache — {} entries — page {}/{} — {capture_info} ",
        app.total,
        app.page + 1,
        app.page_count()
    );
    frame.render_widget(
        Paragraph::new(title).style(Style::new().fg(Color::Black).bg(Color::Cyan)),
        title_area,
    );

    // Filter line
    let search = if app.mode == Mode::Search {
        format!("{}_", app.query.text)
    } else if app.query.text.is_empty() {
        "—".to_string()
    } else {
        app.query.text.clone()
    };
    let tag = if app.query.tag.is_empty() {
        "all tags".to_string()
    } else {
        app.query.tag.clone()
    };
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(" Search: ", Style::new().fg(Color::DarkGray)),
            Span::raw(search),
            Span::styled("   Tag: ", Style::new().fg(Color::DarkGray)),
            Span::raw(tag),
        ])),
        filter_area,
    );

    let [list_area, preview_area] =
        Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)])
            .areas(body_area);

    // Left pane: entry list
    let items: Vec<ListItem> = app
        .entries
        .iter()
        .map(|entry| {
            let oneline = entry.text.replace('\n', "↵");
            let tagged = if entry.tags.is_empty() { " " } else { "#" };
            ListItem::new(format!(
                "{:>4}{} {}",
                format_age(entry),
                tagged,
                truncate_chars(&oneline, 30)
            ))
        })
        .collect();

    let list_title = if app.query.is_empty() {
        "History".to_string()
    } else {
        "Matches".to_string()
    };
    let empty_hint = if app.query.is_empty() {
        "Copy something to get started!"
    } else {
        "No items match your filters."
    };

    if items.is_empty() {
        frame.render_widget(
            Paragraph::new(empty_hint)
                .block(Block::default().borders(Borders::ALL).title(list_title)),
            list_area,
        );
    } else {
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(list_title))
            .highlight_style(
                Style::new()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▸ ");
        frame.render_stateful_widget(list, list_area, &mut app.list_state);
    }

    // Right pane: preview
    let preview_content = match app.selected() {
        Some(entry) => {
            let tags = if entry.tags.is_empty() {
                "—".to_string()
            } else {
                entry.tags.join(", ")
            };
            let copied = entry
                .captured_at()
                .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();

            let mut lines = vec![
                Line::from(vec![
                    Span::styled("ID:      ", Style::new().fg(Color::DarkGray)),
                    Span::raw(entry.timestamp.to_string()),
                ]),
                Line::from(vec![
                    Span::styled("Copied:  ", Style::new().fg(Color::DarkGray)),
                    Span::raw(copied),
                ]),
                Line::from(vec![
                    Span::styled("Tags:    ", Style::new().fg(Color::DarkGray)),
                    Span::raw(tags),
                ]),
                Line::raw("─────────────────────────"),
            ];
            for line in entry.text.lines() {
                lines.push(Line::raw(line.to_string()));
            }
            lines
        }
        None => vec![Line::raw("No entry selected")],
    };

    let preview_title = match app.mode {
        Mode::Tag => format!("Tag: {}_", app.tag_input),
        Mode::RemoveTag => format!("Remove tag: {}_", app.tag_input),
        _ => {
            if app.preview_scroll > 0 {
                format!("Preview [scroll: {}]", app.preview_scroll)
            } else {
                "Preview".to_string()
            }
        }
    };

    let preview = Paragraph::new(preview_content)
        .block(Block::default().borders(Borders::ALL).title(preview_title))
        .wrap(Wrap { trim: false })
        .scroll((app.preview_scroll, 0));

    frame.render_widget(preview, preview_area);

    // Auto-clear status after 3 seconds
    if let Some(t) = app.status_time
        && t.elapsed() > Duration::from_secs(3)
    {
        app.status.clear();
        app.status_time = None;
    }

    // Help bar
    let help_text = match app.mode {
        Mode::Normal | Mode::ConfirmDelete(_) => {
            if app.status.is_empty() {
                " [q]uit [/]search [f]ilter tag [F] clear [n/p]age [Enter]copy [d]el [t]ag [T]untag [r]efresh [D]aemon"
                    .to_string()
            } else {
                format!(" {} ", app.status)
            }
        }
        Mode::Search => " Type to search (live) · [Enter] done · [Esc] cancel".to_string(),
        Mode::Tag => " Type tag name · [Enter] add · [Esc] cancel".to_string(),
        Mode::RemoveTag => " Type tag name · [Enter] remove · [Esc] cancel".to_string(),
    };

    frame.render_widget(
        Paragraph::new(help_text).style(Style::new().fg(Color::Black).bg(Color::White)),
        help_area,
    );
}

// ── Event handling ─────────────────────────────────────────────────

fn handle_event(app: &mut App, history: &mut History, paths: &AppPaths) -> std::io::Result<()> {
    if !event::poll(Duration::from_millis(250))? {
        return Ok(());
    }

    let Event::Key(key) = event::read()? else {
        return Ok(());
    };
    if key.kind != KeyEventKind::Press {
        return Ok(());
    }

    match app.mode {
        Mode::Normal => {
            let shifted = key.modifiers.contains(KeyModifiers::SHIFT);
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
                KeyCode::Char('J') if shifted => {
                    app.preview_scroll = app.preview_scroll.saturating_add(1);
                }
                KeyCode::Char('K') if shifted => {
                    app.preview_scroll = app.preview_scroll.saturating_sub(1);
                }
                KeyCode::Char('j') | KeyCode::Down => app.select_by(1),
                KeyCode::Char('k') | KeyCode::Up => app.select_by(-1),
                KeyCode::Char('n') | KeyCode::Right | KeyCode::PageDown => {
                    app.next_page(history)
                }
                KeyCode::Char('p') | KeyCode::Left | KeyCode::PageUp => app.prev_page(history),
                KeyCode::Char('g') | KeyCode::Home => app.select_by(-(PAGE_SIZE as isize)),
                KeyCode::Char('G') | KeyCode::End => app.select_by(PAGE_SIZE as isize),
                KeyCode::Enter => app.copy_selected(),
                KeyCode::Char('d') => app.request_delete(),
                KeyCode::Char('t') => {
                    app.mode = Mode::Tag;
                    app.tag_input.clear();
                    app.status.clear();
                    app.status_time = None;
                }
                KeyCode::Char('T') => {
                    app.mode = Mode::RemoveTag;
                    app.tag_input.clear();
                    app.status.clear();
                    app.status_time = None;
                }
                KeyCode::Char('/') => {
                    app.mode = Mode::Search;
                    app.status.clear();
                    app.status_time = None;
                }
                KeyCode::Char('f') => app.cycle_tag_filter(history),
                KeyCode::Char('F') => app.clear_filters(history),
                KeyCode::Char('r') => {
                    app.refresh(history);
                    app.set_status("Refreshed".to_string());
                }
                KeyCode::Char('D') => app.toggle_daemon(paths),
                _ => {}
            }
        }
        Mode::ConfirmDelete(id) => match key.code {
            KeyCode::Char('y') => {
                app.mode = Mode::Normal;
                app.confirm_delete(history, id);
            }
            _ => {
                app.mode = Mode::Normal;
                app.set_status("Delete cancelled".to_string());
            }
        },
        Mode::Search => match key.code {
            KeyCode::Esc => {
                app.mode = Mode::Normal;
                app.query.text.clear();
                app.refresh(history);
            }
            KeyCode::Enter => {
                app.mode = Mode::Normal;
            }
            KeyCode::Backspace => {
                app.query.text.pop();
                app.refresh(history);
            }
            KeyCode::Char(c) => {
                app.query.text.push(c);
                app.refresh(history);
            }
            _ => {}
        },
        Mode::Tag => match key.code {
            KeyCode::Esc => {
                app.mode = Mode::Normal;
                app.tag_input.clear();
            }
            KeyCode::Enter => {
                app.add_tag(history);
                app.mode = Mode::Normal;
            }
            KeyCode::Backspace => {
                app.tag_input.pop();
            }
            KeyCode::Char(c) => {
                app.tag_input.push(c);
            }
            _ => {}
        },
        Mode::RemoveTag => match key.code {
            KeyCode::Esc => {
                app.mode = Mode::Normal;
                app.tag_input.clear();
            }
            KeyCode::Enter => {
                app.remove_tag(history);
                app.mode = Mode::Normal;
            }
            KeyCode::Backspace => {
                app.tag_input.pop();
            }
            KeyCode::Char(c) => {
                app.tag_input.push(c);
            }
            _ => {}
        },
    }

    Ok(())
}

/// Runs one watcher tick once the poll interval has passed and feeds any
/// captured entries to the app.
fn tick_capture(capture: &mut LiveCapture, app: &mut App, history: &mut History) {
    if capture.last_tick.elapsed() < POLL_INTERVAL {
        return;
    }
    capture.last_tick = Instant::now();
    if let Err(e) = capture.watcher.poll_once(&mut capture.source, history) {
        warn!(error = %e, "poll failed");
    }
    while let Ok(entry) = capture.updates.try_recv() {
        app.on_new_entry(history, entry);
    }
}

/// Captures in-process unless the daemon is already doing it.
fn start_capture(paths: &AppPaths, history: &mut History) -> Option<LiveCapture> {
    if let Ok(Some(_)) = watcher::daemon_status(paths) {
        return None;
    }
    let source = match SystemClipboard::new() {
        Ok(source) => source,
        Err(e) => {
            warn!(error = %e, "clipboard unavailable, browsing only");
            return None;
        }
    };
    let mut watcher = match Watcher::new(history) {
        Ok(watcher) => watcher,
        Err(e) => {
            warn!(error = %e, "cannot start watcher");
            return None;
        }
    };
    let updates = watcher.subscribe();
    Some(LiveCapture {
        source,
        watcher,
        updates,
        last_tick: Instant::now(),
    })
}

// ── Entry point ────────────────────────────────────────────────────

pub fn run(paths: &AppPaths) -> Result<()> {
    let mut history = History::open(paths)?;
    history.initialize()?;

    let mut app = App::new();
    app.refresh(&mut history);
    let mut capture = start_capture(paths, &mut history);

    let mut terminal = ratatui::init();

    let result = (|| {
        loop {
            let capturing = capture.is_some();
            terminal.draw(|frame| draw(frame, &mut app, capturing))?;
            handle_event(&mut app, &mut history, paths)?;
            if let Some(capture) = capture.as_mut() {
                tick_capture(capture, &mut app, &mut history);
            }
            if app.should_quit {
                break;
            }
        }
        Ok::<(), std::io::Error>(())
    })();

    ratatui::restore();

    result.map_err(ClipError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded(count: i64) -> (TempDir, History) {
        let dir = TempDir::new().unwrap();
        let mut history = History::open(&AppPaths::from_base(dir.path().to_path_buf())).unwrap();
        for ts in 1..=count {
            history
                .create(&ClipboardEntry::new(format!("entry {ts}"), String::new(), ts))
                .unwrap();
        }
        (dir, history)
    }

    #[test]
    fn test_refresh_loads_first_page() {
        let (_dir, mut history) = seeded(10);
        let mut app = App::new();
        app.refresh(&mut history);
        assert_eq!(app.total, 10);
        assert_eq!(app.page_count(), 2);
        assert_eq!(app.entries.len(), PAGE_SIZE);
        assert_eq!(app.entries[0].timestamp, 10);
    }

    #[test]
    fn test_paging_stops_at_bounds() {
        let (_dir, mut history) = seeded(10);
        let mut app = App::new();
        app.refresh(&mut history);
        app.next_page(&mut history);
        assert_eq!(app.page, 1);
        assert_eq!(app.entries.len(), 2);
        app.next_page(&mut history);
        assert_eq!(app.page, 1);
        app.prev_page(&mut history);
        app.prev_page(&mut history);
        assert_eq!(app.page, 0);
    }

    #[test]
    fn test_new_entry_prepends_on_default_view() {
        let (_dir, mut history) = seeded(PAGE_SIZE as i64);
        let mut app = App::new();
        app.refresh(&mut history);
        app.on_new_entry(&mut history, ClipboardEntry::new("new".into(), "<p>new</p>".into(), 99));
        assert_eq!(app.total, PAGE_SIZE + 1);
        assert_eq!(app.entries.len(), PAGE_SIZE);
        assert_eq!(app.entries[0].timestamp, 99);
    }

    #[test]
    fn test_new_entry_ignored_while_filtered() {
        let (_dir, mut history) = seeded(3);
        let mut app = App::new();
        app.query = SearchQuery::text("entry 1");
        app.refresh(&mut history);
        app.on_new_entry(&mut history, ClipboardEntry::new("new".into(), "<p>new</p>".into(), 99));
        assert_eq!(app.total, 1);
        assert_eq!(app.entries.len(), 1);
    }

    #[test]
    fn test_cycle_tag_filter() {
        let (_dir, mut history) = seeded(3);
        history.add_tag(1, "alpha").unwrap();
        history.add_tag(2, "beta").unwrap();
        let mut app = App::new();
        app.refresh(&mut history);

        app.cycle_tag_filter(&mut history);
        assert_eq!(app.query.tag, "alpha");
        assert_eq!(app.total, 1);
        app.cycle_tag_filter(&mut history);
        assert_eq!(app.query.tag, "beta");
        app.cycle_tag_filter(&mut history);
        assert_eq!(app.query.tag, "");
        assert_eq!(app.total, 3);
    }

    #[test]
    fn test_delete_updates_total() {
        let (_dir, mut history) = seeded(3);
        let mut app = App::new();
        app.refresh(&mut history);
        app.confirm_delete(&mut history, 3);
        assert_eq!(app.total, 2);
        assert_eq!(app.entries[0].timestamp, 2);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello world", 5), "hello…");
    }
}
