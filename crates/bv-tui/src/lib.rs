use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use std::collections::VecDeque;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use bv_core::{Bead, BindingSet, TapTracker, TimerRequest, TriggerKey, TriggerKind};

const TICK_RATE: Duration = Duration::from_millis(200);

const TUTORIAL_PAGES: &[(&str, &str)] = &[
    (
        "Welcome",
        "beadview shows the beads (work items) in the current project.\n\nThe list on the left holds every bead; the panel on the right shows the selected one.",
    ),
    (
        "Moving around",
        "j/k or up/down: move through the list\ng/G: jump to first/last bead\nenter or tab: switch between list and detail",
    ),
    (
        "Getting help",
        "?: toggle the help modal\nTap the tutorial key once for this tutorial, twice quickly for help about the current view.\nThe context help key always opens help for the current view.",
    ),
    (
        "That's it",
        "q quits. Press esc to close this tutorial.",
    ),
];

/// Everything the TUI needs from the caller.
#[derive(Debug, Clone)]
pub struct TuiOptions {
    /// Beads to browse.
    pub beads: Vec<Bead>,
    /// Trigger key bindings.
    pub bindings: BindingSet,
    /// Double-tap window for the tutorial key.
    pub threshold: Duration,
    /// Where the beads were loaded from, shown in the title.
    pub source: PathBuf,
}

/// Render a key event in the textual form bindings are compared against.
///
/// Printable characters map to themselves (shift is already folded into
/// the character); chords are prefixed with `ctrl+`/`alt+`; named keys use
/// lowercase names. Keys with no textual form map to the empty string.
pub fn key_string(key: &KeyEvent) -> String {
    let mut prefix = String::new();
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        prefix.push_str("ctrl+");
    }
    if key.modifiers.contains(KeyModifiers::ALT) {
        prefix.push_str("alt+");
    }

    let name = match key.code {
        KeyCode::Char(c) => return format!("{prefix}{c}"),
        KeyCode::BackTab => return format!("{prefix}shift+tab"),
        KeyCode::Enter => "enter",
        KeyCode::Esc => "esc",
        KeyCode::Tab => "tab",
        KeyCode::Backspace => "backspace",
        KeyCode::Delete => "delete",
        KeyCode::Insert => "insert",
        KeyCode::Up => "up",
        KeyCode::Down => "down",
        KeyCode::Left => "left",
        KeyCode::Right => "right",
        KeyCode::Home => "home",
        KeyCode::End => "end",
        KeyCode::PageUp => "pgup",
        KeyCode::PageDown => "pgdown",
        KeyCode::CapsLock => "capslock",
        KeyCode::F(n) => {
            let shift = if key.modifiers.contains(KeyModifiers::SHIFT) {
                "shift+"
            } else {
                ""
            };
            return format!("{prefix}{shift}f{n}");
        }
        _ => return String::new(),
    };

    if key.modifiers.contains(KeyModifiers::SHIFT) {
        prefix.push_str("shift+");
    }
    format!("{prefix}{name}")
}

/// Map a key event to the trigger it is bound to, if any.
pub fn classify_key(key: &KeyEvent, bindings: &BindingSet) -> TriggerKey {
    bindings.classify(&key_string(key))
}

/// Best-effort lock-key detection.
///
/// Most terminals and operating systems swallow Caps Lock before it reaches
/// the application, and no event the terminal does deliver can be told
/// apart from an ordinary key with certainty. Every event is therefore
/// "not detected"; hosts rely on the bound trigger keys instead.
pub fn is_caps_lock(_key: &KeyEvent) -> bool {
    false
}

/// Deadlines requested by the tap tracker, delivered in request order.
#[derive(Debug, Default)]
struct TimerQueue {
    deadlines: VecDeque<Instant>,
}

impl TimerQueue {
    fn schedule(&mut self, now: Instant, request: TimerRequest) {
        self.deadlines.push_back(now + request.delay());
    }

    fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.deadlines
            .front()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Remove and count the deadlines that have passed.
    fn pop_due(&mut self, now: Instant) -> usize {
        let mut due = 0;
        while self.deadlines.front().is_some_and(|deadline| *deadline <= now) {
            self.deadlines.pop_front();
            due += 1;
        }
        due
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.deadlines.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    List,
    Detail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    List,
    Detail,
    HelpModal,
    Tutorial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overlay {
    None,
    Help,
    Tutorial { page: usize },
    ContextHelp(View),
}

#[derive(Debug)]
struct App {
    beads: Vec<Bead>,
    list_state: ListState,
    focus: Focus,
    overlay: Overlay,
    bindings: BindingSet,
    taps: TapTracker,
    timers: TimerQueue,
    source: String,
}

impl App {
    fn new(options: TuiOptions) -> Self {
        let mut list_state = ListState::default();
        if !options.beads.is_empty() {
            list_state.select(Some(0));
        }
        Self {
            beads: options.beads,
            list_state,
            focus: Focus::List,
            overlay: Overlay::None,
            bindings: options.bindings,
            taps: TapTracker::with_threshold(options.threshold),
            timers: TimerQueue::default(),
            source: options.source.to_string_lossy().to_string(),
        }
    }

    fn selected_bead(&self) -> Option<&Bead> {
        self.list_state.selected().and_then(|i| self.beads.get(i))
    }

    fn current_view(&self) -> View {
        match self.overlay {
            Overlay::Help => View::HelpModal,
            Overlay::Tutorial { .. } => View::Tutorial,
            Overlay::ContextHelp(view) => view,
            Overlay::None => match self.focus {
                Focus::List => View::List,
                Focus::Detail => View::Detail,
            },
        }
    }

    fn tutorial_key_pressed(&mut self, now: Instant) {
        if !self.bindings.double_tap {
            self.apply_trigger(TriggerKind::FullTutorial);
            return;
        }
        let (trigger, timer) = self.taps.handle_press(now);
        if let Some(request) = timer {
            self.timers.schedule(now, request);
        }
        self.apply_trigger(trigger);
    }

    fn timer_expired(&mut self) {
        let trigger = self.taps.handle_timer_expired();
        self.apply_trigger(trigger);
    }

    fn apply_trigger(&mut self, trigger: TriggerKind) {
        if trigger != TriggerKind::None {
            tracing::debug!(%trigger, "trigger resolved");
        }
        match trigger {
            TriggerKind::None => {}
            TriggerKind::FullTutorial => self.open_overlay(Overlay::Tutorial { page: 0 }),
            TriggerKind::ContextHelp => {
                let view = self.current_view();
                self.open_overlay(Overlay::ContextHelp(view));
            }
        }
    }

    fn open_overlay(&mut self, overlay: Overlay) {
        tracing::debug!(?overlay, "opening overlay");
        self.taps.reset();
        self.overlay = overlay;
    }

    fn close_overlay(&mut self) {
        self.taps.reset();
        self.overlay = Overlay::None;
    }

    fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::List => Focus::Detail,
            Focus::Detail => Focus::List,
        };
    }

    fn select_next(&mut self) {
        if self.beads.is_empty() {
            return;
        }
        let i = self
            .list_state
            .selected()
            .map_or(0, |i| (i + 1).min(self.beads.len() - 1));
        self.list_state.select(Some(i));
    }

    fn select_prev(&mut self) {
        if self.beads.is_empty() {
            return;
        }
        let i = self
            .list_state
            .selected()
            .map_or(0, |i| i.saturating_sub(1));
        self.list_state.select(Some(i));
    }

    fn select_first(&mut self) {
        if !self.beads.is_empty() {
            self.list_state.select(Some(0));
        }
    }

    fn select_last(&mut self) {
        if !self.beads.is_empty() {
            self.list_state.select(Some(self.beads.len() - 1));
        }
    }
}

pub fn run(options: TuiOptions) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(options);
    let result = event_loop(&mut terminal, &mut app);

    restore_terminal(terminal)?;
    result
}

fn event_loop(
    terminal: &mut Terminal<ratatui::backend::CrosstermBackend<Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal
            .draw(|frame| render_app(frame, app))
            .context("failed to draw frame")?;

        let timeout = app
            .timers
            .next_timeout(Instant::now())
            .map_or(TICK_RATE, |due| due.min(TICK_RATE));
        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if handle_key(app, key, Instant::now()) {
                        return Ok(());
                    }
                }
                Event::FocusLost => app.taps.reset(),
                _ => {}
            }
        }

        for _ in 0..app.timers.pop_due(Instant::now()) {
            app.timer_expired();
        }
    }
}

/// Returns true when the app should quit.
fn handle_key(app: &mut App, key: KeyEvent, now: Instant) -> bool {
    if is_caps_lock(&key) {
        app.tutorial_key_pressed(now);
        return false;
    }

    let class = classify_key(&key, &app.bindings);
    if class != TriggerKey::Neither {
        tracing::debug!(?class, code = ?key.code, "trigger key pressed");
    }
    match class {
        TriggerKey::DirectTutorial => {
            app.tutorial_key_pressed(now);
            return false;
        }
        TriggerKey::ContextHelp => {
            app.apply_trigger(TriggerKind::ContextHelp);
            return false;
        }
        TriggerKey::Neither => {}
    }

    match app.overlay {
        Overlay::Help => handle_help_key(app, key),
        Overlay::Tutorial { page } => handle_tutorial_key(app, key, page),
        Overlay::ContextHelp(_) => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('q')) {
                app.close_overlay();
            }
            false
        }
        Overlay::None => handle_browser_key(app, key),
    }
}

fn handle_help_key(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Esc | KeyCode::Char('?') => app.close_overlay(),
        KeyCode::Char(' ') if app.bindings.help_modal_space => {
            app.open_overlay(Overlay::Tutorial { page: 0 });
        }
        _ => {}
    }
    false
}

fn handle_tutorial_key(app: &mut App, key: KeyEvent, page: usize) -> bool {
    let last = TUTORIAL_PAGES.len() - 1;
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => app.close_overlay(),
        KeyCode::Char('n' | ' ') | KeyCode::Right => {
            app.overlay = Overlay::Tutorial {
                page: (page + 1).min(last),
            };
        }
        KeyCode::Char('p') | KeyCode::Left => {
            app.overlay = Overlay::Tutorial {
                page: page.saturating_sub(1),
            };
        }
        _ => {}
    }
    false
}

fn handle_browser_key(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
        KeyCode::Char('?') => app.open_overlay(Overlay::Help),
        KeyCode::Char('j') | KeyCode::Down => app.select_next(),
        KeyCode::Char('k') | KeyCode::Up => app.select_prev(),
        KeyCode::Home | KeyCode::Char('g') => app.select_first(),
        KeyCode::End | KeyCode::Char('G') => app.select_last(),
        KeyCode::Enter | KeyCode::Tab | KeyCode::BackTab => app.toggle_focus(),
        _ => {}
    }
    false
}

fn render_app(frame: &mut Frame, app: &App) {
    let size = frame.size();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(size);

    render_browser(frame, chunks[0], app);
    render_guide_bar(frame, chunks[1], app);

    match app.overlay {
        Overlay::None => {}
        Overlay::Help => render_help_popup(frame, size, "Help", &help_text(&app.bindings)),
        Overlay::Tutorial { page } => render_tutorial_popup(frame, size, page),
        Overlay::ContextHelp(view) => {
            let text = context_help_text(view, &app.bindings);
            render_help_popup(frame, size, "Context Help", &text);
        }
    }
}

fn render_browser(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)].as_ref())
        .split(area);

    let items = app
        .beads
        .iter()
        .map(|bead| {
            ListItem::new(format!(
                "{} [{}] P{} {}",
                bead.id,
                bead.status.as_str(),
                bead.priority,
                bead.title
            ))
        })
        .collect::<Vec<_>>();
    let list_block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Beads ({}) {}", app.beads.len(), app.source))
        .border_style(focus_style(app.focus == Focus::List));
    let list = List::new(items)
        .block(list_block)
        .highlight_style(Style::default().bg(Color::DarkGray));
    frame.render_stateful_widget(list, chunks[0], &mut app.list_state.clone());

    let detail = match app.selected_bead() {
        Some(bead) => {
            let mut lines = vec![
                Line::from(Span::styled(
                    bead.title.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(format!("ID: {}", bead.id)),
                Line::from(format!("Status: {}", bead.status.as_str())),
                Line::from(format!("Priority: P{}", bead.priority)),
            ];
            if !bead.issue_type.is_empty() {
                lines.push(Line::from(format!("Type: {}", bead.issue_type)));
            }
            if let Some(created) = bead.created_at {
                lines.push(Line::from(format!(
                    "Created: {}",
                    created.format("%Y-%m-%d %H:%M")
                )));
            }
            if !bead.description.is_empty() {
                lines.push(Line::from(""));
                lines.extend(bead.description.lines().map(|line| Line::from(line.to_string())));
            }
            lines
        }
        None => vec![Line::from("No beads found")],
    };
    let detail_block = Block::default()
        .borders(Borders::ALL)
        .title("Details")
        .border_style(focus_style(app.focus == Focus::Detail));
    let detail = Paragraph::new(detail)
        .block(detail_block)
        .wrap(Wrap { trim: true });
    frame.render_widget(detail, chunks[1]);
}

fn focus_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    }
}

fn render_guide_bar(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans: Vec<Span> = get_key_hints(app)
        .into_iter()
        .flat_map(|(key, desc)| {
            vec![
                Span::styled(
                    format!(" [{key}] "),
                    Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan),
                ),
                Span::raw(format!("{desc}  ")),
            ]
        })
        .collect();
    if app.taps.is_pending() {
        spans.push(Span::styled("...", Style::default().fg(Color::Yellow)));
    }

    let guide = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("Guide"));
    frame.render_widget(guide, area);
}

fn get_key_hints(app: &App) -> Vec<(String, &'static str)> {
    match app.overlay {
        Overlay::Help => {
            let mut hints = vec![("?".to_string(), "Close Help")];
            if app.bindings.help_modal_space {
                hints.push(("Space".into(), "Tutorial"));
            }
            hints
        }
        Overlay::Tutorial { .. } => vec![
            ("n/p".into(), "Page"),
            ("Esc".into(), "Close"),
        ],
        Overlay::ContextHelp(_) => vec![("Esc".into(), "Close")],
        Overlay::None => vec![
            ("q".into(), "Quit"),
            ("?".into(), "Help"),
            ("↑/↓".into(), "Nav"),
            ("Enter".into(), "Detail"),
            (app.bindings.direct_tutorial.clone(), "Tutorial"),
            (app.bindings.context_help.clone(), "Context Help"),
        ],
    }
}

fn render_help_popup(frame: &mut Frame, area: Rect, title: &str, content: &str) {
    let popup_area = centered_rect(70, 50, area);
    frame.render_widget(Clear, popup_area);
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    let help = Paragraph::new(content.to_string())
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(help, popup_area);
}

fn render_tutorial_popup(frame: &mut Frame, area: Rect, page: usize) {
    let index = page.min(TUTORIAL_PAGES.len() - 1);
    let (heading, body) = TUTORIAL_PAGES[index];
    let popup_area = centered_rect(70, 60, area);
    frame.render_widget(Clear, popup_area);
    let block = Block::default().borders(Borders::ALL).title(format!(
        "Tutorial {}/{}: {heading}",
        index + 1,
        TUTORIAL_PAGES.len()
    ));
    let text = Paragraph::new(body).block(block).wrap(Wrap { trim: true });
    frame.render_widget(text, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(popup_layout[1])[1]
}

fn restore_terminal(
    mut terminal: Terminal<ratatui::backend::CrosstermBackend<Stdout>>,
) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableFocusChange, LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn help_text(bindings: &BindingSet) -> String {
    let mut text = format!(
        "j/k: move\ng/G: first/last\nenter/tab: list/detail\n{}\nq: quit",
        bindings.hint()
    );
    if bindings.help_modal_space {
        text.push_str("\nspace: open tutorial");
    }
    text
}

fn context_help_text(view: View, bindings: &BindingSet) -> String {
    let body = match view {
        View::List => "j/k or up/down: move selection\ng/G: first/last bead\nenter/tab: focus the detail panel",
        View::Detail => "Shows the selected bead.\nenter/tab: back to the list\nj/k: move selection",
        View::HelpModal => "?: close the help modal\nspace: open the tutorial (if enabled)",
        View::Tutorial => "n/right: next page\np/left: previous page\nesc: close",
    };
    let double_tap = if bindings.double_tap {
        format!("\n\nDouble-tap {} for this help.", bindings.direct_tutorial)
    } else {
        String::new()
    };
    format!("{body}{double_tap}")
}
