//! The terminal front-end. Draws the session's state and turns keys and
//! mouse input into `Command`s. All decisions live in `Session`; this module
//! only maps cells to pixels and back.

use anyhow::Result;
use chrono::{Datelike, Local, NaiveDate};
use crossterm::event::{
    Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent,
    MouseEventKind,
};
use futures::StreamExt;
use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::actions::Command;
use crate::catalog::{builtin_ids, builtin_spec, WindowId};
use crate::chat::{MessageBody, Role};
use crate::geometry::ResizeCorner;
use crate::icons::{GRID_CELL_H, GRID_CELL_W};
use crate::jobs::CardState;
use crate::notify::SystemNotifier;
use crate::session::{now, Session};
use crate::ui::{
    bar, cell_to_px, clip, dim_style, error_style, normal_style, point_in_rect, px_to_cell,
    sel_style, title_style, viewport_for, wrap, write_text, write_text_in_area, Term, CELL_H,
    CELL_W,
};
use crate::wm::{ContentState, WindowInstance};

const TICK: Duration = Duration::from_millis(100);
const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(450);
const TITLE_MIN_BUTTON: &str = "[-]";
const TITLE_MAX_BUTTON: &str = "[+]";
const TITLE_RESTORE_BUTTON: &str = "[R]";
const TITLE_CLOSE_BUTTON: &str = "[X]";
const TASK_PAGER_PREV: &str = "[<]";
const TASK_PAGER_NEXT: &str = "[>]";
const TASK_START_BUTTON: &str = "[Start]";
const TASK_START_SEPARATOR: &str = " | ";
const TOAST_WIDTH: u16 = 38;
const TOAST_HEIGHT: u16 = 4;
const START_MENU_WIDTH: u16 = 30;
const CHAT_LIST_WIDTH: u16 = 20;

// ── Native notifications ──────────────────────────────────────────────────────

/// Raises desktop notifications through the terminal (OSC 9), which most
/// emulators forward to the OS.
#[derive(Debug, Default)]
pub struct TerminalNotifier;

fn osc_safe(text: &str) -> String {
    text.chars().filter(|c| !c.is_control()).collect()
}

impl SystemNotifier for TerminalNotifier {
    fn notify(&self, title: &str, message: &str, _timeout: Duration) {
        let mut out = std::io::stdout();
        let _ = write!(out, "\x1b]9;{}: {}\x07", osc_safe(title), osc_safe(message));
        let _ = out.flush();
    }
}

// ── UI-only state ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum StartEntry {
    Open(WindowId, String),
    Tidy,
    Quit,
}

#[derive(Debug, Default)]
struct StartState {
    open: bool,
    selected: usize,
}

#[derive(Debug, Clone)]
struct IconDrag {
    icon: String,
    x: i32,
    y: i32,
    moved: bool,
}

#[derive(Debug, Clone)]
struct LastClick {
    target: String,
    at: Instant,
}

#[derive(Debug, Clone, Copy)]
struct NowPlaying {
    index: usize,
    since: Instant,
    ended: bool,
}

#[derive(Debug, Default)]
struct DesktopUi {
    start: StartState,
    task_scroll: usize,
    input: String,
    icon_drag: Option<IconDrag>,
    last_click: Option<LastClick>,
    catalog_sel: usize,
    now_playing: Option<NowPlaying>,
    quit: bool,
}

impl DesktopUi {
    fn is_double_click(&mut self, target: &str) -> bool {
        let at = Instant::now();
        let double = self
            .last_click
            .as_ref()
            .is_some_and(|c| c.target == target && at.duration_since(c.at) <= DOUBLE_CLICK_WINDOW);
        self.last_click = if double {
            None
        } else {
            Some(LastClick {
                target: target.to_string(),
                at,
            })
        };
        double
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowHit {
    Close,
    Maximize,
    Minimize,
    Resize(ResizeCorner),
    Title,
    Content,
}

// ── Entry point ───────────────────────────────────────────────────────────────

pub async fn run_desktop(terminal: &mut Term, session: &mut Session) -> Result<()> {
    let size = terminal.size()?;
    session.set_viewport(viewport_for(desktop_area(full_rect(size.width, size.height))));
    session.start();

    let mut ui = DesktopUi::default();
    let mut input = EventStream::new();
    let mut tick = tokio::time::interval(TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        draw_desktop(terminal, session, &ui)?;
        tokio::select! {
            maybe = input.next() => match maybe {
                Some(Ok(event)) => handle_terminal_event(session, &mut ui, event),
                Some(Err(err)) => {
                    session.shutdown();
                    return Err(err.into());
                }
                None => break,
            },
            Some(event) = session.next_event() => {
                session.handle_event(event);
                session.pump();
            }
            _ = tick.tick() => {
                session.tick();
                advance_player(session, &mut ui);
            }
        }
        if ui.quit {
            break;
        }
    }
    info!("desktop closed");
    session.shutdown();
    Ok(())
}

fn handle_terminal_event(session: &mut Session, ui: &mut DesktopUi, event: Event) {
    match event {
        Event::Key(key) => {
            if key.kind == KeyEventKind::Press || key.kind == KeyEventKind::Repeat {
                handle_key(session, ui, key);
            }
        }
        Event::Mouse(mouse) => handle_mouse(session, ui, mouse),
        Event::Resize(w, h) => {
            session.set_viewport(viewport_for(desktop_area(full_rect(w, h))));
        }
        _ => {}
    }
}

/// Tracks ended by the clock roll over to the next one.
fn advance_player(session: &mut Session, ui: &mut DesktopUi) {
    let Some(index) = session.player().index() else {
        ui.now_playing = None;
        return;
    };
    let duration = session
        .player()
        .current()
        .map(|t| Duration::from_secs(t.duration_sec as u64))
        .unwrap_or_default();
    let playing = match ui.now_playing {
        Some(p) if p.index == index => p,
        _ => {
            let fresh = NowPlaying {
                index,
                since: Instant::now(),
                ended: false,
            };
            ui.now_playing = Some(fresh);
            fresh
        }
    };
    if playing.ended || duration.is_zero() || playing.since.elapsed() < duration {
        return;
    }
    if !session.execute(Command::PlayerTrackEnded) {
        ui.now_playing = Some(NowPlaying {
            ended: true,
            ..playing
        });
    }
}

// ── Keyboard ──────────────────────────────────────────────────────────────────

fn handle_key(session: &mut Session, ui: &mut DesktopUi, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q')) {
        ui.quit = true;
        return;
    }
    if ui.start.open {
        handle_start_key(session, ui, key.code);
        return;
    }
    match key.code {
        KeyCode::F(1) => {
            ui.start = StartState {
                open: true,
                selected: 0,
            };
            return;
        }
        KeyCode::Tab => {
            cycle_focus(session);
            return;
        }
        KeyCode::Char('w') if ctrl => {
            if let Some(id) = session.wm().focused_id().cloned() {
                session.execute(Command::CloseWindow(id));
            }
            return;
        }
        KeyCode::Char('m') if ctrl => {
            if let Some(id) = session.wm().focused_id().cloned() {
                session.execute(Command::MinimizeWindow(id));
            }
            return;
        }
        _ => {}
    }

    let focused = session.wm().focused_id().cloned();
    match focused.as_ref().map(WindowId::as_str) {
        Some("chat") => handle_chat_key(session, ui, key, ctrl),
        Some("player") => handle_player_key(session, ui, key.code),
        Some("plugins") => handle_plugins_key(session, ui, key.code),
        Some("settings") => {
            if key.code == KeyCode::Char('a') {
                session.execute(Command::ToggleAttention);
            }
        }
        _ => {
            if key.code == KeyCode::Char('t') {
                session.execute(Command::TidyDesktop);
            }
        }
    }
}

fn cycle_focus(session: &mut Session) {
    let entries: Vec<WindowId> = session.wm().taskbar().iter().map(|t| t.id.clone()).collect();
    if entries.is_empty() {
        return;
    }
    let current = session
        .wm()
        .focused_id()
        .and_then(|id| entries.iter().position(|e| e == id));
    let next = current.map_or(0, |i| (i + 1) % entries.len());
    let id = entries[next].clone();
    if session.wm().is_open_and_visible(&id) {
        session.execute(Command::FocusWindow(id));
    } else {
        session.execute(Command::TaskbarClick(id));
    }
}

fn edit_input(ui: &mut DesktopUi, code: KeyCode) -> bool {
    match code {
        KeyCode::Char(c) => {
            ui.input.push(c);
            true
        }
        KeyCode::Backspace => {
            ui.input.pop();
            true
        }
        _ => false,
    }
}

/// `/image <path> [caption]` attaches a local file; anything else is sent as
/// typed (the session handles `/draw`).
fn parse_chat_input(input: &str) -> Option<Command> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Some(rest) = input.strip_prefix("/image ") {
        let rest = rest.trim();
        let (path, caption) = match rest.split_once(' ') {
            Some((path, caption)) => (path, caption.trim()),
            None => (rest, ""),
        };
        if path.is_empty() {
            return None;
        }
        return Some(Command::SendMessage {
            text: caption.to_string(),
            image: Some(PathBuf::from(path)),
        });
    }
    Some(Command::SendMessage {
        text: input.to_string(),
        image: None,
    })
}

fn handle_chat_key(session: &mut Session, ui: &mut DesktopUi, key: KeyEvent, ctrl: bool) {
    match key.code {
        KeyCode::Char('n') if ctrl => {
            session.execute(Command::NewChat);
        }
        KeyCode::Char('d') if ctrl => {
            if let Some(id) = session.chat().current_id().map(str::to_string) {
                session.execute(Command::DeleteChat(id));
            }
        }
        KeyCode::PageUp | KeyCode::PageDown => {
            let list = session.chat().list();
            if list.is_empty() {
                return;
            }
            let current = session
                .chat()
                .current_id()
                .and_then(|id| list.iter().position(|c| c.id == id));
            let next = match (key.code, current) {
                (KeyCode::PageUp, Some(i)) => i.saturating_sub(1),
                (KeyCode::PageDown, Some(i)) => (i + 1).min(list.len() - 1),
                _ => 0,
            };
            let id = list[next].id.clone();
            session.execute(Command::SelectChat(id));
        }
        KeyCode::Enter => {
            if let Some(command) = parse_chat_input(&ui.input) {
                session.execute(command);
            }
            ui.input.clear();
        }
        KeyCode::Esc => ui.input.clear(),
        code => {
            edit_input(ui, code);
        }
    }
}

fn handle_player_key(session: &mut Session, ui: &mut DesktopUi, code: KeyCode) {
    match code {
        KeyCode::Right => {
            session.execute(Command::PlayerNext);
        }
        KeyCode::Up | KeyCode::Down => {
            let len = session.player().len();
            if len == 0 {
                return;
            }
            let index = session.player().index().unwrap_or(0);
            let next = if code == KeyCode::Up {
                index.saturating_sub(1)
            } else {
                (index + 1).min(len - 1)
            };
            session.execute(Command::PlayerSeek(next));
        }
        KeyCode::Enter => {
            let query = std::mem::take(&mut ui.input);
            session.execute(Command::PlayerEnqueue(query));
        }
        KeyCode::Esc => ui.input.clear(),
        code => {
            edit_input(ui, code);
        }
    }
}

fn handle_plugins_key(session: &mut Session, ui: &mut DesktopUi, code: KeyCode) {
    let len = session.catalog().len();
    if len == 0 {
        return;
    }
    ui.catalog_sel = ui.catalog_sel.min(len - 1);
    let entry = &session.catalog()[ui.catalog_sel];
    let command = match code {
        KeyCode::Up => {
            ui.catalog_sel = ui.catalog_sel.saturating_sub(1);
            None
        }
        KeyCode::Down => {
            ui.catalog_sel = (ui.catalog_sel + 1).min(len - 1);
            None
        }
        KeyCode::Char('i') if !entry.installed => Some(Command::InstallPlugin(entry.id.clone())),
        KeyCode::Char('u') if entry.installed => Some(Command::UninstallPlugin(entry.id.clone())),
        KeyCode::Char('U') if entry.update_available => Some(Command::UpdatePlugin(entry.id.clone())),
        _ => None,
    };
    if let Some(command) = command {
        debug!(?command, "plugin store");
        session.execute(command);
    }
}

// ── Start menu ────────────────────────────────────────────────────────────────

fn start_entries(session: &Session) -> Vec<StartEntry> {
    let mut entries: Vec<StartEntry> = builtin_ids()
        .filter_map(|id| builtin_spec(&id).map(|spec| StartEntry::Open(id, format!("{} {}", spec.icon, spec.title))))
        .collect();
    entries.extend(
        session
            .desktop_plugins()
            .iter()
            .filter(|p| p.has_window)
            .map(|p| StartEntry::Open(WindowId::plugin(&p.id), format!("{} {}", p.icon, p.title))),
    );
    entries.push(StartEntry::Tidy);
    entries.push(StartEntry::Quit);
    entries
}

fn start_entry_label(entry: &StartEntry) -> &str {
    match entry {
        StartEntry::Open(_, label) => label,
        StartEntry::Tidy => "Tidy desktop",
        StartEntry::Quit => "Quit",
    }
}

fn run_start_entry(session: &mut Session, ui: &mut DesktopUi, entry: StartEntry) {
    ui.start.open = false;
    match entry {
        StartEntry::Open(id, _) => {
            session.execute(Command::OpenWindow(id));
        }
        StartEntry::Tidy => {
            session.execute(Command::TidyDesktop);
        }
        StartEntry::Quit => ui.quit = true,
    }
}

fn handle_start_key(session: &mut Session, ui: &mut DesktopUi, code: KeyCode) {
    let entries = start_entries(session);
    match code {
        KeyCode::Esc | KeyCode::F(1) => ui.start.open = false,
        KeyCode::Up => ui.start.selected = ui.start.selected.saturating_sub(1),
        KeyCode::Down => ui.start.selected = (ui.start.selected + 1).min(entries.len().saturating_sub(1)),
        KeyCode::Enter => {
            if let Some(entry) = entries.get(ui.start.selected).cloned() {
                run_start_entry(session, ui, entry);
            }
        }
        _ => {}
    }
}

fn start_menu_rect(size: Rect, entries: usize) -> Rect {
    let task = taskbar_area(size);
    let height = (entries as u16 + 2).min(task.y.saturating_sub(1));
    Rect {
        x: size.x,
        y: task.y.saturating_sub(height),
        width: START_MENU_WIDTH.min(size.width),
        height,
    }
}

// ── Mouse ─────────────────────────────────────────────────────────────────────

fn handle_mouse(session: &mut Session, ui: &mut DesktopUi, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => on_left_down(session, ui, mouse.column, mouse.row),
        MouseEventKind::Down(MouseButton::Right) => {
            let desk = last_desktop_area(session);
            let (px, py) = cell_to_px(desk, mouse.column, mouse.row);
            if session.wm().topmost_at(px, py).is_none() {
                if let Some(icon) = session.icons().icon_at(px, py).map(|i| i.id.to_string()) {
                    session.execute(Command::HideIcon(icon));
                }
            }
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            let desk = last_desktop_area(session);
            let (px, py) = cell_to_px(desk, mouse.column, mouse.row);
            if let Some(drag) = ui.icon_drag.as_mut() {
                drag.x = px;
                drag.y = py;
                drag.moved = true;
            } else {
                session.execute(Command::DragTo { x: px, y: py });
            }
        }
        MouseEventKind::Up(MouseButton::Left) => {
            if let Some(drag) = ui.icon_drag.take() {
                if drag.moved {
                    session.execute(Command::DropIcon {
                        icon: drag.icon,
                        x: drag.x - GRID_CELL_W / 2,
                        y: drag.y - GRID_CELL_H / 2,
                    });
                }
            } else if session.wm().is_dragging() {
                session.execute(Command::EndDrag);
            }
        }
        _ => {}
    }
}

/// Desktop area in cells, recovered from the pixel viewport the session was
/// last given.
fn last_desktop_area(session: &Session) -> Rect {
    let viewport = session.wm().viewport();
    Rect {
        x: 0,
        y: 1,
        width: (viewport.width / CELL_W).max(0) as u16,
        height: (viewport.height / CELL_H).max(0) as u16,
    }
}

fn on_left_down(session: &mut Session, ui: &mut DesktopUi, x: u16, y: u16) {
    let desk = last_desktop_area(session);
    let size = Rect {
        x: 0,
        y: 0,
        width: desk.width,
        height: desk.height + 2,
    };

    if ui.start.open {
        let entries = start_entries(session);
        let menu = start_menu_rect(size, entries.len());
        if point_in_rect(x, y, menu) {
            let row = y.saturating_sub(menu.y + 1) as usize;
            if y > menu.y && row < entries.len() {
                let entry = entries[row].clone();
                run_start_entry(session, ui, entry);
            }
            return;
        }
        ui.start.open = false;
    }

    let task = taskbar_area(size);
    if y == task.y {
        on_taskbar_click(session, ui, task, x);
        return;
    }

    let toasts: Vec<u64> = session.toasts().iter().map(|t| t.key).collect();
    for (key, rect) in toasts.iter().zip(toast_rects(desk, toasts.len())) {
        if point_in_rect(x, y, rect) {
            session.execute(Command::ClickToast(*key));
            return;
        }
    }

    let (px, py) = cell_to_px(desk, x, y);
    if let Some((id, hit, area)) = hit_window(session, desk, x, y) {
        match hit {
            WindowHit::Close => {
                session.execute(Command::CloseWindow(id));
            }
            WindowHit::Maximize => {
                session.execute(Command::ToggleMaximize(id));
            }
            WindowHit::Minimize => {
                session.execute(Command::MinimizeWindow(id));
            }
            WindowHit::Resize(corner) => {
                session.execute(Command::BeginResize {
                    window: id,
                    corner,
                    x: px,
                    y: py,
                });
            }
            WindowHit::Title => {
                if ui.is_double_click(&format!("title:{id}")) {
                    session.execute(Command::ToggleMaximize(id));
                } else {
                    session.execute(Command::BeginMove { window: id, x: px, y: py });
                }
            }
            WindowHit::Content => {
                session.execute(Command::FocusWindow(id.clone()));
                on_content_click(session, ui, &id, content_rect(area), x, y);
            }
        }
        return;
    }

    if let Some(icon) = session.icons().icon_at(px, py).map(|i| i.id.clone()) {
        if ui.is_double_click(&format!("icon:{icon}")) {
            session.execute(Command::OpenWindow(icon));
        } else {
            ui.icon_drag = Some(IconDrag {
                icon: icon.to_string(),
                x: px,
                y: py,
                moved: false,
            });
        }
    }
}

fn on_content_click(session: &mut Session, ui: &mut DesktopUi, id: &WindowId, inner: Rect, x: u16, y: u16) {
    let row = y.saturating_sub(inner.y) as usize;
    match id.as_str() {
        "plugins" => {
            // two rows per catalog entry
            let idx = row / 2;
            if idx < session.catalog().len() {
                ui.catalog_sel = idx;
            }
        }
        "chat" if inner.width >= CHAT_LIST_WIDTH * 3 && x < inner.x + CHAT_LIST_WIDTH => {
            if let Some(chat) = session.chat().list().get(row) {
                let chat_id = chat.id.clone();
                session.execute(Command::SelectChat(chat_id));
            }
        }
        "player" => {
            // header takes two rows
            if row >= 2 && row - 2 < session.player().len() {
                session.execute(Command::PlayerSeek(row - 2));
            }
        }
        _ => {}
    }
}

fn on_taskbar_click(session: &mut Session, ui: &mut DesktopUi, task: Rect, x: u16) {
    if point_in_rect(x, task.y, start_button_rect(task)) {
        ui.start = StartState {
            open: !ui.start.open,
            selected: 0,
        };
        return;
    }
    let layout = taskbar_layout(session, ui.task_scroll, task);
    if layout.prev.is_some_and(|r| point_in_rect(x, task.y, r)) {
        ui.task_scroll = ui.task_scroll.saturating_sub(1);
        return;
    }
    if layout.next.is_some_and(|r| point_in_rect(x, task.y, r)) {
        if layout.can_scroll_right {
            ui.task_scroll += 1;
        }
        return;
    }
    if let Some(button) = layout.buttons.into_iter().find(|b| point_in_rect(x, task.y, b.rect)) {
        session.execute(Command::TaskbarClick(button.window));
    }
}

fn hit_window(session: &Session, desk: Rect, x: u16, y: u16) -> Option<(WindowId, WindowHit, Rect)> {
    let at = now();
    for win in session.wm().stacked().into_iter().rev() {
        let area = window_area(desk, win, at);
        if !point_in_rect(x, y, area) {
            continue;
        }
        let id = win.id.clone();
        if point_in_rect(x, y, title_close_button_rect(area)) {
            return Some((id, WindowHit::Close, area));
        }
        if point_in_rect(x, y, title_max_button_rect(area)) {
            return Some((id, WindowHit::Maximize, area));
        }
        if point_in_rect(x, y, title_min_button_rect(area)) {
            return Some((id, WindowHit::Minimize, area));
        }
        if !win.maximized {
            if let Some(corner) = hit_resize_corner(area, x, y) {
                return Some((id, WindowHit::Resize(corner), area));
            }
        }
        if y == area.y {
            return Some((id, WindowHit::Title, area));
        }
        return Some((id, WindowHit::Content, area));
    }
    None
}

// ── Layout ────────────────────────────────────────────────────────────────────

fn full_rect(width: u16, height: u16) -> Rect {
    Rect {
        x: 0,
        y: 0,
        width,
        height,
    }
}

fn top_status_area(size: Rect) -> Rect {
    Rect {
        height: size.height.min(1),
        ..size
    }
}

fn taskbar_area(size: Rect) -> Rect {
    Rect {
        x: size.x,
        y: size.y + size.height.saturating_sub(1),
        width: size.width,
        height: size.height.min(1),
    }
}

fn desktop_area(size: Rect) -> Rect {
    Rect {
        x: size.x,
        y: size.y + 1,
        width: size.width,
        height: size.height.saturating_sub(2),
    }
}

fn window_area(desk: Rect, win: &WindowInstance, at: Instant) -> Rect {
    let rect = win.rect.translated(win.shake_offset(at), 0);
    px_to_cell(desk, rect)
}

fn content_rect(area: Rect) -> Rect {
    Rect {
        x: area.x + 1,
        y: area.y + 1,
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    }
}

fn start_button_rect(task: Rect) -> Rect {
    Rect {
        x: task.x,
        y: task.y,
        width: (TASK_START_BUTTON.len() as u16).min(task.width),
        height: 1,
    }
}

fn title_close_button_rect(area: Rect) -> Rect {
    let w = TITLE_CLOSE_BUTTON.len() as u16;
    Rect {
        x: (area.x + area.width).saturating_sub(1 + w),
        y: area.y,
        width: w,
        height: 1,
    }
}

fn title_max_button_rect(area: Rect) -> Rect {
    let close = title_close_button_rect(area);
    let w = TITLE_MAX_BUTTON.len() as u16;
    Rect {
        x: close.x.saturating_sub(w),
        width: w,
        ..close
    }
}

fn title_min_button_rect(area: Rect) -> Rect {
    let max = title_max_button_rect(area);
    let w = TITLE_MIN_BUTTON.len() as u16;
    Rect {
        x: max.x.saturating_sub(w),
        width: w,
        ..max
    }
}

fn hit_resize_corner(area: Rect, x: u16, y: u16) -> Option<ResizeCorner> {
    if area.width < 4 || area.height < 4 {
        return None;
    }
    let left = area.x;
    let right = area.x.saturating_add(area.width).saturating_sub(1);
    let top = area.y;
    let bottom = area.y.saturating_add(area.height).saturating_sub(1);

    if x == left && y == top {
        Some(ResizeCorner::TopLeft)
    } else if x == right && y == top {
        Some(ResizeCorner::TopRight)
    } else if x == left && y == bottom {
        Some(ResizeCorner::BottomLeft)
    } else if x == right && y == bottom {
        Some(ResizeCorner::BottomRight)
    } else {
        None
    }
}

/// Toasts stack downward from the top-right corner of the desk.
fn toast_rects(desk: Rect, count: usize) -> Vec<Rect> {
    let width = TOAST_WIDTH.min(desk.width);
    (0..count as u16)
        .map(|i| Rect {
            x: desk.x + desk.width.saturating_sub(width + 1),
            y: desk.y + 1 + i * TOAST_HEIGHT,
            width,
            height: TOAST_HEIGHT,
        })
        .filter(|r| r.y + r.height <= desk.y + desk.height)
        .collect()
}

struct TaskButton {
    window: WindowId,
    rect: Rect,
}

struct TaskbarLayout {
    buttons: Vec<TaskButton>,
    prev: Option<Rect>,
    next: Option<Rect>,
    can_scroll_right: bool,
}

fn task_button_text(title: &str, icon: &str, active: bool, minimized: bool) -> String {
    let mark = if active {
        "*"
    } else if minimized {
        "_"
    } else {
        " "
    };
    format!("[{mark}{icon} {}]", clip(title, 14))
}

fn taskbar_layout(session: &Session, scroll: usize, task: Rect) -> TaskbarLayout {
    let mut layout = TaskbarLayout {
        buttons: Vec::new(),
        prev: None,
        next: None,
        can_scroll_right: false,
    };
    let entries = session.wm().taskbar();
    if task.width == 0 || entries.is_empty() {
        return layout;
    }
    let start_w = start_button_rect(task).width;
    let sep_w = TASK_START_SEPARATOR.len() as u16;
    let base_x = task.x.saturating_add(start_w).saturating_add(sep_w);
    let end_x = task.x.saturating_add(task.width);
    if base_x >= end_x {
        return layout;
    }

    let labels: Vec<(WindowId, String)> = entries
        .iter()
        .map(|e| (e.id.clone(), task_button_text(&e.title, &e.icon, e.active, e.minimized)))
        .collect();
    let total: usize = labels.iter().map(|(_, t)| t.chars().count() + 1).sum();
    let scroll = scroll.min(labels.len().saturating_sub(1));
    let paging = total > end_x.saturating_sub(base_x) as usize || scroll > 0;

    let (mut x, limit) = if paging {
        let pager_w = TASK_PAGER_PREV.len() as u16;
        let prev = Rect { x: base_x, y: task.y, width: pager_w, height: 1 };
        let next = Rect { x: end_x.saturating_sub(pager_w), y: task.y, width: pager_w, height: 1 };
        if prev.x + prev.width >= next.x {
            return layout;
        }
        layout.prev = Some(prev);
        layout.next = Some(next);
        (prev.x + prev.width + 1, next.x.saturating_sub(1))
    } else {
        (base_x, end_x)
    };

    for (window, text) in labels.into_iter().skip(scroll) {
        let width = text.chars().count() as u16;
        if x + width > limit {
            layout.can_scroll_right = true;
            break;
        }
        layout.buttons.push(TaskButton {
            window,
            rect: Rect { x, y: task.y, width, height: 1 },
        });
        x = x.saturating_add(width + 1);
    }
    layout
}

// ── Drawing ───────────────────────────────────────────────────────────────────

fn draw_desktop(terminal: &mut Term, session: &Session, ui: &DesktopUi) -> Result<()> {
    terminal.draw(|f| {
        let size = f.area();
        let desk = desktop_area(size);
        let at = now();
        f.render_widget(Clear, size);

        draw_top_status(f, session, top_status_area(size));
        draw_icons(f, session, ui, desk);
        let focused = session.wm().focused_id().cloned();
        for win in session.wm().stacked() {
            draw_window(f, session, ui, win, window_area(desk, win, at), focused.as_ref() == Some(&win.id));
        }
        draw_toasts(f, session, desk);
        draw_taskbar(f, session, ui, taskbar_area(size));
        if ui.start.open {
            draw_start_menu(f, session, ui, size);
        }
    })?;
    Ok(())
}

fn draw_top_status(f: &mut Frame, session: &Session, area: Rect) {
    if area.height == 0 {
        return;
    }
    let width = area.width as usize;
    let mut row = vec![' '; width];
    let clock = Local::now().format("%a %H:%M").to_string();
    let mood = format!("{} {}", session.mood_emoji(), session.mood().label());
    let version = session.status().map(|s| s.version.as_str()).unwrap_or("?");
    let left = format!(" {clock}  {}  stream: {}  server {version}", mood.trim(), session.stream_state().label());
    write_text(&mut row, 0, &left);
    let line: String = row.into_iter().collect();
    f.render_widget(Paragraph::new(Line::from(Span::styled(line, sel_style()))), area);

    if let Some(err) = session.last_error() {
        let used = left.chars().count() as u16 + 2;
        if area.width > used + 10 {
            let rect = Rect {
                x: area.x + used,
                width: area.width - used,
                ..area
            };
            let text = clip(err, rect.width as usize);
            f.render_widget(Paragraph::new(Span::styled(text, error_style())), rect);
        }
    }
}

fn draw_icons(f: &mut Frame, session: &Session, ui: &DesktopUi, desk: Rect) {
    let icon_w = (GRID_CELL_W / CELL_W) as u16;
    for icon in session.icons().icons() {
        let (px, py) = match &ui.icon_drag {
            Some(drag) if drag.moved && drag.icon == icon.id.as_str() => {
                (drag.x - GRID_CELL_W / 2, drag.y - GRID_CELL_H / 2)
            }
            _ => match session.icons().position(icon.id.as_str()) {
                Some(pos) => (pos.x, pos.y),
                None => continue,
            },
        };
        let col = desk.x as i32 + px / CELL_W;
        let row = desk.y as i32 + py / CELL_H;
        if col < desk.x as i32 || row < desk.y as i32 {
            continue;
        }
        let rect = Rect {
            x: col as u16,
            y: row as u16,
            width: icon_w,
            height: 2,
        }
        .intersection(desk);
        if rect.height == 0 || rect.width == 0 {
            continue;
        }
        let lines = vec![
            Line::from(Span::styled(format!(" {}", icon.glyph), title_style())),
            Line::from(Span::styled(clip(&icon.label, icon_w as usize), normal_style())),
        ];
        f.render_widget(Paragraph::new(lines), rect);
    }
}

fn draw_window(f: &mut Frame, session: &Session, ui: &DesktopUi, win: &WindowInstance, area: Rect, focused: bool) {
    if area.width < 8 || area.height < 4 {
        return;
    }
    f.render_widget(Clear, area);
    let border_style = if focused { title_style() } else { dim_style() };
    f.render_widget(Block::default().borders(Borders::ALL).style(border_style), area);

    let mut chars: Vec<char> = vec![' '; area.width.saturating_sub(2) as usize];
    write_text(&mut chars, 0, &format!(" {} {} ", win.icon, win.title));
    let max_button = if win.maximized { TITLE_RESTORE_BUTTON } else { TITLE_MAX_BUTTON };
    let buttons = format!("{TITLE_MIN_BUTTON}{max_button}{TITLE_CLOSE_BUTTON}");
    if chars.len() >= buttons.len() {
        let button_x = chars.len() - buttons.len();
        write_text(&mut chars, button_x, &buttons);
    }
    let title_line: String = chars.into_iter().collect();
    let title_color = if focused { sel_style() } else { dim_style() };
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(title_line, title_color))),
        Rect {
            x: area.x + 1,
            y: area.y,
            width: area.width - 2,
            height: 1,
        },
    );

    let inner = content_rect(area);
    let lines = if win.content_state == ContentState::Pending {
        vec![Line::from(Span::styled("Loading…", dim_style()))]
    } else {
        window_lines(session, ui, &win.id, inner, focused)
    };
    f.render_widget(Paragraph::new(lines), inner);
}

fn styled(text: impl Into<String>, style: ratatui::style::Style) -> Line<'static> {
    Line::from(Span::styled(text.into(), style))
}

fn window_lines(session: &Session, ui: &DesktopUi, id: &WindowId, inner: Rect, focused: bool) -> Vec<Line<'static>> {
    let width = inner.width as usize;
    if id.plugin_id().is_some() {
        return plugin_lines(session, id, width);
    }
    match id.as_str() {
        "chat" => chat_lines(session, ui, inner, focused),
        "player" => player_lines(session, ui, width, focused),
        "monitor" => monitor_lines(session, width),
        "settings" => settings_lines(session),
        "plugins" => catalog_lines(session, ui, width),
        "files" => {
            let path = session.files_path().unwrap_or("~");
            vec![
                styled(format!("📂 {}", clip(path, width.saturating_sub(3))), title_style()),
                styled("", normal_style()),
                styled("Files live on the server; open one from a notification.", dim_style()),
            ]
        }
        "calendar" => calendar_lines(),
        "terminal" => vec![
            styled("daria@desktop:~$ ", normal_style()),
            styled("(terminal sessions run on the server)", dim_style()),
        ],
        "browser" => vec![styled("🌐 about:blank", normal_style())],
        "games" => vec![
            styled("🎮 Games", title_style()),
            styled("Ask Daria in chat to play something.", dim_style()),
        ],
        _ => Vec::new(),
    }
}

fn chat_lines(session: &Session, ui: &DesktopUi, inner: Rect, focused: bool) -> Vec<Line<'static>> {
    let show_list = inner.width >= CHAT_LIST_WIDTH * 3;
    let text_w = if show_list {
        (inner.width - CHAT_LIST_WIDTH - 1) as usize
    } else {
        inner.width as usize
    };
    let body_h = inner.height.saturating_sub(2) as usize;

    let mut body: Vec<Line<'static>> = Vec::new();
    for message in &session.chat().current().messages {
        let (prefix, style) = match message.role {
            Role::User => ("You: ", normal_style()),
            Role::Assistant => ("Daria: ", title_style()),
            Role::System => ("! ", error_style()),
        };
        let text = match &message.body {
            MessageBody::Text(text) => format!("{prefix}{text}"),
            MessageBody::Image(src) => format!("{prefix}[image] {src}"),
            MessageBody::JobCard(card) => format!("{prefix}{}", job_card_text(session, *card)),
        };
        body.extend(wrap(&text, text_w).into_iter().map(|l| styled(l, style)));
    }
    if session.chat().is_waiting() {
        body.push(styled("Daria is typing…", dim_style()));
    }
    let skip = body.len().saturating_sub(body_h);
    let mut body: Vec<Line<'static>> = body.into_iter().skip(skip).collect();
    while body.len() < body_h {
        body.push(styled("", normal_style()));
    }
    body.push(styled("─".repeat(text_w), dim_style()));
    let prompt = if focused { format!("> {}_", ui.input) } else { "> ".to_string() };
    body.push(styled(clip(&prompt, text_w), normal_style()));

    if !show_list {
        return body;
    }
    let current = session.chat().current_id();
    let list: Vec<String> = session
        .chat()
        .list()
        .iter()
        .map(|c| {
            let label = if c.preview.is_empty() { c.id.as_str() } else { c.preview.as_str() };
            let mark = if Some(c.id.as_str()) == current { '>' } else { ' ' };
            format!("{mark}{:<w$}", clip(label, CHAT_LIST_WIDTH as usize - 1), w = CHAT_LIST_WIDTH as usize - 1)
        })
        .collect();
    body.into_iter()
        .enumerate()
        .map(|(i, line)| {
            let left = list
                .get(i)
                .cloned()
                .unwrap_or_else(|| " ".repeat(CHAT_LIST_WIDTH as usize));
            let mut spans = vec![Span::styled(left, dim_style()), Span::styled("│", dim_style())];
            spans.extend(line.spans);
            Line::from(spans)
        })
        .collect()
}

fn job_card_text(session: &Session, card: u64) -> String {
    let Some(card) = session.jobs().get(card) else {
        return "🎨 (gone)".to_string();
    };
    match &card.state {
        CardState::Submitting => format!("🎨 \"{}\": getting the brushes…", card.prompt),
        CardState::Running { progress, phase } => format!("🎨 {phase} {} {progress:.0}%", bar(*progress, 10)),
        CardState::Done { url, message } => match message {
            Some(message) => format!("🖼 {message} {url}"),
            None => format!("🖼 {url}"),
        },
        CardState::Failed { error } => format!("🎨 ✗ {error}"),
    }
}

fn player_lines(session: &Session, ui: &DesktopUi, width: usize, focused: bool) -> Vec<Line<'static>> {
    let player = session.player();
    let now_playing = player
        .current()
        .map(|t| format!("▶ {}", t.title))
        .unwrap_or_else(|| "■ nothing playing".to_string());
    let mut lines = vec![
        styled(clip(&now_playing, width), title_style()),
        styled("─".repeat(width), dim_style()),
    ];
    for (i, track) in player.tracks().iter().enumerate() {
        let mark = if Some(i) == player.index() { '>' } else { ' ' };
        let duration = if track.duration_sec > 0 {
            format!(" {}:{:02}", track.duration_sec / 60, track.duration_sec % 60)
        } else {
            String::new()
        };
        let style = if mark == '>' { sel_style() } else { normal_style() };
        lines.push(styled(clip(&format!("{mark} {}{duration}", track.title), width), style));
    }
    if focused {
        lines.push(styled(clip(&format!("add: {}_", ui.input), width), normal_style()));
    }
    lines
}

fn monitor_lines(session: &Session, width: usize) -> Vec<Line<'static>> {
    let Some(info) = session.system_info() else {
        return vec![styled("no data yet", dim_style())];
    };
    let bar_w = width.saturating_sub(16).max(4);
    [("CPU", info.cpu_percent), ("Memory", info.memory_percent), ("Disk", info.disk_percent)]
        .into_iter()
        .map(|(label, value)| match value {
            Some(v) => styled(format!("{label:<7}{} {v:>3.0}%", bar(v, bar_w)), normal_style()),
            None => styled(format!("{label:<7}n/a"), dim_style()),
        })
        .collect()
}

fn settings_lines(session: &Session) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    match session.settings() {
        Some(settings) => {
            lines.push(styled(format!("Theme:      {}", settings.theme.as_deref().unwrap_or("default")), normal_style()));
            lines.push(styled(format!("Icon pack:  {}", settings.icon_pack.as_deref().unwrap_or("default")), normal_style()));
            let attention = if settings.attention_enabled.unwrap_or(true) { "on" } else { "off" };
            lines.push(styled(format!("Attention:  {attention}   [a] toggle"), normal_style()));
        }
        None => lines.push(styled("settings unavailable", dim_style())),
    }
    lines.push(styled("", normal_style()));
    lines.push(styled(format!("Server:     {}", session.config().server_url), dim_style()));
    if let Some(status) = session.status() {
        let flag = |on: bool| if on { "ok" } else { "off" };
        lines.push(styled(
            format!(
                "brain {}  memory {}  plugins {}  llm {}",
                flag(status.brain),
                flag(status.memory),
                flag(status.plugins),
                flag(status.llm.available)
            ),
            dim_style(),
        ));
    }
    lines
}

fn catalog_lines(session: &Session, ui: &DesktopUi, width: usize) -> Vec<Line<'static>> {
    if session.catalog().is_empty() {
        return vec![styled("The store is empty.", dim_style())];
    }
    let mut lines = Vec::new();
    for (i, entry) in session.catalog().iter().enumerate() {
        let state = if entry.update_available {
            "update [U]"
        } else if entry.installed {
            "installed [u]"
        } else {
            "[i] install"
        };
        let head = format!("{} {} v{}  {state}", entry.icon, entry.name, entry.version);
        let style = if i == ui.catalog_sel { sel_style() } else { title_style() };
        lines.push(styled(clip(&head, width), style));
        lines.push(styled(clip(&format!("  {}", entry.description), width), dim_style()));
    }
    lines
}

fn plugin_lines(session: &Session, id: &WindowId, width: usize) -> Vec<Line<'static>> {
    let Some(data) = session.plugin_data(id) else {
        return vec![styled("This plugin has nothing to show.", dim_style())];
    };
    let mut lines = Vec::new();
    if let Some(description) = data.manifest.get("description").and_then(|v| v.as_str()) {
        lines.extend(wrap(description, width).into_iter().map(|l| styled(l, dim_style())));
        lines.push(styled("", normal_style()));
    }
    let pretty = serde_json::to_string_pretty(&data.data).unwrap_or_default();
    lines.extend(pretty.lines().map(|l| styled(clip(l, width), normal_style())));
    lines
}

fn calendar_lines() -> Vec<Line<'static>> {
    let today = Local::now().date_naive();
    let Some(first) = NaiveDate::from_ymd_opt(today.year(), today.month(), 1) else {
        return Vec::new();
    };
    let mut lines = vec![
        styled(today.format("%B %Y").to_string(), title_style()),
        styled("Mo Tu We Th Fr Sa Su", dim_style()),
    ];
    let offset = first.weekday().num_days_from_monday() as usize;
    let mut cells: Vec<String> = vec!["  ".to_string(); offset];
    let mut day = first;
    while day.month() == today.month() {
        cells.push(format!("{:>2}", day.day()));
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    for week in cells.chunks(7) {
        let spans: Vec<Span<'static>> = week
            .iter()
            .enumerate()
            .flat_map(|(i, cell)| {
                let style = if cell.trim() == today.day().to_string() { sel_style() } else { normal_style() };
                let sep = if i == 0 { "" } else { " " };
                [Span::styled(sep.to_string(), normal_style()), Span::styled(cell.clone(), style)]
            })
            .collect();
        lines.push(Line::from(spans));
    }
    lines
}

fn draw_toasts(f: &mut Frame, session: &Session, desk: Rect) {
    for (toast, rect) in session.toasts().iter().zip(toast_rects(desk, session.toasts().len())) {
        f.render_widget(Clear, rect);
        let title = format!(" {} {} ", toast.event.icon, toast.event.title);
        f.render_widget(
            Block::default()
                .borders(Borders::ALL)
                .title(Span::styled(clip(&title, rect.width.saturating_sub(2) as usize), sel_style()))
                .style(title_style()),
            rect,
        );
        let inner = content_rect(rect);
        let lines: Vec<Line> = wrap(&toast.event.message, inner.width as usize)
            .into_iter()
            .take(inner.height as usize)
            .map(|l| styled(l, normal_style()))
            .collect();
        f.render_widget(Paragraph::new(lines), inner);
    }
}

fn draw_taskbar(f: &mut Frame, session: &Session, ui: &DesktopUi, area: Rect) {
    if area.height == 0 || area.width == 0 {
        return;
    }
    let mut row = vec![' '; area.width as usize];
    write_text_in_area(&mut row, area, area.x, TASK_START_BUTTON);
    write_text_in_area(&mut row, area, area.x + start_button_rect(area).width, TASK_START_SEPARATOR);

    let layout = taskbar_layout(session, ui.task_scroll, area);
    if let Some(prev) = layout.prev {
        let text = if ui.task_scroll > 0 { TASK_PAGER_PREV } else { "   " };
        write_text_in_area(&mut row, area, prev.x, text);
    }
    if let Some(next) = layout.next {
        let text = if layout.can_scroll_right { TASK_PAGER_NEXT } else { "   " };
        write_text_in_area(&mut row, area, next.x, text);
    }
    for button in &layout.buttons {
        if let Some(entry) = session.wm().taskbar().iter().find(|e| e.id == button.window) {
            let text = task_button_text(&entry.title, &entry.icon, entry.active, entry.minimized);
            write_text_in_area(&mut row, area, button.rect.x, &text);
        }
    }
    let line: String = row.into_iter().collect();
    f.render_widget(Paragraph::new(Line::from(Span::styled(line, sel_style()))), area);
}

fn draw_start_menu(f: &mut Frame, session: &Session, ui: &DesktopUi, size: Rect) {
    let entries = start_entries(session);
    let rect = start_menu_rect(size, entries.len());
    if rect.height < 3 {
        return;
    }
    f.render_widget(Clear, rect);
    f.render_widget(
        Block::default()
            .borders(Borders::ALL)
            .title(Span::styled(" Daria ", title_style()))
            .style(normal_style()),
        rect,
    );
    let inner = content_rect(rect);
    let lines: Vec<Line> = entries
        .iter()
        .enumerate()
        .take(inner.height as usize)
        .map(|(i, entry)| {
            let style = if i == ui.start.selected { sel_style() } else { normal_style() };
            styled(clip(&format!(" {}", start_entry_label(entry)), inner.width as usize), style)
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}
