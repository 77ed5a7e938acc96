//! Window registry: stacking order, geometry, taskbar mirror.
//!
//! Every window is keyed by its logical [`WindowId`]; at most one instance
//! per id is alive. Z-indexes come from a counter that only grows, so the
//! last focused window is always on top and a z value is never reused.

use std::time::{Duration, Instant};

use crate::catalog::{ContentSource, WindowId, WindowSpec};
use crate::geometry::{
    apply_corner_resize, clamp_window_with_min, ResizeCorner, Viewport, WinRect,
};

pub const CASCADE_BASE_X: i32 = 80;
pub const CASCADE_BASE_Y: i32 = 40;
pub const CASCADE_STEP: i32 = 20;
pub const MIN_WINDOW_W: i32 = 320;
pub const MIN_WINDOW_H: i32 = 220;
pub const SHAKE_DURATION: Duration = Duration::from_millis(180);
const SHAKE_AMPLITUDE: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentState {
    Pending,
    Loaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEffect {
    Shake { started: Instant, until: Instant },
}

#[derive(Debug, Clone)]
pub struct WindowInstance {
    pub id: WindowId,
    pub title: String,
    pub icon: String,
    pub rect: WinRect,
    restore_rect: Option<WinRect>,
    pub z: u64,
    pub minimized: bool,
    pub maximized: bool,
    pub focused: bool,
    pub last_focus_at: Instant,
    pub content_state: ContentState,
    pub content_source: ContentSource,
    pub effect: Option<WindowEffect>,
}

impl WindowInstance {
    /// Horizontal jitter applied while a shake is running.
    pub fn shake_offset(&self, now: Instant) -> i32 {
        match self.effect {
            Some(WindowEffect::Shake { started, until }) if now < until => {
                let phase = now.duration_since(started).as_millis() / 30;
                if phase % 2 == 0 {
                    SHAKE_AMPLITUDE
                } else {
                    -SHAKE_AMPLITUDE
                }
            }
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskbarEntry {
    pub id: WindowId,
    pub title: String,
    pub icon: String,
    pub active: bool,
    pub minimized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// New instance; its content still has to be fetched from `ContentSource`.
    Created(ContentSource),
    Reused,
}

#[derive(Debug, Clone, Copy)]
enum DragAction {
    Move {
        grab_dx: i32,
        grab_dy: i32,
    },
    Resize {
        corner: ResizeCorner,
        origin: WinRect,
        press_x: i32,
        press_y: i32,
    },
}

#[derive(Debug, Clone)]
struct DragState {
    window: WindowId,
    action: DragAction,
}

#[derive(Debug)]
pub struct WindowManager {
    windows: Vec<WindowInstance>,
    taskbar: Vec<TaskbarEntry>,
    z_counter: u64,
    viewport: Viewport,
    mobile_breakpoint: i32,
    force_mobile: bool,
    dragging: Option<DragState>,
}

impl WindowManager {
    pub fn new(viewport: Viewport, mobile_breakpoint: i32) -> Self {
        Self {
            windows: Vec::new(),
            taskbar: Vec::new(),
            z_counter: 0,
            viewport,
            mobile_breakpoint,
            force_mobile: false,
            dragging: None,
        }
    }

    pub fn set_force_mobile(&mut self, on: bool) {
        self.force_mobile = on;
        self.relayout();
    }

    pub fn is_mobile(&self) -> bool {
        self.force_mobile || self.viewport.width < self.mobile_breakpoint
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.relayout();
    }

    fn relayout(&mut self) {
        let desk = self.viewport.rect();
        let mobile = self.is_mobile();
        for win in &mut self.windows {
            if mobile || win.maximized {
                win.rect = desk;
            } else {
                clamp_window_with_min(&mut win.rect, desk, MIN_WINDOW_W, MIN_WINDOW_H);
            }
        }
        if mobile {
            self.dragging = None;
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn contains(&self, id: &WindowId) -> bool {
        self.windows.iter().any(|w| &w.id == id)
    }

    pub fn get(&self, id: &WindowId) -> Option<&WindowInstance> {
        self.windows.iter().find(|w| &w.id == id)
    }

    fn get_mut(&mut self, id: &WindowId) -> Option<&mut WindowInstance> {
        self.windows.iter_mut().find(|w| &w.id == id)
    }

    /// Windows in the order they were opened.
    pub fn windows(&self) -> impl Iterator<Item = &WindowInstance> {
        self.windows.iter()
    }

    /// Visible windows from bottom to top.
    pub fn stacked(&self) -> Vec<&WindowInstance> {
        let mut out: Vec<&WindowInstance> = self.windows.iter().filter(|w| !w.minimized).collect();
        out.sort_by_key(|w| w.z);
        out
    }

    pub fn focused_id(&self) -> Option<&WindowId> {
        self.windows.iter().find(|w| w.focused).map(|w| &w.id)
    }

    pub fn is_open_and_visible(&self, id: &WindowId) -> bool {
        self.get(id).is_some_and(|w| !w.minimized)
    }

    pub fn taskbar(&self) -> &[TaskbarEntry] {
        &self.taskbar
    }

    pub fn topmost_at(&self, px: i32, py: i32) -> Option<&WindowInstance> {
        self.stacked()
            .into_iter()
            .rev()
            .find(|w| w.rect.contains(px, py))
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging.is_some()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    pub fn open(&mut self, id: WindowId, spec: &WindowSpec, now: Instant) -> OpenOutcome {
        if self.contains(&id) {
            if let Some(win) = self.get_mut(&id) {
                win.minimized = false;
            }
            self.focus(&id, now);
            return OpenOutcome::Reused;
        }

        let n = self.windows.len() as i32;
        let desk = self.viewport.rect();
        let rect = if self.is_mobile() {
            desk
        } else {
            let mut rect = WinRect::new(
                CASCADE_BASE_X + n * CASCADE_STEP,
                CASCADE_BASE_Y + n * CASCADE_STEP,
                spec.width,
                spec.height,
            );
            clamp_window_with_min(&mut rect, desk, MIN_WINDOW_W, MIN_WINDOW_H);
            rect
        };
        let content_state = match spec.content {
            ContentSource::Template => ContentState::Loaded,
            _ => ContentState::Pending,
        };

        self.windows.push(WindowInstance {
            id: id.clone(),
            title: spec.title.clone(),
            icon: spec.icon.clone(),
            rect,
            restore_rect: None,
            z: 0,
            minimized: false,
            maximized: false,
            focused: false,
            last_focus_at: now,
            content_state,
            content_source: spec.content,
            effect: None,
        });
        self.taskbar.push(TaskbarEntry {
            id: id.clone(),
            title: spec.title.clone(),
            icon: spec.icon.clone(),
            active: false,
            minimized: false,
        });
        self.focus(&id, now);
        OpenOutcome::Created(spec.content)
    }

    pub fn focus(&mut self, id: &WindowId, now: Instant) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.z_counter += 1;
        let z = self.z_counter;
        for win in &mut self.windows {
            if &win.id == id {
                win.focused = true;
                win.z = z;
                win.last_focus_at = now;
            } else {
                win.focused = false;
            }
        }
        self.sync_taskbar();
        true
    }

    pub fn minimize(&mut self, id: &WindowId) -> bool {
        let Some(win) = self.get_mut(id) else {
            return false;
        };
        win.minimized = true;
        win.focused = false;
        if self.dragging.as_ref().is_some_and(|d| &d.window == id) {
            self.dragging = None;
        }
        self.sync_taskbar();
        true
    }

    pub fn toggle_maximize(&mut self, id: &WindowId) -> bool {
        let desk = self.viewport.rect();
        let mobile = self.is_mobile();
        let Some(win) = self.get_mut(id) else {
            return false;
        };
        if win.maximized {
            win.maximized = false;
            if let Some(prev) = win.restore_rect.take() {
                win.rect = prev;
            }
            if mobile {
                win.rect = desk;
            } else {
                clamp_window_with_min(&mut win.rect, desk, MIN_WINDOW_W, MIN_WINDOW_H);
            }
        } else {
            win.restore_rect = Some(win.rect);
            win.maximized = true;
            win.minimized = false;
            win.rect = desk;
        }
        self.sync_taskbar();
        true
    }

    /// Taskbar button: bring back a hidden or background window, or hide the
    /// one that already has focus.
    pub fn activate_from_taskbar(&mut self, id: &WindowId, now: Instant) -> bool {
        let Some(win) = self.get(id) else {
            return false;
        };
        if win.focused && !win.minimized {
            return self.minimize(id);
        }
        if let Some(win) = self.get_mut(id) {
            win.minimized = false;
        }
        self.focus(id, now)
    }

    pub fn close(&mut self, id: &WindowId) -> Option<WindowInstance> {
        let pos = self.windows.iter().position(|w| &w.id == id)?;
        let removed = self.windows.remove(pos);
        self.taskbar.retain(|t| &t.id != id);
        if self.dragging.as_ref().is_some_and(|d| &d.window == id) {
            self.dragging = None;
        }
        Some(removed)
    }

    pub fn mark_loaded(&mut self, id: &WindowId) -> bool {
        match self.get_mut(id) {
            Some(win) => {
                win.content_state = ContentState::Loaded;
                true
            }
            None => false,
        }
    }

    fn sync_taskbar(&mut self) {
        for entry in &mut self.taskbar {
            if let Some(win) = self.windows.iter().find(|w| w.id == entry.id) {
                entry.active = win.focused;
                entry.minimized = win.minimized;
            }
        }
    }

    // ── Pointer interaction ───────────────────────────────────────────────────

    fn can_drag(&self, id: &WindowId) -> bool {
        !self.is_mobile() && self.get(id).is_some_and(|w| !w.maximized && !w.minimized)
    }

    /// Header press at (`px`, `py`).
    pub fn begin_move(&mut self, id: &WindowId, px: i32, py: i32) -> bool {
        if !self.can_drag(id) {
            return false;
        }
        let Some(rect) = self.get(id).map(|w| w.rect) else {
            return false;
        };
        self.dragging = Some(DragState {
            window: id.clone(),
            action: DragAction::Move {
                grab_dx: px - rect.x,
                grab_dy: py - rect.y,
            },
        });
        true
    }

    pub fn begin_resize(&mut self, id: &WindowId, corner: ResizeCorner, px: i32, py: i32) -> bool {
        if !self.can_drag(id) {
            return false;
        }
        let Some(origin) = self.get(id).map(|w| w.rect) else {
            return false;
        };
        self.dragging = Some(DragState {
            window: id.clone(),
            action: DragAction::Resize {
                corner,
                origin,
                press_x: px,
                press_y: py,
            },
        });
        true
    }

    pub fn drag_to(&mut self, px: i32, py: i32) {
        let Some(drag) = self.dragging.clone() else {
            return;
        };
        if !self.contains(&drag.window) {
            self.dragging = None;
            return;
        }
        let desk = self.viewport.rect();
        let Some(win) = self.get_mut(&drag.window) else {
            return;
        };
        match drag.action {
            DragAction::Move { grab_dx, grab_dy } => {
                win.rect.x = px - grab_dx;
                win.rect.y = py - grab_dy;
                clamp_window_with_min(&mut win.rect, desk, MIN_WINDOW_W, MIN_WINDOW_H);
            }
            DragAction::Resize {
                corner,
                origin,
                press_x,
                press_y,
            } => {
                win.rect = apply_corner_resize(
                    origin,
                    corner,
                    px - press_x,
                    py - press_y,
                    desk,
                    MIN_WINDOW_W,
                    MIN_WINDOW_H,
                );
            }
        }
    }

    /// Release: the current geometry becomes the window's geometry.
    pub fn end_drag(&mut self) -> Option<WindowId> {
        self.dragging.take().map(|d| d.window)
    }

    // ── Programmatic geometry ─────────────────────────────────────────────────

    pub fn move_by(&mut self, id: &WindowId, dx: i32, dy: i32) -> bool {
        if !self.can_drag(id) {
            return false;
        }
        let desk = self.viewport.rect();
        let Some(win) = self.get_mut(id) else {
            return false;
        };
        win.rect = win.rect.translated(dx, dy);
        clamp_window_with_min(&mut win.rect, desk, MIN_WINDOW_W, MIN_WINDOW_H);
        true
    }

    pub fn resize_by(&mut self, id: &WindowId, dw: i32, dh: i32) -> bool {
        if !self.can_drag(id) {
            return false;
        }
        let desk = self.viewport.rect();
        let Some(win) = self.get_mut(id) else {
            return false;
        };
        win.rect.w += dw;
        win.rect.h += dh;
        clamp_window_with_min(&mut win.rect, desk, MIN_WINDOW_W, MIN_WINDOW_H);
        true
    }

    pub fn shake(&mut self, id: &WindowId, now: Instant) -> bool {
        let Some(win) = self.get_mut(id) else {
            return false;
        };
        win.effect = Some(WindowEffect::Shake {
            started: now,
            until: now + SHAKE_DURATION,
        });
        true
    }

    pub fn expire_effects(&mut self, now: Instant) {
        for win in &mut self.windows {
            if let Some(WindowEffect::Shake { until, .. }) = win.effect {
                if now >= until {
                    win.effect = None;
                }
            }
        }
    }

    /// Visible, unfocused windows whose last focus is older than `threshold`.
    pub fn stale_windows(&self, now: Instant, threshold: Duration) -> Vec<WindowId> {
        self.windows
            .iter()
            .filter(|w| !w.minimized && !w.focused)
            .filter(|w| now.saturating_duration_since(w.last_focus_at) > threshold)
            .map(|w| w.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builtin_spec;

    fn wm() -> WindowManager {
        WindowManager::new(Viewport::new(1280, 800), 768)
    }

    fn open(wm: &mut WindowManager, id: &str, now: Instant) -> OpenOutcome {
        let id = WindowId::new(id);
        let spec = builtin_spec(&id).unwrap();
        wm.open(id, &spec, now)
    }

    #[test]
    fn repeated_open_keeps_a_single_instance() {
        let mut wm = wm();
        let now = Instant::now();
        assert!(matches!(open(&mut wm, "chat", now), OpenOutcome::Created(_)));
        for _ in 0..5 {
            assert_eq!(open(&mut wm, "chat", now), OpenOutcome::Reused);
        }
        assert_eq!(wm.len(), 1);
        assert_eq!(wm.taskbar().len(), 1);
    }

    #[test]
    fn reopening_a_minimized_window_restores_and_focuses_it() {
        let mut wm = wm();
        let now = Instant::now();
        open(&mut wm, "chat", now);
        open(&mut wm, "files", now);
        let chat = WindowId::new("chat");
        wm.minimize(&chat);
        assert!(wm.get(&chat).unwrap().minimized);
        open(&mut wm, "chat", now);
        let win = wm.get(&chat).unwrap();
        assert!(!win.minimized);
        assert!(win.focused);
    }

    #[test]
    fn new_windows_cascade_from_the_window_count() {
        let mut wm = wm();
        let now = Instant::now();
        open(&mut wm, "chat", now);
        open(&mut wm, "files", now);
        open(&mut wm, "player", now);
        let player = wm.get(&WindowId::new("player")).unwrap();
        assert_eq!((player.rect.x, player.rect.y), (80 + 2 * 20, 40 + 2 * 20));
    }

    #[test]
    fn focus_raises_z_and_moves_the_single_focus() {
        let mut wm = wm();
        let now = Instant::now();
        open(&mut wm, "chat", now);
        open(&mut wm, "files", now);
        let a = WindowId::new("chat");
        let b = WindowId::new("files");
        wm.focus(&a, now);
        wm.focus(&b, now);
        let za = wm.get(&a).unwrap().z;
        let zb = wm.get(&b).unwrap().z;
        assert!(zb > za);
        assert!(!wm.get(&a).unwrap().focused);
        assert_eq!(wm.windows().filter(|w| w.focused).count(), 1);
        let active: Vec<_> = wm.taskbar().iter().filter(|t| t.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b);
    }

    #[test]
    fn z_never_repeats_even_when_refocusing_the_same_window() {
        let mut wm = wm();
        let now = Instant::now();
        open(&mut wm, "chat", now);
        let chat = WindowId::new("chat");
        let mut last = wm.get(&chat).unwrap().z;
        for _ in 0..3 {
            wm.focus(&chat, now);
            let z = wm.get(&chat).unwrap().z;
            assert!(z > last);
            last = z;
        }
    }

    #[test]
    fn close_drops_instance_and_taskbar_entry() {
        let mut wm = wm();
        let now = Instant::now();
        open(&mut wm, "chat", now);
        open(&mut wm, "files", now);
        let chat = WindowId::new("chat");
        assert!(wm.close(&chat).is_some());
        assert!(!wm.contains(&chat));
        assert!(wm.taskbar().iter().all(|t| t.id != chat));
        assert_eq!(wm.taskbar().len(), wm.len());
        assert!(wm.close(&chat).is_none());
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let mut wm = wm();
        let ghost = WindowId::new("ghost");
        let now = Instant::now();
        assert!(!wm.focus(&ghost, now));
        assert!(!wm.minimize(&ghost));
        assert!(!wm.toggle_maximize(&ghost));
        assert!(!wm.begin_move(&ghost, 0, 0));
        assert!(!wm.mark_loaded(&ghost));
    }

    #[test]
    fn maximize_toggles_and_restores_geometry() {
        let mut wm = wm();
        let now = Instant::now();
        open(&mut wm, "chat", now);
        let chat = WindowId::new("chat");
        let before = wm.get(&chat).unwrap().rect;
        wm.toggle_maximize(&chat);
        assert_eq!(wm.get(&chat).unwrap().rect, Viewport::new(1280, 800).rect());
        wm.toggle_maximize(&chat);
        assert_eq!(wm.get(&chat).unwrap().rect, before);
    }

    #[test]
    fn maximizing_a_minimized_window_updates_its_taskbar_entry() {
        let mut wm = wm();
        let now = Instant::now();
        open(&mut wm, "chat", now);
        let chat = WindowId::new("chat");
        wm.minimize(&chat);
        assert!(wm.taskbar()[0].minimized);

        assert!(wm.toggle_maximize(&chat));
        let win = wm.get(&chat).unwrap();
        assert!(win.maximized);
        assert!(!win.minimized);
        assert!(!wm.taskbar()[0].minimized);
    }

    #[test]
    fn drag_moves_window_by_pointer_delta() {
        let mut wm = wm();
        let now = Instant::now();
        open(&mut wm, "chat", now);
        let chat = WindowId::new("chat");
        let start = wm.get(&chat).unwrap().rect;
        assert!(wm.begin_move(&chat, start.x + 10, start.y + 5));
        wm.drag_to(start.x + 110, start.y + 55);
        assert_eq!(wm.end_drag(), Some(chat.clone()));
        let rect = wm.get(&chat).unwrap().rect;
        assert_eq!((rect.x, rect.y), (start.x + 100, start.y + 50));
    }

    #[test]
    fn maximized_windows_cannot_be_dragged() {
        let mut wm = wm();
        let now = Instant::now();
        open(&mut wm, "chat", now);
        let chat = WindowId::new("chat");
        wm.toggle_maximize(&chat);
        assert!(!wm.begin_move(&chat, 100, 50));
    }

    #[test]
    fn resize_stops_at_minimum_floor() {
        let mut wm = wm();
        let now = Instant::now();
        open(&mut wm, "chat", now);
        let chat = WindowId::new("chat");
        let rect = wm.get(&chat).unwrap().rect;
        assert!(wm.begin_resize(&chat, ResizeCorner::BottomRight, rect.right(), rect.bottom()));
        wm.drag_to(rect.x, rect.y);
        wm.end_drag();
        let rect = wm.get(&chat).unwrap().rect;
        assert_eq!((rect.w, rect.h), (MIN_WINDOW_W, MIN_WINDOW_H));
    }

    #[test]
    fn mobile_mode_forces_full_screen_and_disables_drag() {
        let mut wm = WindowManager::new(Viewport::new(600, 900), 768);
        let now = Instant::now();
        open(&mut wm, "chat", now);
        let chat = WindowId::new("chat");
        assert_eq!(wm.get(&chat).unwrap().rect, Viewport::new(600, 900).rect());
        assert!(!wm.begin_move(&chat, 10, 10));
        assert!(!wm.begin_resize(&chat, ResizeCorner::TopLeft, 0, 0));
    }

    #[test]
    fn taskbar_click_toggles_between_minimized_and_focused() {
        let mut wm = wm();
        let now = Instant::now();
        open(&mut wm, "chat", now);
        let chat = WindowId::new("chat");
        wm.activate_from_taskbar(&chat, now);
        assert!(wm.get(&chat).unwrap().minimized);
        assert!(wm.taskbar()[0].minimized);
        wm.activate_from_taskbar(&chat, now);
        let win = wm.get(&chat).unwrap();
        assert!(!win.minimized && win.focused);
    }

    #[test]
    fn shake_reverts_after_its_duration() {
        let mut wm = wm();
        let now = Instant::now();
        open(&mut wm, "files", now);
        let files = WindowId::new("files");
        wm.shake(&files, now);
        assert_ne!(wm.get(&files).unwrap().shake_offset(now), 0);
        let later = now + Duration::from_millis(200);
        wm.expire_effects(later);
        let win = wm.get(&files).unwrap();
        assert!(win.effect.is_none());
        assert_eq!(win.shake_offset(later), 0);
    }

    #[test]
    fn stale_windows_exclude_focused_and_minimized() {
        let mut wm = wm();
        let t0 = Instant::now();
        open(&mut wm, "chat", t0);
        open(&mut wm, "files", t0);
        open(&mut wm, "player", t0);
        wm.minimize(&WindowId::new("files"));
        let later = t0 + Duration::from_secs(21 * 60);
        let stale = wm.stale_windows(later, Duration::from_secs(20 * 60));
        assert_eq!(stale, vec![WindowId::new("chat")]);
    }
}
