//! Pixel geometry for windows and icons.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WinRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl WinRect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(self) -> i32 {
        self.x + self.w
    }

    pub fn bottom(self) -> i32 {
        self.y + self.h
    }

    pub fn contains(self, px: i32, py: i32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    pub fn translated(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn rect(self) -> WinRect {
        WinRect::new(0, 0, self.width.max(1), self.height.max(1))
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280, 800)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeCorner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Keep a window inside the desk and at least `min_w`×`min_h`.
/// A desk smaller than the floor wins over the floor.
pub fn clamp_window_with_min(rect: &mut WinRect, desk: WinRect, min_w: i32, min_h: i32) {
    if desk.w <= 0 || desk.h <= 0 {
        return;
    }
    let min_w = min_w.min(desk.w).max(1);
    let min_h = min_h.min(desk.h).max(1);

    rect.w = rect.w.min(desk.w).max(min_w);
    rect.h = rect.h.min(desk.h).max(min_h);

    let max_x = desk.right() - rect.w;
    let max_y = desk.bottom() - rect.h;
    rect.x = rect.x.clamp(desk.x, max_x.max(desk.x));
    rect.y = rect.y.clamp(desk.y, max_y.max(desk.y));
}

/// Resize `origin` by dragging `corner` by (`dx`, `dy`). The opposite corner
/// stays put; the dragged edges stop at the size floor and the desk edge.
pub fn apply_corner_resize(
    origin: WinRect,
    corner: ResizeCorner,
    dx: i32,
    dy: i32,
    desk: WinRect,
    min_w: i32,
    min_h: i32,
) -> WinRect {
    let min_w = min_w.max(1);
    let min_h = min_h.max(1);

    let mut left = origin.x;
    let mut top = origin.y;
    let mut right = origin.right();
    let mut bottom = origin.bottom();

    match corner {
        ResizeCorner::TopLeft => {
            left = (left + dx).clamp(desk.x.min(right - min_w), right - min_w);
            top = (top + dy).clamp(desk.y.min(bottom - min_h), bottom - min_h);
        }
        ResizeCorner::TopRight => {
            right = (right + dx).clamp(left + min_w, desk.right().max(left + min_w));
            top = (top + dy).clamp(desk.y.min(bottom - min_h), bottom - min_h);
        }
        ResizeCorner::BottomLeft => {
            left = (left + dx).clamp(desk.x.min(right - min_w), right - min_w);
            bottom = (bottom + dy).clamp(top + min_h, desk.bottom().max(top + min_h));
        }
        ResizeCorner::BottomRight => {
            right = (right + dx).clamp(left + min_w, desk.right().max(left + min_w));
            bottom = (bottom + dy).clamp(top + min_h, desk.bottom().max(top + min_h));
        }
    }

    WinRect::new(left, top, right - left, bottom - top)
}
