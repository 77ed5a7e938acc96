use anyhow::Result;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::Rect,
    style::{Color, Modifier, Style},
    Terminal,
};
use std::io::{stdout, Stdout};

use crate::config::current_theme_color;
use crate::geometry::{Viewport, WinRect};

pub type Term = Terminal<CrosstermBackend<Stdout>>;

// ── Terminal setup / teardown ─────────────────────────────────────────────────

pub fn init_terminal() -> Result<Term> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;
    Ok(terminal)
}

pub fn restore_terminal(terminal: &mut Term) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

// ── Color helpers ─────────────────────────────────────────────────────────────

pub fn normal_style()   -> Style { Style::default().fg(current_theme_color()) }
pub fn sel_style()      -> Style { Style::default().fg(Color::Black).bg(current_theme_color()).add_modifier(Modifier::BOLD) }
pub fn title_style()    -> Style { Style::default().fg(current_theme_color()).add_modifier(Modifier::BOLD) }
pub fn dim_style()      -> Style { Style::default().fg(current_theme_color()).add_modifier(Modifier::DIM) }
pub fn error_style()    -> Style { Style::default().fg(Color::LightRed) }

// ── Pixel ↔ cell mapping ──────────────────────────────────────────────────────
// Window geometry lives in pixels; the terminal draws in cells.

pub const CELL_W: i32 = 10;
pub const CELL_H: i32 = 20;

/// Pixel viewport covered by a desktop area of `area` cells.
pub fn viewport_for(area: Rect) -> Viewport {
    Viewport::new(area.width as i32 * CELL_W, area.height as i32 * CELL_H)
}

pub fn px_to_cell(desk: Rect, rect: WinRect) -> Rect {
    let x0 = (rect.x / CELL_W).max(0);
    let y0 = (rect.y / CELL_H).max(0);
    let x1 = (rect.right() + CELL_W - 1) / CELL_W;
    let y1 = (rect.bottom() + CELL_H - 1) / CELL_H;
    let x = (desk.x as i32 + x0).min(desk.right() as i32);
    let y = (desk.y as i32 + y0).min(desk.bottom() as i32);
    let right = (desk.x as i32 + x1).min(desk.right() as i32);
    let bottom = (desk.y as i32 + y1).min(desk.bottom() as i32);
    Rect {
        x: x as u16,
        y: y as u16,
        width: (right - x).max(0) as u16,
        height: (bottom - y).max(0) as u16,
    }
}

/// Pixel coordinate of the centre of a terminal cell, relative to the desk.
pub fn cell_to_px(desk: Rect, col: u16, row: u16) -> (i32, i32) {
    let cx = col as i32 - desk.x as i32;
    let cy = row as i32 - desk.y as i32;
    (cx * CELL_W + CELL_W / 2, cy * CELL_H + CELL_H / 2)
}

pub fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x.saturating_add(rect.width) && y >= rect.y && y < rect.y.saturating_add(rect.height)
}

// ── Row builders ──────────────────────────────────────────────────────────────

pub fn write_text(buf: &mut [char], start: usize, text: &str) {
    for (i, ch) in text.chars().enumerate() {
        let idx = start + i;
        if idx >= buf.len() {
            break;
        }
        buf[idx] = ch;
    }
}

pub fn write_text_in_area(buf: &mut [char], area: Rect, x: u16, text: &str) {
    if x < area.x {
        return;
    }
    let start = (x - area.x) as usize;
    write_text(buf, start, text);
}

/// Clip to `width` chars, marking the cut with `…`.
pub fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(width - 1).collect();
    out.push('…');
    out
}

/// Greedy word wrap. Words longer than the width are split hard.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for para in text.split('\n') {
        let mut line = String::new();
        for word in para.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let len = line.chars().count();
            if len > 0 && len + 1 + word.len() > width {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.extend(word);
        }
        lines.push(line);
    }
    lines
}

pub fn bar(percent: f32, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f32).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width.saturating_sub(filled)))
}
