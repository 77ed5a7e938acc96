//! Desktop icon placement on a fixed grid.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::WindowId;
use crate::geometry::Viewport;

pub const GRID_CELL_W: i32 = 96;
pub const GRID_CELL_H: i32 = 96;
pub const GRID_MARGIN: i32 = 16;
pub const MAX_GRID_COLS: i32 = 32;
pub const MAX_GRID_ROWS: i32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconPos {
    pub x: i32,
    pub y: i32,
}

/// The flat `icon id -> {x, y}` map the backend stores.
pub type IconPositions = BTreeMap<String, IconPos>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GridCell {
    pub col: i32,
    pub row: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopIcon {
    pub id: WindowId,
    pub label: String,
    pub glyph: String,
}

#[derive(Debug)]
pub struct IconLayout {
    icons: Vec<DesktopIcon>,
    placements: IconPositions,
    hidden: BTreeSet<String>,
    viewport: Viewport,
}

impl IconLayout {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            icons: Vec::new(),
            placements: IconPositions::new(),
            hidden: BTreeSet::new(),
            viewport,
        }
    }

    /// Adopt a new viewport and re-settle the layout against its grid.
    /// Returns whether any placement moved.
    pub fn set_viewport(&mut self, viewport: Viewport) -> bool {
        self.viewport = viewport;
        let before = self.placements.clone();
        self.settle();
        before != self.placements
    }

    pub fn grid_dims(&self) -> (i32, i32) {
        let cols = ((self.viewport.width - GRID_MARGIN) / GRID_CELL_W).clamp(1, MAX_GRID_COLS);
        let rows = ((self.viewport.height - GRID_MARGIN) / GRID_CELL_H).clamp(1, MAX_GRID_ROWS);
        (cols, rows)
    }

    pub fn snap(&self, x: i32, y: i32) -> GridCell {
        let (cols, rows) = self.grid_dims();
        let col = ((x - GRID_MARGIN) as f32 / GRID_CELL_W as f32).round() as i32;
        let row = ((y - GRID_MARGIN) as f32 / GRID_CELL_H as f32).round() as i32;
        GridCell {
            col: col.clamp(0, cols - 1),
            row: row.clamp(0, rows - 1),
        }
    }

    pub fn cell_pos(cell: GridCell) -> IconPos {
        IconPos {
            x: GRID_MARGIN + cell.col * GRID_CELL_W,
            y: GRID_MARGIN + cell.row * GRID_CELL_H,
        }
    }

    fn cell_of(&self, pos: IconPos) -> GridCell {
        self.snap(pos.x, pos.y)
    }

    /// The cell `pos` snaps to, or `None` when it lies past the grid edge.
    fn cell_in_grid(&self, pos: IconPos) -> Option<GridCell> {
        let (cols, rows) = self.grid_dims();
        let col = ((pos.x - GRID_MARGIN) as f32 / GRID_CELL_W as f32).round() as i32;
        let row = ((pos.y - GRID_MARGIN) as f32 / GRID_CELL_H as f32).round() as i32;
        ((0..cols).contains(&col) && (0..rows).contains(&row)).then_some(GridCell { col, row })
    }

    pub fn icons(&self) -> &[DesktopIcon] {
        &self.icons
    }

    pub fn positions(&self) -> &IconPositions {
        &self.placements
    }

    pub fn position(&self, id: &str) -> Option<IconPos> {
        self.placements.get(id).copied()
    }

    pub fn hidden(&self) -> Vec<String> {
        self.hidden.iter().cloned().collect()
    }

    pub fn load_positions(&mut self, positions: IconPositions) {
        self.placements = positions;
        self.settle();
    }

    pub fn load_hidden(&mut self, hidden: Vec<String>) {
        self.hidden = hidden.into_iter().collect();
        self.icons.retain(|icon| !self.hidden.contains(icon.id.as_str()));
        self.settle();
    }

    /// Replace the icon set (built-ins plus desktop plugins). Icons without
    /// a saved placement get the first free cell.
    pub fn set_icons(&mut self, icons: Vec<DesktopIcon>) {
        self.icons = icons
            .into_iter()
            .filter(|icon| !self.hidden.contains(icon.id.as_str()))
            .collect();
        self.settle();
    }

    pub fn icon_at(&self, px: i32, py: i32) -> Option<&DesktopIcon> {
        self.icons.iter().find(|icon| {
            self.placements.get(icon.id.as_str()).is_some_and(|pos| {
                px >= pos.x && px < pos.x + GRID_CELL_W && py >= pos.y && py < pos.y + GRID_CELL_H
            })
        })
    }

    fn occupied_except(&self, id: &str) -> BTreeSet<GridCell> {
        self.icons
            .iter()
            .filter(|icon| icon.id.as_str() != id)
            .filter_map(|icon| self.placements.get(icon.id.as_str()))
            .map(|pos| self.cell_of(*pos))
            .collect()
    }

    /// First free cell in row-major order starting at `start`, wrapping
    /// around to the top-left once the grid end is reached.
    pub fn find_free_cell(&self, start: GridCell, id: &str) -> Option<GridCell> {
        let occupied = self.occupied_except(id);
        let (cols, rows) = self.grid_dims();
        let total = cols * rows;
        let start_idx = start.row * cols + start.col;
        (0..total)
            .map(|offset| (start_idx + offset) % total)
            .map(|idx| GridCell {
                col: idx % cols,
                row: idx / cols,
            })
            .find(|cell| !occupied.contains(cell))
    }

    /// Drop `id` near (`x`, `y`). Returns the final position, or `None` for
    /// an unknown icon or a full grid.
    pub fn drop_icon(&mut self, id: &str, x: i32, y: i32) -> Option<IconPos> {
        if !self.icons.iter().any(|icon| icon.id.as_str() == id) {
            return None;
        }
        let wanted = self.snap(x, y);
        let cell = self.find_free_cell(wanted, id)?;
        let pos = Self::cell_pos(cell);
        self.placements.insert(id.to_string(), pos);
        Some(pos)
    }

    /// Repack every visible icon row-major from the origin, in icon order.
    pub fn tidy(&mut self) {
        let (cols, _) = self.grid_dims();
        for (idx, icon) in self.icons.iter().enumerate() {
            let idx = idx as i32;
            let cell = GridCell {
                col: idx % cols,
                row: idx / cols,
            };
            self.placements
                .insert(icon.id.as_str().to_string(), Self::cell_pos(cell));
        }
    }

    /// Move one random icon to a random free cell.
    pub fn relocate_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<(String, IconPos)> {
        let icon_id = self.icons.choose(rng)?.id.as_str().to_string();
        let occupied = self.occupied_except(&icon_id);
        let (cols, rows) = self.grid_dims();
        let free: Vec<GridCell> = (0..rows)
            .flat_map(|row| (0..cols).map(move |col| GridCell { col, row }))
            .filter(|cell| !occupied.contains(cell))
            .collect();
        let cell = *free.choose(rng)?;
        let pos = Self::cell_pos(cell);
        self.placements.insert(icon_id.clone(), pos);
        Some((icon_id, pos))
    }

    pub fn hide(&mut self, id: &str) -> bool {
        let before = self.icons.len();
        self.icons.retain(|icon| icon.id.as_str() != id);
        self.hidden.insert(id.to_string());
        before != self.icons.len()
    }

    /// Give every visible icon a distinct, grid-aligned cell. Saved
    /// positions win in icon order; later collisions and icons left past
    /// the grid edge move to the first free cell.
    fn settle(&mut self) {
        let mut taken: BTreeSet<GridCell> = BTreeSet::new();
        let ids: Vec<String> = self.icons.iter().map(|i| i.id.as_str().to_string()).collect();
        let mut unplaced = Vec::new();
        for id in &ids {
            let cell = self.placements.get(id).and_then(|pos| self.cell_in_grid(*pos));
            match cell {
                Some(cell) if taken.insert(cell) => {
                    self.placements.insert(id.clone(), Self::cell_pos(cell));
                }
                _ => unplaced.push(id.clone()),
            }
        }
        let (cols, rows) = self.grid_dims();
        for id in unplaced {
            let free = (0..cols * rows)
                .map(|idx| GridCell {
                    col: idx % cols,
                    row: idx / cols,
                })
                .find(|cell| !taken.contains(cell));
            if let Some(cell) = free {
                taken.insert(cell);
                self.placements.insert(id, Self::cell_pos(cell));
            }
        }
    }
}
