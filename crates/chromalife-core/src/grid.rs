//! Fixed-size toroidal grid of cells.
//!
//! The [`Grid`] owns `width * height` cells in row-major order and is
//! mutated in place for its whole lifetime. Cells are never added or
//! removed; a round reset rewrites every cell back to the dead, neutral
//! state.
//!
//! Spatial lookups wrap toroidally via [`wrap`]: the neighbor to the
//! left of column 0 is column `width - 1`, and so on. The engine only
//! ever asks for offsets in `{-1, 0, 1}`, so a single add or subtract of
//! the dimension is always enough.

/// Color identifier carried by a cell. `0` is [`NEUTRAL`].
pub type ColorId = u8;

/// The unowned color. Dead cells always carry it after a step, and it
/// is never assigned to a client.
pub const NEUTRAL: ColorId = 0;

/// Errors that can occur when constructing a grid.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// One of the dimensions was zero.
    #[error("grid dimensions must be non-zero (got {width}x{height})")]
    EmptyDimension {
        /// Requested width.
        width: u16,
        /// Requested height.
        height: u16,
    },
}

/// A single cell of the automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    /// Whether the cell is currently alive.
    pub alive: bool,
    /// Whether the cell differs from what the last built frame reported.
    pub changed: bool,
    /// Owning color, or [`NEUTRAL`].
    pub color: ColorId,
    /// Row index (redundant with the cell's position, kept for encoding).
    pub row: u16,
    /// Column index (redundant with the cell's position, kept for encoding).
    pub col: u16,
}

impl Cell {
    /// A dead, neutral, unchanged cell at the given position.
    pub const fn dead(row: u16, col: u16) -> Self {
        Self {
            alive: false,
            changed: false,
            color: NEUTRAL,
            row,
            col,
        }
    }
}

/// Wrap `coord + offset` into `[0, dimension)`.
///
/// Only offsets of `-1`, `0` and `1` are meaningful; any other offset is
/// treated as `0`. `dimension` must be non-zero.
pub const fn wrap(coord: u16, offset: i8, dimension: u16) -> u16 {
    match offset {
        -1 => {
            if coord == 0 {
                dimension.saturating_sub(1)
            } else {
                coord.saturating_sub(1)
            }
        }
        1 => {
            let next = coord.saturating_add(1);
            if next >= dimension { 0 } else { next }
        }
        _ => coord,
    }
}

/// The shared automaton grid.
///
/// Holds the live generation plus a scratch buffer the engine fills with
/// the next generation before swapping the two.
#[derive(Debug, Clone)]
pub struct Grid {
    width: u16,
    height: u16,
    cells: Vec<Cell>,
    scratch: Vec<Cell>,
    generation: u64,
}

impl Grid {
    /// Create a grid with every cell dead and neutral.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::EmptyDimension`] if either dimension is zero.
    pub fn new(width: u16, height: u16) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::EmptyDimension { width, height });
        }

        let cells: Vec<Cell> = (0..height)
            .flat_map(|row| (0..width).map(move |col| Cell::dead(row, col)))
            .collect();
        let scratch = Vec::with_capacity(cells.len());

        Ok(Self {
            width,
            height,
            cells,
            scratch,
            generation: 0,
        })
    }

    /// Number of columns.
    pub const fn width(&self) -> u16 {
        self.width
    }

    /// Number of rows.
    pub const fn height(&self) -> u16 {
        self.height
    }

    /// Total number of cells (`width * height`).
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Always `false`; a grid has at least one cell.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of steps completed since construction or the last reset.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Row-major index of `(row, col)`, or `None` if out of range.
    pub fn index(&self, row: u16, col: u16) -> Option<usize> {
        if row >= self.height || col >= self.width {
            return None;
        }
        usize::from(row)
            .checked_mul(usize::from(self.width))?
            .checked_add(usize::from(col))
    }

    /// The cell at `(row, col)`, or `None` if out of range.
    pub fn cell(&self, row: u16, col: u16) -> Option<&Cell> {
        self.index(row, col).and_then(|idx| self.cells.get(idx))
    }

    /// Whether `(row, col)` lies inside the grid.
    pub const fn contains(&self, row: u16, col: u16) -> bool {
        row < self.height && col < self.width
    }

    /// Bring the cell at `(row, col)` to life under `color`.
    ///
    /// Always flags the cell as changed. Returns `false` (and does
    /// nothing) if the coordinate is outside the grid.
    pub fn activate(&mut self, row: u16, col: u16, color: ColorId) -> bool {
        let Some(idx) = self.index(row, col) else {
            return false;
        };
        match self.cells.get_mut(idx) {
            Some(cell) => {
                cell.alive = true;
                cell.changed = true;
                cell.color = color;
                true
            }
            None => false,
        }
    }

    /// Kill every cell, neutralize its color and flag it changed.
    ///
    /// Also rewinds the generation counter.
    pub fn reset(&mut self) {
        for cell in &mut self.cells {
            cell.alive = false;
            cell.color = NEUTRAL;
            cell.changed = true;
        }
        self.generation = 0;
    }

    /// Clear every changed flag. Returns how many were set.
    pub fn clear_changed(&mut self) -> usize {
        let mut cleared: usize = 0;
        for cell in self.cells.iter_mut().filter(|c| c.changed) {
            cell.changed = false;
            cleared = cleared.saturating_add(1);
        }
        cleared
    }

    /// Number of cells whose changed flag is set.
    pub fn changed_count(&self) -> usize {
        self.cells.iter().filter(|c| c.changed).count()
    }

    /// Number of live cells.
    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|c| c.alive).count()
    }

    /// Hand the scratch buffer to the engine.
    pub(crate) fn take_scratch(&mut self) -> Vec<Cell> {
        std::mem::take(&mut self.scratch)
    }

    /// Install `next` as the live generation; the old one becomes scratch.
    ///
    /// `next` must hold exactly [`len`](Self::len) cells. A buffer of the
    /// wrong size is dropped and the live generation left untouched.
    pub(crate) fn commit_generation(&mut self, mut next: Vec<Cell>) {
        if next.len() != self.cells.len() {
            tracing::warn!(
                expected = self.cells.len(),
                actual = next.len(),
                "discarding next generation with wrong cell count"
            );
            return;
        }
        std::mem::swap(&mut self.cells, &mut next);
        self.scratch = next;
        self.generation = self.generation.saturating_add(1);
    }
}
