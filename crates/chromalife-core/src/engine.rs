//! Simulation engine: one generation of the colored Life rule.
//!
//! [`step`] advances the whole grid by one generation using Conway's
//! B3/S23 rule on a torus, with one addition: a newborn cell takes the
//! color held by the strict plurality of its three live neighbors, or
//! stays [`NEUTRAL`] when the top count is tied.
//!
//! The next generation is built into the grid's scratch buffer while the
//! live generation is only read, then the two are swapped. Neighbor reads
//! therefore always see the previous generation.
//!
//! The engine sets `changed` on every birth and death but never clears
//! it. Clearing belongs to whoever encodes the cell into a frame.

use crate::grid::{Cell, ColorId, Grid, NEUTRAL, wrap};

/// The eight `(row, col)` offsets of the Moore neighborhood.
const NEIGHBOR_OFFSETS: [(i8, i8); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Live-neighbor count and per-color tally around one cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Neighborhood {
    alive: u8,
    tally: [(ColorId, u8); 8],
    distinct: usize,
}

impl Neighborhood {
    /// Survey the eight toroidally wrapped neighbors of `(row, col)`.
    pub fn survey(grid: &Grid, row: u16, col: u16) -> Self {
        let mut hood = Self::default();
        for (dr, dc) in NEIGHBOR_OFFSETS {
            let r = wrap(row, dr, grid.height());
            let c = wrap(col, dc, grid.width());
            if let Some(neighbor) = grid.cell(r, c).filter(|n| n.alive) {
                hood.record(neighbor.color);
            }
        }
        hood
    }

    fn record(&mut self, color: ColorId) {
        self.alive = self.alive.saturating_add(1);
        let seen = self.distinct;
        if let Some(entry) = self.tally.iter_mut().take(seen).find(|(c, _)| *c == color) {
            entry.1 = entry.1.saturating_add(1);
        } else if let Some(slot) = self.tally.get_mut(seen) {
            *slot = (color, 1);
            self.distinct = seen.saturating_add(1);
        }
    }

    /// Number of live neighbors.
    pub const fn alive(&self) -> u8 {
        self.alive
    }

    /// How many live neighbors hold `color`.
    pub fn count_of(&self, color: ColorId) -> u8 {
        self.tally
            .iter()
            .take(self.distinct)
            .find(|(c, _)| *c == color)
            .map_or(0, |(_, n)| *n)
    }

    /// The color with the single highest neighbor count.
    ///
    /// Neutral neighbors take part in the tally like any other color.
    /// Returns [`NEUTRAL`] when two or more colors share the top count.
    pub fn plurality_color(&self) -> ColorId {
        let mut best = NEUTRAL;
        let mut best_count: u8 = 0;
        let mut tied = false;
        for &(color, count) in self.tally.iter().take(self.distinct) {
            if count > best_count {
                best = color;
                best_count = count;
                tied = false;
            } else if count == best_count {
                tied = true;
            }
        }
        if tied { NEUTRAL } else { best }
    }
}

/// Compute the next state of `cell` from its neighborhood.
fn evolve(cell: &Cell, hood: &Neighborhood) -> Cell {
    let mut next = *cell;
    let neighbors = hood.alive();
    if cell.alive && !(2..=3).contains(&neighbors) {
        next.alive = false;
        next.color = NEUTRAL;
        next.changed = true;
    } else if !cell.alive && neighbors == 3 {
        next.alive = true;
        next.color = hood.plurality_color();
        next.changed = true;
    }
    next
}

/// Advance `grid` by one generation.
///
/// Callers must hold exclusive access to the grid for the duration of
/// the call.
pub fn step(grid: &mut Grid) {
    let mut next = grid.take_scratch();
    next.clear();
    next.reserve(grid.len());

    for cell in grid.cells() {
        let hood = Neighborhood::survey(grid, cell.row, cell.col);
        next.push(evolve(cell, &hood));
    }

    grid.commit_generation(next);
    tracing::trace!(generation = grid.generation(), "generation advanced");
}
