//! HTTP endpoint handlers.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/status` | Grid, round and connection summary |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use crate::state::{AppState, now};

/// Response body for `GET /status`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ServerStatus {
    /// Grid width in cells.
    pub width: u16,
    /// Grid height in cells.
    pub height: u16,
    /// Generations stepped since the last round reset.
    pub generation: u64,
    /// Number of live cells.
    pub alive_cells: usize,
    /// Number of registered connections.
    pub connections: usize,
    /// Seconds until the next round reset.
    pub round_remaining_seconds: f64,
}

/// Report the current grid, round and connection counts.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<ServerStatus> {
    let (width, height) = state.dimensions();
    let (generation, alive_cells) = {
        let grid = state.grid.lock().await;
        (grid.generation(), grid.alive_count())
    };
    let connections = state.registry.len().await;
    let round_remaining_seconds = state.round.lock().await.remaining_seconds(now());

    Json(ServerStatus {
        width,
        height,
        generation,
        alive_cells,
        connections,
        round_remaining_seconds,
    })
}
