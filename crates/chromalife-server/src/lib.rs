//! Chromalife game server.
//!
//! This crate wraps the grid, engine and codec from `chromalife-core` in
//! an Axum HTTP server:
//!
//! - **`WebSocket` endpoint** (`/`) where each client is assigned a color,
//!   receives a snapshot of the grid, then a stream of binary delta and
//!   full-sync frames, and submits cells to bring to life
//! - **Status endpoint** (`/status`) with grid, round and connection
//!   counts
//!
//! # Architecture
//!
//! One [`Scheduler`] task steps the simulation and broadcasts frames
//! through the [`Registry`]. Each connection runs a reader loop and a
//! writer task joined by a bounded queue; the registry only ever
//! enqueues, so a slow client can never stall the scheduler.
//!
//! [`Scheduler`]: scheduler::Scheduler
//! [`Registry`]: registry::Registry

pub mod command;
pub mod handlers;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
