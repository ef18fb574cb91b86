//! Grid, simulation engine, and wire codec for the Chromalife server.
//!
//! This crate owns everything that touches cell state. It has no notion
//! of sockets or tasks; the server crate wraps the [`Grid`] in a single
//! lock and drives these modules from its scheduler and connection tasks.
//!
//! # Modules
//!
//! - [`grid`] -- Fixed-size toroidal cell storage with per-cell changed
//!   flags.
//! - [`engine`] -- One B3/S23 generation with the color-plurality rule
//!   for newborn cells.
//! - [`codec`] -- Full-sync and delta frame encoding (optionally
//!   zstd-compressed) and the matching decoder.
//! - [`gate`] -- Per-client rate limiting and color-attributed
//!   activation.
//! - [`round`] -- Round clock and the countdown notice.
//! - [`config`] -- Configuration loading from `chromalife-config.yaml`
//!   into strongly-typed structs.
//!
//! [`Grid`]: grid::Grid

pub mod codec;
pub mod config;
pub mod engine;
pub mod gate;
pub mod grid;
pub mod round;
