//! Parsing of inbound client text messages.
//!
//! Clients speak JSON with a `type` tag:
//!
//! ```json
//! {"type": "points", "data": [{"x": 12, "y": 40}, {"x": 13, "y": 40}]}
//! ```
//!
//! `x` addresses the row and `y` the column. Points outside the grid, or
//! with negative or fractional coordinates, are dropped here so the rest
//! of the server only ever sees in-range [`GridPoint`]s. The bare text
//! `ping` is a client heartbeat and is not JSON.

use chromalife_core::gate::GridPoint;
use serde::Deserialize;

/// Heartbeat text sent by clients.
pub const PING: &str = "ping";

/// Reply to [`PING`].
pub const PONG: &str = "pong";

/// A decoded client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Cells the client wants brought to life in its color.
    Points(Vec<GridPoint>),
    /// Heartbeat.
    Ping,
    /// Well-formed message with a `type` the server does not handle.
    Unknown(String),
}

/// Errors from [`Command::parse`].
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The text was not a valid command envelope.
    #[error("malformed command: {source}")]
    Malformed {
        /// Underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct WirePoint {
    x: serde_json::Number,
    y: serde_json::Number,
}

impl Command {
    /// Parse one text message against a `width` x `height` grid.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Malformed`] if the text is not a JSON
    /// object with a string `type`, or if a `points` message's `data` is
    /// not an array of `{x, y}` objects.
    pub fn parse(text: &str, width: u16, height: u16) -> Result<Self, CommandError> {
        if text.trim() == PING {
            return Ok(Self::Ping);
        }

        let envelope: Envelope = serde_json::from_str(text)?;
        match envelope.kind.as_str() {
            "points" => {
                let raw: Vec<WirePoint> = serde_json::from_value(envelope.data)?;
                let points = raw
                    .iter()
                    .filter_map(|p| to_grid_point(p, width, height))
                    .collect();
                Ok(Self::Points(points))
            }
            _ => Ok(Self::Unknown(envelope.kind)),
        }
    }
}

fn to_grid_point(point: &WirePoint, width: u16, height: u16) -> Option<GridPoint> {
    let row = axis(&point.x, height)?;
    let col = axis(&point.y, width)?;
    Some(GridPoint { row, col })
}

fn axis(value: &serde_json::Number, limit: u16) -> Option<u16> {
    let raw = value.as_u64()?;
    u16::try_from(raw).ok().filter(|v| *v < limit)
}
