//! Binary wire codec for full-sync and delta frames.
//!
//! Every frame starts with a one-byte type tag followed by a payload that
//! may be zstd-compressed as a whole:
//!
//! ```text
//! full-sync : [0u8][payload]   payload = one byte per cell, or a bitset
//! delta     : [1u8][payload]   payload = (row: u8, col: u8, data: u8)*
//! ```
//!
//! The per-cell byte is `alive | color << 1`. The bitset packing drops
//! color entirely and stores one bit per cell in little-endian 64-bit
//! words (cell `k` is bit `k % 64` of word `k / 64`).
//!
//! Building a frame from the live grid consumes the `changed` flags of
//! every cell it encodes. Flags are cleared only after the frame has been
//! sealed successfully, so an encode failure leaves the grid untouched.

use serde::Deserialize;

use crate::grid::{Cell, ColorId, Grid, NEUTRAL};

/// Type tag of a full-sync frame.
pub const FULL_SYNC_TAG: u8 = 0;

/// Type tag of a delta frame.
pub const DELTA_TAG: u8 = 1;

/// Size in bytes of one delta record.
pub const DELTA_RECORD_LEN: usize = 3;

/// Largest grid dimension whose indices still fit the `u8` delta record.
pub const MAX_DELTA_DIMENSION: u16 = 256;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The stream compressor failed.
    #[error("failed to compress frame payload: {source}")]
    Compress {
        /// The underlying I/O error from the compressor.
        source: std::io::Error,
    },

    /// The stream decompressor failed.
    #[error("failed to decompress frame payload: {source}")]
    Decompress {
        /// The underlying I/O error from the decompressor.
        source: std::io::Error,
    },

    /// The grid is too large for `u8` delta records.
    #[error("delta frames need dimensions of at most 256 (grid is {width}x{height})")]
    DeltaUnsupported {
        /// Grid width.
        width: u16,
        /// Grid height.
        height: u16,
    },

    /// The frame had no type tag.
    #[error("empty frame")]
    EmptyFrame,

    /// The type tag is not one this codec understands.
    #[error("unknown frame type tag: {0}")]
    UnknownFrameType(u8),

    /// A delta payload is not a whole number of records.
    #[error("delta payload of {len} bytes is not a multiple of the record size")]
    TruncatedDelta {
        /// Payload length in bytes.
        len: usize,
    },

    /// A full-sync payload has the wrong length for the grid.
    #[error("full-sync payload is {actual} bytes, expected {expected}")]
    LengthMismatch {
        /// Expected payload length.
        expected: usize,
        /// Actual payload length.
        actual: usize,
    },
}

/// How cell state is packed into a full-sync payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Packing {
    /// One byte per cell carrying alive and color.
    #[default]
    Bytes,
    /// One bit per cell, alive only.
    Bitset,
}

/// Optional whole-payload compression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    /// Payload is sent as-is.
    #[default]
    None,
    /// Payload is a zstd stream at the given level.
    Zstd {
        /// zstd compression level.
        level: i32,
    },
}

/// Which kind of frame a buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Every cell of the grid.
    FullSync,
    /// Only the cells flagged as changed.
    Delta,
}

impl FrameKind {
    /// The leading type tag byte.
    pub const fn tag(self) -> u8 {
        match self {
            Self::FullSync => FULL_SYNC_TAG,
            Self::Delta => DELTA_TAG,
        }
    }
}

/// A sealed frame ready to be written to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
    cells: usize,
    bytes: Vec<u8>,
}

impl Frame {
    /// The frame kind.
    pub const fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Number of cells encoded in the frame.
    pub const fn cell_count(&self) -> usize {
        self.cells
    }

    /// The encoded bytes, tag included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the frame, returning the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Alive flag and color of one decoded cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellState {
    /// Whether the cell is alive.
    pub alive: bool,
    /// Owning color ([`NEUTRAL`] for dead cells).
    pub color: ColorId,
}

/// One decoded delta record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaRecord {
    /// Row of the changed cell.
    pub row: u8,
    /// Column of the changed cell.
    pub col: u8,
    /// New state of the cell.
    pub state: CellState,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    /// Row-major state of every cell.
    FullSync(Vec<CellState>),
    /// Changed cells only.
    Delta(Vec<DeltaRecord>),
}

/// Pack alive and color into the wire byte.
///
/// Dead cells are always `0`. Colors above 127 do not fit and lose their
/// high bit.
pub const fn pack_cell(alive: bool, color: ColorId) -> u8 {
    if alive { color.wrapping_shl(1) | 1 } else { 0 }
}

/// Inverse of [`pack_cell`].
pub const fn unpack_cell(byte: u8) -> CellState {
    CellState {
        alive: byte & 1 == 1,
        color: byte >> 1,
    }
}

/// Encoder and decoder for the frame format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireCodec {
    packing: Packing,
    compression: Compression,
}

impl WireCodec {
    /// Create a codec with the given packing and compression.
    pub const fn new(packing: Packing, compression: Compression) -> Self {
        Self {
            packing,
            compression,
        }
    }

    /// The configured packing.
    pub const fn packing(&self) -> Packing {
        self.packing
    }

    /// The configured compression.
    pub const fn compression(&self) -> Compression {
        self.compression
    }

    /// Build a full-sync frame without touching any changed flag.
    ///
    /// Used to bring a single newly connected client up to date; pending
    /// deltas still go out to everyone else on the next tick.
    pub fn snapshot(&self, grid: &Grid) -> Result<Frame, CodecError> {
        let payload: Vec<u8> = match self.packing {
            Packing::Bytes => grid
                .cells()
                .iter()
                .map(|cell| pack_cell(cell.alive, cell.color))
                .collect(),
            Packing::Bitset => pack_bitset(grid.cells()),
        };
        self.seal(FrameKind::FullSync, &payload, grid.len())
    }

    /// Build a full-sync frame and clear every changed flag.
    pub fn encode_full(&self, grid: &mut Grid) -> Result<Frame, CodecError> {
        let frame = self.snapshot(grid)?;
        let cleared = grid.clear_changed();
        tracing::trace!(cleared, "full-sync frame consumed changed flags");
        Ok(frame)
    }

    /// Build a delta frame from the changed cells and clear their flags.
    ///
    /// Returns `Ok(None)` when nothing changed; no frame should be sent.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::DeltaUnsupported`] if either grid dimension
    /// exceeds [`MAX_DELTA_DIMENSION`].
    pub fn encode_delta(&self, grid: &mut Grid) -> Result<Option<Frame>, CodecError> {
        if grid.width() > MAX_DELTA_DIMENSION || grid.height() > MAX_DELTA_DIMENSION {
            return Err(CodecError::DeltaUnsupported {
                width: grid.width(),
                height: grid.height(),
            });
        }

        let mut payload = Vec::new();
        let mut encoded: Vec<usize> = Vec::new();
        for (idx, cell) in grid.cells().iter().enumerate().filter(|(_, c)| c.changed) {
            let (Ok(row), Ok(col)) = (u8::try_from(cell.row), u8::try_from(cell.col)) else {
                return Err(CodecError::DeltaUnsupported {
                    width: grid.width(),
                    height: grid.height(),
                });
            };
            payload.extend_from_slice(&[row, col, self.cell_byte(cell)]);
            encoded.push(idx);
        }

        if encoded.is_empty() {
            return Ok(None);
        }

        let frame = self.seal(FrameKind::Delta, &payload, encoded.len())?;

        let cells = grid.cells_mut();
        for idx in encoded {
            if let Some(cell) = cells.get_mut(idx) {
                cell.changed = false;
            }
        }

        Ok(Some(frame))
    }

    /// Decode a frame produced by a codec with the same settings.
    ///
    /// `cell_count` is the grid's `width * height`; it is needed to size
    /// a full-sync payload and is ignored for deltas.
    pub fn decode(&self, frame: &[u8], cell_count: usize) -> Result<DecodedFrame, CodecError> {
        let (&tag, body) = frame.split_first().ok_or(CodecError::EmptyFrame)?;
        let kind = match tag {
            FULL_SYNC_TAG => FrameKind::FullSync,
            DELTA_TAG => FrameKind::Delta,
            other => return Err(CodecError::UnknownFrameType(other)),
        };
        let payload = self.open(body)?;

        match kind {
            FrameKind::FullSync => self.decode_full(&payload, cell_count).map(DecodedFrame::FullSync),
            FrameKind::Delta => decode_delta(&payload).map(DecodedFrame::Delta),
        }
    }

    fn cell_byte(&self, cell: &Cell) -> u8 {
        match self.packing {
            Packing::Bytes => pack_cell(cell.alive, cell.color),
            Packing::Bitset => pack_cell(cell.alive, NEUTRAL),
        }
    }

    fn seal(&self, kind: FrameKind, payload: &[u8], cells: usize) -> Result<Frame, CodecError> {
        let body = match self.compression {
            Compression::None => payload.to_vec(),
            Compression::Zstd { level } => {
                zstd::encode_all(payload, level).map_err(|source| CodecError::Compress { source })?
            }
        };

        let mut bytes = Vec::with_capacity(body.len().saturating_add(1));
        bytes.push(kind.tag());
        bytes.extend_from_slice(&body);
        Ok(Frame { kind, cells, bytes })
    }

    fn open(&self, body: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self.compression {
            Compression::None => Ok(body.to_vec()),
            Compression::Zstd { .. } => {
                zstd::decode_all(body).map_err(|source| CodecError::Decompress { source })
            }
        }
    }

    fn decode_full(&self, payload: &[u8], cell_count: usize) -> Result<Vec<CellState>, CodecError> {
        let expected = match self.packing {
            Packing::Bytes => cell_count,
            Packing::Bitset => bitset_len(cell_count),
        };
        if payload.len() != expected {
            return Err(CodecError::LengthMismatch {
                expected,
                actual: payload.len(),
            });
        }

        let states: Vec<CellState> = match self.packing {
            Packing::Bytes => payload.iter().map(|&b| unpack_cell(b)).collect(),
            Packing::Bitset => (0..cell_count)
                .map(|k| {
                    let byte = payload.get(k / 8).copied().unwrap_or(0);
                    CellState {
                        alive: (byte >> (k % 8)) & 1 == 1,
                        color: NEUTRAL,
                    }
                })
                .collect(),
        };
        Ok(states)
    }
}

/// Bytes needed for a bitset of `cell_count` cells, padded to whole
/// 64-bit words.
const fn bitset_len(cell_count: usize) -> usize {
    cell_count.div_ceil(64).saturating_mul(8)
}

fn pack_bitset(cells: &[Cell]) -> Vec<u8> {
    let mut payload = vec![0u8; bitset_len(cells.len())];
    for (k, _) in cells.iter().enumerate().filter(|(_, c)| c.alive) {
        if let Some(byte) = payload.get_mut(k / 8) {
            *byte |= 1 << (k % 8);
        }
    }
    payload
}

fn decode_delta(payload: &[u8]) -> Result<Vec<DeltaRecord>, CodecError> {
    let records = payload.chunks_exact(DELTA_RECORD_LEN);
    if !records.remainder().is_empty() {
        return Err(CodecError::TruncatedDelta { len: payload.len() });
    }
    Ok(records
        .filter_map(|chunk| match *chunk {
            [row, col, data] => Some(DeltaRecord {
                row,
                col,
                state: unpack_cell(data),
            }),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::engine;

    const ZSTD: Compression = Compression::Zstd { level: 3 };

    fn seeded_grid() -> Grid {
        let mut grid = Grid::new(16, 12).unwrap();
        grid.activate(0, 0, 1);
        grid.activate(5, 7, 9);
        grid.activate(11, 15, 16);
        grid.activate(3, 3, NEUTRAL);
        grid
    }

    fn expected_states(grid: &Grid, keep_color: bool) -> Vec<CellState> {
        grid.cells()
            .iter()
            .map(|c| CellState {
                alive: c.alive,
                color: if keep_color && c.alive { c.color } else { NEUTRAL },
            })
            .collect()
    }

    #[test]
    fn cell_byte_layout() {
        assert_eq!(pack_cell(false, 5), 0);
        assert_eq!(pack_cell(true, 0), 0b1);
        assert_eq!(pack_cell(true, 3), 0b111);
        assert_eq!(pack_cell(true, 16), 0b10_0001);
        assert_eq!(unpack_cell(0b10_0001), CellState { alive: true, color: 16 });
    }

    #[test]
    fn full_sync_round_trips_bytes_uncompressed() {
        let codec = WireCodec::new(Packing::Bytes, Compression::None);
        let mut grid = seeded_grid();
        let expected = expected_states(&grid, true);

        let frame = codec.encode_full(&mut grid).unwrap();
        assert_eq!(frame.kind(), FrameKind::FullSync);
        assert_eq!(frame.as_bytes().first(), Some(&FULL_SYNC_TAG));
        assert_eq!(frame.as_bytes().len(), grid.len() + 1);

        let decoded = codec.decode(frame.as_bytes(), grid.len()).unwrap();
        assert_eq!(decoded, DecodedFrame::FullSync(expected));
    }

    #[test]
    fn full_sync_round_trips_bytes_compressed() {
        let codec = WireCodec::new(Packing::Bytes, ZSTD);
        let mut grid = seeded_grid();
        let expected = expected_states(&grid, true);

        let frame = codec.encode_full(&mut grid).unwrap();
        assert_eq!(frame.as_bytes().first(), Some(&FULL_SYNC_TAG));
        assert!(frame.as_bytes().len() < grid.len());

        let decoded = codec.decode(frame.as_bytes(), grid.len()).unwrap();
        assert_eq!(decoded, DecodedFrame::FullSync(expected));
    }

    #[test]
    fn full_sync_round_trips_bitset() {
        for compression in [Compression::None, ZSTD] {
            let codec = WireCodec::new(Packing::Bitset, compression);
            let mut grid = seeded_grid();
            let expected = expected_states(&grid, false);

            let frame = codec.encode_full(&mut grid).unwrap();
            if compression == Compression::None {
                // 192 cells -> three 64-bit words.
                assert_eq!(frame.as_bytes().len(), 1 + 24);
            }
            let decoded = codec.decode(frame.as_bytes(), grid.len()).unwrap();
            assert_eq!(decoded, DecodedFrame::FullSync(expected));
        }
    }

    #[test]
    fn bitset_sets_low_bit_first() {
        let mut grid = Grid::new(64, 1).unwrap();
        grid.activate(0, 0, 1);
        grid.activate(0, 9, 1);
        let codec = WireCodec::new(Packing::Bitset, Compression::None);
        let frame = codec.snapshot(&grid).unwrap();
        assert_eq!(frame.as_bytes(), &[0, 0b1, 0b10, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn full_encode_is_idempotent_and_consumes_flags() {
        let codec = WireCodec::new(Packing::Bytes, Compression::None);
        let mut grid = seeded_grid();
        assert_eq!(grid.changed_count(), 4);

        let first = codec.encode_full(&mut grid).unwrap();
        assert_eq!(grid.changed_count(), 0);
        let second = codec.encode_full(&mut grid).unwrap();
        assert_eq!(grid.changed_count(), 0);
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn snapshot_leaves_flags_alone() {
        let codec = WireCodec::new(Packing::Bytes, ZSTD);
        let grid = seeded_grid();
        codec.snapshot(&grid).unwrap();
        assert_eq!(grid.changed_count(), 4);
    }

    #[test]
    fn delta_reports_changed_cells_once() {
        let codec = WireCodec::new(Packing::Bytes, Compression::None);
        let mut grid = seeded_grid();

        let frame = codec.encode_delta(&mut grid).unwrap().unwrap();
        assert_eq!(frame.kind(), FrameKind::Delta);
        assert_eq!(frame.cell_count(), 4);
        assert_eq!(frame.as_bytes().len(), 1 + 4 * DELTA_RECORD_LEN);
        assert_eq!(grid.changed_count(), 0);

        let DecodedFrame::Delta(records) = codec.decode(frame.as_bytes(), grid.len()).unwrap()
        else {
            panic!("expected a delta frame");
        };
        assert_eq!(
            records.first().unwrap(),
            &DeltaRecord {
                row: 0,
                col: 0,
                state: CellState { alive: true, color: 1 },
            }
        );
        assert!(records.iter().any(|r| r.row == 11 && r.col == 15 && r.state.color == 16));

        assert!(codec.encode_delta(&mut grid).unwrap().is_none());
    }

    #[test]
    fn delta_after_step_carries_deaths_and_births() {
        let codec = WireCodec::new(Packing::Bytes, ZSTD);
        let mut grid = Grid::new(8, 8).unwrap();
        for col in 2..5 {
            grid.activate(4, col, 2);
        }
        codec.encode_delta(&mut grid).unwrap();

        engine::step(&mut grid);
        let frame = codec.encode_delta(&mut grid).unwrap().unwrap();
        let DecodedFrame::Delta(records) = codec.decode(frame.as_bytes(), grid.len()).unwrap()
        else {
            panic!("expected a delta frame");
        };
        // Blinker flips: two ends die, two cells are born.
        assert_eq!(records.len(), 4);
        assert_eq!(records.iter().filter(|r| r.state.alive).count(), 2);
        assert!(records.iter().filter(|r| r.state.alive).all(|r| r.state.color == 2));
        assert!(records.iter().filter(|r| !r.state.alive).all(|r| r.state.color == NEUTRAL));
    }

    #[test]
    fn change_reported_in_delta_is_not_repeated_after_full_sync() {
        let codec = WireCodec::new(Packing::Bytes, Compression::None);
        let mut grid = seeded_grid();
        codec.encode_delta(&mut grid).unwrap();
        codec.encode_full(&mut grid).unwrap();
        assert!(codec.encode_delta(&mut grid).unwrap().is_none());

        grid.activate(2, 2, 4);
        let frame = codec.encode_delta(&mut grid).unwrap().unwrap();
        assert_eq!(frame.cell_count(), 1);
    }

    #[test]
    fn bitset_delta_drops_color() {
        let codec = WireCodec::new(Packing::Bitset, Compression::None);
        let mut grid = Grid::new(4, 4).unwrap();
        grid.activate(1, 2, 7);
        let frame = codec.encode_delta(&mut grid).unwrap().unwrap();
        assert_eq!(frame.as_bytes(), &[DELTA_TAG, 1, 2, 1]);
    }

    #[test]
    fn oversized_grid_cannot_encode_delta() {
        let codec = WireCodec::default();
        let mut grid = Grid::new(257, 4).unwrap();
        grid.activate(0, 0, 1);
        assert!(matches!(
            codec.encode_delta(&mut grid),
            Err(CodecError::DeltaUnsupported { width: 257, height: 4 })
        ));
        assert_eq!(grid.changed_count(), 1);

        let mut grid = Grid::new(256, 256).unwrap();
        grid.activate(255, 255, 1);
        let frame = codec.encode_delta(&mut grid).unwrap().unwrap();
        assert_eq!(frame.as_bytes(), &[DELTA_TAG, 255, 255, 0b11]);
    }

    #[test]
    fn decode_rejects_malformed_frames() {
        let codec = WireCodec::default();
        assert!(matches!(codec.decode(&[], 4), Err(CodecError::EmptyFrame)));
        assert!(matches!(
            codec.decode(&[7, 0], 4),
            Err(CodecError::UnknownFrameType(7))
        ));
        assert!(matches!(
            codec.decode(&[DELTA_TAG, 1, 2], 4),
            Err(CodecError::TruncatedDelta { len: 2 })
        ));
        assert!(matches!(
            codec.decode(&[FULL_SYNC_TAG, 0, 0], 4),
            Err(CodecError::LengthMismatch { expected: 4, actual: 2 })
        ));

        let zstd = WireCodec::new(Packing::Bytes, ZSTD);
        assert!(matches!(
            zstd.decode(&[FULL_SYNC_TAG, 1, 2, 3], 4),
            Err(CodecError::Decompress { .. })
        ));
    }
}
