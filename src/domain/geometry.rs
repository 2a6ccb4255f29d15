//! Canvas coordinates.
//!
//! A pixel is addressed either by `(x, y)` or by its linear [`PixelIndex`]
//! (`y * 2000 + x`). Order images, diff results and placement coordinates all
//! share this mapping.

use serde::{Deserialize, Serialize};

pub const CANVAS_WIDTH: u32 = 2000;
pub const CANVAS_HEIGHT: u32 = 2000;
pub const CANVAS_PIXELS: u32 = CANVAS_WIDTH * CANVAS_HEIGHT;

pub const TILE_WIDTH: u32 = 1000;
pub const TILE_HEIGHT: u32 = 1000;
pub const TILE_COUNT: u8 = 4;

/// Linear pixel index in `[0, 4_000_000)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PixelIndex(u32);

impl PixelIndex {
    pub fn new(raw: u32) -> Option<Self> {
        (raw < CANVAS_PIXELS).then_some(Self(raw))
    }

    pub fn from_coords(x: u32, y: u32) -> Option<Self> {
        if x >= CANVAS_WIDTH || y >= CANVAS_HEIGHT {
            return None;
        }
        Some(Self(y * CANVAS_WIDTH + x))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn x(self) -> u32 {
        self.0 % CANVAS_WIDTH
    }

    pub fn y(self) -> u32 {
        self.0 / CANVAS_WIDTH
    }

    pub fn coords(self) -> (u32, u32) {
        (self.x(), self.y())
    }

    /// Byte offset of this pixel in an RGBA canvas buffer.
    pub fn rgba_offset(self) -> usize {
        self.0 as usize * 4
    }

    pub fn tile(self) -> TileId {
        TileId::containing(self.x(), self.y())
    }
}

/// One of the four 1000×1000 quadrants of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileId(u8);

impl TileId {
    pub const ALL: [TileId; TILE_COUNT as usize] = [TileId(0), TileId(1), TileId(2), TileId(3)];

    pub fn new(raw: u8) -> Option<Self> {
        (raw < TILE_COUNT).then_some(Self(raw))
    }

    /// `(x > 999) + 2 * (y > 999)`
    pub fn containing(x: u32, y: u32) -> Self {
        let col = u8::from(x >= TILE_WIDTH);
        let row = u8::from(y >= TILE_HEIGHT);
        Self(col + 2 * row)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Top-left corner of this tile on the full canvas.
    pub fn origin(self) -> (u32, u32) {
        let col = u32::from(self.0 % 2);
        let row = u32::from(self.0 / 2);
        (col * TILE_WIDTH, row * TILE_HEIGHT)
    }

    /// Coordinates relative to this tile's origin.
    pub fn local(x: u32, y: u32) -> (u32, u32) {
        (x % TILE_WIDTH, y % TILE_HEIGHT)
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
