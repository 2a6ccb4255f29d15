use serde::{Deserialize, Serialize};
use std::fmt;

/// The 32 colours the canvas accepts. A colour's position in this table is
/// also the colour index the painting service expects.
pub const PALETTE: [&str; 32] = [
    "#6D001A", "#BE0039", "#FF4500", "#FFA800", "#FFD635", "#FFF8B8", "#00A368", "#00CC78",
    "#7EED56", "#00756F", "#009EAA", "#00CCC0", "#2450A4", "#3690EA", "#51E9F4", "#493AC1",
    "#6A5CFF", "#94B3FF", "#811E9F", "#B44AC0", "#E4ABFF", "#DE107F", "#FF3881", "#FF99AA",
    "#6D482F", "#9C6926", "#FFB470", "#000000", "#515252", "#898D90", "#D4D7D9", "#FFFFFF",
];

/// Number of palette entries
pub const PALETTE_SIZE: usize = PALETTE.len();

/// An opaque RGB colour. Alpha is never part of colour identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Canonical `#RRGGBB` form, uppercase.
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    pub fn from_hex(raw: &str) -> Option<Self> {
        let hex = raw.trim().strip_prefix('#')?;
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let value = u32::from_str_radix(hex, 16).ok()?;
        Some(Self::new(
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ))
    }

    /// Palette index of this colour, if it is a palette member.
    pub fn palette_index(&self) -> Option<u8> {
        palette_index_of(*self)
    }

    pub fn is_palette_member(&self) -> bool {
        self.palette_index().is_some()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Palette as RGB triples, same order as [`PALETTE`].
pub const PALETTE_RGB: [Rgb; PALETTE_SIZE] = [
    Rgb::new(0x6D, 0x00, 0x1A),
    Rgb::new(0xBE, 0x00, 0x39),
    Rgb::new(0xFF, 0x45, 0x00),
    Rgb::new(0xFF, 0xA8, 0x00),
    Rgb::new(0xFF, 0xD6, 0x35),
    Rgb::new(0xFF, 0xF8, 0xB8),
    Rgb::new(0x00, 0xA3, 0x68),
    Rgb::new(0x00, 0xCC, 0x78),
    Rgb::new(0x7E, 0xED, 0x56),
    Rgb::new(0x00, 0x75, 0x6F),
    Rgb::new(0x00, 0x9E, 0xAA),
    Rgb::new(0x00, 0xCC, 0xC0),
    Rgb::new(0x24, 0x50, 0xA4),
    Rgb::new(0x36, 0x90, 0xEA),
    Rgb::new(0x51, 0xE9, 0xF4),
    Rgb::new(0x49, 0x3A, 0xC1),
    Rgb::new(0x6A, 0x5C, 0xFF),
    Rgb::new(0x94, 0xB3, 0xFF),
    Rgb::new(0x81, 0x1E, 0x9F),
    Rgb::new(0xB4, 0x4A, 0xC0),
    Rgb::new(0xE4, 0xAB, 0xFF),
    Rgb::new(0xDE, 0x10, 0x7F),
    Rgb::new(0xFF, 0x38, 0x81),
    Rgb::new(0xFF, 0x99, 0xAA),
    Rgb::new(0x6D, 0x48, 0x2F),
    Rgb::new(0x9C, 0x69, 0x26),
    Rgb::new(0xFF, 0xB4, 0x70),
    Rgb::new(0x00, 0x00, 0x00),
    Rgb::new(0x51, 0x52, 0x52),
    Rgb::new(0x89, 0x8D, 0x90),
    Rgb::new(0xD4, 0xD7, 0xD9),
    Rgb::new(0xFF, 0xFF, 0xFF),
];

/// Map an RGB triple to its palette index.
pub fn palette_index_of(color: Rgb) -> Option<u8> {
    PALETTE_RGB
        .iter()
        .position(|entry| *entry == color)
        .map(|idx| idx as u8)
}

/// Colour for a palette index, if the index is in range.
pub fn palette_color(index: u8) -> Option<Rgb> {
    PALETTE_RGB.get(index as usize).copied()
}
