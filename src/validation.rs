//! Order image validation
//!
//! A candidate order is accepted only when its decoded RGBA buffer covers the
//! whole 2000x2000 canvas and every pixel is a palette colour. Alpha is not
//! consulted: a fully transparent pixel must still carry a palette RGB value.
//!
//! Validation is pure. Persisting the image and committing it to the history
//! is the caller's job, and only happens on `Ok`.

use crate::domain::{PixelIndex, Raster, Rgb, CANVAS_PIXELS};
use crate::error::OrderRejection;

/// Byte length of a 2000x2000 RGBA buffer
pub const ORDER_RGBA_LEN: usize = CANVAS_PIXELS as usize * 4;

/// Validate a raw RGBA buffer
///
/// # Returns
/// * `Ok(())` if the buffer is a valid order
/// * `Err(WrongDimensions)` if the length is not exactly 16,000,000 bytes
/// * `Err(InvalidColor)` for the first off-palette pixel in scan order
pub fn validate_order_pixels(rgba: &[u8]) -> Result<(), OrderRejection> {
    if rgba.len() != ORDER_RGBA_LEN {
        return Err(OrderRejection::WrongDimensions { len: rgba.len() });
    }

    for (i, px) in rgba.chunks_exact(4).enumerate() {
        let color = Rgb::new(px[0], px[1], px[2]);
        if !color.is_palette_member() {
            // i < CANVAS_PIXELS once the length check passed
            let (x, y) = PixelIndex::new(i as u32)
                .map(PixelIndex::coords)
                .unwrap_or_default();
            return Err(OrderRejection::InvalidColor {
                x,
                y,
                color: color.to_hex(),
            });
        }
    }

    Ok(())
}

/// Validate a decoded order image
pub fn validate_order(raster: &Raster) -> Result<(), OrderRejection> {
    validate_order_pixels(raster.as_bytes())
}

/// Decode an uploaded file and validate it in one step
pub fn validate_order_image(bytes: &[u8]) -> Result<Raster, OrderRejection> {
    let raster = Raster::decode(bytes).map_err(|_| OrderRejection::Unreadable)?;
    validate_order(&raster)?;
    Ok(raster)
}
