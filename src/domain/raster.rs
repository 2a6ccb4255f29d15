use std::io::Cursor;

use image::{ImageFormat, RgbaImage};

use super::geometry::{PixelIndex, CANVAS_HEIGHT, CANVAS_WIDTH};
use super::palette::Rgb;
use crate::error::{PlaceError, Result};

/// Row-major RGBA8 pixel buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Raster {
    /// Fully transparent raster.
    pub fn transparent(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Raster filled with one opaque colour.
    pub fn filled(width: u32, height: u32, color: Rgb) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&[color.r, color.g, color.b, 255]);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(PlaceError::Validation(format!(
                "RGBA buffer of {} bytes does not match {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Decode any supported image (PNG in practice) into RGBA8.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = image.dimensions();
        Ok(Self {
            width,
            height,
            data: image.into_raw(),
        })
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let image = RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| PlaceError::Internal("raster buffer size mismatch".to_string()))?;
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn is_canvas_sized(&self) -> bool {
        self.width == CANVAS_WIDTH && self.height == CANVAS_HEIGHT
    }

    /// Fails unless the raster has exactly the given dimensions.
    pub fn ensure_size(&self, width: u32, height: u32) -> Result<()> {
        if self.width == width && self.height == height {
            return Ok(());
        }
        Err(PlaceError::RasterSize {
            expected_width: width,
            expected_height: height,
            width: self.width,
            height: self.height,
        })
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    pub fn rgba_at(&self, x: u32, y: u32) -> [u8; 4] {
        let o = self.offset(x, y);
        [self.data[o], self.data[o + 1], self.data[o + 2], self.data[o + 3]]
    }

    pub fn set_rgba(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let o = self.offset(x, y);
        self.data[o..o + 4].copy_from_slice(&rgba);
    }

    /// Colour of a canvas pixel. Only meaningful on a 2000×2000 raster.
    pub fn color_at(&self, index: PixelIndex) -> Rgb {
        let o = index.rgba_offset();
        Rgb::new(self.data[o], self.data[o + 1], self.data[o + 2])
    }

    pub fn alpha_at(&self, index: PixelIndex) -> u8 {
        self.data[index.rgba_offset() + 3]
    }

    /// Copy `src` into this raster with its top-left corner at `(x0, y0)`.
    /// Rows or columns falling outside this raster are clipped.
    pub fn blit(&mut self, src: &Raster, x0: u32, y0: u32) {
        if x0 >= self.width || y0 >= self.height {
            return;
        }
        let cols = src.width.min(self.width - x0) as usize;
        let rows = src.height.min(self.height - y0);
        for row in 0..rows {
            let src_start = row as usize * src.width as usize * 4;
            let dst_start = self.offset(x0, y0 + row);
            self.data[dst_start..dst_start + cols * 4]
                .copy_from_slice(&src.data[src_start..src_start + cols * 4]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blit_places_tile_at_offset() {
        let mut canvas = Raster::transparent(4, 4);
        let tile = Raster::filled(2, 2, Rgb::new(255, 0, 0));
        canvas.blit(&tile, 2, 2);

        assert_eq!(canvas.rgba_at(2, 2), [255, 0, 0, 255]);
        assert_eq!(canvas.rgba_at(3, 3), [255, 0, 0, 255]);
        assert_eq!(canvas.rgba_at(1, 1), [0, 0, 0, 0]);
        assert_eq!(canvas.rgba_at(2, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn test_blit_clips_oversized_source() {
        let mut canvas = Raster::transparent(3, 3);
        let tile = Raster::filled(4, 4, Rgb::new(1, 2, 3));
        canvas.blit(&tile, 1, 1);
        assert_eq!(canvas.rgba_at(2, 2), [1, 2, 3, 255]);
        assert_eq!(canvas.rgba_at(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_png_round_trip_preserves_pixels() {
        let mut raster = Raster::transparent(3, 2);
        raster.set_rgba(1, 1, [0x6D, 0x00, 0x1A, 255]);
        let png = raster.encode_png().unwrap();
        let decoded = Raster::decode(&png).unwrap();
        assert_eq!(decoded, raster);
    }

    #[test]
    fn test_from_rgba_checks_length() {
        assert!(Raster::from_rgba(2, 2, vec![0; 15]).is_err());
        assert!(Raster::from_rgba(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_ensure_size() {
        let raster = Raster::transparent(10, 20);
        assert!(raster.ensure_size(10, 20).is_ok());
        assert!(matches!(
            raster.ensure_size(20, 10),
            Err(PlaceError::RasterSize { width: 10, height: 20, .. })
        ));
    }
}
