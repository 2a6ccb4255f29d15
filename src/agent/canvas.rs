use async_trait::async_trait;
use tracing::debug;

use crate::domain::{Raster, TileId, CANVAS_HEIGHT, CANVAS_WIDTH, TILE_HEIGHT, TILE_WIDTH};
use crate::error::Result;

/// Source of live canvas tiles
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CanvasSource: Send + Sync {
    /// Current 1000x1000 image of `tile`, read only after the service has
    /// announced the frame as ready.
    async fn fetch_tile(&self, tile: TileId) -> Result<Raster>;
}

/// Fetch all four tiles and stitch them into one canvas.
///
/// The composite is built in a fresh buffer and only returned once every tile
/// has arrived, so a failed fetch never leaves a half-updated canvas behind.
pub async fn assemble_canvas(source: &dyn CanvasSource) -> Result<Raster> {
    let mut canvas = Raster::transparent(CANVAS_WIDTH, CANVAS_HEIGHT);

    for tile in TileId::ALL {
        let image = source.fetch_tile(tile).await?;
        image.ensure_size(TILE_WIDTH, TILE_HEIGHT)?;
        let (x0, y0) = tile.origin();
        canvas.blit(&image, x0, y0);
        debug!(tile = %tile, "Tile composited");
    }

    Ok(canvas)
}
