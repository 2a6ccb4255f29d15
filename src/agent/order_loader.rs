use std::sync::Arc;
use tracing::info;

use crate::agent::differ::real_work;
use crate::domain::{PixelIndex, Raster, CANVAS_HEIGHT, CANVAS_WIDTH};
use crate::error::{PlaceError, Result};

/// The order an agent is currently painting, decoded once per `map` message.
#[derive(Debug, Clone)]
pub struct ActiveOrder {
    pub file_ref: String,
    pub reason: Option<String>,
    pub raster: Arc<Raster>,
    /// Non-transparent pixels of the order
    pub real_work: Arc<Vec<PixelIndex>>,
}

impl ActiveOrder {
    pub fn from_raster(file_ref: impl Into<String>, reason: Option<String>, raster: Raster) -> Result<Self> {
        raster.ensure_size(CANVAS_WIDTH, CANVAS_HEIGHT)?;
        let work = real_work(&raster);
        Ok(Self {
            file_ref: file_ref.into(),
            reason,
            raster: Arc::new(raster),
            real_work: Arc::new(work),
        })
    }
}

/// Downloads order images from the command server
#[derive(Debug, Clone)]
pub struct OrderLoader {
    client: reqwest::Client,
    maps_url: String,
}

impl OrderLoader {
    pub fn new(client: reqwest::Client, maps_url: impl Into<String>) -> Self {
        Self {
            client,
            maps_url: maps_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn image_url(&self, file_ref: &str) -> String {
        format!("{}/{}", self.maps_url, file_ref)
    }

    pub async fn load(&self, file_ref: &str, reason: Option<String>) -> Result<ActiveOrder> {
        let url = self.image_url(file_ref);
        let bytes = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let file = file_ref.to_string();
        let order = tokio::task::spawn_blocking(move || {
            let raster = Raster::decode(&bytes)?;
            ActiveOrder::from_raster(file, reason, raster)
        })
        .await
        .map_err(|e| PlaceError::Internal(format!("order decode task failed: {}", e)))??;

        info!(
            file = %order.file_ref,
            pixels = order.real_work.len(),
            "Order loaded"
        );
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_url_joins_cleanly() {
        let loader = OrderLoader::new(reqwest::Client::new(), "http://127.0.0.1:3987/maps/");
        assert_eq!(loader.image_url("1.png"), "http://127.0.0.1:3987/maps/1.png");
    }

    #[test]
    fn test_order_must_cover_the_canvas() {
        let err = ActiveOrder::from_raster("x.png", None, Raster::transparent(1000, 1000)).unwrap_err();
        assert!(matches!(err, PlaceError::RasterSize { .. }));

        let order =
            ActiveOrder::from_raster("blank.png", None, Raster::transparent(CANVAS_WIDTH, CANVAS_HEIGHT))
                .unwrap();
        assert!(order.real_work.is_empty());
    }
}
