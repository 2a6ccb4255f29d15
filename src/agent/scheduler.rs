//! Placement loop.
//!
//! One attempt at a time: read the current order, assemble the live canvas,
//! diff, place one random pending pixel and sleep for whatever the response
//! dictates. Every wait goes through the shutdown listener so the loop ends
//! promptly on Ctrl-C.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::agent::canvas::{assemble_canvas, CanvasSource};
use crate::agent::cooldown::{parse_placement_response, PlacementOutcome, FALLBACK_DELAY};
use crate::agent::differ::{pending_work, progress_percent};
use crate::agent::order_loader::ActiveOrder;
use crate::coordination::ShutdownListener;
use crate::domain::PixelIndex;
use crate::error::{PlaceError, Result};
use crate::protocol::ClientMessage;

/// Wait while no order has arrived yet
pub const NO_ORDER_DELAY: Duration = Duration::from_secs(2);
/// Wait after a failed canvas assembly
pub const CANVAS_RETRY_DELAY: Duration = Duration::from_secs(10);
/// Wait when the canvas already matches the order
pub const IDLE_DELAY: Duration = Duration::from_secs(30);

/// Submits single-pixel placements to the painting service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlacementService: Send + Sync {
    /// Place `color` (palette index) at canvas coordinates `(x, y)` and return
    /// the raw response body.
    async fn place(&self, x: u32, y: u32, color: u8) -> Result<Value>;
}

pub struct PlacementScheduler {
    canvas: Arc<dyn CanvasSource>,
    placer: Arc<dyn PlacementService>,
    orders: watch::Receiver<Option<Arc<ActiveOrder>>>,
    /// Telemetry to the command server
    outbox: mpsc::Sender<ClientMessage>,
}

impl PlacementScheduler {
    pub fn new(
        canvas: Arc<dyn CanvasSource>,
        placer: Arc<dyn PlacementService>,
        orders: watch::Receiver<Option<Arc<ActiveOrder>>>,
        outbox: mpsc::Sender<ClientMessage>,
    ) -> Self {
        Self {
            canvas,
            placer,
            orders,
            outbox,
        }
    }

    /// Run attempts until shutdown.
    pub async fn run(mut self, mut shutdown: ShutdownListener) {
        info!("Placement loop started");
        loop {
            let delay = tokio::select! {
                delay = self.attempt() => delay,
                _ = shutdown.wait() => break,
            };
            debug!("Next placement attempt in {:?}", delay);
            if !shutdown.sleep(delay).await {
                break;
            }
        }
        info!("Placement loop stopped");
    }

    /// One pass of the loop. Returns how long to wait before the next one.
    pub async fn attempt(&mut self) -> Duration {
        let Some(order) = self.orders.borrow().clone() else {
            return NO_ORDER_DELAY;
        };

        let live = match assemble_canvas(self.canvas.as_ref()).await {
            Ok(live) => live,
            Err(e) => {
                warn!("Error loading canvas, trying again in {:?}: {}", CANVAS_RETRY_DELAY, e);
                return CANVAS_RETRY_DELAY;
            }
        };

        let pending = {
            let order = Arc::clone(&order);
            match tokio::task::spawn_blocking(move || {
                pending_work(&order.real_work, &order.raster, &live)
            })
            .await
            {
                Ok(pending) => pending,
                Err(e) => {
                    warn!("Work diff task failed: {}", e);
                    return FALLBACK_DELAY;
                }
            }
        };

        if pending.is_empty() {
            info!(
                "All pixels are where they should be! Trying again in {:?}",
                IDLE_DELAY
            );
            return IDLE_DELAY;
        }

        let target = pending[rand::thread_rng().gen_range(0..pending.len())];
        let (x, y) = target.coords();
        info!(
            x,
            y,
            complete = progress_percent(pending.len(), order.real_work.len()),
            remaining = pending.len(),
            "Attempting to place pixel"
        );

        match self.place(&order, target).await {
            Ok(delay) => delay,
            Err(e) => {
                warn!("Placement at {}, {} failed: {}", x, y, e);
                FALLBACK_DELAY
            }
        }
    }

    async fn place(&self, order: &ActiveOrder, target: PixelIndex) -> Result<Duration> {
        let (x, y) = target.coords();
        let color = order.raster.color_at(target);
        let index = color.palette_index().ok_or_else(|| {
            PlaceError::Validation(format!("order colour {} at {}, {} is not in the palette", color, x, y))
        })?;

        let report = ClientMessage::PlacePixel {
            x: i64::from(x),
            y: i64::from(y),
            color: Some(i64::from(index)),
        };
        if let Err(e) = self.outbox.try_send(report) {
            debug!("Placement report not queued: {}", e);
        }

        let response = self.placer.place(x, y, index).await?;
        let now = Utc::now().timestamp_millis();

        let outcome = parse_placement_response(&response)
            .and_then(|outcome| outcome.delay_from(now).map(|delay| (outcome, delay)));
        match outcome {
            Some((PlacementOutcome::Placed { .. }, delay)) => {
                info!(x, y, "Pixel placed! Next pixel in {:?}", delay);
                Ok(delay)
            }
            Some((PlacementOutcome::RateLimited { .. }, delay)) => {
                info!("Pixel placed too soon! Next pixel in {:?}", delay);
                Ok(delay)
            }
            None => {
                warn!(%response, "Error parsing placement response");
                Ok(FALLBACK_DELAY)
            }
        }
    }
}
