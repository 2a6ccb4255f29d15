pub mod adapters;
pub mod agent;
pub mod api;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod protocol;
pub mod validation;

pub use config::AppConfig;
pub use coordination::{ConnectionRegistry, LivenessSnapshot, Shutdown, ShutdownListener, ShutdownSignal};
pub use domain::{Order, OrderHistory, PixelIndex, Raster, Rgb, TileId};
pub use error::{OrderRejection, PlaceError, Result};
pub use persistence::HistoryStore;
pub use protocol::{ClientMessage, ServerMessage};
