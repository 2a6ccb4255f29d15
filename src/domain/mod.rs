pub mod geometry;
pub mod order;
pub mod palette;
pub mod raster;

pub use geometry::*;
pub use order::*;
pub use palette::*;
pub use raster::*;
