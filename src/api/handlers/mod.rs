pub mod orders;
pub mod stats;

pub use orders::*;
pub use stats::*;
