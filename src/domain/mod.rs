pub mod battery;
pub mod timeseries;
pub mod types;

pub use battery::*;
pub use timeseries::*;
pub use types::*;
