pub mod constraints;
pub mod greedy;
pub mod strategies;
pub mod types;

pub use constraints::*;
pub use greedy::*;
pub use strategies::*;
pub use types::*;
