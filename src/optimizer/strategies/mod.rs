//! Optimization Strategies
//!
//! - Horizon: receding-horizon control over a pluggable `HorizonSolver`
//! - LP: linear program for the horizon (exact solution, `optimization` feature)

pub mod horizon;
pub mod lp;

pub use horizon::*;
pub use lp::*;
