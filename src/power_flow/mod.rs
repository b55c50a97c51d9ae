/// Power Flow Accounting
///
/// Loss models that turn gross generation into net bus power, and per-step
/// snapshots used to verify that every applied decision balances the bus.

pub mod losses;
pub mod snapshot;

pub use losses::{
    FractionalDerating, LossConditions, LossConfig, LossModel, LossPolicy, ResistiveLoss,
    COPPER_RESISTIVITY_OHM_M,
};
pub use snapshot::PowerSnapshot;
