pub mod checker;
pub mod evaluator;
pub mod executor;
pub mod timing;

pub use checker::{CheckOutcome, Checker};
pub use executor::{CheckTimeouts, HeartbeatExecutor};
pub use timing::{Checkpoints, PhaseDurations};
