mod tracing;

pub use tracing::{init, init_with_level};
