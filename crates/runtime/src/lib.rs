pub mod epoch;
pub mod metrics;

pub use epoch::*;
pub use metrics::*;
