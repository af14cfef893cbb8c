//! Pure core of jobclock: the job record model, the raw-hit transformer and the
//! closed-form runtime/drain statistics. Nothing in here touches the network or disk.

pub mod drain;
pub mod model;
pub mod pattern;
pub mod stats;
pub mod time;
pub mod transform;

pub use drain::*;
pub use model::*;
pub use pattern::*;
pub use stats::*;
pub use time::*;
pub use transform::*;
