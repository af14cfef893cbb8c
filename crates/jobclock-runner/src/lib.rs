pub mod config;
pub mod estimate;
pub mod guard;
pub mod queue;
pub mod runner;
pub mod sync;

pub use config::*;
pub use estimate::*;
pub use guard::*;
pub use queue::*;
pub use runner::*;
pub use sync::*;
