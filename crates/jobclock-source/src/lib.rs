//! Read-only adapters for the remote telemetry/queue search service.

pub mod elastic;
pub mod error;
pub mod memory;
pub mod query;
pub mod traits;

pub use elastic::*;
pub use error::*;
pub use memory::*;
pub use query::*;
pub use traits::*;
