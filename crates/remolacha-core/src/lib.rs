//! Shared building blocks: identifier allocation and tracing setup.

pub mod id;
pub mod tracing;

pub use id::{ExhaustedError, IdAllocator};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
