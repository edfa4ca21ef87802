//! AiGuard Core
//!
//! Shared building blocks for the AiGuard safety-filtering layer:
//! - Error types and result handling
//! - Text normalization applied before rule matching
//! - Streaming and non-streaming output event types

pub mod error;
pub mod events;
pub mod normalize;

pub use error::{Error, Result};
pub use events::{Completion, FinishReason, StreamEvent};
pub use normalize::normalize;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::events::{Completion, FinishReason, StreamEvent};
    pub use crate::normalize::normalize;
}
