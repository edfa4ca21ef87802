//! AiGuard Stream
//!
//! The streaming half of the safety filter: a pull-based generator trait, a
//! per-response buffering session that reassembles patterns across chunk
//! boundaries, and the orchestrator that wires generator, normalizer, and
//! rule engine into one filtered event stream.

pub mod generator;
pub mod orchestrator;
pub mod session;

pub use generator::{ScriptedGenerator, TextGenerator};
pub use orchestrator::Orchestrator;
pub use session::{GuardConfig, StreamSession};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::generator::{ScriptedGenerator, TextGenerator};
    pub use crate::orchestrator::Orchestrator;
    pub use crate::session::{GuardConfig, StreamSession};
}
