//! Error types for the graph evaluator
//!
//! Only instantiation-time failures surface as `Result`s (a bad compiled
//! graph refuses to instantiate). Per-tick failures are recovered locally
//! and never cross the tick boundary — see `flint_animation::observer`.

use thiserror::Error;

/// The error type for Flint animation-graph operations.
#[derive(Debug, Error)]
pub enum FlintError {
    /// The compiled graph description is structurally invalid: a dangling
    /// child/value-node index, a non-monotonic index, or a cycle.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A referenced resource (clip, skeleton, bone mask) could not be
    /// resolved from the supplied `GraphResources`.
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Animation error: {0}")]
    AnimationError(String),
}

/// Result type alias for Flint animation operations.
pub type Result<T> = std::result::Result<T, FlintError>;
