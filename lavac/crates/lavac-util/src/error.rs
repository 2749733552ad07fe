//! Core error types for lavac-util.

use thiserror::Error;

/// Error type for arena allocation
#[derive(Debug, Error)]
pub enum ArenaError {
    /// The arena reached its configured byte limit
    #[error("arena exhausted: requested {requested} bytes, limit {limit} bytes")]
    Exhausted { requested: usize, limit: usize },
}

/// Result type alias for arena operations
pub type ArenaResult<T> = std::result::Result<T, ArenaError>;
