//! Error types for oracle construction and generation.

use thiserror::Error;

/// Result type for oracle operations.
pub type OracleResult<T> = Result<T, OracleError>;

/// Errors that can occur while building oracles or generating from them.
///
/// Per-step synchronization problems (a voice absent at an offset, a gap to
/// fill, a transition past a voice's end) are recovered inside the generators
/// and never surface here.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Invalid input matrix, weights, mask, threshold or distance selector.
    #[error("configuration error: {message}")]
    Configuration {
        /// Error message.
        message: String,
    },

    /// A voice's offsets cannot be aligned with its oracle.
    #[error("alignment error in voice '{voice}': {message}")]
    Alignment {
        /// Voice key.
        voice: String,
        /// Error message.
        message: String,
    },

    /// A generation request could not produce the requested number of
    /// valid sequences.
    #[error(
        "generation exhausted: produced {produced} of {requested} sequences after {attempts} attempts ({reason})"
    )]
    Exhaustion {
        /// Number of sequences requested.
        requested: usize,
        /// Number of valid sequences produced before giving up.
        produced: usize,
        /// Attempts made.
        attempts: usize,
        /// Why the loop stopped.
        reason: String,
    },
}

impl OracleError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an alignment error for a voice.
    pub fn alignment(voice: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Alignment {
            voice: voice.into(),
            message: message.into(),
        }
    }

    /// Stable error code for reporting.
    pub fn code(&self) -> &'static str {
        match self {
            OracleError::Configuration { .. } => "ORACLE_001",
            OracleError::Alignment { .. } => "ORACLE_002",
            OracleError::Exhaustion { .. } => "ORACLE_003",
        }
    }

    /// Error category for grouping.
    pub fn category(&self) -> &'static str {
        "oracle"
    }
}
