//! JSON output types for machine-readable CLI output.
//!
//! Every command wraps its result in a [`CommandOutput`] envelope when run
//! with `--json`, so tools can check `success` and read stable error codes
//! without parsing human-readable text.

use anyhow::{Context, Result};
use refrain_oracle::OracleError;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::input::InputError;

/// Error codes for CLI operations.
///
/// Library failures pass their own codes through (`ORACLE_001..003`).
pub mod error_codes {
    /// File could not be read
    pub const FILE_READ: &str = "CLI_001";
    /// Unknown file extension
    pub const UNKNOWN_EXTENSION: &str = "CLI_002";
    /// Any other failure
    pub const INTERNAL: &str = "CLI_010";
}

/// A structured error in JSON output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonError {
    /// Stable error code (e.g., "CLI_001", "ORACLE_002")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Source file path (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl JsonError {
    /// Creates a new error with code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            file: None,
        }
    }

    /// Sets the file path.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Builds an error from any failure, recovering the stable code when the
    /// failure came from corpus loading or the oracle library.
    pub fn from_error(error: &anyhow::Error) -> Self {
        let code = error
            .chain()
            .find_map(|cause| {
                cause
                    .downcast_ref::<OracleError>()
                    .map(OracleError::code)
                    .or_else(|| cause.downcast_ref::<InputError>().map(InputError::code))
            })
            .unwrap_or(error_codes::INTERNAL);
        Self::new(code, format!("{:#}", error))
    }
}

/// Envelope around every command result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput<T> {
    /// Whether the command succeeded
    pub success: bool,
    /// Errors encountered
    pub errors: Vec<JsonError>,
    /// Command result (on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
}

impl<T> CommandOutput<T> {
    /// Creates a successful output.
    pub fn success(result: T) -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            result: Some(result),
        }
    }

    /// Creates a failed output.
    pub fn failure(errors: Vec<JsonError>) -> Self {
        Self {
            success: false,
            errors,
            result: None,
        }
    }
}

/// Prints `value` as pretty JSON to stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

/// Writes `value` as pretty JSON to `path`.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write output file: {}", path.display()))
}
