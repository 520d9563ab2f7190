//! Corpus loading.
//!
//! Corpora are JSON files. A single-voice corpus carries one feature matrix;
//! a multi-voice corpus carries one matrix and one offset list per voice.
//! Both loaders return the parsed corpus together with a BLAKE3 hash of the
//! source text, which the commands report alongside their results.

use refrain_oracle::{Corpus, MultiCorpus, OracleError};
use std::path::{Path, PathBuf};

use crate::commands::json_output::error_codes;

/// Recognized corpus extensions.
pub const JSON_EXTENSIONS: &[&str] = &["json"];

/// A loaded corpus with its source provenance.
#[derive(Debug)]
pub struct Loaded<T> {
    /// The parsed corpus.
    pub corpus: T,
    /// BLAKE3 hash of the file content (hex string).
    pub source_hash: String,
    /// Path the corpus was read from.
    pub path: PathBuf,
}

/// Errors that can occur during corpus loading.
#[derive(Debug)]
pub enum InputError {
    /// File could not be read.
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Unknown file extension.
    UnknownExtension { extension: Option<String> },

    /// The file is not a valid corpus.
    InvalidCorpus { source: OracleError },
}

impl std::fmt::Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputError::FileRead { path, source } => {
                write!(f, "failed to read file '{}': {}", path.display(), source)
            }
            InputError::UnknownExtension { extension } => match extension {
                Some(ext) => write!(f, "unknown file extension '.{}' (expected .json)", ext),
                None => write!(f, "file has no extension (expected .json)"),
            },
            InputError::InvalidCorpus { source } => write!(f, "{}", source),
        }
    }
}

impl std::error::Error for InputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InputError::FileRead { source, .. } => Some(source),
            InputError::InvalidCorpus { source } => Some(source),
            _ => None,
        }
    }
}

impl InputError {
    /// Stable error code for JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            InputError::FileRead { .. } => error_codes::FILE_READ,
            InputError::UnknownExtension { .. } => error_codes::UNKNOWN_EXTENSION,
            InputError::InvalidCorpus { source } => source.code(),
        }
    }
}

/// Loads a single-voice corpus.
pub fn load_corpus(path: &Path) -> Result<Loaded<Corpus>, InputError> {
    let content = read_json(path)?;
    let corpus =
        Corpus::from_json(&content).map_err(|source| InputError::InvalidCorpus { source })?;
    Ok(Loaded {
        corpus,
        source_hash: hash_source(&content),
        path: path.to_path_buf(),
    })
}

/// Loads a multi-voice corpus.
pub fn load_multi_corpus(path: &Path) -> Result<Loaded<MultiCorpus>, InputError> {
    let content = read_json(path)?;
    let corpus =
        MultiCorpus::from_json(&content).map_err(|source| InputError::InvalidCorpus { source })?;
    Ok(Loaded {
        corpus,
        source_hash: hash_source(&content),
        path: path.to_path_buf(),
    })
}

fn read_json(path: &Path) -> Result<String, InputError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase());

    match extension.as_deref() {
        Some(ext) if JSON_EXTENSIONS.contains(&ext) => {
            std::fs::read_to_string(path).map_err(|e| InputError::FileRead {
                path: path.to_path_buf(),
                source: e,
            })
        }
        _ => Err(InputError::UnknownExtension { extension }),
    }
}

fn hash_source(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}
