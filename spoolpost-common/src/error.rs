//! Error types for the spoolpost-common crate.
//!
//! Configuration errors are fatal at startup; message parse errors only abort
//! the poll cycle that produced them.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors raised while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration is not valid YAML or does not match the schema.
    #[error("Malformed config: {0}")]
    Malformed(#[from] serde_yaml::Error),

    /// A required field is missing or empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A queue directory does not exist or cannot be inspected.
    #[error("{field} ({path}) is not accessible: {source}")]
    QueueUnavailable {
        field: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A queue path exists but is not a directory.
    #[error("{field} ({path}) is not a directory")]
    NotADirectory { field: &'static str, path: PathBuf },
}

/// Errors that can occur while turning a queue file into a [`crate::Message`].
#[derive(Debug, Error)]
pub enum MessageParseError {
    /// The file could not be opened, read or inspected.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file holds too few bytes to be a message.
    #[error("file too short ({0} bytes)")]
    TooShort(usize),
}
