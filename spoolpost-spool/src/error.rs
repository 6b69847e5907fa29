//! Error types for the spoolpost-spool crate.

use std::{io, path::PathBuf};

use spoolpost_common::{Message, MessageParseError};
use thiserror::Error;

/// Errors raised while taking a message off the inbound queue.
///
/// None of these are fatal: the poll cycle that hit one is abandoned and the
/// next cycle starts from a fresh directory listing.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// The inbound directory could not be listed.
    #[error("Failed to list {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The selected queue file could not be read or parsed.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: MessageParseError,
    },

    /// The file parsed, but could not be moved to the outbound directory.
    ///
    /// The parsed message is kept so the caller can still inspect it.
    #[error("Failed to archive {from} to {to}: {source}")]
    Archive {
        from: PathBuf,
        to: PathBuf,
        message: Box<Message>,
        #[source]
        source: io::Error,
    },
}

impl SpoolError {
    /// The parsed message, when the failure happened after parsing.
    #[must_use]
    pub fn message(&self) -> Option<&Message> {
        match self {
            Self::Archive { message, .. } => Some(message),
            Self::List { .. } | Self::Parse { .. } => None,
        }
    }
}

/// Specialized `Result` type for spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;
