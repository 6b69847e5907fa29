//! Delivery error types.

use std::fmt;

use spoolpost_smtp::ClientError;
use thiserror::Error;

/// A step of the delivery transaction, in the order they run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// TCP connect and TLS handshake.
    Connect,
    /// Server greeting and `EHLO`.
    Greeting,
    Auth,
    MailFrom,
    RcptTo(String),
    Data,
    /// Writing the rendered message into the data stream.
    Write,
    /// Closing the data stream; the server commits the message here.
    Finish,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => f.write_str("tls dial"),
            Self::Greeting => f.write_str("create client"),
            Self::Auth => f.write_str("plain auth"),
            Self::MailFrom => f.write_str("set sender"),
            Self::RcptTo(recipient) => write!(f, "set recipient {recipient}"),
            Self::Data => f.write_str("init writer"),
            Self::Write => f.write_str("write message"),
            Self::Finish => f.write_str("close writer"),
        }
    }
}

/// Why a message was not delivered.
///
/// There are no retries: the message stays archived in the outbound
/// directory and this error is the only record of the failure.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The `To` header held no usable address; nothing was dialled.
    #[error("Could not send mail (no recipients) {subject}")]
    NoRecipients { subject: String },

    /// A step of the SMTP exchange failed.
    #[error("Could not send mail ({step}) {subject} - {source}")]
    Step {
        subject: String,
        step: Step,
        #[source]
        source: ClientError,
    },
}

impl DeliveryError {
    #[must_use]
    pub fn subject(&self) -> &str {
        match self {
            Self::NoRecipients { subject } | Self::Step { subject, .. } => subject,
        }
    }

    /// The step that failed, if the exchange got as far as dialling.
    #[must_use]
    pub const fn step(&self) -> Option<&Step> {
        match self {
            Self::NoRecipients { .. } => None,
            Self::Step { step, .. } => Some(step),
        }
    }

    /// Whether a command was refused, by the relay or before it was sent,
    /// as opposed to the connection failing underneath the session.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Step {
                source: ClientError::Rejected { .. } | ClientError::InvalidLine { .. },
                ..
            }
        )
    }
}
