pub mod config;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod message;

pub use tracing;

pub use config::{Config, SmtpTimeouts};
pub use error::{ConfigError, MessageParseError};
pub use message::{Header, Headers, Message};

/// Product identifier written into the `User-Agent` header of every message.
pub const USER_AGENT: &str = "spoolpost";

#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}
