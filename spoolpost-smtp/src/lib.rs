//! SMTP submission client used by the spoolpost dispatcher.
//!
//! Only the subset of the protocol needed to hand a single message to an
//! authenticated relay is implemented: implicit TLS, `EHLO`, `AUTH PLAIN`,
//! the envelope commands, `DATA` and `QUIT`.

pub mod client;

pub use client::{ClientError, Response, SmtpClient, TlsStream};
