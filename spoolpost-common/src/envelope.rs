use std::io::{self, Write};

use crate::{Config, message::Message};

/// SMTP envelope for one message: who it is from and who receives it.
///
/// Recipients come from the message's `To` header; blank entries (an absent
/// header, a trailing `;`) are dropped and the rest trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<'a> {
    sender: &'a str,
    sender_name: Option<&'a str>,
    recipients: Vec<&'a str>,
}

impl<'a> Envelope<'a> {
    #[must_use]
    pub fn new(config: &'a Config, message: &'a Message) -> Self {
        Self {
            sender: &config.sender,
            sender_name: config.sender_name(),
            recipients: message
                .recipients()
                .into_iter()
                .map(str::trim)
                .filter(|address| !address.is_empty())
                .collect(),
        }
    }

    /// Returns the envelope sender (`MAIL FROM`)
    #[inline]
    #[must_use]
    pub const fn sender(&self) -> &str {
        self.sender
    }

    /// Returns the addresses to issue `RCPT TO` for, in header order
    #[inline]
    #[must_use]
    pub fn recipients(&self) -> &[&'a str] {
        &self.recipients
    }

    /// Value of the `From` header.
    #[must_use]
    pub fn from_header(&self) -> String {
        self.sender_name.map_or_else(
            || self.sender.to_string(),
            |name| format!("{name} <{}>", self.sender),
        )
    }

    /// Serialize `message` for the DATA phase.
    ///
    /// Writes `From`, every stored header line verbatim, a blank line and the
    /// body untouched. Lines are CRLF-terminated. The first failed write is
    /// returned as is; whatever was already written stays written.
    ///
    /// # Errors
    ///
    /// Propagates any error from `sink`.
    pub fn write_message<W: Write>(&self, message: &Message, sink: &mut W) -> io::Result<()> {
        write!(sink, "From: {}\r\n", self.from_header())?;

        for line in message.headers().lines() {
            sink.write_all(line)?;
            sink.write_all(b"\r\n")?;
        }

        sink.write_all(b"\r\n")?;
        sink.write_all(message.content())
    }

    /// [`Envelope::write_message`] into a fresh buffer.
    #[must_use]
    pub fn render(&self, message: &Message) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(message.content().len() + 512);
        // Writing into a Vec cannot fail
        let _ = self.write_message(message, &mut buffer);
        buffer
    }
}
