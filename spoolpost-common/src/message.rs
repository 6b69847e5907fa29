//! Queue file parsing.
//!
//! A queue file is a block of header lines, one empty line, and the body:
//!
//! ```text
//! Subject: Weekly report\r\n
//! To: alice@example.com;bob@example.com\r\n
//! \r\n
//! body bytes, passed through untouched
//! ```
//!
//! Lines end at LF; a CR right before the LF is not part of the line. The
//! body starts right after the terminator of the first empty line, so a CRLF
//! file yields exactly the bytes following the first CRLFCRLF.

use std::{path::Path, time::SystemTime};

use chrono::{DateTime, Local};

use crate::{USER_AGENT, error::MessageParseError};

/// Files of this many bytes or fewer are rejected outright.
pub const MIN_MESSAGE_LENGTH: usize = 4;

/// RFC 1123 with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
const RFC1123Z: &str = "%a, %d %b %Y %H:%M:%S %z";

/// A single header field, unfolded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    name: String,
    value: String,
}

impl Header {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Field names compare exactly; `subject` does not match `Subject`.
    #[must_use]
    pub fn named(&self, name: &str) -> bool {
        self.name == name
    }
}

/// Ordered header block.
///
/// Keeps two views of the same data: the raw lines exactly as they appeared
/// (used for re-serialisation) and the parsed fields in insertion order (used
/// for lookups). Duplicate names are kept; lookups return the first one.
///
/// Raw lines stay bytes so they go back on the wire unchanged; only the
/// parsed view is decoded, with invalid UTF-8 replaced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    lines: Vec<Vec<u8>>,
    fields: Vec<Header>,
}

impl Headers {
    /// Append a raw header line.
    ///
    /// Lines starting with a space or tab continue the previous field. Lines
    /// without a colon are kept verbatim but are not addressable by name.
    pub fn push_line(&mut self, line: impl Into<Vec<u8>>) {
        let line = line.into();
        self.push_field(&String::from_utf8_lossy(&line));
        self.lines.push(line);
    }

    fn push_field(&mut self, text: &str) {
        if text.starts_with([' ', '\t']) {
            if let Some(last) = self.fields.last_mut() {
                last.value.push_str(text);
            }
        } else if let Some((name, value)) = text.split_once(':') {
            self.fields.push(Header {
                name: name.trim_end().to_string(),
                value: value.trim_start_matches(' ').to_string(),
            });
        }
    }

    /// Append a `name: value` field.
    pub fn push(&mut self, name: &str, value: &str) {
        self.push_line(format!("{name}: {value}"));
    }

    /// Value of the first field called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    /// Values of every field called `name`, in file order.
    pub fn get_all<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.fields
            .iter()
            .filter(move |header| header.named(name))
            .map(Header::value)
    }

    /// Raw header lines, verbatim and in order.
    #[must_use]
    pub fn lines(&self) -> &[Vec<u8>] {
        &self.lines
    }

    #[must_use]
    pub fn fields(&self) -> &[Header] {
        &self.fields
    }
}

/// Split a queue file into its raw header lines and the body.
fn split(bytes: &[u8]) -> (Vec<&[u8]>, &[u8]) {
    let mut lines = Vec::new();
    let mut rest = bytes;

    while !rest.is_empty() {
        let (line, next) = rest
            .iter()
            .position(|&b| b == b'\n')
            .map_or((rest, &rest[rest.len()..]), |end| {
                (&rest[..end], &rest[end + 1..])
            });
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        if line.is_empty() {
            return (lines, next);
        }

        lines.push(line);
        rest = next;
    }

    (lines, rest)
}

/// Format a timestamp the way the synthesized `Date` header carries it.
#[must_use]
pub fn rfc1123z(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format(RFC1123Z).to_string()
}

/// A message read from the inbound queue.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    headers: Headers,
    content: Vec<u8>,
}

impl Message {
    /// Parse the raw bytes of a queue file.
    ///
    /// `modified` is the file's last modification time, used for the `Date`
    /// header when the file carries none. A `User-Agent` header is always
    /// appended, and `Reply-To` when `reply_to` is a non-empty address.
    ///
    /// # Errors
    ///
    /// Returns [`MessageParseError::TooShort`] for inputs of
    /// [`MIN_MESSAGE_LENGTH`] bytes or fewer.
    pub fn parse(
        bytes: &[u8],
        modified: SystemTime,
        reply_to: Option<&str>,
    ) -> Result<Self, MessageParseError> {
        if bytes.len() <= MIN_MESSAGE_LENGTH {
            return Err(MessageParseError::TooShort(bytes.len()));
        }

        let (lines, body) = split(bytes);

        let mut headers = Headers::default();
        for line in lines {
            headers.push_line(line);
        }

        // An empty Date is as good as none
        if headers.get("Date").is_none_or(str::is_empty) {
            headers.push("Date", &rfc1123z(modified));
        }

        headers.push("User-Agent", USER_AGENT);

        if let Some(reply_to) = reply_to.filter(|address| !address.is_empty()) {
            headers.push("Reply-To", reply_to);
        }

        Ok(Self {
            headers,
            content: body.to_vec(),
        })
    }

    /// Read and parse the queue file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageParseError::Io`] if the file cannot be read or its
    /// metadata inspected, and any error from [`Message::parse`].
    pub async fn load(
        path: impl AsRef<Path>,
        reply_to: Option<&str>,
    ) -> Result<Self, MessageParseError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let modified = tokio::fs::metadata(path).await?.modified()?;

        Self::parse(&bytes, modified, reply_to)
    }

    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The body, byte for byte.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Value of the first header called `name`, or `""` when there is none.
    ///
    /// A missing header and a header with an empty value look the same here;
    /// use [`Headers::get`] to tell them apart.
    #[must_use]
    pub fn header(&self, name: &str) -> &str {
        self.headers.get(name).unwrap_or_default()
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        self.header("Subject")
    }

    /// The `To` header split on `;`, untrimmed.
    ///
    /// A message without a `To` header yields `[""]`.
    #[must_use]
    pub fn recipients(&self) -> Vec<&str> {
        self.header("To").split(';').collect()
    }
}
