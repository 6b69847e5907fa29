//! SMTP reply parsing.

use super::error::{ClientError, Result};

/// One line of an SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub code: u16,
    /// `false` for `NNN-` continuation lines.
    pub is_last: bool,
    pub message: String,
}

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// The reply text, one line per reply line.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// First digit of the reply code.
    #[must_use]
    pub const fn class(&self) -> u16 {
        self.code / 100
    }

    /// Turn a reply outside `class` into [`ClientError::Rejected`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rejected`] carrying the code and text when the
    /// reply's first digit is not `class`.
    pub fn expect_class(self, class: u16) -> Result<Self> {
        if self.class() == class {
            Ok(self)
        } else {
            Err(ClientError::Rejected {
                code: self.code,
                message: self.message(),
            })
        }
    }

    /// Parse a single reply line, without its line terminator.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Parse`] if the line does not start with a
    /// three digit code, or the code is followed by something other than a
    /// space or a dash.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let Some(code) = line.get(..3) else {
            return Err(ClientError::Parse(format!(
                "Response line too short: '{line}'"
            )));
        };

        if !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ClientError::Parse(format!("Invalid status code: '{code}'")));
        }

        let code = code
            .parse::<u16>()
            .map_err(|_| ClientError::Parse(format!("Invalid status code: '{code}'")))?;

        let rest = &line[3..];
        let (is_last, message) = match rest.as_bytes().first() {
            None => (true, ""),
            Some(b' ') => (true, &rest[1..]),
            Some(b'-') => (false, &rest[1..]),
            Some(_) => {
                return Err(ClientError::Parse(format!(
                    "Invalid separator after status code: '{line}'"
                )));
            }
        };

        Ok(ResponseLine {
            code,
            is_last,
            message: message.to_string(),
        })
    }

    /// Parse one complete reply from the front of `buffer`.
    ///
    /// Returns the reply together with the number of bytes it used, or
    /// `None` when the buffer does not yet hold a complete reply. Lines may
    /// end in CRLF or a bare LF.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Parse`] if a line is malformed or the lines of
    /// a multi-line reply disagree on the code.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(end) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let text = String::from_utf8_lossy(raw);
            let line = Self::parse_line(&text)?;

            match code {
                Some(expected) if expected != line.code => {
                    return Err(ClientError::Parse(format!(
                        "Status code mismatch in multi-line response: expected {expected}, got {}",
                        line.code
                    )));
                }
                Some(_) => {}
                None => code = Some(line.code),
            }

            lines.push(line.message);

            if line.is_last {
                return Ok(Some((Self::new(line.code, lines), consumed)));
            }
        }

        Ok(None)
    }
}
