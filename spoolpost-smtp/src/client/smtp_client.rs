//! Step-wise SMTP client.
//!
//! Each method performs one command/reply exchange and checks the reply
//! class, so callers can tell exactly which step of a transaction failed.

use std::{future::Future, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD};
use spoolpost_common::{SmtpTimeouts, incoming, outgoing};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{
    error::{ClientError, Result},
    response::Response,
    tls::{TlsStream, connect_tls},
};

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// An SMTP client speaking over any byte stream.
///
/// Production code runs it over [`TlsStream`]; tests drive it over an
/// in-memory duplex pipe.
pub struct SmtpClient<S = TlsStream> {
    stream: S,
    buffer: Vec<u8>,
    buffer_pos: usize,
    timeouts: SmtpTimeouts,
    /// Dot-stuffing state while inside `DATA`.
    at_line_start: bool,
    last_byte: Option<u8>,
}

impl SmtpClient<TlsStream> {
    /// Dial `server:port` with implicit TLS.
    ///
    /// # Errors
    ///
    /// See [`connect_tls`].
    pub async fn connect(
        server: &str,
        port: u16,
        accept_invalid_certs: bool,
        timeouts: SmtpTimeouts,
    ) -> Result<Self> {
        let stream = connect_tls(server, port, accept_invalid_certs, timeouts.connect()).await?;
        Ok(Self::new(stream, timeouts))
    }
}

impl<S> SmtpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, timeouts: SmtpTimeouts) -> Self {
        Self {
            stream,
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            timeouts,
            at_line_start: true,
            last_byte: None,
        }
    }

    async fn bounded<T>(
        operation: &'static str,
        after: Duration,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(after, future)
            .await
            .map_err(|_| ClientError::Timeout { operation, after })?
    }

    async fn send(&mut self, line: &str) -> Result<()> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads a complete SMTP response from the server.
    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{} {}", response.code, response.message());
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::Parse(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let n = self.stream.read(&mut self.buffer[self.buffer_pos..]).await?;
            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            self.buffer_pos += n;
        }
    }

    /// Send `line` and wait for a reply of the given class.
    async fn exchange(
        &mut self,
        operation: &'static str,
        line: &str,
        logged: &str,
        class: u16,
    ) -> Result<Response> {
        outgoing!("{logged}");

        let after = self.timeouts.command();
        Self::bounded(operation, after, async {
            self.send(line).await?;
            self.read_response().await
        })
        .await?
        .expect_class(class)
    }

    /// Read the server greeting, which must be a 2xx reply.
    ///
    /// # Errors
    ///
    /// Network failures, timeouts, or [`ClientError::Rejected`] for any other
    /// reply.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        let after = self.timeouts.command();
        Self::bounded("greeting", after, self.read_response())
            .await?
            .expect_class(2)
    }

    /// # Errors
    ///
    /// Network failures, timeouts, or [`ClientError::Rejected`].
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        let line = format!("EHLO {domain}");
        self.exchange("EHLO", &line, &line, 2).await
    }

    /// Authenticate with `AUTH PLAIN` and an initial response.
    ///
    /// The credentials never reach the log.
    ///
    /// # Errors
    ///
    /// Network failures, timeouts, or [`ClientError::Rejected`] when the
    /// server does not answer 235.
    pub async fn auth_plain(&mut self, username: &str, password: &str) -> Result<Response> {
        let token = STANDARD.encode(format!("\0{username}\0{password}"));
        let line = format!("AUTH PLAIN {token}");
        self.exchange("AUTH", &line, "AUTH PLAIN <redacted>", 2)
            .await
    }

    /// # Errors
    ///
    /// [`ClientError::InvalidLine`] if `from` holds a line break, otherwise
    /// network failures, timeouts, or [`ClientError::Rejected`].
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        single_line("MAIL FROM", from)?;
        let line = format!("MAIL FROM:<{from}>");
        self.exchange("MAIL FROM", &line, &line, 2).await
    }

    /// # Errors
    ///
    /// [`ClientError::InvalidLine`] if `to` holds a line break, otherwise
    /// network failures, timeouts, or [`ClientError::Rejected`].
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        single_line("RCPT TO", to)?;
        let line = format!("RCPT TO:<{to}>");
        self.exchange("RCPT TO", &line, &line, 2).await
    }

    /// Send `DATA` and expect the server to ask for the message (3xx).
    ///
    /// # Errors
    ///
    /// Network failures, timeouts, or [`ClientError::Rejected`].
    pub async fn data(&mut self) -> Result<Response> {
        let response = self.exchange("DATA", "DATA", "DATA", 3).await?;
        self.at_line_start = true;
        self.last_byte = None;
        Ok(response)
    }

    /// Dot-stuff `chunk` and turn bare LFs into CRLF.
    fn encode(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(chunk.len() + chunk.len() / 64 + 2);

        for &byte in chunk {
            if self.at_line_start && byte == b'.' {
                encoded.push(b'.');
            }

            if byte == b'\n' && self.last_byte != Some(b'\r') {
                encoded.push(b'\r');
            }

            encoded.push(byte);
            self.at_line_start = byte == b'\n';
            self.last_byte = Some(byte);
        }

        encoded
    }

    /// Stream part of the message after a successful [`Self::data`].
    ///
    /// May be called any number of times; line state carries over between
    /// calls.
    ///
    /// # Errors
    ///
    /// Network failures or timeouts.
    pub async fn write_data(&mut self, chunk: &[u8]) -> Result<()> {
        let encoded = self.encode(chunk);
        outgoing!("[{} bytes of message data]", encoded.len());

        let after = self.timeouts.data();
        Self::bounded("message write", after, async {
            self.stream.write_all(&encoded).await?;
            Ok(())
        })
        .await
    }

    /// Terminate the message and wait for the server to take it.
    ///
    /// # Errors
    ///
    /// Network failures, timeouts, or [`ClientError::Rejected`] when the
    /// message is refused.
    pub async fn finish_data(&mut self) -> Result<Response> {
        let terminator: &[u8] = if self.at_line_start {
            b".\r\n"
        } else {
            b"\r\n.\r\n"
        };
        outgoing!(".");

        let after = self.timeouts.data();
        let response = Self::bounded("message commit", after, async {
            self.stream.write_all(terminator).await?;
            self.stream.flush().await?;
            self.read_response().await
        })
        .await?;

        self.at_line_start = true;
        self.last_byte = None;
        response.expect_class(2)
    }

    /// # Errors
    ///
    /// Network failures, timeouts, or [`ClientError::Rejected`].
    pub async fn quit(&mut self) -> Result<Response> {
        self.exchange("QUIT", "QUIT", "QUIT", 2).await
    }
}

/// Refuse arguments that would split a command into several lines.
fn single_line(operation: &'static str, argument: &str) -> Result<()> {
    if argument.contains(['\r', '\n']) {
        return Err(ClientError::InvalidLine { operation });
    }
    Ok(())
}
