//! The seam between the delivery transaction and the wire.
//!
//! [`SmtpTransaction`](crate::SmtpTransaction) only ever talks to a
//! [`MailSession`] obtained from a [`Connector`], which lets the poll loop be
//! exercised without a network.

use async_trait::async_trait;
use spoolpost_common::{Config, SmtpTimeouts};
use spoolpost_smtp::{ClientError, Response, SmtpClient, TlsStream};
use tokio::io::{AsyncRead, AsyncWrite};

/// One open connection to the relay.
///
/// Every method maps onto one SMTP exchange and fails when the reply is not
/// the one the exchange expects.
#[async_trait]
pub trait MailSession: Send {
    /// Read the greeting and introduce ourselves.
    async fn hello(&mut self, domain: &str) -> Result<Response, ClientError>;

    async fn authenticate(&mut self, username: &str, password: &str)
    -> Result<Response, ClientError>;

    async fn mail_from(&mut self, sender: &str) -> Result<Response, ClientError>;

    async fn rcpt_to(&mut self, recipient: &str) -> Result<Response, ClientError>;

    async fn data(&mut self) -> Result<Response, ClientError>;

    async fn write(&mut self, chunk: &[u8]) -> Result<(), ClientError>;

    /// Close the data stream and wait for the relay to accept the message.
    async fn finish(&mut self) -> Result<Response, ClientError>;

    async fn quit(&mut self) -> Result<Response, ClientError>;
}

/// Opens sessions to the relay.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: MailSession;

    async fn connect(&self, server: &str, port: u16) -> Result<Self::Session, ClientError>;
}

#[async_trait]
impl<S> MailSession for SmtpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn hello(&mut self, domain: &str) -> Result<Response, ClientError> {
        self.read_greeting().await?;
        self.ehlo(domain).await
    }

    async fn authenticate(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<Response, ClientError> {
        self.auth_plain(username, password).await
    }

    async fn mail_from(&mut self, sender: &str) -> Result<Response, ClientError> {
        Self::mail_from(self, sender).await
    }

    async fn rcpt_to(&mut self, recipient: &str) -> Result<Response, ClientError> {
        Self::rcpt_to(self, recipient).await
    }

    async fn data(&mut self) -> Result<Response, ClientError> {
        Self::data(self).await
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), ClientError> {
        self.write_data(chunk).await
    }

    async fn finish(&mut self) -> Result<Response, ClientError> {
        self.finish_data().await
    }

    async fn quit(&mut self) -> Result<Response, ClientError> {
        Self::quit(self).await
    }
}

/// Dials the relay with implicit TLS.
#[derive(Debug, Clone, Copy)]
pub struct RelayConnector {
    accept_invalid_certs: bool,
    timeouts: SmtpTimeouts,
}

impl RelayConnector {
    #[must_use]
    pub const fn new(accept_invalid_certs: bool, timeouts: SmtpTimeouts) -> Self {
        Self {
            accept_invalid_certs,
            timeouts,
        }
    }

    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self::new(config.accept_invalid_certs, config.timeouts)
    }
}

#[async_trait]
impl Connector for RelayConnector {
    type Session = SmtpClient<TlsStream>;

    async fn connect(&self, server: &str, port: u16) -> Result<Self::Session, ClientError> {
        SmtpClient::connect(server, port, self.accept_invalid_certs, self.timeouts).await
    }
}
