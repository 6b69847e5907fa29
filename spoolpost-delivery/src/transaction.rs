//! SMTP transaction execution
//!
//! One transaction hands one message to the relay. The steps run strictly in
//! order and the first failure ends the transaction:
//! - TLS dial
//! - greeting and `EHLO`
//! - `AUTH PLAIN` as the configured sender
//! - `MAIL FROM`, then `RCPT TO` per recipient
//! - `DATA`, the rendered message, and the closing dot
//! - `QUIT`

use spoolpost_common::{Config, Message, envelope::Envelope, internal, tracing};

use crate::{
    error::{DeliveryError, Step},
    session::{Connector, MailSession},
};

pub struct SmtpTransaction<'a, C> {
    config: &'a Config,
    connector: &'a C,
    message: &'a Message,
    envelope: &'a Envelope<'a>,
}

impl<'a, C: Connector> SmtpTransaction<'a, C> {
    #[must_use]
    pub const fn new(
        config: &'a Config,
        connector: &'a C,
        message: &'a Message,
        envelope: &'a Envelope<'a>,
    ) -> Self {
        Self {
            config,
            connector,
            message,
            envelope,
        }
    }

    fn failed(&self, step: Step) -> impl FnOnce(spoolpost_smtp::ClientError) -> DeliveryError {
        let subject = self.message.subject().to_string();
        move |source| DeliveryError::Step {
            subject,
            step,
            source,
        }
    }

    /// Execute the complete SMTP transaction
    ///
    /// Once a session exists and a later step is refused by the relay, a
    /// `QUIT` is still sent before the connection is dropped. A `QUIT` that
    /// fails after the relay accepted the message is only a warning.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::NoRecipients`] before dialling when the `To` header
    /// holds no address, otherwise [`DeliveryError::Step`] for the first step
    /// that failed.
    #[tracing::instrument(level = "debug", skip_all, fields(subject = %self.message.subject()))]
    pub async fn execute(self) -> Result<(), DeliveryError> {
        if self.envelope.recipients().is_empty() {
            return Err(DeliveryError::NoRecipients {
                subject: self.message.subject().to_string(),
            });
        }

        if self.config.accept_invalid_certs {
            tracing::warn!(
                server = %self.config.smtp_server,
                "SECURITY WARNING: TLS certificate validation is disabled for this connection"
            );
        }

        let mut session = self
            .connector
            .connect(&self.config.smtp_server, self.config.smtp_port)
            .await
            .map_err(self.failed(Step::Connect))?;

        if let Err(err) = self.converse(&mut session).await {
            if err.is_rejection() {
                internal!(level = DEBUG, "Ending aborted session");
                if let Err(quit) = session.quit().await {
                    internal!(level = DEBUG, "QUIT after abort failed: {quit}");
                }
            }

            return Err(err);
        }

        if let Err(err) = session.quit().await {
            tracing::warn!(
                server = %self.config.smtp_server,
                "QUIT failed after the message was accepted: {err}"
            );
        }

        Ok(())
    }

    async fn converse<S: MailSession>(&self, session: &mut S) -> Result<(), DeliveryError> {
        session
            .hello(&self.config.helo_name)
            .await
            .map_err(self.failed(Step::Greeting))?;

        session
            .authenticate(&self.config.sender, &self.config.password)
            .await
            .map_err(self.failed(Step::Auth))?;

        session
            .mail_from(self.envelope.sender())
            .await
            .map_err(self.failed(Step::MailFrom))?;

        for recipient in self.envelope.recipients() {
            session
                .rcpt_to(recipient)
                .await
                .map_err(self.failed(Step::RcptTo((*recipient).to_string())))?;
        }

        session.data().await.map_err(self.failed(Step::Data))?;

        let rendered = self.envelope.render(self.message);
        session
            .write(&rendered)
            .await
            .map_err(self.failed(Step::Write))?;

        session.finish().await.map_err(self.failed(Step::Finish))?;

        Ok(())
    }
}
