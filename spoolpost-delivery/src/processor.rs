//! The dispatcher poll loop.

use std::path::PathBuf;

use spoolpost_common::{Config, Signal, envelope::Envelope, internal, tracing};
use spoolpost_spool::{Queue, QueuedMessage, SpoolError};
use tokio::sync::broadcast;

use crate::{session::Connector, transaction::SmtpTransaction};

/// What a single poll cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cycle {
    /// Nothing was waiting in the inbound directory.
    Idle,
    /// The message was archived and accepted by the relay.
    Delivered { archived: PathBuf },
    /// The message was archived but could not be delivered.
    Undelivered { archived: PathBuf },
    /// Listing, parsing or archiving failed; nothing was sent.
    Skipped,
}

/// Moves messages from the inbound directory to the relay, one per cycle.
pub struct Dispatcher<C> {
    config: Config,
    queue: Queue,
    connector: C,
}

impl<C: Connector> Dispatcher<C> {
    pub fn new(config: Config, connector: C) -> Self {
        let queue = Queue::from_config(&config);

        Self {
            config,
            queue,
            connector,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Run one poll cycle: take at most one message off the queue and try to
    /// deliver it.
    ///
    /// No failure escapes a cycle; each is logged and the next cycle starts
    /// from a fresh listing.
    pub async fn run_once(&self) -> Cycle {
        let queued = match self.queue.take().await {
            Ok(Some(queued)) => queued,
            Ok(None) => return Cycle::Idle,
            Err(err) => {
                report_spool_error(&err);
                return Cycle::Skipped;
            }
        };

        self.deliver(queued).await
    }

    async fn deliver(&self, queued: QueuedMessage) -> Cycle {
        let QueuedMessage {
            archived, message, ..
        } = queued;
        let envelope = Envelope::new(&self.config, &message);

        let outcome = SmtpTransaction::new(&self.config, &self.connector, &message, &envelope)
            .execute()
            .await;

        match outcome {
            Ok(()) => {
                tracing::info!(
                    subject = message.subject(),
                    file = %archived.display(),
                    "Sent mail {} to {:?}",
                    message.subject(),
                    envelope.recipients()
                );
                Cycle::Delivered { archived }
            }
            Err(err) => {
                tracing::error!(
                    subject = err.subject(),
                    step = err.step().map(ToString::to_string).as_deref(),
                    file = %archived.display(),
                    error = %err,
                    "Delivery failed, message stays archived"
                );
                Cycle::Undelivered { archived }
            }
        }
    }

    /// Poll until a shutdown signal arrives.
    ///
    /// Signals are only observed between cycles, so a delivery in flight is
    /// always allowed to finish.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) {
        internal!(
            level = INFO,
            "Watching {} every {}ms",
            self.queue.inbound().display(),
            self.config.poll_interval_ms
        );

        let interval = self.config.poll_interval();

        loop {
            self.run_once().await;

            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) => {
                            internal!(level = INFO, "Dispatcher received shutdown signal");
                        }
                        Err(e) => {
                            tracing::error!("Dispatcher shutdown channel error: {e}");
                        }
                    }
                    break;
                }
            }
        }

        internal!(level = INFO, "Dispatcher shutdown complete");
    }
}

fn report_spool_error(err: &SpoolError) {
    match err {
        SpoolError::List { path, .. } => {
            tracing::error!(file = %path.display(), error = %err, "Could not list queue");
        }
        SpoolError::Parse { path, .. } => {
            tracing::error!(file = %path.display(), error = %err, "Could not parse message");
        }
        SpoolError::Archive { from, message, .. } => {
            tracing::error!(
                subject = message.subject(),
                file = %from.display(),
                error = %err,
                "Could not archive message, it was not sent"
            );
        }
    }
}

