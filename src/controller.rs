use std::sync::LazyLock;

use spoolpost_common::{Config, Signal, internal, logging, tracing};
use spoolpost_delivery::{Dispatcher, RelayConnector};
use tokio::sync::broadcast;

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    // The dispatcher finishes its current cycle first; a second CTRL+C
    // abandons it.
    tokio::signal::ctrl_c().await?;
    internal!(level = WARN, "Forced shutdown");

    Ok(())
}

/// The dispatcher process: one config, one poll loop.
pub struct Spoolpost {
    config: Config,
}

impl Spoolpost {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Validate the configuration and poll the inbound queue until
    /// SIGINT/SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if a queue directory is missing, a required field is
    /// empty, or the signal handlers cannot be installed.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();
        self.config.check()?;

        internal!(
            level = INFO,
            "Relaying {} -> {}:{} as {}",
            self.config.queue_in.display(),
            self.config.smtp_server,
            self.config.smtp_port,
            self.config.sender
        );

        if self.config.accept_invalid_certs {
            tracing::warn!(
                server = %self.config.smtp_server,
                "SECURITY WARNING: TLS certificate validation is disabled (AcceptInvalidCerts)"
            );
        }

        let connector = RelayConnector::from_config(&self.config);
        let dispatcher = Dispatcher::new(self.config, connector);

        let ret = tokio::select! {
            () = dispatcher.serve(SHUTDOWN_BROADCAST.subscribe()) => Ok(()),
            r = shutdown() => r,
        };

        internal!(level = INFO, "Shutting down...");

        ret
    }
}
