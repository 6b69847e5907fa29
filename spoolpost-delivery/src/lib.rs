//! Delivery of queued messages to the configured relay.
//!
//! [`SmtpTransaction`] runs one strictly ordered, fail-fast SMTP exchange for
//! a single message. [`Dispatcher`] drives the poll loop: take a file off the
//! queue, deliver it, sleep, repeat until shut down.

mod error;
pub mod processor;
pub mod session;
mod transaction;

pub use error::{DeliveryError, Step};
pub use processor::{Cycle, Dispatcher};
pub use session::{Connector, MailSession, RelayConnector};
pub use transaction::SmtpTransaction;
