pub mod error;
pub mod queue;

pub use error::{Result, SpoolError};
pub use queue::{Queue, QueuedMessage, archive_name, is_eligible, select};
