//! Directory-backed mail queue.
//!
//! Producers drop files into the inbound directory. Each poll cycle takes at
//! most one of them: the first eligible name in directory listing order is
//! parsed and then moved to the outbound directory as `<unix-nanos>_<name>`,
//! where it stays as the archive of everything that was taken off the queue.
//!
//! The move happens before any delivery attempt, so a file is never taken
//! twice even when delivery later fails.

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use spoolpost_common::{Config, Message, internal};
use tokio::fs;

use crate::error::{Result, SpoolError};

/// Whether a directory entry name marks a queued message.
///
/// Matching is a plain, case-sensitive suffix test on the whole name. There
/// is no dot requirement, so `foonohtml` and `foo.nohtml` both qualify.
#[must_use]
pub fn is_eligible(name: &str, extension: &str) -> bool {
    name.ends_with(extension)
}

/// The first eligible name, preserving the order `names` arrive in.
pub fn select<'a, I>(names: I, extension: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .find(|name| is_eligible(name, extension))
}

/// Archive file name for `name` taken off the queue at `taken`.
///
/// Clocks before the epoch collapse to a zero prefix.
#[must_use]
pub fn archive_name(name: &str, taken: SystemTime) -> String {
    let nanos = taken
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();

    format!("{nanos}_{name}")
}

/// A message that has been parsed and moved out of the inbound directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    /// File name the message had in the inbound directory.
    pub name: String,
    /// Where the file now lives in the outbound directory.
    pub archived: PathBuf,
    pub message: Message,
}

/// The inbound/outbound directory pair.
#[derive(Debug, Clone)]
pub struct Queue {
    inbound: PathBuf,
    outbound: PathBuf,
    extension: String,
    reply_to: Option<String>,
}

impl Queue {
    pub fn new(
        inbound: impl Into<PathBuf>,
        outbound: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            inbound: inbound.into(),
            outbound: outbound.into(),
            extension: extension.into(),
            reply_to: None,
        }
    }

    /// Address added as `Reply-To` to every message taken off this queue.
    #[must_use]
    pub fn with_reply_to(mut self, reply_to: Option<&str>) -> Self {
        self.reply_to = reply_to.filter(|r| !r.is_empty()).map(ToOwned::to_owned);
        self
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.queue_in, &config.queue_out, &config.extension)
            .with_reply_to(config.reply_to())
    }

    #[must_use]
    pub fn inbound(&self) -> &Path {
        &self.inbound
    }

    #[must_use]
    pub fn outbound(&self) -> &Path {
        &self.outbound
    }

    /// Names of the regular entries in the inbound directory, in listing order.
    ///
    /// Directories are skipped even when their name carries the marker, as
    /// are names that are not valid UTF-8.
    async fn listing(&self) -> Result<Vec<String>> {
        let list_error = |source| SpoolError::List {
            path: self.inbound.clone(),
            source,
        };

        let mut entries = fs::read_dir(&self.inbound).await.map_err(list_error)?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(list_error)? {
            let is_dir = entry
                .file_type()
                .await
                .is_ok_and(|file_type| file_type.is_dir());

            if is_dir {
                continue;
            }

            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => skip_unreadable(&name),
            }
        }

        Ok(names)
    }

    /// Take the next message off the queue.
    ///
    /// Returns `Ok(None)` when no eligible file is waiting.
    ///
    /// # Errors
    ///
    /// - [`SpoolError::List`] if the inbound directory cannot be listed
    /// - [`SpoolError::Parse`] if the selected file cannot be read or is too
    ///   short; the file is left where it is
    /// - [`SpoolError::Archive`] if the file parsed but could not be moved to
    ///   the outbound directory
    pub async fn take(&self) -> Result<Option<QueuedMessage>> {
        let names = self.listing().await?;

        let Some(name) = select(names.iter().map(String::as_str), &self.extension) else {
            internal!(level = TRACE, "No queued messages in {}", self.inbound.display());
            return Ok(None);
        };

        let source = self.inbound.join(name);
        internal!(level = DEBUG, "Taking {} off the queue", source.display());

        let message = Message::load(&source, self.reply_to.as_deref())
            .await
            .map_err(|err| SpoolError::Parse {
                path: source.clone(),
                source: err,
            })?;

        let archived = self.outbound.join(archive_name(name, SystemTime::now()));

        if let Err(err) = fs::rename(&source, &archived).await {
            return Err(SpoolError::Archive {
                from: source,
                to: archived,
                message: Box::new(message),
                source: err,
            });
        }

        internal!(
            level = DEBUG,
            "Archived {} as {}",
            source.display(),
            archived.display()
        );

        Ok(Some(QueuedMessage {
            name: name.to_owned(),
            archived,
            message,
        }))
    }
}

fn skip_unreadable(name: &OsStr) {
    internal!(
        level = WARN,
        "Skipping queue entry with a non UTF-8 name: {}",
        name.to_string_lossy()
    );
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    const MESSAGE: &[u8] = b"To: a@x.com\nSubject: Hi\n\nHello";

    struct Dirs {
        _root: TempDir,
        inbound: PathBuf,
        outbound: PathBuf,
    }

    fn dirs() -> Dirs {
        let root = tempfile::tempdir().unwrap();
        let inbound = root.path().join("in");
        let outbound = root.path().join("out");
        std::fs::create_dir(&inbound).unwrap();
        std::fs::create_dir(&outbound).unwrap();

        Dirs {
            _root: root,
            inbound,
            outbound,
        }
    }

    fn queue(dirs: &Dirs) -> Queue {
        Queue::new(&dirs.inbound, &dirs.outbound, "nohtml")
    }

    fn entries(path: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(path)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_eligibility_is_a_plain_suffix_match() {
        assert!(is_eligible("a.nohtml", "nohtml"));
        assert!(is_eligible("anohtml", "nohtml"));
        assert!(is_eligible("nohtml", "nohtml"));
        assert!(!is_eligible("a.NOHTML", "nohtml"));
        assert!(!is_eligible("a.nohtml.tmp", "nohtml"));
        assert!(!is_eligible("html", "nohtml"));
    }

    #[test]
    fn test_select_takes_first_in_listing_order() {
        let names = ["readme.txt", "b.nohtml", "a.nohtml"];
        assert_eq!(select(names, "nohtml"), Some("b.nohtml"));
        assert_eq!(select(["readme.txt"], "nohtml"), None);
        assert_eq!(select(Vec::new(), "nohtml"), None);
    }

    #[test]
    fn test_archive_name() {
        let taken = UNIX_EPOCH + Duration::from_nanos(1_700_000_000_123_456_789);
        assert_eq!(
            archive_name("a.nohtml", taken),
            "1700000000123456789_a.nohtml"
        );

        let before_epoch = UNIX_EPOCH - Duration::from_secs(1);
        assert_eq!(archive_name("a.nohtml", before_epoch), "0_a.nohtml");
    }

    #[test]
    fn test_reply_to_ignores_empty() {
        let queue = Queue::new("in", "out", "nohtml").with_reply_to(Some(""));
        assert_eq!(queue.reply_to, None);
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let dirs = dirs();
        std::fs::write(dirs.inbound.join("notes.txt"), MESSAGE).unwrap();

        assert!(queue(&dirs).take().await.unwrap().is_none());
        assert_eq!(entries(&dirs.inbound), vec!["notes.txt"]);
        assert!(entries(&dirs.outbound).is_empty());
    }

    #[tokio::test]
    async fn test_take_archives_before_returning() {
        let dirs = dirs();
        std::fs::write(dirs.inbound.join("a.nohtml"), MESSAGE).unwrap();

        let queued = queue(&dirs)
            .with_reply_to(Some("help@x.com"))
            .take()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(queued.name, "a.nohtml");
        assert_eq!(queued.message.subject(), "Hi");
        assert_eq!(queued.message.header("Reply-To"), "help@x.com");
        assert_eq!(queued.message.content(), b"Hello");

        assert!(entries(&dirs.inbound).is_empty());
        let archived = entries(&dirs.outbound);
        assert_eq!(archived.len(), 1);
        assert_eq!(queued.archived, dirs.outbound.join(&archived[0]));

        let (nanos, name) = archived[0].split_once('_').unwrap();
        assert!(nanos.parse::<u128>().is_ok());
        assert_eq!(name, "a.nohtml");

        // The archived bytes are the original file, untouched.
        assert_eq!(std::fs::read(&queued.archived).unwrap(), MESSAGE);
    }

    #[tokio::test]
    async fn test_each_file_is_taken_once() {
        let dirs = dirs();
        let queue = queue(&dirs);
        std::fs::write(dirs.inbound.join("a.nohtml"), MESSAGE).unwrap();
        std::fs::write(dirs.inbound.join("b.nohtml"), MESSAGE).unwrap();

        let first = queue.take().await.unwrap().unwrap();
        let second = queue.take().await.unwrap().unwrap();
        assert!(queue.take().await.unwrap().is_none());

        let mut taken = vec![first.name, second.name];
        taken.sort();
        assert_eq!(taken, vec!["a.nohtml", "b.nohtml"]);
        assert_eq!(entries(&dirs.outbound).len(), 2);
    }

    #[tokio::test]
    async fn test_directories_are_not_messages() {
        let dirs = dirs();
        std::fs::create_dir(dirs.inbound.join("held.nohtml")).unwrap();

        assert!(queue(&dirs).take().await.unwrap().is_none());
        assert_eq!(entries(&dirs.inbound), vec!["held.nohtml"]);
    }

    #[tokio::test]
    async fn test_short_file_stays_put() {
        let dirs = dirs();
        std::fs::write(dirs.inbound.join("a.nohtml"), b"abcd").unwrap();

        let err = queue(&dirs).take().await.unwrap_err();
        assert!(matches!(err, SpoolError::Parse { .. }));
        assert_eq!(entries(&dirs.inbound), vec!["a.nohtml"]);
        assert!(entries(&dirs.outbound).is_empty());
    }

    #[tokio::test]
    async fn test_missing_inbound_directory() {
        let dirs = dirs();
        let queue = Queue::new(dirs.inbound.join("gone"), &dirs.outbound, "nohtml");

        let err = queue.take().await.unwrap_err();
        assert!(matches!(err, SpoolError::List { .. }));
    }

    #[tokio::test]
    async fn test_archive_failure_carries_message() {
        let dirs = dirs();
        std::fs::write(dirs.inbound.join("a.nohtml"), MESSAGE).unwrap();
        let queue = Queue::new(&dirs.inbound, dirs.outbound.join("gone"), "nohtml");

        let err = queue.take().await.unwrap_err();
        assert!(matches!(err, SpoolError::Archive { .. }));
        assert_eq!(err.message().map(Message::subject), Some("Hi"));
        assert_eq!(entries(&dirs.inbound), vec!["a.nohtml"]);
    }
}
