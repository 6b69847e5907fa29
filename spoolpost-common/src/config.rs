//! Process-wide configuration.
//!
//! The configuration is read once at startup from a YAML document and then
//! shared by reference; nothing mutates it afterwards.
//!
//! ```yaml
//! Sender: noreply@example.com
//! SmtpServer: smtp.example.com
//! SmtpPort: 465
//! Password: secret
//! QueueIn: /var/spool/spoolpost/in
//! QueueOut: /var/spool/spoolpost/out
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Annotated sample configuration, printed by `spoolpost config`.
pub const SAMPLE: &str = include_str!("../sample_config.yaml");

/// Default file name suffix marking a queue file as eligible.
pub const DEFAULT_EXTENSION: &str = "nohtml";

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

const fn default_poll_interval() -> u64 {
    100
}

fn default_helo_name() -> String {
    "localhost".to_string()
}

const fn default_accept_invalid_certs() -> bool {
    true
}

const fn default_connect_timeout() -> u64 {
    30
}

const fn default_command_timeout() -> u64 {
    30
}

const fn default_data_timeout() -> u64 {
    120
}

/// SMTP operation timeout configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SmtpTimeouts {
    /// TCP connect plus TLS handshake
    ///
    /// Default: 30 seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// Any single command/reply exchange (EHLO, AUTH, MAIL, RCPT, DATA, QUIT)
    ///
    /// Default: 30 seconds
    #[serde(default = "default_command_timeout")]
    pub command_secs: u64,

    /// Writing the message body and reading the final reply
    ///
    /// Default: 120 seconds (2 minutes)
    #[serde(default = "default_data_timeout")]
    pub data_secs: u64,
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout(),
            command_secs: default_command_timeout(),
            data_secs: default_data_timeout(),
        }
    }
}

impl SmtpTimeouts {
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    #[must_use]
    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }
}

/// Dispatcher configuration.
///
/// Field names follow the PascalCase keys used by existing deployment files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    /// Envelope sender, `From` address and AUTH PLAIN user name
    pub sender: String,

    /// Display name rendered as `SenderName <Sender>`
    #[serde(default)]
    pub sender_name: Option<String>,

    pub smtp_server: String,

    pub smtp_port: u16,

    pub password: String,

    /// Directory polled for new queue files
    pub queue_in: PathBuf,

    /// Directory receiving archived queue files
    pub queue_out: PathBuf,

    /// Appended as a `Reply-To` header when non-empty
    #[serde(default)]
    pub reply_to: Option<String>,

    /// File name suffix marking a queue file as eligible
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Sleep between two poll cycles (in milliseconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Domain announced in EHLO
    #[serde(default = "default_helo_name")]
    pub helo_name: String,

    /// Skip TLS certificate verification
    ///
    /// **SECURITY WARNING**: defaults to `true` for compatibility with the
    /// self-signed test relays this tool was written against. Set it to
    /// `false` for anything facing the internet.
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,

    #[serde(default)]
    pub timeouts: SmtpTimeouts,
}

impl Config {
    /// Parse a configuration from a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] if the document is not valid YAML or
    /// a required key is missing.
    pub fn from_yaml(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(document)?)
    }

    /// Read and parse the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&document)
    }

    /// Validate the invariants that cannot be expressed in the schema.
    ///
    /// # Errors
    ///
    /// Fails if a required field is empty, or if either queue path does not
    /// exist or is not a directory.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.sender.trim().is_empty() {
            return Err(ConfigError::MissingField("Sender"));
        }

        if self.smtp_server.trim().is_empty() {
            return Err(ConfigError::MissingField("SmtpServer"));
        }

        if self.smtp_port == 0 {
            return Err(ConfigError::MissingField("SmtpPort"));
        }

        if self.extension.is_empty() {
            return Err(ConfigError::MissingField("Extension"));
        }

        check_directory("QueueIn", &self.queue_in)?;
        check_directory("QueueOut", &self.queue_out)
    }

    /// Display name for the `From` header, if one is configured.
    #[must_use]
    pub fn sender_name(&self) -> Option<&str> {
        self.sender_name.as_deref().filter(|name| !name.is_empty())
    }

    /// `Reply-To` address, if one is configured.
    #[must_use]
    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref().filter(|address| !address.is_empty())
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn check_directory(field: &'static str, path: &Path) -> Result<(), ConfigError> {
    let metadata = std::fs::metadata(path).map_err(|source| ConfigError::QueueUnavailable {
        field,
        path: path.to_path_buf(),
        source,
    })?;

    if metadata.is_dir() {
        Ok(())
    } else {
        Err(ConfigError::NotADirectory {
            field,
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn minimal(queue_in: &Path, queue_out: &Path) -> String {
        format!(
            "Sender: bot@example.com\n\
             SmtpServer: smtp.example.com\n\
             SmtpPort: 465\n\
             Password: hunter2\n\
             QueueIn: {}\n\
             QueueOut: {}\n",
            queue_in.display(),
            queue_out.display()
        )
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = Config::from_yaml(&minimal(Path::new("/in"), Path::new("/out"))).unwrap();

        assert_eq!(config.sender, "bot@example.com");
        assert_eq!(config.smtp_port, 465);
        assert_eq!(config.sender_name(), None);
        assert_eq!(config.reply_to(), None);
        assert_eq!(config.extension, "nohtml");
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.helo_name, "localhost");
        assert!(config.accept_invalid_certs);
        assert_eq!(config.timeouts, SmtpTimeouts::default());
    }

    #[test]
    fn test_sample_config_parses() {
        let config = Config::from_yaml(SAMPLE).unwrap();

        assert_eq!(config.sender_name(), Some("Example Notifications"));
        assert_eq!(config.reply_to(), Some("support@example.com"));
        assert_eq!(config.smtp_port, 465);
    }

    #[test]
    fn test_empty_optional_fields_count_as_unset() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.sender_name = Some(String::new());
        config.reply_to = Some(String::new());

        assert_eq!(config.sender_name(), None);
        assert_eq!(config.reply_to(), None);
    }

    #[test]
    fn test_missing_key_is_malformed() {
        let err = Config::from_yaml("Sender: a@b.c\n").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }

    #[test]
    fn test_check_accepts_existing_directories() {
        let queue_in = tempfile::tempdir().unwrap();
        let queue_out = tempfile::tempdir().unwrap();
        let config = Config::from_yaml(&minimal(queue_in.path(), queue_out.path())).unwrap();

        assert!(config.check().is_ok());
    }

    #[test]
    fn test_check_rejects_missing_queue() {
        let queue_out = tempfile::tempdir().unwrap();
        let config = Config::from_yaml(&minimal(
            &queue_out.path().join("missing"),
            queue_out.path(),
        ))
        .unwrap();

        assert!(matches!(
            config.check(),
            Err(ConfigError::QueueUnavailable {
                field: "QueueIn",
                ..
            })
        ));
    }

    #[test]
    fn test_check_rejects_file_as_queue() {
        let queue_in = tempfile::tempdir().unwrap();
        let file = queue_in.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let config = Config::from_yaml(&minimal(queue_in.path(), &file)).unwrap();

        assert!(matches!(
            config.check(),
            Err(ConfigError::NotADirectory {
                field: "QueueOut",
                ..
            })
        ));
    }

    #[test]
    fn test_check_rejects_blank_sender() {
        let queue = tempfile::tempdir().unwrap();
        let mut config = Config::from_yaml(&minimal(queue.path(), queue.path())).unwrap();
        config.sender = "  ".to_string();

        assert!(matches!(
            config.check(),
            Err(ConfigError::MissingField("Sender"))
        ));
    }
}
