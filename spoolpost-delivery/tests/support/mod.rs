//! Recording relay for delivery tests.
//!
//! [`MockConnector`] hands out sessions that accept everything by default
//! and record every call, in order, into a log shared with the test.
#![allow(dead_code)] // Not every test file uses every helper

use std::{
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use spoolpost_common::Config;
use spoolpost_delivery::{Connector, MailSession};
use spoolpost_smtp::{ClientError, Response};
use tempfile::TempDir;

/// One call made by the transaction, as seen by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(String, u16),
    Hello(String),
    Auth(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    Write(Vec<u8>),
    Finish,
    Quit,
}

#[derive(Debug, Default)]
struct Script {
    refuse_connect: bool,
    reject_auth: bool,
    reject_recipient: Option<String>,
    fail_finish: bool,
    fail_quit: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    script: Arc<Script>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn scripted(self, change: impl FnOnce(&mut Script)) -> Self {
        let mut script = Arc::try_unwrap(self.script).unwrap_or_default();
        change(&mut script);
        Self {
            script: Arc::new(script),
            calls: self.calls,
        }
    }

    pub fn refusing_connections(self) -> Self {
        self.scripted(|s| s.refuse_connect = true)
    }

    pub fn rejecting_auth(self) -> Self {
        self.scripted(|s| s.reject_auth = true)
    }

    pub fn rejecting_recipient(self, recipient: &str) -> Self {
        let recipient = recipient.to_string();
        self.scripted(|s| s.reject_recipient = Some(recipient))
    }

    pub fn dropping_after_data(self) -> Self {
        self.scripted(|s| s.fail_finish = true)
    }

    pub fn failing_quit(self) -> Self {
        self.scripted(|s| s.fail_quit = true)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Everything written inside `DATA`, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write(bytes) => Some(bytes),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

pub struct MockSession {
    script: Arc<Script>,
    calls: Arc<Mutex<Vec<Call>>>,
}

fn ok(code: u16) -> Result<Response, ClientError> {
    Ok(Response::new(code, vec!["OK".to_string()]))
}

fn rejected(code: u16, message: &str) -> Result<Response, ClientError> {
    Err(ClientError::Rejected {
        code,
        message: message.to_string(),
    })
}

impl MockSession {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MailSession for MockSession {
    async fn hello(&mut self, domain: &str) -> Result<Response, ClientError> {
        self.record(Call::Hello(domain.to_string()));
        ok(250)
    }

    async fn authenticate(
        &mut self,
        username: &str,
        _password: &str,
    ) -> Result<Response, ClientError> {
        self.record(Call::Auth(username.to_string()));
        if self.script.reject_auth {
            return rejected(535, "5.7.8 Authentication credentials invalid");
        }
        ok(235)
    }

    async fn mail_from(&mut self, sender: &str) -> Result<Response, ClientError> {
        self.record(Call::MailFrom(sender.to_string()));
        ok(250)
    }

    async fn rcpt_to(&mut self, recipient: &str) -> Result<Response, ClientError> {
        self.record(Call::RcptTo(recipient.to_string()));
        if self.script.reject_recipient.as_deref() == Some(recipient) {
            return rejected(550, "5.1.1 No such user");
        }
        ok(250)
    }

    async fn data(&mut self) -> Result<Response, ClientError> {
        self.record(Call::Data);
        ok(354)
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), ClientError> {
        self.record(Call::Write(chunk.to_vec()));
        Ok(())
    }

    async fn finish(&mut self) -> Result<Response, ClientError> {
        self.record(Call::Finish);
        if self.script.fail_finish {
            return Err(ClientError::ConnectionClosed);
        }
        ok(250)
    }

    async fn quit(&mut self) -> Result<Response, ClientError> {
        self.record(Call::Quit);
        if self.script.fail_quit {
            return Err(ClientError::ConnectionClosed);
        }
        ok(221)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Session = MockSession;

    async fn connect(&self, server: &str, port: u16) -> Result<Self::Session, ClientError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Connect(server.to_string(), port));

        if self.script.refuse_connect {
            return Err(ClientError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }

        Ok(MockSession {
            script: Arc::clone(&self.script),
            calls: Arc::clone(&self.calls),
        })
    }
}

/// Temporary queue directories plus a config pointing at them.
pub struct Fixture {
    _root: TempDir,
    pub config: Config,
}

impl Fixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let queue_in = root.path().join("in");
        let queue_out = root.path().join("out");
        std::fs::create_dir(&queue_in).unwrap();
        std::fs::create_dir(&queue_out).unwrap();

        let config = Config::from_yaml(&format!(
            "Sender: bot@example.com\n\
             SmtpServer: relay.example.com\n\
             SmtpPort: 465\n\
             Password: secret\n\
             QueueIn: {}\n\
             QueueOut: {}\n\
             AcceptInvalidCerts: false\n",
            queue_in.display(),
            queue_out.display()
        ))
        .unwrap();

        Self {
            _root: root,
            config,
        }
    }

    pub fn queue_in(&self) -> &Path {
        &self.config.queue_in
    }

    pub fn queue_out(&self) -> &Path {
        &self.config.queue_out
    }

    pub fn enqueue(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.queue_in().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn inbound(&self) -> Vec<String> {
        names(self.queue_in())
    }

    pub fn outbound(&self) -> Vec<String> {
        names(self.queue_out())
    }
}

fn names(path: &Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(path)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}
