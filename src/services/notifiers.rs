//! Digest delivery.
//!
//! All three notifiers send the same rendered message. `SmtpNotifier`
//! submits it to a mail server, `OutboxNotifier` drops it into a directory
//! watched by a local mail transfer agent, and `WebhookNotifier` hands it
//! to an HTTP mail relay.

use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{Config, Item, NotifierConfig, NotifierKind, SmtpSecurity};
use crate::storage::JsonFile;
use crate::utils::http;

use super::{Digest, Notifier};

/// Build the notifier described by the configuration.
pub fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    let notifier: Arc<dyn Notifier> = match config.notifier.kind {
        NotifierKind::Outbox => Arc::new(OutboxNotifier::new(&config.notifier)),
        NotifierKind::Webhook => Arc::new(WebhookNotifier::new(
            &config.notifier,
            http::create_client(&config.http)?,
        )?),
        NotifierKind::Smtp => Arc::new(SmtpNotifier::new(
            &config.notifier,
            config.watcher.notify_timeout(),
        )?),
    };
    Ok(notifier)
}

/// Writes each digest as an RFC 5322 message into the outbox directory.
pub struct OutboxNotifier {
    dir: PathBuf,
    sender: String,
    recipient: String,
    subject: String,
    sequence: AtomicU64,
}

impl OutboxNotifier {
    pub fn new(config: &NotifierConfig) -> Self {
        Self {
            dir: config.outbox_dir.clone(),
            sender: config.sender.clone(),
            recipient: config.recipient.clone(),
            subject: config.subject.clone(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Queue the digest under a name no other message holds. Names carry
    /// the pid, and a taken name moves on to the next sequence number.
    async fn deliver(&self, digest: &Digest) -> Result<PathBuf> {
        let now = Utc::now();
        let stamp = now.format("%Y%m%dT%H%M%S");
        let pid = std::process::id();
        loop {
            let n = self.sequence.fetch_add(1, Ordering::Relaxed);
            let path = self.dir.join(format!("digest-{stamp}-{pid}-{n}.eml"));
            let message = render_message(digest, &self.sender, &self.recipient, now, n);
            match JsonFile::new(&path).create_bytes(message.as_bytes()).await {
                Ok(()) => return Ok(path),
                Err(AppError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
                    log::debug!("{} is taken, trying the next name", path.display());
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send(&self, digest: Digest) -> bool {
        match self.deliver(&digest).await {
            Ok(path) => {
                log::info!("Queued '{}' in {}", digest.subject, path.display());
                true
            }
            Err(e) => {
                log::error!(
                    "Failed to write message to outbox {}: {}",
                    self.dir.display(),
                    e
                );
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn notify(&self, items: &[Item]) -> bool {
        self.send(Digest::for_items(&self.subject, items)).await
    }

    async fn announce(&self, subject: &str, body: &str) -> bool {
        self.send(Digest::plain(subject, body)).await
    }
}

/// Submits each digest to an SMTP server.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    envelope: Envelope,
    server: String,
    sender: String,
    recipient: String,
    subject: String,
    sequence: AtomicU64,
}

impl SmtpNotifier {
    /// Credentials are read once from the environment here. Without a
    /// login variable the session is unauthenticated.
    pub fn new(config: &NotifierConfig, timeout: Duration) -> Result<Self> {
        let host = config.smtp_host.as_str();
        let builder = match config.smtp_security {
            SmtpSecurity::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
            SmtpSecurity::Plain => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                host,
            )),
        }
        .map_err(|e| AppError::config(format!("notifier.smtp_host '{host}': {e}")))?;

        let mut builder = builder.port(config.smtp_port).timeout(Some(timeout));
        if let Some(credentials) = smtp_credentials(config)? {
            builder = builder.credentials(credentials);
        }

        let envelope = Envelope::new(
            Some(parse_address("sender", &config.sender)?),
            vec![parse_address("recipient", &config.recipient)?],
        )
        .map_err(|e| AppError::config(format!("SMTP envelope: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            envelope,
            server: format!("{host}:{}", config.smtp_port),
            sender: config.sender.clone(),
            recipient: config.recipient.clone(),
            subject: config.subject.clone(),
            sequence: AtomicU64::new(0),
        })
    }

    async fn send(&self, digest: Digest) -> bool {
        let now = Utc::now();
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        let message = render_message(&digest, &self.sender, &self.recipient, now, n);

        match self
            .transport
            .send_raw(&self.envelope, message.as_bytes())
            .await
        {
            Ok(_) => {
                log::info!("Mailed '{}' to {}", digest.subject, self.recipient);
                true
            }
            Err(e) => {
                log::error!("SMTP delivery via {} failed: {}", self.server, e);
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, items: &[Item]) -> bool {
        self.send(Digest::for_items(&self.subject, items)).await
    }

    async fn announce(&self, subject: &str, body: &str) -> bool {
        self.send(Digest::plain(subject, body)).await
    }
}

fn smtp_credentials(config: &NotifierConfig) -> Result<Option<Credentials>> {
    let Ok(username) = std::env::var(&config.smtp_username_env) else {
        log::warn!(
            "{} is not set, submitting without SMTP authentication",
            config.smtp_username_env
        );
        return Ok(None);
    };
    let password = std::env::var(&config.smtp_password_env).map_err(|_| {
        AppError::config(format!(
            "{} is set but {} is not",
            config.smtp_username_env, config.smtp_password_env
        ))
    })?;
    Ok(Some(Credentials::new(username, password)))
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    value
        .parse()
        .map_err(|e| AppError::config(format!("notifier.{field} '{value}': {e}")))
}

/// Payload accepted by the mail relay.
#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    to: &'a str,
    from: &'a str,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
    items: &'a [Item],
}

/// POSTs each digest as JSON to an HTTP mail relay.
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    sender: String,
    recipient: String,
    subject: String,
}

impl WebhookNotifier {
    /// The bearer token, if any, is read once from the environment here.
    pub fn new(config: &NotifierConfig, client: reqwest::Client) -> Result<Self> {
        let endpoint = config
            .webhook_url
            .clone()
            .ok_or_else(|| AppError::config("notifier.webhook_url is required for webhook"))?;
        let token = match &config.token_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                AppError::config(format!("environment variable {var} is not set"))
            })?),
            None => None,
        };

        Ok(Self {
            client,
            endpoint,
            token,
            sender: config.sender.clone(),
            recipient: config.recipient.clone(),
            subject: config.subject.clone(),
        })
    }

    async fn post(&self, digest: &Digest, items: &[Item]) -> Result<()> {
        let payload = RelayMessage {
            to: &self.recipient,
            from: &self.sender,
            subject: &digest.subject,
            html: &digest.html,
            text: &digest.text,
            items,
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let status = request.send().await?.status();
        if !status.is_success() {
            return Err(AppError::notify(format!(
                "relay {} answered {status}",
                self.endpoint
            )));
        }
        Ok(())
    }

    async fn send(&self, digest: Digest, items: &[Item]) -> bool {
        match self.post(&digest, items).await {
            Ok(()) => {
                log::info!("Relayed '{}' to {}", digest.subject, self.recipient);
                true
            }
            Err(e) => {
                log::error!("Failed to relay message: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, items: &[Item]) -> bool {
        self.send(Digest::for_items(&self.subject, items), items).await
    }

    async fn announce(&self, subject: &str, body: &str) -> bool {
        self.send(Digest::plain(subject, body), &[]).await
    }
}

/// Render a `multipart/alternative` message with text and HTML parts.
fn render_message(
    digest: &Digest,
    from: &str,
    to: &str,
    date: DateTime<Utc>,
    sequence: u64,
) -> String {
    let pid = std::process::id();
    let boundary = format!("=_coursewatch_{}_{pid}_{sequence}", date.timestamp());
    let domain = from.rsplit('@').next().unwrap_or("localhost");

    let mut out = String::new();
    let _ = write!(
        out,
        "From: {from}\r\n\
         To: {to}\r\n\
         Subject: {}\r\n\
         Date: {}\r\n\
         Message-ID: <{}.{pid}.{sequence}@{domain}>\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/alternative; boundary=\"{boundary}\"\r\n\
         \r\n",
        encode_header(&digest.subject),
        date.to_rfc2822(),
        date.timestamp_micros(),
    );
    for (mime, body) in [("text/plain", &digest.text), ("text/html", &digest.html)] {
        let _ = write!(
            out,
            "--{boundary}\r\n\
             Content-Type: {mime}; charset=utf-8\r\n\
             Content-Transfer-Encoding: 8bit\r\n\
             \r\n\
             {}\r\n",
            body.replace("\r\n", "\n").replace('\n', "\r\n")
        );
    }
    let _ = write!(out, "--{boundary}--\r\n");
    out
}

/// RFC 2047 Q-encoding for header values that are not plain ASCII.
fn encode_header(value: &str) -> String {
    if value.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        return value.to_string();
    }
    let mut out = String::from("=?UTF-8?Q?");
    for b in value.bytes() {
        match b {
            b' ' => out.push('_'),
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'-' | b'!' => out.push(b as char),
            _ => {
                let _ = write!(out, "={b:02X}");
            }
        }
    }
    out.push_str("?=");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn outbox_config(dir: &std::path::Path) -> NotifierConfig {
        NotifierConfig {
            outbox_dir: dir.join("outbox"),
            recipient: "me@example.com".into(),
            sender: "watcher@example.com".into(),
            ..NotifierConfig::default()
        }
    }

    fn eml_files(dir: &std::path::Path) -> Vec<PathBuf> {
        let mut files: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "eml"))
            .collect();
        files.sort();
        files
    }

    #[tokio::test]
    async fn test_outbox_writes_one_message_per_digest() {
        let tmp = TempDir::new().unwrap();
        let notifier = OutboxNotifier::new(&outbox_config(tmp.path()));
        let items = vec![Item::new(
            "rust",
            "Rust & Friends",
            "https://example.com/course/rust/",
            Utc::now(),
        )];

        assert!(notifier.notify(&items).await);
        assert!(notifier.announce("Watcher started", "hello").await);

        let files = eml_files(&tmp.path().join("outbox"));
        assert_eq!(files.len(), 2);

        let digest = files
            .iter()
            .map(|p| std::fs::read_to_string(p).unwrap())
            .find(|m| m.contains("Rust &amp; Friends"))
            .unwrap();
        assert!(digest.contains("To: me@example.com\r\n"));
        assert!(digest.contains("From: watcher@example.com\r\n"));
        assert!(digest.contains("Subject: New free courses available\r\n"));
        assert!(digest.contains("Content-Type: text/html; charset=utf-8"));
        assert!(digest.contains("* Rust & Friends"));
    }

    #[tokio::test]
    async fn test_outbox_never_overwrites_queued_digest() {
        let tmp = TempDir::new().unwrap();
        let config = outbox_config(tmp.path());
        let first = OutboxNotifier::new(&config);
        let second = OutboxNotifier::new(&config);

        let batch_a = vec![Item::new("a", "Course A", "https://example.com/a", Utc::now())];
        let batch_b = vec![Item::new("b", "Course B", "https://example.com/b", Utc::now())];
        assert!(first.notify(&batch_a).await);
        assert!(second.notify(&batch_b).await);

        let outbox = tmp.path().join("outbox");
        let files = eml_files(&outbox);
        assert_eq!(files.len(), 2);
        let bodies: Vec<String> = files
            .iter()
            .map(|p| std::fs::read_to_string(p).unwrap())
            .collect();
        assert!(bodies.iter().any(|m| m.contains("Course A")));
        assert!(bodies.iter().any(|m| m.contains("Course B")));

        let entries = std::fs::read_dir(&outbox).unwrap().count();
        assert_eq!(entries, 2, "no temp files left in the pickup directory");
    }

    #[tokio::test]
    async fn test_outbox_reports_failure_when_dir_is_unusable() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("outbox"), b"not a directory").unwrap();
        let notifier = OutboxNotifier::new(&outbox_config(tmp.path()));

        let items = vec![Item::new("a", "A", "https://example.com/a", Utc::now())];
        assert!(!notifier.notify(&items).await);
    }

    #[test]
    fn test_non_ascii_subjects_are_encoded() {
        assert_eq!(encode_header("Plain subject"), "Plain subject");
        assert_eq!(encode_header("Cursos grátis"), "=?UTF-8?Q?Cursos_gr=C3=A1tis?=");
    }

    fn smtp_config() -> NotifierConfig {
        NotifierConfig {
            kind: NotifierKind::Smtp,
            smtp_host: "127.0.0.1".into(),
            smtp_port: 9,
            smtp_security: SmtpSecurity::Plain,
            smtp_username_env: "COURSEWATCH_TEST_SMTP_LOGIN_UNSET".into(),
            smtp_password_env: "COURSEWATCH_TEST_SMTP_PASSWORD_UNSET".into(),
            recipient: "me@example.com".into(),
            sender: "watcher@example.com".into(),
            ..NotifierConfig::default()
        }
    }

    #[tokio::test]
    async fn test_smtp_unreachable_server_maps_to_false() {
        let notifier = SmtpNotifier::new(&smtp_config(), Duration::from_secs(2)).unwrap();
        let items = vec![Item::new("a", "A", "https://example.com/a", Utc::now())];

        assert!(!notifier.notify(&items).await);
        assert!(!notifier.announce("Watcher started", "hello").await);
    }

    #[tokio::test]
    async fn test_smtp_rejects_unparsable_addresses() {
        let config = NotifierConfig {
            recipient: "me@".into(),
            ..smtp_config()
        };
        assert!(SmtpNotifier::new(&config, Duration::from_secs(2)).is_err());
    }

    #[tokio::test]
    async fn test_build_notifier_picks_smtp() {
        let mut config = Config::default();
        config.notifier = smtp_config();
        assert!(build_notifier(&config).is_ok());
    }

    #[test]
    fn test_webhook_requires_endpoint() {
        let config = NotifierConfig {
            kind: NotifierKind::Webhook,
            ..NotifierConfig::default()
        };
        assert!(WebhookNotifier::new(&config, reqwest::Client::new()).is_err());
    }

    #[tokio::test]
    async fn test_webhook_failure_maps_to_false() {
        let config = NotifierConfig {
            kind: NotifierKind::Webhook,
            webhook_url: Some("http://127.0.0.1:9/relay".into()),
            ..NotifierConfig::default()
        };
        let notifier = WebhookNotifier::new(&config, reqwest::Client::new()).unwrap();
        assert!(!notifier.announce("s", "b").await);
    }
}
