use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Settings;

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMessage {
    /// Sending identity; `None` lets the backend use its own address.
    pub from: Option<String>,
    pub sender_name: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub reply_to: String,
    pub subject: String,
    pub html_body: String,
}

#[async_trait]
pub trait MailSender: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()>;
}

/// Posts messages as JSON to an HTTP mail relay that can send as the teacher.
pub struct RelayMailer {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl RelayMailer {
    pub fn new(url: impl Into<String>, token: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build mail relay client")?;

        Ok(Self {
            client,
            url: url.into(),
            token,
        })
    }
}

#[async_trait]
impl MailSender for RelayMailer {
    fn name(&self) -> &'static str {
        "relay"
    }

    async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()> {
        let mut request = self.client.post(&self.url).json(message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        request
            .send()
            .await
            .context("mail relay unreachable")?
            .error_for_status()
            .context("mail relay rejected message")?;
        Ok(())
    }
}

/// Writes each message as a JSON file into a spool directory picked up by the
/// system mailer.
pub struct OutboxMailer {
    dir: PathBuf,
}

impl OutboxMailer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl MailSender for OutboxMailer {
    fn name(&self) -> &'static str {
        "outbox"
    }

    async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create outbox {}", self.dir.display()))?;

        let path = self.dir.join(format!(
            "{}-{}.json",
            chrono::Utc::now().format("%Y%m%dT%H%M%S"),
            Uuid::new_v4()
        ));
        let payload = serde_json::to_vec_pretty(message)?;
        std::fs::write(&path, payload)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{primary} sender failed ({primary_error}); {fallback} sender failed: {fallback_error}")]
    BothBackendsFailed {
        primary: &'static str,
        primary_error: String,
        fallback: &'static str,
        fallback_error: String,
    },

    #[error("{backend} sender failed: {reason}")]
    SystemSenderFailed {
        backend: &'static str,
        reason: String,
    },

    #[error("admin notice to {to} failed: {reason}")]
    AdminNotice { to: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent {
        backend: &'static str,
        recipients: Vec<String>,
    },
    Simulated {
        recipients: Vec<String>,
    },
    NoRecipients,
}

#[derive(Debug, Clone)]
pub struct DispatchRequest<'a> {
    pub subject: &'a str,
    pub html_body: &'a str,
    pub parent_emails: [&'a str; 2],
    pub teacher_email: &'a str,
    pub teacher_name: &'a str,
    pub cc: &'a [String],
}

fn looks_like_address(value: &str) -> bool {
    !value.is_empty() && value.contains('@')
}

/// Trimmed parent addresses containing `@`, without duplicates.
pub fn recipients(parent_emails: &[&str]) -> Vec<String> {
    let mut recipients: Vec<String> = Vec::new();
    for email in parent_emails.iter().map(|email| email.trim()) {
        if !looks_like_address(email) {
            continue;
        }
        if recipients
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(email))
        {
            continue;
        }
        recipients.push(email.to_string());
    }
    recipients
}

pub fn valid_cc(cc: &[String]) -> Vec<String> {
    cc.iter()
        .map(|email| email.trim())
        .filter(|email| looks_like_address(email))
        .map(str::to_string)
        .collect()
}

/// Two-step delivery: the primary sender is tried as the teacher, and a single
/// retry goes through the fallback system sender if it fails. Without a
/// primary, mail goes straight to the system sender.
pub struct Dispatcher {
    primary: Option<Arc<dyn MailSender>>,
    fallback: Arc<dyn MailSender>,
    send_enabled: bool,
    school_name: String,
    system_address: String,
}

impl Dispatcher {
    pub fn new(
        primary: Option<Arc<dyn MailSender>>,
        fallback: Arc<dyn MailSender>,
        send_enabled: bool,
        school_name: impl Into<String>,
        system_address: impl Into<String>,
    ) -> Self {
        Self {
            primary,
            fallback,
            send_enabled,
            school_name: school_name.into(),
            system_address: system_address.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let outbox: Arc<dyn MailSender> = Arc::new(OutboxMailer::new(&settings.mail.outbox_dir));
        let primary: Option<Arc<dyn MailSender>> = match &settings.mail.relay_url {
            Some(url) => Some(Arc::new(RelayMailer::new(url.clone(), settings.relay_token())?)),
            None => {
                warn!("no mail relay configured, all mail goes through the outbox system sender");
                None
            }
        };

        Ok(Self::new(
            primary,
            outbox,
            settings.send_emails,
            settings.school_name.clone(),
            settings.mail.system_address.clone(),
        ))
    }

    pub async fn dispatch(
        &self,
        request: &DispatchRequest<'_>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let to = recipients(&request.parent_emails);
        if to.is_empty() {
            info!("no valid parent email addresses found, email not sent");
            return Ok(DispatchOutcome::NoRecipients);
        }
        let cc = valid_cc(request.cc);

        if !self.send_enabled {
            info!(
                from = request.teacher_email,
                to = %to.join(","),
                cc = %cc.join(","),
                subject = request.subject,
                body_len = request.html_body.len(),
                "sending disabled, email not delivered"
            );
            return Ok(DispatchOutcome::Simulated { recipients: to });
        }

        let mut message = OutgoingMessage {
            from: Some(request.teacher_email.to_string()),
            sender_name: request.teacher_name.to_string(),
            to,
            cc,
            reply_to: request.teacher_email.to_string(),
            subject: request.subject.to_string(),
            html_body: request.html_body.to_string(),
        };

        let primary_failure = match &self.primary {
            Some(primary) => match primary.send(&message).await {
                Ok(()) => {
                    info!(
                        backend = primary.name(),
                        from = request.teacher_email,
                        to = %message.to.join(","),
                        "email sent"
                    );
                    return Ok(DispatchOutcome::Sent {
                        backend: primary.name(),
                        recipients: message.to,
                    });
                }
                Err(err) => {
                    warn!(
                        backend = primary.name(),
                        error = %err,
                        "primary sender failed, falling back to system sender"
                    );
                    Some((primary.name(), err))
                }
            },
            None => None,
        };

        message.from = None;
        message.sender_name = format!(
            "{} (via {} System)",
            request.teacher_name, self.school_name
        );

        match self.fallback.send(&message).await {
            Ok(()) => {
                info!(
                    backend = self.fallback.name(),
                    to = %message.to.join(","),
                    "email sent via system sender"
                );
                Ok(DispatchOutcome::Sent {
                    backend: self.fallback.name(),
                    recipients: message.to,
                })
            }
            Err(err) => Err(match primary_failure {
                Some((primary, primary_error)) => DispatchError::BothBackendsFailed {
                    primary,
                    primary_error: format!("{primary_error:#}"),
                    fallback: self.fallback.name(),
                    fallback_error: format!("{err:#}"),
                },
                None => DispatchError::SystemSenderFailed {
                    backend: self.fallback.name(),
                    reason: format!("{err:#}"),
                },
            }),
        }
    }

    /// Sends a plain notice to an administrator through the system sender.
    pub async fn notify_admin(&self, to: &str, subject: &str, text: &str) -> Result<(), DispatchError> {
        if !self.send_enabled {
            info!(to, subject, "sending disabled, admin notice not delivered");
            return Ok(());
        }

        let escaped = text
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;");
        let message = OutgoingMessage {
            from: None,
            sender_name: format!("{} Behavior System", self.school_name),
            to: vec![to.to_string()],
            cc: Vec::new(),
            reply_to: self.system_address.clone(),
            subject: subject.to_string(),
            html_body: format!("<pre>{escaped}</pre>"),
        };

        self.fallback
            .send(&message)
            .await
            .map_err(|err| DispatchError::AdminNotice {
                to: to.to_string(),
                reason: format!("{err:#}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        fail: bool,
        attempts: AtomicUsize,
        sent: Mutex<Vec<OutgoingMessage>>,
    }

    impl RecordingSender {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<OutgoingMessage> {
            self.sent.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl MailSender for RecordingSender {
        fn name(&self) -> &'static str {
            if self.fail {
                "broken"
            } else {
                "recording"
            }
        }

        async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("not authorized");
            }
            self.sent.lock().expect("lock").push(message.clone());
            Ok(())
        }
    }

    fn request<'a>(parent_emails: [&'a str; 2], cc: &'a [String]) -> DispatchRequest<'a> {
        DispatchRequest {
            subject: "Good News Moment",
            html_body: "<p>hi</p>",
            parent_emails,
            teacher_email: "pat.lee@school.example.org",
            teacher_name: "Pat Lee",
            cc,
        }
    }

    fn dispatcher(
        primary: &Arc<RecordingSender>,
        fallback: &Arc<RecordingSender>,
        send_enabled: bool,
    ) -> Dispatcher {
        Dispatcher::new(
            Some(primary.clone()),
            fallback.clone(),
            send_enabled,
            "Lakeside Middle School",
            "system@school.example.org",
        )
    }

    #[test]
    fn identical_parent_emails_collapse_to_one_recipient() {
        assert_eq!(
            recipients(&["family@example.com", " Family@example.com "]),
            vec!["family@example.com".to_string()]
        );
        assert_eq!(
            recipients(&["", "not-an-address"]),
            Vec::<String>::new()
        );
    }

    #[test]
    fn cc_keeps_only_addresses() {
        let cc = vec![
            " principal@school.example.org ".to_string(),
            "".to_string(),
            "office".to_string(),
        ];
        assert_eq!(valid_cc(&cc), vec!["principal@school.example.org".to_string()]);
    }

    #[tokio::test]
    async fn primary_sends_as_teacher() {
        let primary = Arc::new(RecordingSender::default());
        let fallback = Arc::new(RecordingSender::default());
        let cc = vec!["principal@school.example.org".to_string()];

        let outcome = dispatcher(&primary, &fallback, true)
            .dispatch(&request(["a@example.com", "b@example.com"], &cc))
            .await
            .expect("dispatch should succeed");

        assert_eq!(
            outcome,
            DispatchOutcome::Sent {
                backend: "recording",
                recipients: vec!["a@example.com".to_string(), "b@example.com".to_string()],
            }
        );
        let sent = primary.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from.as_deref(), Some("pat.lee@school.example.org"));
        assert_eq!(sent[0].reply_to, "pat.lee@school.example.org");
        assert_eq!(sent[0].sender_name, "Pat Lee");
        assert_eq!(sent[0].cc, cc);
        assert!(fallback.sent().is_empty());
    }

    #[tokio::test]
    async fn falls_back_once_with_system_sender_name() {
        let primary = Arc::new(RecordingSender::failing());
        let fallback = Arc::new(RecordingSender::default());

        let outcome = dispatcher(&primary, &fallback, true)
            .dispatch(&request(["a@example.com", ""], &[]))
            .await
            .expect("fallback should succeed");

        assert!(matches!(outcome, DispatchOutcome::Sent { backend: "recording", .. }));
        let sent = fallback.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, None);
        assert_eq!(sent[0].sender_name, "Pat Lee (via Lakeside Middle School System)");
        assert_eq!(sent[0].reply_to, "pat.lee@school.example.org");
    }

    #[tokio::test]
    async fn both_backends_failing_is_an_error() {
        let primary = Arc::new(RecordingSender::failing());
        let fallback = Arc::new(RecordingSender::failing());

        let err = dispatcher(&primary, &fallback, true)
            .dispatch(&request(["a@example.com", ""], &[]))
            .await
            .expect_err("dispatch should fail");

        assert!(matches!(err, DispatchError::BothBackendsFailed { .. }));
        assert!(err.to_string().contains("not authorized"));
    }

    #[tokio::test]
    async fn without_primary_mail_goes_once_through_system_sender() {
        let system = Arc::new(RecordingSender::default());
        let dispatcher = Dispatcher::new(
            None,
            system.clone(),
            true,
            "Lakeside Middle School",
            "system@school.example.org",
        );

        let outcome = dispatcher
            .dispatch(&request(["a@example.com", ""], &[]))
            .await
            .expect("system sender should succeed");

        assert!(matches!(outcome, DispatchOutcome::Sent { backend: "recording", .. }));
        let sent = system.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, None);
        assert_eq!(sent[0].sender_name, "Pat Lee (via Lakeside Middle School System)");
    }

    #[tokio::test]
    async fn without_primary_a_system_failure_is_not_retried() {
        let system = Arc::new(RecordingSender::failing());
        let dispatcher = Dispatcher::new(
            None,
            system.clone(),
            true,
            "Lakeside Middle School",
            "system@school.example.org",
        );

        let err = dispatcher
            .dispatch(&request(["a@example.com", ""], &[]))
            .await
            .expect_err("dispatch should fail");

        assert!(matches!(err, DispatchError::SystemSenderFailed { backend: "broken", .. }));
        assert_eq!(system.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_sending_only_simulates() {
        let primary = Arc::new(RecordingSender::default());
        let fallback = Arc::new(RecordingSender::default());

        let outcome = dispatcher(&primary, &fallback, false)
            .dispatch(&request(["a@example.com", "a@example.com"], &[]))
            .await
            .expect("simulation should succeed");

        assert_eq!(
            outcome,
            DispatchOutcome::Simulated {
                recipients: vec!["a@example.com".to_string()]
            }
        );
        assert!(primary.sent().is_empty());
        assert!(fallback.sent().is_empty());
    }

    #[tokio::test]
    async fn no_valid_parent_address_skips_sending() {
        let primary = Arc::new(RecordingSender::default());
        let fallback = Arc::new(RecordingSender::default());

        let outcome = dispatcher(&primary, &fallback, true)
            .dispatch(&request(["", "   "], &[]))
            .await
            .expect("dispatch should succeed");

        assert_eq!(outcome, DispatchOutcome::NoRecipients);
        assert!(primary.sent().is_empty());
    }

    #[tokio::test]
    async fn admin_notice_goes_through_system_sender() {
        let primary = Arc::new(RecordingSender::default());
        let fallback = Arc::new(RecordingSender::default());

        dispatcher(&primary, &fallback, true)
            .notify_admin("tech@school.example.org", "Error", "bad <row> & data")
            .await
            .expect("notice should send");

        let sent = fallback.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].html_body, "<pre>bad &lt;row&gt; &amp; data</pre>");
        assert!(primary.sent().is_empty());
    }

    #[tokio::test]
    async fn outbox_writes_one_json_file_per_message() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outbox = OutboxMailer::new(dir.path().join("spool"));
        let message = OutgoingMessage {
            from: None,
            sender_name: "System".to_string(),
            to: vec!["a@example.com".to_string()],
            cc: Vec::new(),
            reply_to: "pat@example.com".to_string(),
            subject: "Hello".to_string(),
            html_body: "<p>hi</p>".to_string(),
        };

        outbox.send(&message).await.expect("outbox send");

        let files: Vec<_> = std::fs::read_dir(dir.path().join("spool"))
            .expect("spool dir")
            .collect();
        assert_eq!(files.len(), 1);
        let path = files[0].as_ref().expect("entry").path();
        let stored: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).expect("read")).expect("json");
        assert_eq!(stored["subject"], "Hello");
        assert_eq!(stored["to"][0], "a@example.com");
    }
}
