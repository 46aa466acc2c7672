//! Delivery strategies behind a common trait.
//!
//! [`SmtpEmailStrategy`] talks to a real SMTP relay. [`EnqueueEmailStrategy`]
//! buffers messages in memory so a caller holding an open database
//! transaction can defer delivery until after commit.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::email::{EmailConfig, EmailError, EmailMessage};

/// A pluggable email delivery channel.
#[async_trait]
pub trait EmailStrategy: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

// ---------------------------------------------------------------------------
// SmtpEmailStrategy
// ---------------------------------------------------------------------------

/// Sends messages via the lettre async SMTP transport.
pub struct SmtpEmailStrategy {
    config: EmailConfig,
}

impl SmtpEmailStrategy {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EmailStrategy for SmtpEmailStrategy {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        use lettre::{
            message::header::ContentType, transport::smtp::authentication::Credentials,
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
        };

        let mut builder = Message::builder().from(self.config.from_address.parse()?);
        for to in &message.to {
            builder = builder.to(to.parse()?);
        }
        for cc in &message.cc {
            builder = builder.cc(cc.parse()?);
        }
        let email = builder
            .subject(&message.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
                .port(self.config.smtp_port);

        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let mailer = transport_builder.build();
        mailer.send(email).await?;

        tracing::info!(subject = %message.subject, "Notification email sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EnqueueEmailStrategy
// ---------------------------------------------------------------------------

/// Buffers messages in memory instead of sending them.
///
/// Used by runners that must not deliver anything until their database
/// transaction commits.
#[derive(Default)]
pub struct EnqueueEmailStrategy {
    queue: Mutex<Vec<EmailMessage>>,
}

impl EnqueueEmailStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the buffered messages without draining them.
    pub fn get_queue(&self) -> Vec<EmailMessage> {
        self.queue.lock().map(|q| q.clone()).unwrap_or_default()
    }

    /// Drain the buffer through a real delivery strategy. Delivery failures
    /// are logged and do not stop the drain; the accounting work they
    /// announce has already committed.
    pub async fn send_queued_emails(&self, inner: &dyn EmailStrategy) {
        let drained: Vec<EmailMessage> = match self.queue.lock() {
            Ok(mut q) => q.drain(..).collect(),
            Err(_) => return,
        };
        for message in &drained {
            if let Err(error) = inner.send(message).await {
                tracing::warn!(subject = %message.subject, %error, "Failed to deliver queued email");
            }
        }
    }
}

#[async_trait]
impl EmailStrategy for EnqueueEmailStrategy {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        if let Ok(mut q) = self.queue.lock() {
            q.push(message.clone());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DropEmailStrategy
// ---------------------------------------------------------------------------

/// Records messages and sends nothing. Used by tests and dry runs.
#[derive(Default)]
pub struct DropEmailStrategy {
    dropped: Mutex<Vec<EmailMessage>>,
}

impl DropEmailStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages that would have been sent.
    pub fn dropped(&self) -> Vec<EmailMessage> {
        self.dropped.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailStrategy for DropEmailStrategy {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        if let Ok(mut d) = self.dropped.lock() {
            d.push(message.clone());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
