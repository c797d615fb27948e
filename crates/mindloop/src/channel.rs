//! Notification channel seam
//!
//! The orchestrator only needs two capabilities from a messaging integration:
//! draining inbound text and sending outbound status messages. [`Notifier`]
//! covers the outbound half; [`Inbox`] the inbound half. [`local_channel`]
//! builds an in-process pair for the `--stdin` mode and for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("notification channel closed")]
    Closed,
}

/// Text received from the outside world
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Failure,
}

/// Status message for the outside world
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub text: String,
    pub severity: Severity,
}

impl OutboundMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity: Severity::Info,
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity: Severity::Success,
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity: Severity::Failure,
        }
    }

    /// Text with a status icon prefix
    pub fn render(&self) -> String {
        match self.severity {
            Severity::Info => self.text.clone(),
            Severity::Success => format!("✅ {}", self.text),
            Severity::Failure => format!("❌ {}", self.text),
        }
    }
}

/// Outbound half of a messaging integration
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<(), ChannelError>;
}

/// Notifier that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        info!(severity = ?message.severity, "Notification: {}", message.text);
        Ok(())
    }
}

/// Notifier that forwards into an in-process queue
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<OutboundMessage>,
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        self.tx.send(message).await.map_err(|_| ChannelError::Closed)
    }
}

/// Inbound half held by the orchestrator
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::Receiver<InboundMessage>,
}

impl Inbox {
    /// Take every message already queued without waiting
    pub fn drain(&mut self) -> Vec<InboundMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}

/// External side of a local channel: inject inbound text, read outbound messages
#[derive(Debug)]
pub struct ChannelHandle {
    pub inbound: mpsc::Sender<InboundMessage>,
    pub outbound: mpsc::Receiver<OutboundMessage>,
}

/// In-process channel pair
pub fn local_channel(capacity: usize) -> (Inbox, ChannelNotifier, ChannelHandle) {
    let (in_tx, in_rx) = mpsc::channel(capacity);
    let (out_tx, out_rx) = mpsc::channel(capacity);
    (
        Inbox { rx: in_rx },
        ChannelNotifier { tx: out_tx },
        ChannelHandle {
            inbound: in_tx,
            outbound: out_rx,
        },
    )
}
