//! User-visible notices (toasts).
//!
//! Synchronizers report remote failures and action outcomes here; the
//! presentation layer drains the receiver and renders. Sends never block:
//! if the consumer falls behind, the notice is logged and dropped.

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub title: String,
    pub body: String,
}

/// Cloneable sender half of the notice channel.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notice>,
}

impl Notifier {
    /// Create a notifier and the receiver the presentation layer consumes.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notice>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn info(&self, title: &str, body: impl Into<String>) {
        self.push(Severity::Info, title, body.into());
    }

    pub fn success(&self, title: &str, body: impl Into<String>) {
        self.push(Severity::Success, title, body.into());
    }

    pub fn error(&self, title: &str, body: impl Into<String>) {
        self.push(Severity::Error, title, body.into());
    }

    fn push(&self, severity: Severity, title: &str, body: String) {
        let notice = Notice {
            severity,
            title: title.to_string(),
            body,
        };
        if let Err(e) = self.tx.try_send(notice) {
            tracing::warn!(error = %e, "Failed to deliver notice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notice_delivery() {
        let (notifier, mut rx) = Notifier::channel(8);
        notifier.error("Send Error", "Message failed to send.");
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.severity, Severity::Error);
        assert_eq!(notice.title, "Send Error");
    }

    #[tokio::test]
    async fn test_overflow_is_dropped_not_panicked() {
        let (notifier, mut rx) = Notifier::channel(1);
        notifier.info("a", "1");
        notifier.info("b", "2");
        assert_eq!(rx.recv().await.unwrap().title, "a");
        assert!(rx.try_recv().is_err());
    }
}
