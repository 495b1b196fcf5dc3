//! Best-effort completion webhook.
//!
//! Delivery failure is logged by the caller and never re-classifies or
//! re-processes a task; there are no retries.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::debug;

/// Summary posted for each terminal task.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CompletionEvent {
    pub task_id: String,
    pub exit_code: i32,
    /// RFC 3339 completion timestamp.
    pub timestamp: String,
}

/// Abstraction over the notification channel.
pub trait Notifier {
    fn notify(&self, event: &CompletionEvent) -> Result<()>;
}

/// Notifier that POSTs JSON to an operator-configured endpoint.
///
/// With no endpoint configured, every notify is a no-op.
#[derive(Debug)]
pub struct WebhookNotifier {
    endpoint: Option<String>,
    client: reqwest::blocking::Client,
}

impl WebhookNotifier {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("build webhook client")?;
        Ok(Self { endpoint, client })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, event: &CompletionEvent) -> Result<()> {
        let Some(endpoint) = &self.endpoint else {
            return Ok(());
        };
        let response = self
            .client
            .post(endpoint)
            .json(event)
            .send()
            .with_context(|| format!("post completion webhook to {endpoint}"))?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "completion webhook to {endpoint} returned {}",
                response.status()
            ));
        }
        debug!(task_id = %event.task_id, "completion webhook delivered");
        Ok(())
    }
}
