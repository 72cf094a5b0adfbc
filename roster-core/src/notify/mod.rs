//! Best-effort notification of server errors

mod smtp;

pub use smtp::SmtpNotifier;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::NotifyConfig;
use crate::request_log::RequestDescriptor;

/// Notification errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid notifier configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to send notification: {0}")]
    SendFailed(String),
}

/// Delivers an alert about a failed request
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        request: &RequestDescriptor,
    ) -> Result<(), NotifyError>;
}

/// Writes notifications to the log only
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        request: &RequestDescriptor,
    ) -> Result<(), NotifyError> {
        tracing::error!(
            recipient,
            request_id = %request.request_id,
            method = %request.method,
            url = %request.url,
            "{}: {}",
            subject,
            body
        );
        Ok(())
    }
}

/// Notifier for the configuration: SMTP when a relay is configured,
/// otherwise log-only.
pub fn from_config(config: &NotifyConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    match &config.smtp {
        Some(smtp) => Ok(Arc::new(SmtpNotifier::from_config(smtp)?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
