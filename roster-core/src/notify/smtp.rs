//! SMTP notifier using lettre

use super::{Notifier, NotifyError};
use crate::config::SmtpConfig;
use crate::request_log::RequestDescriptor;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn from_config(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| NotifyError::InvalidConfiguration(e.to_string()))?
            .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = config.from.parse().map_err(|e| {
            NotifyError::InvalidConfiguration(format!("Invalid from address: {}", e))
        })?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

fn message_body(body: &str, request: &RequestDescriptor) -> String {
    format!(
        "{} {}{}\nrequest id: {}\nclient: {}\n\n{}",
        request.method,
        request.host.as_deref().unwrap_or(""),
        request.url,
        request.request_id,
        request.ip.as_deref().unwrap_or("unknown"),
        body
    )
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        request: &RequestDescriptor,
    ) -> Result<(), NotifyError> {
        let to: Mailbox = recipient.parse().map_err(|e| {
            NotifyError::InvalidConfiguration(format!("Invalid to address: {}", e))
        })?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message_body(body, request))
            .map_err(|e| NotifyError::SendFailed(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::SendFailed(e.to_string()))?;

        tracing::debug!(recipient, request_id = %request.request_id, "Error notification sent");
        Ok(())
    }
}
