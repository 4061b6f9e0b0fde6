use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client as SesClient;

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, mail: OutgoingMail) -> Result<()>;
}

pub struct SesMailer {
    client: SesClient,
    from: String,
}

impl SesMailer {
    pub fn new(client: SesClient, from: impl Into<String>) -> Self {
        Self {
            client,
            from: from.into(),
        }
    }
}

#[async_trait]
impl Mailer for SesMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        let destination = Destination::builder().to_addresses(&mail.to).build();

        let subject = Content::builder()
            .data(mail.subject)
            .charset("UTF-8")
            .build()
            .context("failed to build mail subject")?;
        let text = Content::builder()
            .data(mail.text_body)
            .charset("UTF-8")
            .build()
            .context("failed to build mail body")?;

        let message = Message::builder()
            .subject(subject)
            .body(Body::builder().text(text).build())
            .build();

        self.client
            .send_email()
            .from_email_address(&self.from)
            .destination(destination)
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await
            .context("failed to send email through SES")?;

        Ok(())
    }
}

/// Writes outgoing mail to the log instead of delivering it. Used when no
/// sender address is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            body = %mail.text_body,
            "mail delivery disabled; logging message"
        );
        Ok(())
    }
}

pub fn password_reset_mail(to: &str, reset_url: &str, token: &str) -> OutgoingMail {
    let separator = if reset_url.contains('?') { '&' } else { '?' };
    let link = format!("{reset_url}{separator}token={token}");
    OutgoingMail {
        to: to.to_string(),
        subject: "Password reset".to_string(),
        text_body: format!(
            "A password reset was requested for this account.\n\n\
             Open the link below to choose a new password:\n{link}\n\n\
             If you did not request this, ignore this message."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::password_reset_mail;

    #[test]
    fn reset_link_appends_token_query() {
        let mail = password_reset_mail("a@b.co", "https://portal/reset-password", "abc");
        assert!(mail
            .text_body
            .contains("https://portal/reset-password?token=abc"));
        assert_eq!(mail.to, "a@b.co");
    }

    #[test]
    fn reset_link_extends_existing_query() {
        let mail = password_reset_mail("a@b.co", "https://portal/reset?lang=ko", "abc");
        assert!(mail.text_body.contains("https://portal/reset?lang=ko&token=abc"));
    }
}
