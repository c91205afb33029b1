//! Delivery of one-time links (password reset, email verification).

use crate::config::MailSettings;
use crate::errors::{AuthError, AuthResult};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::str::FromStr;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, to: &str, name: &str, token: &str) -> AuthResult<()>;

    async fn send_email_verification(&self, to: &str, name: &str, token: &str)
    -> AuthResult<()>;
}

/// SMTP delivery through lettre.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    settings: MailSettings,
}

impl SmtpMailer {
    pub fn new(settings: MailSettings) -> AuthResult<Self> {
        let host = settings
            .smtp_host
            .as_deref()
            .ok_or_else(|| AuthError::internal("SMTP_HOST is not configured"))?;
        let creds = Credentials::new(
            settings.smtp_username.clone(),
            settings.smtp_password.clone(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| AuthError::internal(format!("Invalid SMTP host: {e}")))?
            .port(settings.smtp_port)
            .credentials(creds)
            .build();

        Ok(Self {
            transport,
            settings,
        })
    }

    async fn send(&self, to: &str, subject: &str, text: String, html: String) -> AuthResult<()> {
        let from = Mailbox::from_str(&format!(
            "{} <{}>",
            self.settings.from_name, self.settings.from_email
        ))
        .map_err(|e| AuthError::internal(format!("Invalid from email: {e}")))?;
        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AuthError::internal(format!("Invalid recipient email: {e}")))?;

        let email = Message::builder()
            .from(from)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    ),
            )
            .map_err(|e| AuthError::internal(format!("Failed to build email: {e}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| AuthError::internal(format!("Failed to send email: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_password_reset(&self, to: &str, name: &str, token: &str) -> AuthResult<()> {
        let link = link(&self.settings.base_url, "reset-password", token);
        let (text, html) = render(
            name,
            "We received a request to reset your password.",
            "Reset password",
            &link,
            "The link can be used once. If you did not ask for a reset, ignore this email.",
        );
        self.send(to, "Reset your password", text, html).await
    }

    async fn send_email_verification(
        &self,
        to: &str,
        name: &str,
        token: &str,
    ) -> AuthResult<()> {
        let link = link(&self.settings.base_url, "verify-email", token);
        let (text, html) = render(
            name,
            "Please confirm your email address.",
            "Verify email",
            &link,
            "The link can be used once.",
        );
        self.send(to, "Verify your email address", text, html).await
    }
}

/// Development fallback used when no SMTP host is configured: the link is
/// written to the log instead of being sent.
#[derive(Debug, Default)]
pub struct LogMailer {
    base_url: String,
}

impl LogMailer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, to: &str, _name: &str, token: &str) -> AuthResult<()> {
        tracing::info!(to, link = %link(&self.base_url, "reset-password", token), "Password reset mail (not sent)");
        Ok(())
    }

    async fn send_email_verification(
        &self,
        to: &str,
        _name: &str,
        token: &str,
    ) -> AuthResult<()> {
        tracing::info!(to, link = %link(&self.base_url, "verify-email", token), "Verification mail (not sent)");
        Ok(())
    }
}

fn link(base_url: &str, path: &str, token: &str) -> String {
    format!("{}/{}?token={}", base_url.trim_end_matches('/'), path, token)
}

fn render(name: &str, intro: &str, action: &str, link: &str, footer: &str) -> (String, String) {
    let text = format!("Hi {name},\n\n{intro}\n\n{action}: {link}\n\n{footer}\n");
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <p>Hi {name},</p>
        <p>{intro}</p>
        <div style="text-align: center; margin: 30px 0;">
            <a href="{link}" style="background-color: #3498db; color: white; padding: 12px 30px; text-decoration: none; border-radius: 5px;">{action}</a>
        </div>
        <p style="word-break: break-all; color: #7f8c8d;">{link}</p>
        <p style="font-size: 12px; color: #7f8c8d;">{footer}</p>
    </div>
</body>
</html>"#
    );
    (text, html)
}
