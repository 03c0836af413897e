use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use service_core::error::AppError;
use std::sync::Mutex;
use std::time::Duration;

/// Outbound notification seam. Delivery is fire-and-forget from the caller's
/// perspective: failures are logged and never block token issuance.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_verification_email(
        &self,
        to_email: &str,
        verification_token: &str,
        base_url: &str,
    ) -> Result<(), AppError>;

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        base_url: &str,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpNotifier {
    pub fn new(config: &crate::config::SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(587)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "SMTP notifier initialized");

        Ok(Self {
            mailer,
            from_email: config.user.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: &str,
    ) -> Result<(), AppError> {
        let email = Message::builder()
            .from(self.from_email.parse().map_err(
                |e: lettre::address::AddressError| AppError::InternalError(e.into()),
            )?)
            .to(to_email.parse().map_err(
                |e: lettre::address::AddressError| AppError::InternalError(e.into()),
            )?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(plain_body.to_string())
            .map_err(|e| AppError::InternalError(e.into()))?;

        // SmtpTransport is blocking; keep it off the async runtime
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e.to_string(), to = %to_email, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_verification_email(
        &self,
        to_email: &str,
        verification_token: &str,
        base_url: &str,
    ) -> Result<(), AppError> {
        let verification_link = format!("{}/auth/verify?token={}", base_url, verification_token);

        let plain_body = format!(
            "Welcome! Please verify your email address by visiting the link below:\n\n\
             {}\n\n\
             This link will expire in 24 hours. If you didn't create an account, \
             please ignore this email.",
            verification_link
        );

        self.send_email(to_email, "Verify Your Email Address", &plain_body)
            .await
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        base_url: &str,
    ) -> Result<(), AppError> {
        let reset_link = format!(
            "{}/auth/password-reset/confirm?token={}",
            base_url, reset_token
        );

        let plain_body = format!(
            "We received a request to reset your password. Visit the link below \
             to set a new password:\n\n\
             {}\n\n\
             This link will expire in 1 hour. If you didn't request this, please \
             ignore this email.",
            reset_link
        );

        self.send_email(to_email, "Reset Your Password", &plain_body)
            .await
    }
}

/// Test notifier that records what would have been sent.
#[derive(Default)]
pub struct MockNotifier {
    pub verification_tokens: Mutex<Vec<(String, String)>>,
    pub reset_tokens: Mutex<Vec<(String, String)>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_verification_email(
        &self,
        to_email: &str,
        verification_token: &str,
        _base_url: &str,
    ) -> Result<(), AppError> {
        self.verification_tokens
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("mutex poisoned: {}", e)))?
            .push((to_email.to_string(), verification_token.to_string()));
        Ok(())
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        _base_url: &str,
    ) -> Result<(), AppError> {
        self.reset_tokens
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("mutex poisoned: {}", e)))?
            .push((to_email.to_string(), reset_token.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smtp_notifier_creation() {
        let config = crate::config::SmtpConfig {
            host: "smtp.example.com".to_string(),
            user: "noreply@example.com".to_string(),
            password: "app_password".to_string(),
        };

        assert!(SmtpNotifier::new(&config).is_ok());
    }
}
