use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

use crate::config::{CompanyConfig, MailProvider};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("mail provider '{0}' is not configured")]
    UnknownAlias(String),

    #[error("mail transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail provider rejected message: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Outbound mail, addressed through a provider alias ("default", "accounts").
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alias: &str, email: &Email) -> Result<(), NotifyError>;
}

/// Posts messages as JSON to an HTTP mail API, one provider per alias.
pub struct HttpMailNotifier {
    client: reqwest::Client,
    providers: HashMap<String, MailProvider>,
}

impl HttpMailNotifier {
    pub fn new(providers: HashMap<String, MailProvider>) -> Self {
        Self {
            client: reqwest::Client::new(),
            providers,
        }
    }
}

#[derive(Serialize)]
struct OutboundMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

#[async_trait]
impl Notifier for HttpMailNotifier {
    async fn send(&self, alias: &str, email: &Email) -> Result<(), NotifyError> {
        let provider = self
            .providers
            .get(alias)
            .ok_or_else(|| NotifyError::UnknownAlias(alias.to_string()))?;

        let response = self
            .client
            .post(&provider.endpoint)
            .bearer_auth(&provider.api_key)
            .json(&OutboundMail {
                from: &provider.from,
                to: &email.to,
                subject: &email.subject,
                html: &email.html,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected(format!("{} {}", status, body)));
        }

        tracing::info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

/// Logs messages instead of delivering them and keeps them for inspection.
#[derive(Default)]
pub struct LogNotifier {
    outbox: Mutex<Vec<Email>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Email> {
        self.outbox.lock().map(|outbox| outbox.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, alias: &str, email: &Email) -> Result<(), NotifyError> {
        tracing::info!(alias, to = %email.to, subject = %email.subject, "Email not delivered (no mail provider)");
        if let Ok(mut outbox) = self.outbox.lock() {
            outbox.push(email.clone());
        }
        Ok(())
    }
}

/// HTML bodies for account emails.
pub mod templates {
    use super::*;

    /// Which profile a welcome message introduces.
    #[derive(Debug, Clone, Copy)]
    pub enum Welcome {
        Agent,
        Officer,
        Member,
    }

    fn closing(company: &CompanyConfig) -> String {
        format!(
            "<p>If you have any questions or need assistance, reach out to our support team at \
             <strong>{}</strong> or <strong>{}</strong>.</p>\
             <p>Best regards,</p><p><strong>{}</strong></p>",
            company.support_email, company.support_phone, company.name
        )
    }

    pub fn welcome(kind: Welcome, to: &str, name: &str, dashboard_url: &str, company: &CompanyConfig) -> Email {
        let (subject, intro) = match kind {
            Welcome::Agent => (
                "Welcome to our service Agent!",
                format!("you have been successfully added to our system as an agent with <strong>{}</strong>.", company.name),
            ),
            Welcome::Officer => (
                "Welcome to our service Officer!",
                format!("you have been added to <strong>{}</strong> as a Loan Officer.", company.name),
            ),
            Welcome::Member => (
                "Welcome to our service Member!",
                format!("you have been added to a group in <strong>{}</strong> by an agent.", company.name),
            ),
        };
        Email {
            to: to.to_string(),
            subject: subject.to_string(),
            html: format!(
                "<p>Dear <strong>{}</strong>,</p><p>We are pleased to inform you that {}</p>\
                 <p>To get started, log in to your dashboard:</p>\
                 <a href=\"{}\" clicktracking=\"off\">{}</a>\
                 <p>Your initial password is your mobile number. Please change it after signing in.</p>{}",
                name, intro, dashboard_url, dashboard_url, closing(company)
            ),
        }
    }

    pub fn activation(to: &str, name: &str, activation_url: &str, company: &CompanyConfig) -> Email {
        Email {
            to: to.to_string(),
            subject: "Welcome to our service!".to_string(),
            html: format!(
                "<p>Dear <strong>{}</strong>,</p>\
                 <p>Thank you for registering with us! To activate your account, please click the following link:</p>\
                 <a href=\"{}\" clicktracking=\"off\">{}</a>\
                 <p>Once your account is activated you will be able to log in.</p>{}",
                name, activation_url, activation_url, closing(company)
            ),
        }
    }

    pub fn password_reset(to: &str, name: &str, reset_url: &str) -> Email {
        Email {
            to: to.to_string(),
            subject: "Password Reset Request".to_string(),
            html: format!(
                "<p>Hi {},</p>\
                 <p>We received a request to reset your password. To complete the process, please click the link below:</p>\
                 <p><a href=\"{}\">{}</a></p>\
                 <p>If you did not request a password reset, please ignore this email.</p>",
                name, reset_url, reset_url
            ),
        }
    }

    pub fn password_changed(to: &str, name: &str, company: &CompanyConfig) -> Email {
        Email {
            to: to.to_string(),
            subject: "Your Password Has Been Changed".to_string(),
            html: format!(
                "<p>Dear <strong>{}</strong>,</p>\
                 <p>Your password has been successfully reset. If you did not initiate this change, \
                 please contact support immediately.</p><p>Best regards,</p><p><strong>{}</strong></p>",
                name, company.name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::templates::*;
    use super::*;
    use crate::config::AppConfig;

    #[tokio::test]
    async fn log_notifier_keeps_messages() {
        let notifier = LogNotifier::new();
        let company = AppConfig::for_tests().company;
        let email = activation("jane@example.com", "Jane Doe", "http://app/activate-account/t/1", &company);
        notifier.send("default", &email).await.unwrap();
        assert_eq!(notifier.sent(), vec![email]);
    }

    #[tokio::test]
    async fn unknown_alias_is_an_error() {
        let notifier = HttpMailNotifier::new(HashMap::new());
        let email = password_reset("a@b.c", "A B", "http://x");
        assert!(matches!(notifier.send("accounts", &email).await, Err(NotifyError::UnknownAlias(_))));
    }

    #[test]
    fn welcome_subject_names_the_profile() {
        let company = AppConfig::for_tests().company;
        let email = welcome(Welcome::Agent, "a@b.c", "A B", "http://app/login", &company);
        assert_eq!(email.subject, "Welcome to our service Agent!");
        assert!(email.html.contains("http://app/login"));
    }
}
