use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use std::sync::Arc;

use crate::config::SmtpSettings;
use crate::error::{AppError, AppResult};
use crate::i18n::{Language, TranslationKey, t};
use crate::registration::{Registration, RegistrationStatus};

struct Mailer {
    smtp: SmtpTransport,
    from: Mailbox,
}

impl Mailer {
    fn new(settings: &SmtpSettings) -> AppResult<Self> {
        let creds = Credentials::new(settings.username.clone(), settings.password.clone());
        let tls_parameters = TlsParameters::new(settings.host.clone())
            .map_err(|e| AppError::Config(format!("SMTP TLS setup failed: {}", e)))?;

        let smtp = SmtpTransport::relay(&settings.host)
            .map_err(|e| AppError::Config(format!("SMTP relay {}: {}", settings.host, e)))?
            .credentials(creds)
            .port(465)
            .tls(Tls::Wrapper(tls_parameters))
            .build();

        let from = settings
            .from
            .parse()
            .map_err(|e| AppError::Config(format!("SMTP_FROM is not a mailbox: {}", e)))?;

        Ok(Mailer { smtp, from })
    }

    fn send(&self, to: &str, subject: &str, body: String) -> Result<(), String> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to.parse().map_err(|e| format!("bad recipient {}: {}", to, e))?)
            .subject(subject)
            .body(body)
            .map_err(|e| e.to_string())?;

        self.smtp.send(&email).map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Tells registrants about status changes.
///
/// With SMTP configured an email is sent; otherwise the sentence the email
/// would have carried is only logged.
#[derive(Clone)]
pub struct Notifier {
    mailer: Option<Arc<Mailer>>,
}

impl Notifier {
    pub fn new(settings: Option<&SmtpSettings>) -> AppResult<Self> {
        let mailer = match settings {
            Some(settings) => {
                log::info!("status notifications sent through {}", settings.host);
                Some(Arc::new(Mailer::new(settings)?))
            }
            None => None,
        };
        Ok(Notifier { mailer })
    }

    pub fn disabled() -> Self {
        Notifier { mailer: None }
    }

    pub fn is_simulated(&self) -> bool {
        self.mailer.is_none()
    }

    /// The sentence describing the email for `status`, e.g.
    /// "Un e-mail d'acceptation serait envoyé à jane@x.com".
    pub fn describe(registration: &Registration, language: Language) -> Option<String> {
        let key = match registration.status {
            RegistrationStatus::Confirmed => TranslationKey::EmailSimulationConfirm,
            RegistrationStatus::Rejected => TranslationKey::EmailSimulationReject,
            RegistrationStatus::Pending => return None,
        };
        Some(format!("{} {}", t(key, language), registration.email))
    }

    /// Notify the registrant of their current status. Delivery failures are
    /// logged, never returned: the status change itself already succeeded.
    ///
    /// # Arguments
    /// * `registration` - The record after the status change
    /// * `language` - Language of the simulated sentence
    ///
    /// # Returns
    /// * `Option<String>` - The simulation sentence when no SMTP relay is
    ///   configured; `None` for pending registrations or real deliveries
    pub async fn status_changed(&self, registration: &Registration, language: Language) -> Option<String> {
        let sentence = Self::describe(registration, language)?;

        let Some(mailer) = self.mailer.clone() else {
            log::info!("[simulated email] {}", sentence);
            return Some(sentence);
        };

        let to = registration.email.clone();
        let subject = format!(
            "{} - {}",
            t(TranslationKey::FormTitle, language),
            registration.status.label(language)
        );
        let body = format!(
            "{}: {}\n{}: {}\n{}: {}",
            t(TranslationKey::FullName, language),
            registration.full_name,
            t(TranslationKey::Category, language),
            registration.category.label(language),
            t(TranslationKey::Status, language),
            registration.status.label(language),
        );

        match tokio::task::spawn_blocking(move || mailer.send(&to, &subject, body)).await {
            Ok(Ok(())) => log::info!("status email sent to {}", registration.email),
            Ok(Err(e)) => log::error!("failed to email {}: {}", registration.email, e),
            Err(e) => log::error!("email task failed: {}", e),
        }

        Some(sentence)
    }
}
