/// Origin-change alerts
///
/// When a refresh token is exchanged from a different network origin than the
/// one it was issued to, the account owner gets a warning by mail. Delivery is
/// best effort: failures are logged and never reach the exchange caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::email_client::Mailer;
use crate::error::EmailError;

pub const ALERT_SUBJECT: &str = "Suspicious activity on your account";

#[derive(Clone, Default)]
pub struct AnomalyNotifier {
    mailer: Option<Arc<dyn Mailer>>,
}

impl AnomalyNotifier {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self {
            mailer: Some(mailer),
        }
    }

    /// A notifier with no mail transport; alerts are only logged
    pub fn disabled() -> Self {
        Self { mailer: None }
    }

    /// Compose and send the alert, waiting for the transport
    ///
    /// # Errors
    /// Returns the transport's error if delivery fails
    pub async fn notify(
        &self,
        username: &str,
        contact: &str,
        new_origin: &str,
    ) -> Result<(), EmailError> {
        let Some(mailer) = &self.mailer else {
            tracing::warn!(
                new_origin = %new_origin,
                "No mail transport configured, origin change alert not sent"
            );
            return Ok(());
        };

        let body = alert_body(username, new_origin, Utc::now());
        mailer.send_email(contact, ALERT_SUBJECT, &body).await
    }

    /// Send the alert on a detached task. The caller cannot observe the result.
    pub fn dispatch(&self, username: String, contact: String, new_origin: String) {
        let notifier = self.clone();
        tokio::spawn(async move {
            match notifier.notify(&username, &contact, &new_origin).await {
                Ok(()) => tracing::info!(new_origin = %new_origin, "Origin change alert sent"),
                Err(e) => tracing::error!(
                    new_origin = %new_origin,
                    error = %e,
                    "Failed to send origin change alert"
                ),
            }
        });
    }
}

fn alert_body(username: &str, new_origin: &str, at: DateTime<Utc>) -> String {
    format!(
        "{},\n\
         We noticed your account being accessed from a new IP address.\n\
         \n\
         Time: {} (UTC)\n\
         IP: {}\n\
         \n\
         If this was not you, please contact support.",
        username,
        at.format("%H:%M, %d.%m.%Y"),
        new_origin
    )
}
