// ============================
// crates/backend-lib/src/mailer.rs
// ============================
//! Mailer that writes messages to the log instead of delivering them.
use async_trait::async_trait;

use crate::account::Mailer;
use crate::error::MailError;

/// Logs every outgoing message at `info`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        if to.is_empty() {
            return Err(MailError("missing recipient".to_string()));
        }
        tracing::info!(target: "keyward::mail", to, subject, body, "mail queued");
        Ok(())
    }
}
