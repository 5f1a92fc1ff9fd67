//! Outbound mail.
//!
//! Handlers never send mail inline; they hand a [`Email`] to
//! [`AppState::background`](crate::state::AppState::background) and the
//! configured [`Mailer`] delivers it off the request path.

use async_trait::async_trait;
use tracing::info;

/// Messages this service sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Email {
    /// Sent after registration with the token needed to activate the account.
    Welcome {
        user_id: i64,
        activation_token: String,
    },
}

impl Email {
    pub fn subject(&self) -> &'static str {
        match self {
            Email::Welcome { .. } => "Welcome to Training Records!",
        }
    }

    pub fn body(&self) -> String {
        match self {
            Email::Welcome {
                user_id,
                activation_token,
            } => format!(
                "Thanks for signing up. Your user ID number is {user_id}.\n\n\
                 Please send a request to the `PUT /v1/users/activated` endpoint with the \
                 following JSON body to activate your account:\n\n\
                 {{\"token\": \"{activation_token}\"}}\n\n\
                 Please note that this is a one-time use token and it will expire in 3 days."
            ),
        }
    }
}

/// Delivery backend for [`Email`]s.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, email: &Email) -> anyhow::Result<()>;
}

/// Mailer that renders messages into the log instead of delivering them.
#[derive(Debug, Clone)]
pub struct LogMailer {
    sender: String,
}

impl LogMailer {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipient: &str, email: &Email) -> anyhow::Result<()> {
        if recipient.is_empty() {
            anyhow::bail!("cannot send {:?} without a recipient", email.subject());
        }

        info!(
            from = %self.sender,
            to = %recipient,
            subject = email.subject(),
            body = %email.body(),
            "Email sent"
        );
        Ok(())
    }
}
