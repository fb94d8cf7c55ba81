//! Outbound-mail seam.
//!
//! The SMTP relay is an external collaborator; this module fixes the message
//! shapes the system emits. The approval mail is the one and only emission of
//! the plaintext link token and the Vendor Secret.

use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail relay unavailable")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMail {
    /// Sent to the vendor on share approval. Carries the bearer link URL and
    /// the dash-grouped Vendor Secret.
    ShareApproval {
        to: String,
        vendor_label: String,
        link_url: String,
        vendor_secret: String,
    },
    /// Sent to the vendor on a passed email check.
    Otp { to: String, otp: String },
    /// Sent to a prospective delegate.
    TeamInvite { to: String, invite_url: String },
}

impl OutboundMail {
    pub fn recipient(&self) -> &str {
        match self {
            OutboundMail::ShareApproval { to, .. }
            | OutboundMail::Otp { to, .. }
            | OutboundMail::TeamInvite { to, .. } => to,
        }
    }
}

pub trait Mailer: Send + Sync {
    fn send(&self, mail: OutboundMail) -> Result<(), MailError>;
}

/// Records outbound messages so tests can read the emitted token URL, Vendor
/// Secret, and OTP the way a recipient would from their inbox.
#[derive(Default)]
pub struct MockMailer {
    sent: Mutex<Vec<OutboundMail>>,
    failing: Mutex<bool>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().expect("mailer lock poisoned").clone()
    }

    pub fn last(&self) -> Option<OutboundMail> {
        self.sent.lock().expect("mailer lock poisoned").last().cloned()
    }

    /// Make every subsequent send fail, for testing that mail outages are
    /// non-fatal to the operations that trigger them.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("mailer lock poisoned") = failing;
    }
}

impl Mailer for MockMailer {
    fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        if *self.failing.lock().expect("mailer lock poisoned") {
            return Err(MailError::Unavailable);
        }
        self.sent.lock().expect("mailer lock poisoned").push(mail);
        Ok(())
    }
}
