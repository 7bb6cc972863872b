use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A registered mail account. The address is the login identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub address: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create an account; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub address: String,
    pub display_name: String,
    pub secret_hash: String,
}

/// A persisted message. Belongs to exactly one recipient mailbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Store-assigned, monotonic, never reused. Doubles as the IMAP UID.
    pub id: u32,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

/// A message about to be written for a single recipient.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// An address split on its first `@`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Strict parse used at ingestion: both halves must be non-empty.
    pub fn parse(address: &str) -> Result<Self> {
        match address.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(Self {
                local: local.to_string(),
                domain: domain.to_string(),
            }),
            _ => Err(Error::Malformed(format!("invalid address '{address}'"))),
        }
    }

    /// Lenient split for rows already in the store. A missing `@` yields an
    /// empty domain rather than an error.
    pub fn split_lossy(address: &str) -> Self {
        let (local, domain) = address.split_once('@').unwrap_or((address, ""));
        Self {
            local: local.to_string(),
            domain: domain.to_string(),
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

/// Trim, strip angle brackets and lowercase a protocol-level address.
pub fn normalize_address(address: &str) -> String {
    address
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_lowercase()
}
