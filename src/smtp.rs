use tokio::io::{AsyncRead, AsyncReadExt};

use crate::auth::CredentialVerifier;
use crate::config::Config;
use crate::error::{Error, Result, StoreError};
use crate::models::{normalize_address, Account, EmailAddress, NewMessage};
use crate::store::MailStore;

/// Header and body fields pulled out of a raw inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub subject: String,
    pub body: String,
}

/// Split a raw message at its first blank line and pick out the Subject.
///
/// Only `Subject:` is interpreted; From/To on the wire are ignored in favour
/// of the envelope addresses. Folded continuation lines are joined onto the
/// header they continue, and the last Subject wins. A stream without a blank
/// line is kept whole as the body, though a Subject line in it is still
/// picked up. The body is kept verbatim, line endings included.
pub fn parse_message(raw: &[u8]) -> ParsedMessage {
    let content = String::from_utf8_lossy(raw);
    let lines: Vec<&str> = content.split('\n').collect();

    let mut headers: Vec<String> = Vec::new();
    let mut body_start = 0;
    for (i, &line) in lines.iter().enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            body_start = i + 1;
            break;
        }
        match headers.last_mut() {
            Some(prev) if line.starts_with([' ', '\t']) => {
                prev.push(' ');
                prev.push_str(line.trim());
            }
            _ => headers.push(line.to_string()),
        }
    }

    let subject = headers
        .iter()
        .rev()
        .find_map(|h| header_value(h, "subject"))
        .unwrap_or_default();

    let body = lines[body_start..].join("\n");

    ParsedMessage { subject, body }
}

fn header_value(line: &str, name: &str) -> Option<String> {
    let (key, value) = line.split_once(':')?;
    key.eq_ignore_ascii_case(name)
        .then(|| value.trim().to_string())
}

/// Ids written by one ingestion, in recipient order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub message_ids: Vec<u32>,
}

/// Parse `raw` and write one independent message per recipient.
///
/// Every address is validated before anything is written. Delivery is
/// best-effort and not atomic: if a write fails after others succeeded,
/// the result is [`StoreError::PartialDelivery`] and the earlier rows stay.
pub async fn ingest<S: MailStore>(
    store: &S,
    sender: &str,
    recipients: &[String],
    raw: &[u8],
) -> Result<DeliveryReport> {
    EmailAddress::parse(sender)?;
    if recipients.is_empty() {
        return Err(Error::Malformed("no recipients".into()));
    }
    for rcpt in recipients {
        EmailAddress::parse(rcpt)?;
    }

    let parsed = parse_message(raw);
    let total = recipients.len();
    let mut message_ids = Vec::with_capacity(total);

    for rcpt in recipients {
        let written = store
            .insert_message(NewMessage {
                sender: sender.to_string(),
                recipient: rcpt.clone(),
                subject: parsed.subject.clone(),
                body: parsed.body.clone(),
            })
            .await;
        match written {
            Ok(id) => message_ids.push(id),
            Err(e) if message_ids.is_empty() => return Err(e.into()),
            Err(e) => {
                log::warn!(
                    "Delivery from {} stopped after {} of {} recipients: {}",
                    sender,
                    message_ids.len(),
                    total,
                    e
                );
                return Err(StoreError::PartialDelivery {
                    delivered: message_ids.len(),
                    total,
                    source: Box::new(e),
                }
                .into());
            }
        }
    }

    log::info!("Delivered message from {} to {} recipient(s)", sender, total);
    Ok(DeliveryReport { message_ids })
}

// ---------------------------------------------------------------------------
// Backend / session
// ---------------------------------------------------------------------------

/// Entry point for a submission-protocol runtime.
#[derive(Debug, Clone)]
pub struct SmtpBackend<S> {
    store: S,
    verifier: CredentialVerifier<S>,
    max_message_bytes: usize,
}

impl<S: MailStore> SmtpBackend<S> {
    pub fn new(store: S, config: &Config) -> Self {
        Self {
            verifier: CredentialVerifier::new(store.clone()),
            store,
            max_message_bytes: config.max_message_bytes,
        }
    }

    pub fn new_session(&self) -> SmtpSession<S> {
        SmtpSession {
            store: self.store.clone(),
            verifier: self.verifier.clone(),
            max_message_bytes: self.max_message_bytes,
            account: None,
            from: None,
            to: Vec::new(),
        }
    }
}

/// Per-connection transaction state. Never shared between sessions.
#[derive(Debug)]
pub struct SmtpSession<S> {
    store: S,
    verifier: CredentialVerifier<S>,
    max_message_bytes: usize,
    account: Option<Account>,
    from: Option<String>,
    to: Vec<String>,
}

impl<S: MailStore> SmtpSession<S> {
    pub async fn auth_plain(&mut self, username: &str, password: &str) -> Result<()> {
        let account = self
            .verifier
            .verify(&normalize_address(username), password)
            .await?;
        self.account = Some(account);
        Ok(())
    }

    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub fn mail(&mut self, from: &str) -> Result<()> {
        let from = normalize_address(from);
        EmailAddress::parse(&from)?;
        self.from = Some(from);
        Ok(())
    }

    pub fn rcpt(&mut self, to: &str) -> Result<()> {
        let to = normalize_address(to);
        EmailAddress::parse(&to)?;
        self.to.push(to);
        Ok(())
    }

    /// Read the full message and fan it out. The transaction is reset
    /// afterwards whether or not delivery succeeded.
    pub async fn data<R: AsyncRead + Unpin>(&mut self, reader: R) -> Result<DeliveryReport> {
        let result = self.deliver(reader).await;
        self.reset();
        result
    }

    async fn deliver<R: AsyncRead + Unpin>(&self, reader: R) -> Result<DeliveryReport> {
        let from = self
            .from
            .clone()
            .ok_or_else(|| Error::Malformed("DATA before MAIL".into()))?;
        if self.to.is_empty() {
            return Err(Error::Malformed("DATA before RCPT".into()));
        }

        let limit = u64::try_from(self.max_message_bytes).unwrap_or(u64::MAX);
        let mut raw = Vec::new();
        reader
            .take(limit.saturating_add(1))
            .read_to_end(&mut raw)
            .await
            .map_err(|e| Error::Malformed(format!("reading message data: {e}")))?;
        if raw.len() > self.max_message_bytes {
            return Err(Error::Malformed(format!(
                "message exceeds {} bytes",
                self.max_message_bytes
            )));
        }

        ingest(&self.store, &from, &self.to, &raw).await
    }

    /// Drop sender and recipients; authentication survives.
    pub fn reset(&mut self) {
        self.from = None;
        self.to.clear();
    }

    pub fn logout(mut self) -> Result<()> {
        self.reset();
        Ok(())
    }
}
