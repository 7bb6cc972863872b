use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::auth::CredentialVerifier;
use crate::error::{Error, Result};
use crate::models::{normalize_address, Account, EmailAddress, Message};
use crate::store::MailStore;

/// The only mailbox this store exposes.
pub const INBOX: &str = "INBOX";

// ---------------------------------------------------------------------------
// Sequence sets and selectors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqBound {
    Value(u32),
    /// `*`: the largest number currently in use.
    Star,
}

impl SeqBound {
    fn resolve(self, star: u32) -> u32 {
        match self {
            SeqBound::Value(n) => n,
            SeqBound::Star => star,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqRange {
    pub start: SeqBound,
    pub end: SeqBound,
}

/// A set of sequence numbers or UIDs, e.g. `1:3,5,7:*`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SequenceSet {
    ranges: Vec<SeqRange>,
}

impl SequenceSet {
    /// `1:*`
    pub fn all() -> Self {
        Self::range(SeqBound::Value(1), SeqBound::Star)
    }

    /// Exactly one number.
    pub fn single(n: u32) -> Self {
        Self::range(SeqBound::Value(n), SeqBound::Value(n))
    }

    /// One inclusive range; the bounds may be given in either order.
    pub fn range(start: SeqBound, end: SeqBound) -> Self {
        Self {
            ranges: vec![SeqRange { start, end }],
        }
    }

    /// Membership test; `star` is what `*` stands for right now.
    /// Reversed ranges such as `5:2` match the same numbers as `2:5`.
    pub fn contains(&self, n: u32, star: u32) -> bool {
        self.ranges.iter().any(|r| {
            let a = r.start.resolve(star);
            let b = r.end.resolve(star);
            a.min(b) <= n && n <= a.max(b)
        })
    }
}

impl FromIterator<u32> for SequenceSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            ranges: iter
                .into_iter()
                .map(|n| SeqRange {
                    start: SeqBound::Value(n),
                    end: SeqBound::Value(n),
                })
                .collect(),
        }
    }
}

fn parse_bound(s: &str) -> Result<SeqBound> {
    if s == "*" {
        return Ok(SeqBound::Star);
    }
    match s.parse::<u32>() {
        Ok(n) if n > 0 => Ok(SeqBound::Value(n)),
        _ => Err(Error::Malformed(format!("invalid sequence number '{s}'"))),
    }
}

impl FromStr for SequenceSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut ranges = Vec::new();
        for part in s.trim().split(',') {
            let range = match part.split_once(':') {
                Some((start, end)) => SeqRange {
                    start: parse_bound(start)?,
                    end: parse_bound(end)?,
                },
                None => {
                    let bound = parse_bound(part)?;
                    SeqRange {
                        start: bound,
                        end: bound,
                    }
                }
            };
            ranges.push(range);
        }
        Ok(Self { ranges })
    }
}

/// Which numbering scheme a [`SequenceSet`] refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Seq(SequenceSet),
    Uid(SequenceSet),
}

impl Selector {
    /// Every message in the mailbox.
    pub fn all() -> Self {
        Selector::Seq(SequenceSet::all())
    }
}

// ---------------------------------------------------------------------------
// Status and fetch attributes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatusItem {
    Messages,
    Recent,
    UidNext,
    UidValidity,
    Unseen,
}

/// Only the requested counters, in the order they were asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailboxStatus {
    pub name: String,
    pub read_only: bool,
    pub items: IndexMap<StatusItem, u32>,
}

impl MailboxStatus {
    /// `None` when the item was not requested.
    pub fn get(&self, item: StatusItem) -> Option<u32> {
        self.items.get(&item).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchItem {
    Envelope,
    BodyStructure,
    Flags,
    InternalDate,
    Rfc822Size,
    /// The stored body text.
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    /// Persisted creation time of the message, never the time of the fetch.
    pub date: DateTime<Utc>,
    pub subject: String,
    pub from: Vec<EmailAddress>,
    pub to: Vec<EmailAddress>,
}

/// Every message is a single text/plain part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BodyStructure {
    pub mime_type: &'static str,
    pub mime_subtype: &'static str,
    pub charset: &'static str,
    pub size: u32,
    pub lines: u32,
}

impl BodyStructure {
    fn plain_text(body: &str) -> Self {
        Self {
            mime_type: "text",
            mime_subtype: "plain",
            charset: "utf-8",
            size: octets(body),
            lines: u32::try_from(body.lines().count()).unwrap_or(u32::MAX),
        }
    }
}

fn octets(body: &str) -> u32 {
    u32::try_from(body.len()).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Flag {
    Seen,
    Answered,
    Flagged,
    Deleted,
    Draft,
    Keyword(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOp {
    Set,
    Add,
    Remove,
}

/// Accepted for interface completeness; searching always yields nothing.
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    pub selector: Option<Selector>,
    pub unseen: bool,
    pub text: Vec<String>,
}

/// One listed message. Unrequested attributes stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchedMessage {
    pub seq_num: u32,
    pub uid: u32,
    pub envelope: Option<Envelope>,
    pub body_structure: Option<BodyStructure>,
    pub flags: Option<Vec<Flag>>,
    pub internal_date: Option<DateTime<Utc>>,
    pub size: Option<u32>,
    pub text: Option<String>,
}

fn project(seq_num: u32, message: Message, items: &[FetchItem]) -> FetchedMessage {
    let mut fetched = FetchedMessage {
        seq_num,
        uid: message.id,
        ..Default::default()
    };
    for item in items {
        match item {
            FetchItem::Envelope => {
                fetched.envelope = Some(Envelope {
                    date: message.created_at,
                    subject: message.subject.clone(),
                    from: vec![EmailAddress::split_lossy(&message.sender)],
                    to: vec![EmailAddress::split_lossy(&message.recipient)],
                });
            }
            FetchItem::BodyStructure => {
                fetched.body_structure = Some(BodyStructure::plain_text(&message.body));
            }
            // Flags are not persisted.
            FetchItem::Flags => fetched.flags = Some(Vec::new()),
            FetchItem::InternalDate => fetched.internal_date = Some(message.created_at),
            FetchItem::Rfc822Size => fetched.size = Some(octets(&message.body)),
            FetchItem::Text => fetched.text = Some(message.body.clone()),
        }
    }
    fetched
}

// ---------------------------------------------------------------------------
// MessageListing: lazy projection over one store read
// ---------------------------------------------------------------------------

/// Yields selected messages newest first.
///
/// The sequence counter advances once per source row whether or not the row
/// is selected, so sequence numbers always describe the full ordered view.
#[derive(Debug)]
pub struct MessageListing {
    rows: std::vec::IntoIter<Message>,
    next_seq: u32,
    max_seq: u32,
    max_uid: u32,
    selector: Selector,
    items: Vec<FetchItem>,
}

impl MessageListing {
    fn new(rows: Vec<Message>, selector: Selector, items: &[FetchItem]) -> Self {
        let max_seq = u32::try_from(rows.len()).unwrap_or(u32::MAX);
        let max_uid = rows.iter().map(|m| m.id).max().unwrap_or(0);
        Self {
            rows: rows.into_iter(),
            next_seq: 1,
            max_seq,
            max_uid,
            selector,
            items: items.to_vec(),
        }
    }
}

impl Iterator for MessageListing {
    type Item = FetchedMessage;

    fn next(&mut self) -> Option<FetchedMessage> {
        for message in self.rows.by_ref() {
            let seq_num = self.next_seq;
            self.next_seq += 1;
            let selected = match &self.selector {
                Selector::Seq(set) => set.contains(seq_num, self.max_seq),
                Selector::Uid(set) => set.contains(message.id, self.max_uid),
            };
            if selected {
                return Some(project(seq_num, message, &self.items));
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Backend / user / mailbox
// ---------------------------------------------------------------------------

/// Entry point for a retrieval-protocol runtime.
#[derive(Debug, Clone)]
pub struct ImapBackend<S> {
    store: S,
    verifier: CredentialVerifier<S>,
}

impl<S: MailStore> ImapBackend<S> {
    /// Builds the backend over a shared store handle.
    pub fn new(store: S) -> Self {
        Self {
            verifier: CredentialVerifier::new(store.clone()),
            store,
        }
    }

    /// Normalizes the identity, verifies it and opens a user session.
    pub async fn login(&self, username: &str, password: &str) -> Result<ImapUser<S>> {
        let account = self
            .verifier
            .verify(&normalize_address(username), password)
            .await?;
        log::info!("IMAP login for {}", account.address);
        Ok(ImapUser {
            account,
            store: self.store.clone(),
        })
    }
}

/// An authenticated session's view of its own account.
#[derive(Debug, Clone)]
pub struct ImapUser<S> {
    account: Account,
    store: S,
}

impl<S: MailStore> ImapUser<S> {
    /// The login identity, i.e. the account address.
    pub fn username(&self) -> &str {
        &self.account.address
    }

    /// The authenticated account.
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Always just INBOX, subscribed or not.
    pub fn list_mailboxes(&self, _subscribed: bool) -> Result<Vec<Mailbox<S>>> {
        Ok(vec![self.inbox()])
    }

    /// `INBOX` is matched case-insensitively; nothing else exists.
    pub fn get_mailbox(&self, name: &str) -> Result<Mailbox<S>> {
        if name.eq_ignore_ascii_case(INBOX) {
            Ok(self.inbox())
        } else {
            Err(Error::NotFound(format!("mailbox '{name}'")))
        }
    }

    /// Unsupported: there is a single mailbox.
    pub fn create_mailbox(&self, _name: &str) -> Result<()> {
        Err(Error::Unsupported("create mailbox"))
    }

    /// Unsupported: INBOX cannot be removed.
    pub fn delete_mailbox(&self, _name: &str) -> Result<()> {
        Err(Error::Unsupported("delete mailbox"))
    }

    /// Unsupported: INBOX cannot be renamed.
    pub fn rename_mailbox(&self, _existing: &str, _new_name: &str) -> Result<()> {
        Err(Error::Unsupported("rename mailbox"))
    }

    /// Ends the session. Nothing is held that needs releasing.
    pub fn logout(self) -> Result<()> {
        log::debug!("IMAP logout for {}", self.account.address);
        Ok(())
    }

    fn inbox(&self) -> Mailbox<S> {
        Mailbox {
            name: INBOX.to_string(),
            owner: self.account.address.clone(),
            store: self.store.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailboxInfo {
    pub name: String,
    pub delimiter: String,
    pub attributes: Vec<String>,
}

/// The owner's inbox: every message whose recipient is the owner's address.
#[derive(Debug, Clone)]
pub struct Mailbox<S> {
    name: String,
    owner: String,
    store: S,
}

impl<S: MailStore> Mailbox<S> {
    /// Always `INBOX`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Listing metadata: `/` delimiter, no attributes.
    pub fn info(&self) -> MailboxInfo {
        MailboxInfo {
            name: self.name.clone(),
            delimiter: "/".into(),
            attributes: Vec::new(),
        }
    }

    /// Computes each requested counter independently; nothing else is queried.
    pub async fn status(&self, items: &[StatusItem]) -> Result<MailboxStatus> {
        let mut values = IndexMap::new();
        for item in items {
            if values.contains_key(item) {
                continue;
            }
            let value = match item {
                StatusItem::Messages => self.store.count_by_recipient(&self.owner, false).await?,
                StatusItem::Unseen => self.store.count_by_recipient(&self.owner, true).await?,
                StatusItem::UidNext => self.store.next_message_id().await?,
                StatusItem::UidValidity => self.store.uid_validity().await?,
                // No recent tracking.
                StatusItem::Recent => 0,
            };
            values.insert(*item, value);
        }
        Ok(MailboxStatus {
            name: self.name.clone(),
            read_only: false,
            items: values,
        })
    }

    /// Accepted and ignored; INBOX is always listed.
    pub fn set_subscribed(&self, _subscribed: bool) -> Result<()> {
        Ok(())
    }

    /// No-op checkpoint; every write is already durable.
    pub fn check(&self) -> Result<()> {
        Ok(())
    }

    /// Re-reads the mailbox on every call; sequence numbers are never cached.
    pub async fn list_messages(
        &self,
        selector: &Selector,
        items: &[FetchItem],
    ) -> Result<MessageListing> {
        let rows = self.store.list_messages_for_recipient(&self.owner).await?;
        log::debug!(
            "Listing {} rows in {} for {}",
            rows.len(),
            self.name,
            self.owner
        );
        Ok(MessageListing::new(rows, selector.clone(), items))
    }

    /// Always empty. An empty result is not an error.
    pub async fn search_messages(&self, _criteria: &SearchCriteria) -> Result<Vec<u32>> {
        Ok(Vec::new())
    }

    /// Unsupported: messages only arrive through ingestion.
    pub async fn create_message(
        &self,
        _flags: &[Flag],
        _date: DateTime<Utc>,
        _body: &[u8],
    ) -> Result<()> {
        Err(Error::Unsupported("append message"))
    }

    /// Accepted without effect; flags are not persisted.
    pub async fn update_messages_flags(
        &self,
        _selector: &Selector,
        _op: FlagOp,
        _flags: &[Flag],
    ) -> Result<()> {
        Ok(())
    }

    /// Unsupported: there is no second mailbox to copy into.
    pub async fn copy_messages(&self, _selector: &Selector, _dest: &str) -> Result<()> {
        Err(Error::Unsupported("copy messages"))
    }

    /// No-op: there is no deletion model.
    pub async fn expunge(&self) -> Result<()> {
        Ok(())
    }
}
