//! Operations behind the web dashboard: inbox, message detail, local send.
//!
//! Opening a message is the only thing in the system that flips the read
//! flag. Sending goes straight into the recipient's store row with no relay.

use crate::error::{Error, Result};
use crate::models::{normalize_address, Account, EmailAddress, Message, NewMessage};
use crate::store::MailStore;

#[derive(Debug, Clone)]
pub struct Webmail<S> {
    store: S,
}

impl<S: MailStore> Webmail<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Newest first.
    pub async fn inbox(&self, account: &Account) -> Result<Vec<Message>> {
        Ok(self
            .store
            .list_messages_for_recipient(&account.address)
            .await?)
    }

    pub async fn unread_count(&self, account: &Account) -> Result<u32> {
        Ok(self
            .store
            .count_by_recipient(&account.address, true)
            .await?)
    }

    /// Returns the message and marks it read. Messages addressed to someone
    /// else are reported as missing.
    pub async fn open_message(&self, account: &Account, id: u32) -> Result<Message> {
        let mut message = self
            .store
            .find_message(id, &account.address)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {id}")))?;
        if !message.is_read {
            self.store.mark_read(id).await?;
            message.is_read = true;
        }
        Ok(message)
    }

    pub async fn send(&self, account: &Account, to: &str, subject: &str, body: &str) -> Result<u32> {
        let to = normalize_address(to);
        EmailAddress::parse(&to)?;
        let id = self
            .store
            .insert_message(NewMessage {
                sender: account.address.clone(),
                recipient: to,
                subject: subject.to_string(),
                body: body.to_string(),
            })
            .await?;
        log::info!("Local send {} from {}", id, account.address);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewAccount;
    use crate::store::StoreHandle;

    async fn account(store: &StoreHandle, name: &str) -> Account {
        store
            .create_account(NewAccount {
                username: name.into(),
                address: format!("{name}@testmail.dev"),
                display_name: name.into(),
                secret_hash: "unused".into(),
            })
            .await
            .expect("create account")
    }

    #[tokio::test]
    async fn send_then_open_marks_read() {
        let store = StoreHandle::open_in_memory().expect("open store");
        let alice = account(&store, "alice").await;
        let bob = account(&store, "bob").await;
        let webmail = Webmail::new(store);

        let id = webmail
            .send(&alice, "Bob@TestMail.dev", "lunch?", "noon")
            .await
            .unwrap();
        assert_eq!(webmail.unread_count(&bob).await.unwrap(), 1);

        let opened = webmail.open_message(&bob, id).await.unwrap();
        assert_eq!(opened.sender, "alice@testmail.dev");
        assert_eq!(opened.subject, "lunch?");
        assert!(opened.is_read);
        assert_eq!(webmail.unread_count(&bob).await.unwrap(), 0);
        assert!(webmail.inbox(&bob).await.unwrap()[0].is_read);
    }

    #[tokio::test]
    async fn other_accounts_messages_are_not_found() {
        let store = StoreHandle::open_in_memory().expect("open store");
        let alice = account(&store, "alice").await;
        let bob = account(&store, "bob").await;
        let webmail = Webmail::new(store);

        let id = webmail.send(&alice, &bob.address, "s", "b").await.unwrap();
        let err = webmail.open_message(&alice, id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(webmail.unread_count(&bob).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn self_send_lands_in_own_inbox() {
        let store = StoreHandle::open_in_memory().expect("open store");
        let alice = account(&store, "alice").await;
        let webmail = Webmail::new(store);

        webmail.send(&alice, &alice.address, "note", "to self").await.unwrap();
        let inbox = webmail.inbox(&alice).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].recipient, alice.address);
    }

    #[tokio::test]
    async fn send_rejects_malformed_recipient() {
        let store = StoreHandle::open_in_memory().expect("open store");
        let alice = account(&store, "alice").await;
        let webmail = Webmail::new(store);

        let err = webmail.send(&alice, "nobody", "s", "b").await.unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }
}
