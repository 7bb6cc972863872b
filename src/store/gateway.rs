use futures::future::BoxFuture;

use super::StoreHandle;
use crate::error::StoreError;
use crate::models::{Account, Message, NewAccount, NewMessage};

/// The read/write primitives every other component is built on.
///
/// Each call is a single, individually atomic store operation. Nothing here
/// spans rows except what the caller chooses to sequence, so the store
/// implementation never has to coordinate sessions.
pub trait MailStore: Clone + Send + Sync + 'static {
    fn find_account_by_address(
        &self,
        address: &str,
    ) -> BoxFuture<'_, Result<Option<Account>, StoreError>>;

    /// Fails with [`StoreError::Duplicate`] when the username or address is taken.
    fn create_account(&self, account: NewAccount) -> BoxFuture<'_, Result<Account, StoreError>>;

    /// Newest first; ties broken by descending id.
    fn list_messages_for_recipient(
        &self,
        address: &str,
    ) -> BoxFuture<'_, Result<Vec<Message>, StoreError>>;

    /// `None` when the id is unknown or belongs to another recipient.
    fn find_message(
        &self,
        id: u32,
        recipient: &str,
    ) -> BoxFuture<'_, Result<Option<Message>, StoreError>>;

    fn insert_message(&self, message: NewMessage) -> BoxFuture<'_, Result<u32, StoreError>>;

    fn mark_read(&self, id: u32) -> BoxFuture<'_, Result<(), StoreError>>;

    fn count_by_recipient(
        &self,
        address: &str,
        unread_only: bool,
    ) -> BoxFuture<'_, Result<u32, StoreError>>;

    /// Strictly greater than every id the store has ever assigned.
    fn next_message_id(&self) -> BoxFuture<'_, Result<u32, StoreError>>;

    /// Constant for the lifetime of the store.
    fn uid_validity(&self) -> BoxFuture<'_, Result<u32, StoreError>>;
}

impl MailStore for StoreHandle {
    fn find_account_by_address(
        &self,
        address: &str,
    ) -> BoxFuture<'_, Result<Option<Account>, StoreError>> {
        let address = address.to_string();
        Box::pin(self.find_account(address))
    }

    fn create_account(&self, account: NewAccount) -> BoxFuture<'_, Result<Account, StoreError>> {
        Box::pin(StoreHandle::create_account(self, account))
    }

    fn list_messages_for_recipient(
        &self,
        address: &str,
    ) -> BoxFuture<'_, Result<Vec<Message>, StoreError>> {
        let address = address.to_string();
        Box::pin(self.list_messages(address))
    }

    fn find_message(
        &self,
        id: u32,
        recipient: &str,
    ) -> BoxFuture<'_, Result<Option<Message>, StoreError>> {
        let recipient = recipient.to_string();
        Box::pin(StoreHandle::find_message(self, id, recipient))
    }

    fn insert_message(&self, message: NewMessage) -> BoxFuture<'_, Result<u32, StoreError>> {
        Box::pin(StoreHandle::insert_message(self, message))
    }

    fn mark_read(&self, id: u32) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(StoreHandle::mark_read(self, id))
    }

    fn count_by_recipient(
        &self,
        address: &str,
        unread_only: bool,
    ) -> BoxFuture<'_, Result<u32, StoreError>> {
        let address = address.to_string();
        Box::pin(StoreHandle::count_by_recipient(self, address, unread_only))
    }

    fn next_message_id(&self) -> BoxFuture<'_, Result<u32, StoreError>> {
        Box::pin(StoreHandle::next_message_id(self))
    }

    fn uid_validity(&self) -> BoxFuture<'_, Result<u32, StoreError>> {
        Box::pin(StoreHandle::uid_validity(self))
    }
}
