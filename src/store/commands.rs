use tokio::sync::oneshot;

use crate::error::StoreError;
use crate::models::{Account, Message, NewAccount, NewMessage};

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

pub(super) enum StoreCmd {
    FindAccount {
        address: String,
        reply: Reply<Option<Account>>,
    },
    CreateAccount {
        account: NewAccount,
        reply: Reply<Account>,
    },
    ListMessages {
        recipient: String,
        reply: Reply<Vec<Message>>,
    },
    FindMessage {
        id: u32,
        recipient: String,
        reply: Reply<Option<Message>>,
    },
    InsertMessage {
        message: NewMessage,
        reply: Reply<u32>,
    },
    MarkRead {
        id: u32,
        reply: Reply<()>,
    },
    CountByRecipient {
        recipient: String,
        unread_only: bool,
        reply: Reply<u32>,
    },
    NextMessageId {
        reply: Reply<u32>,
    },
    UidValidity {
        reply: Reply<u32>,
    },
}
