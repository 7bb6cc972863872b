use std::path::Path;

use rusqlite::Connection;
use tokio::sync::{mpsc, oneshot};

use super::commands::StoreCmd;
use super::queries;
use super::schema::{run_migrations, SCHEMA};
use crate::error::StoreError;
use crate::models::{Account, Message, NewAccount, NewMessage};

// ---------------------------------------------------------------------------
// StoreHandle: Clone + Send + Sync async facade
// ---------------------------------------------------------------------------

/// Owns nothing but a channel; the connection lives on a dedicated thread,
/// so every call is one short statement against SQLite.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::UnboundedSender<StoreCmd>,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle").finish_non_exhaustive()
    }
}

impl StoreHandle {
    /// Open (or create) the database file and spawn the background thread.
    pub fn open(db_file: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_file.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(format!("Failed to create store dir: {e}")))?;
        }
        let conn = Connection::open(db_file)?;
        log::info!("Opened mail store at {}", db_file.display());
        Self::spawn(conn)
    }

    /// Throwaway store for tests and tooling.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::spawn(Connection::open_in_memory()?)
    }

    fn spawn(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        run_migrations(&conn);

        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("mailstore".into())
            .spawn(move || run_loop(conn, rx))
            .map_err(|e| StoreError::Database(format!("Failed to spawn store thread: {e}")))?;

        Ok(StoreHandle { tx })
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, StoreError>>) -> StoreCmd,
    ) -> Result<T, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| StoreError::Unavailable)?;
        rx.await.map_err(|_| StoreError::Unavailable)?
    }

    // -- async methods -------------------------------------------------------

    pub async fn find_account(&self, address: String) -> Result<Option<Account>, StoreError> {
        self.request(|reply| StoreCmd::FindAccount { address, reply })
            .await
    }

    pub async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        self.request(|reply| StoreCmd::CreateAccount { account, reply })
            .await
    }

    /// All messages for one recipient, newest first.
    pub async fn list_messages(&self, recipient: String) -> Result<Vec<Message>, StoreError> {
        self.request(|reply| StoreCmd::ListMessages { recipient, reply })
            .await
    }

    pub async fn find_message(
        &self,
        id: u32,
        recipient: String,
    ) -> Result<Option<Message>, StoreError> {
        self.request(|reply| StoreCmd::FindMessage {
            id,
            recipient,
            reply,
        })
        .await
    }

    pub async fn insert_message(&self, message: NewMessage) -> Result<u32, StoreError> {
        self.request(|reply| StoreCmd::InsertMessage { message, reply })
            .await
    }

    pub async fn mark_read(&self, id: u32) -> Result<(), StoreError> {
        self.request(|reply| StoreCmd::MarkRead { id, reply }).await
    }

    pub async fn count_by_recipient(
        &self,
        recipient: String,
        unread_only: bool,
    ) -> Result<u32, StoreError> {
        self.request(|reply| StoreCmd::CountByRecipient {
            recipient,
            unread_only,
            reply,
        })
        .await
    }

    pub async fn next_message_id(&self) -> Result<u32, StoreError> {
        self.request(|reply| StoreCmd::NextMessageId { reply }).await
    }

    pub async fn uid_validity(&self) -> Result<u32, StoreError> {
        self.request(|reply| StoreCmd::UidValidity { reply }).await
    }
}

// -- background thread ---------------------------------------------------

fn run_loop(conn: Connection, mut rx: mpsc::UnboundedReceiver<StoreCmd>) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            StoreCmd::FindAccount { address, reply } => {
                let _ = reply.send(queries::do_find_account(&conn, &address));
            }
            StoreCmd::CreateAccount { account, reply } => {
                let _ = reply.send(queries::do_create_account(&conn, &account));
            }
            StoreCmd::ListMessages { recipient, reply } => {
                let _ = reply.send(queries::do_list_messages(&conn, &recipient));
            }
            StoreCmd::FindMessage {
                id,
                recipient,
                reply,
            } => {
                let _ = reply.send(queries::do_find_message(&conn, id, &recipient));
            }
            StoreCmd::InsertMessage { message, reply } => {
                let _ = reply.send(queries::do_insert_message(&conn, &message));
            }
            StoreCmd::MarkRead { id, reply } => {
                let _ = reply.send(queries::do_mark_read(&conn, id));
            }
            StoreCmd::CountByRecipient {
                recipient,
                unread_only,
                reply,
            } => {
                let _ = reply.send(queries::do_count_by_recipient(
                    &conn,
                    &recipient,
                    unread_only,
                ));
            }
            StoreCmd::NextMessageId { reply } => {
                let _ = reply.send(queries::do_next_message_id(&conn));
            }
            StoreCmd::UidValidity { reply } => {
                let _ = reply.send(queries::do_uid_validity(&conn));
            }
        }
    }
    log::debug!("Store thread exiting");
}
