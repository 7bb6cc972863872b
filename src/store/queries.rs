use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::error::StoreError;
use crate::models::{Account, Message, NewAccount, NewMessage};

fn to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Shared row-to-struct mapping for every message query.
///
/// Expects columns in this order:
///   0: id, 1: sender, 2: recipient, 3: subject, 4: body,
///   5: created_at, 6: is_read
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender: row.get(1)?,
        recipient: row.get(2)?,
        subject: row.get(3)?,
        body: row.get(4)?,
        created_at: to_datetime(row.get(5)?),
        is_read: row.get::<_, i64>(6)? != 0,
    })
}

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        username: row.get(1)?,
        address: row.get(2)?,
        display_name: row.get(3)?,
        secret_hash: row.get(4)?,
        created_at: to_datetime(row.get(5)?),
    })
}

const ACCOUNT_COLUMNS: &str = "id, username, address, display_name, secret_hash, created_at";
const MESSAGE_COLUMNS: &str = "id, sender, recipient, subject, body, created_at, is_read";

pub(super) fn do_find_account(
    conn: &Connection,
    address: &str,
) -> Result<Option<Account>, StoreError> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE address = ?1");
    Ok(conn.query_row(&sql, [address], row_to_account).optional()?)
}

pub(super) fn do_create_account(
    conn: &Connection,
    account: &NewAccount,
) -> Result<Account, StoreError> {
    conn.execute(
        "INSERT INTO accounts (username, address, display_name, secret_hash)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            account.username,
            account.address,
            account.display_name,
            account.secret_hash,
        ],
    )?;
    let id = conn.last_insert_rowid();
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], row_to_account)?)
}

pub(super) fn do_list_messages(
    conn: &Connection,
    recipient: &str,
) -> Result<Vec<Message>, StoreError> {
    // id breaks ties between rows created within the same second.
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE recipient = ?1
         ORDER BY created_at DESC, id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([recipient], row_to_message)?;

    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

pub(super) fn do_find_message(
    conn: &Connection,
    id: u32,
    recipient: &str,
) -> Result<Option<Message>, StoreError> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 AND recipient = ?2");
    Ok(conn
        .query_row(&sql, rusqlite::params![id, recipient], row_to_message)
        .optional()?)
}

pub(super) fn do_insert_message(
    conn: &Connection,
    message: &NewMessage,
) -> Result<u32, StoreError> {
    conn.execute(
        "INSERT INTO messages (sender, recipient, subject, body) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            message.sender,
            message.recipient,
            message.subject,
            message.body,
        ],
    )?;
    u32::try_from(conn.last_insert_rowid())
        .map_err(|_| StoreError::Database("message id exceeds the UID range".into()))
}

pub(super) fn do_mark_read(conn: &Connection, id: u32) -> Result<(), StoreError> {
    conn.execute("UPDATE messages SET is_read = 1 WHERE id = ?1", [id])?;
    Ok(())
}

pub(super) fn do_count_by_recipient(
    conn: &Connection,
    recipient: &str,
    unread_only: bool,
) -> Result<u32, StoreError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE recipient = ?1 AND (?2 = 0 OR is_read = 0)",
        rusqlite::params![recipient, unread_only],
        |row| row.get(0),
    )?)
}

/// One past the highest id ever handed out. AUTOINCREMENT never reuses ids,
/// so this stays a valid upper bound even after rows disappear.
pub(super) fn do_next_message_id(conn: &Connection) -> Result<u32, StoreError> {
    let high: i64 = conn.query_row(
        "SELECT MAX(
             COALESCE((SELECT seq FROM sqlite_sequence WHERE name = 'messages'), 0),
             COALESCE((SELECT MAX(id) FROM messages), 0)
         )",
        [],
        |row| row.get(0),
    )?;
    u32::try_from(high + 1)
        .map_err(|_| StoreError::Database("message id exceeds the UID range".into()))
}

pub(super) fn do_uid_validity(conn: &Connection) -> Result<u32, StoreError> {
    let value: i64 = conn.query_row(
        "SELECT value FROM store_meta WHERE key = 'uid_validity'",
        [],
        |row| row.get(0),
    )?;
    u32::try_from(value).map_err(|_| StoreError::Database("uid_validity out of range".into()))
}
