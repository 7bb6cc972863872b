use rusqlite::Connection;

/// Schema DDL run on open.
pub(super) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    address TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL DEFAULT '',
    secret_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER))
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender TEXT NOT NULL,
    recipient TEXT NOT NULL,
    subject TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER)),
    is_read INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_messages_recipient
    ON messages(recipient, created_at DESC, id DESC);

CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
";

/// Run forward-only migrations. Safe to call on every open.
pub(super) fn run_migrations(conn: &Connection) {
    // First open wins; later opens keep the stored epoch.
    if let Err(e) = conn.execute(
        "INSERT OR IGNORE INTO store_meta (key, value)
         VALUES ('uid_validity', CAST(strftime('%s', 'now') AS INTEGER))",
        [],
    ) {
        log::warn!("Failed to seed uid_validity: {}", e);
    }

    if let Err(e) = import_legacy_tables(conn) {
        log::warn!("Legacy import failed: {}", e);
    }
}

/// Import rows from the older `users` / `emails` layout (text DATETIME
/// columns). Ids are carried over so UIDs stay valid across the import.
fn import_legacy_tables(conn: &Connection) -> Result<(), String> {
    if !table_exists(conn, "users") && !table_exists(conn, "emails") {
        return Ok(());
    }

    let already_imported: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM store_meta WHERE key = 'legacy_imported'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| format!("legacy check error: {e}"))?;
    if already_imported > 0 {
        return Ok(());
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| format!("legacy tx error: {e}"))?;

    if table_exists(&tx, "users") {
        tx.execute_batch(
            "
            INSERT OR IGNORE INTO accounts (id, username, address, display_name, secret_hash, created_at)
            SELECT id, username, email, username, password,
                   COALESCE(CAST(strftime('%s', created) AS INTEGER), CAST(strftime('%s', 'now') AS INTEGER))
            FROM users;
            ",
        )
        .map_err(|e| format!("legacy users copy error: {e}"))?;
    }

    if table_exists(&tx, "emails") {
        tx.execute_batch(
            "
            INSERT OR IGNORE INTO messages (id, sender, recipient, subject, body, created_at, is_read)
            SELECT id, from_email, to_email, COALESCE(subject, ''), COALESCE(body, ''),
                   COALESCE(CAST(strftime('%s', date) AS INTEGER), CAST(strftime('%s', 'now') AS INTEGER)),
                   CASE WHEN read THEN 1 ELSE 0 END
            FROM emails;
            ",
        )
        .map_err(|e| format!("legacy emails copy error: {e}"))?;
    }

    tx.execute(
        "INSERT INTO store_meta (key, value) VALUES ('legacy_imported', 1)",
        [],
    )
    .map_err(|e| format!("legacy marker error: {e}"))?;

    tx.commit()
        .map_err(|e| format!("legacy commit error: {e}"))?;
    log::info!("Imported legacy users/emails tables");
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
    .unwrap_or(false)
}
