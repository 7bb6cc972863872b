use std::sync::OnceLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::{Error, Result};
use crate::models::Account;
use crate::store::MailStore;

/// Hash a secret into an argon2id PHC string for storage.
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Malformed(format!("cannot hash secret: {e}")))
}

/// Hashes imported from the legacy `users` table.
fn is_bcrypt(stored: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"]
        .iter()
        .any(|prefix| stored.starts_with(prefix))
}

/// Verify a secret against a stored hash: argon2 PHC strings, or bcrypt for
/// imported accounts. Unusable hashes never match but still cost a full
/// argon2 verification.
fn verify_secret(secret: &str, stored: &str) -> bool {
    if is_bcrypt(stored) {
        return bcrypt::verify(secret, stored).unwrap_or_else(|e| {
            log::warn!("Stored bcrypt hash is unusable: {}", e);
            false
        });
    }
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::warn!("Stored secret hash is not a valid PHC string: {}", e);
            burn_dummy(secret);
            false
        }
    }
}

/// A real hash of a throwaway secret, so a miss costs the same as a wrong password.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_secret("mailstore-unknown-identity").unwrap_or_default())
}

fn burn_dummy(secret: &str) {
    if let Ok(parsed) = PasswordHash::new(dummy_hash()) {
        let _ = Argon2::default().verify_password(secret.as_bytes(), &parsed);
    }
}

/// Checks a presented identity and secret against stored credentials.
///
/// Read-only. Unknown identities and wrong secrets both come back as
/// [`Error::AuthFailed`]; lockout and rate limiting belong to a wrapping
/// policy, not here.
#[derive(Debug, Clone)]
pub struct CredentialVerifier<S> {
    store: S,
}

impl<S: MailStore> CredentialVerifier<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn verify(&self, identity: &str, secret: &str) -> Result<Account> {
        let account = self.store.find_account_by_address(identity).await?;

        let stored = account.as_ref().map(|a| a.secret_hash.clone());
        let secret = secret.to_string();
        // Hash checks are CPU-bound; run them off the async workers.
        let matched = tokio::task::spawn_blocking(move || match stored {
            Some(hash) => verify_secret(&secret, &hash),
            None => {
                burn_dummy(&secret);
                false
            }
        })
        .await
        .map_err(|e| {
            log::warn!("Credential check task failed: {}", e);
            Error::from(e)
        })?;

        match account {
            Some(account) if matched => {
                log::debug!("Authenticated {}", account.address);
                Ok(account)
            }
            _ => {
                log::warn!("Authentication failed for {identity:?}");
                Err(Error::AuthFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewAccount;
    use crate::store::StoreHandle;

    async fn store_with_bob() -> StoreHandle {
        let store = StoreHandle::open_in_memory().expect("open store");
        store
            .create_account(NewAccount {
                username: "bob".into(),
                address: "bob@testmail.dev".into(),
                display_name: "bob".into(),
                secret_hash: hash_secret("hunter2").expect("hash"),
            })
            .await
            .expect("create account");
        store
    }

    #[test]
    fn hash_then_verify() {
        let hash = hash_secret("s3cret").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_secret("s3cret", &hash));
        assert!(!verify_secret("other", &hash));
    }

    #[test]
    fn garbage_hash_never_matches() {
        assert!(!verify_secret("anything", "not-a-phc-string"));
        assert!(!verify_secret("anything", "$2b$05$truncated"));
    }

    const LEGACY_HASH: &str = "$2a$05$CCCCCCCCCCCCCCCCCCCCC.E5YPO9kmyuRGyh0XouQYb4YMJKvyOeW";

    #[test]
    fn bcrypt_hashes_still_verify() {
        assert!(verify_secret("U*U", LEGACY_HASH));
        assert!(!verify_secret("U*V", LEGACY_HASH));
    }

    #[tokio::test]
    async fn imported_legacy_account_can_log_in() {
        let dir = std::env::temp_dir().join(format!("mailstore-legacy-auth-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("mail.db");
        let _ = std::fs::remove_file(&path);
        {
            let conn = rusqlite::Connection::open(&path).expect("open legacy db");
            conn.execute_batch(
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT UNIQUE NOT NULL,
                    email TEXT UNIQUE NOT NULL,
                    password TEXT NOT NULL,
                    created DATETIME DEFAULT CURRENT_TIMESTAMP
                );",
            )
            .expect("create users");
            conn.execute(
                "INSERT INTO users (username, email, password) VALUES ('bob', 'bob@testmail.dev', ?1)",
                [LEGACY_HASH],
            )
            .expect("insert legacy user");
        }

        let store = StoreHandle::open(&path).expect("open store");
        let verifier = CredentialVerifier::new(store);
        let account = verifier.verify("bob@testmail.dev", "U*U").await.unwrap();
        assert_eq!(account.username, "bob");
        assert!(matches!(
            verifier.verify("bob@testmail.dev", "wrong").await,
            Err(Error::AuthFailed)
        ));

        drop(verifier);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn correct_secret_returns_account() {
        let verifier = CredentialVerifier::new(store_with_bob().await);
        let account = verifier.verify("bob@testmail.dev", "hunter2").await.unwrap();
        assert_eq!(account.username, "bob");
    }

    #[tokio::test]
    async fn wrong_secret_and_unknown_identity_look_the_same() {
        let verifier = CredentialVerifier::new(store_with_bob().await);

        let wrong = verifier.verify("bob@testmail.dev", "nope").await.unwrap_err();
        let unknown = verifier.verify("eve@testmail.dev", "hunter2").await.unwrap_err();

        assert!(matches!(wrong, Error::AuthFailed));
        assert!(matches!(unknown, Error::AuthFailed));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }
}
