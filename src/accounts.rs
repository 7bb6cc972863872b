//! Account registration.
//!
//! Addresses are minted as `username@domain` from an allow-listed set of
//! domains. A taken address surfaces as [`StoreError::Duplicate`] so the
//! caller can tell it apart from other write failures.
//!
//! [`StoreError::Duplicate`]: crate::error::StoreError::Duplicate

use crate::auth::hash_secret;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Account, NewAccount};
use crate::store::MailStore;

#[derive(Debug, Clone)]
pub struct Registrar<S> {
    store: S,
    domains: Vec<String>,
}

impl<S: MailStore> Registrar<S> {
    pub fn new(store: S, config: &Config) -> Self {
        Self {
            store,
            domains: config.domains.clone(),
        }
    }

    pub fn available_domains(&self) -> &[String] {
        &self.domains
    }

    pub async fn register(&self, username: &str, domain: &str, secret: &str) -> Result<Account> {
        let username = username.trim().to_lowercase();
        let domain = domain.trim().to_lowercase();
        if username.is_empty() || domain.is_empty() || secret.is_empty() {
            return Err(Error::Malformed("all fields are required".into()));
        }
        if username.contains('@') || username.chars().any(char::is_whitespace) {
            return Err(Error::Malformed(format!("invalid username '{username}'")));
        }
        if !self.domains.iter().any(|d| *d == domain) {
            return Err(Error::Malformed(format!("domain '{domain}' is not offered")));
        }

        let address = format!("{username}@{domain}");
        let secret = secret.to_string();
        let secret_hash = tokio::task::spawn_blocking(move || hash_secret(&secret)).await??;

        let account = self
            .store
            .create_account(NewAccount {
                username: username.clone(),
                address,
                display_name: username,
                secret_hash,
            })
            .await?;
        log::info!("Registered account {}", account.address);
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialVerifier;
    use crate::error::StoreError;
    use crate::store::StoreHandle;

    fn registrar() -> Registrar<StoreHandle> {
        let store = StoreHandle::open_in_memory().expect("open store");
        Registrar::new(store, &Config::default())
    }

    #[tokio::test]
    async fn registers_lowercased_address() {
        let registrar = registrar();
        let account = registrar
            .register("  Alice ", "testmail.dev", "pw")
            .await
            .unwrap();
        assert_eq!(account.address, "alice@testmail.dev");
        assert_eq!(account.display_name, "alice");
        assert_ne!(account.secret_hash, "pw");

        let verifier = CredentialVerifier::new(registrar.store.clone());
        assert!(verifier.verify("alice@testmail.dev", "pw").await.is_ok());
    }

    #[tokio::test]
    async fn rejects_unknown_domain_and_empty_fields() {
        let registrar = registrar();
        let err = registrar.register("alice", "evil.com", "pw").await.unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));

        let err = registrar.register("", "testmail.dev", "pw").await.unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));

        let err = registrar.register("alice", "testmail.dev", "").await.unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }

    #[tokio::test]
    async fn duplicate_address_is_reported_as_such() {
        let registrar = registrar();
        registrar.register("alice", "testmail.dev", "pw").await.unwrap();

        let err = registrar
            .register("ALICE", "testmail.dev", "other")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Duplicate(_))));
    }
}
