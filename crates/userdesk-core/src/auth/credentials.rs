use anyhow::{Context, Result};
use keyring::Entry;
use parking_lot::RwLock;

use super::session::Credential;

const SERVICE_NAME: &str = "userdesk";

/// Key-value persistence for the current [`Credential`].
///
/// Last write wins; no transactional guarantees. Readable by anyone, but
/// written only by login/logout and the session guard.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Result<Option<Credential>>;
    fn set(&self, credential: &Credential) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// In-process store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credential: RwLock<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: RwLock::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Result<Option<Credential>> {
        Ok(self.credential.read().clone())
    }

    fn set(&self, credential: &Credential) -> Result<()> {
        *self.credential.write() = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.credential.write() = None;
        Ok(())
    }
}

/// Credential kept in the OS keychain, one entry per account.
pub struct KeyringCredentialStore {
    account: String,
}

impl KeyringCredentialStore {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.account).context("Failed to create keyring entry")
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self) -> Result<Option<Credential>> {
        match self.entry()?.get_password() {
            Ok(secret) => {
                let credential = serde_json::from_str(&secret)
                    .context("Failed to parse credential from keychain")?;
                Ok(Some(credential))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve credential from keychain"),
        }
    }

    fn set(&self, credential: &Credential) -> Result<()> {
        let secret = serde_json::to_string(credential)?;
        self.entry()?
            .set_password(&secret)
            .context("Failed to store credential in keychain")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_last_write_wins() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.get().expect("read"), None);

        store.set(&Credential::new("A1", "R1", "")).expect("write");
        store.set(&Credential::new("A2", "R2", "")).expect("write");
        let current = store.get().expect("read").expect("present");
        assert_eq!(current.access_token, "A2");
        assert_eq!(current.refresh_token, "R2");

        store.clear().expect("clear");
        assert_eq!(store.get().expect("read"), None);
    }
}
