//! Persisted network credentials.
//!
//! Provisioning writes `(network name, secret, coordinator address)` once; the
//! node only reads it to find the coordinator and deletes it when the
//! coordinator stays unreachable, which sends the node back to provisioning.

use crate::document::DocumentStore;
use crate::error::StorageResult;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Credentials written by provisioning.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCredentials {
    #[serde(alias = "network_name")]
    pub ssid: String,

    #[serde(alias = "secret")]
    pub password: String,

    #[serde(default, alias = "coordinator_address")]
    pub central_ip: Option<String>,
}

// The secret stays out of logs.
impl std::fmt::Debug for NetworkCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkCredentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .field("central_ip", &self.central_ip)
            .finish()
    }
}

/// Store for [`NetworkCredentials`].
#[derive(Debug, Clone)]
pub struct CredentialStore {
    store: DocumentStore,
}

impl CredentialStore {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    /// In-memory store, for tests and diskless simulation.
    pub fn in_memory() -> Self {
        Self::new(DocumentStore::memory())
    }

    /// Load the credentials; `Ok(None)` if the node is unprovisioned.
    pub async fn load(&self) -> StorageResult<Option<NetworkCredentials>> {
        match self.store.read().await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Persist the credentials.
    pub async fn save(&self, credentials: &NetworkCredentials) -> StorageResult<()> {
        let bytes = serde_json::to_vec(credentials)?;
        self.store.write(&bytes).await
    }

    /// Delete the credentials; returns whether any were stored.
    pub async fn delete(&self) -> StorageResult<bool> {
        let existed = self.store.remove().await?;
        if existed {
            warn!(location = %self.store.location(), "Network credentials deleted");
        } else {
            info!("No network credentials to delete");
        }
        Ok(existed)
    }

    /// Coordinator address, if provisioned and readable.
    pub async fn coordinator_address(&self) -> Option<String> {
        match self.load().await {
            Ok(credentials) => credentials
                .and_then(|c| c.central_ip)
                .filter(|ip| !ip.trim().is_empty()),
            Err(e) => {
                warn!(error = %e, "Network credentials unreadable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!({"ssid": "lab", "password": "pw", "central_ip": "10.0.0.2"}))]
    #[case(json!({"network_name": "lab", "secret": "pw", "coordinator_address": "10.0.0.2"}))]
    fn test_credentials_aliases(#[case] value: serde_json::Value) {
        let credentials: NetworkCredentials = serde_json::from_value(value).unwrap();
        assert_eq!(credentials.ssid, "lab");
        assert_eq!(credentials.password, "pw");
        assert_eq!(credentials.central_ip.as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let credentials = NetworkCredentials {
            ssid: "lab".to_string(),
            password: "hunter2".to_string(),
            central_ip: None,
        };
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn test_load_save_delete() {
        let store = CredentialStore::in_memory();
        assert_eq!(store.load().await.unwrap(), None);
        assert_eq!(store.coordinator_address().await, None);

        let credentials = NetworkCredentials {
            ssid: "lab".to_string(),
            password: "pw".to_string(),
            central_ip: Some("192.168.4.1".to_string()),
        };
        store.save(&credentials).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(credentials));
        assert_eq!(
            store.coordinator_address().await.as_deref(),
            Some("192.168.4.1")
        );

        assert!(store.delete().await.unwrap());
        assert!(!store.delete().await.unwrap());
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_central_ip() {
        let memory = MemoryDocument::default();
        memory.set_contents(r#"{"ssid": "lab", "password": "pw"}"#);
        let store = CredentialStore::new(DocumentStore::Memory(memory));

        assert!(store.load().await.unwrap().is_some());
        assert_eq!(store.coordinator_address().await, None);
    }

    #[tokio::test]
    async fn test_corrupt_credentials() {
        let memory = MemoryDocument::default();
        memory.set_contents("garbage");
        let store = CredentialStore::new(DocumentStore::Memory(memory));

        assert!(store.load().await.is_err());
        assert_eq!(store.coordinator_address().await, None);
    }
}
