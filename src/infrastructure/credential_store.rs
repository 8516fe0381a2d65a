use crate::domain::models::ANONYMOUS_OWNER_ID;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::warn;

/// Signed-in identity used to own remote documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteIdentity {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

pub trait CredentialStore: Send + Sync {
    fn save_identity(&self, identity: &RemoteIdentity) -> Result<(), InfraError>;
    fn load_identity(&self) -> Result<Option<RemoteIdentity>, InfraError>;
    fn delete_identity(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service_name: String,
    account_name: String,
}

impl KeyringCredentialStore {
    pub fn new(service_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account_name: account_name.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, &self.account_name)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new("pomonotes.remote", "default")
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save_identity(&self, identity: &RemoteIdentity) -> Result<(), InfraError> {
        let payload = serde_json::to_string(identity)
            .map_err(|error| InfraError::Credential(error.to_string()))?;
        self.entry()?
            .set_password(&payload)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn load_identity(&self) -> Result<Option<RemoteIdentity>, InfraError> {
        let payload = match self.entry()?.get_password() {
            Ok(value) => value,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(error) => return Err(InfraError::Credential(error.to_string())),
        };

        let identity = serde_json::from_str::<RemoteIdentity>(&payload)
            .map_err(|error| InfraError::Credential(error.to_string()))?;
        Ok(Some(identity))
    }

    fn delete_identity(&self) -> Result<(), InfraError> {
        match self.entry()?.delete_credential() {
            Ok(_) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    identity: Mutex<Option<RemoteIdentity>>,
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_identity(&self, identity: &RemoteIdentity) -> Result<(), InfraError> {
        let mut guard = self
            .identity
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        *guard = Some(identity.clone());
        Ok(())
    }

    fn load_identity(&self) -> Result<Option<RemoteIdentity>, InfraError> {
        let guard = self
            .identity
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        Ok(guard.clone())
    }

    fn delete_identity(&self) -> Result<(), InfraError> {
        let mut guard = self
            .identity
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        *guard = None;
        Ok(())
    }
}

/// Owner id stamped on remote records and session logs.
///
/// Resolves to `anonymous` when no identity is stored, when the stored user id
/// is blank, or when the keyring cannot be read. Local records never carry an
/// owner, so the fallback only affects which remote collection a solve lands in.
pub fn resolve_owner_id(store: &dyn CredentialStore) -> String {
    match store.load_identity() {
        Ok(Some(identity)) if !identity.user_id.trim().is_empty() => {
            identity.user_id.trim().to_string()
        }
        Ok(_) => ANONYMOUS_OWNER_ID.to_string(),
        Err(error) => {
            warn!(%error, "failed to read remote identity; writing as anonymous");
            ANONYMOUS_OWNER_ID.to_string()
        }
    }
}
