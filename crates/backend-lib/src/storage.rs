// ============================
// crates/backend-lib/src/storage.rs
// ============================
//! In-memory credential store.
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyward_common::UserStatus;
use tokio::sync::RwLock;

use crate::account::{Credential, CredentialStore};
use crate::error::StoreError;

/// Credential store kept in process memory
///
/// Nothing survives a restart. Suitable for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    by_id: RwLock<HashMap<String, Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.by_id.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.by_id.read().await.is_empty()
    }

    async fn find(&self, pred: impl Fn(&Credential) -> bool) -> Option<Credential> {
        self.by_id.read().await.values().find(|c| pred(*c)).cloned()
    }

    /// Apply `f` to one credential under the write lock
    async fn modify<T>(&self, id: &str, f: impl FnOnce(&mut Credential) -> T) -> Result<T, StoreError> {
        let mut map = self.by_id.write().await;
        let credential = map
            .get_mut(id)
            .ok_or_else(|| StoreError::Unavailable(format!("credential {id} does not exist")))?;
        Ok(f(credential))
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_by_id(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.by_id.read().await.get(id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.find(|c| c.email == email).await)
    }

    async fn get_by_verification_token(&self, token: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .find(|c| c.verification_token.as_deref() == Some(token))
            .await)
    }

    async fn get_by_reset_token(&self, token: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.find(|c| c.reset_token.as_deref() == Some(token)).await)
    }

    async fn create(&self, credential: Credential) -> Result<(), StoreError> {
        let mut map = self.by_id.write().await;
        if map.values().any(|c| c.email == credential.email) {
            return Err(StoreError::Conflict(format!("email {}", credential.email)));
        }
        if map.contains_key(&credential.id) {
            return Err(StoreError::Conflict(format!("id {}", credential.id)));
        }
        map.insert(credential.id.clone(), credential);
        Ok(())
    }

    async fn update(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut map = self.by_id.write().await;
        match map.get_mut(&credential.id) {
            Some(slot) => {
                *slot = credential.clone();
                Ok(())
            },
            None => Err(StoreError::Unavailable(format!(
                "credential {} does not exist",
                credential.id
            ))),
        }
    }

    async fn update_password(&self, id: &str, password_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.modify(id, |c| {
            c.password_hash = password_hash.to_string();
            c.updated_at = at;
        })
        .await
    }

    async fn replace_password_hash(
        &self,
        id: &str,
        previous: &str,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.modify(id, |c| {
            if c.password_hash != previous {
                return false;
            }
            c.password_hash = password_hash.to_string();
            c.updated_at = at;
            true
        })
        .await
    }

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.modify(id, |c| {
            c.last_login = Some(at);
            c.updated_at = at;
        })
        .await
    }

    async fn set_verification_token(&self, id: &str, token: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.modify(id, |c| {
            c.verification_token = Some(token.to_string());
            c.verification_token_issued_at = Some(at);
            c.updated_at = at;
        })
        .await
    }

    async fn set_reset_token(&self, id: &str, token: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.modify(id, |c| {
            c.reset_token = Some(token.to_string());
            c.reset_token_requested_at = Some(at);
            c.updated_at = at;
        })
        .await
    }

    async fn consume_verification_token(&self, token: &str, at: DateTime<Utc>) -> Result<Option<Credential>, StoreError> {
        let mut map = self.by_id.write().await;
        let Some(credential) = map
            .values_mut()
            .find(|c| c.verification_token.as_deref() == Some(token))
        else {
            return Ok(None);
        };
        credential.verification_token = None;
        credential.verification_token_issued_at = None;
        if !credential.status.is_blocked() {
            credential.status = UserStatus::Active;
        }
        credential.updated_at = at;
        Ok(Some(credential.clone()))
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut map = self.by_id.write().await;
        let Some(credential) = map
            .values_mut()
            .find(|c| c.reset_token.as_deref() == Some(token))
        else {
            return Ok(false);
        };
        credential.password_hash = password_hash.to_string();
        credential.reset_token = None;
        credential.reset_token_requested_at = None;
        credential.updated_at = at;
        Ok(true)
    }
}
