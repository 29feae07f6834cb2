//! Session state: cookies and headers per profile, serialized for reuse
//! across runs. The live jar belongs to the HTTP client.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use siphon_core::ExtractError;

use crate::SessionStore;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// `Set-Cookie`-style strings, replayable into a jar.
    #[serde(default)]
    pub cookies: Vec<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub local_storage: HashMap<String, String>,
}

#[derive(Default)]
pub struct InMemorySessionStore {
    profiles: DashMap<String, SessionState>,
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, profile: &str) -> Result<Option<SessionState>, ExtractError> {
        Ok(self.profiles.get(profile).map(|s| s.clone()))
    }

    async fn put(&self, profile: &str, state: SessionState) -> Result<(), ExtractError> {
        self.profiles.insert(profile.to_string(), state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip() {
        let store = InMemorySessionStore::default();
        let state = SessionState {
            cookies: vec!["session=abc; Path=/".into()],
            ..Default::default()
        };
        store.put("default", state).await.unwrap();
        let loaded = store.get("default").await.unwrap().unwrap();
        assert_eq!(loaded.cookies.len(), 1);
        assert!(store.get("other").await.unwrap().is_none());
    }
}
