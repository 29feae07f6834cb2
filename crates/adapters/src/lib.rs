//! External-collaborator seams: the headless renderer, the embedding
//! provider, the vector store, and the session store. Everything here is
//! optional — the engine runs with all of them absent.

pub mod chrome;
pub mod embedding;
pub mod session;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use siphon_core::ExtractError;

pub use chrome::{ChromeRenderer, NullRenderer};
pub use embedding::{NullEmbedding, NullVectorStore};
pub use session::{InMemorySessionStore, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    #[default]
    Load,
    Domcontentloaded,
    Networkidle,
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub wait_for: WaitUntil,
    pub timeout_ms: u64,
    pub capture_network: bool,
    pub capture_console: bool,
    pub profile: Option<String>,
    pub headers: HashMap<String, String>,
    pub cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rendering {
    pub html: String,
    pub final_url: String,
    #[serde(default)]
    pub network: Vec<NetworkEntry>,
    #[serde(default)]
    pub console: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub url: String,
    pub method: String,
    pub status: Option<u16>,
}

/// Last-resort rendering strategy. `available()` false silently skips the
/// browser tier.
#[async_trait]
pub trait Renderer: Send + Sync {
    fn available(&self) -> bool;
    async fn render(&self, url: &str, opts: &RenderOptions) -> Result<Rendering, ExtractError>;
}

/// Optional semantic-similarity support. When unavailable the registry falls
/// back to literal matching and heuristic generalization.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn available(&self) -> bool;
    fn dimensions(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExtractError>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ExtractError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(
        &self,
        vector: &[f32],
        filter: Option<&str>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<VectorHit>, ExtractError>;
    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        meta: serde_json::Value,
    ) -> Result<(), ExtractError>;
}

/// Serialized browser/session state per profile. The cookie jar itself lives
/// in the HTTP client; this only persists and restores it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, profile: &str) -> Result<Option<SessionState>, ExtractError>;
    async fn put(&self, profile: &str, state: SessionState) -> Result<(), ExtractError>;
}
