// Embeddings module
// Wraps an Ollama-compatible embedding server behind a trait seam

pub mod client;


pub use client::{EmbeddingClient, ModelInfo};

use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

/// Converts text into fixed-dimension vectors. Implemented by the HTTP
/// client in production and by deterministic stubs in tests.
pub trait Embedder: Send + Sync {
    /// Embed a single text. Empty input is an error, never a zero vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch; row `i` of the result corresponds to `texts[i]`.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

enum EmbedderState {
    Uninitialized,
    Ready(Arc<dyn Embedder>),
    Failed(String),
}

type EmbedderFactory = Box<dyn Fn() -> Result<Arc<dyn Embedder>> + Send + Sync>;

/// Lazily initialized shared embedder handle.
///
/// The first caller runs the factory (which may hit the network to resolve
/// models); concurrent first-callers serialize on the state lock so
/// initialization runs exactly once. A failed initialization is cached and
/// reported to every later caller rather than retried, since a missing
/// model does not fix itself mid-process.
pub struct LazyEmbedder {
    factory: EmbedderFactory,
    state: Mutex<EmbedderState>,
}

impl LazyEmbedder {
    #[inline]
    pub fn new(factory: EmbedderFactory) -> Self {
        Self {
            factory,
            state: Mutex::new(EmbedderState::Uninitialized),
        }
    }

    /// Wrap an already-initialized embedder
    #[inline]
    pub fn ready(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            factory: Box::new(|| Err(anyhow!("factory unused for pre-initialized embedder"))),
            state: Mutex::new(EmbedderState::Ready(embedder)),
        }
    }

    /// Get the embedder, initializing it on first use
    #[inline]
    pub fn get(&self) -> Result<Arc<dyn Embedder>> {
        let mut state = self.state.lock();
        match &*state {
            EmbedderState::Ready(embedder) => Ok(Arc::clone(embedder)),
            EmbedderState::Failed(reason) => Err(anyhow!(
                "Embedder initialization previously failed: {}",
                reason
            )),
            EmbedderState::Uninitialized => match (self.factory)() {
                Ok(embedder) => {
                    *state = EmbedderState::Ready(Arc::clone(&embedder));
                    Ok(embedder)
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    warn!("Embedder initialization failed: {}", reason);
                    *state = EmbedderState::Failed(reason);
                    Err(e)
                }
            },
        }
    }
}
