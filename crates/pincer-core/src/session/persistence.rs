//! Session persistence trait definition.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
//! The JSON-file implementation lives in pincer-infra.

use pincer_types::error::StoreError;
use pincer_types::session::Session;

/// Durable storage for sessions, keyed by session key.
pub trait SessionPersistence: Send + Sync {
    /// Write the full session, replacing any previous copy. Must be idempotent.
    fn save(
        &self,
        session: &Session,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Load every readable session. Unreadable entries are skipped and logged,
    /// never returned as an error.
    fn load_all(&self) -> impl std::future::Future<Output = Result<Vec<Session>, StoreError>> + Send;
}

/// Persistence that keeps nothing. Used for one-shot runs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPersistence;

impl SessionPersistence for NoopPersistence {
    async fn save(&self, _session: &Session) -> Result<(), StoreError> {
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Session>, StoreError> {
        Ok(Vec::new())
    }
}
