//! BoxSessionPersistence -- object-safe dynamic dispatch wrapper for
//! SessionPersistence, following the same blanket-impl pattern as
//! `BoxLlmProvider`.

use std::future::Future;
use std::pin::Pin;

use pincer_types::error::StoreError;
use pincer_types::session::Session;

use super::persistence::SessionPersistence;

/// Object-safe version of [`SessionPersistence`] with boxed futures.
pub trait SessionPersistenceDyn: Send + Sync {
    fn save_boxed<'a>(
        &'a self,
        session: &'a Session,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

    fn load_all_boxed(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Session>, StoreError>> + Send + '_>>;
}

impl<T: SessionPersistence> SessionPersistenceDyn for T {
    fn save_boxed<'a>(
        &'a self,
        session: &'a Session,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(self.save(session))
    }

    fn load_all_boxed(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Session>, StoreError>> + Send + '_>> {
        Box::pin(self.load_all())
    }
}

/// Type-erased session persistence.
pub struct BoxSessionPersistence {
    inner: Box<dyn SessionPersistenceDyn + Send + Sync>,
}

impl BoxSessionPersistence {
    pub fn new<T: SessionPersistence + 'static>(persistence: T) -> Self {
        Self {
            inner: Box::new(persistence),
        }
    }

    pub async fn save(&self, session: &Session) -> Result<(), StoreError> {
        self.inner.save_boxed(session).await
    }

    pub async fn load_all(&self) -> Result<Vec<Session>, StoreError> {
        self.inner.load_all_boxed().await
    }
}
