//! Seams to the external platform: identity, record store, object store.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::models::{DocumentStatus, NewDocument, Session, StoredDocument, User};

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// The account is usable right away.
    SignedIn(Session),
    /// The platform sent a confirmation e-mail; sign in after confirming.
    ConfirmationRequired(User),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, Copy)]
pub struct ListQuery {
    pub status: Option<DocumentStatus>,
    pub order: Order,
}

impl Default for ListQuery {
    fn default() -> Self {
        ListQuery {
            status: None,
            order: Order::NewestFirst,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlDisposition {
    Inline,
    /// Served with `Content-Disposition: attachment` under this file name.
    Attachment(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, credentials: &Credentials) -> Result<SignUpOutcome>;
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session>;
    async fn sign_out(&self, session: &Session) -> Result<()>;
    /// Checks the session with the provider and returns its user.
    async fn current_user(&self, session: &Session) -> Result<User>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, session: &Session, record: &NewDocument) -> Result<StoredDocument>;
    async fn list(&self, session: &Session, query: &ListQuery) -> Result<Vec<StoredDocument>>;
    async fn delete(&self, session: &Session, id: &str) -> Result<()>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, session: &Session, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;
    async fn remove(&self, session: &Session, key: &str) -> Result<()>;
    async fn signed_url(
        &self,
        session: &Session,
        key: &str,
        ttl: Duration,
        disposition: &UrlDisposition,
    ) -> Result<String>;
}

/// The three collaborators, usually backed by the same platform.
#[derive(Clone)]
pub struct Platform {
    pub identity: Arc<dyn IdentityProvider>,
    pub records: Arc<dyn RecordStore>,
    pub objects: Arc<dyn ObjectStore>,
}

impl Platform {
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: IdentityProvider + RecordStore + ObjectStore + 'static,
    {
        Platform {
            identity: backend.clone(),
            records: backend.clone(),
            objects: backend,
        }
    }
}

pub fn content_type_for(name: &str) -> &'static str {
    match crate::utils::file_extension(name).map(|ext| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "pdf" => "application/pdf",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for("a/b.PDF"), "application/pdf");
        assert_eq!(content_type_for("scan.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("x.png"), "image/png");
        assert_eq!(content_type_for("x"), "application/octet-stream");
    }
}
