//! Self-contained backend: identities and records in SQLite, blobs on disk.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::db::Database;
use crate::error::{GedError, Result};
use crate::models::{NewDocument, Session, StoredDocument, User};
use crate::services::crypto::CryptoService;
use crate::services::platform::{
    Credentials, IdentityProvider, ListQuery, ObjectStore, Order, RecordStore, SignUpOutcome, UrlDisposition,
};
use crate::utils::{now_rfc3339, sha256_hex};

const SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;
const MIN_PASSWORD_LEN: usize = 6;
const SIGNING_SECRET_SETTING: &str = "local_signing_secret";

pub struct LocalPlatform {
    db: Arc<Mutex<Database>>,
    blob_root: PathBuf,
    signing_secret: String,
}

impl LocalPlatform {
    pub fn new(db: Arc<Mutex<Database>>, blob_root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&blob_root)?;
        // signed URLs are file:// URLs and need an absolute root
        let blob_root = std::fs::canonicalize(&blob_root)?;
        let signing_secret = {
            let db = lock(&db)?;
            match db.get_setting(SIGNING_SECRET_SETTING)? {
                Some(secret) => secret,
                None => {
                    let secret = uuid::Uuid::new_v4().simple().to_string();
                    db.set_setting(SIGNING_SECRET_SETTING, &secret)?;
                    secret
                }
            }
        };
        Ok(LocalPlatform {
            db,
            blob_root,
            signing_secret,
        })
    }

    fn user_for(&self, session: &Session) -> Result<User> {
        let db = lock(&self.db)?;
        db.get_session_user(&session.access_token, Utc::now().timestamp())?
            .ok_or(GedError::NotAuthenticated)
    }

    /// Keys must stay under the signed-in user's prefix.
    fn blob_path(&self, user: &User, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        let owner = relative.components().next().and_then(|c| c.as_os_str().to_str());
        if !safe || owner != Some(user.id.as_str()) {
            return Err(GedError::Platform {
                status: 403,
                message: format!("access to {} denied", key),
            });
        }
        Ok(self.blob_root.join(relative))
    }

    fn signature(&self, key: &str, expires: i64) -> String {
        sha256_hex(&[
            self.signing_secret.as_bytes(),
            b":",
            key.as_bytes(),
            b":",
            expires.to_string().as_bytes(),
        ])
    }

    /// Checks a signature issued by [`ObjectStore::signed_url`].
    pub fn verify_signature(&self, key: &str, expires: i64, signature: &str, now: i64) -> bool {
        now < expires && self.signature(key, expires) == signature
    }

    fn issue_session(&self, db: &Database, user: User) -> Result<Session> {
        let now = Utc::now().timestamp();
        let purged = db.delete_expired_sessions(now)?;
        if purged > 0 {
            tracing::debug!(purged, "expired local sessions removed");
        }
        let token = uuid::Uuid::new_v4().to_string();
        let expires_at = now + SESSION_TTL_SECS;
        db.insert_session(&token, &user.id, expires_at)?;
        Ok(Session {
            access_token: token,
            refresh_token: None,
            expires_at: Some(expires_at),
            user,
        })
    }
}

fn lock(db: &Arc<Mutex<Database>>) -> Result<std::sync::MutexGuard<'_, Database>> {
    db.lock().map_err(|_| GedError::Internal("DB lock poisoned".to_string()))
}

#[async_trait]
impl IdentityProvider for LocalPlatform {
    async fn sign_up(&self, credentials: &Credentials) -> Result<SignUpOutcome> {
        let email = credentials.email.trim();
        if !email.contains('@') {
            return Err(GedError::Auth("Unable to validate email address: invalid format".to_string()));
        }
        if credentials.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(GedError::Auth(format!(
                "Password should be at least {} characters.",
                MIN_PASSWORD_LEN
            )));
        }

        let hash = CryptoService::hash_password(&credentials.password)
            .map_err(|e| GedError::Internal(e.to_string()))?;
        let db = lock(&self.db)?;
        if db.get_user_by_email(email)?.is_some() {
            return Err(GedError::Auth("User already registered".to_string()));
        }
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
        };
        db.insert_user(&user, &hash)?;
        tracing::info!(user_id = %user.id, "local account created");
        Ok(SignUpOutcome::SignedIn(self.issue_session(&db, user)?))
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let db = lock(&self.db)?;
        let invalid = || GedError::Auth("Invalid login credentials".to_string());
        let (user, hash) = db.get_user_by_email(credentials.email.trim())?.ok_or_else(invalid)?;
        let valid = CryptoService::verify_password(&credentials.password, &hash)
            .map_err(|e| GedError::Internal(e.to_string()))?;
        if !valid {
            return Err(invalid());
        }
        self.issue_session(&db, user)
    }

    async fn sign_out(&self, session: &Session) -> Result<()> {
        let db = lock(&self.db)?;
        db.delete_session(&session.access_token)?;
        Ok(())
    }

    async fn current_user(&self, session: &Session) -> Result<User> {
        self.user_for(session)
    }
}

#[async_trait]
impl RecordStore for LocalPlatform {
    async fn create(&self, session: &Session, record: &NewDocument) -> Result<StoredDocument> {
        let user = self.user_for(session)?;
        if record.user_id != user.id {
            return Err(GedError::Platform {
                status: 403,
                message: "new row violates row-level security policy".to_string(),
            });
        }
        let stored = StoredDocument {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now_rfc3339(),
            user_id: record.user_id.clone(),
            file_url: record.file_url.clone(),
            status: record.status,
            document_data: record.document_data.clone(),
        };
        lock(&self.db)?.insert_document(&stored)?;
        Ok(stored)
    }

    async fn list(&self, session: &Session, query: &ListQuery) -> Result<Vec<StoredDocument>> {
        let user = self.user_for(session)?;
        let db = lock(&self.db)?;
        Ok(db.get_documents(&user.id, query.status, query.order == Order::NewestFirst)?)
    }

    async fn delete(&self, session: &Session, id: &str) -> Result<()> {
        let user = self.user_for(session)?;
        // like a filtered DELETE, an unknown id is not an error
        let removed = lock(&self.db)?.delete_document(&user.id, id)?;
        tracing::debug!(id, removed, "local delete");
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalPlatform {
    async fn upload(&self, session: &Session, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        let user = self.user_for(session)?;
        let path = self.blob_path(&user, key)?;
        if path.exists() {
            return Err(GedError::Platform {
                status: 409,
                message: "The resource already exists".to_string(),
            });
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn remove(&self, session: &Session, key: &str) -> Result<()> {
        let user = self.user_for(session)?;
        let path = self.blob_path(&user, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn signed_url(
        &self,
        session: &Session,
        key: &str,
        ttl: Duration,
        disposition: &UrlDisposition,
    ) -> Result<String> {
        let user = self.user_for(session)?;
        let path = self.blob_path(&user, key)?;
        if !path.exists() {
            return Err(GedError::NotFound(key.to_string()));
        }
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let mut url = reqwest::Url::from_file_path(&path)
            .map_err(|_| GedError::Internal(format!("non-absolute blob path {}", path.display())))?;
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &self.signature(key, expires));
        if let UrlDisposition::Attachment(name) = disposition {
            url.query_pairs_mut().append_pair("download", name);
        }
        Ok(url.to_string())
    }
}
