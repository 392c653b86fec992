use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::config::{AppConfig, BackendKind};
use crate::db::Database;
use crate::error::{GedError, Result};
use crate::models::{DashboardStats, DocumentData, DocumentStatus, NewDocument, Session, StoredDocument};
use crate::services::form::DocumentForm;
use crate::services::hosted::HostedPlatform;
use crate::services::local::LocalPlatform;
use crate::services::platform::{content_type_for, Credentials, ListQuery, Platform, SignUpOutcome, UrlDisposition};
use crate::utils::{display_name, download_file_name, is_absolute_url, matches_search, now_millis, storage_key};

const SESSION_SETTING: &str = "session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlAction {
    View,
    Download,
}

#[derive(Debug, Clone)]
pub struct DocumentLink {
    pub url: String,
    pub file_name: String,
}

/// Receives every session change until dropped or unsubscribed.
pub struct SessionSubscription {
    rx: watch::Receiver<Option<Session>>,
}

impl SessionSubscription {
    pub fn current(&self) -> Option<Session> {
        self.rx.borrow().clone()
    }

    /// Waits for the next change; `None` once the state is gone.
    pub async fn changed(&mut self) -> Option<Option<Session>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Stops notifications by dropping the receiver.
    pub fn unsubscribe(self) {
        drop(self.rx);
    }
}

pub struct AppState {
    pub config: AppConfig,
    pub db: Arc<Mutex<Database>>,
    platform: Platform,
    session_tx: watch::Sender<Option<Session>>,
}

impl AppState {
    /// Wires the backend named by the configuration.
    pub fn build(config: AppConfig, db: Arc<Mutex<Database>>) -> Result<Self> {
        let platform = match config.backend {
            BackendKind::Hosted => Platform::from_backend(Arc::new(HostedPlatform::new(&config)?)),
            BackendKind::Local => {
                Platform::from_backend(Arc::new(LocalPlatform::new(db.clone(), config.blob_dir())?))
            }
        };
        Self::new(config, db, platform)
    }

    pub fn new(config: AppConfig, db: Arc<Mutex<Database>>, platform: Platform) -> Result<Self> {
        let persisted = {
            let db = db.lock().map_err(|_| GedError::Internal("DB lock poisoned".to_string()))?;
            load_session(&db)?
        };
        let (session_tx, _) = watch::channel(persisted);
        Ok(AppState {
            config,
            db,
            platform,
            session_tx,
        })
    }

    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            rx: self.session_tx.subscribe(),
        }
    }

    pub fn session(&self) -> Option<Session> {
        self.session_tx.borrow().clone()
    }

    fn set_session(&self, session: Option<Session>) -> Result<()> {
        {
            let db = self.lock_db()?;
            match &session {
                Some(session) => db.set_setting(SESSION_SETTING, &serde_json::to_string(session)?)?,
                None => db.delete_setting(SESSION_SETTING)?,
            }
        }
        self.session_tx.send_replace(session);
        Ok(())
    }

    fn lock_db(&self) -> Result<std::sync::MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| GedError::Internal("DB lock poisoned".to_string()))
    }

    fn require_session(&self) -> Result<Session> {
        self.session().ok_or(GedError::NotAuthenticated)
    }

    pub async fn sign_up(&self, credentials: &Credentials) -> Result<SignUpOutcome> {
        let outcome = self.platform.identity.sign_up(credentials).await?;
        if let SignUpOutcome::SignedIn(session) = &outcome {
            self.set_session(Some(session.clone()))?;
        }
        Ok(outcome)
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let session = self.platform.identity.sign_in(credentials).await?;
        tracing::info!(user_id = %session.user.id, "signed in");
        self.set_session(Some(session.clone()))?;
        Ok(session)
    }

    /// The local session is dropped even when the provider call fails.
    pub async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.session() else {
            return Ok(());
        };
        let result = self.platform.identity.sign_out(&session).await;
        self.set_session(None)?;
        result
    }

    /// Confirms the stored session with the provider; a rejected one is cleared.
    pub async fn current_session(&self) -> Result<Option<Session>> {
        let Some(mut session) = self.session() else {
            return Ok(None);
        };
        match self.platform.identity.current_user(&session).await {
            Ok(user) => {
                session.user = user;
                Ok(Some(session))
            }
            Err(GedError::NotAuthenticated) => {
                tracing::info!("stored session rejected, signing out locally");
                self.set_session(None)?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn list_documents(&self, query: &ListQuery, search: Option<&str>) -> Result<Vec<StoredDocument>> {
        let session = self.require_session()?;
        let documents = self.platform.records.list(&session, query).await?;
        Ok(match search.map(str::trim).filter(|term| !term.is_empty()) {
            Some(term) => documents.into_iter().filter(|doc| matches_search(doc, term)).collect(),
            None => documents,
        })
    }

    pub async fn find_document(&self, id: &str) -> Result<StoredDocument> {
        self.list_documents(&ListQuery::default(), None)
            .await?
            .into_iter()
            .find(|doc| doc.id == id)
            .ok_or_else(|| GedError::NotFound(id.to_string()))
    }

    /// Uploads the attached file, then inserts the record as a draft.
    /// A failed insert leaves the uploaded file in place.
    pub async fn submit_document(&self, form: &DocumentForm) -> Result<StoredDocument> {
        let session = self.require_session()?;
        form.validate()?;
        let file = form
            .file()
            .ok_or_else(|| GedError::Validation("missing file".to_string()))?;

        let document = form.document().clone();
        let original_name = file_name(file);
        let key = storage_key(&session.user.id, now_millis(), document.doc_type, &original_name);
        let bytes = tokio::fs::read(file).await?;

        tracing::info!(key = %key, size = bytes.len(), "uploading document file");
        self.platform
            .objects
            .upload(&session, &key, bytes, content_type_for(&original_name))
            .await?;

        let record = NewDocument {
            user_id: session.user.id.clone(),
            file_url: key.clone(),
            status: DocumentStatus::Draft,
            document_data: DocumentData { document },
        };
        match self.platform.records.create(&session, &record).await {
            Ok(stored) => Ok(stored),
            Err(err) => {
                tracing::warn!(key = %key, "record insert failed after upload: {}", err);
                Err(err)
            }
        }
    }

    /// Removes the file (best effort) and then the record.
    pub async fn delete_document(&self, doc: &StoredDocument) -> Result<()> {
        let session = self.require_session()?;
        if !doc.file_url.is_empty() && !is_absolute_url(&doc.file_url) {
            if let Err(err) = self.platform.objects.remove(&session, &doc.file_url).await {
                tracing::warn!(key = %doc.file_url, "file removal failed: {}", err);
            }
        }
        self.platform.records.delete(&session, &doc.id).await?;
        tracing::info!(id = %doc.id, "document deleted");
        Ok(())
    }

    pub async fn document_link(&self, doc: &StoredDocument, action: UrlAction) -> Result<DocumentLink> {
        let display = display_name(doc);
        let file_name = match action {
            UrlAction::View => display,
            UrlAction::Download => download_file_name(&display, &doc.file_url),
        };
        if is_absolute_url(&doc.file_url) {
            return Ok(DocumentLink {
                url: doc.file_url.clone(),
                file_name,
            });
        }

        let session = self.require_session()?;
        let disposition = match action {
            UrlAction::View => UrlDisposition::Inline,
            UrlAction::Download => UrlDisposition::Attachment(file_name.clone()),
        };
        let url = self
            .platform
            .objects
            .signed_url(&session, &doc.file_url, self.config.signed_url_ttl, &disposition)
            .await?;
        Ok(DocumentLink { url, file_name })
    }

    pub async fn dashboard(&self) -> Result<DashboardStats> {
        let documents = self.list_documents(&ListQuery::default(), None).await?;
        Ok(dashboard_stats(&documents))
    }
}

pub fn dashboard_stats(documents: &[StoredDocument]) -> DashboardStats {
    let mut stats = DashboardStats {
        total: documents.len(),
        ..DashboardStats::default()
    };
    for doc in documents {
        match doc.status {
            DocumentStatus::Draft => stats.draft += 1,
            DocumentStatus::Validated => stats.validated += 1,
            DocumentStatus::Archived => stats.archived += 1,
        }
        stats.total_amount = stats
            .total_amount
            .saturating_add(doc.document_data.document.totals.grand_total);
    }
    stats
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn load_session(db: &Database) -> Result<Option<Session>> {
    let Some(raw) = db.get_setting(SESSION_SETTING)? else {
        return Ok(None);
    };
    let session: Session = match serde_json::from_str(&raw) {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!("discarding unreadable stored session: {}", err);
            return Ok(None);
        }
    };
    let now = chrono::Utc::now().timestamp();
    if session.expires_at.map(|at| at <= now).unwrap_or(false) {
        return Ok(None);
    }
    Ok(Some(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CommercialDocument;

    fn stored(status: DocumentStatus, total: &str) -> StoredDocument {
        let mut document = CommercialDocument::default();
        document.totals.grand_total = total.parse().unwrap();
        StoredDocument {
            id: "id".to_string(),
            created_at: String::new(),
            user_id: "u".to_string(),
            file_url: String::new(),
            status,
            document_data: DocumentData { document },
        }
    }

    #[test]
    fn dashboard_counts_statuses_and_sums_totals() {
        let docs = vec![
            stored(DocumentStatus::Draft, "239"),
            stored(DocumentStatus::Draft, "1.5"),
            stored(DocumentStatus::Archived, "10"),
        ];
        let stats = dashboard_stats(&docs);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.draft, 2);
        assert_eq!(stats.validated, 0);
        assert_eq!(stats.archived, 1);
        assert_eq!(stats.total_amount, "250.5".parse().unwrap());
    }

    #[test]
    fn unsubscribe_releases_the_receiver() {
        let (tx, _) = watch::channel(None);
        let sub = SessionSubscription { rx: tx.subscribe() };
        assert_eq!(tx.receiver_count(), 1);
        sub.unsubscribe();
        assert_eq!(tx.receiver_count(), 0);
    }

    #[test]
    fn expired_stored_session_is_ignored() {
        let db = Database::in_memory().unwrap();
        let session = Session {
            access_token: "t".to_string(),
            refresh_token: None,
            expires_at: Some(1),
            user: crate::models::User {
                id: "u".to_string(),
                email: None,
            },
        };
        db.set_setting(SESSION_SETTING, &serde_json::to_string(&session).unwrap()).unwrap();
        assert!(load_session(&db).unwrap().is_none());

        db.set_setting(SESSION_SETTING, "not json").unwrap();
        assert!(load_session(&db).unwrap().is_none());
    }
}
