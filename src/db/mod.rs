use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::PathBuf;

use crate::models::{DocumentData, DocumentStatus, StoredDocument, User};

/// Local SQLite database: settings, and the tables behind the local backend.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new(db_path: PathBuf) -> SqlResult<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let mut db = Database { conn };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn in_memory() -> SqlResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let mut db = Database { conn };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&mut self) -> SqlResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )?;

        let migrations = vec![
            (
                "001_create_settings.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/001_create_settings.sql"
                )),
            ),
            (
                "002_create_identity.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/002_create_identity.sql"
                )),
            ),
            (
                "003_create_documents.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/003_create_documents.sql"
                )),
            ),
        ];

        for (name, sql) in migrations {
            let applied: Option<String> = self
                .conn
                .query_row(
                    "SELECT name FROM schema_migrations WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;

            if applied.is_none() {
                let tx = self.conn.transaction()?;
                tx.execute_batch(sql)?;
                tx.execute(
                    "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, datetime('now'))",
                    params![name],
                )?;
                tx.commit()?;
            }
        }

        Ok(())
    }

    pub fn set_setting(&self, key: &str, value: &str) -> SqlResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> SqlResult<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
        stmt.query_row(params![key], |row| row.get(0)).optional()
    }

    pub fn delete_setting(&self, key: &str) -> SqlResult<()> {
        self.conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn insert_user(&self, user: &User, password_hash: &str) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO users (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, datetime('now'))",
            params![user.id, user.email, password_hash],
        )?;
        Ok(())
    }

    /// Returns the user and its stored password hash.
    pub fn get_user_by_email(&self, email: &str) -> SqlResult<Option<(User, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, email, password_hash FROM users WHERE email = ?1 COLLATE NOCASE")?;
        stmt.query_row(params![email], |row| {
            Ok((
                User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                },
                row.get(2)?,
            ))
        })
        .optional()
    }

    pub fn insert_session(&self, token: &str, user_id: &str, expires_at: i64) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at, created_at) VALUES (?1, ?2, ?3, datetime('now'))",
            params![token, user_id, expires_at],
        )?;
        Ok(())
    }

    /// User owning a session token that has not expired at `now` (unix seconds).
    pub fn get_session_user(&self, token: &str, now: i64) -> SqlResult<Option<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id, u.email
             FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.token = ?1 AND s.expires_at > ?2",
        )?;
        stmt.query_row(params![token, now], |row| {
            Ok(User {
                id: row.get(0)?,
                email: row.get(1)?,
            })
        })
        .optional()
    }

    /// Removes sessions that expired at or before `now`; returns how many.
    pub fn delete_expired_sessions(&self, now: i64) -> SqlResult<usize> {
        self.conn
            .execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])
    }

    pub fn delete_session(&self, token: &str) -> SqlResult<()> {
        self.conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(())
    }

    pub fn insert_document(&self, doc: &StoredDocument) -> SqlResult<()> {
        let data = serde_json::to_string(&doc.document_data)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        self.conn.execute(
            "INSERT INTO documents (id, created_at, user_id, file_url, status, document_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                doc.id,
                doc.created_at,
                doc.user_id,
                doc.file_url,
                doc.status.as_str(),
                data
            ],
        )?;
        Ok(())
    }

    pub fn get_documents(
        &self,
        user_id: &str,
        status: Option<DocumentStatus>,
        newest_first: bool,
    ) -> SqlResult<Vec<StoredDocument>> {
        let order = if newest_first { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT id, created_at, user_id, file_url, status, document_data
             FROM documents
             WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at {order}, rowid {order}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id, status.map(|s| s.as_str())], document_from_row)?;
        rows.collect()
    }

    /// Returns the number of rows removed; rows of other users are never touched.
    pub fn delete_document(&self, user_id: &str, id: &str) -> SqlResult<usize> {
        self.conn.execute(
            "DELETE FROM documents WHERE user_id = ?1 AND id = ?2",
            params![user_id, id],
        )
    }
}

fn document_from_row(row: &Row<'_>) -> SqlResult<StoredDocument> {
    let status: String = row.get(4)?;
    let data: String = row.get(5)?;
    let status = DocumentStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown status {}", status).into(),
        )
    })?;
    let document_data: DocumentData = serde_json::from_str(&data).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(StoredDocument {
        id: row.get(0)?,
        created_at: row.get(1)?,
        user_id: row.get(2)?,
        file_url: row.get(3)?,
        status,
        document_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CommercialDocument;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: Some(format!("{}@example.com", id)),
        }
    }

    fn doc(id: &str, user_id: &str, created_at: &str, status: DocumentStatus) -> StoredDocument {
        StoredDocument {
            id: id.to_string(),
            created_at: created_at.to_string(),
            user_id: user_id.to_string(),
            file_url: format!("{}/{}_FACTURE.pdf", user_id, id),
            status,
            document_data: DocumentData {
                document: CommercialDocument::default(),
            },
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gedpro.sqlite");
        Database::new(path.clone()).unwrap().set_setting("k", "v").unwrap();
        let db = Database::new(path).unwrap();
        assert_eq!(db.get_setting("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn settings_roundtrip_and_delete() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.get_setting("platform_url").unwrap(), None);
        db.set_setting("platform_url", "https://a").unwrap();
        db.set_setting("platform_url", "https://b").unwrap();
        assert_eq!(db.get_setting("platform_url").unwrap().as_deref(), Some("https://b"));
        db.delete_setting("platform_url").unwrap();
        assert_eq!(db.get_setting("platform_url").unwrap(), None);
    }

    #[test]
    fn documents_are_scoped_and_ordered() {
        let db = Database::in_memory().unwrap();
        db.insert_user(&user("alice"), "h").unwrap();
        db.insert_user(&user("bob"), "h").unwrap();
        db.insert_document(&doc("a1", "alice", "2024-01-01T00:00:00.000000Z", DocumentStatus::Draft)).unwrap();
        db.insert_document(&doc("a2", "alice", "2024-02-01T00:00:00.000000Z", DocumentStatus::Validated)).unwrap();
        db.insert_document(&doc("b1", "bob", "2024-03-01T00:00:00.000000Z", DocumentStatus::Draft)).unwrap();

        let ids: Vec<String> = db.get_documents("alice", None, true).unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a2", "a1"]);

        let drafts = db.get_documents("alice", Some(DocumentStatus::Draft), true).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id, "a1");

        assert_eq!(db.delete_document("alice", "b1").unwrap(), 0);
        assert_eq!(db.delete_document("bob", "b1").unwrap(), 1);
        assert!(db.get_documents("bob", None, true).unwrap().is_empty());
    }

    #[test]
    fn expired_sessions_resolve_to_nobody() {
        let db = Database::in_memory().unwrap();
        db.insert_user(&user("alice"), "h").unwrap();
        db.insert_session("tok", "alice", 100).unwrap();
        assert!(db.get_session_user("tok", 50).unwrap().is_some());
        assert!(db.get_session_user("tok", 100).unwrap().is_none());
        db.delete_session("tok").unwrap();
        assert!(db.get_session_user("tok", 50).unwrap().is_none());
    }

    #[test]
    fn expired_sessions_are_purged() {
        let db = Database::in_memory().unwrap();
        db.insert_user(&user("alice"), "h").unwrap();
        db.insert_session("old", "alice", 100).unwrap();
        db.insert_session("edge", "alice", 200).unwrap();
        db.insert_session("live", "alice", 300).unwrap();
        assert_eq!(db.delete_expired_sessions(200).unwrap(), 2);
        assert!(db.get_session_user("live", 200).unwrap().is_some());
        assert!(db.get_session_user("old", 0).unwrap().is_none());
        assert_eq!(db.delete_expired_sessions(200).unwrap(), 0);
    }
}
