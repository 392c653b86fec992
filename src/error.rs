use thiserror::Error;

#[derive(Debug, Error)]
pub enum GedError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Auth(String),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Platform error {status}: {message}")]
    Platform { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid document: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

/// How an error reaches the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Blocks everything until the configuration is fixed.
    Configuration,
    /// Shown inline next to the sign-in form.
    Authentication,
    /// Network or store failure; shown as a generic alert.
    Store,
    /// Rejected by the entry form.
    Validation,
}

impl GedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GedError::Config(_) => ErrorKind::Configuration,
            GedError::Auth(_) | GedError::NotAuthenticated => ErrorKind::Authentication,
            GedError::Validation(_) => ErrorKind::Validation,
            GedError::Platform { .. }
            | GedError::Http(_)
            | GedError::Database(_)
            | GedError::Io(_)
            | GedError::Json(_)
            | GedError::NotFound(_)
            | GedError::Internal(_) => ErrorKind::Store,
        }
    }

    /// Message suitable for display. Store failures collapse to a generic alert.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Store => match self {
                GedError::NotFound(what) => format!("Document not found: {}", what),
                _ => "An error occurred while contacting the document store.".to_string(),
            },
            _ => self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_generic_for_users() {
        let err = GedError::Platform {
            status: 500,
            message: "relation \"documents\" does not exist".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Store);
        assert!(!err.user_message().contains("relation"));
    }

    #[test]
    fn auth_errors_keep_platform_message() {
        let err = GedError::Auth("Invalid login credentials".to_string());
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.user_message(), "Invalid login credentials");
    }
}
