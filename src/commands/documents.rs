use std::path::{Path, PathBuf};

use crate::models::{CommercialDocument, DocumentStatus, DocumentSummary, StoredDocument};
use crate::services::document_schema::parse_document;
use crate::services::form::DocumentForm;
use crate::services::platform::ListQuery;
use crate::services::state::{AppState, DocumentLink, UrlAction};
use crate::utils::{display_name, normalize_date};

pub fn summarize(doc: &StoredDocument) -> DocumentSummary {
    let document = &doc.document_data.document;
    let counterparty = if document.nature.seller_is_us() {
        document.buyer.legal_name.clone()
    } else {
        document.seller.legal_name.clone()
    };
    DocumentSummary {
        id: doc.id.clone(),
        created_at: doc.created_at.clone(),
        display_name: display_name(doc),
        doc_type: document.doc_type,
        nature: document.nature,
        number: document.number.clone(),
        date: document.date.clone(),
        counterparty,
        grand_total: document.totals.grand_total,
        currency: document.currency.clone(),
        status: doc.status,
        file_url: doc.file_url.clone(),
    }
}

/// A blank document as the entry form starts it.
pub fn new_document() -> CommercialDocument {
    DocumentForm::new().into_document()
}

/// Reads a document file and returns it with freshly computed totals.
pub async fn compute_totals(path: &Path) -> Result<CommercialDocument, String> {
    Ok(load_form(path).await?.into_document())
}

async fn load_form(path: &Path) -> Result<DocumentForm, String> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
    let mut document = parse_document(&raw).map_err(|e| e.user_message())?;
    if let Some(date) = normalize_date(&document.date) {
        document.date = date;
    }
    Ok(DocumentForm::from_document(document))
}

pub async fn submit_document(state: &AppState, document: &Path, file: PathBuf) -> Result<DocumentSummary, String> {
    let mut form = load_form(document).await?;
    form.attach_file(file).map_err(|e| e.user_message())?;
    let stored = state.submit_document(&form).await.map_err(|e| e.user_message())?;
    Ok(summarize(&stored))
}

pub async fn list_documents(
    state: &AppState,
    search: Option<&str>,
    status: Option<DocumentStatus>,
) -> Result<Vec<DocumentSummary>, String> {
    let query = ListQuery {
        status,
        ..ListQuery::default()
    };
    let documents = state
        .list_documents(&query, search)
        .await
        .map_err(|e| e.user_message())?;
    Ok(documents.iter().map(summarize).collect())
}

pub async fn get_document(state: &AppState, id: &str) -> Result<StoredDocument, String> {
    state.find_document(id).await.map_err(|e| e.user_message())
}

pub async fn delete_document(state: &AppState, id: &str) -> Result<(), String> {
    let doc = get_document(state, id).await?;
    state.delete_document(&doc).await.map_err(|e| e.user_message())
}

pub async fn document_link(state: &AppState, id: &str, action: UrlAction) -> Result<DocumentLink, String> {
    let doc = get_document(state, id).await?;
    state.document_link(&doc, action).await.map_err(|e| e.user_message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentData, DocumentNature};

    #[test]
    fn counterparty_follows_nature() {
        let mut document = new_document();
        document.seller.legal_name = "Nous SARL".to_string();
        document.buyer.legal_name = "Client SA".to_string();
        let mut stored = StoredDocument {
            id: "1".to_string(),
            created_at: String::new(),
            user_id: "u".to_string(),
            file_url: "u/1_FACTURE.pdf".to_string(),
            status: DocumentStatus::Draft,
            document_data: DocumentData { document },
        };
        assert_eq!(summarize(&stored).counterparty, "Client SA");

        stored.document_data.document.nature = DocumentNature::Purchase;
        assert_eq!(summarize(&stored).counterparty, "Nous SARL");
        assert_eq!(summarize(&stored).display_name, "1_FACTURE.pdf");
    }

    #[tokio::test]
    async fn totals_are_recomputed_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(
            &path,
            r#"{"type_document": "FACTURE", "date_document": "05/03/2024",
                "lignes": [{"quantite": 2, "prix_unitaire_ht": 100, "tva": {"taux": 19, "appliquee": true}}],
                "totaux": {"timbre_fiscal": 1, "total_ttc_net_a_payer": 5}}"#,
        )
        .unwrap();

        let document = compute_totals(&path).await.unwrap();
        assert_eq!(document.date, "2024-03-05");
        assert_eq!(document.totals.grand_total, rust_decimal::Decimal::from(239));
    }
}
