pub mod document;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use document::{
    Address, Article, BankDetails, Buyer, CommercialDocument, Contact, DocumentData, DocumentLine,
    DocumentNature, DocumentType, LegalMentions, LineTax, Seller, TaxRegime, Totals,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentStatus {
    #[serde(rename = "Brouillon")]
    Draft,
    #[serde(rename = "Validé")]
    Validated,
    #[serde(rename = "Archivé")]
    Archived,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "Brouillon",
            DocumentStatus::Validated => "Validé",
            DocumentStatus::Archived => "Archivé",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Brouillon" => Some(DocumentStatus::Draft),
            "Validé" => Some(DocumentStatus::Validated),
            "Archivé" => Some(DocumentStatus::Archived),
            _ => None,
        }
    }
}

/// A row of the documents table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub created_at: String,
    pub user_id: String,
    pub file_url: String,
    pub status: DocumentStatus,
    pub document_data: DocumentData,
}

/// Insert payload; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub user_id: String,
    pub file_url: String,
    pub status: DocumentStatus,
    pub document_data: DocumentData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub created_at: String,
    pub display_name: String,
    pub doc_type: DocumentType,
    pub nature: DocumentNature,
    pub number: String,
    pub date: String,
    pub counterparty: String,
    pub grand_total: Decimal,
    pub currency: String,
    pub status: DocumentStatus,
    pub file_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub platform_url: Option<String>,
    pub platform_api_key: Option<String>,
    pub bucket: String,
    pub table: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total: usize,
    pub draft: usize,
    pub validated: usize,
    pub archived: usize,
    pub total_amount: Decimal,
}
