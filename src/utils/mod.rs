use chrono::{NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::models::{DocumentType, StoredDocument};

/// Microsecond precision keeps `created_at` ordering stable.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn sha256_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

pub fn format_amount(value: Decimal) -> String {
    format!("{:.3}", value)
}

/// Extension after the last dot of the final path segment.
pub fn file_extension(name: &str) -> Option<&str> {
    let segment = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

/// Object key `{user}/{millis}_{TYPE}.{ext}`.
pub fn storage_key(user_id: &str, timestamp_millis: i64, doc_type: DocumentType, original_name: &str) -> String {
    let ext = file_extension(original_name).unwrap_or("bin");
    format!("{}/{}_{}.{}", user_id, timestamp_millis, doc_type.code(), ext)
}

pub fn display_name(doc: &StoredDocument) -> String {
    let document = &doc.document_data.document;
    if !document.number.is_empty() {
        return format!("{} #{}", document.doc_type.label(), document.number);
    }
    if !doc.file_url.is_empty() {
        if let Some(last) = doc.file_url.rsplit('/').next() {
            return last.to_string();
        }
    }
    "Document sans nom".to_string()
}

/// Attachment file name: the display name reduced to `[A-Za-z0-9-_ ]`,
/// with whitespace runs turned into `_`, plus the key's extension.
pub fn download_file_name(display: &str, key: &str) -> String {
    let extension = key
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| ext.len() < 10)
        .map(|ext| ext.to_lowercase().split('?').next().unwrap_or_default().to_string())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "pdf".to_string());

    let cleaned: String = display
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ' '))
        .collect();
    let base = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    let base = if base.is_empty() { "Document".to_string() } else { base };

    format!("{}.{}", base, extension)
}

pub fn matches_search(doc: &StoredDocument, term: &str) -> bool {
    let needle = term.to_lowercase();
    let document = &doc.document_data.document;
    document.seller.legal_name.to_lowercase().contains(&needle)
        || display_name(doc).to_lowercase().contains(&needle)
        || document.number.to_lowercase().contains(&needle)
}

pub fn is_absolute_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

pub fn normalize_date(value: &str) -> Option<String> {
    let raw = value.trim();
    if raw.is_empty() {
        return None;
    }

    let formats = ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d", "%Y.%m.%d"];
    for fmt in formats.iter() {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    Some(raw.to_string())
}

/// Keeps the head and tail of a secret for display.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}
