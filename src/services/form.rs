use rust_decimal::Decimal;
use std::path::{Path, PathBuf};

use crate::error::{GedError, Result};
use crate::models::{
    Buyer, CommercialDocument, DocumentLine, DocumentNature, DocumentType, Seller, TaxRegime,
};
use crate::services::totals;
use crate::utils::file_extension;

pub const ACCEPTED_EXTENSIONS: [&str; 4] = ["pdf", "jpg", "jpeg", "png"];

/// In-memory document being entered. Totals are kept in sync on every
/// edit that can move them.
#[derive(Debug, Clone)]
pub struct DocumentForm {
    document: CommercialDocument,
    file: Option<PathBuf>,
}

impl Default for DocumentForm {
    fn default() -> Self {
        Self::from_document(CommercialDocument::default())
    }
}

impl DocumentForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts an existing document; stored derived amounts are discarded.
    pub fn from_document(mut document: CommercialDocument) -> Self {
        totals::recompute(&mut document);
        DocumentForm { document, file: None }
    }

    pub fn document(&self) -> &CommercialDocument {
        &self.document
    }

    pub fn into_document(self) -> CommercialDocument {
        self.document
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn attach_file(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let accepted = file_extension(&path.to_string_lossy())
            .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !accepted {
            return Err(GedError::Validation(format!(
                "unsupported file type: {} (expected one of {})",
                path.display(),
                ACCEPTED_EXTENSIONS.join(", ")
            )));
        }
        self.file = Some(path);
        Ok(())
    }

    pub fn set_type(&mut self, doc_type: DocumentType) {
        self.document.doc_type = doc_type;
    }

    pub fn set_nature(&mut self, nature: DocumentNature) {
        self.document.nature = nature;
    }

    pub fn set_number(&mut self, number: impl Into<String>) {
        self.document.number = number.into();
    }

    pub fn set_date(&mut self, date: impl Into<String>) {
        self.document.date = date.into();
    }

    pub fn set_currency(&mut self, currency: impl Into<String>) {
        self.document.currency = currency.into();
    }

    pub fn edit_seller(&mut self, edit: impl FnOnce(&mut Seller)) {
        edit(&mut self.document.seller);
    }

    /// Buyer edits may flip the exemption flag, so totals follow.
    pub fn edit_buyer(&mut self, edit: impl FnOnce(&mut Buyer)) {
        edit(&mut self.document.buyer);
        self.recompute();
    }

    pub fn edit_tax_regime(&mut self, edit: impl FnOnce(&mut TaxRegime)) {
        edit(self.document.buyer.tax_regime.get_or_insert_with(TaxRegime::default));
        self.recompute();
    }

    pub fn edit_line(&mut self, index: usize, edit: impl FnOnce(&mut DocumentLine)) -> Result<()> {
        let line = self
            .document
            .lines
            .get_mut(index)
            .ok_or_else(|| GedError::Validation(format!("no line at position {}", index + 1)))?;
        edit(line);
        self.recompute();
        Ok(())
    }

    pub fn add_line(&mut self) -> usize {
        let id = self.document.lines.len() as u32 + 1;
        self.document.lines.push(DocumentLine::blank(id));
        self.recompute();
        self.document.lines.len() - 1
    }

    /// The last remaining line is kept; returns whether a line was removed.
    pub fn remove_line(&mut self, index: usize) -> bool {
        if self.document.lines.len() <= 1 || index >= self.document.lines.len() {
            return false;
        }
        self.document.lines.remove(index);
        self.recompute();
        true
    }

    pub fn set_stamp_duty(&mut self, stamp_duty: Decimal) {
        self.document.totals.stamp_duty = stamp_duty;
        self.recompute();
    }

    pub fn set_amount_in_words(&mut self, words: impl Into<String>) {
        self.document.totals.amount_in_words = words.into();
    }

    fn recompute(&mut self) {
        totals::recompute(&mut self.document);
    }

    /// Required-field check run before submission.
    pub fn validate(&self) -> Result<()> {
        let doc = &self.document;
        let mut missing = Vec::new();

        if self.file.is_none() {
            missing.push("file".to_string());
        }
        if doc.number.trim().is_empty() {
            missing.push("document number".to_string());
        }
        if doc.date.trim().is_empty() {
            missing.push("document date".to_string());
        }
        if doc.seller.legal_name.trim().is_empty() {
            missing.push("seller legal name".to_string());
        }
        if doc.seller.tax_id.trim().is_empty() {
            missing.push("seller tax id".to_string());
        }
        if doc.buyer.legal_name.trim().is_empty() {
            missing.push("buyer legal name".to_string());
        }
        if doc.buyer.tax_id.trim().is_empty() {
            missing.push("buyer tax id".to_string());
        }
        for (idx, line) in doc.lines.iter().enumerate() {
            if line.article.designation.trim().is_empty() {
                missing.push(format!("designation of line {}", idx + 1));
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(GedError::Validation(format!("missing {}", missing.join(", "))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn filled_form() -> DocumentForm {
        let mut form = DocumentForm::new();
        form.set_number("F-2024-001");
        form.edit_seller(|s| {
            s.legal_name = "Atlas SARL".to_string();
            s.tax_id = "1234567A".to_string();
        });
        form.edit_buyer(|b| {
            b.legal_name = "Client SA".to_string();
            b.tax_id = "7654321B".to_string();
        });
        form.edit_line(0, |l| {
            l.article.designation = "Consulting".to_string();
            l.quantity = dec("2");
            l.unit_price = dec("100");
        })
        .unwrap();
        form
    }

    #[test]
    fn defaults_match_entry_screen() {
        let form = DocumentForm::new();
        let doc = form.document();
        assert_eq!(doc.doc_type, DocumentType::Invoice);
        assert_eq!(doc.nature, DocumentNature::Sale);
        assert_eq!(doc.currency, "TND");
        assert_eq!(doc.lines.len(), 1);
        assert_eq!(doc.lines[0].quantity, Decimal::ONE);
        assert_eq!(doc.totals.stamp_duty, dec("1"));
        assert_eq!(doc.totals.grand_total, dec("1"));
    }

    #[test]
    fn line_edit_recomputes_totals() {
        let form = filled_form();
        assert_eq!(form.document().totals.total_tax, dec("38"));
        assert_eq!(form.document().totals.grand_total, dec("239"));
    }

    #[test]
    fn exemption_toggle_recomputes_totals() {
        let mut form = filled_form();
        form.edit_tax_regime(|r| r.exempt = true);
        assert_eq!(form.document().totals.total_tax, Decimal::ZERO);
        assert_eq!(form.document().totals.grand_total, dec("201"));

        form.edit_tax_regime(|r| r.exempt = false);
        assert_eq!(form.document().totals.grand_total, dec("239"));
    }

    #[test]
    fn stamp_duty_change_recomputes_and_words_survive() {
        let mut form = filled_form();
        form.set_amount_in_words("deux cent quarante");
        form.set_stamp_duty(dec("0.600"));
        assert_eq!(form.document().totals.grand_total, dec("238.6"));
        assert_eq!(form.document().totals.amount_in_words, "deux cent quarante");
    }

    #[test]
    fn last_line_cannot_be_removed() {
        let mut form = DocumentForm::new();
        assert!(!form.remove_line(0));

        let idx = form.add_line();
        assert_eq!(idx, 1);
        assert_eq!(form.document().lines[1].line_id, 2);
        assert!(form.remove_line(0));
        assert_eq!(form.document().lines.len(), 1);
        assert_eq!(form.document().lines[0].line_id, 2);
    }

    #[test]
    fn editing_missing_line_is_a_validation_error() {
        let mut form = DocumentForm::new();
        let err = form.edit_line(5, |l| l.quantity = Decimal::TEN).unwrap_err();
        assert!(matches!(err, GedError::Validation(_)));
    }

    #[test]
    fn validation_lists_missing_fields() {
        let form = DocumentForm::new();
        let message = form.validate().unwrap_err().to_string();
        assert!(message.contains("file"));
        assert!(message.contains("document number"));
        assert!(message.contains("seller legal name"));
        assert!(message.contains("designation of line 1"));
    }

    #[test]
    fn complete_form_validates() {
        let mut form = filled_form();
        form.attach_file("scan.PDF").unwrap();
        assert!(form.validate().is_ok());
    }

    #[test]
    fn rejects_unsupported_files() {
        let mut form = DocumentForm::new();
        assert!(form.attach_file("notes.docx").is_err());
        assert!(form.attach_file("noextension").is_err());
        assert!(form.attach_file("photo.jpeg").is_ok());
    }

    #[test]
    fn adopting_a_document_discards_stale_totals() {
        let mut doc = CommercialDocument::default();
        doc.lines[0].unit_price = dec("50");
        doc.totals.grand_total = dec("999");
        let form = DocumentForm::from_document(doc);
        assert_eq!(form.document().totals.grand_total, dec("60.5"));
    }
}
