//! Commercial document record. Field names follow the stored `document_data` JSON.

use chrono::Local;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Stored rows may carry `null` for a cleared amount; it reads as zero.
fn amount_or_zero<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Decimal>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "FACTURE")]
    Invoice,
    #[serde(rename = "BON_LIVRAISON")]
    DeliveryNote,
    #[serde(rename = "BON_COMMANDE")]
    PurchaseOrder,
    #[serde(rename = "AVOIR")]
    CreditNote,
    #[serde(rename = "ACOMPTE")]
    Deposit,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::Invoice,
        DocumentType::DeliveryNote,
        DocumentType::PurchaseOrder,
        DocumentType::CreditNote,
        DocumentType::Deposit,
    ];

    /// Code used in storage keys.
    pub fn code(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "FACTURE",
            DocumentType::DeliveryNote => "BON_LIVRAISON",
            DocumentType::PurchaseOrder => "BON_COMMANDE",
            DocumentType::CreditNote => "AVOIR",
            DocumentType::Deposit => "ACOMPTE",
        }
    }

    /// Short label used in list views.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "Facture",
            DocumentType::DeliveryNote => "Bon Livr.",
            DocumentType::PurchaseOrder => "Bon Cmd.",
            DocumentType::CreditNote => "Avoir",
            DocumentType::Deposit => "Acompte",
        }
    }
}

impl Default for DocumentType {
    fn default() -> Self {
        DocumentType::Invoice
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentNature {
    #[serde(rename = "VENTE")]
    Sale,
    #[serde(rename = "ACHAT")]
    Purchase,
}

impl DocumentNature {
    /// Whether the seller is the user's own company.
    pub fn seller_is_us(&self) -> bool {
        matches!(self, DocumentNature::Sale)
    }
}

impl Default for DocumentNature {
    fn default() -> Self {
        DocumentNature::Sale
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename = "ligne_1", default)]
    pub line_1: String,
    #[serde(rename = "ligne_2", default, skip_serializing_if = "Option::is_none")]
    pub line_2: Option<String>,
    #[serde(rename = "ville", default)]
    pub city: String,
    #[serde(rename = "code_postal", default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(rename = "pays", default)]
    pub country: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(rename = "telephone", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "site_web", default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BankDetails {
    #[serde(rename = "nom_banque", default, skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rib: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iban: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swift: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Seller {
    #[serde(rename = "raison_sociale", default)]
    pub legal_name: String,
    #[serde(rename = "forme_juridique", default, skip_serializing_if = "Option::is_none")]
    pub legal_form: Option<String>,
    #[serde(rename = "capital_social", default, skip_serializing_if = "Option::is_none")]
    pub share_capital: Option<Decimal>,
    #[serde(rename = "matricule_fiscal", default)]
    pub tax_id: String,
    #[serde(rename = "registre_commerce", default, skip_serializing_if = "Option::is_none")]
    pub trade_register: Option<String>,
    #[serde(rename = "adresse", default)]
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    #[serde(rename = "banque", default, skip_serializing_if = "Option::is_none")]
    pub bank: Option<BankDetails>,
    #[serde(rename = "CIN", default, skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passport: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxRegime {
    #[serde(rename = "exonere_tva", default)]
    pub exempt: bool,
    #[serde(rename = "suspension_tva", default)]
    pub suspended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<bool>,
    #[serde(rename = "reference_attestation", default, skip_serializing_if = "Option::is_none")]
    pub certificate_reference: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Buyer {
    #[serde(rename = "raison_sociale", default)]
    pub legal_name: String,
    #[serde(rename = "matricule_fiscal", default)]
    pub tax_id: String,
    #[serde(rename = "adresse", default)]
    pub address: Address,
    #[serde(rename = "regime_fiscal", default, skip_serializing_if = "Option::is_none")]
    pub tax_regime: Option<TaxRegime>,
}

impl Buyer {
    pub fn is_tax_exempt(&self) -> bool {
        self.tax_regime.as_ref().map(|r| r.exempt).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub designation: String,
    #[serde(rename = "description_longue", default, skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
    #[serde(rename = "unite", default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(rename = "article_serialise", default)]
    pub serialized: bool,
    #[serde(rename = "numeros_serie", default, skip_serializing_if = "Option::is_none")]
    pub serial_numbers: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineTax {
    #[serde(rename = "taux", default, deserialize_with = "amount_or_zero")]
    pub rate: Decimal,
    #[serde(rename = "montant", default, deserialize_with = "amount_or_zero")]
    pub amount: Decimal,
    #[serde(rename = "appliquee", default)]
    pub applies: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentLine {
    #[serde(rename = "ligne_id", default)]
    pub line_id: u32,
    #[serde(default)]
    pub article: Article,
    #[serde(rename = "quantite", default, deserialize_with = "amount_or_zero")]
    pub quantity: Decimal,
    #[serde(rename = "prix_unitaire_ht", default, deserialize_with = "amount_or_zero")]
    pub unit_price: Decimal,
    #[serde(rename = "montant_brut_ht", default, deserialize_with = "amount_or_zero")]
    pub gross_amount: Decimal,
    #[serde(rename = "montant_net_ht", default, deserialize_with = "amount_or_zero")]
    pub net_amount: Decimal,
    #[serde(rename = "base_tva", default, skip_serializing_if = "Option::is_none")]
    pub tax_base: Option<Decimal>,
    #[serde(rename = "tva", default)]
    pub tax: LineTax,
    #[serde(rename = "total_ttc_ligne", default, deserialize_with = "amount_or_zero")]
    pub total_with_tax: Decimal,
}

impl DocumentLine {
    /// A fresh line as the entry form adds it: one unit, 19% tax applied.
    pub fn blank(line_id: u32) -> Self {
        DocumentLine {
            line_id,
            article: Article {
                unit: Some("U".to_string()),
                serial_numbers: Some(Vec::new()),
                ..Article::default()
            },
            quantity: Decimal::ONE,
            tax: LineTax {
                rate: Decimal::from(19),
                amount: Decimal::ZERO,
                applies: true,
            },
            ..DocumentLine::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    #[serde(rename = "total_brut_ht", default, deserialize_with = "amount_or_zero")]
    pub total_gross: Decimal,
    #[serde(rename = "total_net_ht", default, deserialize_with = "amount_or_zero")]
    pub total_net: Decimal,
    #[serde(rename = "total_tva", default, deserialize_with = "amount_or_zero")]
    pub total_tax: Decimal,
    #[serde(rename = "timbre_fiscal", default, deserialize_with = "amount_or_zero")]
    pub stamp_duty: Decimal,
    #[serde(rename = "total_ttc_net_a_payer", default, deserialize_with = "amount_or_zero")]
    pub grand_total: Decimal,
    #[serde(rename = "montant_en_lettres", default)]
    pub amount_in_words: String,
    #[serde(rename = "total_remise", default, skip_serializing_if = "Option::is_none")]
    pub total_discount: Option<Decimal>,
    #[serde(rename = "total_droit_consommation", default, skip_serializing_if = "Option::is_none")]
    pub total_excise: Option<Decimal>,
    #[serde(rename = "total_fodec", default, skip_serializing_if = "Option::is_none")]
    pub total_fodec: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegalMentions {
    #[serde(rename = "conditions_paiement", default, skip_serializing_if = "Option::is_none")]
    pub payment_terms: Option<String>,
    #[serde(rename = "tva_detaillee", default, skip_serializing_if = "Option::is_none")]
    pub tax_breakdown: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommercialDocument {
    #[serde(rename = "type_document", default)]
    pub doc_type: DocumentType,
    #[serde(rename = "nature_document", default)]
    pub nature: DocumentNature,
    #[serde(rename = "numero_document", default)]
    pub number: String,
    #[serde(rename = "date_document", default)]
    pub date: String,
    #[serde(rename = "devise", default)]
    pub currency: String,
    #[serde(rename = "vendeur", default)]
    pub seller: Seller,
    #[serde(rename = "client", default)]
    pub buyer: Buyer,
    #[serde(rename = "lignes", default)]
    pub lines: Vec<DocumentLine>,
    #[serde(rename = "totaux", default)]
    pub totals: Totals,
    #[serde(rename = "mentions_legales", default, skip_serializing_if = "Option::is_none")]
    pub legal_mentions: Option<LegalMentions>,
}

impl Default for CommercialDocument {
    fn default() -> Self {
        CommercialDocument {
            doc_type: DocumentType::Invoice,
            nature: DocumentNature::Sale,
            number: String::new(),
            date: Local::now().format("%Y-%m-%d").to_string(),
            currency: "TND".to_string(),
            seller: Seller {
                legal_form: Some("SARL".to_string()),
                share_capital: Some(Decimal::ZERO),
                trade_register: Some(String::new()),
                address: Address {
                    country: "Tunisie".to_string(),
                    postal_code: Some(String::new()),
                    ..Address::default()
                },
                contact: Some(Contact::default()),
                bank: Some(BankDetails::default()),
                ..Seller::default()
            },
            buyer: Buyer {
                address: Address {
                    country: "Tunisie".to_string(),
                    ..Address::default()
                },
                tax_regime: Some(TaxRegime::default()),
                ..Buyer::default()
            },
            lines: vec![DocumentLine::blank(1)],
            totals: Totals {
                stamp_duty: Decimal::new(1000, 3),
                ..Totals::default()
            },
            legal_mentions: None,
        }
    }
}

/// The `document_data` column wraps the document in a `document` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentData {
    pub document: CommercialDocument,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_numbers_default_to_zero() {
        let line: DocumentLine = serde_json::from_value(json!({
            "article": { "designation": "Widget" },
            "tva": { "appliquee": true }
        }))
        .unwrap();
        assert_eq!(line.quantity, Decimal::ZERO);
        assert_eq!(line.unit_price, Decimal::ZERO);
        assert_eq!(line.tax.rate, Decimal::ZERO);
        assert!(line.tax.applies);
    }

    #[test]
    fn null_amounts_in_stored_rows_read_as_zero() {
        let row = json!({
            "id": "d1",
            "created_at": "2024-03-05T10:00:00.000000Z",
            "user_id": "u1",
            "file_url": "u1/1_FACTURE.pdf",
            "status": "Brouillon",
            "document_data": { "document": {
                "type_document": "FACTURE",
                "lignes": [{
                    "quantite": null,
                    "prix_unitaire_ht": null,
                    "montant_net_ht": null,
                    "tva": { "taux": null, "montant": null, "appliquee": true },
                    "total_ttc_ligne": null
                }],
                "totaux": { "timbre_fiscal": null, "total_ttc_net_a_payer": null, "total_fodec": null }
            }}
        });
        let rows: Vec<crate::models::StoredDocument> = serde_json::from_value(json!([row])).unwrap();
        let doc = &rows[0].document_data.document;
        assert_eq!(doc.lines[0].quantity, Decimal::ZERO);
        assert_eq!(doc.lines[0].unit_price, Decimal::ZERO);
        assert_eq!(doc.lines[0].tax.rate, Decimal::ZERO);
        assert_eq!(doc.totals.stamp_duty, Decimal::ZERO);
        assert_eq!(doc.totals.grand_total, Decimal::ZERO);
        assert_eq!(doc.totals.total_fodec, None);
    }

    #[test]
    fn wire_names_match_stored_rows() {
        let doc = CommercialDocument::default();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["type_document"], "FACTURE");
        assert_eq!(value["nature_document"], "VENTE");
        assert_eq!(value["devise"], "TND");
        assert_eq!(value["client"]["regime_fiscal"]["exonere_tva"], false);
        assert_eq!(value["lignes"][0]["tva"]["taux"], 19.0);
        assert_eq!(value["totaux"]["timbre_fiscal"], 1.0);
    }

    #[test]
    fn integer_and_float_amounts_both_parse() {
        let tax: LineTax = serde_json::from_value(json!({ "taux": 19, "montant": 38.5, "appliquee": true })).unwrap();
        assert_eq!(tax.rate, Decimal::from(19));
        assert_eq!(tax.amount, Decimal::new(385, 1));
    }

    #[test]
    fn buyer_without_regime_is_not_exempt() {
        let buyer = Buyer::default();
        assert!(!buyer.is_tax_exempt());
    }
}
