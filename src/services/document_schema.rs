use jsonschema::JSONSchema;
use serde_json::{json, Value};

use crate::error::{GedError, Result};
use crate::models::{CommercialDocument, DocumentData};

fn document_schema() -> Result<JSONSchema> {
    let amount = json!({"type": ["number", "null"]});
    let schema = json!({
        "type": "object",
        "required": ["type_document", "lignes"],
        "properties": {
            "type_document": {"enum": ["FACTURE", "BON_LIVRAISON", "BON_COMMANDE", "AVOIR", "ACOMPTE"]},
            "nature_document": {"enum": ["VENTE", "ACHAT"]},
            "numero_document": {"type": "string"},
            "date_document": {"type": "string"},
            "devise": {"type": "string"},
            "vendeur": {"type": "object"},
            "client": {
                "type": "object",
                "properties": {
                    "regime_fiscal": {
                        "type": ["object", "null"],
                        "properties": {"exonere_tva": {"type": "boolean"}}
                    }
                }
            },
            "lignes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "quantite": amount,
                        "prix_unitaire_ht": amount,
                        "tva": {
                            "type": "object",
                            "properties": {
                                "taux": amount,
                                "appliquee": {"type": "boolean"}
                            }
                        }
                    }
                }
            },
            "totaux": {
                "type": "object",
                "properties": {"timbre_fiscal": amount}
            }
        }
    });

    JSONSchema::compile(&schema).map_err(|e| GedError::Internal(format!("document schema: {}", e)))
}

/// Parses a document file, accepting either the bare document or the
/// stored `{"document": ...}` envelope.
pub fn parse_document(raw: &str) -> Result<CommercialDocument> {
    let value: Value = serde_json::from_str(raw).map_err(|e| GedError::Validation(e.to_string()))?;
    let document = match value {
        Value::Object(mut map) if map.contains_key("document") && !map.contains_key("type_document") => {
            map.remove("document").unwrap_or(Value::Null)
        }
        other => other,
    };

    let schema = document_schema()?;
    let problems: Vec<String> = match schema.validate(&document) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect(),
    };
    if !problems.is_empty() {
        return Err(GedError::Validation(problems.join("; ")));
    }

    let data: DocumentData = serde_json::from_value(json!({ "document": document }))
        .map_err(|e| GedError::Validation(e.to_string()))?;
    Ok(data.document)
}
