use rust_decimal::Decimal;

use gedpro::models::DocumentType;
use gedpro::services::document_schema::parse_document;
use gedpro::services::form::DocumentForm;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn priced_form() -> DocumentForm {
    let mut form = DocumentForm::new();
    form.set_type(DocumentType::Invoice);
    form.edit_line(0, |line| {
        line.quantity = dec("2");
        line.unit_price = dec("100");
    })
    .unwrap();
    form
}

#[test]
fn form_edits_keep_totals_in_sync() {
    let mut form = priced_form();
    assert_eq!(form.document().totals.grand_total, dec("239"));

    let idx = form.add_line();
    form.edit_line(idx, |line| {
        line.quantity = dec("1");
        line.unit_price = dec("50");
        line.tax.applies = false;
    })
    .unwrap();
    let totals = &form.document().totals;
    assert_eq!(totals.total_net, dec("250"));
    assert_eq!(totals.total_tax, dec("38"));
    assert_eq!(totals.grand_total, dec("289"));

    assert!(form.remove_line(idx));
    assert_eq!(form.document().totals.grand_total, dec("239"));
}

#[test]
fn exemption_toggle_drops_and_restores_tax() {
    let mut form = priced_form();
    form.edit_tax_regime(|regime| regime.exempt = true);
    assert_eq!(form.document().totals.total_tax, Decimal::ZERO);
    assert_eq!(form.document().lines[0].tax.amount, Decimal::ZERO);
    assert_eq!(form.document().totals.grand_total, dec("201"));

    form.edit_tax_regime(|regime| regime.exempt = false);
    assert_eq!(form.document().totals.grand_total, dec("239"));
}

#[test]
fn stamp_duty_change_moves_grand_total_only() {
    let mut form = priced_form();
    form.set_stamp_duty(dec("0.600"));
    let totals = &form.document().totals;
    assert_eq!(totals.total_net, dec("200"));
    assert_eq!(totals.grand_total, dec("238.6"));
}

#[test]
fn stored_amounts_are_ignored_when_loading() {
    let raw = r#"{
        "type_document": "FACTURE",
        "lignes": [{"quantite": 3, "prix_unitaire_ht": 0.335, "montant_net_ht": 999,
                    "tva": {"taux": 19, "montant": 999, "appliquee": true}}],
        "totaux": {"timbre_fiscal": 1, "total_ttc_net_a_payer": 999, "montant_en_lettres": "mille"}
    }"#;
    let form = DocumentForm::from_document(parse_document(raw).unwrap());
    let doc = form.document();
    assert_eq!(doc.lines[0].net_amount, dec("1.005"));
    assert_eq!(doc.lines[0].tax.amount, dec("0.191"));
    let totals = &doc.totals;
    assert_eq!(totals.grand_total, totals.total_net + totals.total_tax + totals.stamp_duty);
    assert_eq!(totals.amount_in_words, "mille");
}
