//! Derivation of line amounts and document totals.
//!
//! Amounts are rounded half away from zero to three decimals. Document sums
//! run over unrounded line values; the grand total is built from the rounded
//! net and tax totals so that it always equals their sum plus stamp duty.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{CommercialDocument, DocumentLine, Totals};

pub const AMOUNT_SCALE: u32 = 3;

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

pub fn round_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub gross: Decimal,
    pub net: Decimal,
    pub tax: Decimal,
    pub total_with_tax: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentAmounts {
    pub total_gross: Decimal,
    pub total_net: Decimal,
    pub total_tax: Decimal,
    pub stamp_duty: Decimal,
    pub grand_total: Decimal,
}

/// Unrounded amounts for one line.
fn raw_line_amounts(line: &DocumentLine, buyer_exempt: bool) -> LineAmounts {
    let gross = line.quantity.saturating_mul(line.unit_price);
    // no discount model: net is gross
    let net = gross;
    let tax = if line.tax.applies && !buyer_exempt {
        net.saturating_mul(line.tax.rate / ONE_HUNDRED)
    } else {
        Decimal::ZERO
    };
    LineAmounts {
        gross,
        net,
        tax,
        total_with_tax: net.saturating_add(tax),
    }
}

pub fn line_amounts(line: &DocumentLine, buyer_exempt: bool) -> LineAmounts {
    let raw = raw_line_amounts(line, buyer_exempt);
    LineAmounts {
        gross: round_amount(raw.gross),
        net: round_amount(raw.net),
        tax: round_amount(raw.tax),
        total_with_tax: round_amount(raw.total_with_tax),
    }
}

pub fn document_amounts(lines: &[DocumentLine], stamp_duty: Decimal, buyer_exempt: bool) -> DocumentAmounts {
    let (net_sum, tax_sum) = lines
        .iter()
        .map(|line| raw_line_amounts(line, buyer_exempt))
        .fold((Decimal::ZERO, Decimal::ZERO), |(net, tax), amounts| {
            (net.saturating_add(amounts.net), tax.saturating_add(amounts.tax))
        });

    let total_net = round_amount(net_sum);
    let total_tax = round_amount(tax_sum);
    let stamp_duty = round_amount(stamp_duty);
    let grand_total = total_net.saturating_add(total_tax).saturating_add(stamp_duty);

    DocumentAmounts {
        total_gross: total_net,
        total_net,
        total_tax,
        stamp_duty,
        grand_total,
    }
}

/// Rewrites every derived amount of `doc` in place.
///
/// Inputs are the lines, the stamp duty and the buyer's exemption flag.
/// The stamp duty is stored rounded. `amount_in_words` and the optional
/// surcharge totals are left untouched.
pub fn recompute(doc: &mut CommercialDocument) {
    let exempt = doc.buyer.is_tax_exempt();

    for line in doc.lines.iter_mut() {
        let amounts = line_amounts(line, exempt);
        line.gross_amount = amounts.gross;
        line.net_amount = amounts.net;
        line.tax.amount = amounts.tax;
        line.total_with_tax = amounts.total_with_tax;
    }

    let amounts = document_amounts(&doc.lines, doc.totals.stamp_duty, exempt);
    apply(&mut doc.totals, &amounts);
}

fn apply(totals: &mut Totals, amounts: &DocumentAmounts) {
    totals.total_gross = amounts.total_gross;
    totals.total_net = amounts.total_net;
    totals.total_tax = amounts.total_tax;
    totals.stamp_duty = amounts.stamp_duty;
    totals.grand_total = amounts.grand_total;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LineTax, TaxRegime};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn line(quantity: &str, price: &str, rate: &str, applies: bool) -> DocumentLine {
        DocumentLine {
            quantity: dec(quantity),
            unit_price: dec(price),
            tax: LineTax {
                rate: dec(rate),
                amount: Decimal::ZERO,
                applies,
            },
            ..DocumentLine::blank(1)
        }
    }

    fn document(lines: Vec<DocumentLine>, stamp: &str, exempt: bool) -> CommercialDocument {
        let mut doc = CommercialDocument::default();
        doc.lines = lines;
        doc.totals.stamp_duty = dec(stamp);
        doc.buyer.tax_regime = Some(TaxRegime {
            exempt,
            ..TaxRegime::default()
        });
        doc
    }

    #[test]
    fn single_taxed_line() {
        let mut doc = document(vec![line("2", "100.000", "19", true)], "1.000", false);
        recompute(&mut doc);

        let l = &doc.lines[0];
        assert_eq!(l.gross_amount, dec("200"));
        assert_eq!(l.net_amount, dec("200"));
        assert_eq!(l.tax.amount, dec("38"));
        assert_eq!(l.total_with_tax, dec("238"));
        assert_eq!(doc.totals.total_net, dec("200"));
        assert_eq!(doc.totals.total_gross, dec("200"));
        assert_eq!(doc.totals.total_tax, dec("38"));
        assert_eq!(doc.totals.grand_total, dec("239"));
    }

    #[test]
    fn exempt_buyer_pays_no_tax() {
        let mut doc = document(vec![line("2", "100", "19", true)], "1", true);
        recompute(&mut doc);

        assert_eq!(doc.lines[0].tax.amount, Decimal::ZERO);
        assert_eq!(doc.totals.total_tax, Decimal::ZERO);
        assert_eq!(doc.totals.grand_total, dec("201"));
    }

    #[test]
    fn untaxed_line_contributes_net_only() {
        let mut doc = document(
            vec![line("2", "100", "19", true), line("1", "50", "0", false)],
            "1",
            false,
        );
        recompute(&mut doc);

        assert_eq!(doc.lines[1].tax.amount, Decimal::ZERO);
        assert_eq!(doc.totals.total_net, dec("250"));
        assert_eq!(doc.totals.total_tax, dec("38"));
        assert_eq!(doc.totals.grand_total, dec("289"));
    }

    #[test]
    fn tax_flag_off_ignores_rate() {
        let amounts = line_amounts(&line("3", "10", "19", false), false);
        assert_eq!(amounts.tax, Decimal::ZERO);
        assert_eq!(amounts.total_with_tax, dec("30"));
    }

    #[test]
    fn no_lines_leaves_only_stamp_duty() {
        let mut doc = document(Vec::new(), "1.000", false);
        recompute(&mut doc);

        assert_eq!(doc.totals.total_gross, Decimal::ZERO);
        assert_eq!(doc.totals.total_net, Decimal::ZERO);
        assert_eq!(doc.totals.total_tax, Decimal::ZERO);
        assert_eq!(doc.totals.grand_total, dec("1"));
    }

    #[test]
    fn rounds_to_three_decimals_half_away_from_zero() {
        assert_eq!(round_amount(dec("1.0005")), dec("1.001"));
        assert_eq!(round_amount(dec("-1.0005")), dec("-1.001"));
        assert_eq!(round_amount(dec("1.00049")), dec("1.000"));

        // 0.333 * 7% = 0.02331
        let amounts = line_amounts(&line("1", "0.333", "7", true), false);
        assert_eq!(amounts.tax, dec("0.023"));
        assert_eq!(amounts.total_with_tax, dec("0.356"));
    }

    #[test]
    fn grand_total_is_exact_sum_of_rounded_parts() {
        // each line tax is 0.0004, the sum 0.0012 rounds to 0.001
        let lines: Vec<_> = (0..3).map(|_| line("1", "0.004", "10", true)).collect();
        let amounts = document_amounts(&lines, dec("0.6"), false);

        assert_eq!(amounts.total_tax, dec("0.001"));
        assert_eq!(amounts.total_net, dec("0.012"));
        assert_eq!(
            amounts.grand_total,
            amounts.total_net + amounts.total_tax + amounts.stamp_duty
        );
    }

    #[test]
    fn negative_values_are_not_rejected() {
        let amounts = line_amounts(&line("-1", "10", "19", true), false);
        assert_eq!(amounts.net, dec("-10"));
        assert_eq!(amounts.tax, dec("-1.9"));
    }

    #[test]
    fn recompute_is_idempotent_and_keeps_words() {
        let mut doc = document(vec![line("2", "12.345", "19", true)], "1", false);
        doc.totals.amount_in_words = "Vingt-neuf dinars".to_string();
        recompute(&mut doc);
        let once = doc.clone();
        recompute(&mut doc);

        assert_eq!(doc, once);
        assert_eq!(doc.totals.amount_in_words, "Vingt-neuf dinars");
    }

    #[test]
    fn huge_values_saturate() {
        let amounts = line_amounts(&line("79000000000000000000000000000", "10", "19", true), false);
        assert_eq!(amounts.gross, Decimal::MAX);
    }
}
