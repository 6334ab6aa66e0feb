//! Pure normalization primitives: description cleanup, sign
//! normalization, tolerant amount/date parsing, and the content hash that
//! makes deduplication deterministic across ingestion paths.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use thiserror::Error;

use tally_core::{AccountKind, Money, PeriodKey};

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
}

/// Lowercase, strip everything but letters/digits/space, collapse runs of
/// whitespace. Idempotent: normalizing twice equals normalizing once.
pub fn normalize_description(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Description and sub-description joined with a single space; whichever
/// side is non-empty stands alone when the other is empty.
pub fn composite_description(description: &str, sub_description: Option<&str>) -> String {
    let sub = sub_description.unwrap_or("").trim();
    let desc = description.trim();
    match (desc.is_empty(), sub.is_empty()) {
        (false, false) => format!("{desc} {sub}"),
        (false, true) => desc.to_string(),
        (true, false) => sub.to_string(),
        (true, true) => String::new(),
    }
}

/// Resolve an institution's debit/credit hint into the account-convention
/// sign: money out is negative on a bank statement and positive on a card
/// statement. Without a hint the raw sign passes through unchanged.
pub fn normalize_amount(raw: Money, kind: AccountKind, type_hint: Option<&str>) -> Money {
    let hint = type_hint.map(str::to_lowercase).unwrap_or_default();
    let magnitude = raw.abs();
    if hint.contains("debit") {
        // Money out.
        match kind {
            AccountKind::Bank => -magnitude,
            AccountKind::CreditCard => magnitude,
        }
    } else if hint.contains("credit") {
        // Money in.
        match kind {
            AccountKind::Bank => magnitude,
            AccountKind::CreditCard => -magnitude,
        }
    } else {
        raw
    }
}

/// Convert an account-convention amount to the ledger's expense sign
/// (positive = money leaving the user).
pub fn expense_amount(normalized: Money, kind: AccountKind) -> Money {
    match kind {
        AccountKind::Bank => -normalized,
        AccountKind::CreditCard => normalized,
    }
}

/// Content hash of one logical bank event. Identical inputs always produce
/// the identical key, however the row was re-derived.
pub fn hash_key(
    account_id: i64,
    period: PeriodKey,
    date: NaiveDate,
    amount_cents: i64,
    normalized_description: &str,
) -> String {
    let material = format!(
        "{account_id}|{period}|{}|{amount_cents}|{normalized_description}",
        date.format("%Y-%m-%d")
    );
    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    hex::encode(hasher.finalize())
}

/// Parse a currency string, tolerating `$`, thousands separators, and
/// accounting-style parentheses for negatives. Result is rounded
/// half-to-even at 2 decimal places.
pub fn parse_amount(s: &str) -> Result<Money, ParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ParseError::InvalidAmount(s.to_string()));
    }
    let (negative, s) = if s.starts_with('(') && s.ends_with(')') {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };
    let cleaned = s.replace([',', '$', ' '], "");
    let mut dec =
        Decimal::from_str(&cleaned).map_err(|_| ParseError::InvalidAmount(s.to_string()))?;
    if negative {
        dec = -dec;
    }
    Ok(Money::from_decimal(dec))
}

/// Parse a date string, trying ISO first and then the common US/EU
/// orderings banks actually export.
pub fn parse_date(s: &str) -> Result<NaiveDate, ParseError> {
    let s = s.trim();
    for fmt in &[
        "%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%m-%d-%Y", "%b %d, %Y", "%m/%d/%y",
    ] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }
    Err(ParseError::InvalidDate(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── normalize_description ────────────────────────────────────────────────

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(
            normalize_description("  NETFLIX.COM *Subscr  #123 "),
            "netflix com subscr 123"
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_description("E-TRANSFER to VISA ***1234");
        assert_eq!(normalize_description(&once), once);
    }

    #[test]
    fn normalize_empty_is_empty() {
        assert_eq!(normalize_description("  *** "), "");
    }

    // ── composite_description ────────────────────────────────────────────────

    #[test]
    fn composite_joins_with_single_space() {
        assert_eq!(composite_description("AMZN", Some("Mktp")), "AMZN Mktp");
    }

    #[test]
    fn composite_uses_nonempty_side() {
        assert_eq!(composite_description("AMZN", None), "AMZN");
        assert_eq!(composite_description("", Some("Mktp")), "Mktp");
        assert_eq!(composite_description("", None), "");
    }

    // ── normalize_amount / expense_amount ────────────────────────────────────

    #[test]
    fn debit_hint_is_money_out() {
        let raw = Money::from_cents(5000);
        assert_eq!(
            normalize_amount(raw, AccountKind::Bank, Some("DEBIT")).to_cents(),
            -5000
        );
        assert_eq!(
            normalize_amount(raw, AccountKind::CreditCard, Some("debit")).to_cents(),
            5000
        );
    }

    #[test]
    fn credit_hint_is_money_in() {
        // Institutions disagree on the raw sign; the hint wins either way.
        let raw = Money::from_cents(-5000);
        assert_eq!(
            normalize_amount(raw, AccountKind::Bank, Some("credit")).to_cents(),
            5000
        );
        assert_eq!(
            normalize_amount(raw, AccountKind::CreditCard, Some("Credit")).to_cents(),
            -5000
        );
    }

    #[test]
    fn no_hint_passes_sign_through() {
        let raw = Money::from_cents(-1234);
        assert_eq!(normalize_amount(raw, AccountKind::Bank, None), raw);
        assert_eq!(normalize_amount(raw, AccountKind::CreditCard, Some("purchase")), raw);
    }

    #[test]
    fn expense_sign_is_positive_for_money_out_on_both_kinds() {
        // Bank: $50 out is -50 on the statement.
        let bank = normalize_amount(Money::from_cents(50_00), AccountKind::Bank, Some("debit"));
        assert_eq!(expense_amount(bank, AccountKind::Bank).to_cents(), 50_00);
        // Card: $50 purchase is +50 on the statement.
        let card = normalize_amount(
            Money::from_cents(50_00),
            AccountKind::CreditCard,
            Some("debit"),
        );
        assert_eq!(expense_amount(card, AccountKind::CreditCard).to_cents(), 50_00);
    }

    // ── hash_key ─────────────────────────────────────────────────────────────

    #[test]
    fn hash_is_deterministic() {
        let period = PeriodKey::new(2024, 1).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let a = hash_key(1, period, date, -5000, "e transfer to visa 1234");
        let b = hash_key(1, period, date, -5000, "e transfer to visa 1234");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_differs_on_every_field() {
        let period = PeriodKey::new(2024, 1).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let base = hash_key(1, period, date, -5000, "desc");
        assert_ne!(base, hash_key(2, period, date, -5000, "desc"));
        assert_ne!(
            base,
            hash_key(1, PeriodKey::new(2024, 2).unwrap(), date, -5000, "desc")
        );
        assert_ne!(
            base,
            hash_key(1, period, date.succ_opt().unwrap(), -5000, "desc")
        );
        assert_ne!(base, hash_key(1, period, date, -5001, "desc"));
        assert_ne!(base, hash_key(1, period, date, -5000, "other"));
    }

    // ── parse_amount ─────────────────────────────────────────────────────────

    #[test]
    fn parse_amount_plain() {
        assert_eq!(parse_amount("123.45").unwrap().to_cents(), 12345);
    }

    #[test]
    fn parse_amount_currency_and_thousands() {
        assert_eq!(parse_amount("$1,234.56").unwrap().to_cents(), 123456);
    }

    #[test]
    fn parse_amount_accounting_parens() {
        assert_eq!(parse_amount("(75.25)").unwrap().to_cents(), -7525);
        assert_eq!(parse_amount("($1,000.00)").unwrap().to_cents(), -100000);
    }

    #[test]
    fn parse_amount_rounds_half_even() {
        assert_eq!(parse_amount("1.005").unwrap().to_cents(), 100);
        assert_eq!(parse_amount("2.675").unwrap().to_cents(), 268);
    }

    #[test]
    fn parse_amount_invalid() {
        assert!(parse_amount("").is_err());
        assert!(parse_amount("n/a").is_err());
    }

    // ── parse_date ───────────────────────────────────────────────────────────

    #[test]
    fn parse_date_common_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_date("2024-01-15").unwrap(), expected);
        assert_eq!(parse_date("01/15/2024").unwrap(), expected);
        assert_eq!(parse_date("Jan 15, 2024").unwrap(), expected);
    }

    #[test]
    fn parse_date_invalid() {
        assert!(parse_date("yesterday").is_err());
    }
}
