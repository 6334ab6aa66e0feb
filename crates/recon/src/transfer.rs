//! Internal-transfer detection: credit-card payments and inter-account
//! moves must not become ledger expenses. Rows classified here stay
//! auditable as raw rows but are suppressed from the ledger.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use tally_core::{Account, AccountId, AccountKind, Money};

use crate::normalize::normalize_description;

/// Substrings (of the normalized description) that mark a row as a likely
/// transfer. Normalization has already folded "E-TRANSFER" to
/// "e transfer".
pub const TRANSFER_KEYWORDS: &[&str] = &[
    "transfer",
    "xfer",
    "e transfer",
    "etransfer",
    "etfr",
    "payment",
    "pymt",
    "autopay",
    "bill pay",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferReason {
    CreditCardPayment,
    InterAccountTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferClassification {
    pub reason: TransferReason,
    /// The row paired on the other side, when pairing (not the unpaired
    /// heuristic) produced this classification.
    pub paired_with: Option<usize>,
}

/// One candidate row. `amount` carries the account-convention sign:
/// payments show negative on both the bank side and the card side.
#[derive(Debug, Clone)]
pub struct TransferInput {
    pub row_id: usize,
    pub account_id: AccountId,
    pub kind: AccountKind,
    pub date: NaiveDate,
    pub amount: Money,
    pub normalized_description: String,
}

fn has_transfer_keyword(normalized: &str) -> bool {
    TRANSFER_KEYWORDS.iter().any(|k| normalized.contains(k))
}

fn amounts_match(a: Money, b: Money) -> bool {
    a.abs().diff(b.abs()) <= Money::from_cents(1)
}

fn day_diff(a: NaiveDate, b: NaiveDate) -> i64 {
    (a - b).num_days().abs()
}

/// Classify transfers within one batch of rows. Each stage only considers
/// rows no earlier stage classified.
pub fn detect_transfers(
    rows: &[TransferInput],
    accounts: &[Account],
) -> HashMap<usize, TransferClassification> {
    let mut classified: HashMap<usize, TransferClassification> = HashMap::new();

    // Stage 1: credit-card-payment pairing. A payment is negative on the
    // bank side (money out) and negative on the card side (balance down).
    for bank in rows.iter().filter(|r| r.kind == AccountKind::Bank) {
        if classified.contains_key(&bank.row_id) || !bank.amount.is_negative() {
            continue;
        }
        let partner = rows.iter().find(|card| {
            card.kind == AccountKind::CreditCard
                && !classified.contains_key(&card.row_id)
                && card.amount.is_negative()
                && amounts_match(bank.amount, card.amount)
                && day_diff(bank.date, card.date) <= 3
        });
        if let Some(card) = partner {
            debug!(bank = bank.row_id, card = card.row_id, "paired credit-card payment");
            classified.insert(
                bank.row_id,
                TransferClassification {
                    reason: TransferReason::CreditCardPayment,
                    paired_with: Some(card.row_id),
                },
            );
            classified.insert(
                card.row_id,
                TransferClassification {
                    reason: TransferReason::CreditCardPayment,
                    paired_with: Some(bank.row_id),
                },
            );
        }
    }

    // Stage 2: inter-account pairing between bank accounts. Equal and
    // opposite amounts, dates within a day, and a transfer keyword on at
    // least one side.
    let bank_rows: Vec<&TransferInput> = rows
        .iter()
        .filter(|r| r.kind == AccountKind::Bank)
        .collect();
    for i in 0..bank_rows.len() {
        let a = bank_rows[i];
        if classified.contains_key(&a.row_id) {
            continue;
        }
        for b in bank_rows.iter().skip(i + 1) {
            if classified.contains_key(&b.row_id) || a.account_id == b.account_id {
                continue;
            }
            let opposite = a.amount.is_negative() != b.amount.is_negative();
            if !opposite || !amounts_match(a.amount, b.amount) || day_diff(a.date, b.date) > 1 {
                continue;
            }
            if !has_transfer_keyword(&a.normalized_description)
                && !has_transfer_keyword(&b.normalized_description)
            {
                continue;
            }
            debug!(a = a.row_id, b = b.row_id, "paired inter-account transfer");
            classified.insert(
                a.row_id,
                TransferClassification {
                    reason: TransferReason::InterAccountTransfer,
                    paired_with: Some(b.row_id),
                },
            );
            classified.insert(
                b.row_id,
                TransferClassification {
                    reason: TransferReason::InterAccountTransfer,
                    paired_with: Some(a.row_id),
                },
            );
            break;
        }
    }

    // Stage 3: unpaired heuristic. A keyword row that also names a sibling
    // account (by alias or card last-4) is a transfer even when the other
    // side is missing from this batch.
    for row in rows {
        if classified.contains_key(&row.row_id) {
            continue;
        }
        if !has_transfer_keyword(&row.normalized_description) {
            continue;
        }
        let referenced = accounts.iter().find(|acct| {
            if acct.id == row.account_id {
                return false;
            }
            let alias = normalize_description(&acct.alias);
            let alias_hit = !alias.is_empty() && row.normalized_description.contains(&alias);
            let last4_hit = acct
                .last4
                .as_deref()
                .is_some_and(|l4| row.normalized_description.contains(l4));
            alias_hit || last4_hit
        });
        if let Some(other) = referenced {
            let reason = if row.kind == AccountKind::CreditCard
                || other.kind == AccountKind::CreditCard
            {
                TransferReason::CreditCardPayment
            } else {
                TransferReason::InterAccountTransfer
            };
            debug!(row = row.row_id, other = %other.id, "unpaired transfer heuristic");
            classified.insert(
                row.row_id,
                TransferClassification {
                    reason,
                    paired_with: None,
                },
            );
        }
    }

    classified
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn row(
        row_id: usize,
        account_id: i64,
        kind: AccountKind,
        day: u32,
        cents: i64,
        desc: &str,
    ) -> TransferInput {
        TransferInput {
            row_id,
            account_id: AccountId(account_id),
            kind,
            date: date(day),
            amount: Money::from_cents(cents),
            normalized_description: normalize_description(desc),
        }
    }

    fn accounts() -> Vec<Account> {
        vec![
            Account::new(1, AccountKind::Bank, "Chequing"),
            Account::new(2, AccountKind::Bank, "Savings"),
            Account::new(3, AccountKind::CreditCard, "Visa").with_last4("1234"),
        ]
    }

    #[test]
    fn pairs_credit_card_payment() {
        let rows = vec![
            row(0, 1, AccountKind::Bank, 10, -50_00, "E-TRANSFER TO VISA 1234"),
            row(1, 3, AccountKind::CreditCard, 11, -50_00, "PAYMENT RECEIVED THANK YOU"),
        ];
        let result = detect_transfers(&rows, &accounts());
        assert_eq!(result[&0].reason, TransferReason::CreditCardPayment);
        assert_eq!(result[&0].paired_with, Some(1));
        assert_eq!(result[&1].paired_with, Some(0));
    }

    #[test]
    fn card_payment_requires_both_sides_negative() {
        // A card purchase (positive) must not pair with a bank withdrawal.
        let rows = vec![
            row(0, 1, AccountKind::Bank, 10, -50_00, "WITHDRAWAL"),
            row(1, 3, AccountKind::CreditCard, 10, 50_00, "RESTAURANT"),
        ];
        assert!(detect_transfers(&rows, &accounts()).is_empty());
    }

    #[test]
    fn card_payment_respects_date_window() {
        let rows = vec![
            row(0, 1, AccountKind::Bank, 1, -50_00, "PAYMENT"),
            row(1, 3, AccountKind::CreditCard, 8, -50_00, "PAYMENT"),
        ];
        assert!(detect_transfers(&rows, &accounts()).is_empty());
    }

    #[test]
    fn pairs_inter_account_transfer_with_keyword() {
        let rows = vec![
            row(0, 1, AccountKind::Bank, 5, -200_00, "TRANSFER TO SAVINGS"),
            row(1, 2, AccountKind::Bank, 5, 200_00, "DEPOSIT"),
        ];
        let result = detect_transfers(&rows, &accounts());
        assert_eq!(result[&0].reason, TransferReason::InterAccountTransfer);
        assert_eq!(result[&1].reason, TransferReason::InterAccountTransfer);
    }

    #[test]
    fn inter_account_requires_different_accounts_and_keyword() {
        // Same account: no pairing.
        let same = vec![
            row(0, 1, AccountKind::Bank, 5, -200_00, "TRANSFER OUT"),
            row(1, 1, AccountKind::Bank, 5, 200_00, "TRANSFER IN"),
        ];
        assert!(detect_transfers(&same, &accounts()).is_empty());

        // No keyword on either side: no pairing.
        let no_kw = vec![
            row(0, 1, AccountKind::Bank, 5, -200_00, "CHEQUE 42"),
            row(1, 2, AccountKind::Bank, 5, 200_00, "CHEQUE 42"),
        ];
        assert!(detect_transfers(&no_kw, &accounts()).is_empty());
    }

    #[test]
    fn inter_account_one_day_window() {
        let rows = vec![
            row(0, 1, AccountKind::Bank, 5, -200_00, "XFER TO SAVINGS"),
            row(1, 2, AccountKind::Bank, 7, 200_00, "XFER IN"),
        ];
        assert!(detect_transfers(&rows, &accounts()).is_empty());
    }

    #[test]
    fn unpaired_row_referencing_card_last4() {
        let rows = vec![row(
            0,
            1,
            AccountKind::Bank,
            5,
            -300_00,
            "ONLINE PAYMENT TO CARD 1234",
        )];
        let result = detect_transfers(&rows, &accounts());
        assert_eq!(result[&0].reason, TransferReason::CreditCardPayment);
        assert_eq!(result[&0].paired_with, None);
    }

    #[test]
    fn unpaired_row_referencing_sibling_alias() {
        let rows = vec![row(
            0,
            1,
            AccountKind::Bank,
            5,
            -75_00,
            "TRANSFER TO SAVINGS ACCT",
        )];
        let result = detect_transfers(&rows, &accounts());
        assert_eq!(result[&0].reason, TransferReason::InterAccountTransfer);
    }

    #[test]
    fn keyword_without_account_reference_is_not_a_transfer() {
        let rows = vec![row(0, 1, AccountKind::Bank, 5, -20_00, "PAYMENT TO HYDRO")];
        assert!(detect_transfers(&rows, &accounts()).is_empty());
    }

    #[test]
    fn earlier_stage_wins_over_heuristic() {
        // Row 0 would also satisfy the stage-3 heuristic; stage 1 claims it
        // first and records the pairing.
        let rows = vec![
            row(0, 1, AccountKind::Bank, 10, -50_00, "PAYMENT TO VISA 1234"),
            row(1, 3, AccountKind::CreditCard, 10, -50_00, "PAYMENT THANK YOU"),
        ];
        let result = detect_transfers(&rows, &accounts());
        assert_eq!(result[&0].paired_with, Some(1));
    }
}
