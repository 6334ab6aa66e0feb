use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::money::Money;
use super::period::PeriodKey;
use super::recurring::RecurringDefinitionId;

/// Category assigned when no rule or recurring definition claims a row.
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Placeholder generated from a recurring definition, not yet seen in
    /// real data.
    Projected,
    Pending,
    Posted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxSource {
    Import,
    Recurring,
    Manual,
    Income,
}

/// One ledger entry.
///
/// `amount` always carries the expense sign convention: positive means
/// money leaving the user, negative means income or a refund. Sign
/// normalization happens at ingestion, never at render time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Option<TransactionId>,
    pub account_id: AccountId,
    pub period: PeriodKey,
    pub date: NaiveDate,
    pub description: String,
    pub sub_description: Option<String>,
    pub amount: Money,
    pub category: String,
    pub status: TxStatus,
    pub source: TxSource,
    pub is_ignored: bool,
    pub is_recurring_instance: bool,
    pub recurring_definition_id: Option<RecurringDefinitionId>,
    /// Push-feed identifier, present only on synced rows.
    pub external_id: Option<String>,
    /// Content hash of the originating import row, present only on
    /// file-imported rows.
    pub import_hash: Option<String>,
}

impl Transaction {
    pub fn posted(
        account_id: AccountId,
        period: PeriodKey,
        date: NaiveDate,
        description: &str,
        amount: Money,
    ) -> Self {
        Transaction {
            id: None,
            account_id,
            period,
            date,
            description: description.to_string(),
            sub_description: None,
            amount,
            category: UNCATEGORIZED.to_string(),
            status: TxStatus::Posted,
            source: TxSource::Import,
            is_ignored: false,
            is_recurring_instance: false,
            recurring_definition_id: None,
            external_id: None,
            import_hash: None,
        }
    }

    pub fn is_projected(&self) -> bool {
        self.status == TxStatus::Projected
    }
}
