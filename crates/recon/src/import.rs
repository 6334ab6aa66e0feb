//! One file-ingestion run: parse → normalize → dedup against history →
//! transfer-tag → dedup within the file → ignore rules → income-merge →
//! recurring-match, producing a persistable outcome for the storage
//! collaborator.
//!
//! Precedence note: a row matched by both an ignore rule and a transfer
//! pattern is classified by the ignore rule, exactly once. The ignore
//! pass runs last and reclassifies transfer-tagged rows.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

use tally_core::{
    Account, AccountId, AccountKind, Money, PeriodKey, RecurringDefinition,
    RecurringDefinitionId, Transaction, TxSource, TxStatus, UNCATEGORIZED,
};

use crate::normalize::{
    composite_description, expense_amount, hash_key, normalize_amount, normalize_description,
    parse_amount, parse_date,
};
use crate::recurring::RecurringMatcher;
use crate::rows::{ColumnMapping, RawRecord};
use crate::rules::RuleSet;
use crate::transfer::{detect_transfers, TransferInput};

const INCOME_CATEGORY: &str = "Income";
/// Days either side of a projected income entry a deposit may land.
const INCOME_MERGE_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("No target period available for this import mode")]
    MissingPeriod,
    #[error("Account {0} is not among the known accounts")]
    MissingAccount(AccountId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Rows outside the caller's current period are staged out-of-period.
    CurrentMonth,
    /// Rows outside the named month are staged out-of-period.
    SpecificMonth(PeriodKey),
    /// Rows are grouped by their own calendar month; unknown months are
    /// reported back as periods to create.
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoreReason {
    Transfer,
    IgnoreRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowStatus {
    Pending,
    Imported,
    Duplicate,
    Ignored(IgnoreReason),
    OutOfPeriod,
}

/// One parsed, normalized line staged for audit and future dedup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawImportRow {
    pub account_id: AccountId,
    pub batch_id: i64,
    pub period: PeriodKey,
    pub date: NaiveDate,
    /// Account-convention sign (bank money-out negative, card purchase
    /// positive); this is the value the content hash covers.
    pub amount: Money,
    /// Normalized composite description.
    pub description: String,
    pub hash_key: String,
    pub status: RowStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub duplicate: usize,
    pub transfer_ignored: usize,
    pub rule_ignored: usize,
    pub out_of_period: usize,
    pub recurring_matched: usize,
    pub income_merged: usize,
    pub malformed_skipped: usize,
}

/// Everything the storage collaborator needs to apply in one transaction.
/// A `rows` entry marked `Imported` always has its ledger counterpart in
/// `transactions` or `updated_transactions`; consumed projections must be
/// deleted in the same commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub summary: ImportSummary,
    pub rows: Vec<RawImportRow>,
    pub transactions: Vec<Transaction>,
    /// Projected entries merged in place (income deposits).
    pub updated_transactions: Vec<Transaction>,
    /// Indices into the supplied projections slice whose placeholders
    /// were consumed and must be deleted.
    pub consumed_projections: Vec<usize>,
    /// Auto mode only: months seen in the data with no known period.
    pub new_periods: Vec<PeriodKey>,
}

pub struct ImportContext<'a> {
    pub account: &'a Account,
    pub accounts: &'a [Account],
    pub batch_id: i64,
    /// The caller's open period; required by `CurrentMonth` mode.
    pub current_period: Option<PeriodKey>,
    /// Periods that already exist, for Auto mode.
    pub known_periods: &'a [PeriodKey],
    /// Hashes of already-persisted rows/transactions for this account.
    pub existing_hashes: &'a HashSet<String>,
    pub rules: &'a RuleSet,
    pub definitions: &'a [RecurringDefinition],
    /// Projected placeholders for the targeted period(s).
    pub projections: &'a [Transaction],
}

struct StagedRow {
    date: NaiveDate,
    description: String,
    sub_description: Option<String>,
    normalized_description: String,
    /// Account-convention sign.
    amount: Money,
    /// Expense sign.
    expense: Money,
    period: PeriodKey,
    hash: String,
    status: RowStatus,
    category: Option<String>,
    recurring_definition: Option<RecurringDefinitionId>,
    merged_projection: Option<usize>,
}

/// Run one import batch. Malformed rows are skipped and counted; a
/// missing target period or unknown account aborts the whole batch.
pub fn run_import(
    ctx: &ImportContext<'_>,
    records: &[RawRecord],
    mapping: &ColumnMapping,
    mode: ImportMode,
) -> Result<ImportOutcome, ImportError> {
    if !ctx.accounts.iter().any(|a| a.id == ctx.account.id) {
        return Err(ImportError::MissingAccount(ctx.account.id));
    }
    let target = match mode {
        ImportMode::CurrentMonth => Some(ctx.current_period.ok_or(ImportError::MissingPeriod)?),
        ImportMode::SpecificMonth(period) => Some(period),
        ImportMode::Auto => None,
    };

    let mut summary = ImportSummary::default();
    let mut staged: Vec<StagedRow> = Vec::new();

    // 1. Parse, normalize, hash, scope to a period.
    for (line, record) in records.iter().enumerate() {
        match stage_row(ctx, record, mapping, target) {
            Some(row) => staged.push(row),
            None => {
                warn!(line, "skipping malformed row");
                summary.malformed_skipped += 1;
            }
        }
    }

    // 2. Dedup against persisted history.
    for row in &mut staged {
        if row.status == RowStatus::Pending && ctx.existing_hashes.contains(&row.hash) {
            row.status = RowStatus::Duplicate;
        }
    }

    // 3. Transfer detection over still-pending rows. Runs before the
    // intra-file dedup so a repeated transfer row is tagged on both
    // occurrences, not split into transfer + duplicate.
    let transfer_inputs: Vec<TransferInput> = staged
        .iter()
        .enumerate()
        .filter(|(_, r)| r.status == RowStatus::Pending)
        .map(|(idx, r)| TransferInput {
            row_id: idx,
            account_id: ctx.account.id,
            kind: ctx.account.kind,
            date: r.date,
            amount: r.amount,
            normalized_description: r.normalized_description.clone(),
        })
        .collect();
    for (row_id, classification) in detect_transfers(&transfer_inputs, ctx.accounts) {
        debug!(row = row_id, reason = ?classification.reason, "transfer");
        staged[row_id].status = RowStatus::Ignored(IgnoreReason::Transfer);
    }

    // 4. Dedup within the file: second occurrence of an identical hash.
    let mut seen_in_file: HashSet<String> = HashSet::new();
    for row in &mut staged {
        if row.status != RowStatus::Pending {
            continue;
        }
        if !seen_in_file.insert(row.hash.clone()) {
            row.status = RowStatus::Duplicate;
        }
    }

    // 5. Ignore rules. A row the transfer pass claimed is reclassified;
    // the ignore rule wins and the row is ignored exactly once.
    for row in &mut staged {
        let eligible = matches!(
            row.status,
            RowStatus::Pending | RowStatus::Ignored(IgnoreReason::Transfer)
        );
        if eligible && ctx.rules.is_ignored(&row.normalized_description) {
            row.status = RowStatus::Ignored(IgnoreReason::IgnoreRule);
        }
    }

    let mut consumed: HashSet<usize> = HashSet::new();
    let mut updated_transactions: Vec<Transaction> = Vec::new();

    // 6. Income merge: a bank deposit close to exactly one projected
    // income entry updates the projection instead of creating a row.
    if ctx.account.kind == AccountKind::Bank {
        for row in &mut staged {
            if row.status != RowStatus::Pending || !row.amount.is_positive() {
                continue;
            }
            if let Some(idx) = sole_income_candidate(ctx.projections, &consumed, row) {
                consumed.insert(idx);
                let mut merged = ctx.projections[idx].clone();
                merged.date = row.date;
                merged.amount = row.expense;
                merged.status = TxStatus::Posted;
                merged.source = TxSource::Import;
                merged.import_hash = Some(row.hash.clone());
                updated_transactions.push(merged);
                row.status = RowStatus::Imported;
                row.merged_projection = Some(idx);
                summary.income_merged += 1;
            }
        }
    }

    // 7. Recurring match, Mode A then B, on whatever is still pending.
    // Projections from other months stay off the table for each row, so
    // an Auto-mode batch spanning a month boundary cannot consume a
    // neighboring period's placeholder.
    let matcher = RecurringMatcher::new(ctx.definitions);
    for row in &mut staged {
        if row.status != RowStatus::Pending {
            continue;
        }
        let mut masked = consumed.clone();
        for (idx, projection) in ctx.projections.iter().enumerate() {
            if projection.period != row.period {
                masked.insert(idx);
            }
        }
        if let Some(m) = matcher.match_row(
            &row.normalized_description,
            row.date,
            row.expense,
            ctx.projections,
            &masked,
        ) {
            if let Some(idx) = m.projection_index {
                consumed.insert(idx);
            }
            row.category = Some(m.category);
            row.recurring_definition = Some(m.definition_id);
            summary.recurring_matched += 1;
        } else if let Some(category) = ctx.rules.category_for(&row.normalized_description) {
            row.category = Some(category.to_string());
        }
        row.status = RowStatus::Imported;
    }

    // 8. Assemble the persistable outcome.
    let mut rows = Vec::with_capacity(staged.len());
    let mut transactions = Vec::new();
    let mut new_periods: Vec<PeriodKey> = Vec::new();
    for row in &staged {
        match row.status {
            RowStatus::Imported => summary.imported += 1,
            RowStatus::Duplicate => summary.duplicate += 1,
            RowStatus::Ignored(IgnoreReason::Transfer) => summary.transfer_ignored += 1,
            RowStatus::Ignored(IgnoreReason::IgnoreRule) => summary.rule_ignored += 1,
            RowStatus::OutOfPeriod => summary.out_of_period += 1,
            RowStatus::Pending => {}
        }
        if mode == ImportMode::Auto
            && !ctx.known_periods.contains(&row.period)
            && !new_periods.contains(&row.period)
        {
            new_periods.push(row.period);
        }
        rows.push(RawImportRow {
            account_id: ctx.account.id,
            batch_id: ctx.batch_id,
            period: row.period,
            date: row.date,
            amount: row.amount,
            description: row.normalized_description.clone(),
            hash_key: row.hash.clone(),
            status: row.status,
        });

        // Imported rows (other than income merges) and ignored rows alike
        // become ledger entries; ignored ones carry is_ignored so totals
        // and audits stay consistent.
        let ignored = matches!(row.status, RowStatus::Ignored(_));
        let imported_fresh = row.status == RowStatus::Imported && row.merged_projection.is_none();
        if imported_fresh || ignored {
            transactions.push(Transaction {
                id: None,
                account_id: ctx.account.id,
                period: row.period,
                date: row.date,
                description: row.description.clone(),
                sub_description: row.sub_description.clone(),
                amount: row.expense,
                category: row.category.clone().unwrap_or_else(|| UNCATEGORIZED.to_string()),
                status: TxStatus::Posted,
                source: TxSource::Import,
                is_ignored: ignored,
                is_recurring_instance: row.recurring_definition.is_some(),
                recurring_definition_id: row.recurring_definition,
                external_id: None,
                import_hash: Some(row.hash.clone()),
            });
        }
    }

    let mut consumed_projections: Vec<usize> = consumed.into_iter().collect();
    consumed_projections.sort_unstable();

    info!(
        account = %ctx.account.id,
        batch = ctx.batch_id,
        imported = summary.imported,
        duplicate = summary.duplicate,
        "import batch complete"
    );

    Ok(ImportOutcome {
        summary,
        rows,
        transactions,
        updated_transactions,
        consumed_projections,
        new_periods,
    })
}

fn stage_row(
    ctx: &ImportContext<'_>,
    record: &RawRecord,
    mapping: &ColumnMapping,
    target: Option<PeriodKey>,
) -> Option<StagedRow> {
    let date = parse_date(record.get(&mapping.date)?).ok()?;
    let raw_amount = parse_amount(record.get(&mapping.amount)?).ok()?;
    let description = record.get(&mapping.description).cloned().unwrap_or_default();
    let sub_description = mapping
        .sub_description
        .as_ref()
        .and_then(|k| record.get(k))
        .filter(|s| !s.trim().is_empty())
        .cloned();
    let type_hint = mapping
        .transaction_type
        .as_ref()
        .and_then(|k| record.get(k))
        .map(String::as_str);

    let raw_amount = if ctx.account.invert_amounts {
        -raw_amount
    } else {
        raw_amount
    };
    let amount = normalize_amount(raw_amount, ctx.account.kind, type_hint);
    let expense = expense_amount(amount, ctx.account.kind);
    let normalized_description =
        normalize_description(&composite_description(&description, sub_description.as_deref()));

    let (period, status) = match target {
        Some(t) if t.contains(date) => (t, RowStatus::Pending),
        Some(t) => (t, RowStatus::OutOfPeriod),
        None => (PeriodKey::of(date), RowStatus::Pending),
    };
    let hash = hash_key(
        ctx.account.id.0,
        period,
        date,
        amount.to_cents(),
        &normalized_description,
    );

    Some(StagedRow {
        date,
        description,
        sub_description,
        normalized_description,
        amount,
        expense,
        period,
        hash,
        status,
        category: None,
        recurring_definition: None,
        merged_projection: None,
    })
}

/// Index of the single projected income entry this deposit could settle;
/// `None` when there are zero or several (ambiguity skips the merge).
fn sole_income_candidate(
    projections: &[Transaction],
    consumed: &HashSet<usize>,
    row: &StagedRow,
) -> Option<usize> {
    let deposit = row.expense.abs();
    let mut found: Option<usize> = None;
    for (idx, projection) in projections.iter().enumerate() {
        if consumed.contains(&idx)
            || !projection.is_projected()
            || !projection.category.eq_ignore_ascii_case(INCOME_CATEGORY)
        {
            continue;
        }
        if (row.date - projection.date).num_days().abs() > INCOME_MERGE_WINDOW_DAYS {
            continue;
        }
        let projected = projection.amount.abs();
        let tolerance = Money::from_cents(100).max(Money::from_decimal(
            projected.as_decimal() * Decimal::new(10, 2),
        ));
        if deposit.diff(projected) > tolerance {
            continue;
        }
        if found.is_some() {
            debug!(row_date = %row.date, "ambiguous income merge, importing normally");
            return None;
        }
        found = Some(idx);
    }
    found
}
