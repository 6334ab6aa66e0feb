//! Reconciling one push-feed batch (added/modified/removed events)
//! against the ledger. Same normalization, transfer, and recurring-match
//! rules as file import, but keyed by the feed's external id instead of a
//! content hash, and grouped by calendar month so each group resolves
//! against the right period's projections.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::{debug, info};

use tally_core::{
    Account, AccountId, AccountKind, Money, PeriodKey, RecurringDefinition, Transaction, TxSource,
    TxStatus, UNCATEGORIZED,
};

use crate::normalize::{composite_description, normalize_description};
use crate::recurring::RecurringMatcher;
use crate::rules::RuleSet;
use crate::transfer::{detect_transfers, TransferInput};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Account {0} is not among the known accounts")]
    MissingAccount(AccountId),
}

/// One feed row. `amount` is expense-signed (positive = money out), the
/// convention push feeds report in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedTransaction {
    pub external_id: String,
    pub date: NaiveDate,
    pub name: String,
    pub merchant_name: Option<String>,
    pub amount: Money,
    pub pending: bool,
    pub category_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FeedEvent {
    Added(FeedTransaction),
    Modified(FeedTransaction),
    Removed { external_id: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub added: usize,
    pub duplicate: usize,
    pub transfer_ignored: usize,
    pub recurring_matched: usize,
    pub modified: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub summary: SyncSummary,
    pub transactions: Vec<Transaction>,
    /// Existing rows whose date/description/status changed.
    pub updated_transactions: Vec<Transaction>,
    /// External ids to hard-delete.
    pub removed_external_ids: Vec<String>,
    /// Indices into the supplied projections slice to delete.
    pub consumed_projections: Vec<usize>,
}

pub struct SyncContext<'a> {
    pub account: &'a Account,
    pub accounts: &'a [Account],
    pub rules: &'a RuleSet,
    pub definitions: &'a [RecurringDefinition],
    /// Projected placeholders across every period the feed may touch.
    pub projections: &'a [Transaction],
    /// Already-persisted transactions for this account.
    pub existing: &'a [Transaction],
}

/// Reconcile one feed batch.
pub fn reconcile_feed(
    ctx: &SyncContext<'_>,
    events: &[FeedEvent],
) -> Result<SyncOutcome, SyncError> {
    if !ctx.accounts.iter().any(|a| a.id == ctx.account.id) {
        return Err(SyncError::MissingAccount(ctx.account.id));
    }

    let mut summary = SyncSummary::default();
    let mut outcome_txs: Vec<Transaction> = Vec::new();
    let mut updated: Vec<Transaction> = Vec::new();
    let mut removed_ids: Vec<String> = Vec::new();
    let mut consumed: HashSet<usize> = HashSet::new();

    let mut added: Vec<&FeedTransaction> = Vec::new();
    for event in events {
        match event {
            FeedEvent::Added(feed) => added.push(feed),
            FeedEvent::Modified(feed) => {
                match find_existing(ctx.existing, &feed.external_id) {
                    Some(existing) => {
                        let mut tx = existing.clone();
                        tx.date = feed.date;
                        tx.description = feed.name.clone();
                        tx.sub_description = feed.merchant_name.clone();
                        tx.period = PeriodKey::of(feed.date);
                        tx.status = if feed.pending {
                            TxStatus::Pending
                        } else {
                            TxStatus::Posted
                        };
                        // Amount and its stored sign are preserved.
                        updated.push(tx);
                        summary.modified += 1;
                    }
                    // A modify can race ahead of its add; treat it as new.
                    None => added.push(feed),
                }
            }
            FeedEvent::Removed { external_id } => {
                if find_existing(ctx.existing, external_id).is_some() {
                    summary.removed += 1;
                    removed_ids.push(external_id.clone());
                } else {
                    debug!(external_id = %external_id, "removal for unknown row, skipping");
                }
            }
        }
    }

    // Group added rows by their calendar month.
    let mut by_month: BTreeMap<PeriodKey, Vec<&FeedTransaction>> = BTreeMap::new();
    for feed in added {
        by_month.entry(PeriodKey::of(feed.date)).or_default().push(feed);
    }

    let matcher = RecurringMatcher::new(ctx.definitions);
    for (period, group) in by_month {
        reconcile_month(
            ctx,
            period,
            &group,
            &matcher,
            &mut summary,
            &mut outcome_txs,
            &mut consumed,
        );
    }

    let mut consumed_projections: Vec<usize> = consumed.into_iter().collect();
    consumed_projections.sort_unstable();

    info!(
        account = %ctx.account.id,
        added = summary.added,
        modified = summary.modified,
        removed = summary.removed,
        "sync batch complete"
    );

    Ok(SyncOutcome {
        summary,
        transactions: outcome_txs,
        updated_transactions: updated,
        removed_external_ids: removed_ids,
        consumed_projections,
    })
}

fn find_existing<'a>(existing: &'a [Transaction], external_id: &str) -> Option<&'a Transaction> {
    existing
        .iter()
        .find(|t| t.external_id.as_deref() == Some(external_id))
}

fn reconcile_month(
    ctx: &SyncContext<'_>,
    period: PeriodKey,
    group: &[&FeedTransaction],
    matcher: &RecurringMatcher<'_>,
    summary: &mut SyncSummary,
    outcome_txs: &mut Vec<Transaction>,
    consumed: &mut HashSet<usize>,
) {
    // Dedup by external id: against the ledger and within the batch.
    let mut fresh: Vec<&FeedTransaction> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for feed in group {
        let dup_existing = ctx
            .existing
            .iter()
            .any(|t| t.period == period && t.external_id.as_deref() == Some(feed.external_id.as_str()));
        if dup_existing || !seen.insert(feed.external_id.as_str()) {
            summary.duplicate += 1;
        } else {
            fresh.push(*feed);
        }
    }

    // Transfer detection. A single-account feed can only hit the
    // unpaired keyword/sibling-reference heuristic, which is exactly the
    // shared detector's final stage.
    let inputs: Vec<TransferInput> = fresh
        .iter()
        .enumerate()
        .map(|(idx, feed)| TransferInput {
            row_id: idx,
            account_id: ctx.account.id,
            kind: ctx.account.kind,
            date: feed.date,
            amount: account_convention(feed.amount, ctx.account.kind),
            normalized_description: normalized_feed_description(feed),
        })
        .collect();
    let transfers = detect_transfers(&inputs, ctx.accounts);

    // Mask projections from other periods so this group only consumes its
    // own period's placeholders.
    let mut masked = consumed.clone();
    for (idx, projection) in ctx.projections.iter().enumerate() {
        if projection.period != period {
            masked.insert(idx);
        }
    }

    for (idx, feed) in fresh.iter().enumerate() {
        let normalized = normalized_feed_description(feed);
        let is_transfer = transfers.contains_key(&idx);

        let mut tx = Transaction {
            id: None,
            account_id: ctx.account.id,
            period,
            date: feed.date,
            description: feed.name.clone(),
            sub_description: feed.merchant_name.clone(),
            amount: feed.amount,
            category: UNCATEGORIZED.to_string(),
            status: if feed.pending {
                TxStatus::Pending
            } else {
                TxStatus::Posted
            },
            source: TxSource::Import,
            is_ignored: is_transfer,
            is_recurring_instance: false,
            recurring_definition_id: None,
            external_id: Some(feed.external_id.clone()),
            import_hash: None,
        };

        if is_transfer {
            summary.transfer_ignored += 1;
        } else if let Some(m) =
            matcher.match_row(&normalized, feed.date, feed.amount, ctx.projections, &masked)
        {
            if let Some(proj_idx) = m.projection_index {
                consumed.insert(proj_idx);
                masked.insert(proj_idx);
            }
            tx.category = m.category;
            tx.recurring_definition_id = Some(m.definition_id);
            tx.is_recurring_instance = true;
            summary.recurring_matched += 1;
            summary.added += 1;
        } else {
            tx.category = ctx
                .rules
                .category_for(&normalized)
                .map(str::to_string)
                .or_else(|| feed.category_hint.clone())
                .unwrap_or_else(|| UNCATEGORIZED.to_string());
            summary.added += 1;
        }
        outcome_txs.push(tx);
    }
}

fn normalized_feed_description(feed: &FeedTransaction) -> String {
    normalize_description(&composite_description(
        &feed.name,
        feed.merchant_name.as_deref(),
    ))
}

/// Feeds report expense-signed amounts; the transfer detector reasons in
/// each account's own statement convention.
fn account_convention(expense: Money, kind: AccountKind) -> Money {
    match kind {
        AccountKind::Bank => -expense,
        AccountKind::CreditCard => expense,
    }
}
