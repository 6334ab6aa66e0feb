//! Matching a single normalized row against recurring schedules: first
//! against this period's projected placeholders, then against the
//! definitions themselves when no projection exists yet.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use tally_core::{Money, RecurringDefinition, RecurringDefinitionId, Transaction};

use crate::normalize::normalize_description;

/// Coarse trustworthiness of a recurring match. Declaration order doubles
/// as ranking order: `High < Medium < Low` under the derived `Ord`, so the
/// minimum is the best candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone)]
pub struct RecurringMatch {
    pub definition_id: RecurringDefinitionId,
    pub category: String,
    pub tier: ConfidenceTier,
    /// Index into the projections slice when the match consumed a
    /// projected placeholder (Mode A); `None` for definition-only matches.
    pub projection_index: Option<usize>,
    pub day_diff: i64,
}

const MAX_DAY_DIFF: i64 = 5;

fn amount_tolerance() -> Decimal {
    Decimal::new(10, 2) // 10%
}

fn tier_for(day_diff: i64, amount_diff: Decimal) -> ConfidenceTier {
    if day_diff <= 1 && amount_diff <= Decimal::new(1, 2) {
        ConfidenceTier::High
    } else if day_diff <= 2 && amount_diff <= Decimal::new(5, 2) {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}

fn amount_only_tier(amount_diff: Decimal) -> ConfidenceTier {
    if amount_diff <= Decimal::new(1, 2) {
        ConfidenceTier::High
    } else if amount_diff <= Decimal::new(5, 2) {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}

pub struct RecurringMatcher<'a> {
    definitions: Vec<(&'a RecurringDefinition, String)>,
}

impl<'a> RecurringMatcher<'a> {
    /// Inactive definitions are dropped up front; their projections (if
    /// any linger) can never match.
    pub fn new(definitions: &'a [RecurringDefinition]) -> Self {
        let definitions = definitions
            .iter()
            .filter(|d| d.active)
            .map(|d| (d, normalize_description(&d.merchant_label)))
            .collect();
        RecurringMatcher { definitions }
    }

    fn definition(&self, id: RecurringDefinitionId) -> Option<&(&'a RecurringDefinition, String)> {
        self.definitions.iter().find(|(d, _)| d.id == id)
    }

    /// Mode A then Mode B; first mode that produces any candidate wins.
    ///
    /// `amount` is the row's expense-signed amount. `consumed` holds
    /// projection indices already claimed earlier in the same batch.
    pub fn match_row(
        &self,
        normalized_description: &str,
        date: NaiveDate,
        amount: Money,
        projections: &[Transaction],
        consumed: &HashSet<usize>,
    ) -> Option<RecurringMatch> {
        self.match_projections(normalized_description, date, amount, projections, consumed)
            .or_else(|| self.match_definitions(normalized_description, amount))
    }

    /// Mode A: candidates among this period's still-unconsumed projected
    /// placeholders. Rank by tier, then by smallest day difference.
    pub fn match_projections(
        &self,
        normalized_description: &str,
        date: NaiveDate,
        amount: Money,
        projections: &[Transaction],
        consumed: &HashSet<usize>,
    ) -> Option<RecurringMatch> {
        let mut best: Option<RecurringMatch> = None;
        for (idx, projection) in projections.iter().enumerate() {
            if consumed.contains(&idx) || !projection.is_projected() {
                continue;
            }
            let Some(def_id) = projection.recurring_definition_id else {
                continue;
            };
            let Some((def, label)) = self.definition(def_id) else {
                continue;
            };
            if !normalized_description.contains(label.as_str()) {
                continue;
            }
            let day_diff = (date - projection.date).num_days().abs();
            if day_diff > MAX_DAY_DIFF {
                continue;
            }
            let Some(amount_diff) = amount.relative_diff(projection.amount) else {
                continue;
            };
            if amount_diff > amount_tolerance() {
                continue;
            }
            let candidate = RecurringMatch {
                definition_id: def.id,
                category: def.category.clone(),
                tier: tier_for(day_diff, amount_diff),
                projection_index: Some(idx),
                day_diff,
            };
            let better = match &best {
                None => true,
                Some(b) => (candidate.tier, candidate.day_diff) < (b.tier, b.day_diff),
            };
            if better {
                best = Some(candidate);
            }
        }
        if let Some(m) = &best {
            debug!(definition = %m.definition_id, tier = ?m.tier, "matched projection");
        }
        best
    }

    /// Mode B: candidates among the definitions directly, used when no
    /// projection exists yet. No date constraint; rank by amount
    /// closeness.
    pub fn match_definitions(
        &self,
        normalized_description: &str,
        amount: Money,
    ) -> Option<RecurringMatch> {
        let mut best: Option<(Decimal, RecurringMatch)> = None;
        for (def, label) in &self.definitions {
            if !normalized_description.contains(label.as_str()) {
                continue;
            }
            let Some(amount_diff) = amount.relative_diff(def.nominal_amount) else {
                continue;
            };
            if amount_diff > amount_tolerance() {
                continue;
            }
            let candidate = RecurringMatch {
                definition_id: def.id,
                category: def.category.clone(),
                tier: amount_only_tier(amount_diff),
                projection_index: None,
                day_diff: 0,
            };
            let better = match &best {
                None => true,
                Some((best_diff, _)) => amount_diff < *best_diff,
            };
            if better {
                best = Some((amount_diff, candidate));
            }
        }
        best.map(|(_, m)| m)
    }
}
