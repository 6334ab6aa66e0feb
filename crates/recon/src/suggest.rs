//! Mining posted history for not-yet-declared recurring schedules:
//! cluster by description+amount, reduce to one occurrence per month, and
//! score how bill-like the monthly rhythm is.

use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use tally_core::{Money, PeriodKey, RecurringDefinition, Transaction, TxSource, TxStatus};

use crate::normalize::{composite_description, normalize_description};

/// Minimum raw occurrences before a description group is worth looking at.
const MIN_OCCURRENCES: usize = 3;
/// Minimum distinct months with an occurrence.
const MIN_MONTHS: usize = 3;
/// Acceptable median gap between monthly occurrences, in days.
const GAP_MEDIAN_RANGE: (i64, i64) = (25, 35);
const GAP_MAX: i64 = 45;
/// Maximum day-of-month spread across occurrences.
const DAY_SPREAD_MAX: u32 = 10;
/// A suggestion whose newest occurrence lags the newest data by this many
/// calendar months is considered dead and dropped.
const STALE_MONTHS: i32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringSuggestion {
    /// Stable key (`normalizedDescription|medianAmount`) so a dismissal
    /// survives recomputation.
    pub dismissal_key: String,
    /// Normalized composite description the group matched on.
    pub description: String,
    pub median_amount: Money,
    pub amount_min: Money,
    pub amount_max: Money,
    pub day_min: u32,
    pub day_max: u32,
    /// One date per month, the occurrences the score was computed from.
    pub occurrences: Vec<NaiveDate>,
    /// 0–100.
    pub confidence: u8,
}

#[derive(Debug, Clone, Copy)]
struct Occurrence {
    date: NaiveDate,
    amount: Decimal,
}

/// Scan posted, non-ignored, import-sourced history and propose recurring
/// schedules. `dismissed` holds dismissal keys the user asked not to see
/// again.
pub fn mine_suggestions(
    history: &[Transaction],
    definitions: &[RecurringDefinition],
    dismissed: &HashSet<String>,
) -> Vec<RecurringSuggestion> {
    let eligible: Vec<&Transaction> = history
        .iter()
        .filter(|t| t.status == TxStatus::Posted && t.source == TxSource::Import && !t.is_ignored)
        .collect();
    let Some(latest) = eligible.iter().map(|t| t.date).max() else {
        return Vec::new();
    };

    let active_labels: Vec<String> = definitions
        .iter()
        .filter(|d| d.active)
        .map(|d| normalize_description(&d.merchant_label))
        .filter(|l| !l.is_empty())
        .collect();

    // Group by normalized composite description. BTreeMap keeps output
    // order deterministic.
    let mut groups: BTreeMap<String, Vec<Occurrence>> = BTreeMap::new();
    for tx in &eligible {
        let key = normalize_description(&composite_description(
            &tx.description,
            tx.sub_description.as_deref(),
        ));
        if key.is_empty() {
            continue;
        }
        groups.entry(key).or_default().push(Occurrence {
            date: tx.date,
            amount: tx.amount.as_decimal(),
        });
    }

    let mut suggestions = Vec::new();
    for (key, occurrences) in groups {
        if occurrences.len() < MIN_OCCURRENCES {
            continue;
        }
        // Already covered by an active definition (substring either way).
        if active_labels
            .iter()
            .any(|label| key.contains(label.as_str()) || label.contains(&key))
        {
            continue;
        }

        let clusters = if has_multi_occurrence_month(&occurrences) {
            cluster_by_amount(&occurrences)
        } else {
            vec![occurrences]
        };

        for cluster in clusters {
            if let Some(suggestion) = score_cluster(&key, &cluster, latest) {
                if dismissed.contains(&suggestion.dismissal_key) {
                    debug!(key = %suggestion.dismissal_key, "suggestion dismissed");
                    continue;
                }
                suggestions.push(suggestion);
            }
        }
    }
    suggestions
}

fn has_multi_occurrence_month(occurrences: &[Occurrence]) -> bool {
    let mut seen = HashSet::new();
    occurrences
        .iter()
        .any(|o| !seen.insert(PeriodKey::of(o.date)))
}

/// Greedy nearest-mean clustering, deterministic by processing ascending
/// by amount: assign to the nearest existing cluster whose mean is within
/// max($2, 10% of the mean), else start a new cluster.
fn cluster_by_amount(occurrences: &[Occurrence]) -> Vec<Vec<Occurrence>> {
    let mut sorted: Vec<Occurrence> = occurrences.to_vec();
    sorted.sort_by(|a, b| a.amount.cmp(&b.amount).then(a.date.cmp(&b.date)));

    let mut clusters: Vec<Vec<Occurrence>> = Vec::new();
    let mut means: Vec<Decimal> = Vec::new();
    for occ in sorted {
        let mut best: Option<(usize, Decimal)> = None;
        for (idx, mean) in means.iter().enumerate() {
            let tolerance = Decimal::from(2).max(mean.abs() * Decimal::new(10, 2));
            let distance = (occ.amount - mean).abs();
            if distance <= tolerance && best.map_or(true, |(_, d)| distance < d) {
                best = Some((idx, distance));
            }
        }
        match best {
            Some((idx, _)) => {
                clusters[idx].push(occ);
                let cluster = &clusters[idx];
                means[idx] = cluster.iter().map(|o| o.amount).sum::<Decimal>()
                    / Decimal::from(cluster.len() as i64);
            }
            None => {
                means.push(occ.amount);
                clusters.push(vec![occ]);
            }
        }
    }
    clusters
}

fn median(sorted: &[Decimal]) -> Decimal {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / Decimal::from(2)
    }
}

fn median_i64(values: &mut Vec<i64>) -> i64 {
    values.sort_unstable();
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2
    }
}

fn score_cluster(
    key: &str,
    cluster: &[Occurrence],
    latest_data: NaiveDate,
) -> Option<RecurringSuggestion> {
    let mut amounts: Vec<Decimal> = cluster.iter().map(|o| o.amount).collect();
    amounts.sort();
    let cluster_median = median(&amounts);

    // One occurrence per month: the one closest to the cluster median.
    let mut monthly: BTreeMap<PeriodKey, Occurrence> = BTreeMap::new();
    for occ in cluster {
        let entry = monthly.entry(PeriodKey::of(occ.date));
        match entry {
            std::collections::btree_map::Entry::Vacant(v) => {
                v.insert(*occ);
            }
            std::collections::btree_map::Entry::Occupied(mut o) => {
                let current = (o.get().amount - cluster_median).abs();
                let candidate = (occ.amount - cluster_median).abs();
                if candidate < current {
                    o.insert(*occ);
                }
            }
        }
    }
    if monthly.len() < MIN_MONTHS {
        return None;
    }

    let picks: Vec<Occurrence> = monthly.into_values().collect();
    let dates: Vec<NaiveDate> = picks.iter().map(|o| o.date).collect();

    let mut gaps: Vec<i64> = dates
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days())
        .collect();
    let gap_median = median_i64(&mut gaps.clone());
    let gap_max = gaps.iter().copied().max().unwrap_or(0);
    if gap_median < GAP_MEDIAN_RANGE.0 || gap_median > GAP_MEDIAN_RANGE.1 || gap_max > GAP_MAX {
        return None;
    }

    let day_min = dates.iter().map(|d| d.day()).min().unwrap();
    let day_max = dates.iter().map(|d| d.day()).max().unwrap();
    let day_range = day_max - day_min;
    if day_range > DAY_SPREAD_MAX {
        return None;
    }

    // Stale: newest occurrence trails the newest data by 3+ months.
    let last = *dates.last().unwrap();
    if PeriodKey::of(last).months_until(PeriodKey::of(latest_data)) >= STALE_MONTHS {
        return None;
    }

    let mut pick_amounts: Vec<Decimal> = picks.iter().map(|o| o.amount).collect();
    pick_amounts.sort();
    let amount_min = pick_amounts[0];
    let amount_max = *pick_amounts.last().unwrap();
    let pick_median = median(&pick_amounts);

    let amount_range_pct = if pick_median.is_zero() {
        0.0
    } else {
        ((amount_max - amount_min) / pick_median.abs() * Decimal::from(100))
            .to_f64()
            .unwrap_or(0.0)
    };
    let gap_deviation = gaps
        .iter()
        .map(|g| (g - gap_median).abs() as f64)
        .sum::<f64>()
        / gaps.len() as f64;

    let score = 0.4 * (1.0 - day_range as f64 / 10.0).max(0.0)
        + 0.3 * (1.0 - amount_range_pct / 60.0).max(0.0)
        + 0.3 * (1.0 - gap_deviation / 10.0).max(0.0);
    let confidence = (score * 100.0).round().clamp(0.0, 100.0) as u8;

    let median_money = Money::from_decimal(pick_median);
    Some(RecurringSuggestion {
        dismissal_key: format!("{key}|{:.2}", median_money.as_decimal()),
        description: key.to_string(),
        median_amount: median_money,
        amount_min: Money::from_decimal(amount_min),
        amount_max: Money::from_decimal(amount_max),
        day_min,
        day_max,
        occurrences: dates,
        confidence,
    })
}
