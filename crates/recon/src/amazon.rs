//! Pairing marketplace orders with card/bank charges by exact amount and
//! date proximity. One clean candidate that no other order wants is an
//! automatic match; everything else is left for manual resolution with
//! its full candidate set attached.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use tally_core::{Money, TransactionId};

pub const DEFAULT_WINDOW_DAYS: i64 = 5;

/// One external order, as imported from the marketplace report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmazonOrder {
    pub order_id: String,
    pub date: NaiveDate,
    pub total: Money,
    pub currency: String,
}

/// The slice of the ledger eligible for matching: import-sourced,
/// not ignored, expense-signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPoolTransaction {
    pub id: TransactionId,
    pub date: NaiveDate,
    pub amount: Money,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCandidate {
    pub transaction_id: TransactionId,
    pub date: NaiveDate,
    pub day_diff: i64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderMatchStatus {
    Matched,
    Ambiguous,
    Unmatched,
}

/// Candidate metadata attached to an order after a matcher run. An empty
/// candidate list is not a state; absence is its own variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "candidates", rename_all = "snake_case")]
pub enum MatchCandidates {
    NoCandidates,
    Candidates(Vec<OrderCandidate>),
}

impl MatchCandidates {
    fn from_vec(candidates: Vec<OrderCandidate>) -> Self {
        if candidates.is_empty() {
            MatchCandidates::NoCandidates
        } else {
            MatchCandidates::Candidates(candidates)
        }
    }

    pub fn as_slice(&self) -> &[OrderCandidate] {
        match self {
            MatchCandidates::NoCandidates => &[],
            MatchCandidates::Candidates(c) => c,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderMatchResult {
    pub order_id: String,
    pub status: OrderMatchStatus,
    pub matched_transaction_id: Option<TransactionId>,
    /// Full candidate set, kept for manual selection when ambiguous.
    pub candidates: MatchCandidates,
}

pub struct AmazonMatcher {
    window_days: i64,
}

impl Default for AmazonMatcher {
    fn default() -> Self {
        AmazonMatcher {
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

impl AmazonMatcher {
    pub fn new(window_days: i64) -> Self {
        AmazonMatcher { window_days }
    }

    /// Match every order against the pool. `claimed` maps transaction id
    /// to the order id of a previously confirmed match; those
    /// transactions stay off the table unless the asking order is the
    /// one that claimed them, which keeps re-runs idempotent.
    pub fn match_orders(
        &self,
        orders: &[AmazonOrder],
        pool: &[OrderPoolTransaction],
        claimed: &HashMap<TransactionId, String>,
    ) -> Vec<OrderMatchResult> {
        let candidates_per_order: Vec<Vec<OrderCandidate>> = orders
            .iter()
            .map(|order| self.candidates_for(order, pool, claimed))
            .collect();

        // How many orders want each transaction, across this whole run.
        let mut demand: HashMap<TransactionId, usize> = HashMap::new();
        for candidates in &candidates_per_order {
            for c in candidates {
                *demand.entry(c.transaction_id).or_insert(0) += 1;
            }
        }

        orders
            .iter()
            .zip(candidates_per_order)
            .map(|(order, candidates)| {
                let (status, matched_transaction_id) = match candidates.as_slice() {
                    [] => (OrderMatchStatus::Unmatched, None),
                    [only] if demand[&only.transaction_id] == 1 => {
                        (OrderMatchStatus::Matched, Some(only.transaction_id))
                    }
                    _ => (OrderMatchStatus::Ambiguous, None),
                };
                debug!(order = %order.order_id, status = ?status, "order resolved");
                OrderMatchResult {
                    order_id: order.order_id.clone(),
                    status,
                    matched_transaction_id,
                    candidates: MatchCandidates::from_vec(candidates),
                }
            })
            .collect()
    }

    fn candidates_for(
        &self,
        order: &AmazonOrder,
        pool: &[OrderPoolTransaction],
        claimed: &HashMap<TransactionId, String>,
    ) -> Vec<OrderCandidate> {
        pool.iter()
            .filter(|tx| match claimed.get(&tx.id) {
                Some(owner) => *owner == order.order_id,
                None => true,
            })
            .filter(|tx| tx.amount == order.total)
            .filter_map(|tx| {
                let day_diff = (tx.date - order.date).num_days().abs();
                (day_diff <= self.window_days).then(|| OrderCandidate {
                    transaction_id: tx.id,
                    date: tx.date,
                    day_diff,
                    description: tx.description.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn order(id: &str, day: u32, cents: i64) -> AmazonOrder {
        AmazonOrder {
            order_id: id.to_string(),
            date: date(day),
            total: Money::from_cents(cents),
            currency: "USD".to_string(),
        }
    }

    fn pool_tx(id: i64, day: u32, cents: i64) -> OrderPoolTransaction {
        OrderPoolTransaction {
            id: TransactionId(id),
            date: date(day),
            amount: Money::from_cents(cents),
            description: "AMZN Mktp US".to_string(),
        }
    }

    #[test]
    fn unique_candidate_is_matched() {
        let matcher = AmazonMatcher::default();
        let results = matcher.match_orders(
            &[order("o1", 10, 4999)],
            &[pool_tx(1, 12, 4999), pool_tx(2, 12, 1299)],
            &HashMap::new(),
        );
        assert_eq!(results[0].status, OrderMatchStatus::Matched);
        assert_eq!(results[0].matched_transaction_id, Some(TransactionId(1)));
    }

    #[test]
    fn no_candidate_is_unmatched() {
        let matcher = AmazonMatcher::default();
        let results = matcher.match_orders(
            &[order("o1", 10, 4999)],
            &[pool_tx(1, 20, 4999), pool_tx(2, 10, 5000)],
            &HashMap::new(),
        );
        assert_eq!(results[0].status, OrderMatchStatus::Unmatched);
        assert_eq!(results[0].candidates, MatchCandidates::NoCandidates);
    }

    #[test]
    fn multiple_candidates_for_one_order_is_ambiguous() {
        let matcher = AmazonMatcher::default();
        let results = matcher.match_orders(
            &[order("o1", 10, 4999)],
            &[pool_tx(1, 9, 4999), pool_tx(2, 11, 4999)],
            &HashMap::new(),
        );
        assert_eq!(results[0].status, OrderMatchStatus::Ambiguous);
        assert_eq!(results[0].candidates.as_slice().len(), 2);
        assert_eq!(results[0].matched_transaction_id, None);
    }

    #[test]
    fn two_orders_sharing_one_transaction_both_ambiguous() {
        let matcher = AmazonMatcher::default();
        let results = matcher.match_orders(
            &[order("o1", 10, 4999), order("o2", 11, 4999)],
            &[pool_tx(1, 10, 4999)],
            &HashMap::new(),
        );
        for result in &results {
            assert_eq!(result.status, OrderMatchStatus::Ambiguous);
            assert_eq!(result.matched_transaction_id, None);
            let candidates = result.candidates.as_slice();
            assert_eq!(candidates.len(), 1);
            assert_eq!(candidates[0].transaction_id, TransactionId(1));
        }
    }

    #[test]
    fn claimed_transactions_stay_with_their_order() {
        let matcher = AmazonMatcher::default();
        let claimed: HashMap<TransactionId, String> =
            [(TransactionId(1), "o1".to_string())].into_iter().collect();
        // Re-run: o1 keeps its confirmed transaction, o2 cannot poach it.
        let results = matcher.match_orders(
            &[order("o1", 10, 4999), order("o2", 11, 4999)],
            &[pool_tx(1, 10, 4999)],
            &claimed,
        );
        assert_eq!(results[0].status, OrderMatchStatus::Matched);
        assert_eq!(results[0].matched_transaction_id, Some(TransactionId(1)));
        assert_eq!(results[1].status, OrderMatchStatus::Unmatched);
    }

    #[test]
    fn window_is_configurable() {
        let matcher = AmazonMatcher::new(1);
        let results = matcher.match_orders(
            &[order("o1", 10, 4999)],
            &[pool_tx(1, 12, 4999)],
            &HashMap::new(),
        );
        assert_eq!(results[0].status, OrderMatchStatus::Unmatched);

        let wide = AmazonMatcher::new(3);
        let results = wide.match_orders(
            &[order("o1", 10, 4999)],
            &[pool_tx(1, 12, 4999)],
            &HashMap::new(),
        );
        assert_eq!(results[0].status, OrderMatchStatus::Matched);
    }

    #[test]
    fn candidate_metadata_serializes_with_kind_tag() {
        let none = serde_json::to_value(MatchCandidates::NoCandidates).unwrap();
        assert_eq!(none["kind"], "no_candidates");

        let some = MatchCandidates::Candidates(vec![OrderCandidate {
            transaction_id: TransactionId(1),
            date: date(10),
            day_diff: 2,
            description: "AMZN Mktp US".to_string(),
        }]);
        let value = serde_json::to_value(&some).unwrap();
        assert_eq!(value["kind"], "candidates");
        assert_eq!(value["candidates"][0]["day_diff"], 2);

        let back: MatchCandidates = serde_json::from_value(value).unwrap();
        assert_eq!(back, some);
    }

    #[test]
    fn candidate_metadata_carries_day_diff() {
        let matcher = AmazonMatcher::default();
        let results = matcher.match_orders(
            &[order("o1", 10, 4999)],
            &[pool_tx(1, 13, 4999)],
            &HashMap::new(),
        );
        assert_eq!(results[0].candidates.as_slice()[0].day_diff, 3);
    }
}
