use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;
use super::period::PeriodKey;
use super::transaction::{Transaction, TxSource, TxStatus};
use super::account::AccountId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecurringDefinitionId(pub i64);

impl fmt::Display for RecurringDefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a recurring definition lands on the calendar.
///
/// Day-of-month values past the end of a month clamp to the month's last
/// day, so `Monthly { day: 31 }` fires on Feb 29 in a leap year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleRule {
    Monthly { day: u32 },
    Weekly { weekday: Weekday },
    /// Every 14 days on the grid anchored at `anchor`.
    Biweekly { anchor: NaiveDate },
    TwiceMonthly { first: u32, second: u32 },
}

impl ScheduleRule {
    /// All occurrence dates inside `period`, ascending.
    pub fn occurrences_in(&self, period: PeriodKey) -> Vec<NaiveDate> {
        match *self {
            ScheduleRule::Monthly { day } => {
                vec![clamp_to_month(period, day)]
            }
            ScheduleRule::Weekly { weekday } => {
                let mut dates = Vec::new();
                let mut d = period.start_date();
                while d.weekday() != weekday {
                    d = d.succ_opt().unwrap();
                }
                while period.contains(d) {
                    dates.push(d);
                    d = d + chrono::Duration::days(7);
                }
                dates
            }
            ScheduleRule::Biweekly { anchor } => {
                let mut dates = Vec::new();
                let start = period.start_date();
                let offset = (start - anchor).num_days().rem_euclid(14);
                let mut d = if offset == 0 {
                    start
                } else {
                    start + chrono::Duration::days(14 - offset)
                };
                while period.contains(d) {
                    dates.push(d);
                    d = d + chrono::Duration::days(14);
                }
                dates
            }
            ScheduleRule::TwiceMonthly { first, second } => {
                let mut dates = vec![
                    clamp_to_month(period, first.min(second)),
                    clamp_to_month(period, first.max(second)),
                ];
                dates.dedup();
                dates
            }
        }
    }
}

fn clamp_to_month(period: PeriodKey, day: u32) -> NaiveDate {
    let day = day.clamp(1, period.days_in_month());
    NaiveDate::from_ymd_opt(period.year, period.month, day).unwrap()
}

/// A recurring schedule: a bill, subscription, or paycheck.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringDefinition {
    pub id: RecurringDefinitionId,
    /// Match key: must appear (normalized) inside a row's normalized
    /// description for the row to count as an instance.
    pub merchant_label: String,
    pub display_label: String,
    /// Expense-signed nominal amount; negative for income schedules.
    pub nominal_amount: Money,
    pub category: String,
    pub rule: ScheduleRule,
    pub active: bool,
}

impl RecurringDefinition {
    /// Generate this definition's projected placeholder transactions for
    /// one period. Generated at most once per (definition, period); the
    /// storage collaborator enforces that.
    pub fn project(&self, account_id: AccountId, period: PeriodKey) -> Vec<Transaction> {
        self.rule
            .occurrences_in(period)
            .into_iter()
            .map(|date| Transaction {
                id: None,
                account_id,
                period,
                date,
                description: self.display_label.clone(),
                sub_description: None,
                amount: self.nominal_amount,
                category: self.category.clone(),
                status: TxStatus::Projected,
                source: TxSource::Recurring,
                is_ignored: false,
                is_recurring_instance: true,
                recurring_definition_id: Some(self.id),
                external_id: None,
                import_hash: None,
            })
            .collect()
    }
}
