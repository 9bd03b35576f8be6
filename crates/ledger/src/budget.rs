//! Spend-vs-budget summaries.
//!
//! Pure functions over a store snapshot; nothing here touches the database
//! or keeps state, so summaries are recomputed on demand.

use chrono::{DateTime, Datelike, Days, NaiveTime, Utc};
use uuid::Uuid;

use crate::{BudgetPeriod, Category, Transaction};

/// Read-only spend-vs-budget row for one category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BudgetSummary {
    pub category_id: Uuid,
    pub name: String,
    pub period: BudgetPeriod,
    pub limit_minor: Option<i64>,
    /// Total spend in the current period, as a positive number.
    pub spent_minor: i64,
    pub income_minor: i64,
    /// `limit - spent`; `None` for untracked categories.
    pub remaining_minor: Option<i64>,
    pub over_budget: bool,
}

/// Start of the period containing `now`, per the category's reset cadence.
///
/// Weeks start on Monday; months and years on their first day, all in UTC.
fn period_start(period: BudgetPeriod, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let start = match period {
        BudgetPeriod::Weekly => {
            today - Days::new(u64::from(today.weekday().num_days_from_monday()))
        }
        BudgetPeriod::Monthly => today.with_day(1).unwrap_or(today),
        BudgetPeriod::Yearly => today.with_ordinal(1).unwrap_or(today),
    };
    start.and_time(NaiveTime::MIN).and_utc()
}

/// Groups transactions by category over each category's current period and
/// compares the signed sums against the budget limit.
pub fn summarize(
    categories: &[Category],
    transactions: &[Transaction],
    now: DateTime<Utc>,
) -> Vec<BudgetSummary> {
    categories
        .iter()
        .map(|category| {
            let window_start = period_start(category.period, now);

            let mut spent_minor: i64 = 0;
            let mut income_minor: i64 = 0;
            for tx in transactions {
                if tx.category_id != category.id
                    || tx.occurred_at < window_start
                    || tx.occurred_at > now
                {
                    continue;
                }
                if tx.amount_minor < 0 {
                    spent_minor += -tx.amount_minor;
                } else {
                    income_minor += tx.amount_minor;
                }
            }

            let remaining_minor = category.budget_limit_minor.map(|limit| limit - spent_minor);
            let over_budget = category
                .budget_limit_minor
                .is_some_and(|limit| spent_minor > limit);

            BudgetSummary {
                category_id: category.id,
                name: category.name.clone(),
                period: category.period,
                limit_minor: category.budget_limit_minor,
                spent_minor,
                income_minor,
                remaining_minor,
                over_budget,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::Currency;

    fn category(name: &str, limit: Option<i64>, period: BudgetPeriod) -> Category {
        Category::new(name, limit, period, Utc::now()).unwrap()
    }

    fn tx_at(category_id: Uuid, amount_minor: i64, occurred_at: DateTime<Utc>) -> Transaction {
        Transaction::new(
            category_id,
            amount_minor,
            Currency::Usd,
            occurred_at,
            None,
            occurred_at,
        )
        .unwrap()
    }

    #[test]
    fn sums_spend_and_income_separately() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let food = category("food", Some(10_000), BudgetPeriod::Monthly);
        let txs = vec![
            tx_at(food.id, -2_500, now),
            tx_at(food.id, -1_500, now),
            tx_at(food.id, 500, now),
        ];

        let rows = summarize(&[food.clone()], &txs, now);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].spent_minor, 4_000);
        assert_eq!(rows[0].income_minor, 500);
        assert_eq!(rows[0].remaining_minor, Some(6_000));
        assert!(!rows[0].over_budget);
    }

    #[test]
    fn excludes_transactions_outside_the_period() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let previous_month = Utc.with_ymd_and_hms(2026, 2, 27, 12, 0, 0).unwrap();
        let food = category("food", Some(10_000), BudgetPeriod::Monthly);
        let txs = vec![
            tx_at(food.id, -2_000, now),
            tx_at(food.id, -9_000, previous_month),
        ];

        let rows = summarize(&[food], &txs, now);
        assert_eq!(rows[0].spent_minor, 2_000);
    }

    #[test]
    fn flags_over_budget() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let food = category("food", Some(1_000), BudgetPeriod::Monthly);
        let txs = vec![tx_at(food.id, -1_500, now)];

        let rows = summarize(&[food], &txs, now);
        assert!(rows[0].over_budget);
        assert_eq!(rows[0].remaining_minor, Some(-500));
    }

    #[test]
    fn untracked_category_has_no_remaining() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let misc = category("misc", None, BudgetPeriod::Monthly);
        let txs = vec![tx_at(misc.id, -1_500, now)];

        let rows = summarize(&[misc], &txs, now);
        assert_eq!(rows[0].remaining_minor, None);
        assert!(!rows[0].over_budget);
    }

    #[test]
    fn weekly_window_starts_on_monday() {
        // 2026-03-15 is a Sunday; the week started Monday 2026-03-09.
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let sunday_before = Utc.with_ymd_and_hms(2026, 3, 8, 12, 0, 0).unwrap();
        let monday = Utc.with_ymd_and_hms(2026, 3, 9, 8, 0, 0).unwrap();

        let coffee = category("coffee", Some(2_000), BudgetPeriod::Weekly);
        let txs = vec![
            tx_at(coffee.id, -300, monday),
            tx_at(coffee.id, -900, sunday_before),
        ];

        let rows = summarize(&[coffee], &txs, now);
        assert_eq!(rows[0].spent_minor, 300);
    }
}
