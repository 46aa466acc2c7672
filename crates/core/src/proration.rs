//! Allowance proration at grant time.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

/// Prorate an annual allowance by the fraction of the allocation period that
/// remains at `at`.
///
/// Day counts are inclusive of both endpoints: a grant on the period's start
/// date receives the full amount, and a grant on its final day receives one
/// day's worth. The result is truncated to two decimal places and never
/// negative. Grants dated before the period start are treated as starting on
/// the start date.
pub fn prorated_allocation_amount(
    amount: Decimal,
    at: NaiveDate,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> Decimal {
    if at > period_end {
        return Decimal::new(0, 2);
    }
    let effective = at.max(period_start);
    let days_left = Decimal::from((period_end - effective).num_days() + 1);
    let total_days = Decimal::from((period_end - period_start).num_days() + 1);
    let mut prorated =
        (amount * days_left / total_days).round_dp_with_strategy(2, RoundingStrategy::ToZero);
    prorated.rescale(2);
    prorated
}
