//! Metric Calculator: net flow, mid-period single-period return, and the
//! per-account prefix aggregates (cumulative return, cumulative net flow).
//!
//! Input for one account must already be sorted by `as_of_date`; see
//! [`crate::partition`].

use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use tracing::warn;

use crate::config::Compounding;
use crate::model::{CanonicalRecord, DerivedMetrics};

/// Stop the exponential series once a term drops below this.
const EXP_TOLERANCE: Decimal = dec!(0.000000000000000000001);

/// `contributions - distributions`, nulls read as zero.
pub fn net_flow(record: &CanonicalRecord) -> Decimal {
    record.contributions.unwrap_or_default() - record.distributions.unwrap_or_default()
}

/// Beginning value with half the period's net flow added (mid-period flow assumption).
pub fn adjusted_beginning_market_value(beginning_market_value: Decimal, net_flow: Decimal) -> Decimal {
    beginning_market_value + net_flow / dec!(2)
}

/// Single-period return against the mid-period adjusted base.
/// `None` when the base is zero or negative: there is nothing to measure growth against.
pub fn period_return(
    beginning_market_value: Decimal,
    ending_market_value: Decimal,
    net_flow: Decimal,
) -> Option<Decimal> {
    let base = adjusted_beginning_market_value(beginning_market_value, net_flow);
    if base <= Decimal::ZERO {
        return None;
    }
    (ending_market_value - base).checked_div(base)
}

/// Running compounding state for one account.
///
/// A missing period return contributes a growth factor of 1. A growth factor
/// at or below zero breaks the chain: that period and every later one report
/// `None`.
#[derive(Debug, Clone)]
pub struct CompoundingChain {
    method: Compounding,
    log_sum: Decimal,
    product: Decimal,
    broken: bool,
}

impl CompoundingChain {
    pub fn new(method: Compounding) -> Self {
        Self {
            method,
            log_sum: Decimal::ZERO,
            product: Decimal::ONE,
            broken: false,
        }
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Fold in one period and return the cumulative return through it.
    pub fn push(&mut self, period_return: Option<Decimal>) -> Option<Decimal> {
        if self.broken {
            return None;
        }

        let growth = Decimal::ONE + period_return.unwrap_or_default();
        if growth <= Decimal::ZERO {
            self.broken = true;
            return None;
        }

        let factor = match self.method {
            Compounding::LogSum => growth
                .checked_ln()
                .and_then(|ln| self.log_sum.checked_add(ln))
                .and_then(|sum| {
                    self.log_sum = sum;
                    sum.checked_exp_with_tolerance(EXP_TOLERANCE)
                }),
            Compounding::Direct => self.product.checked_mul(growth).map(|p| {
                self.product = p;
                p
            }),
        };

        match factor {
            Some(f) => Some(f - Decimal::ONE),
            // Out of decimal range: treat like a broken chain.
            None => {
                self.broken = true;
                None
            }
        }
    }
}

/// Cumulative return series for an ordered sequence of period returns.
pub fn cumulative_returns(period_returns: &[Option<Decimal>], method: Compounding) -> Vec<Option<Decimal>> {
    let mut chain = CompoundingChain::new(method);
    period_returns.iter().map(|r| chain.push(*r)).collect()
}

/// Derive metrics for every record of one account, in the given order.
pub fn compute_account_metrics(records: &[CanonicalRecord], method: Compounding) -> Vec<DerivedMetrics> {
    let mut chain = CompoundingChain::new(method);
    let mut cumulative_net_flow = Decimal::ZERO;
    let mut out = Vec::with_capacity(records.len());

    for record in records {
        let flow = net_flow(record);
        let adjusted = adjusted_beginning_market_value(record.beginning_market_value, flow);
        let period = period_return(record.beginning_market_value, record.ending_market_value, flow);

        let was_broken = chain.is_broken();
        let cumulative = chain.push(period);
        if chain.is_broken() && !was_broken {
            warn!(
                account_id = %record.account_id,
                as_of_date = %record.as_of_date,
                period_return = ?period,
                "growth factor not positive; cumulative return undefined from here on"
            );
        }

        cumulative_net_flow += flow;

        let excess_return = match (period, record.benchmark_return) {
            (Some(r), Some(b)) => Some(r - b),
            _ => None,
        };

        out.push(DerivedMetrics {
            net_flow: flow,
            adjusted_beginning_market_value: adjusted,
            period_return: period,
            cumulative_return: cumulative,
            cumulative_net_flow,
            excess_return,
        });
    }

    out
}
