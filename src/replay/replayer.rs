//! Deterministic event replayer.

use primitive_types::U256;

use crate::error::{BacktestError, BacktestResult};
use crate::math::fixed_point::{get_amount0_delta, get_amount1_delta, tick_to_sqrt_price_x96};
use crate::pool::position::PositionBook;
use crate::pool::state::PoolState;
use crate::replay::events::{BurnEvent, MintEvent, ReplayEvent, SwapEvent};

/// One recoverable mismatch between the pool's own bookkeeping and an
/// event's reported post-state; recorded, never fatal.
#[derive(Clone, Debug)]
pub struct Discrepancy {
    pub timestamp: i64,
    pub tx_hash: String,
    pub detail: String,
}

#[derive(Default)]
pub struct ReplaySummary {
    pub discrepancies: Vec<Discrepancy>,
    pub strategy_precondition_drops: u64,
}

impl ReplaySummary {
    pub fn discrepancy_count(&self) -> usize {
        self.discrepancies.len()
    }
}

pub struct Replayer {
    pub pool: PoolState,
    pub positions: PositionBook,
    summary: ReplaySummary,
}

impl Replayer {
    pub fn new(pool: PoolState) -> Self {
        Replayer {
            pool,
            positions: PositionBook::new(),
            summary: ReplaySummary::default(),
        }
    }

    pub fn summary(&self) -> &ReplaySummary {
        &self.summary
    }

    fn record(&mut self, timestamp: i64, tx_hash: &str, detail: impl Into<String>) {
        let detail = detail.into();
        log::warn!("discrepancy at ts={timestamp} tx={tx_hash}: {detail}");
        self.summary.discrepancies.push(Discrepancy {
            timestamp,
            tx_hash: tx_hash.to_string(),
            detail,
        });
    }

    /// Records a strategy-requested action dropped for a precondition the
    /// driver could not satisfy (insufficient liquidity, identical range,
    /// ...): the action is not executed, the run continues, and this counter
    /// is the only trace of it besides the log line.
    pub fn record_strategy_precondition_drop(&mut self, timestamp: i64, detail: impl Into<String>) {
        let detail = detail.into();
        log::warn!("strategy precondition dropped at ts={timestamp}: {detail}");
        self.summary.strategy_precondition_drops += 1;
    }

    /// Applies one event. Only `BacktestError::NumericalOverflow` escapes as
    /// `Err`; every other failure is reported into the discrepancy ledger
    /// and the run continues.
    pub fn apply(&mut self, event: &ReplayEvent) -> BacktestResult<()> {
        match event {
            ReplayEvent::Mint(m) => self.apply_mint(m),
            ReplayEvent::Burn(b) => self.apply_burn(b),
            ReplayEvent::Swap(s) => self.apply_swap(s),
        }
    }

    fn apply_mint(&mut self, m: &MintEvent) -> BacktestResult<()> {
        if let Ok((sa, sb)) = pre_mint_sqrt_prices(m.tick_lower, m.tick_upper) {
            if let (Ok(implied0), Ok(implied1)) = (
                get_amount0_delta(sa, sb, m.liquidity, false),
                get_amount1_delta(sa, sb, m.liquidity, false),
            ) {
                if !within_epsilon(implied0, m.amount0) || !within_epsilon(implied1, m.amount1) {
                    self.record(
                        m.meta.block_timestamp,
                        &m.meta.transaction_hash,
                        format!(
                            "mint amounts ({}, {}) disagree with implied ({implied0}, {implied1})",
                            m.amount0, m.amount1
                        ),
                    );
                }
            }
        }

        match self
            .positions
            .mint(&mut self.pool, &m.owner, m.liquidity, m.tick_lower, m.tick_upper)
        {
            Ok(()) => Ok(()),
            Err(BacktestError::NumericalOverflow { op, timestamp, detail }) => {
                Err(BacktestError::NumericalOverflow {
                    op,
                    timestamp: timestamp.or(Some(m.meta.block_timestamp)),
                    detail,
                })
            }
            Err(e) => {
                self.record(m.meta.block_timestamp, &m.meta.transaction_hash, e.to_string());
                Ok(())
            }
        }
    }

    fn apply_burn(&mut self, b: &BurnEvent) -> BacktestResult<()> {
        match self
            .positions
            .burn(&mut self.pool, &b.owner, b.liquidity, b.tick_lower, b.tick_upper)
        {
            Ok(()) => Ok(()),
            Err(BacktestError::NumericalOverflow { op, timestamp, detail }) => {
                Err(BacktestError::NumericalOverflow {
                    op,
                    timestamp: timestamp.or(Some(b.meta.block_timestamp)),
                    detail,
                })
            }
            Err(e) => {
                self.record(b.meta.block_timestamp, &b.meta.transaction_hash, e.to_string());
                Ok(())
            }
        }
    }

    fn apply_swap(&mut self, s: &SwapEvent) -> BacktestResult<()> {
        if s.amount0 == 0 && s.amount1 == 0 {
            // zero-amount swaps are no-ops.
            return Ok(());
        }
        if s.amount0.signum() == s.amount1.signum() && s.amount0 != 0 && s.amount1 != 0 {
            self.record(
                s.meta.block_timestamp,
                &s.meta.transaction_hash,
                format!(
                    "swap amounts ({}, {}) do not have opposite signs",
                    s.amount0, s.amount1
                ),
            );
        }

        let estimated_liquidity =
            self.pool
                .apply_swap(s.amount0, s.amount1, s.sqrt_price_x96, s.tick, s.liquidity);

        if estimated_liquidity.abs_diff(s.liquidity) > 1 {
            self.record(
                s.meta.block_timestamp,
                &s.meta.transaction_hash,
                format!(
                    "pool-estimated liquidity {estimated_liquidity} disagrees with reported {}",
                    s.liquidity
                ),
            );
        }
        Ok(())
    }
}

fn pre_mint_sqrt_prices(tick_lower: i32, tick_upper: i32) -> BacktestResult<(U256, U256)> {
    tick_to_sqrt_price_x96(tick_lower)
        .and_then(|sa| tick_to_sqrt_price_x96(tick_upper).map(|sb| (sa, sb)))
}

fn within_epsilon(implied: U256, reported: U256) -> bool {
    let diff = if implied > reported {
        implied - reported
    } else {
        reported - implied
    };
    diff <= U256::one()
}
