//! Position book.

use std::collections::HashMap;

use primitive_types::U256;

use crate::error::{BacktestError, BacktestResult};
use crate::math::fixed_point::u256_to_u128;
use crate::pool::state::{PoolState, Tick, TickState};

#[derive(Clone, Debug)]
pub struct Position {
    pub liquidity: u128,
    pub fee_growth_inside_0_last: U256,
    pub fee_growth_inside_1_last: U256,
    pub tokens_owed_0: u128,
    pub tokens_owed_1: u128,
}

impl Position {
    fn fresh(pool: &PoolState, tick_lower: Tick, tick_upper: Tick) -> Self {
        let (inside0, inside1) = fee_growth_inside(pool, tick_lower, tick_upper);
        Position {
            liquidity: 0,
            fee_growth_inside_0_last: inside0,
            fee_growth_inside_1_last: inside1,
            tokens_owed_0: 0,
            tokens_owed_1: 0,
        }
    }
}

/// Keyed by `(owner, tickLower, tickUpper)`.
#[derive(Clone, Debug, Default)]
pub struct PositionBook {
    positions: HashMap<(String, Tick, Tick), Position>,
}

fn get_outside(pool: &PoolState, tick: Tick) -> (U256, U256) {
    match pool.ticks.get(&tick) {
        Some(s) => (s.fee_growth_outside_0, s.fee_growth_outside_1),
        None => (U256::zero(), U256::zero()),
    }
}

/// Fee-growth-inside formula, computed with wrapping
/// subtraction (Q128 accumulators are allowed to wrap, matching the V3
/// accounting convention; only the difference between two snapshots is
/// ever meaningful).
pub fn fee_growth_inside(pool: &PoolState, tick_lower: Tick, tick_upper: Tick) -> (U256, U256) {
    let (outside0_lower, outside1_lower) = get_outside(pool, tick_lower);
    let (outside0_upper, outside1_upper) = get_outside(pool, tick_upper);

    let below0 = if pool.tick >= tick_lower {
        outside0_lower
    } else {
        pool.fee_growth_global_0.overflowing_sub(outside0_lower).0
    };
    let below1 = if pool.tick >= tick_lower {
        outside1_lower
    } else {
        pool.fee_growth_global_1.overflowing_sub(outside1_lower).0
    };

    let above0 = if pool.tick < tick_upper {
        outside0_upper
    } else {
        pool.fee_growth_global_0.overflowing_sub(outside0_upper).0
    };
    let above1 = if pool.tick < tick_upper {
        outside1_upper
    } else {
        pool.fee_growth_global_1.overflowing_sub(outside1_upper).0
    };

    let inside0 = pool
        .fee_growth_global_0
        .overflowing_sub(below0)
        .0
        .overflowing_sub(above0)
        .0;
    let inside1 = pool
        .fee_growth_global_1
        .overflowing_sub(below1)
        .0
        .overflowing_sub(above1)
        .0;
    (inside0, inside1)
}

/// Initializes a tick on first touch with `feeGrowthOutside = feeGrowthGlobal`
/// when the tick is at or below the current price, zero otherwise (the
/// standard V3 initialization rule) — a no-op if the tick is already
/// initialized.
fn ensure_tick_initialized(pool: &mut PoolState, tick: Tick) {
    let current_tick = pool.tick;
    let fg0 = pool.fee_growth_global_0;
    let fg1 = pool.fee_growth_global_1;
    let entry = pool.ticks.entry(tick).or_insert_with(TickState::default);
    if !entry.initialized {
        if tick <= current_tick {
            entry.fee_growth_outside_0 = fg0;
            entry.fee_growth_outside_1 = fg1;
        }
        entry.initialized = true;
    }
}

fn settle(position: &mut Position, pool: &PoolState, tick_lower: Tick, tick_upper: Tick) -> BacktestResult<()> {
    let (inside0, inside1) = fee_growth_inside(pool, tick_lower, tick_upper);
    if position.liquidity > 0 {
        let delta0 = inside0.overflowing_sub(position.fee_growth_inside_0_last).0;
        let delta1 = inside1.overflowing_sub(position.fee_growth_inside_1_last).0;
        let owed0 = u256_to_u128(
            U256::from(position.liquidity).saturating_mul(delta0) >> 128,
            "settle",
        )?;
        let owed1 = u256_to_u128(
            U256::from(position.liquidity).saturating_mul(delta1) >> 128,
            "settle",
        )?;
        position.tokens_owed_0 = position.tokens_owed_0.saturating_add(owed0);
        position.tokens_owed_1 = position.tokens_owed_1.saturating_add(owed1);
    }
    position.fee_growth_inside_0_last = inside0;
    position.fee_growth_inside_1_last = inside1;
    Ok(())
}

fn invariant(detail: impl Into<String>) -> BacktestError {
    BacktestError::InvariantViolation {
        timestamp: 0,
        tx_hash: String::new(),
        detail: detail.into(),
    }
}

fn overflow(op: &'static str, detail: impl Into<String>) -> BacktestError {
    BacktestError::NumericalOverflow {
        op,
        timestamp: None,
        detail: detail.into(),
    }
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, owner: &str, tick_lower: Tick, tick_upper: Tick) -> Option<&Position> {
        self.positions.get(&(owner.to_string(), tick_lower, tick_upper))
    }

    /// `mint`: rejects zero liquidity and inverted ranges. Settles any existing accrual before adding liquidity.
    pub fn mint(
        &mut self,
        pool: &mut PoolState,
        owner: &str,
        liquidity: u128,
        tick_lower: Tick,
        tick_upper: Tick,
    ) -> BacktestResult<()> {
        if liquidity == 0 {
            return Err(BacktestError::StrategyPrecondition {
                timestamp: 0,
                detail: "cannot mint zero liquidity".to_string(),
            });
        }
        if tick_lower >= tick_upper {
            return Err(BacktestError::InputShape {
                line: 0,
                reason: format!("tickLower {tick_lower} >= tickUpper {tick_upper}"),
            });
        }

        // Tick initialization must happen before the fresh-position inside-growth
        // snapshot is taken, so a brand-new position's baseline already reflects
        // the tick's just-established feeGrowthOutside.
        ensure_tick_initialized(pool, tick_lower);
        ensure_tick_initialized(pool, tick_upper);

        let key = (owner.to_string(), tick_lower, tick_upper);
        let position = self
            .positions
            .entry(key)
            .or_insert_with(|| Position::fresh(pool, tick_lower, tick_upper));
        settle(position, pool, tick_lower, tick_upper)?;

        {
            let lower = pool.ticks.get_mut(&tick_lower).expect("just initialized");
            lower.liquidity_net = lower
                .liquidity_net
                .checked_add(liquidity as i128)
                .ok_or_else(|| overflow("mint", "liquidityNet overflow at tickLower"))?;
        }
        {
            let upper = pool.ticks.get_mut(&tick_upper).expect("just initialized");
            upper.liquidity_net = upper
                .liquidity_net
                .checked_sub(liquidity as i128)
                .ok_or_else(|| overflow("mint", "liquidityNet underflow at tickUpper"))?;
        }

        if tick_lower <= pool.tick && pool.tick < tick_upper {
            pool.liquidity = pool
                .liquidity
                .checked_add(liquidity)
                .ok_or_else(|| overflow("mint", "pool.liquidity overflow"))?;
        }

        position.liquidity = position
            .liquidity
            .checked_add(liquidity)
            .ok_or_else(|| overflow("mint", "position.liquidity overflow"))?;
        Ok(())
    }

    /// `burn`: reported-and-skipped by the replayer on failure; this function itself just returns the error.
    pub fn burn(
        &mut self,
        pool: &mut PoolState,
        owner: &str,
        liquidity: u128,
        tick_lower: Tick,
        tick_upper: Tick,
    ) -> BacktestResult<()> {
        if liquidity == 0 {
            return Ok(());
        }
        let key = (owner.to_string(), tick_lower, tick_upper);
        let position = self.positions.get_mut(&key).ok_or_else(|| {
            invariant(format!(
                "burn of unknown position owner={owner} range=[{tick_lower},{tick_upper})"
            ))
        })?;
        if liquidity > position.liquidity {
            return Err(invariant(format!(
                "burn {liquidity} exceeds position liquidity {}",
                position.liquidity
            )));
        }
        if !pool.ticks.contains_key(&tick_lower) || !pool.ticks.contains_key(&tick_upper) {
            return Err(invariant("burn references uninitialized tick"));
        }

        settle(position, pool, tick_lower, tick_upper)?;
        position.liquidity -= liquidity;

        {
            let lower = pool.ticks.get_mut(&tick_lower).expect("checked above");
            lower.liquidity_net = lower
                .liquidity_net
                .checked_sub(liquidity as i128)
                .ok_or_else(|| overflow("burn", "liquidityNet underflow at tickLower"))?;
        }
        {
            let upper = pool.ticks.get_mut(&tick_upper).expect("checked above");
            upper.liquidity_net = upper
                .liquidity_net
                .checked_add(liquidity as i128)
                .ok_or_else(|| overflow("burn", "liquidityNet overflow at tickUpper"))?;
        }

        if tick_lower <= pool.tick && pool.tick < tick_upper {
            pool.liquidity = pool.liquidity.saturating_sub(liquidity);
        }
        Ok(())
    }

    /// `collect`: settles outstanding accrual, then hands back and zeroes
    /// `tokensOwed`. A position that was never minted collects zero.
    pub fn collect(
        &mut self,
        pool: &PoolState,
        owner: &str,
        tick_lower: Tick,
        tick_upper: Tick,
    ) -> BacktestResult<(u128, u128)> {
        let key = (owner.to_string(), tick_lower, tick_upper);
        let Some(position) = self.positions.get_mut(&key) else {
            return Ok((0, 0));
        };
        settle(position, pool, tick_lower, tick_upper)?;
        let owed = (position.tokens_owed_0, position.tokens_owed_1);
        position.tokens_owed_0 = 0;
        position.tokens_owed_1 = 0;
        Ok(owed)
    }
}
