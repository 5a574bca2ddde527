//! Pool state.

use std::collections::BTreeMap;

use primitive_types::U256;

use crate::error::{BacktestError, BacktestResult};
use crate::math::fixed_point::q128;

pub type Tick = i32;

/// Per-initialized-tick bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct TickState {
    /// Net change to active liquidity when crossed left-to-right.
    pub liquidity_net: i128,
    pub fee_growth_outside_0: U256,
    pub fee_growth_outside_1: U256,
    pub initialized: bool,
}

/// Direction a swap moved the pool, used to decide which ticks were
/// crossed and in which order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CrossDirection {
    /// Price moved down (token0 was the input leg).
    Down,
    /// Price moved up (token1 was the input leg).
    Up,
}

#[derive(Clone, Debug)]
pub struct PoolState {
    pub sqrt_price_x96: U256,
    pub tick: Tick,
    pub liquidity: u128,
    pub fee_growth_global_0: U256,
    pub fee_growth_global_1: U256,
    pub fee_tier: u32,
    pub tick_spacing: u32,
    pub ticks: BTreeMap<Tick, TickState>,
    /// (numerator, denominator-shift) for protocol fee; zero by default.
    pub protocol_fee_numerator: (u8, u8),
    initialized: bool,
}

impl PoolState {
    pub fn uninitialized() -> Self {
        PoolState {
            sqrt_price_x96: U256::zero(),
            tick: 0,
            liquidity: 0,
            fee_growth_global_0: U256::zero(),
            fee_growth_global_1: U256::zero(),
            fee_tier: 0,
            tick_spacing: 0,
            ticks: BTreeMap::new(),
            protocol_fee_numerator: (0, 0),
            initialized: false,
        }
    }

    /// Idempotent if called with identical arguments; fails otherwise.
    pub fn initialize(
        &mut self,
        sqrt_price_x96: U256,
        tick: Tick,
        fee_tier: u32,
        tick_spacing: u32,
    ) -> BacktestResult<()> {
        if self.initialized {
            if self.sqrt_price_x96 == sqrt_price_x96
                && self.fee_tier == fee_tier
                && self.tick_spacing == tick_spacing
            {
                return Ok(());
            }
            return Err(BacktestError::InvariantViolation {
                timestamp: 0,
                tx_hash: String::new(),
                detail: format!(
                    "pool already initialized with fee_tier={} tick_spacing={}, \
                     re-initialize requested fee_tier={} tick_spacing={}",
                    self.fee_tier, self.tick_spacing, fee_tier, tick_spacing
                ),
            });
        }
        self.sqrt_price_x96 = sqrt_price_x96;
        self.tick = tick;
        self.fee_tier = fee_tier;
        self.tick_spacing = tick_spacing;
        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn tick_state_mut(&mut self, tick: Tick) -> &mut TickState {
        self.ticks.entry(tick).or_default()
    }

    /// `cross_tick`: flips `feeGrowthOutside` relative to the (already
    /// updated) global accumulators and applies the signed liquidity delta
    /// for the crossing direction.
    pub fn cross_tick(&mut self, tick: Tick, direction: CrossDirection) {
        let fg0 = self.fee_growth_global_0;
        let fg1 = self.fee_growth_global_1;
        let net = {
            let state = self.tick_state_mut(tick);
            state.fee_growth_outside_0 = fg0.overflowing_sub(state.fee_growth_outside_0).0;
            state.fee_growth_outside_1 = fg1.overflowing_sub(state.fee_growth_outside_1).0;
            state.liquidity_net
        };
        // Moving down (zero-for-one): liquidity -= liquidityNet.
        // Moving up (one-for-zero): liquidity += liquidityNet.
        let signed_delta = match direction {
            CrossDirection::Down => -net,
            CrossDirection::Up => net,
        };
        self.liquidity = apply_signed(self.liquidity, signed_delta);
    }

    /// Applies the fee attributable to a swap's input leg to the global
    /// accumulators, then crosses every initialized tick strictly between
    /// the pre- and post-swap tick in the direction of travel, and finally
    /// adopts the event's reported post-state verbatim.
    ///
    /// Returns the pool's own tick-crossing liquidity estimate so the
    /// replayer can compare it against the event's reported
    /// `liquidity_after` and flag a discrepancy without halting
    /// (`InvariantViolation`).
    #[allow(clippy::too_many_arguments)]
    pub fn apply_swap(
        &mut self,
        amount0_delta: i128,
        amount1_delta: i128,
        sqrt_price_x96_after: U256,
        tick_after: Tick,
        liquidity_after: u128,
    ) -> u128 {
        let liquidity_before = self.liquidity;
        let token0_is_input = amount0_delta > 0;
        let gross_in: u128 = if token0_is_input {
            amount0_delta.unsigned_abs()
        } else {
            amount1_delta.unsigned_abs()
        };

        if liquidity_before > 0 && gross_in > 0 {
            let fee = gross_in.saturating_mul(self.fee_tier as u128) / 1_000_000u128;
            if fee > 0 {
                let delta =
                    U256::from(fee).saturating_mul(q128()) / U256::from(liquidity_before);
                if token0_is_input {
                    self.fee_growth_global_0 = self.fee_growth_global_0.saturating_add(delta);
                } else {
                    self.fee_growth_global_1 = self.fee_growth_global_1.saturating_add(delta);
                }
            }
        }
        // else: no active liquidity to credit, fee is dropped.

        let old_tick = self.tick;
        let mut estimated_liquidity = liquidity_before;
        if token0_is_input {
            // price moved down: cross every initialized tick in (tick_after, old_tick]
            // from the top down.
            let crossed: Vec<Tick> = self
                .ticks
                .range((tick_after + 1)..=old_tick)
                .map(|(t, _)| *t)
                .rev()
                .collect();
            for t in crossed {
                let net = self.ticks.get(&t).map(|s| s.liquidity_net).unwrap_or(0);
                self.cross_tick(t, CrossDirection::Down);
                estimated_liquidity = apply_signed(estimated_liquidity, -net);
            }
        } else {
            // price moved up: cross every initialized tick in (old_tick, tick_after]
            // from the bottom up.
            let crossed: Vec<Tick> = self
                .ticks
                .range((old_tick + 1)..=tick_after)
                .map(|(t, _)| *t)
                .collect();
            for t in crossed {
                let net = self.ticks.get(&t).map(|s| s.liquidity_net).unwrap_or(0);
                self.cross_tick(t, CrossDirection::Up);
                estimated_liquidity = apply_signed(estimated_liquidity, net);
            }
        }

        self.sqrt_price_x96 = sqrt_price_x96_after;
        self.tick = tick_after;
        self.liquidity = liquidity_after;

        estimated_liquidity
    }
}

fn apply_signed(base: u128, delta: i128) -> u128 {
    if delta >= 0 {
        base.saturating_add(delta as u128)
    } else {
        base.saturating_sub(delta.unsigned_abs())
    }
}
