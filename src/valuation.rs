//! Position and portfolio valuation.
//!
//! Converts a position's `(liquidity, tickLower, tickUpper)` plus the
//! current `sqrtPriceX96` into `(amount0, amount1)`, then into a single
//! quote-denominated (token1) value. Also reports impermanent loss against
//! a HODL baseline fixed at a strategy's initial split.

use primitive_types::U256;

use crate::error::BacktestResult;
use crate::math::fixed_point::{
    get_amount0_delta, get_amount1_delta, price_from_sqrt_price_x96, tick_to_sqrt_price_x96,
    u256_to_f64,
};
use crate::pool::state::Tick;

/// The three-case split: below range, inside range, above range.
pub fn position_amounts(
    sqrt_price_x96: U256,
    tick_lower: Tick,
    tick_upper: Tick,
    liquidity: u128,
) -> BacktestResult<(U256, U256)> {
    let sl = tick_to_sqrt_price_x96(tick_lower)?;
    let su = tick_to_sqrt_price_x96(tick_upper)?;

    if sqrt_price_x96 <= sl {
        Ok((get_amount0_delta(sl, su, liquidity, false)?, U256::zero()))
    } else if sqrt_price_x96 < su {
        let amount0 = get_amount0_delta(sqrt_price_x96, su, liquidity, false)?;
        let amount1 = get_amount1_delta(sl, sqrt_price_x96, liquidity, false)?;
        Ok((amount0, amount1))
    } else {
        Ok((U256::zero(), get_amount1_delta(sl, su, liquidity, false)?))
    }
}

/// `quote value = amount1 + amount0 * price(s)`, token1 units of account.
pub fn quote_value(amount0: U256, amount1: U256, sqrt_price_x96: U256) -> f64 {
    let price = price_from_sqrt_price_x96(sqrt_price_x96);
    u256_to_f64(amount1) + u256_to_f64(amount0) * price
}

/// One range's contribution to portfolio value: on-book amounts plus any
/// uncollected `tokensOwed`, revalued at the current price.
pub fn position_value(
    sqrt_price_x96: U256,
    tick_lower: Tick,
    tick_upper: Tick,
    liquidity: u128,
    tokens_owed_0: u128,
    tokens_owed_1: u128,
) -> BacktestResult<f64> {
    let (amount0, amount1) = position_amounts(sqrt_price_x96, tick_lower, tick_upper, liquidity)?;
    let total0 = amount0 + U256::from(tokens_owed_0);
    let total1 = amount1 + U256::from(tokens_owed_1);
    Ok(quote_value(total0, total1, sqrt_price_x96))
}

/// The fixed baseline for impermanent-loss reporting: a strategy's initial
/// `(amount0, amount1)` revalued at the *current* price, never rebalanced.
#[derive(Clone, Copy, Debug)]
pub struct HodlBaseline {
    pub initial_amount0: U256,
    pub initial_amount1: U256,
}

impl HodlBaseline {
    pub fn new(initial_amount0: U256, initial_amount1: U256) -> Self {
        HodlBaseline {
            initial_amount0,
            initial_amount1,
        }
    }

    pub fn value_at(&self, sqrt_price_x96: U256) -> f64 {
        quote_value(self.initial_amount0, self.initial_amount1, sqrt_price_x96)
    }
}

/// `(LP_value_excluding_fees - HODL_value) / HODL_value`.
/// `lp_value_excluding_fees` must already exclude accrued/collected fees —
/// callers pass the on-book amount-only valuation, not the fee-inclusive
/// portfolio value.
pub fn impermanent_loss(lp_value_excluding_fees: f64, hodl: &HodlBaseline, sqrt_price_x96: U256) -> f64 {
    let hodl_value = hodl.value_at(sqrt_price_x96);
    if hodl_value <= 0.0 {
        return 0.0;
    }
    (lp_value_excluding_fees - hodl_value) / hodl_value
}
