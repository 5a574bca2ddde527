//! Fixed-point math.
//!
//! Canonical V3 sqrt-price/tick conversion table and amount-from-liquidity
//! formulas, ported from this module's `BigInt`-based implementation to
//! `U256` so that exceeding 256 bits of intermediate precision is a checked,
//! reportable condition rather than
//! silently absorbed by an arbitrary-precision type.
//!
//! Precision contract: every sqrt-price value used by a
//! caller must originate from either `tick_to_sqrt_price_x96` or the
//! authoritative `sqrt_price_x96` field of the current pool state. No call
//! site may reconstruct a sqrt-price from a display-unit price.

use primitive_types::U256;

use crate::error::{BacktestError, BacktestResult};

pub const MIN_TICK: i32 = -887_272;
pub const MAX_TICK: i32 = 887_272;

/// 2^96, the Q96 fixed-point scale for sqrt-price.
pub fn q96() -> U256 {
    U256::one() << 96
}

/// 2^128, the Q128 fixed-point scale for fee-growth accumulators.
pub fn q128() -> U256 {
    U256::one() << 128
}

fn overflow(op: &'static str, detail: impl Into<String>) -> BacktestError {
    BacktestError::NumericalOverflow {
        op,
        timestamp: None,
        detail: detail.into(),
    }
}

fn checked_mul(a: U256, b: U256, op: &'static str) -> BacktestResult<U256> {
    a.checked_mul(b)
        .ok_or_else(|| overflow(op, format!("{a} * {b} exceeds 256 bits")))
}

fn checked_add(a: U256, b: U256, op: &'static str) -> BacktestResult<U256> {
    a.checked_add(b)
        .ok_or_else(|| overflow(op, format!("{a} + {b} exceeds 256 bits")))
}

/// Parses a big-endian hex literal (no `0x` prefix) into a `U256` without
/// depending on a particular `FromStr`/`from_str_radix` parsing convention.
fn hex_u256(hex: &str) -> U256 {
    let mut bytes = [0u8; 32];
    let digits: Vec<u8> = hex
        .as_bytes()
        .iter()
        .map(|&c| match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            b'A'..=b'F' => c - b'A' + 10,
            _ => panic!("invalid hex digit in constant"),
        })
        .collect();
    let nibbles = digits.len();
    for (i, d) in digits.iter().enumerate() {
        let nibble_index_from_end = nibbles - 1 - i;
        let byte_index_from_end = nibble_index_from_end / 2;
        let byte_index = 31 - byte_index_from_end;
        if nibble_index_from_end % 2 == 0 {
            bytes[byte_index] |= d;
        } else {
            bytes[byte_index] |= d << 4;
        }
    }
    U256::from_big_endian(&bytes)
}

fn ceil_div(numerator: U256, denominator: U256, op: &'static str) -> BacktestResult<U256> {
    if denominator.is_zero() {
        return Err(overflow(op, "division by zero"));
    }
    if numerator.is_zero() {
        return Ok(U256::zero());
    }
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.is_zero() {
        Ok(quotient)
    } else {
        checked_add(quotient, U256::one(), op)
    }
}

/// `tick_to_sqrt_price_x96`: exact `TickMath.getSqrtRatioAtTick`, ported
/// constant-for-constant from this module's implementation.
pub fn tick_to_sqrt_price_x96(tick: i32) -> BacktestResult<U256> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(overflow(
            "tick_to_sqrt_price_x96",
            format!("tick {tick} out of representable range"),
        ));
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio: U256 = if abs_tick & 0x1 != 0 {
        hex_u256("fffcb933bd6fad37aa2d162d1a594001")
    } else {
        U256::one() << 128
    };

    macro_rules! step {
        ($hex:literal, $mask:expr) => {
            if abs_tick & $mask != 0 {
                let c = hex_u256($hex);
                ratio = (checked_mul(ratio, c, "tick_to_sqrt_price_x96")?) >> 128;
            }
        };
    }

    step!("fff97272373d413259a46990580e213a", 0x2);
    step!("fff2e50f5f656932ef12357cf3c7fdcc", 0x4);
    step!("ffe5caca7e10e4e61c3624eaa0941cd0", 0x8);
    step!("ffcb9843d60f6159c9db58835c926644", 0x10);
    step!("ff973b41fa98c081472e6896dfb254c0", 0x20);
    step!("ff2ea16466c96a3843ec78b326b52861", 0x40);
    step!("fe5dee046a99a2a811c461f1969c3053", 0x80);
    step!("fcbe86c7900a88aedcffc83b479aa3a4", 0x100);
    step!("f987a7253ac413176f2b074cf7815e54", 0x200);
    step!("f3392b0822b70005940c7a398e4b70f3", 0x400);
    step!("e7159475a2c29b7443b29c7fa6e889d9", 0x800);
    step!("d097f3bdfd2022b8845ad8f792aa5825", 0x1000);
    step!("a9f746462d870fdf8a65dc1f90e061e5", 0x2000);
    step!("70d869a156d2a1b890bb3df62baf32f7", 0x4000);
    step!("31be135f97d08fd981231505542fcfa6", 0x8000);
    step!("09aa508b5b7a84e1c677de54f3e99bc9", 0x10000);
    step!("05d6af8dedb81196699c329225ee604", 0x20000);
    step!("01dcdc6f2d7c3395a2ed4f8b7feaf38", 0x40000);
    step!("48a170391f7dc42444e8fa2", 0x80000);

    if tick > 0 {
        ratio = U256::max_value() / ratio;
    }
    // round-up shift by 32: Q128.128 -> Q64.96
    let rounding = (U256::one() << 32) - U256::one();
    Ok(checked_add(ratio, rounding, "tick_to_sqrt_price_x96")? >> 32)
}

/// `sqrt_price_x96_to_tick`: exact inverse via binary search on the
/// monotonic ladder above. Invariant:
/// `tick_to_sqrt_price_x96(T) <= S < tick_to_sqrt_price_x96(T+1)`.
pub fn sqrt_price_x96_to_tick(sqrt_price_x96: U256) -> BacktestResult<i32> {
    let mut lo = MIN_TICK;
    let mut hi = MAX_TICK;
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if tick_to_sqrt_price_x96(mid)? <= sqrt_price_x96 {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Ok(lo)
}

/// `get_amount0_delta`: `L * (sqrtB - sqrtA) * 2^96 / (sqrtA * sqrtB)`.
pub fn get_amount0_delta(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> BacktestResult<U256> {
    if liquidity == 0 {
        return Ok(U256::zero());
    }
    let (sa, sb) = if sqrt_ratio_a_x96 < sqrt_ratio_b_x96 {
        (sqrt_ratio_a_x96, sqrt_ratio_b_x96)
    } else {
        (sqrt_ratio_b_x96, sqrt_ratio_a_x96)
    };
    if sa.is_zero() || sa == sb {
        return Ok(U256::zero());
    }

    let l = U256::from(liquidity);
    let numerator1 = checked_mul(l, q96(), "get_amount0_delta")?;
    let numerator2 = sb - sa;

    if round_up {
        let t = ceil_div(
            checked_mul(numerator1, numerator2, "get_amount0_delta")?,
            sb,
            "get_amount0_delta",
        )?;
        ceil_div(t, sa, "get_amount0_delta")
    } else {
        Ok(checked_mul(numerator1, numerator2, "get_amount0_delta")? / sb / sa)
    }
}

/// `get_amount1_delta`: `L * (sqrtB - sqrtA) / 2^96`.
pub fn get_amount1_delta(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> BacktestResult<U256> {
    if liquidity == 0 {
        return Ok(U256::zero());
    }
    let (sa, sb) = if sqrt_ratio_a_x96 < sqrt_ratio_b_x96 {
        (sqrt_ratio_a_x96, sqrt_ratio_b_x96)
    } else {
        (sqrt_ratio_b_x96, sqrt_ratio_a_x96)
    };
    if sa == sb {
        return Ok(U256::zero());
    }

    let l = U256::from(liquidity);
    let num = checked_mul(l, sb - sa, "get_amount1_delta")?;
    if round_up {
        ceil_div(num, q96(), "get_amount1_delta")
    } else {
        Ok(num / q96())
    }
}

/// `get_liquidity_for_amounts`: mint sizing across the three V3 cases
/// (current price below / inside / above the range). When both amounts are
/// supplied the binding minimum across the two tokens is returned.
pub fn get_liquidity_for_amounts(
    sqrt_price_x96: U256,
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    amount0: U256,
    amount1: U256,
) -> BacktestResult<u128> {
    let (sa, sb) = if sqrt_ratio_a_x96 < sqrt_ratio_b_x96 {
        (sqrt_ratio_a_x96, sqrt_ratio_b_x96)
    } else {
        (sqrt_ratio_b_x96, sqrt_ratio_a_x96)
    };

    let liquidity = if sqrt_price_x96 <= sa {
        liquidity_for_amount0(sa, sb, amount0)?
    } else if sqrt_price_x96 < sb {
        let l0 = liquidity_for_amount0(sqrt_price_x96, sb, amount0)?;
        let l1 = liquidity_for_amount1(sa, sqrt_price_x96, amount1)?;
        l0.min(l1)
    } else {
        liquidity_for_amount1(sa, sb, amount1)?
    };

    u256_to_u128(liquidity, "get_liquidity_for_amounts")
}

fn liquidity_for_amount0(sa: U256, sb: U256, amount0: U256) -> BacktestResult<U256> {
    if sa.is_zero() || sa == sb {
        return Ok(U256::zero());
    }
    let intermediate = checked_mul(sa, sb, "get_liquidity_for_amounts")? / q96();
    Ok(checked_mul(amount0, intermediate, "get_liquidity_for_amounts")? / (sb - sa))
}

fn liquidity_for_amount1(sa: U256, sb: U256, amount1: U256) -> BacktestResult<U256> {
    if sa == sb {
        return Ok(U256::zero());
    }
    Ok(checked_mul(amount1, q96(), "get_liquidity_for_amounts")? / (sb - sa))
}

pub(crate) fn u256_to_u128(v: U256, op: &'static str) -> BacktestResult<u128> {
    if v > U256::from(u128::MAX) {
        return Err(overflow(op, format!("{v} exceeds u128")));
    }
    Ok(v.as_u128())
}

/// Display price `price(s) = (s / 2^96)^2`, token1-per-token0 in raw units.
/// Conversion to floating point happens only at this presentation boundary.
pub fn price_from_sqrt_price_x96(sqrt_price_x96: U256) -> f64 {
    let s = u256_to_f64(sqrt_price_x96) / u256_to_f64(q96());
    s * s
}

/// Human display price, scaled by token decimals.
pub fn human_price(sqrt_price_x96: U256, decimals0: u8, decimals1: u8) -> f64 {
    let raw = price_from_sqrt_price_x96(sqrt_price_x96);
    raw * 10f64.powi(decimals0 as i32 - decimals1 as i32)
}

/// Locates the tick whose price is `price_ratio` times the price at
/// `base_sqrt_price_x96` (both sides of the ratio in the same unit, so a
/// display-price ratio and a raw-price ratio are interchangeable here).
///
/// Used only by the indicator-driven strategies (ATR, Bollinger) to turn a
/// desired band edge into a tick boundary. The transient
/// sqrt-price built from `price_ratio` is never stored or fed back into
/// pool/position bookkeeping — only `tick_to_sqrt_price_x96`'s output is,
/// once this function hands back a plain tick index. This is the one
/// sanctioned bridge from a float ratio to an integer tick; it does not
/// violate the precision contract above because nothing downstream ever
/// treats the transient value as an authoritative sqrt-price.
pub fn tick_for_price_ratio(base_sqrt_price_x96: U256, price_ratio: f64) -> BacktestResult<i32> {
    if !price_ratio.is_finite() || price_ratio <= 0.0 {
        return Err(overflow(
            "tick_for_price_ratio",
            format!("non-positive price ratio {price_ratio}"),
        ));
    }
    let base = u256_to_f64(base_sqrt_price_x96);
    let candidate = base * price_ratio.sqrt();
    if !candidate.is_finite() || candidate <= 0.0 {
        return Err(overflow("tick_for_price_ratio", "candidate sqrt-price out of range"));
    }
    let candidate_u256 = f64_to_u256(candidate);
    sqrt_price_x96_to_tick(candidate_u256)
}

fn f64_to_u256(v: f64) -> U256 {
    if v <= 0.0 {
        return U256::zero();
    }
    if v >= 1.8446744073709552e19 {
        // split into high/low 64-bit halves for values beyond u64 range
        let hi = (v / 1.8446744073709552e19).floor();
        let lo = v - hi * 1.8446744073709552e19;
        return (U256::from(hi as u128) << 64).saturating_add(U256::from(lo as u128));
    }
    U256::from(v as u128)
}

pub fn u256_to_f64(v: U256) -> f64 {
    let mut acc = 0f64;
    for word in v.0.iter().rev() {
        acc = acc * 18_446_744_073_709_551_616.0 + (*word as f64);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_zero_is_q96() {
        assert_eq!(tick_to_sqrt_price_x96(0).unwrap(), q96());
    }

    #[test]
    fn tick_round_trip_matches_invariant() {
        for tick in [
            MIN_TICK,
            -500_000,
            -70000,
            -1,
            0,
            1,
            70000,
            500_000,
            MAX_TICK - 1,
        ] {
            let s = tick_to_sqrt_price_x96(tick).unwrap();
            let back = sqrt_price_x96_to_tick(s).unwrap();
            assert_eq!(back, tick, "round trip failed for tick {tick}");
            // invariant: tick_to_sqrt(T) <= S < tick_to_sqrt(T+1)
            if tick < MAX_TICK {
                let next = tick_to_sqrt_price_x96(tick + 1).unwrap();
                assert!(s < next);
            }
        }
    }

    #[test]
    fn monotonic_increasing() {
        let mut prev = tick_to_sqrt_price_x96(MIN_TICK).unwrap();
        for tick in (MIN_TICK + 1..MIN_TICK + 2000).step_by(37) {
            let cur = tick_to_sqrt_price_x96(tick).unwrap();
            assert!(cur > prev);
            prev = cur;
        }
    }

    #[test]
    fn amount_deltas_rounding_direction() {
        let sa = tick_to_sqrt_price_x96(69000).unwrap();
        let sb = tick_to_sqrt_price_x96(71000).unwrap();
        let down0 = get_amount0_delta(sa, sb, 1_000_000, false).unwrap();
        let up0 = get_amount0_delta(sa, sb, 1_000_000, true).unwrap();
        assert!(up0 >= down0);

        let down1 = get_amount1_delta(sa, sb, 1_000_000, false).unwrap();
        let up1 = get_amount1_delta(sa, sb, 1_000_000, true).unwrap();
        assert!(up1 >= down1);
    }

    #[test]
    fn liquidity_for_amounts_binding_minimum() {
        let sa = tick_to_sqrt_price_x96(69000).unwrap();
        let sp = tick_to_sqrt_price_x96(70000).unwrap();
        let sb = tick_to_sqrt_price_x96(71000).unwrap();
        let l = get_liquidity_for_amounts(
            sp,
            sa,
            sb,
            U256::from(1_000_000_000u64),
            U256::from(1_000_000_000u64),
        )
        .unwrap();
        assert!(l > 0);
    }

    #[test]
    fn out_of_range_tick_is_overflow_error() {
        assert!(tick_to_sqrt_price_x96(MAX_TICK + 1).is_err());
    }

    #[test]
    fn tick_for_price_ratio_round_trips_near_identity() {
        let base = tick_to_sqrt_price_x96(70000).unwrap();
        let tick = tick_for_price_ratio(base, 1.0).unwrap();
        assert_eq!(tick, 70000);
    }

    #[test]
    fn tick_for_price_ratio_moves_in_ratio_direction() {
        let base = tick_to_sqrt_price_x96(70000).unwrap();
        let up = tick_for_price_ratio(base, 1.05).unwrap();
        let down = tick_for_price_ratio(base, 0.95).unwrap();
        assert!(up > 70000);
        assert!(down < 70000);
    }
}
