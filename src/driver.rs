//! Backtest driver.
//!
//! Wires the pool state, position book, event replayer, a strategy, and
//! the valuation layer together, keeps the strategy's portfolio (positions
//! plus idle reserves), and records the value/price/action time-series.
//! The range-snapping, token-split, and rebalance-cost helpers a strategy
//! needs live here rather than on the `Strategy` type itself.

use primitive_types::U256;

use crate::error::{BacktestError, BacktestResult};
use crate::indicators::{Atr, BarAggregator};
use crate::pool::state::Tick;
use crate::replay::events::ReplayEvent;
use crate::replay::replayer::Replayer;
use crate::strategy::{Action, IndicatorView, PositionView, Snapshot, Strategy};
use crate::valuation::{self, HodlBaseline};

/// The synthetic position-book owner identity every strategy mints under.
pub const STRATEGY_OWNER: &str = "strategy";

/// The driver's view of what one strategy owns.
#[derive(Clone, Debug, Default)]
pub struct StrategyPortfolio {
    pub idle0: u128,
    pub idle1: u128,
    pub positions: Vec<(Tick, Tick)>,
    pub gas_spent: u128,
}

/// One row of the value/price time-series.
#[derive(Clone, Debug)]
pub struct ValueSample {
    pub timestamp: i64,
    pub spot_price: f64,
    pub portfolio_value: f64,
    pub fees_accum_quote: f64,
    pub active_range: Option<(Tick, Tick)>,
}

/// One recorded strategy action, for the action time-series.
#[derive(Clone, Debug)]
pub struct ActionRecord {
    pub timestamp: i64,
    pub description: String,
}

/// Final run summary.
#[derive(Clone, Debug, Default)]
pub struct Summary {
    pub total_return: f64,
    pub max_drawdown: f64,
    pub rebalance_count: u64,
    pub gas_spent_quote: u128,
    pub impermanent_loss: f64,
    pub discrepancy_count: usize,
    pub strategy_precondition_drops: u64,
}

/// Rounds `tick` to the nearest multiple of `spacing`.
pub fn snap_to_spacing(tick: Tick, spacing: u32) -> Tick {
    if spacing == 0 {
        return tick;
    }
    let spacing = spacing as i64;
    let t = tick as i64;
    let rounded = (t as f64 / spacing as f64).round() as i64 * spacing;
    rounded as Tick
}

/// A symmetric range of `half_width_ticks` around `center`, snapped to
/// `spacing`, with a minimum one-spacing width.
pub fn symmetric_range(center: Tick, half_width_ticks: i32, spacing: u32) -> (Tick, Tick) {
    let lower = snap_to_spacing(center - half_width_ticks, spacing);
    let mut upper = snap_to_spacing(center + half_width_ticks, spacing);
    if upper <= lower {
        upper = lower + spacing.max(1) as Tick;
    }
    (lower, upper)
}

/// Splits a quote-denominated notional into `(amount0, amount1)` in the
/// proportion a unit of liquidity in `[tick_lower, tick_upper)` would hold
/// at `sqrt_price_x96`, generalized to the position's actual in-range ratio
/// rather than a literal 50/50 token count.
pub fn target_amounts_for_value(
    sqrt_price_x96: U256,
    tick_lower: Tick,
    tick_upper: Tick,
    notional_quote: f64,
) -> BacktestResult<(U256, U256)> {
    if notional_quote <= 0.0 {
        return Ok((U256::zero(), U256::zero()));
    }
    const PROBE_LIQUIDITY: u128 = 1_000_000_000_000u128;
    let (probe0, probe1) = valuation::position_amounts(
        sqrt_price_x96,
        tick_lower,
        tick_upper,
        PROBE_LIQUIDITY,
    )?;
    let price = crate::math::fixed_point::price_from_sqrt_price_x96(sqrt_price_x96);
    let value0 = crate::math::fixed_point::u256_to_f64(probe0) * price;
    let value1 = crate::math::fixed_point::u256_to_f64(probe1);
    let total = value0 + value1;

    if total <= 0.0 {
        // Single-sided range: all value goes to whichever token the range
        // actually holds.
        return if probe1.is_zero() {
            Ok((notional_to_amount0(notional_quote, price), U256::zero()))
        } else {
            Ok((U256::zero(), notional_to_amount1(notional_quote)))
        };
    }

    let frac0 = value0 / total;
    let target_value0 = notional_quote * frac0;
    let target_value1 = notional_quote - target_value0;
    Ok((
        notional_to_amount0(target_value0, price),
        notional_to_amount1(target_value1),
    ))
}

fn notional_to_amount0(value_quote: f64, price: f64) -> U256 {
    if price <= 0.0 || value_quote <= 0.0 {
        return U256::zero();
    }
    u256_from_f64((value_quote / price).max(0.0))
}

fn notional_to_amount1(value_quote: f64) -> U256 {
    if value_quote <= 0.0 {
        return U256::zero();
    }
    u256_from_f64(value_quote)
}

fn u256_from_f64(v: f64) -> U256 {
    if !v.is_finite() || v <= 0.0 {
        return U256::zero();
    }
    // Values here are raw token amounts a real backtest deals with
    // (far below 2^256); u128 round-trip is exact enough for sizing.
    U256::from(v.min(u128::MAX as f64) as u128)
}

pub struct Driver {
    pub replayer: Replayer,
    pub strategy: Strategy,
    pub portfolio: StrategyPortfolio,
    pub rebalance_cost_bps: u32,
    pub decimals0: u8,
    pub decimals1: u8,
    bars: BarAggregator,
    atr: Atr,
    atr_period: usize,
    sma_period: usize,
    std_period: usize,
    hodl: Option<HodlBaseline>,
    pub value_series: Vec<ValueSample>,
    pub action_log: Vec<ActionRecord>,
    rebalance_count: u64,
    peak_value: f64,
    max_drawdown: f64,
    bars_fed_to_atr: usize,
}

impl Driver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        replayer: Replayer,
        strategy: Strategy,
        rebalance_cost_bps: u32,
        bar_seconds: i64,
        atr_period: usize,
        sma_period: usize,
        std_period: usize,
        decimals0: u8,
        decimals1: u8,
    ) -> Self {
        let window = atr_period.max(sma_period).max(std_period).max(1) + 2;
        Driver {
            replayer,
            strategy,
            portfolio: StrategyPortfolio::default(),
            rebalance_cost_bps,
            decimals0,
            decimals1,
            bars: BarAggregator::new(bar_seconds, window),
            atr: Atr::new(atr_period.max(1)),
            atr_period,
            sma_period,
            std_period,
            hodl: None,
            value_series: Vec::new(),
            action_log: Vec::new(),
            rebalance_count: 0,
            peak_value: 0.0,
            max_drawdown: 0.0,
            bars_fed_to_atr: 0,
        }
    }

    /// Seeds the strategy's initial capital split and the HODL baseline.
    pub fn seed_capital(&mut self, initial_capital_quote: f64) -> BacktestResult<()> {
        let sqrt_price = self.replayer.pool.sqrt_price_x96;
        let price = crate::math::fixed_point::price_from_sqrt_price_x96(sqrt_price);
        let half = initial_capital_quote / 2.0;
        let amount0 = notional_to_amount0(half, price);
        let amount1 = notional_to_amount1(half);
        self.portfolio.idle0 = amount0.as_u128();
        self.portfolio.idle1 = amount1.as_u128();
        self.hodl = Some(HodlBaseline::new(amount0, amount1));
        self.peak_value = initial_capital_quote;
        Ok(())
    }

    fn spot_price(&self) -> f64 {
        crate::math::fixed_point::human_price(
            self.replayer.pool.sqrt_price_x96,
            self.decimals0,
            self.decimals1,
        )
    }

    fn position_views(&self) -> BacktestResult<Vec<PositionView>> {
        let mut out = Vec::with_capacity(self.portfolio.positions.len());
        for &(tl, tu) in &self.portfolio.positions {
            if let Some(p) = self.replayer.positions.get(STRATEGY_OWNER, tl, tu) {
                out.push(PositionView {
                    tick_lower: tl,
                    tick_upper: tu,
                    liquidity: p.liquidity,
                    tokens_owed_0: p.tokens_owed_0,
                    tokens_owed_1: p.tokens_owed_1,
                });
            }
        }
        Ok(out)
    }

    fn fees_accum_quote(&self, positions: &[PositionView]) -> f64 {
        let price = crate::math::fixed_point::price_from_sqrt_price_x96(self.replayer.pool.sqrt_price_x96);
        positions
            .iter()
            .map(|p| p.tokens_owed_0 as f64 * price + p.tokens_owed_1 as f64)
            .sum()
    }

    fn portfolio_value(&self, positions: &[PositionView]) -> BacktestResult<f64> {
        let sqrt_price = self.replayer.pool.sqrt_price_x96;
        let mut total = valuation::quote_value(
            U256::from(self.portfolio.idle0),
            U256::from(self.portfolio.idle1),
            sqrt_price,
        );
        for p in positions {
            total += valuation::position_value(
                sqrt_price,
                p.tick_lower,
                p.tick_upper,
                p.liquidity,
                p.tokens_owed_0,
                p.tokens_owed_1,
            )?;
        }
        Ok(total)
    }

    /// Applies one on-chain event, then consults the strategy and performs
    /// any resulting action, then records one time-series row.
    pub fn step(&mut self, event: &ReplayEvent) -> BacktestResult<()> {
        self.replayer.apply(event)?;

        if let ReplayEvent::Swap(_) = event {
            let price = self.spot_price();
            let ts = event.meta().block_timestamp;
            self.bars.push_sample(ts, price);
        }
        // Feed the ATR every bar that has newly closed since the last step;
        // BarAggregator only appends, so comparing lengths is exact.
        let closed = self.bars.closed_bars().len();
        while self.bars_fed_to_atr < closed {
            let bar = self.bars.closed_bars()[self.bars_fed_to_atr];
            self.atr.on_bar(&bar);
            self.bars_fed_to_atr += 1;
        }

        let timestamp = event.meta().block_timestamp;
        let positions = self.position_views()?;
        let action = {
            let snapshot = Snapshot {
                timestamp,
                pool: &self.replayer.pool,
                my_positions: &positions,
                idle0: self.portfolio.idle0,
                idle1: self.portfolio.idle1,
                indicators: IndicatorView {
                    bars: &self.bars,
                    atr: &self.atr,
                    sma_period: self.sma_period,
                    std_period: self.std_period,
                },
            };
            self.strategy.on_event(&snapshot)
        };
        self.apply_action(timestamp, action)?;

        let positions_after = self.position_views()?;
        let value = self.portfolio_value(&positions_after)?;
        let fees = self.fees_accum_quote(&positions_after);
        self.peak_value = self.peak_value.max(value);
        if self.peak_value > 0.0 {
            let drawdown = (self.peak_value - value) / self.peak_value;
            self.max_drawdown = self.max_drawdown.max(drawdown);
        }
        self.value_series.push(ValueSample {
            timestamp,
            spot_price: self.spot_price(),
            portfolio_value: value,
            fees_accum_quote: fees,
            active_range: positions_after.first().map(|p| (p.tick_lower, p.tick_upper)),
        });
        Ok(())
    }

    fn record_action(&mut self, timestamp: i64, description: impl Into<String>) {
        self.action_log.push(ActionRecord {
            timestamp,
            description: description.into(),
        });
    }

    fn apply_action(&mut self, timestamp: i64, action: Action) -> BacktestResult<()> {
        match action {
            Action::Hold => Ok(()),
            Action::OpenPosition {
                tick_lower,
                tick_upper,
                amount0,
                amount1,
            } => self.open_position(timestamp, tick_lower, tick_upper, amount0, amount1),
            Action::ClosePosition {
                tick_lower,
                tick_upper,
            } => self.close_position(timestamp, tick_lower, tick_upper),
            Action::Rebalance {
                tick_lower,
                tick_upper,
            } => self.rebalance(timestamp, tick_lower, tick_upper),
        }
    }

    fn open_position(
        &mut self,
        timestamp: i64,
        tick_lower: Tick,
        tick_upper: Tick,
        amount0: U256,
        amount1: U256,
    ) -> BacktestResult<()> {
        let sqrt_price = self.replayer.pool.sqrt_price_x96;
        let sqrt_lower = crate::math::fixed_point::tick_to_sqrt_price_x96(tick_lower)?;
        let sqrt_upper = crate::math::fixed_point::tick_to_sqrt_price_x96(tick_upper)?;
        let liquidity = crate::math::fixed_point::get_liquidity_for_amounts(
            sqrt_price, sqrt_lower, sqrt_upper, amount0, amount1,
        )?;
        if liquidity == 0 {
            self.record_action(timestamp, format!("open[{tick_lower},{tick_upper}) skipped: zero liquidity"));
            self.replayer.record_strategy_precondition_drop(
                timestamp,
                format!("open[{tick_lower},{tick_upper}) insufficient liquidity for requested amounts"),
            );
            return Ok(());
        }
        match self.replayer.positions.mint(
            &mut self.replayer.pool,
            STRATEGY_OWNER,
            liquidity,
            tick_lower,
            tick_upper,
        ) {
            Ok(()) => {
                let (used0, used1) =
                    valuation::position_amounts(sqrt_price, tick_lower, tick_upper, liquidity)?;
                self.portfolio.idle0 = self.portfolio.idle0.saturating_sub(clamp_u128(used0));
                self.portfolio.idle1 = self.portfolio.idle1.saturating_sub(clamp_u128(used1));
                if !self.portfolio.positions.contains(&(tick_lower, tick_upper)) {
                    self.portfolio.positions.push((tick_lower, tick_upper));
                }
                self.record_action(timestamp, format!("open[{tick_lower},{tick_upper}) L={liquidity}"));
                Ok(())
            }
            Err(BacktestError::NumericalOverflow { op, timestamp: ts, detail }) => {
                Err(BacktestError::NumericalOverflow { op, timestamp: ts, detail })
            }
            Err(e) => {
                self.record_action(timestamp, format!("open[{tick_lower},{tick_upper}) dropped"));
                self.replayer
                    .record_strategy_precondition_drop(timestamp, format!("open[{tick_lower},{tick_upper}) rejected: {e}"));
                Ok(())
            }
        }
    }

    fn close_position(&mut self, timestamp: i64, tick_lower: Tick, tick_upper: Tick) -> BacktestResult<()> {
        let liquidity = self
            .replayer
            .positions
            .get(STRATEGY_OWNER, tick_lower, tick_upper)
            .map(|p| p.liquidity)
            .unwrap_or(0);
        if liquidity > 0 {
            self.replayer
                .positions
                .burn(&mut self.replayer.pool, STRATEGY_OWNER, liquidity, tick_lower, tick_upper)?;
        }
        let (owed0, owed1) =
            self.replayer
                .positions
                .collect(&self.replayer.pool, STRATEGY_OWNER, tick_lower, tick_upper)?;
        self.portfolio.idle0 = self.portfolio.idle0.saturating_add(owed0);
        self.portfolio.idle1 = self.portfolio.idle1.saturating_add(owed1);
        self.portfolio.positions.retain(|&r| r != (tick_lower, tick_upper));
        self.record_action(timestamp, format!("close[{tick_lower},{tick_upper})"));
        Ok(())
    }

    /// Closes every strategy-owned position, applies rebalance friction to
    /// the freed notional, then reopens a single position at the requested
    /// range using the post-cost idle reserves split to the range's
    /// in-range ratio at the current price.
    fn rebalance(&mut self, timestamp: i64, tick_lower: Tick, tick_upper: Tick) -> BacktestResult<()> {
        let sqrt_price_before = self.replayer.pool.sqrt_price_x96;
        let mut notional_closed = 0.0f64;
        let open_ranges: Vec<(Tick, Tick)> = self.portfolio.positions.clone();

        if open_ranges.len() == 1 && open_ranges[0] == (tick_lower, tick_upper) {
            self.record_action(
                timestamp,
                format!("rebalance[{tick_lower},{tick_upper}) dropped: identical range"),
            );
            self.replayer.record_strategy_precondition_drop(
                timestamp,
                format!("rebalance requested identical range [{tick_lower},{tick_upper})"),
            );
            return Ok(());
        }

        for (tl, tu) in open_ranges {
            if let Some(p) = self.replayer.positions.get(STRATEGY_OWNER, tl, tu) {
                notional_closed += valuation::position_value(
                    sqrt_price_before, tl, tu, p.liquidity, p.tokens_owed_0, p.tokens_owed_1,
                )?;
            }
            self.close_position(timestamp, tl, tu)?;
        }

        if notional_closed <= 0.0 {
            self.record_action(timestamp, format!("rebalance[{tick_lower},{tick_upper}) skipped: no prior position"));
            return Ok(());
        }

        let cost = notional_closed * self.rebalance_cost_bps as f64 / 10_000.0;
        let price = crate::math::fixed_point::price_from_sqrt_price_x96(sqrt_price_before);
        let cost_in_token1 = clamp_u128(notional_to_amount1(cost));
        self.portfolio.idle1 = self.portfolio.idle1.saturating_sub(cost_in_token1);
        self.portfolio.gas_spent = self.portfolio.gas_spent.saturating_add(cost_in_token1);

        let total_notional = self.portfolio.idle0 as f64 * price + self.portfolio.idle1 as f64;
        let (target0, target1) =
            target_amounts_for_value(sqrt_price_before, tick_lower, tick_upper, total_notional)?;

        self.open_position(timestamp, tick_lower, tick_upper, target0, target1)?;
        self.rebalance_count += 1;
        self.record_action(timestamp, format!("rebalance -> [{tick_lower},{tick_upper})"));
        Ok(())
    }

    pub fn summary(&self) -> Summary {
        let initial = self
            .value_series
            .first()
            .map(|v| v.portfolio_value)
            .unwrap_or(0.0);
        let last = self
            .value_series
            .last()
            .map(|v| v.portfolio_value)
            .unwrap_or(initial);
        let total_return = if self.peak_value > 0.0 && initial > 0.0 {
            (last - initial) / initial
        } else {
            0.0
        };
        let il = match (&self.hodl, self.value_series.last()) {
            (Some(hodl), Some(sample)) => {
                let sqrt_price = self.replayer.pool.sqrt_price_x96;
                valuation::impermanent_loss(sample.portfolio_value - sample.fees_accum_quote, hodl, sqrt_price)
            }
            _ => 0.0,
        };
        Summary {
            total_return,
            max_drawdown: self.max_drawdown,
            rebalance_count: self.rebalance_count,
            gas_spent_quote: self.portfolio.gas_spent,
            impermanent_loss: il,
            discrepancy_count: self.replayer.summary().discrepancy_count(),
            strategy_precondition_drops: self.replayer.summary().strategy_precondition_drops,
        }
    }
}

fn clamp_u128(v: U256) -> u128 {
    if v > U256::from(u128::MAX) {
        u128::MAX
    } else {
        v.as_u128()
    }
}
