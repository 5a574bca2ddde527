//! ATR dynamic range. Waits until `ATR(period)` is
//! available; range bounds in price space are `P ± k·ATR`, translated to
//! ticks. Rebalances when price has moved beyond `deviation_threshold` of
//! the current range's center and `min_rebalance_interval` has elapsed, or
//! when price leaves the range outright.

use primitive_types::U256;

use crate::driver::snap_to_spacing;
use crate::math::fixed_point::tick_for_price_ratio;
use crate::pool::state::Tick;
use crate::strategy::{Action, Snapshot};

#[derive(Clone, Debug)]
pub struct AtrStrategy {
    multiplier: f64,
    tick_spacing: u32,
    deviation_threshold: f64,
    min_rebalance_interval_s: i64,
    decimals0: u8,
    decimals1: u8,
    current_range: Option<(Tick, Tick)>,
    center_price: Option<f64>,
    last_rebalance_ts: Option<i64>,
}

impl AtrStrategy {
    pub fn new(
        multiplier: f64,
        tick_spacing: u32,
        deviation_threshold: f64,
        min_rebalance_interval_s: i64,
        decimals0: u8,
        decimals1: u8,
    ) -> Self {
        AtrStrategy {
            multiplier,
            tick_spacing,
            deviation_threshold,
            min_rebalance_interval_s,
            decimals0,
            decimals1,
            current_range: None,
            center_price: None,
            last_rebalance_ts: None,
        }
    }

    fn range_for(&self, snapshot: &Snapshot, atr: f64, price: f64) -> Option<(Tick, Tick)> {
        let offset = self.multiplier * atr;
        if offset <= 0.0 || price <= 0.0 {
            return None;
        }
        let upper_ratio = (price + offset) / price;
        let lower_ratio = (price - offset).max(price * 0.0001) / price;
        let sqrt_price = snapshot.pool.sqrt_price_x96;
        let tick_upper = tick_for_price_ratio(sqrt_price, upper_ratio).ok()?;
        let tick_lower = tick_for_price_ratio(sqrt_price, lower_ratio).ok()?;
        let lo = snap_to_spacing(tick_lower.min(tick_upper), self.tick_spacing);
        let mut hi = snap_to_spacing(tick_lower.max(tick_upper), self.tick_spacing);
        if hi <= lo {
            hi = lo + self.tick_spacing.max(1) as Tick;
        }
        Some((lo, hi))
    }

    pub fn on_event(&mut self, snapshot: &Snapshot) -> Action {
        let Some(atr) = snapshot.indicators.atr_value() else {
            // Not ready: explicit Hold, never treated as zero.
            return Action::Hold;
        };
        // ATR is accumulated over human display-price bars (driver feeds
        // the indicator window with `human_price`), so the reference price
        // here must be in the same unit for `P ± k*ATR` to be meaningful.
        let price = crate::math::fixed_point::human_price(
            snapshot.pool.sqrt_price_x96,
            self.decimals0,
            self.decimals1,
        );

        let Some((tick_lower, tick_upper)) = self.range_for(snapshot, atr, price) else {
            return Action::Hold;
        };

        match self.current_range {
            None => {
                self.current_range = Some((tick_lower, tick_upper));
                self.center_price = Some(price);
                self.last_rebalance_ts = Some(snapshot.timestamp);
                Action::OpenPosition {
                    tick_lower,
                    tick_upper,
                    amount0: U256::from(snapshot.idle0),
                    amount1: U256::from(snapshot.idle1),
                }
            }
            Some((lo, hi)) => {
                let left_range = snapshot.pool.tick < lo || snapshot.pool.tick >= hi;
                let center = self.center_price.unwrap_or(price);
                let deviated = center > 0.0 && ((price - center).abs() / center) > self.deviation_threshold;
                let interval_elapsed = self
                    .last_rebalance_ts
                    .map(|t| snapshot.timestamp - t >= self.min_rebalance_interval_s)
                    .unwrap_or(true);

                if left_range || (deviated && interval_elapsed) {
                    self.current_range = Some((tick_lower, tick_upper));
                    self.center_price = Some(price);
                    self.last_rebalance_ts = Some(snapshot.timestamp);
                    Action::Rebalance { tick_lower, tick_upper }
                } else {
                    Action::Hold
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{Atr, BarAggregator};
    use crate::math::fixed_point::tick_to_sqrt_price_x96;
    use crate::pool::state::PoolState;
    use crate::strategy::IndicatorView;

    fn pool_at(tick: Tick) -> PoolState {
        let mut pool = PoolState::uninitialized();
        pool.initialize(tick_to_sqrt_price_x96(tick).unwrap(), tick, 3000, 60)
            .unwrap();
        pool
    }

    #[test]
    fn holds_while_atr_not_ready() {
        let pool = pool_at(70000);
        let bars = BarAggregator::new(60, 20);
        let atr = Atr::new(14);
        let mut s = AtrStrategy::new(2.0, 60, 0.03, 180, 8, 6);
        let snap = Snapshot {
            timestamp: 0,
            pool: &pool,
            my_positions: &[],
            idle0: 1000,
            idle1: 1000,
            indicators: IndicatorView { bars: &bars, atr: &atr, sma_period: 20, std_period: 20 },
        };
        assert!(matches!(s.on_event(&snap), Action::Hold));
    }

    #[test]
    fn opens_once_atr_ready() {
        let pool = pool_at(70000);
        let bars = BarAggregator::new(60, 20);
        let mut atr = Atr::new(2);
        atr.on_bar(&crate::indicators::Bar { open_ts: 0, high: 1.01, low: 0.99, close: 1.0 });
        atr.on_bar(&crate::indicators::Bar { open_ts: 1, high: 1.02, low: 0.98, close: 1.0 });
        assert!(atr.value().is_some());
        let mut s = AtrStrategy::new(2.0, 60, 0.03, 180, 8, 6);
        let snap = Snapshot {
            timestamp: 0,
            pool: &pool,
            my_positions: &[],
            idle0: 1000,
            idle1: 1000,
            indicators: IndicatorView { bars: &bars, atr: &atr, sma_period: 20, std_period: 20 },
        };
        assert!(matches!(s.on_event(&snap), Action::OpenPosition { .. }));
    }
}
