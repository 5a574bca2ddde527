//! Passive hold (baseline). Opens one position at
//! start across `price_range_pct` (or an explicit tick override) around
//! the initial price, snapped to `tickSpacing`. Never rebalances. Maps to
//! the config `strategy = passive_range` variant.

use primitive_types::U256;

use crate::driver::symmetric_range;
use crate::pool::state::Tick;
use crate::strategy::{Action, Snapshot};

#[derive(Clone, Copy, Debug)]
pub enum RangeSpec {
    /// Half-width as a fraction of the initial price (e.g. 0.10 = ±10%),
    /// translated to ticks at first use.
    PricePct(f64),
    /// Explicit tick bounds.
    Explicit(Tick, Tick),
}

#[derive(Clone, Debug)]
pub struct PassiveRangeStrategy {
    range: RangeSpec,
    tick_spacing: u32,
    opened: bool,
}

impl PassiveRangeStrategy {
    pub fn new(range: RangeSpec, tick_spacing: u32) -> Self {
        PassiveRangeStrategy {
            range,
            tick_spacing,
            opened: false,
        }
    }

    fn range_for(&self, current_tick: Tick) -> (Tick, Tick) {
        match self.range {
            RangeSpec::Explicit(lo, hi) => (lo, hi),
            RangeSpec::PricePct(pct) => {
                // ln(1+pct) / ln(1.0001) ticks, approximated via price ratio:
                // a fractional move of `pct` around tick T corresponds to
                // roughly pct / 0.0001 ticks for small pct.
                let half_width_ticks = (pct / 0.0001).round() as i32;
                symmetric_range(current_tick, half_width_ticks, self.tick_spacing)
            }
        }
    }

    pub fn on_event(&mut self, snapshot: &Snapshot) -> Action {
        if self.opened {
            return Action::Hold;
        }
        self.opened = true;
        let (tick_lower, tick_upper) = self.range_for(snapshot.pool.tick);
        Action::OpenPosition {
            tick_lower,
            tick_upper,
            amount0: U256::from(snapshot.idle0),
            amount1: U256::from(snapshot.idle1),
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

    fn snapshot_at(pool: &PoolState, idle0: u128, idle1: u128) -> Snapshot {
        static BARS: std::sync::OnceLock<BarAggregator> = std::sync::OnceLock::new();
        static ATR: std::sync::OnceLock<Atr> = std::sync::OnceLock::new();
        Snapshot {
            timestamp: 0,
            pool,
            my_positions: &[],
            idle0,
            idle1,
            indicators: IndicatorView {
                bars: BARS.get_or_init(|| BarAggregator::new(60, 10)),
                atr: ATR.get_or_init(|| Atr::new(14)),
                sma_period: 20,
                std_period: 20,
            },
        }
    }

    #[test]
    fn opens_once_then_holds() {
        let mut pool = PoolState::uninitialized();
        pool.initialize(tick_to_sqrt_price_x96(70000).unwrap(), 70000, 3000, 60)
            .unwrap();
        let mut s = PassiveRangeStrategy::new(RangeSpec::PricePct(0.10), 60);
        let snap = snapshot_at(&pool, 1000, 1000);
        let first = s.on_event(&snap);
        assert!(matches!(first, Action::OpenPosition { .. }));
        let second = s.on_event(&snap);
        assert!(matches!(second, Action::Hold));
    }

    #[test]
    fn explicit_range_overrides_pct() {
        let mut pool = PoolState::uninitialized();
        pool.initialize(tick_to_sqrt_price_x96(70000).unwrap(), 70000, 3000, 60)
            .unwrap();
        let mut s = PassiveRangeStrategy::new(RangeSpec::Explicit(69000, 72000), 60);
        let snap = snapshot_at(&pool, 1000, 1000);
        match s.on_event(&snap) {
            Action::OpenPosition { tick_lower, tick_upper, .. } => {
                assert_eq!((tick_lower, tick_upper), (69000, 72000));
            }
            _ => panic!("expected open"),
        }
    }
}
