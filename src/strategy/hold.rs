//! HODL 50/50. Opens no position; the driver's
//! initial capital split and idle reserves do all the work. Maps to the
//! config `strategy = hold` variant.

use crate::strategy::{Action, Snapshot};

#[derive(Clone, Debug, Default)]
pub struct HoldStrategy;

impl HoldStrategy {
    pub fn new() -> Self {
        HoldStrategy
    }

    pub fn on_event(&mut self, _snapshot: &Snapshot) -> Action {
        Action::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{Atr, BarAggregator};
    use crate::math::fixed_point::tick_to_sqrt_price_x96;
    use crate::pool::state::PoolState;
    use crate::strategy::IndicatorView;

    #[test]
    fn always_holds() {
        let mut pool = PoolState::uninitialized();
        pool.initialize(tick_to_sqrt_price_x96(70000).unwrap(), 70000, 3000, 60)
            .unwrap();
        let bars = BarAggregator::new(60, 10);
        let atr = Atr::new(14);
        let snapshot = Snapshot {
            timestamp: 0,
            pool: &pool,
            my_positions: &[],
            idle0: 1000,
            idle1: 1000,
            indicators: IndicatorView {
                bars: &bars,
                atr: &atr,
                sma_period: 20,
                std_period: 20,
            },
        };
        let mut s = HoldStrategy::new();
        assert!(matches!(s.on_event(&snapshot), Action::Hold));
    }
}
