//! Fixed-width (Steer Classic). Single position of
//! `positionWidthTicks`, recentered (with a swap — modeled as the flat
//! `rebalance_cost_bps` friction) whenever the current tick deviates from
//! the position's center by more than `rebalanceThresholdBps`.

use primitive_types::U256;

use crate::driver::{snap_to_spacing, symmetric_range};
use crate::math::fixed_point::{price_from_sqrt_price_x96, tick_to_sqrt_price_x96};
use crate::pool::state::Tick;
use crate::strategy::{Action, Snapshot};

#[derive(Clone, Debug)]
pub struct FixedWidthStrategy {
    width_ticks: i32,
    rebalance_threshold_bps: u32,
    tick_spacing: u32,
    range: Option<(Tick, Tick)>,
    center_tick: Option<Tick>,
}

impl FixedWidthStrategy {
    pub fn new(width_ticks: i32, rebalance_threshold_bps: u32, tick_spacing: u32) -> Self {
        FixedWidthStrategy {
            width_ticks,
            rebalance_threshold_bps,
            tick_spacing,
            range: None,
            center_tick: None,
        }
    }

    fn recentered(&self, center: Tick) -> (Tick, Tick) {
        symmetric_range(center, self.width_ticks / 2, self.tick_spacing)
    }

    pub fn on_event(&mut self, snapshot: &Snapshot) -> Action {
        let current_center = snap_to_spacing(snapshot.pool.tick, self.tick_spacing);

        let Some(center) = self.center_tick else {
            let (lo, hi) = self.recentered(current_center);
            self.range = Some((lo, hi));
            self.center_tick = Some(current_center);
            return Action::OpenPosition {
                tick_lower: lo,
                tick_upper: hi,
                amount0: U256::from(snapshot.idle0),
                amount1: U256::from(snapshot.idle1),
            };
        };

        let Ok(center_sqrt) = tick_to_sqrt_price_x96(center) else {
            return Action::Hold;
        };
        let center_price = price_from_sqrt_price_x96(center_sqrt);
        let current_price = price_from_sqrt_price_x96(snapshot.pool.sqrt_price_x96);
        if center_price <= 0.0 {
            return Action::Hold;
        }
        let deviation_bps = ((current_price / center_price) - 1.0).abs() * 10_000.0;

        if deviation_bps > self.rebalance_threshold_bps as f64 {
            let (lo, hi) = self.recentered(current_center);
            self.range = Some((lo, hi));
            self.center_tick = Some(current_center);
            Action::Rebalance { tick_lower: lo, tick_upper: hi }
        } else {
            Action::Hold
        }
    }
}
