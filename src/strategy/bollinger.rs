//! Bollinger (Steer Elastic). Range
//! `[SMA - k*sigma, SMA + k*sigma]`, rebuilt each time either band edge has
//! moved by more than `min_width_ticks` since the last rebuild. Expected to
//! rebalance (and spend) more often than the fixed-width strategy on
//! volatile data.

use primitive_types::U256;

use crate::driver::snap_to_spacing;
use crate::math::fixed_point::{human_price, tick_for_price_ratio};
use crate::pool::state::Tick;
use crate::strategy::{Action, Snapshot};

#[derive(Clone, Debug)]
pub struct BollingerStrategy {
    std_multiplier: f64,
    min_width_ticks: i32,
    tick_spacing: u32,
    decimals0: u8,
    decimals1: u8,
    current_range: Option<(Tick, Tick)>,
}

impl BollingerStrategy {
    pub fn new(
        std_multiplier: f64,
        min_width_ticks: i32,
        tick_spacing: u32,
        decimals0: u8,
        decimals1: u8,
    ) -> Self {
        BollingerStrategy {
            std_multiplier,
            min_width_ticks,
            tick_spacing,
            decimals0,
            decimals1,
            current_range: None,
        }
    }

    fn band_ticks(&self, snapshot: &Snapshot, sma: f64, std: f64) -> Option<(Tick, Tick)> {
        let current_price = human_price(snapshot.pool.sqrt_price_x96, self.decimals0, self.decimals1);
        if current_price <= 0.0 {
            return None;
        }
        let band_upper = sma + self.std_multiplier * std;
        let band_lower = (sma - self.std_multiplier * std).max(current_price * 1e-6);

        let tick_upper =
            tick_for_price_ratio(snapshot.pool.sqrt_price_x96, band_upper / current_price).ok()?;
        let tick_lower =
            tick_for_price_ratio(snapshot.pool.sqrt_price_x96, band_lower / current_price).ok()?;
        let lo = snap_to_spacing(tick_lower.min(tick_upper), self.tick_spacing);
        let mut hi = snap_to_spacing(tick_lower.max(tick_upper), self.tick_spacing);
        if hi <= lo {
            hi = lo + self.tick_spacing.max(1) as Tick;
        }
        Some((lo, hi))
    }

    pub fn on_event(&mut self, snapshot: &Snapshot) -> Action {
        let (Some(sma), Some(std)) = (
            snapshot.indicators.sma_value(),
            snapshot.indicators.std_dev_value(),
        ) else {
            // Not ready: explicit Hold.
            return Action::Hold;
        };
        let Some((tick_lower, tick_upper)) = self.band_ticks(snapshot, sma, std) else {
            return Action::Hold;
        };

        match self.current_range {
            None => {
                self.current_range = Some((tick_lower, tick_upper));
                Action::OpenPosition {
                    tick_lower,
                    tick_upper,
                    amount0: U256::from(snapshot.idle0),
                    amount1: U256::from(snapshot.idle1),
                }
            }
            Some((lo, hi)) => {
                let moved = (tick_lower - lo).abs() > self.min_width_ticks
                    || (tick_upper - hi).abs() > self.min_width_ticks;
                if moved {
                    self.current_range = Some((tick_lower, tick_upper));
                    Action::Rebalance { tick_lower, tick_upper }
                } else {
                    Action::Hold
                }
            }
        }
    }
}
