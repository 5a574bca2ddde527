//! The strategy interface and its six concrete policies.
//!
//! A strategy is represented as a tagged variant over per-policy state,
//! not a trait-object hierarchy — a plain enum plus per-variant struct,
//! no inheritance. Shared helpers (range snapping, token-split sizing,
//! rebalance-cost application) live on the driver, not on this type.

pub mod alpha_vault;
pub mod atr;
pub mod bollinger;
pub mod fixed_width;
pub mod hold;
pub mod passive_range;

use primitive_types::U256;

use crate::indicators::{Atr, BarAggregator};
use crate::pool::state::{PoolState, Tick};

/// One strategy-owned position, as the strategy sees it (read-only view
/// onto the driver's position book).
#[derive(Clone, Copy, Debug)]
pub struct PositionView {
    pub tick_lower: Tick,
    pub tick_upper: Tick,
    pub liquidity: u128,
    pub tokens_owed_0: u128,
    pub tokens_owed_1: u128,
}

/// Read-only indicator access a strategy may consult. All values are `None` until warmed up.
pub struct IndicatorView<'a> {
    pub bars: &'a BarAggregator,
    pub atr: &'a Atr,
    pub sma_period: usize,
    pub std_period: usize,
}

impl<'a> IndicatorView<'a> {
    pub fn atr_value(&self) -> Option<f64> {
        self.atr.value()
    }

    pub fn sma_value(&self) -> Option<f64> {
        crate::indicators::sma(self.bars.closed_bars(), self.sma_period)
    }

    pub fn std_dev_value(&self) -> Option<f64> {
        crate::indicators::std_dev(self.bars.closed_bars(), self.std_period)
    }
}

/// The post-event snapshot a strategy is consulted with.
pub struct Snapshot<'a> {
    pub timestamp: i64,
    pub pool: &'a PoolState,
    pub my_positions: &'a [PositionView],
    pub idle0: u128,
    pub idle1: u128,
    pub indicators: IndicatorView<'a>,
}

/// What a strategy asks the driver to do.
#[derive(Clone, Debug)]
pub enum Action {
    Hold,
    OpenPosition {
        tick_lower: Tick,
        tick_upper: Tick,
        amount0: U256,
        amount1: U256,
    },
    ClosePosition {
        tick_lower: Tick,
        tick_upper: Tick,
    },
    Rebalance {
        tick_lower: Tick,
        tick_upper: Tick,
    },
}

pub use alpha_vault::AlphaVaultStrategy;
pub use atr::AtrStrategy;
pub use bollinger::BollingerStrategy;
pub use fixed_width::FixedWidthStrategy;
pub use hold::HoldStrategy;
pub use passive_range::PassiveRangeStrategy;

/// The strategy surface: one tagged variant per policy.
pub enum Strategy {
    Hold(HoldStrategy),
    PassiveRange(PassiveRangeStrategy),
    Atr(AtrStrategy),
    AlphaVault(AlphaVaultStrategy),
    FixedWidth(FixedWidthStrategy),
    Bollinger(BollingerStrategy),
}

impl Strategy {
    pub fn on_event(&mut self, snapshot: &Snapshot) -> Action {
        match self {
            Strategy::Hold(s) => s.on_event(snapshot),
            Strategy::PassiveRange(s) => s.on_event(snapshot),
            Strategy::Atr(s) => s.on_event(snapshot),
            Strategy::AlphaVault(s) => s.on_event(snapshot),
            Strategy::FixedWidth(s) => s.on_event(snapshot),
            Strategy::Bollinger(s) => s.on_event(snapshot),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Hold(_) => "hold",
            Strategy::PassiveRange(_) => "passive_range",
            Strategy::Atr(_) => "atr",
            Strategy::AlphaVault(_) => "alpha_vault",
            Strategy::FixedWidth(_) => "fixed_width",
            Strategy::Bollinger(_) => "bollinger",
        }
    }
}
