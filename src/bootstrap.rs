//! Wires a `Config` into a ready-to-run `Driver`: reads and orders the
//! event stream, bootstraps the pool's initial price from the first swap
//!,
//! selects and constructs the configured strategy, and seeds initial
//! capital.

use std::fs::File;
use std::io::BufReader;

use crate::config::{Config, StrategyKind};
use crate::driver::Driver;
use crate::error::{BacktestError, BacktestResult};
use crate::pool::state::PoolState;
use crate::replay::events::{order_events, ReplayEvent};
use crate::replay::replayer::Replayer;
use crate::strategy::passive_range::RangeSpec;
use crate::strategy::{
    AlphaVaultStrategy, AtrStrategy, BollingerStrategy, FixedWidthStrategy, HoldStrategy,
    PassiveRangeStrategy, Strategy,
};

pub struct Backtest {
    pub driver: Driver,
    pub events: Vec<ReplayEvent>,
}

impl Backtest {
    pub fn new(config: &Config) -> BacktestResult<Backtest> {
        let file = File::open(&config.data_path)?;
        let reader = BufReader::new(file);
        let events = crate::io::events::read_events(reader)?;
        let events = order_events(events);
        let events = filter_events(events, config);

        let (sqrt_price_x96, tick) = bootstrap_price(&events)?;
        let mut pool = PoolState::uninitialized();
        pool.initialize(sqrt_price_x96, tick, config.fee_tier, config.tick_spacing)?;
        let replayer = Replayer::new(pool);

        let strategy = build_strategy(config);

        let mut driver = Driver::new(
            replayer,
            strategy,
            config.rebalance_cost_bps,
            config.bar_seconds,
            config.atr_period,
            config.sma_period,
            config.sma_period,
            config.decimals0,
            config.decimals1,
        );
        driver.seed_capital(config.initial_capital_quote)?;

        Ok(Backtest { driver, events })
    }
}

/// Filters the ordered stream to the inclusive timestamp/block window.
fn filter_events(events: Vec<ReplayEvent>, config: &Config) -> Vec<ReplayEvent> {
    events
        .into_iter()
        .filter(|e| {
            let meta = e.meta();
            if let Some(start) = config.start_timestamp {
                if meta.block_timestamp < start {
                    return false;
                }
            }
            if let Some(end) = config.end_timestamp {
                if meta.block_timestamp > end {
                    return false;
                }
            }
            if let (Some(start), Some(block)) = (config.start_block, meta.block_number) {
                if block < start {
                    return false;
                }
            }
            if let (Some(end), Some(block)) = (config.end_block, meta.block_number) {
                if block > end {
                    return false;
                }
            }
            true
        })
        .collect()
}

/// The pool's genesis price comes from the first `Swap` in the stream —
/// the only variant that carries an authoritative `sqrtPriceX96`. Mints/burns
/// preceding it replay against that same bootstrapped state, matching
/// on-chain reality (the pool already existed before the window this stream
/// happens to start at).
fn bootstrap_price(
    events: &[ReplayEvent],
) -> BacktestResult<(primitive_types::U256, crate::pool::state::Tick)> {
    events
        .iter()
        .find_map(|e| match e {
            ReplayEvent::Swap(s) => Some((s.sqrt_price_x96, s.tick)),
            _ => None,
        })
        .ok_or_else(|| BacktestError::InputShape {
            line: 0,
            reason: "event stream contains no Swap event to bootstrap the initial pool price".to_string(),
        })
}

fn build_strategy(config: &Config) -> Strategy {
    match config.strategy {
        StrategyKind::Hold => Strategy::Hold(HoldStrategy::new()),
        StrategyKind::PassiveRange => {
            let range = match (config.tick_lower, config.tick_upper) {
                (Some(lo), Some(hi)) => RangeSpec::Explicit(lo, hi),
                _ => RangeSpec::PricePct(config.price_range_pct),
            };
            Strategy::PassiveRange(PassiveRangeStrategy::new(range, config.tick_spacing))
        }
        StrategyKind::Atr => Strategy::Atr(AtrStrategy::new(
            config.atr_multiplier,
            config.tick_spacing,
            config.deviation_threshold,
            config.rebalance_interval_s,
            config.decimals0,
            config.decimals1,
        )),
        StrategyKind::AlphaVault => Strategy::AlphaVault(AlphaVaultStrategy::new(
            config.base_threshold,
            config.limit_threshold,
            config.alpha_rebalance_interval_s,
            config.tick_spacing,
        )),
        StrategyKind::FixedWidth => Strategy::FixedWidth(FixedWidthStrategy::new(
            config.position_width_ticks,
            config.rebalance_threshold_bps,
            config.tick_spacing,
        )),
        StrategyKind::Bollinger => Strategy::Bollinger(BollingerStrategy::new(
            config.std_multiplier,
            config.min_width_ticks,
            config.tick_spacing,
            config.decimals0,
            config.decimals1,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::events::{EventMeta, SwapEvent};
    use clap::Parser;
    use primitive_types::U256;

    fn swap(ts: i64, block: Option<u64>) -> ReplayEvent {
        ReplayEvent::Swap(SwapEvent {
            meta: EventMeta {
                block_number: block,
                block_timestamp: ts,
                transaction_hash: String::new(),
                log_index: None,
            },
            amount0: 1,
            amount1: -1,
            sqrt_price_x96: U256::from(1u64),
            liquidity: 0,
            tick: 0,
        })
    }

    #[test]
    fn bootstrap_price_finds_first_swap() {
        let events = vec![swap(5, None)];
        let (_, tick) = bootstrap_price(&events).unwrap();
        assert_eq!(tick, 0);
    }

    #[test]
    fn bootstrap_price_errors_without_a_swap() {
        let events: Vec<ReplayEvent> = vec![];
        assert!(bootstrap_price(&events).is_err());
    }

    #[test]
    fn filter_events_respects_timestamp_window() {
        let events = vec![swap(10, Some(1)), swap(20, Some(2)), swap(30, Some(3))];
        let mut config_cli = crate::config::Cli::parse_from([
            "clmm-backtester",
            "--data-path",
            "events.jsonl",
        ]);
        config_cli.start_timestamp = Some(15);
        config_cli.end_timestamp = Some(25);
        let config = Config::from_cli(config_cli).unwrap();
        let filtered = filter_events(events, &config);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].meta().block_timestamp, 20);
    }
}
