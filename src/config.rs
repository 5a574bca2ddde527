//! Run configuration. `Cli` is the `clap::Parser` surface that builds a
//! `Config`, the canonical way of wiring an offline data tool's argument
//! surface.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// One backtest run's full, immutable configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_path: PathBuf,
    pub initial_capital_quote: f64,

    pub start_timestamp: Option<i64>,
    pub end_timestamp: Option<i64>,
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,

    pub price_range_pct: f64,
    pub tick_lower: Option<i32>,
    pub tick_upper: Option<i32>,

    pub strategy: StrategyKind,

    pub atr_period: usize,
    pub atr_multiplier: f64,
    pub rebalance_interval_s: i64,
    pub deviation_threshold: f64,

    pub base_threshold: i32,
    pub limit_threshold: i32,
    pub alpha_rebalance_interval_s: i64,

    pub position_width_ticks: i32,
    pub rebalance_threshold_bps: u32,

    pub sma_period: usize,
    pub std_multiplier: f64,
    pub min_width_ticks: i32,

    pub rebalance_cost_bps: u32,
    pub fee_tier: u32,
    pub tick_spacing: u32,
    pub decimals0: u8,
    pub decimals1: u8,

    /// Bar width the indicator library aggregates swap prices into
    /// (1-minute bars by default, configurable).
    pub bar_seconds: i64,

    /// Directory report artifacts are written to; `None` means stdout only.
    pub output_dir: Option<PathBuf>,
}

/// `strategy`: one CLI-selectable rebalancing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum StrategyKind {
    Hold,
    PassiveRange,
    Atr,
    AlphaVault,
    FixedWidth,
    Bollinger,
}

/// Historical backtester for concentrated-liquidity AMM pools.
#[derive(Debug, Parser)]
#[command(name = "clmm-backtester", version, about)]
pub struct Cli {
    /// Newline-delimited JSON event stream (mint/burn/swap records).
    #[arg(long)]
    pub data_path: PathBuf,

    /// Starting capital, in token1 (quote) units of account.
    #[arg(long, default_value_t = 10_000.0)]
    pub initial_capital_quote: f64,

    /// Inclusive start-of-window filter on event `blockTimestamp`.
    #[arg(long)]
    pub start_timestamp: Option<i64>,
    /// Inclusive end-of-window filter on event `blockTimestamp`.
    #[arg(long)]
    pub end_timestamp: Option<i64>,
    /// Inclusive start-of-window filter on event `blockNumber`.
    #[arg(long)]
    pub start_block: Option<u64>,
    /// Inclusive end-of-window filter on event `blockNumber`.
    #[arg(long)]
    pub end_block: Option<u64>,

    /// Half-width, as a price fraction, for passive-range strategies.
    #[arg(long, default_value_t = 0.10)]
    pub price_range_pct: f64,
    /// Explicit lower tick, overriding `price_range_pct`. Must be paired
    /// with `tick_upper`.
    #[arg(long)]
    pub tick_lower: Option<i32>,
    /// Explicit upper tick, overriding `price_range_pct`. Must be paired
    /// with `tick_lower`.
    #[arg(long)]
    pub tick_upper: Option<i32>,

    /// Which of the six policies to run.
    #[arg(long, value_enum, default_value_t = StrategyKind::Hold)]
    pub strategy: StrategyKind,

    #[arg(long, default_value_t = 14)]
    pub atr_period: usize,
    #[arg(long, default_value_t = 2.0)]
    pub atr_multiplier: f64,
    #[arg(long, default_value_t = 180)]
    pub rebalance_interval_s: i64,
    #[arg(long, default_value_t = 0.03)]
    pub deviation_threshold: f64,

    #[arg(long, default_value_t = 600)]
    pub base_threshold: i32,
    #[arg(long, default_value_t = 300)]
    pub limit_threshold: i32,
    #[arg(long, default_value_t = 172_800)]
    pub alpha_rebalance_interval_s: i64,

    #[arg(long, default_value_t = 2000)]
    pub position_width_ticks: i32,
    #[arg(long, default_value_t = 50)]
    pub rebalance_threshold_bps: u32,

    #[arg(long, default_value_t = 20)]
    pub sma_period: usize,
    #[arg(long, default_value_t = 2.0)]
    pub std_multiplier: f64,
    #[arg(long, default_value_t = 60)]
    pub min_width_ticks: i32,

    #[arg(long, default_value_t = 100)]
    pub rebalance_cost_bps: u32,
    #[arg(long, default_value_t = 3000)]
    pub fee_tier: u32,
    #[arg(long, default_value_t = 60)]
    pub tick_spacing: u32,
    #[arg(long, default_value_t = 8)]
    pub decimals0: u8,
    #[arg(long, default_value_t = 6)]
    pub decimals1: u8,

    #[arg(long, default_value_t = 60)]
    pub bar_seconds: i64,

    /// Write `value_series.csv`, `actions.csv`, `report.json` here instead
    /// of only printing the summary to stdout.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        if cli.tick_lower.is_some() != cli.tick_upper.is_some() {
            anyhow::bail!("--tick-lower and --tick-upper must be given together");
        }
        Ok(Config {
            data_path: cli.data_path,
            initial_capital_quote: cli.initial_capital_quote,
            start_timestamp: cli.start_timestamp,
            end_timestamp: cli.end_timestamp,
            start_block: cli.start_block,
            end_block: cli.end_block,
            price_range_pct: cli.price_range_pct,
            tick_lower: cli.tick_lower,
            tick_upper: cli.tick_upper,
            strategy: cli.strategy,
            atr_period: cli.atr_period,
            atr_multiplier: cli.atr_multiplier,
            rebalance_interval_s: cli.rebalance_interval_s,
            deviation_threshold: cli.deviation_threshold,
            base_threshold: cli.base_threshold,
            limit_threshold: cli.limit_threshold,
            alpha_rebalance_interval_s: cli.alpha_rebalance_interval_s,
            position_width_ticks: cli.position_width_ticks,
            rebalance_threshold_bps: cli.rebalance_threshold_bps,
            sma_period: cli.sma_period,
            std_multiplier: cli.std_multiplier,
            min_width_ticks: cli.min_width_ticks,
            rebalance_cost_bps: cli.rebalance_cost_bps,
            fee_tier: cli.fee_tier,
            tick_spacing: cli.tick_spacing,
            decimals0: cli.decimals0,
            decimals1: cli.decimals1,
            bar_seconds: cli.bar_seconds,
            output_dir: cli.output_dir,
        })
    }
}
