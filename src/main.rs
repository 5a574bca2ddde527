use std::fs;

use clap::Parser;

mod bootstrap;
mod config;
mod driver;
mod error;
mod indicators;
mod io;
mod math;
mod pool;
mod replay;
mod strategy;
mod valuation;

use config::{Cli, Config};
use error::BacktestError;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::from_cli(cli)?;

    let mut backtest = bootstrap::Backtest::new(&config)?;
    log::debug!("loaded {} events from {}", backtest.events.len(), config.data_path.display());

    for event in &backtest.events {
        if let Err(e) = backtest.driver.step(event) {
            match e {
                BacktestError::NumericalOverflow { .. } => {
                    log::error!("fatal: {e}");
                    return Err(e.into());
                }
                other => {
                    // Recoverable kinds never escape `Driver::step` as `Err`
                    // today, but handle defensively should that change.
                    log::warn!("{other}");
                }
            }
        }
    }

    let summary = backtest.driver.summary();
    println!("strategy: {}", backtest.driver.strategy.name());
    println!("total_return: {:.6}", summary.total_return);
    println!("max_drawdown: {:.6}", summary.max_drawdown);
    println!("rebalance_count: {}", summary.rebalance_count);
    println!("gas_spent_quote: {}", summary.gas_spent_quote);
    println!("impermanent_loss: {:.6}", summary.impermanent_loss);
    println!("discrepancy_count: {}", summary.discrepancy_count);
    println!("strategy_precondition_drops: {}", summary.strategy_precondition_drops);

    if let Some(dir) = &config.output_dir {
        fs::create_dir_all(dir)?;
        fs::write(dir.join("value_series.csv"), io::report::value_series_csv(&backtest.driver.value_series)?)?;
        fs::write(dir.join("actions.csv"), io::report::action_log_csv(&backtest.driver.action_log)?)?;
        fs::write(
            dir.join("report.json"),
            io::report::report_json(&backtest.driver.value_series, &backtest.driver.action_log, &summary)?,
        )?;
        log::debug!("wrote report artifacts to {}", dir.display());
    }

    Ok(())
}
