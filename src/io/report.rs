//! Report rendering — an external-collaborator pure
//! function over the driver's own time-series and summary structs; no
//! backtest semantics live here.

use std::fmt::Write as _;

use chrono::{TimeZone, Utc};
use rust_decimal::prelude::*;
use serde::Serialize;

use crate::driver::{ActionRecord, Summary, ValueSample};
use crate::error::BacktestResult;

fn iso8601(timestamp: i64) -> String {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}

fn decimal_or_raw(v: f64) -> String {
    Decimal::from_f64(v)
        .map(|d| d.round_dp(10).normalize().to_string())
        .unwrap_or_else(|| v.to_string())
}

/// Value/price/fee time-series as CSV, one row per event.
pub fn value_series_csv(samples: &[ValueSample]) -> BacktestResult<String> {
    let mut out = String::new();
    out.push_str("timestamp,datetime,spot_price,portfolio_value,fees_accum_quote,active_range_lower,active_range_upper\n");
    for s in samples {
        let (lo, hi) = s
            .active_range
            .map(|(l, h)| (l.to_string(), h.to_string()))
            .unwrap_or_default();
        writeln!(
            out,
            "{},{},{},{},{},{},{}",
            s.timestamp,
            iso8601(s.timestamp),
            decimal_or_raw(s.spot_price),
            decimal_or_raw(s.portfolio_value),
            decimal_or_raw(s.fees_accum_quote),
            lo,
            hi,
        )
        .expect("writing to a String cannot fail");
    }
    Ok(out)
}

/// Per-event action log as CSV.
pub fn action_log_csv(actions: &[ActionRecord]) -> BacktestResult<String> {
    let mut out = String::new();
    out.push_str("timestamp,datetime,description\n");
    for a in actions {
        writeln!(
            out,
            "{},{},\"{}\"",
            a.timestamp,
            iso8601(a.timestamp),
            a.description.replace('"', "\"\"")
        )
        .expect("writing to a String cannot fail");
    }
    Ok(out)
}

#[derive(Serialize)]
struct ReportJson<'a> {
    value_series: &'a [ValueSample],
    actions: &'a [ActionRecord],
    summary: &'a SummaryJson,
}

#[derive(Serialize)]
struct SummaryJson {
    total_return: f64,
    max_drawdown: f64,
    rebalance_count: u64,
    gas_spent_quote: String,
    impermanent_loss: f64,
    discrepancy_count: usize,
    strategy_precondition_drops: u64,
}

impl From<&Summary> for SummaryJson {
    fn from(s: &Summary) -> Self {
        SummaryJson {
            total_return: s.total_return,
            max_drawdown: s.max_drawdown,
            rebalance_count: s.rebalance_count,
            gas_spent_quote: s.gas_spent_quote.to_string(),
            impermanent_loss: s.impermanent_loss,
            discrepancy_count: s.discrepancy_count,
            strategy_precondition_drops: s.strategy_precondition_drops,
        }
    }
}

// `ValueSample`/`ActionRecord` need `Serialize` for the combined JSON report;
// the driver's own structs stay free of serde, so this module mirrors their
// fields into a local shape instead.
#[derive(Serialize)]
struct ValueSampleJson {
    timestamp: i64,
    datetime: String,
    spot_price: f64,
    portfolio_value: f64,
    fees_accum_quote: f64,
    active_range_lower: Option<i32>,
    active_range_upper: Option<i32>,
}

#[derive(Serialize)]
struct ActionRecordJson {
    timestamp: i64,
    datetime: String,
    description: String,
}

/// Renders the full report (value series, action log, summary) as one JSON
/// document.
pub fn report_json(samples: &[ValueSample], actions: &[ActionRecord], summary: &Summary) -> BacktestResult<String> {
    let values: Vec<ValueSampleJson> = samples
        .iter()
        .map(|s| ValueSampleJson {
            timestamp: s.timestamp,
            datetime: iso8601(s.timestamp),
            spot_price: s.spot_price,
            portfolio_value: s.portfolio_value,
            fees_accum_quote: s.fees_accum_quote,
            active_range_lower: s.active_range.map(|(l, _)| l),
            active_range_upper: s.active_range.map(|(_, h)| h),
        })
        .collect();
    let action_rows: Vec<ActionRecordJson> = actions
        .iter()
        .map(|a| ActionRecordJson {
            timestamp: a.timestamp,
            datetime: iso8601(a.timestamp),
            description: a.description.clone(),
        })
        .collect();
    let summary_json = SummaryJson::from(summary);

    #[derive(Serialize)]
    struct Full {
        value_series: Vec<ValueSampleJson>,
        actions: Vec<ActionRecordJson>,
        summary: SummaryJson,
    }
    let full = Full {
        value_series: values,
        actions: action_rows,
        summary: summary_json,
    };
    Ok(serde_json::to_string_pretty(&full)?)
}
