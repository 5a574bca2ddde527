//! Input ingestion — an external-collaborator adapter,
//! not part of the simulation core: owns only JSON-lines shape validation and
//! conversion into the replayer's `ReplayEvent`.

use std::io::BufRead;

use primitive_types::U256;
use serde::Deserialize;

use crate::error::{BacktestError, BacktestResult};
use crate::pool::state::Tick;
use crate::replay::events::{BurnEvent, EventMeta, MintEvent, ReplayEvent, SwapEvent};

/// Line-delimited record shape. Extra/unknown fields are
/// tolerated — `deny_unknown_fields` is deliberately not set.
#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "eventType")]
    event_type: String,
    #[serde(rename = "blockNumber")]
    block_number: Option<u64>,
    #[serde(rename = "blockTimestamp")]
    block_timestamp: i64,
    #[serde(rename = "transactionHash", default)]
    transaction_hash: String,
    #[serde(rename = "logIndex")]
    log_index: Option<u64>,
    owner: Option<String>,
    #[serde(rename = "tickLower")]
    tick_lower: Option<Tick>,
    #[serde(rename = "tickUpper")]
    tick_upper: Option<Tick>,
    liquidity: Option<u128>,
    amount0: Option<String>,
    amount1: Option<String>,
    #[serde(rename = "sqrtPriceX96")]
    sqrt_price_x96: Option<String>,
    tick: Option<Tick>,
}

/// Reads newline-delimited JSON event records from `reader`, converting each
/// to a `ReplayEvent`. A record that doesn't decode or is missing a field
/// its variant requires yields `BacktestError::InputShape` with the 1-based
/// line number and stops ingestion — the
/// replayer's own tolerance (section 4.4) is for *semantically* disagreeing
/// but well-shaped records, not malformed ones.
pub fn read_events<R: BufRead>(reader: R) -> BacktestResult<Vec<ReplayEvent>> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let raw: RawEvent = serde_json::from_str(trimmed).map_err(|e| BacktestError::InputShape {
            line: line_no,
            reason: e.to_string(),
        })?;
        events.push(convert(line_no, raw)?);
    }
    Ok(events)
}

fn require<T>(line: usize, field: &str, value: Option<T>) -> BacktestResult<T> {
    value.ok_or_else(|| BacktestError::InputShape {
        line,
        reason: format!("missing required field `{field}`"),
    })
}

fn parse_u256(line: usize, field: &str, value: &str) -> BacktestResult<U256> {
    U256::from_dec_str(value).map_err(|e| BacktestError::InputShape {
        line,
        reason: format!("field `{field}` is not a base-10 integer: {e}"),
    })
}

fn parse_i128(line: usize, field: &str, value: &str) -> BacktestResult<i128> {
    value.parse::<i128>().map_err(|e| BacktestError::InputShape {
        line,
        reason: format!("field `{field}` is not a signed integer: {e}"),
    })
}

fn convert(line: usize, raw: RawEvent) -> BacktestResult<ReplayEvent> {
    let meta = EventMeta {
        block_number: raw.block_number,
        block_timestamp: raw.block_timestamp,
        transaction_hash: raw.transaction_hash,
        log_index: raw.log_index,
    };

    match raw.event_type.as_str() {
        "Mint" => {
            let owner = require(line, "owner", raw.owner)?;
            let tick_lower = require(line, "tickLower", raw.tick_lower)?;
            let tick_upper = require(line, "tickUpper", raw.tick_upper)?;
            let liquidity = require(line, "liquidity", raw.liquidity)?;
            let amount0 = parse_u256(line, "amount0", &require(line, "amount0", raw.amount0)?)?;
            let amount1 = parse_u256(line, "amount1", &require(line, "amount1", raw.amount1)?)?;
            Ok(ReplayEvent::Mint(MintEvent {
                meta,
                owner,
                tick_lower,
                tick_upper,
                liquidity,
                amount0,
                amount1,
            }))
        }
        "Burn" => {
            let owner = require(line, "owner", raw.owner)?;
            let tick_lower = require(line, "tickLower", raw.tick_lower)?;
            let tick_upper = require(line, "tickUpper", raw.tick_upper)?;
            let liquidity = require(line, "liquidity", raw.liquidity)?;
            Ok(ReplayEvent::Burn(BurnEvent {
                meta,
                owner,
                tick_lower,
                tick_upper,
                liquidity,
            }))
        }
        "Swap" => {
            let amount0 = parse_i128(line, "amount0", &require(line, "amount0", raw.amount0)?)?;
            let amount1 = parse_i128(line, "amount1", &require(line, "amount1", raw.amount1)?)?;
            let sqrt_price_x96 = parse_u256(
                line,
                "sqrtPriceX96",
                &require(line, "sqrtPriceX96", raw.sqrt_price_x96)?,
            )?;
            let liquidity = require(line, "liquidity", raw.liquidity)?;
            let tick = require(line, "tick", raw.tick)?;
            Ok(ReplayEvent::Swap(SwapEvent {
                meta,
                amount0,
                amount1,
                sqrt_price_x96,
                liquidity,
                tick,
            }))
        }
        other => Err(BacktestError::InputShape {
            line,
            reason: format!("unknown eventType `{other}`"),
        }),
    }
}
