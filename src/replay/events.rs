//! Event record shapes for the replayer.
//!
//! These are the simulation core's own domain types — deserialization from the
//! line-delimited input format lives in `crate::io::events` and converts
//! into these.

use primitive_types::U256;

use crate::pool::state::Tick;

/// Ordering key: `blockTimestamp`, ties broken by `(blockNumber, logIndex)`
/// when present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventMeta {
    pub block_number: Option<u64>,
    pub block_timestamp: i64,
    pub transaction_hash: String,
    pub log_index: Option<u64>,
}

impl EventMeta {
    fn order_key(&self) -> (i64, Option<u64>, Option<u64>) {
        (self.block_timestamp, self.block_number, self.log_index)
    }
}

#[derive(Clone, Debug)]
pub struct MintEvent {
    pub meta: EventMeta,
    pub owner: String,
    pub tick_lower: Tick,
    pub tick_upper: Tick,
    pub liquidity: u128,
    pub amount0: U256,
    pub amount1: U256,
}

#[derive(Clone, Debug)]
pub struct BurnEvent {
    pub meta: EventMeta,
    pub owner: String,
    pub tick_lower: Tick,
    pub tick_upper: Tick,
    pub liquidity: u128,
}

#[derive(Clone, Debug)]
pub struct SwapEvent {
    pub meta: EventMeta,
    pub amount0: i128,
    pub amount1: i128,
    pub sqrt_price_x96: U256,
    pub liquidity: u128,
    pub tick: Tick,
}

#[derive(Clone, Debug)]
pub enum ReplayEvent {
    Mint(MintEvent),
    Burn(BurnEvent),
    Swap(SwapEvent),
}

impl ReplayEvent {
    pub fn meta(&self) -> &EventMeta {
        match self {
            ReplayEvent::Mint(e) => &e.meta,
            ReplayEvent::Burn(e) => &e.meta,
            ReplayEvent::Swap(e) => &e.meta,
        }
    }
}

/// Sorts events into the replay order: ascending `(block_timestamp,
/// block_number, log_index)`. `sort_by_key` is a stable sort, so events with
/// an identical ordering key (e.g. both block number and logIndex absent)
/// keep their input order.
pub fn order_events(mut events: Vec<ReplayEvent>) -> Vec<ReplayEvent> {
    events.sort_by_key(|e| e.meta().order_key());
    events
}
