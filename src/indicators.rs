//! Indicator library.
//!
//! Aggregates swap-derived price samples into fixed-duration bars
//! (`high`, `low`, `close`), and exposes ATR (Wilder smoothing), SMA, and
//! standard deviation over a sliding window of closed bars. Indicators
//! return `None` until their window is full ("not ready"); strategies must
//! treat that as `Hold`, never as zero.

use std::collections::VecDeque;

/// One closed bar.
#[derive(Clone, Copy, Debug)]
pub struct Bar {
    pub open_ts: i64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Aggregates a stream of `(timestamp, price)` samples into bars of
/// `bar_seconds` width, keeping the last `capacity` closed bars.
#[derive(Debug)]
pub struct BarAggregator {
    bar_seconds: i64,
    capacity: usize,
    bars: VecDeque<Bar>,
    current_bar_start: Option<i64>,
    current: Option<Bar>,
}

impl BarAggregator {
    pub fn new(bar_seconds: i64, capacity: usize) -> Self {
        assert!(bar_seconds > 0, "bar_seconds must be positive");
        BarAggregator {
            bar_seconds,
            capacity,
            bars: VecDeque::with_capacity(capacity),
            current_bar_start: None,
            current: None,
        }
    }

    fn bar_start(&self, timestamp: i64) -> i64 {
        timestamp - timestamp.rem_euclid(self.bar_seconds)
    }

    /// Feeds one price sample. Closes and stores the in-progress bar when
    /// `timestamp` falls into a later bar window.
    pub fn push_sample(&mut self, timestamp: i64, price: f64) {
        let start = self.bar_start(timestamp);
        match (self.current_bar_start, &mut self.current) {
            (Some(cur_start), Some(bar)) if cur_start == start => {
                bar.high = bar.high.max(price);
                bar.low = bar.low.min(price);
                bar.close = price;
            }
            _ => {
                if let Some(bar) = self.current.take() {
                    self.bars.push_back(bar);
                    while self.bars.len() > self.capacity {
                        self.bars.pop_front();
                    }
                }
                self.current_bar_start = Some(start);
                self.current = Some(Bar {
                    open_ts: start,
                    high: price,
                    low: price,
                    close: price,
                });
            }
        }
    }

    /// Closed bars only, oldest first. The in-progress bar is never
    /// included — indicators only operate on closed bars.
    pub fn closed_bars(&self) -> &VecDeque<Bar> {
        &self.bars
    }
}

/// Wilder's average true range, seeded as the simple mean of the first `n`
/// true ranges, thereafter the standard exponential recurrence.
#[derive(Debug, Default)]
pub struct Atr {
    period: usize,
    true_ranges: Vec<f64>,
    value: Option<f64>,
    prev_close: Option<f64>,
    bars_seen: usize,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Atr {
            period,
            true_ranges: Vec::with_capacity(period),
            value: None,
            prev_close: None,
            bars_seen: 0,
        }
    }

    /// Consumes one newly closed bar. Returns `None` ("not ready") until
    /// `period` bars have contributed a true range.
    pub fn on_bar(&mut self, bar: &Bar) -> Option<f64> {
        self.bars_seen += 1;
        let tr = match self.prev_close {
            None => bar.high - bar.low,
            Some(prev_close) => {
                let a = bar.high - bar.low;
                let b = (bar.high - prev_close).abs();
                let c = (bar.low - prev_close).abs();
                a.max(b).max(c)
            }
        };
        self.prev_close = Some(bar.close);

        match self.value {
            None => {
                self.true_ranges.push(tr);
                if self.true_ranges.len() < self.period {
                    return None;
                }
                let seed = self.true_ranges.iter().sum::<f64>() / self.period as f64;
                self.value = Some(seed);
                self.value
            }
            Some(prev_atr) => {
                let next = ((self.period as f64 - 1.0) * prev_atr + tr) / self.period as f64;
                self.value = Some(next);
                self.value
            }
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// Windowed simple moving average over closed-bar closes.
pub fn sma(bars: &VecDeque<Bar>, n: usize) -> Option<f64> {
    if n == 0 || bars.len() < n {
        return None;
    }
    let sum: f64 = bars.iter().rev().take(n).map(|b| b.close).sum();
    Some(sum / n as f64)
}

/// Windowed (population) standard deviation over closed-bar closes.
pub fn std_dev(bars: &VecDeque<Bar>, n: usize) -> Option<f64> {
    if n == 0 || bars.len() < n {
        return None;
    }
    let mean = sma(bars, n)?;
    let variance: f64 = bars
        .iter()
        .rev()
        .take(n)
        .map(|b| {
            let d = b.close - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;
    Some(variance.sqrt())
}
