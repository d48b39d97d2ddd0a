//! OHLC aggregation of price observations.
//!
//! Windows are aligned to multiples of `interval` since the Unix epoch and
//! span from the window of the oldest observation to the window containing
//! `now`. A window without observations repeats the previous close.

use chrono::{DateTime, Duration, Utc};
use poolbatch_types::{PoolbatchError, PriceObservation, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLC window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Observations that fell into this window (zero for a filled gap).
    pub observations: usize,
}

impl Candle {
    fn flat(open_time: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            open_time,
            open: price,
            high: price,
            low: price,
            close: price,
            observations: 0,
        }
    }

    fn push(&mut self, price: Decimal) {
        if self.observations == 0 {
            self.open = price;
            self.high = price;
            self.low = price;
        }
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.observations += 1;
    }
}

fn window_start(at: DateTime<Utc>, interval_ms: i64) -> Result<DateTime<Utc>> {
    let start = at.timestamp_millis().div_euclid(interval_ms) * interval_ms;
    DateTime::from_timestamp_millis(start)
        .ok_or_else(|| PoolbatchError::Internal(format!("window start {start} out of range")))
}

/// Candles oldest first. Observations after `now` are ignored.
pub fn candles(
    observations: &[PriceObservation],
    interval: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<Candle>> {
    let interval_ms = interval.num_milliseconds();
    if interval_ms <= 0 {
        return Err(PoolbatchError::InvalidAmount {
            reason: format!("candle interval {interval} must be positive"),
        });
    }
    let mut sorted: Vec<&PriceObservation> =
        observations.iter().filter(|o| o.observed_at <= now).collect();
    sorted.sort_by_key(|o| o.observed_at);
    let Some(first) = sorted.first() else {
        return Ok(Vec::new());
    };

    let mut out: Vec<Candle> = Vec::new();
    let mut current = Candle::flat(window_start(first.observed_at, interval_ms)?, first.price);
    let last_window = window_start(now, interval_ms)?;
    let mut pending = sorted.into_iter().peekable();

    loop {
        let window_end = current.open_time + interval;
        while let Some(obs) = pending.next_if(|o| o.observed_at < window_end) {
            current.push(obs.price);
        }
        if current.open_time >= last_window {
            out.push(current);
            break;
        }
        let close = current.close;
        out.push(current);
        current = Candle::flat(window_end, close);
    }
    Ok(out)
}
