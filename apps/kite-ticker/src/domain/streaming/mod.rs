//! Market Data Streaming Types
//!
//! Decoded tick snapshots. A tick is produced once from a wire packet and
//! never mutated afterwards; fields that the packet's mode does not carry
//! are `None`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::instrument::{InstrumentToken, StreamMode};

/// Number of depth levels per side in a full packet.
pub const DEPTH_LEVELS: usize = 5;

/// Open/high/low/close prices for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ohlc {
    /// Session open.
    pub open: Decimal,
    /// Session high.
    pub high: Decimal,
    /// Session low.
    pub low: Decimal,
    /// Previous close.
    pub close: Decimal,
}

impl Ohlc {
    /// Percent change of `last_price` against the previous close.
    ///
    /// Zero when the close is zero (new listings, pre-open).
    #[must_use]
    pub fn change_percent(&self, last_price: Decimal) -> Decimal {
        if self.close.is_zero() {
            return Decimal::ZERO;
        }
        (last_price - self.close) * Decimal::ONE_HUNDRED / self.close
    }
}

/// One price level of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    /// Aggregate quantity at this level.
    pub quantity: u32,
    /// Level price.
    pub price: Decimal,
    /// Number of orders at this level.
    pub orders: u16,
}

/// Five best bids and five best asks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Depth {
    /// Bid levels, best first.
    pub buy: Vec<DepthLevel>,
    /// Ask levels, best first.
    pub sell: Vec<DepthLevel>,
}

impl Depth {
    /// Total number of levels on both sides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buy.len() + self.sell.len()
    }

    /// Whether the book has no levels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buy.is_empty() && self.sell.is_empty()
    }
}

/// A decoded market data update for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Instrument the tick belongs to.
    pub instrument_token: InstrumentToken,
    /// Mode the packet was sent in.
    pub mode: StreamMode,
    /// Whether the instrument is tradable (false for indices).
    pub tradable: bool,
    /// Last traded price.
    pub last_price: Decimal,
    /// Last traded quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_quantity: Option<u32>,
    /// Volume-weighted average traded price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_price: Option<Decimal>,
    /// Volume traded for the day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u32>,
    /// Total pending buy quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buy_quantity: Option<u32>,
    /// Total pending sell quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sell_quantity: Option<u32>,
    /// Session OHLC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ohlc: Option<Ohlc>,
    /// Percent change against the previous close.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<Decimal>,
    /// Time of the last trade.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trade_time: Option<DateTime<Utc>>,
    /// Open interest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oi: Option<u32>,
    /// Day high of open interest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oi_day_high: Option<u32>,
    /// Day low of open interest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oi_day_low: Option<u32>,
    /// Exchange timestamp of the update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_timestamp: Option<DateTime<Utc>>,
    /// Market depth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<Depth>,
}

impl Tick {
    /// Create an LTP-only tick.
    #[must_use]
    pub const fn ltp(instrument_token: InstrumentToken, tradable: bool, last_price: Decimal) -> Self {
        Self {
            instrument_token,
            mode: StreamMode::Ltp,
            tradable,
            last_price,
            last_quantity: None,
            average_price: None,
            volume: None,
            buy_quantity: None,
            sell_quantity: None,
            ohlc: None,
            change: None,
            last_trade_time: None,
            oi: None,
            oi_day_high: None,
            oi_day_low: None,
            exchange_timestamp: None,
            depth: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ohlc(close: Decimal) -> Ohlc {
        Ohlc {
            open: Decimal::new(100, 0),
            high: Decimal::new(110, 0),
            low: Decimal::new(90, 0),
            close,
        }
    }

    #[test]
    fn change_against_close() {
        let change = ohlc(Decimal::new(100, 0)).change_percent(Decimal::new(105, 0));
        assert_eq!(change, Decimal::new(5, 0));

        let change = ohlc(Decimal::new(200, 0)).change_percent(Decimal::new(150, 0));
        assert_eq!(change, Decimal::new(-25, 0));
    }

    #[test]
    fn change_is_zero_without_close() {
        let change = ohlc(Decimal::ZERO).change_percent(Decimal::new(4084, 0));
        assert_eq!(change, Decimal::ZERO);
    }

    #[test]
    fn ltp_tick_has_only_price() {
        let tick = Tick::ltp(InstrumentToken::new(408_065), true, Decimal::new(150_025, 2));
        assert_eq!(tick.mode, StreamMode::Ltp);
        assert!(tick.ohlc.is_none());
        assert!(tick.depth.is_none());

        let json = serde_json::to_value(&tick).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 4, "unexpected keys: {keys:?}");
    }

    #[test]
    fn depth_len_counts_both_sides() {
        let level = DepthLevel {
            quantity: 10,
            price: Decimal::ONE,
            orders: 1,
        };
        let depth = Depth {
            buy: vec![level; DEPTH_LEVELS],
            sell: vec![level; DEPTH_LEVELS],
        };
        assert_eq!(depth.len(), 10);
        assert!(!depth.is_empty());
    }
}
