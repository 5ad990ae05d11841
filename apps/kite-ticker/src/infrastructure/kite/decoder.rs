//! Tick Packet Decoder
//!
//! Turns one framed packet into a [`Tick`]. The packet length selects the
//! layout; the instrument token's segment selects price scaling and the
//! tradable flag.
//!
//! | Length | Layout                      | Mode  |
//! |--------|-----------------------------|-------|
//! | 8      | token, last price           | LTP   |
//! | 28     | index quote                 | QUOTE |
//! | 32     | index quote + timestamp     | FULL  |
//! | 44     | quote                       | QUOTE |
//! | 184    | quote + OI + 5x2 depth      | FULL  |
//!
//! Offsets below are byte offsets into the packet. All integers are
//! big-endian `u32` except the depth order count (`u16`).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::instrument::{InstrumentToken, StreamMode};
use crate::domain::streaming::{DEPTH_LEVELS, Depth, DepthLevel, Ohlc, Tick};

/// Length of an LTP packet.
pub const LTP_PACKET_LEN: usize = 8;
/// Length of an index quote packet.
pub const INDEX_QUOTE_PACKET_LEN: usize = 28;
/// Length of an index full packet.
pub const INDEX_FULL_PACKET_LEN: usize = 32;
/// Length of a quote packet.
pub const QUOTE_PACKET_LEN: usize = 44;
/// Length of a full packet with market depth.
pub const FULL_PACKET_LEN: usize = 184;

const DEPTH_OFFSET: usize = 64;
const DEPTH_RECORD_LEN: usize = 12;

/// Packet decode errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// No layout is defined for this packet length.
    #[error("unknown packet length {0}")]
    UnknownLength(usize),
}

/// Decode one packet into a tick.
///
/// # Errors
///
/// Returns `DecodeError::UnknownLength` if the packet length matches no
/// known layout.
pub fn decode_packet(packet: &[u8]) -> Result<Tick, DecodeError> {
    match packet.len() {
        LTP_PACKET_LEN => Ok(decode_ltp(&PacketReader::new(packet))),
        INDEX_QUOTE_PACKET_LEN | INDEX_FULL_PACKET_LEN => Ok(decode_index(&PacketReader::new(packet))),
        QUOTE_PACKET_LEN | FULL_PACKET_LEN => Ok(decode_quote(&PacketReader::new(packet))),
        other => Err(DecodeError::UnknownLength(other)),
    }
}

fn decode_ltp(reader: &PacketReader<'_>) -> Tick {
    Tick::ltp(reader.token, reader.token.segment().is_tradable(), reader.price(4))
}

fn decode_index(reader: &PacketReader<'_>) -> Tick {
    let last_price = reader.price(4);
    let ohlc = Ohlc {
        high: reader.price(8),
        low: reader.price(12),
        open: reader.price(16),
        close: reader.price(20),
    };

    let mut tick = Tick::ltp(reader.token, reader.token.segment().is_tradable(), last_price);
    tick.mode = StreamMode::Quote;
    tick.change = Some(ohlc.change_percent(last_price));
    tick.ohlc = Some(ohlc);

    if reader.len() == INDEX_FULL_PACKET_LEN {
        tick.mode = StreamMode::Full;
        tick.exchange_timestamp = reader.timestamp(28);
    }
    tick
}

fn decode_quote(reader: &PacketReader<'_>) -> Tick {
    let last_price = reader.price(4);
    let ohlc = Ohlc {
        open: reader.price(28),
        high: reader.price(32),
        low: reader.price(36),
        close: reader.price(40),
    };

    let mut tick = Tick::ltp(reader.token, reader.token.segment().is_tradable(), last_price);
    tick.mode = StreamMode::Quote;
    tick.last_quantity = Some(reader.u32_at(8));
    tick.average_price = Some(reader.price(12));
    tick.volume = Some(reader.u32_at(16));
    tick.buy_quantity = Some(reader.u32_at(20));
    tick.sell_quantity = Some(reader.u32_at(24));
    tick.change = Some(ohlc.change_percent(last_price));
    tick.ohlc = Some(ohlc);

    if reader.len() == FULL_PACKET_LEN {
        tick.mode = StreamMode::Full;
        tick.last_trade_time = reader.timestamp(44);
        tick.oi = Some(reader.u32_at(48));
        tick.oi_day_high = Some(reader.u32_at(52));
        tick.oi_day_low = Some(reader.u32_at(56));
        tick.exchange_timestamp = reader.timestamp(60);
        tick.depth = Some(reader.depth());
    }
    tick
}

/// Fixed-offset reader over a packet whose length is already validated.
struct PacketReader<'a> {
    packet: &'a [u8],
    token: InstrumentToken,
    scale: u32,
}

impl<'a> PacketReader<'a> {
    fn new(packet: &'a [u8]) -> Self {
        let mut reader = Self {
            packet,
            token: InstrumentToken::new(0),
            scale: 2,
        };
        reader.token = InstrumentToken::new(reader.u32_at(0));
        reader.scale = reader.token.segment().price_scale();
        reader
    }

    const fn len(&self) -> usize {
        self.packet.len()
    }

    fn u32_at(&self, offset: usize) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.packet[offset..offset + 4]);
        u32::from_be_bytes(buf)
    }

    fn u16_at(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.packet[offset], self.packet[offset + 1]])
    }

    fn price(&self, offset: usize) -> Decimal {
        Decimal::new(i64::from(self.u32_at(offset)), self.scale)
    }

    /// Epoch seconds; zero means the exchange sent no time.
    fn timestamp(&self, offset: usize) -> Option<DateTime<Utc>> {
        match self.u32_at(offset) {
            0 => None,
            secs => DateTime::from_timestamp(i64::from(secs), 0),
        }
    }

    fn depth(&self) -> Depth {
        let mut levels = (0..DEPTH_LEVELS * 2).map(|i| {
            let base = DEPTH_OFFSET + i * DEPTH_RECORD_LEN;
            DepthLevel {
                quantity: self.u32_at(base),
                price: self.price(base + 4),
                orders: self.u16_at(base + 8),
            }
        });

        let buy = levels.by_ref().take(DEPTH_LEVELS).collect();
        let sell = levels.collect();
        Depth { buy, sell }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const NSE_TOKEN: u32 = 408_065; // INFY, segment 1
    const CDS_TOKEN: u32 = 1_001_987; // segment 3
    const INDEX_TOKEN: u32 = 256_265; // NIFTY 50, segment 9

    #[derive(Default)]
    struct PacketBuilder(Vec<u8>);

    impl PacketBuilder {
        fn u32(mut self, value: u32) -> Self {
            self.0.extend_from_slice(&value.to_be_bytes());
            self
        }

        fn u16(mut self, value: u16) -> Self {
            self.0.extend_from_slice(&value.to_be_bytes());
            self
        }

        fn pad_to(mut self, len: usize) -> Vec<u8> {
            self.0.resize(len, 0);
            self.0
        }
    }

    fn quote_packet(token: u32) -> PacketBuilder {
        PacketBuilder::default()
            .u32(token)
            .u32(150_025) // last price
            .u32(25) // last qty
            .u32(149_900) // average
            .u32(1_200_000) // volume
            .u32(5_000) // buy qty
            .u32(6_000) // sell qty
            .u32(148_000) // open
            .u32(151_000) // high
            .u32(147_500) // low
            .u32(145_000) // close
    }

    fn full_packet(token: u32) -> Vec<u8> {
        let mut builder = quote_packet(token)
            .u32(1_700_000_000) // last trade time
            .u32(90_000) // oi
            .u32(95_000) // oi day high
            .u32(85_000) // oi day low
            .u32(1_700_000_005); // exchange timestamp
        for level in 0..10u32 {
            builder = builder
                .u32(100 + level)
                .u32(150_000 + level)
                .u16(u16::try_from(level + 1).unwrap())
                .u16(0);
        }
        builder.pad_to(FULL_PACKET_LEN)
    }

    #[test_case(NSE_TOKEN, 100, Decimal::ONE, true ; "equity paise")]
    #[test_case(CDS_TOKEN, 10_000_000, Decimal::ONE, true ; "currency 1e7")]
    #[test_case(INDEX_TOKEN, 100, Decimal::ONE, false ; "index not tradable")]
    fn ltp_scaling(token: u32, raw: u32, expected: Decimal, tradable: bool) {
        let packet = PacketBuilder::default().u32(token).u32(raw).pad_to(LTP_PACKET_LEN);
        let tick = decode_packet(&packet).unwrap();

        assert_eq!(tick.instrument_token.get(), token);
        assert_eq!(tick.mode, StreamMode::Ltp);
        assert_eq!(tick.last_price, expected);
        assert_eq!(tick.tradable, tradable);
        assert!(tick.ohlc.is_none());
        assert!(tick.volume.is_none());
        assert!(tick.depth.is_none());
    }

    #[test_case(INDEX_TOKEN, INDEX_QUOTE_PACKET_LEN, false ; "index quote")]
    #[test_case(INDEX_TOKEN, INDEX_FULL_PACKET_LEN, false ; "index full")]
    #[test_case(NSE_TOKEN, INDEX_QUOTE_PACKET_LEN, true ; "equity in index quote layout")]
    #[test_case(CDS_TOKEN, INDEX_FULL_PACKET_LEN, true ; "currency in index full layout")]
    fn index_layout_tradability_follows_segment(token: u32, len: usize, tradable: bool) {
        let packet = PacketBuilder::default().u32(token).u32(100).pad_to(len);
        let tick = decode_packet(&packet).unwrap();

        assert!(tick.ohlc.is_some());
        assert_eq!(tick.tradable, tradable);
    }

    #[test]
    fn index_quote_uses_high_low_open_close_order() {
        let packet = PacketBuilder::default()
            .u32(INDEX_TOKEN)
            .u32(1_980_000) // last
            .u32(2_000_000) // high
            .u32(1_950_000) // low
            .u32(1_960_000) // open
            .u32(1_800_000) // close
            .pad_to(INDEX_QUOTE_PACKET_LEN);

        let tick = decode_packet(&packet).unwrap();
        let ohlc = tick.ohlc.unwrap();

        assert_eq!(tick.mode, StreamMode::Quote);
        assert!(!tick.tradable);
        assert_eq!(ohlc.high, Decimal::new(2_000_000, 2));
        assert_eq!(ohlc.low, Decimal::new(1_950_000, 2));
        assert_eq!(ohlc.open, Decimal::new(1_960_000, 2));
        assert_eq!(ohlc.close, Decimal::new(1_800_000, 2));
        assert_eq!(tick.change, Some(Decimal::new(10, 0)));
        assert!(tick.exchange_timestamp.is_none());
    }

    #[test]
    fn index_full_adds_timestamp() {
        let packet = PacketBuilder::default()
            .u32(INDEX_TOKEN)
            .u32(1_980_000)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(1_700_000_000)
            .pad_to(INDEX_FULL_PACKET_LEN);

        let tick = decode_packet(&packet).unwrap();

        assert_eq!(tick.mode, StreamMode::Full);
        assert_eq!(tick.change, Some(Decimal::ZERO));
        assert_eq!(
            tick.exchange_timestamp,
            DateTime::from_timestamp(1_700_000_000, 0)
        );
    }

    #[test]
    fn quote_packet_fields() {
        let packet = quote_packet(NSE_TOKEN).pad_to(QUOTE_PACKET_LEN);
        let tick = decode_packet(&packet).unwrap();

        assert_eq!(tick.mode, StreamMode::Quote);
        assert!(tick.tradable);
        assert_eq!(tick.last_price, Decimal::new(150_025, 2));
        assert_eq!(tick.last_quantity, Some(25));
        assert_eq!(tick.average_price, Some(Decimal::new(149_900, 2)));
        assert_eq!(tick.volume, Some(1_200_000));
        assert_eq!(tick.buy_quantity, Some(5_000));
        assert_eq!(tick.sell_quantity, Some(6_000));

        let ohlc = tick.ohlc.unwrap();
        assert_eq!(ohlc.open, Decimal::new(148_000, 2));
        assert_eq!(ohlc.high, Decimal::new(151_000, 2));
        assert_eq!(ohlc.low, Decimal::new(147_500, 2));
        assert_eq!(ohlc.close, Decimal::new(145_000, 2));

        // (1500.25 - 1450) * 100 / 1450
        let expected = (Decimal::new(150_025, 2) - Decimal::new(145_000, 2))
            * Decimal::ONE_HUNDRED
            / Decimal::new(145_000, 2);
        assert_eq!(tick.change, Some(expected));
        assert!(tick.oi.is_none());
        assert!(tick.depth.is_none());
    }

    #[test]
    fn full_packet_has_depth_and_open_interest() {
        let tick = decode_packet(&full_packet(NSE_TOKEN)).unwrap();

        assert_eq!(tick.mode, StreamMode::Full);
        assert_eq!(tick.oi, Some(90_000));
        assert_eq!(tick.oi_day_high, Some(95_000));
        assert_eq!(tick.oi_day_low, Some(85_000));
        assert_eq!(tick.last_trade_time, DateTime::from_timestamp(1_700_000_000, 0));
        assert_eq!(tick.exchange_timestamp, DateTime::from_timestamp(1_700_000_005, 0));

        let depth = tick.depth.unwrap();
        assert_eq!(depth.buy.len(), 5);
        assert_eq!(depth.sell.len(), 5);
        assert_eq!(depth.len(), 10);

        assert_eq!(
            depth.buy[0],
            DepthLevel {
                quantity: 100,
                price: Decimal::new(150_000, 2),
                orders: 1,
            }
        );
        assert_eq!(
            depth.sell[4],
            DepthLevel {
                quantity: 109,
                price: Decimal::new(150_009, 2),
                orders: 10,
            }
        );
    }

    #[test]
    fn full_currency_packet_scales_depth() {
        let tick = decode_packet(&full_packet(CDS_TOKEN)).unwrap();
        let depth = tick.depth.unwrap();
        assert_eq!(depth.buy[0].price, Decimal::new(150_000, 7));
        assert_eq!(tick.last_price, Decimal::new(150_025, 7));
    }

    #[test]
    fn zero_close_means_zero_change() {
        let packet = PacketBuilder::default()
            .u32(NSE_TOKEN)
            .u32(150_025)
            .pad_to(QUOTE_PACKET_LEN);
        let tick = decode_packet(&packet).unwrap();
        assert_eq!(tick.change, Some(Decimal::ZERO));
    }

    #[test]
    fn zero_timestamp_is_absent() {
        let mut packet = full_packet(NSE_TOKEN);
        packet[44..48].copy_from_slice(&[0; 4]);
        let tick = decode_packet(&packet).unwrap();
        assert!(tick.last_trade_time.is_none());
        assert!(tick.exchange_timestamp.is_some());
    }

    #[test_case(0 ; "empty")]
    #[test_case(4 ; "token only")]
    #[test_case(164 ; "legacy full layout")]
    #[test_case(185 ; "one past full")]
    fn unknown_lengths_are_rejected(len: usize) {
        let packet = vec![0u8; len];
        assert_eq!(decode_packet(&packet), Err(DecodeError::UnknownLength(len)));
    }
}
