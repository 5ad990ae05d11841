//! Instrument Identity Types
//!
//! Instrument tokens, exchange segments, and streaming modes.
//!
//! An instrument token is assigned by the upstream instrument master. Its
//! low byte carries the exchange segment, which decides how prices are
//! scaled and whether the instrument is tradable.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Segment
// =============================================================================

/// Exchange segment encoded in the low byte of an instrument token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    /// NSE equities.
    Nse,
    /// NSE futures and options.
    Nfo,
    /// NSE currency derivatives.
    Cds,
    /// BSE equities.
    Bse,
    /// BSE futures and options.
    Bfo,
    /// BSE currency derivatives.
    Bcd,
    /// MCX commodities.
    Mcx,
    /// MCX-SX.
    Mcxsx,
    /// Indices (never tradable).
    Indices,
    /// Segment code not known to this client.
    Unknown(u8),
}

impl Segment {
    /// Map a raw segment code to a segment.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Nse,
            2 => Self::Nfo,
            3 => Self::Cds,
            4 => Self::Bse,
            5 => Self::Bfo,
            6 => Self::Bcd,
            7 => Self::Mcx,
            8 => Self::Mcxsx,
            9 => Self::Indices,
            other => Self::Unknown(other),
        }
    }

    /// Raw segment code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Nse => 1,
            Self::Nfo => 2,
            Self::Cds => 3,
            Self::Bse => 4,
            Self::Bfo => 5,
            Self::Bcd => 6,
            Self::Mcx => 7,
            Self::Mcxsx => 8,
            Self::Indices => 9,
            Self::Unknown(code) => code,
        }
    }

    /// Number of decimal places used by scaled integer prices.
    ///
    /// Currency derivatives are quoted in units of 1e-7, everything else
    /// in paise (1e-2).
    #[must_use]
    pub const fn price_scale(self) -> u32 {
        match self {
            Self::Cds => 7,
            _ => 2,
        }
    }

    /// Whether instruments in this segment can be traded.
    #[must_use]
    pub const fn is_tradable(self) -> bool {
        !matches!(self, Self::Indices)
    }
}

// =============================================================================
// Instrument Token
// =============================================================================

/// Numeric instrument identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentToken(u32);

impl InstrumentToken {
    /// Wrap a raw token.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw token value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Segment carried in the token's low byte.
    #[must_use]
    pub const fn segment(self) -> Segment {
        Segment::from_code(self.0.to_le_bytes()[0])
    }
}

impl From<u32> for InstrumentToken {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for InstrumentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Stream Mode
// =============================================================================

/// Subscription granularity, ordered by information richness.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Last traded price only.
    Ltp,
    /// Quote without market depth.
    #[default]
    Quote,
    /// Quote with timestamps, open interest, and market depth.
    Full,
}

impl StreamMode {
    /// All modes, from least to most detailed.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Ltp, Self::Quote, Self::Full]
    }

    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ltp => "ltp",
            Self::Quote => "quote",
            Self::Full => "full",
        }
    }

    /// Parse mode from string, ignoring case.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ltp" => Some(Self::Ltp),
            "quote" => Some(Self::Quote),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_from_token_low_byte() {
        // RELIANCE on NSE
        assert_eq!(InstrumentToken::new(738_561).segment(), Segment::Nse);
        // NIFTY 50 index
        assert_eq!(InstrumentToken::new(256_265).segment(), Segment::Indices);
        assert_eq!(InstrumentToken::new(0x0000_1203).segment(), Segment::Cds);
        assert_eq!(InstrumentToken::new(0x0000_12ff).segment(), Segment::Unknown(0xff));
    }

    #[test]
    fn segment_code_roundtrip() {
        for code in 0..=u8::MAX {
            assert_eq!(Segment::from_code(code).code(), code);
        }
    }

    #[test]
    fn only_indices_are_untradable() {
        assert!(!Segment::Indices.is_tradable());
        assert!(Segment::Nse.is_tradable());
        assert!(Segment::Cds.is_tradable());
        assert!(Segment::Unknown(42).is_tradable());
    }

    #[test]
    fn currency_derivatives_use_seven_decimals() {
        assert_eq!(Segment::Cds.price_scale(), 7);
        assert_eq!(Segment::Bcd.price_scale(), 2);
        assert_eq!(Segment::Nse.price_scale(), 2);
    }

    #[test]
    fn mode_ordering_follows_richness() {
        assert!(StreamMode::Ltp < StreamMode::Quote);
        assert!(StreamMode::Quote < StreamMode::Full);
        assert_eq!(StreamMode::default(), StreamMode::Quote);
    }

    #[test]
    fn mode_serialization() {
        assert_eq!(serde_json::to_string(&StreamMode::Full).unwrap(), "\"full\"");
        assert_eq!(
            StreamMode::from_str_case_insensitive("LTP"),
            Some(StreamMode::Ltp)
        );
        assert_eq!(StreamMode::from_str_case_insensitive("depth"), None);
    }

    #[test]
    fn token_serializes_as_number() {
        let token = InstrumentToken::new(408_065);
        assert_eq!(serde_json::to_string(&token).unwrap(), "408065");
    }
}
