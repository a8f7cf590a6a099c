// src/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::providers::FetchError;

/// Supported perpetual-futures venues, in default scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeId {
    BinanceUsdm,
    KucoinFutures,
    Okx,
    Bybit,
    KrakenFutures,
    Hyperliquid,
}

impl ExchangeId {
    pub const ALL: [ExchangeId; 6] = [
        ExchangeId::BinanceUsdm,
        ExchangeId::KucoinFutures,
        ExchangeId::Okx,
        ExchangeId::Bybit,
        ExchangeId::KrakenFutures,
        ExchangeId::Hyperliquid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::BinanceUsdm => "binanceusdm",
            ExchangeId::KucoinFutures => "kucoinfutures",
            ExchangeId::Okx => "okx",
            ExchangeId::Bybit => "bybit",
            ExchangeId::KrakenFutures => "krakenfutures",
            ExchangeId::Hyperliquid => "hyperliquid",
        }
    }

    /// Funding interval used when neither the listing nor the settlement
    /// history tells us otherwise.
    pub fn default_interval_hours(&self) -> u32 {
        match self {
            ExchangeId::KrakenFutures | ExchangeId::Hyperliquid => 1,
            _ => 8,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ExchangeId::BinanceUsdm => "https://fapi.binance.com",
            ExchangeId::KucoinFutures => "https://api-futures.kucoin.com",
            ExchangeId::Okx => "https://www.okx.com",
            ExchangeId::Bybit => "https://api.bybit.com",
            ExchangeId::KrakenFutures => "https://futures.kraken.com",
            ExchangeId::Hyperliquid => "https://api.hyperliquid.xyz",
        }
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ExchangeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ExchangeId::ALL
            .into_iter()
            .find(|e| e.as_str() == wanted)
            .ok_or_else(|| format!("unknown exchange `{s}`"))
    }
}

/// A tradable perpetual as listed by one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketSymbol {
    pub symbol: String,                   // normalized, e.g. "BTC"
    pub raw: String,                      // exchange-native, e.g. "PF_XBTUSD"
    pub interval_hint_hours: Option<u32>, // when the listing publishes it
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingQuote {
    pub exchange: ExchangeId,
    pub symbol: String,
    pub funding_rate: f64,           // signed fraction per interval (e.g. 0.0001 = 0.01%)
    pub funding_interval_hours: u32, // never zero
    pub ts_ms: i64,
}

impl FundingQuote {
    pub fn new(
        exchange: ExchangeId,
        symbol: impl Into<String>,
        funding_rate: f64,
        funding_interval_hours: u32,
        ts_ms: i64,
    ) -> Result<Self, FetchError> {
        if funding_interval_hours == 0 {
            return Err(FetchError::permanent(exchange, "zero funding interval"));
        }
        if !funding_rate.is_finite() {
            return Err(FetchError::permanent(exchange, "non-finite funding rate"));
        }
        Ok(Self {
            exchange,
            symbol: symbol.into(),
            funding_rate,
            funding_interval_hours,
            ts_ms,
        })
    }

    /// Yearly percentage: `rate * (24 / interval_h) * 365 * 100`.
    pub fn annualized_rate(&self) -> f64 {
        crate::funding::annualize(self.funding_rate, self.funding_interval_hours)
    }

    pub fn annualized(&self) -> AnnualizedQuote {
        AnnualizedQuote {
            exchange: self.exchange,
            symbol: self.symbol.clone(),
            funding_rate: self.funding_rate,
            funding_interval_hours: self.funding_interval_hours,
            annualized_rate: self.annualized_rate(),
            ts_ms: self.ts_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualizedQuote {
    pub exchange: ExchangeId,
    pub symbol: String,
    pub funding_rate: f64,
    pub funding_interval_hours: u32,
    pub annualized_rate: f64, // percent per year, positive = longs pay shorts
    pub ts_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub symbol: String,
    pub long_exchange: ExchangeId,
    pub short_exchange: ExchangeId,
    pub spread: f64,     // annualized percent, never negative
    pub long_rate: f64,  // annualized percent
    pub short_rate: f64, // annualized percent
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStage {
    Listing,
    Funding,
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            FetchStage::Listing => "listing",
            FetchStage::Funding => "funding",
        })
    }
}

/// An exchange that stopped contributing during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedExchange {
    pub exchange: ExchangeId,
    pub stage: FetchStage,
    pub reason: String,
}

/// A single (exchange, symbol) quote that could not be fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmittedQuote {
    pub exchange: ExchangeId,
    pub symbol: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_ids_round_trip_through_strings() {
        for ex in ExchangeId::ALL {
            assert_eq!(ex.as_str().parse::<ExchangeId>().unwrap(), ex);
        }
        assert_eq!(" OKX ".parse::<ExchangeId>().unwrap(), ExchangeId::Okx);
        assert!("ftx".parse::<ExchangeId>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_ids() {
        let s = serde_json::to_string(&ExchangeId::KrakenFutures).unwrap();
        assert_eq!(s, "\"krakenfutures\"");
        let back: ExchangeId = serde_json::from_str("\"binanceusdm\"").unwrap();
        assert_eq!(back, ExchangeId::BinanceUsdm);
    }

    #[test]
    fn quote_rejects_zero_interval_and_nan() {
        assert!(FundingQuote::new(ExchangeId::Okx, "BTC", 0.0001, 0, 0).is_err());
        assert!(FundingQuote::new(ExchangeId::Okx, "BTC", f64::NAN, 8, 0).is_err());
        assert!(FundingQuote::new(ExchangeId::Okx, "BTC", -0.0001, 8, 0).is_ok());
    }

    #[test]
    fn annualized_quote_carries_its_interval() {
        let q = FundingQuote::new(ExchangeId::Hyperliquid, "ETH", 0.0000125, 1, 42).unwrap();
        let a = q.annualized();
        assert_eq!(a.funding_interval_hours, 1);
        assert_eq!(a.ts_ms, 42);
        assert!((a.annualized_rate - 10.95).abs() < 1e-9);
    }
}
