// src/providers/kraken.rs
use chrono::DateTime;
use serde::Deserialize;

use super::{collect_markets, send_json, ExchangeAdapter, FetchError};
use crate::funding::resolve_interval;
use crate::throttle::RateLimiter;
use crate::types::{ExchangeId, FundingQuote, MarketSymbol};

const ID: ExchangeId = ExchangeId::KrakenFutures;

pub struct KrakenFutures {
    pub http: reqwest::Client,
    pub base_url: String,
}

#[derive(Deserialize)]
struct Status {
    result: String,
    #[serde(default)]
    error: Option<String>,
}

impl Status {
    fn check(&self) -> Result<(), FetchError> {
        if self.result == "success" {
            return Ok(());
        }
        let error = self.error.clone().unwrap_or_else(|| self.result.clone());
        if error.contains("apiLimitExceeded") {
            Err(FetchError::rate_limited(ID, error))
        } else {
            Err(FetchError::permanent(ID, error))
        }
    }
}

#[derive(Deserialize)]
struct Tickers {
    #[serde(flatten)]
    status: Status,
    #[serde(default)]
    tickers: Vec<Ticker>,
}

#[derive(Deserialize)]
struct Ticker {
    symbol: String,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    suspended: bool,
}

#[derive(Deserialize)]
struct FundingHistory {
    #[serde(flatten)]
    status: Status,
    #[serde(default)]
    rates: Vec<FundingRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundingRecord {
    timestamp: String,
    relative_funding_rate: f64,
}

fn parse_ts(raw: &str) -> Result<i64, FetchError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.timestamp_millis())
        .map_err(|e| FetchError::permanent(ID, format!("bad timestamp `{raw}`: {e}")))
}

#[async_trait::async_trait]
impl ExchangeAdapter for KrakenFutures {
    fn id(&self) -> ExchangeId {
        ID
    }

    async fn list_symbols(&self, limiter: &RateLimiter) -> Result<Vec<MarketSymbol>, FetchError> {
        let url = format!("{}/derivatives/api/v3/tickers", self.base_url);
        let resp: Tickers = send_json(limiter, ID, self.http.get(url)).await?;
        resp.status.check()?;
        // PF_ = multi-collateral linear perpetuals; PI_ inverse and FI_/FF_ dated are skipped
        let listings = resp
            .tickers
            .into_iter()
            .filter(|t| {
                t.tag.as_deref() == Some("perpetual") && !t.suspended && t.symbol.starts_with("PF_")
            })
            .map(|t| (t.symbol, None));
        Ok(collect_markets(ID, listings))
    }

    async fn fetch_funding(
        &self,
        limiter: &RateLimiter,
        market: &MarketSymbol,
    ) -> Result<FundingQuote, FetchError> {
        let url = format!("{}/derivatives/api/v4/historicalfundingrates", self.base_url);
        let req = self.http.get(url).query(&[("symbol", market.raw.as_str())]);
        let resp: FundingHistory = send_json(limiter, ID, req).await?;
        resp.status.check()?;

        // full history comes back oldest-first; only the tail matters
        let tail = &resp.rates[resp.rates.len().saturating_sub(2)..];
        let mut times = Vec::with_capacity(tail.len());
        for r in tail {
            times.push(parse_ts(&r.timestamp)?);
        }
        let (latest, ts_ms) = tail
            .iter()
            .zip(times.iter().copied())
            .max_by_key(|(_, ts)| *ts)
            .ok_or_else(|| {
                FetchError::permanent(ID, format!("no funding history for {}", market.raw))
            })?;
        let interval =
            resolve_interval(market.interval_hint_hours, &times, ID.default_interval_hours());
        FundingQuote::new(ID, market.symbol.clone(), latest.relative_funding_rate, interval, ts_ms)
    }
}
