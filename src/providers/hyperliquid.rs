// src/providers/hyperliquid.rs
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use serde_with::{serde_as, DisplayFromStr};

use super::{collect_markets, send_json, ExchangeAdapter, FetchError};
use crate::funding::resolve_interval;
use crate::throttle::RateLimiter;
use crate::types::{ExchangeId, FundingQuote, MarketSymbol};

const ID: ExchangeId = ExchangeId::Hyperliquid;
// hourly funding: a few hours back always holds the last two settlements
const HISTORY_LOOKBACK_MS: i64 = 3 * 3_600_000;

pub struct Hyperliquid {
    pub http: reqwest::Client,
    pub base_url: String,
}

#[derive(Deserialize)]
struct Meta {
    universe: Vec<Asset>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Asset {
    name: String,
    #[serde(default)]
    is_delisted: bool,
}

#[serde_as]
#[derive(Deserialize)]
struct FundingRecord {
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "fundingRate")]
    funding_rate: f64,
    time: i64,
}

impl Hyperliquid {
    fn info(&self, body: serde_json::Value) -> reqwest::RequestBuilder {
        self.http.post(format!("{}/info", self.base_url)).json(&body)
    }
}

#[async_trait::async_trait]
impl ExchangeAdapter for Hyperliquid {
    fn id(&self) -> ExchangeId {
        ID
    }

    async fn list_symbols(&self, limiter: &RateLimiter) -> Result<Vec<MarketSymbol>, FetchError> {
        let meta: Meta = send_json(limiter, ID, self.info(json!({"type": "meta"}))).await?;
        let listings = meta
            .universe
            .into_iter()
            .filter(|a| !a.is_delisted)
            .map(|a| (a.name, None));
        Ok(collect_markets(ID, listings))
    }

    async fn fetch_funding(
        &self,
        limiter: &RateLimiter,
        market: &MarketSymbol,
    ) -> Result<FundingQuote, FetchError> {
        let start = Utc::now().timestamp_millis() - HISTORY_LOOKBACK_MS;
        let body = json!({"type": "fundingHistory", "coin": market.raw, "startTime": start});
        let history: Vec<FundingRecord> = send_json(limiter, ID, self.info(body)).await?;

        let latest = history
            .iter()
            .max_by_key(|r| r.time)
            .ok_or_else(|| {
                FetchError::permanent(ID, format!("no funding history for {}", market.raw))
            })?;
        let times: Vec<i64> = history.iter().map(|r| r.time).collect();
        let interval =
            resolve_interval(market.interval_hint_hours, &times, ID.default_interval_hours());
        FundingQuote::new(ID, market.symbol.clone(), latest.funding_rate, interval, latest.time)
    }
}
