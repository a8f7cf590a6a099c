// src/providers/kucoin.rs
use serde::Deserialize;

use super::{collect_markets, send_json, ExchangeAdapter, FetchError};
use crate::funding::resolve_interval;
use crate::throttle::RateLimiter;
use crate::types::{ExchangeId, FundingQuote, MarketSymbol};

const ID: ExchangeId = ExchangeId::KucoinFutures;
const OK: &str = "200000";
const PERPETUAL: &str = "FFWCSX";
const HOUR_MS: u64 = 3_600_000;

pub struct KucoinFutures {
    pub http: reqwest::Client,
    pub base_url: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<T, FetchError> {
        match self.code.as_str() {
            OK => self.data.ok_or_else(|| FetchError::permanent(ID, "missing data")),
            "429000" => {
                Err(FetchError::rate_limited(ID, format!("code {}: {}", self.code, self.msg)))
            }
            code => Err(FetchError::permanent(ID, format!("code {code}: {}", self.msg))),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Contract {
    symbol: String,
    #[serde(rename = "type")]
    kind: String,
    quote_currency: String,
    settle_currency: String,
    is_inverse: bool,
    status: String,
    #[serde(default)]
    funding_rate_granularity: Option<u64>, // ms
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentFunding {
    granularity: u64, // ms
    time_point: i64,
    value: f64,
}

fn granularity_hours(ms: u64) -> Option<u32> {
    (ms >= HOUR_MS).then(|| ((ms + HOUR_MS / 2) / HOUR_MS) as u32)
}

#[async_trait::async_trait]
impl ExchangeAdapter for KucoinFutures {
    fn id(&self) -> ExchangeId {
        ID
    }

    async fn list_symbols(&self, limiter: &RateLimiter) -> Result<Vec<MarketSymbol>, FetchError> {
        let url = format!("{}/api/v1/contracts/active", self.base_url);
        let resp: Envelope<Vec<Contract>> = send_json(limiter, ID, self.http.get(url)).await?;
        let listings = resp
            .into_result()?
            .into_iter()
            .filter(|c| {
                c.kind == PERPETUAL
                    && !c.is_inverse
                    && c.quote_currency == "USDT"
                    && c.settle_currency == "USDT"
                    && c.status == "Open"
            })
            .map(|c| (c.symbol, c.funding_rate_granularity.and_then(granularity_hours)));
        Ok(collect_markets(ID, listings))
    }

    async fn fetch_funding(
        &self,
        limiter: &RateLimiter,
        market: &MarketSymbol,
    ) -> Result<FundingQuote, FetchError> {
        let url = format!("{}/api/v1/funding-rate/{}/current", self.base_url, market.raw);
        let resp: Envelope<CurrentFunding> = send_json(limiter, ID, self.http.get(url)).await?;
        let current = resp.into_result()?;
        // the funding endpoint's own granularity is authoritative
        let hint = granularity_hours(current.granularity).or(market.interval_hint_hours);
        let interval = resolve_interval(hint, &[], ID.default_interval_hours());
        FundingQuote::new(ID, market.symbol.clone(), current.value, interval, current.time_point)
    }
}
