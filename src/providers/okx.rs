// src/providers/okx.rs
use serde::Deserialize;

use super::{collect_markets, parse_rate, send_json, ExchangeAdapter, FetchError};
use crate::funding::{interval_between, resolve_interval};
use crate::throttle::RateLimiter;
use crate::types::{ExchangeId, FundingQuote, MarketSymbol};

const ID: ExchangeId = ExchangeId::Okx;

pub struct Okx {
    pub http: reqwest::Client,
    pub base_url: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<Vec<T>, FetchError> {
        let detail = || format!("code {}: {}", self.code, self.msg);
        match self.code.as_str() {
            "0" => Ok(self.data),
            // rate limit reached / too many requests per user
            "50011" | "50061" => Err(FetchError::rate_limited(ID, detail())),
            // service unavailable / system busy / endpoint timeout
            "50001" | "50004" | "50013" => Err(FetchError::transient(ID, detail())),
            _ => Err(FetchError::permanent(ID, detail())),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instrument {
    inst_id: String,
    settle_ccy: String,
    state: String,
}

// OKX sends every number as a string, empty when not applicable.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundingRate {
    funding_rate: String,
    funding_time: String,
    #[serde(default)]
    next_funding_time: String,
}

#[async_trait::async_trait]
impl ExchangeAdapter for Okx {
    fn id(&self) -> ExchangeId {
        ID
    }

    async fn list_symbols(&self, limiter: &RateLimiter) -> Result<Vec<MarketSymbol>, FetchError> {
        let url = format!("{}/api/v5/public/instruments", self.base_url);
        let req = self.http.get(url).query(&[("instType", "SWAP")]);
        let resp: Envelope<Instrument> = send_json(limiter, ID, req).await?;
        let listings = resp
            .into_result()?
            .into_iter()
            .filter(|i| i.settle_ccy == "USDT" && i.state == "live")
            .map(|i| (i.inst_id, None));
        Ok(collect_markets(ID, listings))
    }

    async fn fetch_funding(
        &self,
        limiter: &RateLimiter,
        market: &MarketSymbol,
    ) -> Result<FundingQuote, FetchError> {
        let url = format!("{}/api/v5/public/funding-rate", self.base_url);
        let req = self.http.get(url).query(&[("instId", market.raw.as_str())]);
        let resp: Envelope<FundingRate> = send_json(limiter, ID, req).await?;
        let current = resp
            .into_result()?
            .into_iter()
            .next()
            .ok_or_else(|| {
                FetchError::permanent(ID, format!("no funding rate for {}", market.raw))
            })?;

        let rate = parse_rate(ID, "fundingRate", &current.funding_rate)?;
        let funding_time: i64 = current
            .funding_time
            .parse()
            .map_err(|_| {
                let msg = format!("unparseable fundingTime: `{}`", current.funding_time);
                FetchError::permanent(ID, msg)
            })?;
        let gap = current
            .next_funding_time
            .parse::<i64>()
            .ok()
            .and_then(|next| interval_between(funding_time, next));
        let hint = gap.or(market.interval_hint_hours);
        let interval = resolve_interval(hint, &[], ID.default_interval_hours());
        FundingQuote::new(ID, market.symbol.clone(), rate, interval, funding_time)
    }
}
