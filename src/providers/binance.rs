// src/providers/binance.rs
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};

use super::{collect_markets, send_json, ExchangeAdapter, FetchError};
use crate::funding::resolve_interval;
use crate::throttle::RateLimiter;
use crate::types::{ExchangeId, FundingQuote, MarketSymbol};

const ID: ExchangeId = ExchangeId::BinanceUsdm;

pub struct BinanceUsdm {
    pub http: reqwest::Client,
    pub base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeInfo {
    symbols: Vec<ContractInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractInfo {
    symbol: String,
    contract_type: String,
    quote_asset: String,
    status: String,
}

#[serde_as]
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundingRecord {
    #[serde_as(as = "DisplayFromStr")]
    funding_rate: f64,
    funding_time: i64,
}

#[async_trait::async_trait]
impl ExchangeAdapter for BinanceUsdm {
    fn id(&self) -> ExchangeId {
        ID
    }

    async fn list_symbols(&self, limiter: &RateLimiter) -> Result<Vec<MarketSymbol>, FetchError> {
        let url = format!("{}/fapi/v1/exchangeInfo", self.base_url);
        let info: ExchangeInfo = send_json(limiter, ID, self.http.get(url)).await?;
        let listings = info
            .symbols
            .into_iter()
            .filter(|c| {
                c.contract_type == "PERPETUAL" && c.quote_asset == "USDT" && c.status == "TRADING"
            })
            .map(|c| (c.symbol, None));
        Ok(collect_markets(ID, listings))
    }

    async fn fetch_funding(
        &self,
        limiter: &RateLimiter,
        market: &MarketSymbol,
    ) -> Result<FundingQuote, FetchError> {
        let url = format!("{}/fapi/v1/fundingRate", self.base_url);
        let req = self.http.get(url).query(&[("symbol", market.raw.as_str()), ("limit", "2")]);
        let history: Vec<FundingRecord> = send_json(limiter, ID, req).await?;

        let latest = history
            .iter()
            .max_by_key(|r| r.funding_time)
            .ok_or_else(|| {
                FetchError::permanent(ID, format!("no funding history for {}", market.raw))
            })?;
        let times: Vec<i64> = history.iter().map(|r| r.funding_time).collect();
        let interval =
            resolve_interval(market.interval_hint_hours, &times, ID.default_interval_hours());
        FundingQuote::new(
            ID,
            market.symbol.clone(),
            latest.funding_rate,
            interval,
            latest.funding_time,
        )
    }
}
