// src/providers/bybit.rs
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};

use super::{collect_markets, send_json, ExchangeAdapter, FetchError};
use crate::funding::resolve_interval;
use crate::throttle::RateLimiter;
use crate::types::{ExchangeId, FundingQuote, MarketSymbol};

const ID: ExchangeId = ExchangeId::Bybit;
// linear has a few hundred contracts; this bounds a misbehaving cursor
const MAX_PAGES: usize = 10;

pub struct Bybit {
    pub http: reqwest::Client,
    pub base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    result: Option<T>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<T, FetchError> {
        let detail = || format!("retCode {}: {}", self.ret_code, self.ret_msg);
        match self.ret_code {
            0 => self.result.ok_or_else(|| FetchError::permanent(ID, "missing result")),
            // too many visits / IP banned
            10006 | 10018 => Err(FetchError::rate_limited(ID, detail())),
            10000 | 10016 => Err(FetchError::transient(ID, detail())),
            _ => Err(FetchError::permanent(ID, detail())),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default = "Vec::new")]
    list: Vec<T>,
    #[serde(default)]
    next_page_cursor: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instrument {
    symbol: String,
    contract_type: String,
    status: String,
    quote_coin: String,
    #[serde(default)]
    funding_interval: Option<u32>, // minutes
}

#[serde_as]
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundingRecord {
    #[serde_as(as = "DisplayFromStr")]
    funding_rate: f64,
    #[serde_as(as = "DisplayFromStr")]
    funding_rate_timestamp: i64,
}

#[async_trait::async_trait]
impl ExchangeAdapter for Bybit {
    fn id(&self) -> ExchangeId {
        ID
    }

    async fn list_symbols(&self, limiter: &RateLimiter) -> Result<Vec<MarketSymbol>, FetchError> {
        let url = format!("{}/v5/market/instruments-info", self.base_url);
        let mut instruments = Vec::new();
        let mut cursor = String::new();
        for _ in 0..MAX_PAGES {
            let mut req = self.http.get(&url).query(&[("category", "linear"), ("limit", "1000")]);
            if !cursor.is_empty() {
                req = req.query(&[("cursor", cursor.as_str())]);
            }
            let page: Envelope<Page<Instrument>> = send_json(limiter, ID, req).await?;
            let page = page.into_result()?;
            instruments.extend(page.list);
            if page.next_page_cursor.is_empty() {
                break;
            }
            cursor = page.next_page_cursor;
        }

        let listings = instruments
            .into_iter()
            .filter(|i| {
                i.contract_type == "LinearPerpetual"
                    && i.status == "Trading"
                    && i.quote_coin == "USDT"
            })
            .map(|i| {
                let hint = i.funding_interval.filter(|m| *m >= 60).map(|m| m / 60);
                (i.symbol, hint)
            });
        Ok(collect_markets(ID, listings))
    }

    async fn fetch_funding(
        &self,
        limiter: &RateLimiter,
        market: &MarketSymbol,
    ) -> Result<FundingQuote, FetchError> {
        let url = format!("{}/v5/market/funding/history", self.base_url);
        let req = self
            .http
            .get(url)
            .query(&[("category", "linear"), ("symbol", market.raw.as_str()), ("limit", "2")]);
        let resp: Envelope<Page<FundingRecord>> = send_json(limiter, ID, req).await?;
        let history = resp.into_result()?.list;

        let latest = history
            .iter()
            .max_by_key(|r| r.funding_rate_timestamp)
            .ok_or_else(|| {
                FetchError::permanent(ID, format!("no funding history for {}", market.raw))
            })?;
        let times: Vec<i64> = history.iter().map(|r| r.funding_rate_timestamp).collect();
        let interval =
            resolve_interval(market.interval_hint_hours, &times, ID.default_interval_hours());
        FundingQuote::new(
            ID,
            market.symbol.clone(),
            latest.funding_rate,
            interval,
            latest.funding_rate_timestamp,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_support::{adapter, market};
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn lists_linear_perpetuals_across_pages() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v5/market/instruments-info").query_param("cursor", "p2");
                then.status(200).json_body(json!({
                    "retCode": 0, "retMsg": "OK",
                    "result": {"category": "linear", "nextPageCursor": "", "list": [
                        {"symbol": "SOLUSDT", "contractType": "LinearPerpetual", "status": "Trading", "baseCoin": "SOL", "quoteCoin": "USDT", "fundingInterval": 240}
                    ]}
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v5/market/instruments-info")
                    .query_param("category", "linear")
                    .matches(|req| {
                        !req.query_params
                            .as_ref()
                            .map(|q| q.iter().any(|(k, _)| k == "cursor"))
                            .unwrap_or(false)
                    });
                then.status(200).json_body(json!({
                    "retCode": 0, "retMsg": "OK",
                    "result": {"category": "linear", "nextPageCursor": "p2", "list": [
                        {"symbol": "BTCUSDT", "contractType": "LinearPerpetual", "status": "Trading", "baseCoin": "BTC", "quoteCoin": "USDT", "fundingInterval": 480},
                        {"symbol": "BTCPERP", "contractType": "LinearPerpetual", "status": "Trading", "baseCoin": "BTC", "quoteCoin": "USDC", "fundingInterval": 480},
                        {"symbol": "BTC-27DEC24", "contractType": "LinearFutures", "status": "Trading", "baseCoin": "BTC", "quoteCoin": "USDT"}
                    ]}
                }));
            })
            .await;

        let markets = adapter(ID, &server).list_symbols(&RateLimiter::unthrottled()).await.unwrap();
        assert_eq!(markets.len(), 2);
        assert_eq!(markets[0], market("BTC", "BTCUSDT", Some(8)));
        assert_eq!(markets[1], market("SOL", "SOLUSDT", Some(4)));
    }

    #[tokio::test]
    async fn hint_wins_over_history() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v5/market/funding/history")
                    .query_param("symbol", "SOLUSDT");
                then.status(200).json_body(json!({
                    "retCode": 0, "retMsg": "OK",
                    "result": {"category": "linear", "list": [
                        {"symbol": "SOLUSDT", "fundingRate": "0.0002", "fundingRateTimestamp": "1700014400000"},
                        {"symbol": "SOLUSDT", "fundingRate": "0.0001", "fundingRateTimestamp": "1699985600000"}
                    ]}
                }));
            })
            .await;

        let q = adapter(ID, &server)
            .fetch_funding(&RateLimiter::unthrottled(), &market("SOL", "SOLUSDT", Some(4)))
            .await
            .unwrap();
        assert_eq!(q.funding_interval_hours, 4);
        assert_eq!(q.funding_rate, 0.0002);
        assert_eq!(q.ts_ms, 1_700_014_400_000);
    }

    #[tokio::test]
    async fn envelope_codes_are_classified() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v5/market/funding/history")
                    .query_param("symbol", "BUSYUSDT");
                then.status(200)
                    .json_body(json!({
                        "retCode": 10006, "retMsg": "Too many visits!", "result": {}
                    }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v5/market/funding/history")
                    .query_param("symbol", "NOPEUSDT");
                then.status(200)
                    .json_body(json!({
                        "retCode": 10001, "retMsg": "params error: symbol invalid", "result": {}
                    }));
            })
            .await;

        let bybit = adapter(ID, &server);
        let limiter = RateLimiter::unthrottled();
        let busy = bybit
            .fetch_funding(&limiter, &market("BUSY", "BUSYUSDT", None))
            .await
            .unwrap_err();
        assert!(matches!(busy, FetchError::Transient { rate_limited: true, .. }));
        let nope = bybit
            .fetch_funding(&limiter, &market("NOPE", "NOPEUSDT", None))
            .await
            .unwrap_err();
        assert!(matches!(nope, FetchError::Permanent { .. }));
    }
}
