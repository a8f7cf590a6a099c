// src/providers/mod.rs
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, warn};

use crate::metrics;
use crate::symbols;
use crate::throttle::{RateLimiter, RetryPolicy};
use crate::types::{ExchangeId, FundingQuote, MarketSymbol, OmittedQuote};

pub mod binance;
pub mod bybit;
pub mod hyperliquid;
pub mod kraken;
pub mod kucoin;
pub mod okx;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Network trouble, timeouts, 429/5xx. Worth another try.
    #[error("{exchange}: transient failure: {reason}")]
    Transient { exchange: ExchangeId, reason: String, rate_limited: bool },
    /// Bad symbol, unexpected schema, 4xx. Retrying will not help.
    #[error("{exchange}: {reason}")]
    Permanent { exchange: ExchangeId, reason: String },
    #[error("{exchange}: still rate limited after {attempts} attempts")]
    RateLimitExceeded { exchange: ExchangeId, attempts: u32 },
    #[error("{exchange}: gave up after {attempts} attempts: {reason}")]
    FetchFailed { exchange: ExchangeId, attempts: u32, reason: String },
}

impl FetchError {
    pub fn permanent(exchange: ExchangeId, reason: impl Into<String>) -> Self {
        FetchError::Permanent { exchange, reason: reason.into() }
    }

    pub fn transient(exchange: ExchangeId, reason: impl Into<String>) -> Self {
        FetchError::Transient { exchange, reason: reason.into(), rate_limited: false }
    }

    pub fn rate_limited(exchange: ExchangeId, reason: impl Into<String>) -> Self {
        FetchError::Transient { exchange, reason: reason.into(), rate_limited: true }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    /// Retry budget spent on this request.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, FetchError::RateLimitExceeded { .. } | FetchError::FetchFailed { .. })
    }

    /// The exchange kept pushing back; asking it for more symbols this run
    /// would only dig the hole deeper. Other failures cost one symbol.
    pub fn halts_exchange(&self) -> bool {
        matches!(self, FetchError::RateLimitExceeded { .. })
    }

    pub fn exchange(&self) -> ExchangeId {
        match self {
            FetchError::Transient { exchange, .. }
            | FetchError::Permanent { exchange, .. }
            | FetchError::RateLimitExceeded { exchange, .. }
            | FetchError::FetchFailed { exchange, .. } => *exchange,
        }
    }
}

/// What an adapter needs for a batch of funding requests.
#[derive(Debug, Clone, Copy)]
pub struct FetchContext<'a> {
    pub limiter: &'a RateLimiter,
    pub retry: &'a RetryPolicy,
}

#[derive(Debug, Default)]
pub struct FundingBatch {
    pub quotes: Vec<FundingQuote>,
    pub omitted: Vec<OmittedQuote>,
    /// Set when the exchange stopped answering part-way through.
    pub halted: Option<FetchError>,
}

#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn id(&self) -> ExchangeId;

    /// USD-margined perpetuals currently trading, normalized and deduplicated.
    async fn list_symbols(&self, limiter: &RateLimiter) -> Result<Vec<MarketSymbol>, FetchError>;

    /// Latest funding for one market. A single attempt; retries live in the caller.
    async fn fetch_funding(
        &self,
        limiter: &RateLimiter,
        market: &MarketSymbol,
    ) -> Result<FundingQuote, FetchError>;

    /// Funding for every market, one request at a time. Per-symbol failures
    /// become omissions; running out of retries on a rate limit ends the
    /// batch early.
    async fn get_funding_rates(
        &self,
        ctx: &FetchContext<'_>,
        markets: &[MarketSymbol],
    ) -> FundingBatch {
        let exchange = self.id();
        let mut batch = FundingBatch::default();
        for market in markets {
            match ctx.retry.with_retry(exchange, || self.fetch_funding(ctx.limiter, market)).await {
                Ok(q) => batch.quotes.push(q),
                Err(e) => {
                    warn!(
                        %exchange,
                        symbol = %market.symbol,
                        raw = %market.raw,
                        error = %e,
                        "funding fetch failed"
                    );
                    batch.omitted.push(OmittedQuote {
                        exchange,
                        symbol: market.symbol.clone(),
                        reason: e.to_string(),
                    });
                    if e.halts_exchange() {
                        batch.halted = Some(e);
                        break;
                    }
                }
            }
        }
        batch
    }
}

pub fn build_adapter(
    id: ExchangeId,
    http: reqwest::Client,
    base_url: Option<&str>,
) -> Box<dyn ExchangeAdapter> {
    let base_url = base_url.unwrap_or(id.default_base_url()).trim_end_matches('/').to_string();
    match id {
        ExchangeId::BinanceUsdm => Box::new(binance::BinanceUsdm { http, base_url }),
        ExchangeId::KucoinFutures => Box::new(kucoin::KucoinFutures { http, base_url }),
        ExchangeId::Okx => Box::new(okx::Okx { http, base_url }),
        ExchangeId::Bybit => Box::new(bybit::Bybit { http, base_url }),
        ExchangeId::KrakenFutures => Box::new(kraken::KrakenFutures { http, base_url }),
        ExchangeId::Hyperliquid => Box::new(hyperliquid::Hyperliquid { http, base_url }),
    }
}

/// Normalize raw listings, keeping the first market per base symbol.
pub(crate) fn collect_markets<I>(exchange: ExchangeId, listings: I) -> Vec<MarketSymbol>
where
    I: IntoIterator<Item = (String, Option<u32>)>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (raw, interval_hint_hours) in listings {
        let Some(symbol) = symbols::normalize_or_warn(exchange, &raw) else { continue };
        if !seen.insert(symbol.clone()) {
            debug!(%exchange, %symbol, %raw, "duplicate market for symbol, keeping the first");
            continue;
        }
        out.push(MarketSymbol { symbol, raw, interval_hint_hours });
    }
    out
}

/// Throttle, send, classify the status and decode the body.
pub(crate) async fn send_json<T: DeserializeOwned>(
    limiter: &RateLimiter,
    exchange: ExchangeId,
    request: reqwest::RequestBuilder,
) -> Result<T, FetchError> {
    limiter.throttle(exchange).await;
    let started = Instant::now();
    let result = send_inner(exchange, request).await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) if e.is_transient() => "transient",
        Err(_) => "permanent",
    };
    metrics::record_request(exchange, outcome, started.elapsed());
    result
}

async fn send_inner<T: DeserializeOwned>(
    exchange: ExchangeId,
    request: reqwest::RequestBuilder,
) -> Result<T, FetchError> {
    let resp = request.send().await.map_err(|e| classify_transport(exchange, e))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(classify_status(exchange, status));
    }
    let body = resp.bytes().await.map_err(|e| classify_transport(exchange, e))?;
    serde_json::from_slice(&body)
        .map_err(|e| FetchError::permanent(exchange, format!("malformed response: {e}")))
}

pub(crate) fn classify_status(exchange: ExchangeId, status: StatusCode) -> FetchError {
    match status {
        // Binance answers 418 once it starts banning an IP
        StatusCode::TOO_MANY_REQUESTS | StatusCode::IM_A_TEAPOT => {
            FetchError::rate_limited(exchange, format!("HTTP {status}"))
        }
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            FetchError::transient(exchange, format!("HTTP {status}"))
        }
        s => FetchError::permanent(exchange, format!("HTTP {s}")),
    }
}

fn classify_transport(exchange: ExchangeId, e: reqwest::Error) -> FetchError {
    if e.is_builder() || e.is_decode() {
        FetchError::permanent(exchange, e.to_string())
    } else {
        FetchError::transient(exchange, e.to_string())
    }
}

/// Parse a decimal that some venues send as a string.
pub(crate) fn parse_rate(exchange: ExchangeId, field: &str, raw: &str) -> Result<f64, FetchError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| FetchError::permanent(exchange, format!("unparseable {field}: `{raw}`")))
}
