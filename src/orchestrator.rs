// src/orchestrator.rs
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ConfigError;
use crate::providers::{ExchangeAdapter, FetchContext};
use crate::table::SymbolRateTable;
use crate::throttle::{RateLimiter, RetryPolicy};
use crate::types::{ExchangeId, FetchStage, MarketSymbol, OmittedQuote, SkippedExchange};

#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Nothing usable came back from any exchange.
    #[error("no funding data collected ({} exchange(s) skipped)", skipped.len())]
    NoData { skipped: Vec<SkippedExchange> },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub table: SymbolRateTable,
    pub skipped: Vec<SkippedExchange>,
    pub omitted: Vec<OmittedQuote>,
}

/// Walks the exchanges one at a time: first every listing, then funding for
/// the symbols that can actually be paired.
pub struct FetchOrchestrator {
    adapters: Vec<Box<dyn ExchangeAdapter>>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    inter_exchange_delay: Duration,
    min_listings: usize,
    symbols: HashSet<String>,
}

impl FetchOrchestrator {
    pub fn new(
        adapters: Vec<Box<dyn ExchangeAdapter>>,
        limiter: RateLimiter,
        retry: RetryPolicy,
        inter_exchange_delay: Duration,
    ) -> Self {
        Self {
            adapters,
            limiter,
            retry,
            inter_exchange_delay,
            min_listings: 2,
            symbols: HashSet::new(),
        }
    }

    /// Symbols listed on fewer exchanges are never fetched.
    pub fn with_min_listings(mut self, n: usize) -> Self {
        self.min_listings = n.max(1);
        self
    }

    /// Restrict funding requests to these normalized symbols. Empty means all.
    pub fn with_symbols(mut self, symbols: HashSet<String>) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn exchanges(&self) -> impl Iterator<Item = ExchangeId> + '_ {
        self.adapters.iter().map(|a| a.id())
    }

    pub async fn run(&self) -> Result<FetchReport, ScanError> {
        let ctx = FetchContext { limiter: &self.limiter, retry: &self.retry };
        let mut report = FetchReport::default();

        // discovery
        let mut listed: Vec<(usize, Vec<MarketSymbol>)> = Vec::new();
        let mut listing_count: HashMap<String, usize> = HashMap::new();
        for (i, adapter) in self.adapters.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.inter_exchange_delay).await;
            }
            let exchange = adapter.id();
            match self.retry.with_retry(exchange, || adapter.list_symbols(&self.limiter)).await {
                Ok(markets) => {
                    info!(%exchange, markets = markets.len(), "listed perpetuals");
                    for m in &markets {
                        *listing_count.entry(m.symbol.clone()).or_default() += 1;
                    }
                    listed.push((i, markets));
                }
                Err(e) => {
                    warn!(%exchange, error = %e, "skipping exchange, listing failed");
                    report.skipped.push(SkippedExchange {
                        exchange,
                        stage: FetchStage::Listing,
                        reason: e.to_string(),
                    });
                }
            }
        }
        if listed.is_empty() {
            return Err(ScanError::NoData { skipped: report.skipped });
        }
        info!(
            symbols = listing_count.len(),
            shared = listing_count.values().filter(|n| **n >= self.min_listings).count(),
            "discovery done"
        );

        // funding
        let mut requested = 0usize;
        for (n, (i, markets)) in listed.into_iter().enumerate() {
            if n > 0 {
                tokio::time::sleep(self.inter_exchange_delay).await;
            }
            let adapter = &self.adapters[i];
            let exchange = adapter.id();
            let wanted: Vec<MarketSymbol> = markets
                .into_iter()
                .filter(|m| listing_count.get(&m.symbol).copied().unwrap_or(0) >= self.min_listings)
                .filter(|m| self.symbols.is_empty() || self.symbols.contains(&m.symbol))
                .collect();
            if wanted.is_empty() {
                info!(%exchange, "no shared symbols to fetch");
                continue;
            }
            requested += wanted.len();

            let batch = adapter.get_funding_rates(&ctx, &wanted).await;
            let fetched = batch.quotes.len();
            for q in batch.quotes {
                report.table.insert(q);
            }
            report.omitted.extend(batch.omitted);
            if let Some(e) = batch.halted {
                warn!(
                    %exchange,
                    fetched,
                    error = %e,
                    "exchange stopped answering, keeping partial results"
                );
                report.skipped.push(SkippedExchange {
                    exchange,
                    stage: FetchStage::Funding,
                    reason: e.to_string(),
                });
            } else {
                info!(%exchange, fetched, requested = wanted.len(), "funding rates fetched");
            }
        }

        if requested > 0 && report.table.quote_count() == 0 {
            return Err(ScanError::NoData { skipped: report.skipped });
        }
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::providers::{ExchangeAdapter, FetchError};
    use crate::throttle::RateLimiter;
    use crate::types::{ExchangeId, FundingQuote, MarketSymbol};

    /// Scripted exchange: fixed listing, fixed 8h rates, and optional
    /// failures that each market plays back before answering. Every call
    /// goes through the limiter like a real adapter's request would.
    pub struct FakeExchange {
        pub id: ExchangeId,
        pub listing: Result<Vec<MarketSymbol>, FetchError>,
        pub rates: HashMap<String, f64>,
        pub script: Mutex<HashMap<String, Vec<FetchError>>>,
        pub calls: Mutex<Vec<String>>,
    }

    pub fn market(symbol: &str) -> MarketSymbol {
        MarketSymbol {
            symbol: symbol.to_string(),
            raw: symbol.to_string(),
            interval_hint_hours: None,
        }
    }

    impl FakeExchange {
        pub fn new(id: ExchangeId, rates: &[(&str, f64)]) -> Self {
            Self {
                id,
                listing: Ok(rates.iter().map(|(s, _)| market(s)).collect()),
                rates: rates.iter().map(|(s, r)| (s.to_string(), *r)).collect(),
                script: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing_listing(id: ExchangeId, err: FetchError) -> Self {
            Self { listing: Err(err), ..Self::new(id, &[]) }
        }

        pub fn failing_first(self, symbol: &str, errors: Vec<FetchError>) -> Self {
            self.script.lock().unwrap().insert(symbol.to_string(), errors);
            self
        }
    }

    #[async_trait]
    impl ExchangeAdapter for FakeExchange {
        fn id(&self) -> ExchangeId {
            self.id
        }

        async fn list_symbols(
            &self,
            limiter: &RateLimiter,
        ) -> Result<Vec<MarketSymbol>, FetchError> {
            limiter.throttle(self.id).await;
            self.listing.clone()
        }

        async fn fetch_funding(
            &self,
            limiter: &RateLimiter,
            market: &MarketSymbol,
        ) -> Result<FundingQuote, FetchError> {
            limiter.throttle(self.id).await;
            self.calls.lock().unwrap().push(market.symbol.clone());
            let scripted = {
                let mut script = self.script.lock().unwrap();
                script.get_mut(&market.symbol).filter(|v| !v.is_empty()).map(|v| v.remove(0))
            };
            if let Some(err) = scripted {
                return Err(err);
            }
            let rate = self
                .rates
                .get(&market.symbol)
                .copied()
                .ok_or_else(|| FetchError::permanent(self.id, "unknown"))?;
            FundingQuote::new(self.id, market.symbol.clone(), rate, 8, 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::FakeExchange;
    use super::*;
    use crate::providers::FetchError;
    use ExchangeId::*;

    fn orchestrator(adapters: Vec<FakeExchange>) -> FetchOrchestrator {
        FetchOrchestrator::new(
            adapters.into_iter().map(|a| Box::new(a) as Box<dyn ExchangeAdapter>).collect(),
            RateLimiter::unthrottled(),
            RetryPolicy::new(3, Duration::from_millis(10)),
            Duration::from_millis(100),
        )
    }

    fn timeout(ex: ExchangeId) -> FetchError {
        FetchError::transient(ex, "timed out")
    }

    #[tokio::test(start_paused = true)]
    async fn collects_shared_symbols_only() {
        let report = orchestrator(vec![
            FakeExchange::new(BinanceUsdm, &[("BTC", 0.0001), ("ETH", 0.0002), ("ONLYBIN", 0.01)]),
            FakeExchange::new(Okx, &[("BTC", -0.0001), ("ETH", 0.0)]),
        ])
        .run()
        .await
        .unwrap();
        assert_eq!(report.table.symbols().collect::<Vec<_>>(), vec!["BTC", "ETH"]);
        assert_eq!(report.table.quote_count(), 4);
        assert!(report.skipped.is_empty());
        assert!(report.omitted.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hyperliquid_recovers_after_two_timeouts() {
        let hl = FakeExchange::new(Hyperliquid, &[("BTC", 0.00001)])
            .failing_first("BTC", vec![timeout(Hyperliquid), timeout(Hyperliquid)]);
        let report = orchestrator(vec![FakeExchange::new(Bybit, &[("BTC", 0.0001)]), hl])
            .run()
            .await
            .unwrap();
        let btc = report.table.get("BTC").unwrap();
        assert_eq!(btc.len(), 2);
        assert!(btc.iter().any(|q| q.exchange == Hyperliquid));
        assert!(report.omitted.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn every_listing_failing_is_no_data() {
        let err = orchestrator(vec![
            FakeExchange::failing_listing(Okx, FetchError::permanent(Okx, "HTTP 403")),
            FakeExchange::failing_listing(Bybit, timeout(Bybit)),
        ])
        .run()
        .await
        .unwrap_err();
        match err {
            ScanError::NoData { skipped } => {
                assert_eq!(skipped.len(), 2);
                assert!(skipped.iter().all(|s| s.stage == FetchStage::Listing));
                assert_eq!(skipped[1].exchange, Bybit);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn partial_failure_keeps_the_rest() {
        let kucoin = FakeExchange::new(KucoinFutures, &[("BTC", 0.0003), ("ETH", 0.0001)])
            .failing_first("ETH", vec![FetchError::permanent(KucoinFutures, "contract not found")]);
        let report = orchestrator(vec![
            FakeExchange::failing_listing(KrakenFutures, timeout(KrakenFutures)),
            kucoin,
            FakeExchange::new(Okx, &[("BTC", 0.0001), ("ETH", 0.0002)]),
        ])
        .run()
        .await
        .unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].exchange, KrakenFutures);
        assert_eq!(report.omitted.len(), 1);
        assert_eq!(report.omitted[0].symbol, "ETH");
        assert_eq!(report.table.get("BTC").unwrap().len(), 2);
        assert_eq!(report.table.get("ETH").unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_rate_limit_halts_that_exchange_only() {
        let limited = || FetchError::rate_limited(Bybit, "HTTP 429");
        let bybit = FakeExchange::new(Bybit, &[("AAA", 0.0001), ("BBB", 0.0001), ("CCC", 0.0001)])
            .failing_first("BBB", vec![limited(), limited(), limited()]);
        let orch = orchestrator(vec![
            bybit,
            FakeExchange::new(Okx, &[("AAA", 0.0002), ("BBB", 0.0002), ("CCC", 0.0002)]),
        ]);
        let report = orch.run().await.unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].stage, FetchStage::Funding);
        assert!(report.skipped[0].reason.contains("rate limited"));
        // AAA made it in before the halt, CCC was never asked for
        assert_eq!(report.table.get("AAA").unwrap().len(), 2);
        assert_eq!(report.table.get("CCC").unwrap().len(), 1);
        assert_eq!(report.omitted.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn symbol_that_keeps_timing_out_only_costs_itself() {
        let bybit = FakeExchange::new(Bybit, &[("AAA", 0.0001), ("BBB", 0.0001), ("CCC", 0.0001)])
            .failing_first("BBB", vec![timeout(Bybit), timeout(Bybit), timeout(Bybit)]);
        let orch = orchestrator(vec![
            bybit,
            FakeExchange::new(Okx, &[("AAA", 0.0002), ("BBB", 0.0002), ("CCC", 0.0002)]),
        ]);
        let report = orch.run().await.unwrap();

        assert!(report.skipped.is_empty());
        assert_eq!(report.omitted.len(), 1);
        assert_eq!(report.omitted[0].exchange, Bybit);
        assert_eq!(report.omitted[0].symbol, "BBB");
        assert!(report.omitted[0].reason.contains("gave up after 3 attempts"));
        // CCC on bybit is still fetched after BBB gave up
        assert_eq!(report.table.get("CCC").unwrap().len(), 2);
        assert_eq!(report.table.get("BBB").unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn funding_requests_are_spaced_per_exchange() {
        use super::fakes::market;
        use crate::providers::FetchContext;

        let limiter = RateLimiter::new(Duration::from_millis(500));
        let retry = RetryPolicy::new(3, Duration::from_millis(10));
        let ctx = FetchContext { limiter: &limiter, retry: &retry };
        let okx = FakeExchange::new(Okx, &[("AAA", 0.0001), ("BBB", 0.0001), ("CCC", 0.0001)]);
        let bybit = FakeExchange::new(Bybit, &[("AAA", 0.0002)]);

        let t0 = tokio::time::Instant::now();
        let batch = okx
            .get_funding_rates(&ctx, &[market("AAA"), market("BBB"), market("CCC")])
            .await;
        assert_eq!(batch.quotes.len(), 3);
        // three requests, two full gaps
        assert!(t0.elapsed() >= Duration::from_millis(1000));

        // okx's clock does not hold bybit back
        let t1 = tokio::time::Instant::now();
        bybit.fetch_funding(&limiter, &market("AAA")).await.unwrap();
        assert_eq!(t1.elapsed(), Duration::ZERO);

        // but the next okx request still waits its turn
        let t2 = tokio::time::Instant::now();
        okx.fetch_funding(&limiter, &market("AAA")).await.unwrap();
        assert!(t2.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn allow_list_limits_requests() {
        let report = orchestrator(vec![
            FakeExchange::new(BinanceUsdm, &[("BTC", 0.0001), ("ETH", 0.0002)]),
            FakeExchange::new(Okx, &[("BTC", -0.0001), ("ETH", 0.0)]),
        ])
        .with_symbols(HashSet::from(["ETH".to_string()]))
        .run()
        .await
        .unwrap();
        assert_eq!(report.table.symbols().collect::<Vec<_>>(), vec!["ETH"]);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_shared_is_an_empty_success() {
        let report = orchestrator(vec![
            FakeExchange::new(BinanceUsdm, &[("AAA", 0.0001)]),
            FakeExchange::new(Okx, &[("BBB", 0.0001)]),
        ])
        .run()
        .await
        .unwrap();
        assert!(report.table.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn all_funding_failing_is_no_data() {
        let dead = |id| {
            FakeExchange::new(id, &[("BTC", 0.0001)])
                .failing_first("BTC", vec![FetchError::permanent(id, "HTTP 404")])
        };
        let err = orchestrator(vec![dead(Okx), dead(Bybit)]).run().await.unwrap_err();
        assert!(matches!(err, ScanError::NoData { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn exchanges_are_spaced_apart() {
        let orch = orchestrator(vec![
            FakeExchange::new(BinanceUsdm, &[("BTC", 0.0001)]),
            FakeExchange::new(Okx, &[("BTC", 0.0001)]),
            FakeExchange::new(Bybit, &[("BTC", 0.0001)]),
        ]);
        let t0 = tokio::time::Instant::now();
        orch.run().await.unwrap();
        // two gaps in each pass
        assert!(t0.elapsed() >= Duration::from_millis(400));
    }
}
