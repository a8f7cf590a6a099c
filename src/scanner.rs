// src/scanner.rs
use serde::Serialize;
use tracing::info;

use crate::arbitrage::ArbitrageEngine;
use crate::config::{ms, ScannerConfig};
use crate::orchestrator::{FetchOrchestrator, ScanError};
use crate::providers::build_adapter;
use crate::throttle::{RateLimiter, RetryPolicy};
use crate::types::{ArbitrageOpportunity, OmittedQuote, SkippedExchange};

const USER_AGENT: &str = concat!("funding-arb/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub opportunities: Vec<ArbitrageOpportunity>,
    pub skipped: Vec<SkippedExchange>,
    pub omitted: Vec<OmittedQuote>,
    pub quotes_collected: usize,
}

/// One full pass: list, fetch, rank.
pub struct Scanner {
    orchestrator: FetchOrchestrator,
    engine: ArbitrageEngine,
}

impl Scanner {
    pub fn new(orchestrator: FetchOrchestrator, engine: ArbitrageEngine) -> Self {
        Self { orchestrator, engine }
    }

    pub fn from_config(cfg: &ScannerConfig) -> Result<Self, ScanError> {
        cfg.validate()?;
        let http = reqwest::Client::builder()
            .timeout(ms(cfg.request_timeout_ms))
            .user_agent(USER_AGENT)
            .build()?;

        let adapters = cfg
            .exchanges
            .iter()
            .map(|id| build_adapter(*id, http.clone(), cfg.base_urls.get(id).map(String::as_str)))
            .collect();

        let limiter = cfg
            .request_interval_overrides_ms
            .iter()
            .fold(RateLimiter::new(ms(cfg.min_request_interval_ms)), |l, (ex, d)| {
                l.with_override(*ex, ms(*d))
            });

        let retry = RetryPolicy::new(cfg.max_attempts, ms(cfg.base_delay_ms))
            .with_max_delay(ms(cfg.max_delay_ms))
            .with_jitter(cfg.jitter);

        let delay = ms(cfg.inter_exchange_delay_ms);
        let orchestrator = FetchOrchestrator::new(adapters, limiter, retry, delay)
            .with_min_listings(cfg.min_listings)
            .with_symbols(cfg.symbol_filter());
        let engine =
            ArbitrageEngine::new(cfg.min_spread, cfg.top_n).with_convention(cfg.sign_convention);
        Ok(Self::new(orchestrator, engine))
    }

    pub async fn run(&self) -> Result<ScanOutcome, ScanError> {
        let exchanges: Vec<String> = self.orchestrator.exchanges().map(|e| e.to_string()).collect();
        info!(
            exchanges = %exchanges.join(","),
            min_spread = self.engine.min_spread,
            top_n = self.engine.top_n,
            "scan started"
        );

        let report = self.orchestrator.run().await?;
        let opportunities = self.engine.rank(&report.table);
        info!(
            symbols = report.table.len(),
            quotes = report.table.quote_count(),
            opportunities = opportunities.len(),
            skipped = report.skipped.len(),
            "scan finished"
        );
        Ok(ScanOutcome {
            quotes_collected: report.table.quote_count(),
            opportunities,
            skipped: report.skipped,
            omitted: report.omitted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::fakes::FakeExchange;
    use crate::providers::{ExchangeAdapter, FetchError};
    use crate::types::ExchangeId::*;
    use std::time::Duration;

    fn scanner(adapters: Vec<FakeExchange>, min_spread: f64) -> Scanner {
        let orchestrator = FetchOrchestrator::new(
            adapters.into_iter().map(|a| Box::new(a) as Box<dyn ExchangeAdapter>).collect(),
            RateLimiter::unthrottled(),
            RetryPolicy::new(3, Duration::from_millis(1)),
            Duration::ZERO,
        );
        Scanner::new(orchestrator, ArbitrageEngine::new(min_spread, 15))
    }

    #[tokio::test(start_paused = true)]
    async fn ranks_what_was_fetched() {
        // 8h rates for 5.0%, 7.35% and -1.2% a year
        let out = scanner(
            vec![
                FakeExchange::new(BinanceUsdm, &[("BTC", 5.0 / 109_500.0)]),
                FakeExchange::failing_listing(Bybit, FetchError::permanent(Bybit, "HTTP 403")),
                FakeExchange::new(KrakenFutures, &[("BTC", 7.35 / 109_500.0)]),
                FakeExchange::new(Okx, &[("BTC", -1.2 / 109_500.0)]),
            ],
            2.0,
        )
        .run()
        .await
        .unwrap();
        assert_eq!(out.quotes_collected, 3);
        assert_eq!(out.opportunities.len(), 1);
        assert_eq!(out.opportunities[0].long_exchange, Okx);
        assert_eq!(out.opportunities[0].short_exchange, KrakenFutures);
        assert_eq!(out.skipped.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_result_is_not_an_error() {
        let out = scanner(
            vec![
                FakeExchange::new(BinanceUsdm, &[("BTC", 0.0001)]),
                FakeExchange::new(Okx, &[("BTC", 0.0001)]),
            ],
            1.0,
        )
        .run()
        .await
        .unwrap();
        assert!(out.opportunities.is_empty());
        assert_eq!(out.quotes_collected, 2);
    }

    #[test]
    fn from_config_rejects_invalid_config() {
        let cfg = ScannerConfig { top_n: 0, ..ScannerConfig::default() };
        assert!(matches!(Scanner::from_config(&cfg), Err(ScanError::Config(_))));
    }

    #[test]
    fn from_config_builds_every_selected_exchange() {
        let cfg = ScannerConfig { exchanges: vec![Okx, Hyperliquid], ..ScannerConfig::default() };
        let s = Scanner::from_config(&cfg).unwrap();
        assert_eq!(s.orchestrator.exchanges().collect::<Vec<_>>(), vec![Okx, Hyperliquid]);
    }
}
