// src/bin/funding_probe.rs
use funding_arb::providers::build_adapter;
use funding_arb::throttle::RateLimiter;
use funding_arb::types::ExchangeId;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let exchange: ExchangeId = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "binanceusdm".to_string())
        .parse()
        .map_err(anyhow::Error::msg)?;
    let sym = std::env::args().nth(2).unwrap_or_else(|| "BTC".to_string()).to_ascii_uppercase();

    let adapter = build_adapter(exchange, reqwest::Client::new(), None);
    let limiter = RateLimiter::unthrottled();
    let markets = adapter.list_symbols(&limiter).await?;
    let market = markets
        .iter()
        .find(|m| m.symbol == sym)
        .ok_or_else(|| {
            anyhow::anyhow!("{exchange} does not list {sym} ({} markets)", markets.len())
        })?;
    let q = adapter.fetch_funding(&limiter, market).await?;
    println!(
        "{} {} ({}) -> rate={} every {}h = {:.2}%/yr ts_ms={}",
        exchange,
        q.symbol,
        market.raw,
        q.funding_rate,
        q.funding_interval_hours,
        q.annualized_rate(),
        q.ts_ms
    );
    Ok(())
}
