// src/symbols.rs
use phf::phf_map;
use tracing::warn;

use crate::types::ExchangeId;

/// Venue tickers that differ from the common one.
static ALIASES: phf::Map<&'static str, &'static str> = phf_map! {
    "XBT" => "BTC",
};

/// Affixes wrapped around the base asset in each exchange's native id.
struct SymbolRule {
    prefix: &'static str,
    suffix: &'static str,
}

fn rule(exchange: ExchangeId) -> SymbolRule {
    match exchange {
        ExchangeId::BinanceUsdm | ExchangeId::Bybit => SymbolRule { prefix: "", suffix: "USDT" },
        ExchangeId::KucoinFutures => SymbolRule { prefix: "", suffix: "USDTM" },
        ExchangeId::KrakenFutures => SymbolRule { prefix: "PF_", suffix: "USD" },
        ExchangeId::Okx => SymbolRule { prefix: "", suffix: "-USDT-SWAP" },
        ExchangeId::Hyperliquid => SymbolRule { prefix: "", suffix: "" },
    }
}

/// Reduce an exchange-native symbol to its base ticker.
///
/// Accepts the venue's own format (`BTCUSDT`, `XBTUSDTM`, `PF_XBTUSD`,
/// `BTC-USDT-SWAP`, `BTC`) and the unified `BASE/QUOTE:SETTLE` form. Returns
/// `None` when the result would not be a plain upper-case ticker; callers
/// drop those markets rather than risk pairing different instruments.
pub fn normalize(exchange: ExchangeId, raw: &str) -> Option<String> {
    let raw = raw.trim();
    let base = if let Some((base, _)) = raw.split_once('/') {
        base
    } else {
        let r = rule(exchange);
        let stripped = raw.strip_prefix(r.prefix)?;
        stripped.strip_suffix(r.suffix)?
    };

    // Hyperliquid lists thousand-unit contracts as "kPEPE"; Binance & co. say "1000PEPE".
    let base = match (exchange, base.strip_prefix('k')) {
        (ExchangeId::Hyperliquid, Some(rest)) if !rest.is_empty() => format!("1000{rest}"),
        _ => base.to_string(),
    };

    let base = ALIASES.get(base.as_str()).map(|s| s.to_string()).unwrap_or(base);
    if base.is_empty() || !base.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
        return None;
    }
    Some(base)
}

/// `normalize`, logging the markets that get dropped.
pub fn normalize_or_warn(exchange: ExchangeId, raw: &str) -> Option<String> {
    let out = normalize(exchange, raw);
    if out.is_none() {
        warn!(%exchange, raw, "dropping market: symbol cannot be normalized");
    }
    out
}
