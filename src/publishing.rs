// src/publishing.rs
use std::fmt::Write as _;

use crate::scanner::ScanOutcome;

#[async_trait::async_trait]
pub trait Publisher: Send + Sync + 'static {
    /// Hand a finished scan to wherever it should go.
    async fn publish(&self, outcome: &ScanOutcome) -> anyhow::Result<()>;
}

/// Human-readable table on stdout.
pub struct StdoutPublisher;

#[async_trait::async_trait]
impl Publisher for StdoutPublisher {
    async fn publish(&self, outcome: &ScanOutcome) -> anyhow::Result<()> {
        print!("{}", render_table(outcome));
        Ok(())
    }
}

/// The outcome as one JSON document on stdout.
pub struct JsonPublisher {
    pub pretty: bool,
}

#[async_trait::async_trait]
impl Publisher for JsonPublisher {
    async fn publish(&self, outcome: &ScanOutcome) -> anyhow::Result<()> {
        let out = if self.pretty {
            serde_json::to_string_pretty(outcome)?
        } else {
            serde_json::to_string(outcome)?
        };
        println!("{out}");
        Ok(())
    }
}

pub fn render_table(outcome: &ScanOutcome) -> String {
    let mut s = String::new();
    if outcome.opportunities.is_empty() {
        let _ = writeln!(s, "no opportunities ({} quotes collected)", outcome.quotes_collected);
    } else {
        let _ = writeln!(
            s,
            "{:<12} {:<14} {:<14} {:>10} {:>10} {:>10}",
            "SYMBOL", "LONG", "SHORT", "LONG %", "SHORT %", "SPREAD %"
        );
        for o in &outcome.opportunities {
            let _ = writeln!(
                s,
                "{:<12} {:<14} {:<14} {:>10.2} {:>10.2} {:>10.2}",
                o.symbol, o.long_exchange, o.short_exchange, o.long_rate, o.short_rate, o.spread
            );
        }
    }
    if !outcome.skipped.is_empty() {
        let _ = writeln!(s, "\nskipped:");
        for sk in &outcome.skipped {
            let _ = writeln!(s, "  {} ({}): {}", sk.exchange, sk.stage, sk.reason);
        }
    }
    if !outcome.omitted.is_empty() {
        let _ = writeln!(s, "\n{} quote(s) omitted", outcome.omitted.len());
    }
    s
}
