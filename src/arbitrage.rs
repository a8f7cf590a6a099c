// src/arbitrage.rs
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

use crate::table::SymbolRateTable;
use crate::types::{AnnualizedQuote, ArbitrageOpportunity};

/// What a positive funding rate means for the two sides.
///
/// Under `LongsPayPositive` (the usual perpetual convention) longs pay shorts
/// when the rate is positive, so the trade is long where the rate is lowest
/// and short where it is highest. `ShortsPayPositive` flips the legs. Either
/// way the spread is the funding captured by the pair and is never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignConvention {
    #[default]
    LongsPayPositive,
    ShortsPayPositive,
}

impl SignConvention {
    /// (long leg, short leg)
    fn legs<'a>(
        self,
        a: &'a AnnualizedQuote,
        b: &'a AnnualizedQuote,
    ) -> (&'a AnnualizedQuote, &'a AnnualizedQuote) {
        let (low, high) = if b.annualized_rate < a.annualized_rate { (b, a) } else { (a, b) };
        match self {
            SignConvention::LongsPayPositive => (low, high),
            SignConvention::ShortsPayPositive => (high, low),
        }
    }
}

/// Ranks cross-exchange funding spreads.
///
/// Per symbol only the widest pair survives; a later pair displaces the
/// incumbent only when strictly wider, so ties go to the exchanges visited
/// first. Survivors with `spread >= min_spread` are ordered widest first and
/// cut to `top_n`.
#[derive(Debug, Clone)]
pub struct ArbitrageEngine {
    pub min_spread: f64, // annualized percent, inclusive
    pub top_n: usize,
    pub convention: SignConvention,
}

impl ArbitrageEngine {
    pub fn new(min_spread: f64, top_n: usize) -> Self {
        Self { min_spread, top_n, convention: SignConvention::default() }
    }

    pub fn with_convention(mut self, convention: SignConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Widest long/short pair among one symbol's quotes.
    pub fn best_pair(
        &self,
        symbol: &str,
        quotes: &[AnnualizedQuote],
    ) -> Option<ArbitrageOpportunity> {
        let mut best: Option<ArbitrageOpportunity> = None;
        for (i, a) in quotes.iter().enumerate() {
            for b in &quotes[i + 1..] {
                let (long, short) = self.convention.legs(a, b);
                let spread = (short.annualized_rate - long.annualized_rate).abs();
                if best.as_ref().map_or(true, |cur| spread > cur.spread) {
                    best = Some(ArbitrageOpportunity {
                        symbol: symbol.to_string(),
                        long_exchange: long.exchange,
                        short_exchange: short.exchange,
                        spread,
                        long_rate: long.annualized_rate,
                        short_rate: short.annualized_rate,
                    });
                }
            }
        }
        best
    }

    pub fn rank(&self, table: &SymbolRateTable) -> Vec<ArbitrageOpportunity> {
        let mut out: Vec<ArbitrageOpportunity> = table
            .iter()
            .filter_map(|(symbol, quotes)| self.best_pair(symbol, quotes))
            .filter(|o| o.spread >= self.min_spread)
            .collect();
        // stable: equal spreads keep symbol order
        out.sort_by_key(|o| Reverse(OrderedFloat(o.spread)));
        out.truncate(self.top_n);
        out
    }
}
