// src/table.rs
use std::collections::BTreeMap;
use tracing::warn;

use crate::types::{AnnualizedQuote, FundingQuote};

/// Annualized quotes per symbol, one per exchange, in the order exchanges
/// were visited. Filled by the orchestrator, read-only for everyone else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolRateTable {
    rows: BTreeMap<String, Vec<AnnualizedQuote>>,
}

impl SymbolRateTable {
    pub fn from_quotes<I: IntoIterator<Item = FundingQuote>>(quotes: I) -> Self {
        let mut table = Self::default();
        for q in quotes {
            table.insert(q);
        }
        table
    }

    /// Returns false when the exchange already has a quote for the symbol.
    pub(crate) fn insert(&mut self, quote: FundingQuote) -> bool {
        let row = self.rows.entry(quote.symbol.clone()).or_default();
        if row.iter().any(|q| q.exchange == quote.exchange) {
            warn!(exchange = %quote.exchange, symbol = %quote.symbol, "duplicate quote ignored");
            return false;
        }
        row.push(quote.annualized());
        true
    }

    pub fn get(&self, symbol: &str) -> Option<&[AnnualizedQuote]> {
        self.rows.get(symbol).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[AnnualizedQuote])> {
        self.rows.iter().map(|(s, q)| (s.as_str(), q.as_slice()))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// Number of symbols.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn quote_count(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }
}
