// src/config.rs
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::arbitrage::SignConvention;
use crate::types::ExchangeId;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "d_exchanges")]                 pub exchanges: Vec<ExchangeId>,
    #[serde(default = "d_min_spread")]                pub min_spread: f64, // annualized percent
    #[serde(default = "d_top_n")]                     pub top_n: usize,
    #[serde(default = "d_min_listings")]              pub min_listings: usize,
    #[serde(default)]                                 pub symbols: Vec<String>,
    #[serde(default = "d_min_request_interval_ms")]   pub min_request_interval_ms: u64,
    // exchange keys go through `FromStr`, so `OKX` and ` okx ` both work
    #[serde_as(as = "HashMap<DisplayFromStr, _>")]
    #[serde(default)]
    pub request_interval_overrides_ms: HashMap<ExchangeId, u64>,
    #[serde(default = "d_inter_exchange_delay_ms")]   pub inter_exchange_delay_ms: u64,
    #[serde(default = "d_max_attempts")]              pub max_attempts: u32,
    #[serde(default = "d_base_delay_ms")]             pub base_delay_ms: u64,
    #[serde(default = "d_max_delay_ms")]              pub max_delay_ms: u64,
    #[serde(default = "d_jitter")]                    pub jitter: bool,
    #[serde(default = "d_request_timeout_ms")]        pub request_timeout_ms: u64,
    #[serde(default)]                                 pub sign_convention: SignConvention,
    #[serde_as(as = "HashMap<DisplayFromStr, _>")]
    #[serde(default)]
    pub base_urls: HashMap<ExchangeId, String>,
}
fn d_exchanges() -> Vec<ExchangeId> { ExchangeId::ALL.to_vec() }
fn d_min_spread() -> f64 { 1.0 }
fn d_top_n() -> usize { 10 }
fn d_min_listings() -> usize { 2 }
fn d_min_request_interval_ms() -> u64 { 200 }
fn d_inter_exchange_delay_ms() -> u64 { 1000 }
fn d_max_attempts() -> u32 { 5 }
fn d_base_delay_ms() -> u64 { 1000 }
fn d_max_delay_ms() -> u64 { 30_000 }
fn d_jitter() -> bool { true }
fn d_request_timeout_ms() -> u64 { 10_000 }
#[inline]
pub fn ms(d: u64) -> Duration { Duration::from_millis(d) }

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            exchanges: d_exchanges(),
            min_spread: d_min_spread(),
            top_n: d_top_n(),
            min_listings: d_min_listings(),
            symbols: Vec::new(),
            min_request_interval_ms: d_min_request_interval_ms(),
            request_interval_overrides_ms: HashMap::new(),
            inter_exchange_delay_ms: d_inter_exchange_delay_ms(),
            max_attempts: d_max_attempts(),
            base_delay_ms: d_base_delay_ms(),
            max_delay_ms: d_max_delay_ms(),
            jitter: d_jitter(),
            request_timeout_ms: d_request_timeout_ms(),
            sign_convention: SignConvention::default(),
            base_urls: HashMap::new(),
        }
    }
}

impl ScannerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_spread.is_finite() {
            return Err(ConfigError::Invalid("min_spread must be a finite number".into()));
        }
        if self.top_n == 0 {
            return Err(ConfigError::Invalid("top_n must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.min_listings < 2 {
            let msg = "min_listings below 2 can never pair exchanges";
            return Err(ConfigError::Invalid(msg.into()));
        }
        if self.exchanges.is_empty() {
            return Err(ConfigError::Invalid("no exchanges selected".into()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.exchanges.iter().find(|e| !seen.insert(**e)) {
            return Err(ConfigError::Invalid(format!("exchange {dup} listed twice")));
        }
        Ok(())
    }

    /// Allow-list upper-cased, as symbols are compared after normalization.
    pub fn symbol_filter(&self) -> HashSet<String> {
        self.symbols
            .iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
