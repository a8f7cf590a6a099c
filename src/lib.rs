// src/lib.rs
pub mod types;
pub mod config;
pub mod metrics;
pub mod publishing;
pub mod providers;
pub mod symbols;
pub mod funding;
pub mod throttle;
pub mod table;
pub mod orchestrator;
pub mod arbitrage;
pub mod scanner;

pub use arbitrage::{ArbitrageEngine, SignConvention};
pub use config::ScannerConfig;
pub use orchestrator::ScanError;
pub use scanner::{ScanOutcome, Scanner};
