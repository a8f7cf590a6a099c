// src/bin/funding_scanner.rs
use clap::Parser;
use funding_arb::{
    config::ScannerConfig,
    metrics,
    orchestrator::ScanError,
    publishing::{JsonPublisher, Publisher, StdoutPublisher},
    scanner::Scanner,
    types::ExchangeId,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Scan perpetual funding rates across exchanges and rank the widest spreads.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML config file; built-in defaults when absent
    #[arg(long, env = "FUNDING_ARB_CONFIG")]
    config: Option<PathBuf>,
    /// Minimum annualized spread in percent
    #[arg(long)]
    min_spread: Option<f64>,
    /// How many opportunities to show
    #[arg(long)]
    top_n: Option<usize>,
    /// Comma separated, e.g. okx,bybit,hyperliquid
    #[arg(long, value_delimiter = ',')]
    exchanges: Option<Vec<ExchangeId>>,
    /// Only fetch these base symbols
    #[arg(long, value_delimiter = ',')]
    symbols: Option<Vec<String>>,
    /// Print the outcome as JSON instead of a table
    #[arg(long)]
    json: bool,
    /// Write Prometheus metrics to stderr after the scan
    #[arg(long)]
    dump_metrics: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ScannerConfig> {
        let mut cfg = match &self.config {
            Some(path) => ScannerConfig::load(path)?,
            None => ScannerConfig::default(),
        };
        if let Some(v) = self.min_spread {
            cfg.min_spread = v;
        }
        if let Some(v) = self.top_n {
            cfg.top_n = v;
        }
        if let Some(v) = self.exchanges {
            cfg.exchanges = v;
        }
        if let Some(v) = self.symbols {
            cfg.symbols = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let dump_metrics = args.dump_metrics;

    let code = match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<ScanError>() {
            Some(ScanError::NoData { skipped }) => {
                for s in skipped {
                    warn!(
                        exchange = %s.exchange,
                        stage = %s.stage,
                        reason = %s.reason,
                        "exchange skipped"
                    );
                }
                error!("{e}");
                ExitCode::from(2)
            }
            _ => {
                error!("{e:#}");
                ExitCode::FAILURE
            }
        },
    };

    if dump_metrics {
        match metrics::render() {
            Some(text) => eprint!("{text}"),
            None => warn!("built without the `metrics` feature, nothing to dump"),
        }
    }
    code
}

async fn run(args: Args) -> anyhow::Result<()> {
    let json = args.json;
    let cfg = args.into_config()?;
    let scanner = Scanner::from_config(&cfg)?;
    let outcome = scanner.run().await?;

    let publisher: Box<dyn Publisher> = if json {
        Box::new(JsonPublisher { pretty: true })
    } else {
        Box::new(StdoutPublisher)
    };
    publisher.publish(&outcome).await
}
