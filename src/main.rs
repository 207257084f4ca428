//! `folio`: run optimize / backtest requests from JSON files.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use folio_engine::Engine;
use folio_engine::EngineConfig;
use folio_engine::EngineError;
use folio_engine::InMemoryPriceHistory;
use serde::de::DeserializeOwned;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Portfolio optimization and backtesting over JSON price histories")]
struct Cli {
  #[command(subcommand)]
  command: Commands,

  /// Engine configuration JSON (camelCase fields; missing ones keep their defaults)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Abort a request after this many milliseconds
  #[arg(long, global = true)]
  timeout_ms: Option<u64>,

  /// Pretty-print the JSON output
  #[arg(long, global = true)]
  pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
  /// Optimize portfolio weights
  Optimize {
    /// Price history JSON: [{ticker, points: [{date, adjustedClose, dividend?, splitFactor?}]}]
    #[arg(long)]
    prices: PathBuf,
    /// Optimize request JSON
    #[arg(long)]
    request: PathBuf,
  },
  /// Replay a portfolio over history
  Backtest {
    #[arg(long)]
    prices: PathBuf,
    /// Backtest request JSON
    #[arg(long)]
    request: PathBuf,
  },
  /// Random long-only portfolios over the optimize window
  Scatter {
    #[arg(long)]
    prices: PathBuf,
    #[arg(long)]
    request: PathBuf,
    #[arg(long, default_value = "500")]
    samples: usize,
    #[arg(long, default_value = "42")]
    seed: u64,
  },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
  let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
  serde_json::from_reader(BufReader::new(file)).with_context(|| format!("parsing {}", path.display()))
}

fn load_prices(path: &Path) -> anyhow::Result<InMemoryPriceHistory> {
  let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
  InMemoryPriceHistory::from_reader(BufReader::new(file))
    .with_context(|| format!("loading price history from {}", path.display()))
}

fn run(cli: &Cli) -> anyhow::Result<serde_json::Value> {
  let mut config = match &cli.config {
    Some(path) => read_json::<EngineConfig>(path)?,
    None => EngineConfig::default(),
  };
  if let Some(ms) = cli.timeout_ms {
    config = config.with_timeout(Duration::from_millis(ms));
  }
  let engine = Engine::new(config);

  let value = match &cli.command {
    Commands::Optimize { prices, request } => {
      let provider = load_prices(prices)?;
      let req = read_json(request)?;
      serde_json::to_value(engine.optimize(&req, &provider)?)?
    }
    Commands::Backtest { prices, request } => {
      let provider = load_prices(prices)?;
      let req = read_json(request)?;
      serde_json::to_value(engine.backtest(&req, &provider)?)?
    }
    Commands::Scatter {
      prices,
      request,
      samples,
      seed,
    } => {
      let provider = load_prices(prices)?;
      let req = read_json(request)?;
      serde_json::to_value(engine.scatter(&req, &provider, *samples, *seed)?)?
    }
  };
  Ok(value)
}

/// `{error, message}` for engine failures, plain message otherwise.
fn error_json(err: &anyhow::Error) -> serde_json::Value {
  let kind = err
    .chain()
    .find_map(|e| e.downcast_ref::<EngineError>())
    .map_or("Error", EngineError::kind);
  serde_json::json!({ "error": kind, "message": format!("{err:#}") })
}

fn main() -> anyhow::Result<()> {
  tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .with(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let cli = Cli::parse();
  let (value, failed) = match run(&cli) {
    Ok(v) => (v, false),
    Err(e) => {
      tracing::error!("{e:#}");
      (error_json(&e), true)
    }
  };

  let out = if cli.pretty {
    serde_json::to_string_pretty(&value)?
  } else {
    serde_json::to_string(&value)?
  };
  println!("{out}");

  if failed {
    std::process::exit(1);
  }
  Ok(())
}
