//! folio-load: runs the concurrent loan workload against an embedded store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use folio::{AppConfig, Library, LoadDriver};

#[derive(Debug, Parser)]
#[command(name = "folio-load", version, about = "Concurrent load driver for the folio loan service")]
struct Cli {
    /// TOML config file; defaults apply when omitted
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Number of worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Number of books to seed
    #[arg(long)]
    books: Option<usize>,

    /// Number of users to seed
    #[arg(long)]
    users: Option<usize>,

    /// Iterations of each worker phase
    #[arg(long)]
    iterations: Option<usize>,

    /// Lower bound of the pause between iterations
    #[arg(long)]
    min_delay_ms: Option<u64>,

    /// Upper bound of the pause between iterations
    #[arg(long)]
    max_delay_ms: Option<u64>,

    /// Seed for the shared random source
    #[arg(long)]
    seed: Option<u64>,
}

impl Cli {
    fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => AppConfig::default(),
        };

        let driver = &mut config.driver;
        if let Some(workers) = self.workers {
            driver.workers = workers;
        }
        if let Some(books) = self.books {
            driver.books = books;
        }
        if let Some(users) = self.users {
            driver.users = users;
        }
        if let Some(iterations) = self.iterations {
            driver.iterations_per_phase = iterations;
        }
        if let Some(min_delay_ms) = self.min_delay_ms {
            driver.min_delay_ms = min_delay_ms;
        }
        if let Some(max_delay_ms) = self.max_delay_ms {
            driver.max_delay_ms = max_delay_ms;
        }
        if self.seed.is_some() {
            driver.rng_seed = self.seed;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    let store = config.store.open_store().context("opening the document store")?;
    let library = Library::new(Arc::new(store));
    let driver = LoadDriver::new(library, config.driver.clone());

    let report = driver.run().context("load run failed")?;
    if !report.is_consistent() {
        bail!(
            "{} loan link violations detected",
            report.link_violations.len()
        );
    }
    Ok(())
}
