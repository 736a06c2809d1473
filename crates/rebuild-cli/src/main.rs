use std::io::{Read, Write};

use anyhow::{Context, Result};
use clap::Parser;
use rebuild_cli::{build_filter_from, check_filter, run_key, run_rebuild, run_request, run_show, to_hex, Cli, Commands,
                  FilterCommand};
use rebuild_persistence::{build_dev_pool_from_env, PgObjectStore, PoolProvider};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(std::io::stderr)).try_init();
}

fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw).context("reading stdin")?;
        return Ok(raw);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {path}"))
}

fn run_filter(cmd: &FilterCommand) -> Result<String> {
    match cmd {
        FilterCommand::Build { input, out } => {
            let filter = build_filter_from(&read_input(input)?);
            match out {
                Some(path) => {
                    std::fs::File::create(path).and_then(|mut f| f.write_all(&filter))
                                               .with_context(|| format!("writing {path}"))?;
                    Ok(format!("wrote {} bytes to {path}", filter.len()))
                }
                None => Ok(to_hex(&filter)),
            }
        }
        FilterCommand::Check { filter, gavs } => {
            let bytes = std::fs::read(filter).with_context(|| format!("reading {filter}"))?;
            Ok(check_filter(&bytes, gavs))
        }
    }
}

fn connect() -> Result<PgObjectStore<PoolProvider>> {
    let pool = build_dev_pool_from_env().context("connecting to Postgres (DATABASE_URL)")?;
    Ok(PgObjectStore::from_pool(pool))
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    let output = match &cli.command {
        Commands::Key(cmd) => run_key(cmd),
        Commands::Filter(cmd) => run_filter(cmd)?,
        Commands::Request(args) => run_request(&connect()?, args)?,
        Commands::Rebuild(args) => run_rebuild(&connect()?, args)?,
        Commands::Show(args) => run_show(&connect()?, args)?,
    };
    println!("{output}");
    Ok(())
}
