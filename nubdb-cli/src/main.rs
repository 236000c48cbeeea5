//! # NubDB
//!
//! In-memory key-value store with durable append-only persistence.
//!
//! Run without flags to read commands from stdin; run with `--server` to
//! accept TCP clients speaking the same line protocol:
//!
//! ```text
//! nubdb                  # interactive shell over ./nubdb.aof
//! nubdb --server         # TCP server on 0.0.0.0:6379
//! nubdb --server 7000    # TCP server on a custom port
//! ```

mod command;
mod repl;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use nubdb_core::{ServerConfig, StoreConfig};
use nubdb_storage::Store;

use command::Dispatcher;

#[derive(Parser)]
#[command(name = "nubdb")]
#[command(about = "In-memory key-value store with append-only persistence", version)]
struct Cli {
    /// Accept TCP clients instead of reading commands from stdin
    #[arg(long, value_name = "PORT", num_args = 0..=1, default_missing_value = "6379")]
    server: Option<u16>,

    /// Path of the append-only log
    #[arg(long, value_name = "PATH", default_value = "nubdb.aof")]
    aof: PathBuf,

    /// Disable persistence entirely (nothing survives the process)
    #[arg(long)]
    no_aof: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    let store_config = StoreConfig {
        aof_path: if cli.no_aof { None } else { Some(cli.aof) },
        ..StoreConfig::default()
    };
    let store = Arc::new(
        Store::open(store_config).context("failed to open store")?,
    );
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&store)));

    info!(version = nubdb_core::VERSION, "Database ready");

    match cli.server {
        Some(port) => {
            let server_config = ServerConfig {
                port,
                ..ServerConfig::default()
            };
            server::serve(dispatcher, &server_config.bind_addr, server_config.port)
                .context("server failed")?;
        }
        None => {
            repl::run(&dispatcher).context("shell failed")?;
        }
    }

    store.force_flush().context("final flush failed")?;
    Ok(())
}
