//! kvstore - An interactive shell over a single store
//!
//! This is the main entry point for the kvstore shell.
//! It starts one store with the chosen backend and runs text commands
//! read from stdin against it.

use kvstore::adapter::{CacheAdapter, MemoryAdapter};
use kvstore::commands::{CommandHandler, Response};
use kvstore::config::StoreConfig;
use kvstore::storage::{ExpiryConfig, Store};
use std::time::Duration;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Log filter used when `RUST_LOG` is not set
const DEFAULT_LOG_FILTER: &str = "info";

/// Which backend the shell store uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Memory,
    Cache,
}

/// Shell configuration
struct Config {
    /// Backend adapter
    backend: Backend,
    /// zlib level for cache values (None = no compression)
    compression: Option<u32>,
    /// Default TTL for every write (None = keys live until deleted)
    default_ttl: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            compression: None,
            default_ttl: None,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--backend" | "-b" => {
                    config.backend = match args.get(i + 1).map(String::as_str) {
                        Some("memory") => Backend::Memory,
                        Some("cache") => Backend::Cache,
                        Some(other) => {
                            eprintln!("Error: unknown backend '{}'", other);
                            std::process::exit(1);
                        }
                        None => {
                            eprintln!("Error: --backend requires a value");
                            std::process::exit(1);
                        }
                    };
                    i += 2;
                }
                "--compress" => {
                    config.compression = Some(6);
                    i += 1;
                }
                "--ttl-ms" => {
                    if i + 1 < args.len() {
                        let ms: u64 = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid TTL");
                            std::process::exit(1);
                        });
                        config.default_ttl = Some(Duration::from_millis(ms));
                        i += 2;
                    } else {
                        eprintln!("Error: --ttl-ms requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("kvstore version {}", kvstore::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    fn store_config(&self) -> StoreConfig {
        let expiry = match self.default_ttl {
            Some(ttl) => ExpiryConfig::with_default_ttl(ttl),
            None => ExpiryConfig::new(),
        };
        StoreConfig::named("shell").with_expiry(expiry)
    }
}

fn print_help() {
    println!(
        r#"
kvstore - An interactive key-value store shell

USAGE:
    kvstore [OPTIONS]

OPTIONS:
    -b, --backend <NAME>   Backend adapter: memory or cache (default: memory)
        --compress         Compress cache values with zlib
        --ttl-ms <MS>      Expire every written key after MS milliseconds
    -v, --version          Print version information
    -h, --help             Print this help message

EXAMPLES:
    kvstore                          # In-memory terms
    kvstore --backend cache          # Byte-encoded cache backend
    kvstore --ttl-ms 60000           # Keys expire after one minute

SESSION:
    > PUT name "Ariz"
    OK
    > FETCH name
    "Ariz"
    > INCR visits
    (integer) 1
    > QUIT
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging (stderr, so replies on stdout stay clean)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let store = match config.backend {
        Backend::Memory => Store::start(MemoryAdapter, Default::default(), config.store_config())?,
        Backend::Cache => {
            let adapter = match config.compression {
                Some(level) => CacheAdapter::compressed(level),
                None => CacheAdapter::new(),
            };
            Store::start(adapter, Default::default(), config.store_config())?
        }
    };
    info!(store = %store.name(), backend = ?config.backend, "Store started");

    let handler = CommandHandler::new(store);

    // Stop on Ctrl+C as well as on QUIT / end of input
    tokio::select! {
        result = repl(&handler) => result?,
        _ = signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    if let Err(e) = handler.store().shutdown().await {
        warn!(error = %e, "Store did not shut down cleanly");
    }
    Ok(())
}

/// Reads commands line by line until QUIT or end of input
async fn repl(handler: &CommandHandler) -> anyhow::Result<()> {
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = handler.execute(&line).await;
        stdout.write_all(format!("{}\n", response).as_bytes()).await?;

        if response == Response::Quit {
            break;
        }
    }

    stdout.flush().await?;
    Ok(())
}
