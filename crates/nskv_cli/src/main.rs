//! nskv CLI
//!
//! Runs the key/value server and talks to it.
//!
//! # Commands
//!
//! - `serve` - Run the server on a chosen backend
//! - `get`, `put`, `del`, `exists`, `keys` - One call against a running server

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Namespaced key/value server and client.
#[derive(Parser)]
#[command(name = "nskv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server address for client commands
    #[arg(global = true, short, long, default_value = "127.0.0.1:7420")]
    addr: String,

    /// Namespace for client commands (empty is the global namespace)
    #[arg(global = true, short, long, default_value = "")]
    namespace: String,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// In-process map, lost on restart
    Memory,
    /// Durable code path on an in-process store
    Loopback,
    /// Redis-compatible store at --store-addr
    Durable,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:7420")]
        bind: SocketAddr,

        /// Storage backend
        #[arg(long, value_enum, default_value = "memory")]
        backend: Backend,

        /// Store address for the durable backend
        #[arg(long, default_value = "127.0.0.1:6379")]
        store_addr: String,

        /// Store connect and I/O timeout in milliseconds
        #[arg(long, default_value = "5000")]
        store_timeout_ms: u64,

        /// Maximum concurrent connections
        #[arg(long, default_value = "1000")]
        max_connections: usize,

        /// Per-request timeout in milliseconds
        #[arg(long, default_value = "30000")]
        request_timeout_ms: u64,
    },

    /// Read a key
    Get {
        /// Key
        key: String,
    },

    /// Write a key
    Put {
        /// Key
        key: String,

        /// Value
        value: String,

        /// Keep the existing value if the key is present
        #[arg(long)]
        no_overwrite: bool,
    },

    /// Delete a key, or every key under a prefix
    Del {
        /// Key, or prefix with --prefix
        key: String,

        /// Delete every key starting with KEY
        #[arg(short, long)]
        prefix: bool,
    },

    /// Check whether a key exists
    Exists {
        /// Key
        key: String,
    },

    /// List keys under a prefix
    Keys {
        /// Prefix (empty lists the whole namespace)
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let format = commands::OutputFormat::parse(&cli.format)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Serve {
            bind,
            backend,
            store_addr,
            store_timeout_ms,
            max_connections,
            request_timeout_ms,
        } => {
            let backend = match backend {
                Backend::Memory => nskv_server::BackendConfig::Memory,
                Backend::Loopback => nskv_server::BackendConfig::Loopback,
                Backend::Durable => nskv_server::BackendConfig::Durable {
                    store_addr,
                    connect_timeout: Duration::from_millis(store_timeout_ms),
                },
            };
            let config = nskv_server::ServerConfig::new(bind)
                .with_backend(backend)
                .with_max_connections(max_connections)
                .with_request_timeout(Duration::from_millis(request_timeout_ms));
            runtime.block_on(commands::serve::run(config))?;
        }
        Commands::Get { key } => {
            runtime.block_on(commands::kv::get(&cli.addr, &cli.namespace, &key, format))?;
        }
        Commands::Put {
            key,
            value,
            no_overwrite,
        } => {
            runtime.block_on(commands::kv::put(
                &cli.addr,
                &cli.namespace,
                &key,
                &value,
                !no_overwrite,
                format,
            ))?;
        }
        Commands::Del { key, prefix } => {
            runtime.block_on(commands::kv::del(
                &cli.addr,
                &cli.namespace,
                &key,
                prefix,
                format,
            ))?;
        }
        Commands::Exists { key } => {
            runtime.block_on(commands::kv::exists(&cli.addr, &cli.namespace, &key, format))?;
        }
        Commands::Keys { prefix } => {
            runtime.block_on(commands::kv::keys(&cli.addr, &cli.namespace, &prefix, format))?;
        }
        Commands::Version => {
            println!("nskv CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
