//! minidb server CLI
//!
//! Entry point for the database server.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;

use minidb::{Config, DatabaseServer};

#[derive(Parser, Debug)]
#[command(name = "minidb")]
#[command(about = "Minimal relational database server", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "minidb.toml")]
    config: PathBuf,

    /// Data directory (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// TCP port to listen on (overrides the config file)
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if args.config.exists() {
        Config::from_file(&args.config).context("Failed to load configuration")?
    } else {
        eprintln!(
            "Warning: Config file {} not found, using defaults",
            args.config.display()
        );
        Config::default()
    };

    let data_dir = args.data_dir.unwrap_or_else(|| config.server.data_dir.clone());
    let port = args.port.unwrap_or(config.server.port);

    minidb::logging::init(&config.log.level, config.log.file.as_deref())
        .context("Failed to initialize logging")?;

    let server =
        Arc::new(DatabaseServer::new(&data_dir).context("Failed to initialize database")?);

    ctrlc::set_handler(|| {
        log::info!("shutdown signal received");
        eprintln!("\nShutting down server...");
        std::process::exit(0);
    })
    .context("Failed to install signal handler")?;

    let listener = TcpListener::bind(("0.0.0.0", port))
        .with_context(|| format!("Failed to bind port {}", port))?;

    println!("minidb server started on port {}", port);
    println!("Data directory: {}", data_dir.display());
    println!("Press Ctrl+C to stop the server");

    server.serve(listener).context("Server terminated")?;
    Ok(())
}
