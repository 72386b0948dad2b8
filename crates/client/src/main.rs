// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! dw-watch: connect to a realtime server, log in and watch the connection.
//!
//! Prints every connection state change and escalated error until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use deepwire::{Client, ClientConfig, ConnectionState, Event, Topic};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// dw-watch: realtime connection watcher
#[derive(Parser, Debug)]
#[command(name = "dw-watch")]
#[command(about = "Connect to a realtime server, log in and report connection state")]
struct Args {
    /// Server URL (overrides the config file)
    url: Option<String>,

    /// TOML file with client settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Login parameters as JSON
    #[arg(short, long, default_value = "{}")]
    auth: String,

    /// Print state changes to stdout as JSON lines
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_logging(args.verbose);

    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(url) = args.url {
        config = config.with_url(url);
    }
    let params: serde_json::Value = serde_json::from_str(&args.auth)?;

    info!("Starting dw-watch");
    info!("  Server: {}", config.url);

    let client = Client::new(config)?;
    let json = args.json;
    client.add_connection_state_listener(Arc::new(move |state: ConnectionState| {
        if json {
            println!("{}", serde_json::json!({ "state": state }));
        } else {
            info!("connection state: {}", state);
        }
    }));
    client.set_runtime_error_handler(|topic: Topic, event: &Event, message: &str| {
        warn!("{} {}: {}", topic, event, message);
    });

    let (tx, rx) = tokio::sync::oneshot::channel();
    client.login_with(params, move |result| {
        let _ = tx.send(result);
    })?;

    tokio::select! {
        result = rx => match result {
            Ok(Ok(data)) => {
                info!("logged in");
                if let Some(data) = data {
                    info!("  Client data: {}", data);
                }
            }
            Ok(Err(e)) => {
                error!("login failed: {}", e);
                client.close();
                return Err(e.into());
            }
            Err(_) => warn!("login abandoned: {}", client.status()),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted before login completed");
            client.close();
            return Ok(());
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down ({})", client.status());
    client.close();
    Ok(())
}
