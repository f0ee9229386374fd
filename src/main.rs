//! chatlink - headless realtime chat client
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::eyre;

use chatlink::{run_headless, HeadlessOptions};
use chatlink_app::config::{self, Settings};
use chatlink_core::prelude::*;
use chatlink_core::{logging, Credentials};

/// chatlink - headless realtime chat client
#[derive(Parser, Debug)]
#[command(name = "chatlink")]
#[command(about = "Headless realtime chat client (NDJSON on stdout)", long_about = None)]
struct Args {
    /// Config file (defaults to <config_dir>/chatlink/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override `[server] host`
    #[arg(long)]
    host: Option<String>,

    /// Override `[server] port`
    #[arg(long)]
    port: Option<u16>,

    /// Log in as this user instead of using the stored session
    #[arg(long, requires = "password")]
    user: Option<String>,

    #[arg(long, requires = "user")]
    password: Option<String>,

    /// Write a commented default config file and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let config_dir = match &args.config {
        Some(file) => file
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
        None => config::default_config_dir()
            .ok_or_else(|| eyre!("no config directory on this platform, pass --config"))?,
    };

    if args.init_config {
        config::init_config_dir(&config_dir)?;
        eprintln!(
            "Config written to {}",
            config_dir.join(config::CONFIG_FILENAME).display()
        );
        return Ok(());
    }

    logging::init()?;

    let mut settings: Settings = match &args.config {
        Some(file) => config::load_settings_file(file),
        None => config::load_settings(&config_dir),
    };
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    let credentials = match (args.user, args.password) {
        (Some(username), Some(password)) => Some(Credentials { username, password }),
        _ => None,
    };

    let result = run_headless(HeadlessOptions {
        settings,
        config_dir,
        credentials,
    })
    .await;

    if let Err(ref e) = result {
        error!("Application error: {:?}", e);
    }
    result?;
    Ok(())
}
