//! Kestrel binary entry point
//!
//! Runs the session nested inside the current desktop. Any arguments form the
//! startup program, spawned once the socket is published.

use anyhow::Context;
use kestrel_core::backend::winit::run_winit;
use kestrel_core::Config;
use tracing::{error, info};

fn init_logging() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let default_filter = "kestrel=debug,kestrel_core=debug,smithay=warn";
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Try journald first, fall back to stderr
    if let Ok(journald) = tracing_journald::layer() {
        tracing_subscriber::registry()
            .with(filter)
            .with(journald.with_syslog_identifier("kestrel".to_string()))
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn run() -> anyhow::Result<()> {
    let config = Config::from_env();

    let mut args = std::env::args().skip(1);
    let startup = args.next().map(|program| (program, args.collect::<Vec<_>>()));
    if let Some((program, program_args)) = &startup {
        info!("Will spawn: {} {:?}", program, program_args);
    }

    info!("Starting Kestrel with winit backend");
    run_winit(config, startup).context("compositor failed")
}

fn main() {
    init_logging();

    if let Err(e) = run() {
        error!("Fatal error: {:#}", e);
        eprintln!("kestrel: {:#}", e);
        std::process::exit(1);
    }
}
