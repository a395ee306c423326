// CLASSIFICATION: COMMUNITY
// Filename: main.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Entry point for the remotefs servers.

use clap::Parser;
use remotefs::cli::{self, Cli};

fn main() {
    let cli = Cli::parse();
    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    if let Err(err) = cli::run(cli) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
