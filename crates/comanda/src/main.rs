// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Comanda - a WhatsApp-style ordering agent for a restaurant backend.
//!
//! This is the binary entry point for the Comanda agent.

use clap::{Parser, Subcommand};

mod serve;
mod shutdown;

/// Comanda - a WhatsApp-style ordering agent.
#[derive(Parser, Debug)]
#[command(name = "comanda", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Comanda agent.
    Serve,
    /// Load and validate the configuration, then exit.
    ConfigCheck,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match comanda_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            comanda_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(err) = serve::run_serve(config).await {
                eprintln!("comanda serve failed: {err}");
                std::process::exit(1);
            }
        }
        Some(Commands::ConfigCheck) => {
            println!(
                "comanda: config ok (agent.name={}, backend={})",
                config.agent.name, config.backend.base_url
            );
        }
        None => {
            println!("comanda: use --help for available commands");
        }
    }
}
