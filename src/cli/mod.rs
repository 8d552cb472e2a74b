// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod probe;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Shoulder Negotiation CLI
#[derive(Parser, Debug)]
#[command(name = "shoulder-cli")]
#[command(version = crate::version::VERSION_NUMBER)]
#[command(about = "CLI tools for probing shoulder negotiation nodes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a handshake against a node and print the session
    Negotiate(probe::NegotiateArgs),

    /// Negotiate and send an encrypted message through the echo endpoint
    Probe(probe::ProbeArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Negotiate(args) => probe::negotiate(args).await,
        Commands::Probe(args) => probe::probe(args).await,
    }
}
