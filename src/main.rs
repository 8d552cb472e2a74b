// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use shoulder_negotiation::{
    api::{start_server, AppState, ECHO_PATH},
    config::NegotiationConfig,
    crypto::{system_clock, InMemoryKeyPairProvider},
    negotiation::{NegotiationResponder, SessionCache},
};
use std::{env, net::SocketAddr, sync::Arc};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    println!("🚀 Starting Shoulder Negotiation Node...\n");
    println!("📦 BUILD VERSION: {}", shoulder_negotiation::version::VERSION);
    println!("📅 Build Date: {}", shoulder_negotiation::version::BUILD_DATE);
    println!();

    let config = NegotiationConfig::from_env();
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    let addr: SocketAddr = config.bind_addr.parse()?;

    let cache = SessionCache::new(system_clock());
    let sweeper = config.sweep_interval.map(|interval| {
        println!("🧹 Session sweeper every {:?}", interval);
        cache.spawn_sweeper(interval)
    });

    let responder = Arc::new(NegotiationResponder::new(
        Arc::new(config.clone()),
        cache,
        Arc::new(InMemoryKeyPairProvider::new()),
    ));

    let separator = "=".repeat(60);
    println!("{}", separator);
    println!("🎉 Shoulder Negotiation Node is running");
    println!("{}", separator);
    println!("Listen:         {}", addr);
    println!(
        "Schemes:        {}",
        config
            .supported_schemes
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Session TTL:    {:?}", config.session_ttl);
    println!("Token Window:   {}s", config.token_window_secs);
    println!("Decrypt Policy: {}", config.decrypt_failure_policy);
    println!("\nAPI Endpoints:");
    println!("  Health:       http://{}/health", addr);
    println!("  Version:      http://{}/version", addr);
    println!("  Negotiate:    POST http://{}{}", addr, config.negotiation_path);
    println!("  Echo:         POST http://{}{}", addr, ECHO_PATH);
    println!("\nPress Ctrl+C to shutdown...");
    println!("{}\n", separator);

    start_server(addr, AppState::new(responder), async {
        // Wait for shutdown signal
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        println!("\n⏹️  Shutting down...");
    })
    .await?;

    // Cleanup
    if let Some(handle) = sweeper {
        handle.abort();
    }

    println!("👋 Goodbye!");
    Ok(())
}
