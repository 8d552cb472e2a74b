// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use clap::Args;
use std::sync::Arc;
use std::time::Instant;

use crate::api::echo::{EchoRequest, EchoResponse, ECHO_PATH};
use crate::api::http_client::HttpTransport;
use crate::config::{parse_schemes, NegotiationConfig};
use crate::crypto::clock::system_clock;
use crate::crypto::ecdh::InMemoryKeyPairProvider;
use crate::negotiation::client::Negotiator;
use crate::negotiation::field_hook::FieldCryptoHook;
use crate::negotiation::interceptor::ClientNegotiationInterceptor;
use crate::negotiation::session_cache::SessionCache;

/// Logical destination id used for the probed node
const PROBE_DESTINATION: &str = "probe-target";

/// Arguments for the negotiate command
#[derive(Args, Debug)]
pub struct NegotiateArgs {
    /// Base URL of the node (e.g., http://127.0.0.1:8080)
    #[arg(long, env = "SHOULDER_NODE_URL")]
    pub url: String,

    /// Comma-separated schemes to offer (defaults to SHOULDER_SUPPORTED_SCHEMES or all)
    #[arg(long)]
    pub schemes: Option<String>,
}

/// Arguments for the probe command
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Base URL of the node (e.g., http://127.0.0.1:8080)
    #[arg(long, env = "SHOULDER_NODE_URL")]
    pub url: String,

    /// Message to send through the secured echo endpoint
    #[arg(long, default_value = "hello, shoulder")]
    pub message: String,

    /// Comma-separated schemes to offer (defaults to SHOULDER_SUPPORTED_SCHEMES or all)
    #[arg(long)]
    pub schemes: Option<String>,

    /// Number of echo calls to make over the same session
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,
}

fn client_for(url: &str, schemes: Option<&str>) -> Result<(Arc<Negotiator>, Arc<HttpTransport>, NegotiationConfig)> {
    dotenv::dotenv().ok();

    let mut config = NegotiationConfig::from_env();
    if let Some(raw) = schemes {
        config.supported_schemes = parse_schemes(raw);
    }
    config.validate().map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    let transport = Arc::new(
        HttpTransport::new(config.negotiation_path.clone(), config.handshake_timeout)?
            .with_destination(PROBE_DESTINATION, url),
    );
    let negotiator = Arc::new(Negotiator::new(
        Arc::new(config.clone()),
        SessionCache::new(system_clock()),
        Arc::new(InMemoryKeyPairProvider::new()),
        transport.clone(),
    ));
    Ok((negotiator, transport, config))
}

/// Run a single handshake and print the negotiated session metadata
pub async fn negotiate(args: NegotiateArgs) -> Result<()> {
    let (negotiator, _, config) = client_for(&args.url, args.schemes.as_deref())?;

    println!("🤝 Negotiating with {}{} ...", args.url, config.negotiation_path);
    let started = Instant::now();
    let session = negotiator.session_for(PROBE_DESTINATION).await?;

    println!("\n📋 Session Details:");
    println!("  Session ID:       {}", session.session_id());
    println!("  Scheme:           {}", session.encryption_scheme());
    println!("  Key Length:       {} bytes", session.key_length());
    println!(
        "  Server Key:       {}",
        STANDARD.encode(session.other_party_public_key())
    );
    println!("  Expires At:       {} ms", session.expire_time_epoch_ms());
    println!("  Round Trip:       {:?}", started.elapsed());
    Ok(())
}

/// Negotiate, then push a message through the secured echo endpoint
pub async fn probe(args: ProbeArgs) -> Result<()> {
    let (negotiator, transport, config) = client_for(&args.url, args.schemes.as_deref())?;
    let interceptor = ClientNegotiationInterceptor::new(
        negotiator.clone(),
        transport,
        FieldCryptoHook::new(config.decrypt_failure_policy),
    );

    let request = EchoRequest {
        message: args.message.clone(),
        note: None,
    };

    for attempt in 1..=args.repeat.max(1) {
        let started = Instant::now();
        let reply = interceptor
            .exchange::<EchoRequest, EchoResponse>(PROBE_DESTINATION, ECHO_PATH, &request)
            .await?;

        println!("\n🔐 Echo #{}", attempt);
        println!("  Session ID:       {}", reply.value.session_id);
        println!("  Scheme:           {}", reply.value.scheme);
        println!("  Message:          {}", reply.value.message);
        println!("  Round Trip:       {:?}", started.elapsed());
        if reply.is_degraded() {
            println!("  ⚠️  Fields left encrypted: {:?}", reply.degraded_fields);
        }

        if reply.value.message != args.message {
            return Err(anyhow!(
                "Echo mismatch: sent {:?}, got {:?}",
                args.message,
                reply.value.message
            ));
        }
    }

    println!("\n✅ Probe succeeded");
    Ok(())
}
