//! Shared harness: a client `Negotiator` wired to an in-process responder

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::Request,
    Router,
};
use serde_json::Value;
use shoulder_negotiation::{
    api::{router, AppState},
    config::NegotiationConfig,
    crypto::{EncryptionScheme, InMemoryKeyPairProvider, ManualClock, NegotiationError, Result},
    negotiation::{
        ClientNegotiationInterceptor, FieldCryptoHook, NegotiationRequest, NegotiationResponder,
        NegotiationResponse, Negotiator, SecuredCall, SecuredReply, SessionCache, Transport,
        DATA_KEY_HEADER, NEGOTIATION_INVALID_TAG, SESSION_ID_HEADER, TOKEN_HEADER,
    },
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

pub const DESTINATION: &str = "shoulder-node";
pub const START_MS: i64 = 1_700_000_000_000;

type Tamper = Box<dyn Fn(&mut NegotiationResponse) + Send + Sync>;

/// Routes handshakes to the responder and secured calls through the axum router
pub struct LoopbackTransport {
    responder: Arc<NegotiationResponder>,
    router: Router,
    negotiations: AtomicUsize,
    sends: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    tamper: Mutex<Option<Tamper>>,
    last_call: Mutex<Option<SecuredCall>>,
}

impl LoopbackTransport {
    pub fn new(responder: Arc<NegotiationResponder>) -> Self {
        let router = router(AppState::new(responder.clone()));
        Self {
            responder,
            router,
            negotiations: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            delay: Mutex::new(None),
            tamper: Mutex::new(None),
            last_call: Mutex::new(None),
        }
    }

    pub fn negotiations(&self) -> usize {
        self.negotiations.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_tamper(&self, tamper: impl Fn(&mut NegotiationResponse) + Send + Sync + 'static) {
        *self.tamper.lock().unwrap() = Some(Box::new(tamper));
    }

    pub fn clear_tamper(&self) {
        *self.tamper.lock().unwrap() = None;
    }

    pub fn last_call(&self) -> Option<SecuredCall> {
        self.last_call.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn negotiate(
        &self,
        _destination: &str,
        request: &NegotiationRequest,
    ) -> Result<NegotiationResponse> {
        self.negotiations.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut response = self.responder.respond(request).await?;
        if let Some(tamper) = self.tamper.lock().unwrap().as_ref() {
            tamper(&mut response);
        }
        Ok(response)
    }

    async fn send(&self, _destination: &str, call: SecuredCall) -> Result<SecuredReply> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        *self.last_call.lock().unwrap() = Some(call.clone());

        let request = Request::builder()
            .method("POST")
            .uri(&call.path)
            .header("content-type", "application/json")
            .header(SESSION_ID_HEADER, &call.headers.session_id)
            .header(TOKEN_HEADER, &call.headers.token)
            .header(DATA_KEY_HEADER, &call.headers.data_key)
            .body(Body::from(serde_json::to_vec(&call.body)?))
            .map_err(|e| NegotiationError::Transport(e.to_string()))?;

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| NegotiationError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let negotiation_invalid = response.headers().contains_key(NEGOTIATION_INVALID_TAG);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| NegotiationError::Transport(e.to_string()))?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };

        Ok(SecuredReply {
            status,
            negotiation_invalid,
            body,
        })
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub client_config: Arc<NegotiationConfig>,
    pub responder: Arc<NegotiationResponder>,
    pub transport: Arc<LoopbackTransport>,
    pub negotiator: Arc<Negotiator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_schemes(EncryptionScheme::ALL.to_vec(), EncryptionScheme::ALL.to_vec())
    }

    pub fn with_schemes(client: Vec<EncryptionScheme>, server: Vec<EncryptionScheme>) -> Self {
        let client_config = NegotiationConfig {
            supported_schemes: client,
            ..Default::default()
        };
        let server_config = NegotiationConfig {
            supported_schemes: server,
            ..Default::default()
        };
        Self::with_configs(client_config, server_config)
    }

    pub fn with_configs(client_config: NegotiationConfig, server_config: NegotiationConfig) -> Self {
        let clock = Arc::new(ManualClock::new(START_MS));

        let responder = Arc::new(NegotiationResponder::new(
            Arc::new(server_config),
            SessionCache::new(clock.clone()),
            Arc::new(InMemoryKeyPairProvider::new()),
        ));
        let transport = Arc::new(LoopbackTransport::new(responder.clone()));

        let client_config = Arc::new(client_config);
        let negotiator = Arc::new(Negotiator::new(
            client_config.clone(),
            SessionCache::new(clock.clone()),
            Arc::new(InMemoryKeyPairProvider::new()),
            transport.clone(),
        ));

        Self {
            clock,
            client_config,
            responder,
            transport,
            negotiator,
        }
    }

    pub fn interceptor(&self) -> ClientNegotiationInterceptor {
        ClientNegotiationInterceptor::new(
            self.negotiator.clone(),
            self.transport.clone(),
            FieldCryptoHook::new(self.client_config.decrypt_failure_policy),
        )
    }
}
