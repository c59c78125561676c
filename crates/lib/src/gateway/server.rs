//! Webhook HTTP server: Messenger deliveries, subscription handshake, and SafeTrek OAuth redirect.

use crate::channels::{InboundEvent, MessengerChannel, OutboundSender};
use crate::config::{self, Config};
use crate::conversation::{AlertRequest, ConversationHandler, Decision};
use crate::gateway::protocol::{
    classify_delivery, GetRequest, WebhookError, WebhookQuery, EVENT_RECEIVED,
};
use crate::safetrek::{SafeTrekClient, TokenStore};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

const INBOUND_QUEUE_CAPACITY: usize = 256;

/// Shared state for the webhook server.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Resolved FB_VERIFY_TOKEN; None means every handshake is refused.
    pub verify_token: Option<String>,
    /// Classified events are queued here; the processor task decides and replies.
    pub inbound_tx: mpsc::Sender<InboundEvent>,
    pub handler: Arc<ConversationHandler>,
    pub sender: Arc<dyn OutboundSender>,
    pub safetrek: SafeTrekClient,
    pub token_store: Arc<TokenStore>,
}

/// Log the dispatch trigger for a shared location.
fn emit_alert(alert: &AlertRequest) {
    log::warn!(
        target: "dispatch",
        "GENERATE ALERT: dispatch help to {} at lat {} long {}",
        alert.sender_id,
        alert.lat,
        alert.long
    );
}

/// Decide the outcome for one event and, when there is a reply, send it from a separate task.
/// Returns the send task handle so callers can await delivery if they need to.
fn process_inbound_event(state: &GatewayState, event: InboundEvent) -> Option<JoinHandle<()>> {
    let decision = match state.handler.decide(&event) {
        Ok(d) => d,
        Err(e) => {
            log::error!("conversation: could not build reply for {}: {}", event.sender_id, e);
            return None;
        }
    };
    if let Some(alert) = decision.alert() {
        emit_alert(alert);
    }
    match &decision {
        Decision::Reserved(keyword) => {
            log::debug!("conversation: {:?} is reserved, not replying to {}", keyword, event.sender_id);
        }
        Decision::Ignored => {
            log::debug!("conversation: nothing to answer for {}", event.sender_id);
        }
        Decision::Reply(_) | Decision::Dispatch { .. } => {}
    }
    let payload = decision.reply()?.clone();
    let sender = state.sender.clone();
    let recipient = event.sender_id;
    Some(tokio::spawn(async move {
        match sender.send(&recipient, &payload).await {
            Ok(()) => log::info!("{}: message sent to {}", sender.id(), recipient),
            Err(e) => log::error!("{}: unable to send message to {}: {}", sender.id(), recipient, e),
        }
    }))
}

/// Exchange the code in the background; the redirect has already been acknowledged.
fn spawn_token_exchange(state: &GatewayState, code: String) -> JoinHandle<()> {
    let safetrek = state.safetrek.clone();
    let store = state.token_store.clone();
    tokio::spawn(async move {
        match safetrek.exchange(&code, &store).await {
            Ok(token) => log::info!(
                "safetrek access token attained (type {}, expires {:?})",
                token.token_type,
                token.expires_at
            ),
            Err(e) => log::error!("unable to attain safetrek access token: {}", e),
        }
    })
}

/// Build the router. Split from [`run_gateway`] so the state can be assembled separately.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/webhook", get(webhook_get).post(webhook_post))
        .with_state(state)
}

/// HTTP client for outbound calls (Send API, SafeTrek token endpoint), bounded by the configured timeout.
pub fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.gateway.outbound_timeout())
        .build()
        .context("building outbound http client")
}

/// Build the shared state from config. Outbound calls share one client.
pub fn build_state(config: Config) -> Result<(GatewayState, mpsc::Receiver<InboundEvent>)> {
    let http = build_http_client(&config)?;

    let page_token = config::resolve_page_access_token(&config);
    if page_token.is_none() {
        log::warn!("PAGE_ACCESS_TOKEN not set; replies will fail to send");
    }
    let verify_token = config::resolve_verify_token(&config);
    if verify_token.is_none() {
        log::warn!("FB_VERIFY_TOKEN not set; webhook verification will be refused");
    }
    let messenger = Arc::new(MessengerChannel::new(
        http.clone(),
        page_token,
        config.messenger.send_api_url.clone(),
    ));

    let safetrek = SafeTrekClient::from_config(http, &config);
    let login_url = match safetrek.authorization_url() {
        Ok(url) => Some(url),
        Err(e) => {
            log::warn!("safetrek login button disabled: {}", e);
            None
        }
    };

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
    let state = GatewayState {
        config: Arc::new(config),
        verify_token,
        inbound_tx,
        handler: Arc::new(ConversationHandler::new(login_url)),
        sender: messenger,
        safetrek,
        token_store: Arc::new(TokenStore::new()),
    };
    Ok((state, inbound_rx))
}

/// Run the webhook server on config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let (state, mut inbound_rx) = build_state(config)?;

    {
        let state_inbound = state.clone();
        tokio::spawn(async move {
            while let Some(event) = inbound_rx.recv().await {
                process_inbound_event(&state_inbound, event);
            }
        });
    }

    let bind_addr = format!("{}:{}", state.config.gateway.bind.trim(), state.config.gateway.port);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("webhook is listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("webhook server exited")?;
    log::info!("webhook server stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET /webhook: subscription handshake, or SafeTrek redirect carrying `?code=`.
async fn webhook_get(
    State(state): State<GatewayState>,
    Query(query): Query<WebhookQuery>,
) -> Result<Response, WebhookError> {
    match query.classify()? {
        GetRequest::Verify => {
            let challenge = query.verify(state.verify_token.as_deref())?;
            log::info!("webhook verified");
            Ok((StatusCode::OK, challenge).into_response())
        }
        GetRequest::Authorize { code } => {
            log::info!("safetrek authorization code received");
            spawn_token_exchange(&state, code);
            Ok(StatusCode::OK.into_response())
        }
    }
}

/// POST /webhook: Messenger delivery. Accepted page deliveries are always acknowledged.
async fn webhook_post(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let events = classify_delivery(&body)?;
    for event in events {
        log::info!("sender psid: {}", event.sender_id);
        match state.inbound_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::warn!("webhook: inbound queue full, dropping event from {}", event.sender_id);
            }
            Err(TrySendError::Closed(_)) => {
                log::warn!("webhook: inbound queue closed, dropping event");
            }
        }
    }
    Ok((StatusCode::OK, EVENT_RECEIVED))
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let authorized = state.token_store.is_authorized(chrono::Utc::now()).await;
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "partnerAuthorized": authorized,
    }))
}
