use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::broker::types::{BrokerCredentials, BrokerKind, Market, OandaEnvironment};
use crate::config::AppConfig;
use crate::constants::chat::HISTORY_DAYS;
use crate::data::store::{
    BrokerConfigStore, Conversation, ConversationStore, PreferenceStore, Store,
};
use crate::dispatch::{RequestDispatcher, Selection};
use crate::error::{BrokerError, StoreError};
use crate::intent::{Intent, IntentKind, IntentRouter};
use crate::llm::{prompt, ChatTurn, Narrator};
use crate::registry::BrokerRegistry;
use crate::session::SessionManager;

pub const USER_HEADER: &str = "X-User-Id";
pub const SELECTED_BROKER_HEADER: &str = "X-Selected-Broker";

pub struct AppState {
    pub sessions: SessionManager,
    pub store: Arc<dyn Store>,
    pub router: IntentRouter,
    pub dispatcher: RequestDispatcher,
    pub narrator: Arc<dyn Narrator>,
    pub config: AppConfig,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/query", post(query))
        .route(
            "/api/v1/broker/settings",
            get(get_broker_settings).post(save_broker_settings),
        )
        .route("/api/v1/broker/settings/{broker}", delete(delete_broker_settings))
        .route("/api/v1/broker/test", post(test_broker))
        .route("/api/v1/broker/status", get(broker_status))
        .route("/api/v1/broker/current", put(set_current_broker))
        .route("/api/v1/preferences", put(update_preferences))
        .route("/api/v1/account_details", get(account_details))
        .route("/api/v1/conversation_history", get(conversation_history))
        .route("/api/v1/store_conversation", post(store_conversation))
        .route("/api/v1/delete_conversation/{id}", delete(delete_conversation))
        .route("/api/v1/update_conversation/{id}", put(update_conversation))
        .route("/api/v1/logout", post(logout))
        .with_state(state)
}

pub async fn run_server(state: Arc<AppState>) -> std::io::Result<()> {
    let bind_addr = state.config.server.bind_addr.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("API Server listening on {}", bind_addr);
    axum::serve(listener, app).await
}

// ============= Extractors & Errors =============

/// Caller identity. Authentication happens upstream.
pub struct UserId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    Broker(BrokerError),
    Store(StoreError),
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        ApiError::Broker(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

fn broker_error_status(err: &BrokerError) -> StatusCode {
    match err {
        BrokerError::Configuration(_) | BrokerError::Validation(_) => StatusCode::BAD_REQUEST,
        BrokerError::NotConnected { .. }
        | BrokerError::Disconnected { .. }
        | BrokerError::NoBrokerAvailable => StatusCode::SERVICE_UNAVAILABLE,
        BrokerError::Connection { .. } | BrokerError::Decode { .. } => StatusCode::BAD_GATEWAY,
        BrokerError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        BrokerError::RemoteRejection { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        BrokerError::NotFound { .. } => StatusCode::NOT_FOUND,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({"error": format!("missing {} header", USER_HEADER), "kind": "unauthorized"}),
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({"error": msg, "kind": "bad_request"}),
            ),
            ApiError::Broker(err) => (
                broker_error_status(&err),
                json!({"error": err.to_string(), "kind": err.kind(), "broker": err.broker()}),
            ),
            ApiError::Store(StoreError::NotFound { what }) => (
                StatusCode::NOT_FOUND,
                json!({"error": format!("{} not found", what), "kind": "not_found"}),
            ),
            ApiError::Store(err) => {
                error!("Store failure: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": err.to_string(), "kind": "storage_error"}),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

// ============= Helpers =============

fn selected_broker(headers: &HeaderMap) -> Result<Option<BrokerKind>, ApiError> {
    match headers.get(SELECTED_BROKER_HEADER).and_then(|v| v.to_str().ok()) {
        Some(v) if !v.trim().is_empty() => v
            .parse::<BrokerKind>()
            .map(Some)
            .map_err(|e| ApiError::BadRequest(e.to_string())),
        _ => Ok(None),
    }
}

async fn narrate_or(
    narrator: &dyn Narrator,
    turns: &[ChatTurn],
    fallback: impl FnOnce() -> String,
) -> String {
    match narrator.narrate(turns).await {
        Ok(text) => text,
        Err(e) => {
            warn!("[NARRATE] Falling back to plain text: {}", e);
            fallback()
        }
    }
}

fn statuses_json(registry: &BrokerRegistry) -> Value {
    let mut map = Map::new();
    for (kind, status) in registry.statuses() {
        map.insert(kind.as_str().to_string(), json!(status));
    }
    Value::Object(map)
}

/// Credentials with the secrets left out.
fn redacted(credentials: &BrokerCredentials) -> Value {
    match credentials {
        BrokerCredentials::Oanda {
            account_id,
            environment,
            ..
        } => json!({
            "broker_type": "oanda",
            "account_id": account_id,
            "environment": match environment {
                OandaEnvironment::Practice => "practice",
                OandaEnvironment::Live => "live",
            },
        }),
        BrokerCredentials::Alpaca { paper, .. } => json!({
            "broker_type": "alpaca",
            "paper": paper,
        }),
    }
}

async fn preferred_market(state: &AppState, user_id: &str) -> Option<Market> {
    match state.store.preferred_market(user_id).await {
        Ok(market) => market,
        Err(e) => {
            warn!("Could not load preferences for {}: {}", user_id, e);
            None
        }
    }
}

// ============= Handlers =============

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

#[derive(Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<ChatTurn>,
    pub broker: Option<BrokerKind>,
}

async fn query(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    headers: HeaderMap,
    Json(req): Json<QueryRequest>,
) -> ApiResult {
    let message = req.message.trim().to_string();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message not provided".into()));
    }
    info!("[query] Processing message from {}: {}", user_id, message);

    let explicit = match req.broker {
        Some(kind) => Some(kind),
        None => selected_broker(&headers)?,
    };
    let preference = preferred_market(&state, &user_id).await;

    let history = if req.conversation_history.is_empty() {
        let since = Utc::now() - Duration::days(HISTORY_DAYS);
        match state.store.conversation_history(&user_id, since).await {
            Ok(past) => prompt::history_turns(&past),
            Err(e) => {
                warn!("Could not load history for {}: {}", user_id, e);
                Vec::new()
            }
        }
    } else {
        req.conversation_history
    };

    let session = state.sessions.session(&user_id).await;
    let narrator = state.narrator.as_ref();

    let (reply, body) = match state.router.route(&message) {
        None => {
            let current = session.lock().await.current();
            let turns = prompt::chat_turns(&message, &history, current.map(|k| k.as_str()));
            let text = narrate_or(narrator, &turns, prompt::fallback_for_chat).await;
            (text, json!({"intent": Value::Null}))
        }
        Some(intent) => {
            let dispatched = {
                let mut registry = session.lock().await;
                let selection = Selection {
                    explicit,
                    preference,
                };
                let result = state
                    .dispatcher
                    .dispatch(&intent, &message, &mut registry, selection)
                    .await;
                (result, registry.available())
            };

            match dispatched {
                (Ok(envelope), _) => {
                    let turns = prompt::envelope_turns(&envelope, &message, &history);
                    let text =
                        narrate_or(narrator, &turns, || prompt::fallback_for_envelope(&envelope))
                            .await;
                    (
                        text,
                        json!({
                            "intent": envelope.intent,
                            "broker_used": envelope.broker_used,
                            "broker_status": envelope.broker_status,
                            "available_brokers": envelope.available_brokers,
                            "data": envelope.outcome,
                        }),
                    )
                }
                (Err(err), available) => {
                    warn!("[query] {} could not be dispatched: {}", intent.kind, err);
                    let turns = prompt::error_turns(&err, &message);
                    let text = narrate_or(narrator, &turns, || prompt::fallback_for_error(&err)).await;
                    (
                        text,
                        json!({
                            "intent": intent.kind,
                            "broker_used": err.broker(),
                            "available_brokers": available,
                            "error": err.report(),
                        }),
                    )
                }
            }
        }
    };

    let mut conversation = Conversation::new(&user_id, &message, &reply);
    conversation.intent = body
        .get("intent")
        .and_then(|v| serde_json::from_value::<IntentKind>(v.clone()).ok());
    conversation.broker_used = body
        .get("broker_used")
        .and_then(|v| serde_json::from_value::<BrokerKind>(v.clone()).ok());
    if let Err(e) = state.store.save_conversation(conversation).await {
        warn!("Could not save conversation for {}: {}", user_id, e);
    }

    let mut body = body;
    if let Value::Object(map) = &mut body {
        map.insert("response".into(), json!(reply));
    }
    Ok(Json(body))
}

async fn get_broker_settings(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> ApiResult {
    let configs = state.store.load_active_configs(&user_id).await?;
    let session = state.sessions.session(&user_id).await;
    let registry = session.lock().await;

    let brokers: Vec<Value> = configs
        .iter()
        .map(|c| {
            let mut v = redacted(c);
            if let Value::Object(map) = &mut v {
                map.insert("status".into(), json!(registry.status(c.kind())));
            }
            v
        })
        .collect();
    Ok(Json(json!({
        "brokers": brokers,
        "preferred_market": preferred_market(&state, &user_id).await,
    })))
}

async fn save_broker_settings(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Json(credentials): Json<BrokerCredentials>,
) -> ApiResult {
    credentials.validate()?;
    let kind = credentials.kind();
    let config_id = state
        .store
        .save_broker_config(&user_id, credentials.clone())
        .await?;

    let session = state.sessions.session(&user_id).await;
    let mut registry = session.lock().await;
    let outcome = registry.add(credentials).await;
    let status = registry.status(kind);
    info!("[settings] {} saved {} (status: {:?})", user_id, kind, status);

    Ok(Json(json!({
        "id": config_id,
        "broker_type": kind,
        "status": status,
        "message": match outcome {
            Ok(()) => format!("{} connected", kind),
            Err(e) => e.to_string(),
        },
    })))
}

async fn delete_broker_settings(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(broker): Path<String>,
) -> ApiResult {
    let kind: BrokerKind = broker.parse().map_err(|e: BrokerError| ApiError::BadRequest(e.to_string()))?;
    let removed = state.store.deactivate_broker_config(&user_id, kind).await?;
    let session = state.sessions.session(&user_id).await;
    session.lock().await.remove(kind);
    Ok(Json(json!({"broker_type": kind, "removed": removed})))
}

async fn test_broker(
    State(state): State<Arc<AppState>>,
    UserId(_user_id): UserId,
    Json(credentials): Json<BrokerCredentials>,
) -> ApiResult {
    let kind = credentials.kind();
    let adapter = state.sessions.connector().connect(credentials)?;
    let connected = adapter.test_connection().await;
    Ok(Json(json!({"broker_type": kind, "connected": connected})))
}

async fn broker_status(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> ApiResult {
    let session = state.sessions.session(&user_id).await;
    let mut registry = session.lock().await;
    registry.probe_all().await;

    Ok(Json(json!({
        "active_brokers": registry.list_active(),
        "available_brokers": registry.available(),
        "broker_status": statuses_json(&registry),
        "current_broker": registry.current(),
        "preferred_market": preferred_market(&state, &user_id).await,
    })))
}

#[derive(Deserialize)]
pub struct CurrentBrokerRequest {
    pub broker: BrokerKind,
}

async fn set_current_broker(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Json(req): Json<CurrentBrokerRequest>,
) -> ApiResult {
    let session = state.sessions.session(&user_id).await;
    session.lock().await.set_current(req.broker)?;
    Ok(Json(json!({"current_broker": req.broker})))
}

#[derive(Deserialize)]
pub struct PreferencesRequest {
    pub preferred_market: String,
}

async fn update_preferences(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Json(req): Json<PreferencesRequest>,
) -> ApiResult {
    let market: Market = req
        .preferred_market
        .parse()
        .map_err(|e: BrokerError| ApiError::BadRequest(e.to_string()))?;
    state.store.set_preferred_market(&user_id, market).await?;
    Ok(Json(json!({"preferred_market": market})))
}

#[derive(Deserialize)]
pub struct AccountQuery {
    pub broker: Option<BrokerKind>,
}

async fn account_details(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    headers: HeaderMap,
    Query(params): Query<AccountQuery>,
) -> ApiResult {
    let explicit = match params.broker {
        Some(kind) => Some(kind),
        None => selected_broker(&headers)?,
    };
    let selection = Selection {
        explicit,
        preference: preferred_market(&state, &user_id).await,
    };

    let session = state.sessions.session(&user_id).await;
    let mut registry = session.lock().await;
    let intent = Intent::new(IntentKind::GetAccountDetails);
    let envelope = state
        .dispatcher
        .dispatch(&intent, "", &mut registry, selection)
        .await?;
    Ok(Json(json!(envelope)))
}

async fn conversation_history(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
) -> ApiResult {
    let since = Utc::now() - Duration::days(HISTORY_DAYS);
    let history = state.store.conversation_history(&user_id, since).await?;
    Ok(Json(json!({"conversations": history})))
}

#[derive(Deserialize)]
pub struct StoreConversationRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub response: String,
    pub intent: Option<IntentKind>,
    pub broker_used: Option<BrokerKind>,
}

async fn store_conversation(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Json(req): Json<StoreConversationRequest>,
) -> ApiResult {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message not provided".into()));
    }
    let mut conversation = Conversation::new(&user_id, message, &req.response);
    conversation.intent = req.intent;
    conversation.broker_used = req.broker_used;
    let id = state.store.save_conversation(conversation).await?;
    info!("[store_conversation] Saved conversation {} for {}", id, user_id);
    Ok(Json(json!({"id": id})))
}

async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(id): Path<String>,
) -> ApiResult {
    state.store.delete_conversation(&user_id, &id).await?;
    Ok(Json(json!({"message": "Conversation deleted successfully"})))
}

#[derive(Deserialize)]
pub struct UpdateConversationRequest {
    pub message: Option<String>,
    pub response: Option<String>,
}

async fn update_conversation(
    State(state): State<Arc<AppState>>,
    UserId(user_id): UserId,
    Path(id): Path<String>,
    Json(req): Json<UpdateConversationRequest>,
) -> ApiResult {
    let updated = state
        .store
        .update_conversation(&user_id, &id, req.message, req.response)
        .await?;
    Ok(Json(json!({"conversation": updated})))
}

async fn logout(State(state): State<Arc<AppState>>, UserId(user_id): UserId) -> ApiResult {
    let ended = state.sessions.end(&user_id).await;
    Ok(Json(json!({"logged_out": ended})))
}
