use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::address_space::node::{AttributeId, ReadValueId};
use crate::address_space::node_id::NodeId;
use crate::address_space::references::BrowseDirection;
use crate::address_space::status::StatusCode as UaStatus;
use crate::address_space::variant::Variant;
use crate::events::event::Event;
use crate::server::context::ServerContext;
use crate::server::services::{
    BrowseDescription, CallMethodRequest, Dispatcher, ServiceRequest, ServiceResponse, WriteValue,
};
use crate::subscriptions::subscription::SessionId;

/// State shared by the HTTP handlers. The API acts as one long-lived client session.
#[derive(Clone)]
pub struct SharedAppState {
    pub server: Arc<ServerContext>,
    pub dispatcher: Dispatcher,
    pub session: SessionId,
    pub start_time: tokio::time::Instant,
}

impl SharedAppState {
    pub fn new(server: Arc<ServerContext>) -> Self {
        let session = server.create_session();
        SharedAppState {
            dispatcher: Dispatcher::new(Arc::clone(&server)),
            server,
            session,
            start_time: tokio::time::Instant::now(),
        }
    }
}

#[derive(Deserialize)]
pub struct BrowseQuery {
    #[serde(default = "default_node_id")]
    node_id: String,
    #[serde(default)]
    direction: BrowseDirection,
}

fn default_node_id() -> String {
    "i=85".to_string() // Objects folder
}

#[derive(Deserialize)]
pub struct ReadQuery {
    node_id: String,
    #[serde(default = "default_attribute")]
    attribute: AttributeId,
}

fn default_attribute() -> AttributeId {
    AttributeId::Value
}

#[derive(Deserialize, Serialize)]
pub struct WriteRequest {
    pub node_id: NodeId,
    pub value: Variant,
}

#[derive(Deserialize, Serialize)]
pub struct CallRequest {
    pub object_id: NodeId,
    pub method_id: NodeId,
    #[serde(default)]
    pub arguments: Vec<Variant>,
}

#[derive(Deserialize, Serialize)]
pub struct EventRequest {
    pub message: String,
    #[serde(default = "default_severity")]
    pub severity: u16,
}

fn default_severity() -> u16 {
    500
}

pub fn create_api_routes() -> Router<SharedAppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/stats", get(stats))
        .route("/api/browse", get(browse))
        .route("/api/read", get(read))
        .route("/api/write", put(write))
        .route("/api/call", post(call))
        .route("/api/events", post(trigger_event))
}

/// HTTP status for an OPC UA status code.
fn http_status(status: UaStatus) -> StatusCode {
    match status {
        s if s.is_good() => StatusCode::OK,
        UaStatus::BAD_NODE_ID_UNKNOWN | UaStatus::BAD_METHOD_INVALID => StatusCode::NOT_FOUND,
        UaStatus::BAD_NOT_WRITABLE | UaStatus::BAD_NOT_READABLE | UaStatus::BAD_USER_ACCESS_DENIED => {
            StatusCode::FORBIDDEN
        }
        UaStatus::BAD_TYPE_MISMATCH
        | UaStatus::BAD_INVALID_ARGUMENT
        | UaStatus::BAD_ATTRIBUTE_ID_INVALID => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(status: UaStatus, message: String) -> (StatusCode, Json<serde_json::Value>) {
    (
        http_status(status),
        Json(json!({ "status": status.name(), "error": message })),
    )
}

fn parse_node_id(raw: &str) -> Result<NodeId, (StatusCode, Json<serde_json::Value>)> {
    raw.parse::<NodeId>().map_err(|e| {
        warn!("Rejected node id '{}': {}", raw, e);
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "BadNodeIdInvalid", "error": e.to_string() })),
        )
    })
}

fn unexpected(response: ServiceResponse) -> (StatusCode, Json<serde_json::Value>) {
    let status = response.fault().unwrap_or(UaStatus::BAD_INTERNAL_ERROR);
    error!("Unexpected service response: {:?}", response);
    failure(status, "service request failed".to_string())
}

async fn health() -> &'static str {
    "UA Server Running"
}

async fn stats(State(state): State<SharedAppState>) -> impl IntoResponse {
    let server = &state.server;
    Json(json!({
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "node_count": server.store.node_count(),
        "subscription_count": server.subscriptions.subscription_count(),
        "session_count": server.session_count(),
        "namespaces": server.namespaces(),
    }))
}

async fn browse(
    State(state): State<SharedAppState>,
    Query(params): Query<BrowseQuery>,
) -> impl IntoResponse {
    let node_id = match parse_node_id(&params.node_id) {
        Ok(id) => id,
        Err(rejection) => return rejection,
    };
    info!("Browsing {} ({:?})", node_id, params.direction);
    let description = BrowseDescription {
        direction: params.direction,
        ..BrowseDescription::forward(node_id.clone())
    };
    let response = state
        .dispatcher
        .handle(state.session, ServiceRequest::Browse(vec![description]))
        .await;
    match response {
        ServiceResponse::Browse(mut results) if results.len() == 1 => {
            let result = results.remove(0);
            if result.status.is_bad() {
                return failure(result.status, format!("cannot browse {}", node_id));
            }
            (
                StatusCode::OK,
                Json(json!({ "node_id": node_id, "references": result.references })),
            )
        }
        other => unexpected(other),
    }
}

async fn read(
    State(state): State<SharedAppState>,
    Query(params): Query<ReadQuery>,
) -> impl IntoResponse {
    let node_id = match parse_node_id(&params.node_id) {
        Ok(id) => id,
        Err(rejection) => return rejection,
    };
    let request = ServiceRequest::Read(vec![ReadValueId {
        node_id: node_id.clone(),
        attribute_id: params.attribute,
    }]);
    match state.dispatcher.handle(state.session, request).await {
        ServiceResponse::Read(mut values) if values.len() == 1 => {
            let value = values.remove(0);
            if value.status.is_bad() {
                return failure(value.status, format!("cannot read {:?} of {}", params.attribute, node_id));
            }
            (StatusCode::OK, Json(json!(value)))
        }
        other => unexpected(other),
    }
}

async fn write(
    State(state): State<SharedAppState>,
    Json(body): Json<WriteRequest>,
) -> impl IntoResponse {
    info!("Write to {}: {:?}", body.node_id, body.value);
    let request = ServiceRequest::Write(vec![WriteValue::value(body.node_id.clone(), body.value)]);
    match state.dispatcher.handle(state.session, request).await {
        ServiceResponse::Write(statuses) => match statuses.first() {
            Some(status) if status.is_good() => (StatusCode::OK, Json(json!({ "status": "Good" }))),
            Some(status) => failure(*status, format!("write to {} rejected", body.node_id)),
            None => failure(UaStatus::BAD_INTERNAL_ERROR, "empty write response".to_string()),
        },
        other => unexpected(other),
    }
}

async fn call(
    State(state): State<SharedAppState>,
    Json(body): Json<CallRequest>,
) -> impl IntoResponse {
    info!("Call {} on {}", body.method_id, body.object_id);
    let request = ServiceRequest::Call(vec![CallMethodRequest {
        object_id: body.object_id,
        method_id: body.method_id.clone(),
        input_arguments: body.arguments,
    }]);
    match state.dispatcher.handle(state.session, request).await {
        ServiceResponse::Call(mut results) if results.len() == 1 => {
            let result = results.remove(0);
            if result.status.is_bad() {
                return failure(result.status, format!("call of {} failed", body.method_id));
            }
            (
                StatusCode::OK,
                Json(json!({ "status": "Good", "output_arguments": result.output_arguments })),
            )
        }
        other => unexpected(other),
    }
}

async fn trigger_event(
    State(state): State<SharedAppState>,
    Json(body): Json<EventRequest>,
) -> impl IntoResponse {
    let event = Event::base(body.message, body.severity);
    let severity = event.severity;
    let delivered = state.server.events.trigger(event);
    info!("Triggered event with severity {} ({} deliveries)", severity, delivered);
    (
        StatusCode::OK,
        Json(json!({ "severity": severity, "delivered": delivered })),
    )
}
