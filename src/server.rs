//! REST server exposing the tool registry over HTTP.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call any registered tool by name |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `invalid_input` (400), `not_found` (404),
//! `tool_error` (500).
//!
//! Note that `search_and_retrieve` answers unusable input with a 200 and
//! the structured error document unless strict input is configured.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use evidence_harness_core::RetrievalError;

use crate::config::Config;
use crate::pipeline::RetrievalContext;
use crate::traits::{ToolContext, ToolRegistry};

#[derive(Clone)]
struct AppState {
    tools: Arc<ToolRegistry>,
    ctx: ToolContext,
}

/// Build the router. Exposed separately from [`run_server`] so tests can
/// serve it on an ephemeral port.
pub fn router(tools: Arc<ToolRegistry>, retrieval: Arc<RetrievalContext>) -> Router {
    let state = AppState {
        tools,
        ctx: ToolContext::new(retrieval),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serve the built-in tools on `[server].bind` until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let retrieval = Arc::new(RetrievalContext::from_config(config).await?);
    let tools = Arc::new(ToolRegistry::with_builtins());
    let app = router(tools, retrieval);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "HTTP server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

/// Map a tool failure to a status code by its [`RetrievalError`] variant.
/// Untyped failures are reported as `tool_error`.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let message = format!("{}: {:#}", tool_name, err);
    let Some(typed) = err.downcast_ref::<RetrievalError>() else {
        return AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "tool_error",
            message,
        };
    };
    let status = match typed {
        RetrievalError::InvalidInput(_) | RetrievalError::CacheDisabled => StatusCode::BAD_REQUEST,
        RetrievalError::SearchUnavailable(_) | RetrievalError::FetchFailure(_) => StatusCode::BAD_GATEWAY,
        RetrievalError::ExtractionFailure(_)
        | RetrievalError::CacheWrite(_)
        | RetrievalError::CacheRead(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    AppError {
        status,
        code: typed.code(),
        message,
    }
}

/// Reject calls missing a field the schema lists as required.
fn check_required(schema: &Value, params: &Value) -> Result<(), AppError> {
    let Some(required) = schema.get("required").and_then(Value::as_array) else {
        return Ok(());
    };
    for field in required.iter().filter_map(Value::as_str) {
        if params.get(field).is_none_or(Value::is_null) {
            return Err(bad_request(format!("missing required parameter: {}", field)));
        }
    }
    Ok(())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    builtin: bool,
    parameters: Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            builtin: t.is_builtin(),
            parameters: t.parameters_schema(),
        })
        .collect();
    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

/// Dispatch to the named tool. A bare JSON string body is treated as
/// `{"prompt": <string>}`.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let params = match params {
        Value::String(prompt) => serde_json::json!({ "prompt": prompt }),
        other => other,
    };
    check_required(&tool.parameters_schema(), &params)?;

    let result = tool
        .execute(params, &state.ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(serde_json::json!({ "result": result })))
}
