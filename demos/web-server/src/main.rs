//! Demo HTTP front end for the Livy interpreters.
//!
//! Run with: cargo run -p web-server-demo
//!
//! The Livy server is taken from `LIVY_URL` (default http://localhost:8998).
//!
//! ```text
//! curl -XPOST localhost:3000/interpret/spark \
//!      -H 'content-type: application/json' \
//!      -d '{"principal": "alice", "code": "val x = 1\nx + 1"}'
//! ```

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use anyhow::Context as _;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, post},
};
use futures::StreamExt;
use livy_core::{Code, Interpreter, LivyConfig, OutputStore, RequestContext};
use livy_session::{LivyInterpreter, SqlInterpreter};
use livy_transport::SessionKind;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    /// Route name (`spark`, `pyspark`, `sparkr`, `sql`) -> interpreter.
    interpreters: Arc<HashMap<&'static str, Arc<dyn Interpreter>>>,
    /// Session-owning interpreters, for closing a principal's sessions.
    owners: Arc<Vec<Arc<LivyInterpreter>>>,
}

#[derive(Debug, Deserialize)]
struct InterpretRequest {
    principal: String,
    code: String,
    /// Defaults to a fresh UUID; pass one to be able to cancel the request.
    request_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct InterpretResponse {
    request_id: String,
    code: Code,
    message: String,
    stdout: String,
    stderr: String,
}

#[derive(Debug, Serialize)]
struct ClosedResponse {
    principal: String,
    closed: Vec<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = LivyConfig::from_env().context("invalid Livy configuration")?;
    tracing::info!(url = %config.base_url(), "using Livy server");

    let build = |kind| {
        LivyInterpreter::from_config(kind, &config)
            .map(Arc::new)
            .context("failed to build HTTP client")
    };
    let spark = build(SessionKind::Spark)?;
    let pyspark = build(SessionKind::PySpark)?;
    let sparkr = build(SessionKind::SparkR)?;
    let sql = Arc::new(SqlInterpreter::new(Arc::clone(&spark), &config));

    let mut interpreters: HashMap<&'static str, Arc<dyn Interpreter>> = HashMap::new();
    interpreters.insert("spark", Arc::clone(&spark) as Arc<dyn Interpreter>);
    interpreters.insert("pyspark", Arc::clone(&pyspark) as Arc<dyn Interpreter>);
    interpreters.insert("sparkr", Arc::clone(&sparkr) as Arc<dyn Interpreter>);
    interpreters.insert("sql", sql);

    let state = AppState {
        interpreters: Arc::new(interpreters),
        owners: Arc::new(vec![spark, pyspark, sparkr]),
    };

    let app = Router::new()
        .route("/interpret/{kind}", post(interpret_handler))
        .route("/cancel/{request_id}", post(cancel_handler))
        .route("/sessions/{principal}", delete(close_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    for owner in state.owners.iter() {
        owner.close().await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("shutting down, closing sessions");
}

async fn interpret_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(req): Json<InterpretRequest>,
) -> Response {
    let Some(interpreter) = state.interpreters.get(kind.as_str()) else {
        return (StatusCode::NOT_FOUND, format!("unknown interpreter: {kind}")).into_response();
    };

    let request_id = req
        .request_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let ctx = RequestContext::new(req.principal, request_id.clone());
    let out = OutputStore::new();

    let mut events = out.events();
    let log_id = request_id.clone();
    tokio::spawn(async move {
        while let Some(msg) = events.next().await {
            tracing::debug!(request_id = %log_id, ?msg, "output");
        }
    });

    let result = interpreter.interpret(&req.code, &ctx, &out).await;

    Json(InterpretResponse {
        request_id,
        code: result.code,
        message: result.message,
        stdout: out.stdout_text(),
        stderr: out.stderr_text(),
    })
    .into_response()
}

async fn cancel_handler(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> StatusCode {
    // Request ids are not namespaced per interpreter, so ask all of them.
    for interpreter in state.owners.iter() {
        interpreter.cancel(&request_id).await;
    }
    StatusCode::ACCEPTED
}

async fn close_handler(
    State(state): State<AppState>,
    Path(principal): Path<String>,
) -> Response {
    let mut closed = Vec::new();
    for owner in state.owners.iter() {
        match owner.sessions().close_session(&principal).await {
            Ok(Some(id)) => closed.push(id),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(principal, "Failed to close session: {e}");
                return (StatusCode::BAD_GATEWAY, e.to_string()).into_response();
            }
        }
    }
    Json(ClosedResponse { principal, closed }).into_response()
}
