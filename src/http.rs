//! HTTP front: `GET /` heartbeat, `GET /keys`, `POST /` or `/search` queries
//! and `POST /reload`.
//!
//! Malformed queries answer 400, collaborator failures 500, and everything
//! else 200, including queries that match nothing.

use std::{
    net::SocketAddr,
    sync::Arc,
    time::Instant,
};

use axum::{
    Json,
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::{
    data_dir::DataDir,
    engine::{self, Engine},
    error::{Error, Result},
    response::Response,
    settings::Overrides,
};

type Reply = (StatusCode, Json<Response>);

/// Where `POST /reload` reads the published index from.
#[derive(Debug, Clone)]
pub struct ReloadSource {
    pub data_dir: DataDir,
    pub overrides: Overrides,
}

#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,
    started: Instant,
    reload: Option<Arc<ReloadSource>>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, reload: Option<ReloadSource>) -> Self {
        Self {
            engine,
            started: Instant::now(),
            reload: reload.map(Arc::new),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(heartbeat).post(search))
        .route("/search", post(search))
        .route("/keys", get(keys))
        .route("/reload", post(reload))
        .with_state(state)
}

fn status_for(error: &Error) -> StatusCode {
    if error.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn failure(error: &Error) -> Reply {
    let status = status_for(error);
    if status.is_server_error() {
        warn!(error = %error, "request failed");
    } else {
        debug!(error = %error, "rejected request");
    }
    (status, Json(Response::failed(error)))
}

async fn heartbeat(State(state): State<AppState>) -> Json<Response> {
    let uptime = state.started.elapsed();
    Json(Response::ok(
        format!("heartbeat, uptime: {:.3}s", uptime.as_secs_f64()),
        Vec::new(),
    ))
}

async fn keys(State(state): State<AppState>) -> Json<Response> {
    Json(Response::keys(state.engine.field_paths()))
}

async fn search(State(state): State<AppState>, body: String) -> Reply {
    let engine = state.engine.clone();
    let outcome =
        tokio::task::spawn_blocking(move || engine.search(&body)).await;

    match outcome {
        Ok(Ok(outcome)) => {
            debug!(count = outcome.count(), "search request");
            (StatusCode::OK, Json(Response::search(outcome)))
        }
        Ok(Err(e)) => failure(&e),
        Err(e) => failure(&Error::collaborator("query worker", e)),
    }
}

async fn reload(State(state): State<AppState>) -> Reply {
    let Some(source) = state.reload.clone() else {
        let error = Error::Config("this server has no on-disk index to reload".into());
        return (StatusCode::CONFLICT, Json(Response::failed(&error)));
    };

    let loaded = tokio::task::spawn_blocking(move || {
        engine::load(&source.data_dir, &source.overrides)
    })
    .await;

    match loaded {
        Ok(Ok(snapshot)) => {
            let prefixes = snapshot.index.len();
            state.engine.publish(snapshot);
            info!(prefixes, "reloaded index");
            (
                StatusCode::OK,
                Json(Response::ok(format!("reloaded, {prefixes} prefixes"), Vec::new())),
            )
        }
        Ok(Err(e)) => failure(&e),
        Err(e) => failure(&Error::collaborator("reload worker", e)),
    }
}

/// Serve until Ctrl+C or SIGTERM.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "cannot listen for SIGTERM"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl+C");
    }
}
