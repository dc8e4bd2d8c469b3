//! HTTP composition.
//!
//! One fallback handler dispatches every request: paths under the module
//! proxy prefix go to [`ModuleProxy`], everything else is offered to
//! [`GitProxy`], and whatever neither claims is a 404.

use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::gitproxy::{BasicAuthenticator, GitProxy, TracingEventLog};
use crate::index::CodeIndex;
use crate::module::ModuleProxy;

#[derive(Clone)]
pub struct AppState {
    pub index: Arc<CodeIndex>,
    pub git: Arc<GitProxy>,
    pub modules: Arc<ModuleProxy>,
    /// always starts and ends with `/`
    pub module_prefix: String,
}

impl AppState {
    /// Index the repository store and wire up both proxies.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let index = CodeIndex::open(&config.repositories.dir, &config.repositories.domain).with_context(|| {
            format!("Failed to index repositories in {}", config.repositories.dir.display())
        })?;
        let index = Arc::new(index);

        let git = GitProxy::new(
            Arc::clone(&index),
            Arc::new(BasicAuthenticator::new(config.users.clone())),
            Arc::new(TracingEventLog),
        )
        .with_binaries(&config.git.upload_pack, &config.git.receive_pack)
        .with_max_buffered_output(config.git.max_buffered_output);
        let git = match config.git.max_request_bytes {
            Some(max) => git.with_max_request_bytes(max),
            None => git,
        };

        Ok(Self::new(index, git, &config.module_proxy.prefix))
    }

    pub fn new(index: Arc<CodeIndex>, git: GitProxy, module_prefix: &str) -> Self {
        Self {
            modules: Arc::new(ModuleProxy::new(Arc::clone(&index))),
            git: Arc::new(git),
            index,
            module_prefix: module_prefix.to_string(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    if let Some(rest) = path.strip_prefix(&state.module_prefix) {
        let method = request.method().clone();
        return Arc::clone(&state.modules).serve(&method, rest).await;
    }

    match state.git.serve(request).await {
        Some(response) => response,
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}

/// Serve until Ctrl-C or SIGTERM.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let bind_address = config.server.bind_address.clone();
    let state = tokio::task::spawn_blocking(move || AppState::from_config(&config)).await??;
    info!(dirs = state.index.len(), "serving {}", state.index.domain());

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!("listening on {}", bind_address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
