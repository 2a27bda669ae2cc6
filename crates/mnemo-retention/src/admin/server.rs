//! Admin server: router construction and serve loop

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::engine::RetentionEngine;
use crate::error::{RetentionError, Result};
use crate::signals::PushedSignals;

/// Shared state for all admin handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<RetentionEngine>,
    /// Signal source the engine reads; `PUT /items/{id}/signals` feeds it
    pub signals: Arc<PushedSignals>,
}

/// Build the admin router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/items", post(handlers::create_item_handler))
        .route(
            "/items/{id}",
            get(handlers::get_item_handler).delete(handlers::delete_item_handler),
        )
        .route("/items/{id}/access", post(handlers::access_handler))
        .route("/items/{id}/signals", put(handlers::signals_handler))
        .route(
            "/items/{id}/protection",
            post(handlers::protect_handler).delete(handlers::unprotect_handler),
        )
        .route(
            "/owners/{owner}/distribution",
            get(handlers::distribution_handler),
        )
        .route("/owners/{owner}/protected", get(handlers::protected_handler))
        .route("/optimize", post(handlers::optimize_handler))
        .route("/optimize/cancel", post(handlers::cancel_handler))
        .route("/optimizer", get(handlers::optimizer_state_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct AdminServer {
    listen_addr: String,
    state: Arc<AppState>,
}

impl AdminServer {
    pub fn new(listen_addr: impl Into<String>, state: Arc<AppState>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            state,
        }
    }

    /// Serve until Ctrl+C or SIGTERM, then stop the engine's scheduler
    pub async fn serve(&self) -> Result<()> {
        let addr: SocketAddr = self
            .listen_addr
            .parse()
            .map_err(|e| RetentionError::Config(format!("Invalid listen address: {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RetentionError::Server(format!("Failed to bind to {addr}: {e}")))?;
        tracing::info!("Admin API listening on {addr}");

        let app = create_router(Arc::clone(&self.state));
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| RetentionError::Server(format!("Server error: {e}")))?;

        self.state.engine.shutdown().await;
        tracing::info!("Admin server shut down gracefully");
        Ok(())
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::storage::memory_store::InMemoryTierStore;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app() -> (Router, Arc<AppState>) {
        let signals = Arc::new(PushedSignals::new());
        let engine = RetentionEngine::with_clock(
            Config::default(),
            signals.clone(),
            Arc::new(InMemoryTierStore::new()),
            Arc::new(ManualClock::starting_now()),
        )
        .unwrap();
        let state = Arc::new(AppState {
            engine: Arc::new(engine),
            signals,
        });
        (create_router(Arc::clone(&state)), state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create(app: &Router, relevance: f64) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/items",
            Some(json!({
                "relevance": relevance,
                "emotional_weight": 0.8,
                "owner_id": "u1",
                "context_id": "conv-1"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["item_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_and_get_item() {
        let (app, _) = app();
        let id = create(&app, 0.95).await;

        let (status, body) = send(&app, "GET", &format!("/items/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tier"], "hot");
        assert_eq!(body["owner_id"], "u1");
        assert_eq!(body["protected"], false);
    }

    #[tokio::test]
    async fn test_unknown_item_is_404_json() {
        let (app, _) = app();
        let uri = format!("/items/{}", Uuid::new_v4());
        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["type"], "item_not_found");
    }

    #[tokio::test]
    async fn test_malformed_id_is_400() {
        let (app, _) = app();
        let (status, body) = send(&app, "GET", "/items/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_input");
    }

    #[tokio::test]
    async fn test_out_of_range_signal_is_clamped() {
        let (app, _) = app();
        let (status, body) = send(
            &app,
            "POST",
            "/items",
            Some(json!({"relevance": 1.5, "emotional_weight": 0.1, "owner_id": "u1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/items/{}", body["item_id"].as_str().unwrap());
        let (_, item) = send(&app, "GET", &uri, None).await;
        assert_eq!(item["relevance"], 1.0);
    }

    #[tokio::test]
    async fn test_access_and_metrics() {
        let (app, _) = app();
        let id = create(&app, 0.5).await;

        let uri = format!("/items/{id}/access");
        let (status, body) =
            send(&app, "POST", &uri, Some(json!({"latency_ms": 4.0, "was_hit": true}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["access_count"], 1);

        let (_, metrics) = send(&app, "GET", "/metrics", None).await;
        assert_eq!(metrics["total_items"], 1);
        assert_eq!(metrics["cache_hit_rate"], 1.0);
    }

    #[tokio::test]
    async fn test_protection_round_trip() {
        let (app, _) = app();
        let id = create(&app, 0.5).await;
        let uri = format!("/items/{id}/protection");

        let (status, body) = send(&app, "POST", &uri, Some(json!({"reason": "birthday"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reason"], "birthday");

        let (_, listed) = send(&app, "GET", "/owners/u1/protected", None).await;
        assert_eq!(listed["items"][0], id.as_str());

        let (_, body) = send(&app, "DELETE", &uri, None).await;
        assert_eq!(body["was_protected"], true);
    }

    #[tokio::test]
    async fn test_pushed_signals_drive_optimization() {
        let (app, state) = app();
        let id = create(&app, 0.95).await;

        let uri = format!("/items/{id}/signals");
        let (status, _) = send(
            &app,
            "PUT",
            &uri,
            Some(json!({"relevance": 0.1, "emotional_weight": 0.0})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, report) = send(&app, "POST", "/optimize", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["status"]["outcome"], "completed");
        assert_eq!(report["demotions"], 1);

        let (_, dist) = send(&app, "GET", "/owners/u1/distribution", None).await;
        assert_eq!(dist, json!({"hot": 0, "warm": 0, "cold": 1}));
        assert_eq!(state.engine.get_metrics().passes_run, 1);
    }

    #[tokio::test]
    async fn test_delete_untracks_item() {
        let (app, state) = app();
        let id = create(&app, 0.95).await;

        let (status, _) = send(&app, "DELETE", &format!("/items/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.engine.get_tier_distribution("u1").values().all(|&n| n == 0));

        let (status, _) = send(&app, "DELETE", &format!("/items/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
