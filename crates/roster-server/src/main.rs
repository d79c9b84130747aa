//! Roster Server
//!
//! HTTP service managing users, groups and the memberships linking them.
//!
//! Uses SQLite (embedded) by default; an in-memory store is available for
//! throwaway runs.

mod config;
mod error;
mod extractors;
mod handlers;
mod storage;

use anyhow::{Context, Result};
use axum::{
    routing::{delete, get, post},
    Router,
};
use clap::Parser;
use roster_core::Repository;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
}

#[tokio::main]
async fn main() {
    // Set up panic hook to log crashes
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()));
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("[PANIC] at {:?}: {}", location, payload);
        tracing::error!("PANIC at {:?}: {}", location, payload);
    }));

    let config = Config::parse();

    // Initialize tracing
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|e| {
        eprintln!("Invalid log filter '{}': {}, using info", config.log_level, e);
        EnvFilter::new("info")
    });
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("[FATAL] Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!("Starting Roster Server v{}", env!("CARGO_PKG_VERSION"));
    info!("PID: {}", std::process::id());

    if let Err(e) = run_server(config).await {
        error!("Server failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_server(config: Config) -> Result<()> {
    info!(
        "Config loaded: bind={}, storage={:?}, db={}",
        config.bind_address,
        config.storage,
        config.database_path().display()
    );

    info!("Initializing storage...");
    let repo = storage::open(&config)
        .await
        .context("Failed to initialize storage")?;

    let app = build_router(AppState { repo });

    info!("Server listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .context("Failed to bind to address")?;

    info!("Server ready to accept connections");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(api_routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users",
            get(handlers::users::list).post(handlers::users::create),
        )
        .route(
            "/users/",
            get(handlers::users::list).post(handlers::users::create),
        )
        .route(
            "/users/:id",
            get(handlers::users::get)
                .put(handlers::users::update)
                .delete(handlers::users::delete),
        )
        .route(
            "/groups",
            get(handlers::groups::list).post(handlers::groups::create),
        )
        .route(
            "/groups/",
            get(handlers::groups::list).post(handlers::groups::create),
        )
        .route(
            "/groups/:id",
            get(handlers::groups::get)
                .put(handlers::groups::update)
                .delete(handlers::groups::delete),
        )
        .route(
            "/groups/:group_id/add_user/:user_id",
            post(handlers::groups::add_user),
        )
        .route(
            "/groups/:group_id/remove_user/:user_id",
            delete(handlers::groups::remove_user),
        )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use crate::storage::{Database, MemoryStore};
    use tower::ServiceExt;

    async fn sqlite_app() -> Router {
        let db = Database::in_memory().await.unwrap();
        build_router(AppState { repo: Arc::new(db) })
    }

    fn memory_app() -> Router {
        build_router(AppState {
            repo: Arc::new(MemoryStore::new()),
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = sqlite_app().await;
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_membership_round_trip() {
        let app = sqlite_app().await;

        let (status, user) = send(&app, "POST", "/users/", Some(json!({"username": "alice"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user, json!({"id": 1, "username": "alice", "number": null}));

        let (status, group) = send(&app, "POST", "/groups/", Some(json!({"name": "eng"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(group, json!({"id": 1, "name": "eng", "users": []}));

        let (status, group) = send(&app, "POST", "/groups/1/add_user/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            group,
            json!({
                "id": 1,
                "name": "eng",
                "users": [{"id": 1, "username": "alice", "number": null}]
            })
        );

        let (_, detail) = send(&app, "GET", "/users/1", None).await;
        assert_eq!(
            detail,
            json!({
                "id": 1,
                "username": "alice",
                "number": null,
                "groups": [{"id": 1, "name": "eng"}]
            })
        );

        let (status, group) = send(&app, "DELETE", "/groups/1/remove_user/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(group, json!({"id": 1, "name": "eng", "users": []}));
    }

    #[tokio::test]
    async fn test_not_found_details() {
        let app = memory_app();

        let (status, body) = send(&app, "GET", "/users/5", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "User not found"}));

        let (status, body) = send(&app, "DELETE", "/groups/5", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "Group not found"}));

        let (status, body) = send(
            &app,
            "POST",
            "/users/",
            Some(json!({"username": "alice", "group_ids": [4]})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "Group with id 4 not found"}));

        let (status, body) = send(
            &app,
            "POST",
            "/groups/",
            Some(json!({"name": "eng", "user_ids": [9]})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "User with id 9 not found"}));

        // strict creation: nothing was written by the failed requests
        let (_, users) = send(&app, "GET", "/users/", None).await;
        assert_eq!(users, json!([]));
        let (_, groups) = send(&app, "GET", "/groups/", None).await;
        assert_eq!(groups, json!([]));
    }

    #[tokio::test]
    async fn test_membership_not_found_checks_group_first() {
        let app = sqlite_app().await;
        send(&app, "POST", "/users", Some(json!({"username": "alice"}))).await;
        send(&app, "POST", "/groups", Some(json!({"name": "eng"}))).await;

        let (status, body) = send(&app, "POST", "/groups/2/add_user/2", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "Group not found"}));

        let (status, body) = send(&app, "DELETE", "/groups/1/remove_user/2", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "User not found"}));
    }

    #[tokio::test]
    async fn test_duplicate_username_is_conflict() {
        let app = sqlite_app().await;

        let (status, _) = send(&app, "POST", "/users/", Some(json!({"username": "alice", "number": 1}))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "POST", "/users/", Some(json!({"username": "alice"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, json!({"detail": "Username already registered"}));

        let (status, body) = send(&app, "POST", "/users/", Some(json!({"username": "bob", "number": 1}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, json!({"detail": "Number already registered"}));
    }

    #[tokio::test]
    async fn test_update_replaces_number() {
        let app = sqlite_app().await;
        send(&app, "POST", "/users/", Some(json!({"username": "alice", "number": 7}))).await;

        let (status, body) = send(&app, "PUT", "/users/1", Some(json!({"username": "x"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"id": 1, "username": "x", "number": null, "groups": []})
        );

        let (status, _) = send(&app, "PUT", "/users/2", Some(json!({"username": "y"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "PUT", "/users/1", Some(json!({"number": 3}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_delete_returns_snapshots() {
        let app = memory_app();
        send(&app, "POST", "/users/", Some(json!({"username": "alice", "number": 3}))).await;
        send(&app, "POST", "/groups/", Some(json!({"name": "eng", "user_ids": [1]}))).await;

        let (status, group) = send(&app, "DELETE", "/groups/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            group,
            json!({
                "id": 1,
                "name": "eng",
                "users": [{"id": 1, "username": "alice", "number": 3}]
            })
        );

        let (status, user) = send(&app, "DELETE", "/users/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user, json!({"id": 1, "username": "alice", "number": 3}));

        let (status, _) = send(&app, "GET", "/users/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_user_cascades_to_groups() {
        let app = sqlite_app().await;
        send(&app, "POST", "/users/", Some(json!({"username": "alice"}))).await;
        send(&app, "POST", "/users/", Some(json!({"username": "bob"}))).await;
        send(&app, "POST", "/groups/", Some(json!({"name": "eng", "user_ids": [1, 2]}))).await;

        send(&app, "DELETE", "/users/1", None).await;

        let (_, group) = send(&app, "GET", "/groups/1", None).await;
        assert_eq!(
            group,
            json!({
                "id": 1,
                "name": "eng",
                "users": [{"id": 2, "username": "bob", "number": null}]
            })
        );
    }

    #[tokio::test]
    async fn test_bulk_group_update() {
        let app = memory_app();
        send(&app, "POST", "/users/", Some(json!({"username": "alice"}))).await;
        send(&app, "POST", "/users/", Some(json!({"username": "bob"}))).await;
        send(&app, "POST", "/groups/", Some(json!({"name": "eng", "user_ids": [1]}))).await;

        let (status, group) = send(
            &app,
            "PUT",
            "/groups/1",
            Some(json!({"add_users": [2], "remove_users": [1]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            group,
            json!({
                "id": 1,
                "name": "eng",
                "users": [{"id": 2, "username": "bob", "number": null}]
            })
        );
    }

    #[tokio::test]
    async fn test_listing_pagination() {
        let app = sqlite_app().await;
        for name in ["a", "b", "c", "d"] {
            send(&app, "POST", "/users", Some(json!({"username": name}))).await;
        }

        let (status, users) = send(&app, "GET", "/users/?skip=1&limit=2", None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<_> = users
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["username"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["b", "c"]);

        let (_, users) = send(&app, "GET", "/users?skip=50", None).await;
        assert_eq!(users, json!([]));

        let (status, _) = send(&app, "GET", "/users/?limit=-1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rejections_use_detail_body() {
        let app = memory_app();

        let (status, body) = send(&app, "PUT", "/users/1", Some(json!({"number": 3}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("username"));

        let (status, body) = send(&app, "GET", "/users/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());

        let (status, body) = send(&app, "GET", "/groups/?skip=-1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());

        let request = Request::builder()
            .method("POST")
            .uri("/users/")
            .header("content-type", "application/json")
            .body(Body::from("{\"username\": "))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["detail"].is_string());
    }
}
