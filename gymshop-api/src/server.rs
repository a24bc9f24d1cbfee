use std::sync::Arc;

use axum::http::Method;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::handlers::{addresses, auth, orders, products, users, variants};
use crate::observability;
use crate::state::AppState;

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "gymshop-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Prometheus metrics snapshot
async fn metrics() -> impl IntoResponse {
    observability::render().unwrap_or_default()
}

/// Create the HTTP server with all routes under /api
pub fn create_server(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let api = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/users", get(users::list))
        .route("/users/me", get(users::me).delete(users::delete_me))
        .route("/products", get(products::list).post(products::create))
        .route(
            "/products/:id",
            get(products::get)
                .put(products::update)
                .delete(products::remove),
        )
        .route("/products/:id/variants", get(variants::list_for_product))
        .route("/variants", post(variants::create))
        .route(
            "/variants/:id",
            get(variants::get)
                .put(variants::update)
                .delete(variants::remove),
        )
        .route("/addresses", get(addresses::list).post(addresses::create))
        .route(
            "/addresses/:id",
            put(addresses::update).delete(addresses::remove),
        )
        .route("/orders", post(orders::create))
        .route("/orders/:id", get(orders::get))
        .route("/orders/:id/status", put(orders::update_status))
        .route("/orders/user/:user_id", get(orders::list_for_user));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .nest("/api", api)
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    let app = create_server(state);
    let addr = format!("0.0.0.0:{}", port);

    println!("🚀 HTTP server running on http://{}", addr);
    println!("💚 Health check: http://{}/health", addr);
    println!("🛒 REST API:     http://{}/api", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
