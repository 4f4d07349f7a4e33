use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;

pub mod config;
pub mod error;
pub mod flow;
pub mod handlers;
pub mod state;
pub mod stream;

pub use config::ServerConfig;
pub use error::{ApiError, ApiErrorKind};
pub use state::AppState;

/// Method and path of every route, for the startup banner.
pub const ENDPOINTS: [(&str, &str); 5] = [
    ("GET", "/health"),
    ("POST", "/list-xlsx"),
    ("POST", "/download-xlsx"),
    ("POST", "/test-json"),
    ("POST", "/test-path"),
];

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(handlers::health).fallback(handlers::method_not_allowed),
        )
        .route(
            "/list-xlsx",
            post(handlers::list_xlsx).fallback(handlers::method_not_allowed),
        )
        .route(
            "/download-xlsx",
            post(handlers::download_xlsx).fallback(handlers::method_not_allowed),
        )
        .route(
            "/test-json",
            post(handlers::test_json).fallback(handlers::method_not_allowed),
        )
        .route(
            "/test-path",
            post(handlers::test_path).fallback(handlers::method_not_allowed),
        )
        .fallback(handlers::route_not_found)
        .with_state(state)
}

/// Serve until `shutdown` resolves. In-flight downloads finish first.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
