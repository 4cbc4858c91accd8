use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{core::service::ExecutionService, store::SnippetStore};

pub mod run;
pub mod snippets;
pub mod ws;

#[derive(Clone, Debug)]
pub struct AppState {
    pub service: Arc<ExecutionService>,
    pub store: Arc<dyn SnippetStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route(
            "/execute",
            get(ws::execute_handler).post(run::run_handler),
        )
        .route("/save", post(snippets::save_handler))
        .route("/share/{id}", get(snippets::share_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "Welcome to the backend!"
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{core::traits::isolation::MockIsolationRunner, store::memory::InMemorySnippetStore};

    pub fn test_state() -> AppState {
        AppState {
            service: Arc::new(ExecutionService::new(
                Arc::new(MockIsolationRunner::new()),
                Duration::from_secs(1),
            )),
            store: Arc::new(InMemorySnippetStore::new()),
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = router(test_state())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Welcome to the backend!");
    }

    #[tokio::test]
    async fn test_execute_requires_websocket_upgrade() {
        let response = router(test_state())
            .oneshot(Request::builder().uri("/execute").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
