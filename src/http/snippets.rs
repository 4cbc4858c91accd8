use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};

use crate::{
    core::domain::ExecRequest,
    http::AppState,
    store::{Snippet, SnippetId},
};

#[tracing::instrument(skip_all)]
pub async fn save_handler(
    State(state): State<AppState>,
    Json(request): Json<ExecRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if request.language.trim().is_empty() || request.code.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "language and code are required" })),
        ));
    }

    let id = state.store.save(&request.language, &request.code);
    tracing::info!(id = %id.0, "saved snippet");
    Ok(Json(json!({ "id": id })))
}

#[tracing::instrument(skip(state))]
pub async fn share_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Snippet>, (StatusCode, Json<Value>)> {
    state.store.get(&SnippetId(id)).map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Code not found" })),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use tower::ServiceExt;

    use crate::{
        http::{router, tests::test_state},
        store::MockSnippetStore,
    };

    use super::*;

    async fn body_json(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn save_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/save")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_save_then_share() {
        let app = router(test_state());

        let response = app
            .clone()
            .oneshot(save_request(r#"{"language":"python","code":"print('hi')"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/share/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let snippet = body_json(response).await;
        assert_eq!(snippet["language"], "python");
        assert_eq!(snippet["code"], "print('hi')");
    }

    #[tokio::test]
    async fn test_share_unknown_id_is_not_found() {
        let mut store = MockSnippetStore::new();
        store.expect_get().times(1).return_const(None);
        let state = AppState {
            store: Arc::new(store),
            ..test_state()
        };

        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/share/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Code not found");
    }

    #[tokio::test]
    async fn test_save_rejects_empty_code() {
        let mut store = MockSnippetStore::new();
        store.expect_save().times(0);
        let state = AppState {
            store: Arc::new(store),
            ..test_state()
        };

        let response = router(state)
            .oneshot(save_request(r#"{"language":"python","code":"  "}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_save_rejects_malformed_json() {
        let response = router(test_state())
            .oneshot(save_request("{not json"))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
