//! Registry HTTP endpoints.

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use vigil_core::{LinearScanMatcher, Matcher};

use crate::error::ApiError;
use crate::store::{IdentityStore, UserSummary};

/// Shared handler state.
pub struct AppState {
    pub store: IdentityStore,
    /// Euclidean acceptance radius for `/recognize`.
    pub accept_distance: f32,
}

/// Build the registry router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/register", post(register_handler))
        .route("/recognize", post(recognize_handler))
        .route("/users", get(list_users_handler))
        .route("/users/delete/{id}", get(delete_user_handler))
        .route("/test", get(liveness_handler))
        .layer(DefaultBodyLimit::disable())
        // Embedding payloads are small; 10M bounds accidental uploads.
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    name: Option<String>,
    embedding: Option<Vec<f32>>,
}

#[derive(Deserialize)]
pub struct RecognizeRequest {
    embedding: Option<Vec<f32>>,
}

#[derive(Serialize)]
pub struct RecognizeResponse {
    allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    distance: Option<f32>,
}

/// `POST /register` — append a new identity record.
async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<Value>, ApiError> {
    let name = req.name.unwrap_or_default();
    let embedding = req.embedding.unwrap_or_default();
    if name.trim().is_empty() || embedding.is_empty() {
        return Err(ApiError::InvalidInput);
    }

    let id = state.store.register(&name, &embedding).await?;
    tracing::info!(id, name = %name, dims = embedding.len(), "identity registered");

    Ok(Json(json!({ "status": "registered" })))
}

/// `POST /recognize` — nearest-neighbor scan over all stored records.
async fn recognize_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecognizeRequest>,
) -> Result<Json<RecognizeResponse>, ApiError> {
    let embedding = req.embedding.unwrap_or_default();
    if embedding.is_empty() {
        return Err(ApiError::InvalidInput);
    }

    let records = state.store.all().await?;
    let decision = LinearScanMatcher.nearest(&embedding, &records, state.accept_distance)?;

    if decision.allowed {
        tracing::info!(
            name = decision.name.as_deref().unwrap_or(""),
            distance = decision.distance,
            "identity recognized"
        );
        Ok(Json(RecognizeResponse {
            allowed: true,
            name: decision.name,
            distance: Some(decision.distance),
        }))
    } else {
        tracing::info!(distance = decision.distance, "no identity within acceptance radius");
        Ok(Json(RecognizeResponse { allowed: false, name: None, distance: None }))
    }
}

/// `GET /users` — enumerate `{id, name}` pairs, embeddings excluded.
async fn list_users_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

/// `GET /users/delete/{id}` — remove one record.
async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if state.store.delete(id).await? {
        tracing::info!(id, "identity deleted");
        Ok(Json(json!({ "status": "deleted" })))
    } else {
        Err(ApiError::UserNotFound)
    }
}

/// `GET /test` — liveness probe.
async fn liveness_handler() -> Json<Value> {
    Json(json!({ "test": "Hello" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let store = IdentityStore::open_in_memory().await.unwrap();
        router(Arc::new(AppState {
            store,
            accept_distance: vigil_core::ACCEPT_DISTANCE,
        }))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(res: axum::response::Response) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_register_list_delete_round_trip() {
        let app = test_app().await;

        let res = app
            .clone()
            .oneshot(post_json("/register", json!({ "name": "alice", "embedding": [0.0, 0.0] })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await, json!({ "status": "registered" }));

        let res = app.clone().oneshot(get_req("/users")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let users = body_json(res).await;
        assert_eq!(users[0]["name"], "alice");
        let id = users[0]["id"].as_i64().unwrap();

        let res = app
            .clone()
            .oneshot(get_req(&format!("/users/delete/{id}")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await, json!({ "status": "deleted" }));

        let res = app
            .clone()
            .oneshot(get_req(&format!("/users/delete/{id}")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(res).await, json!({ "error": "User not found" }));
    }

    #[tokio::test]
    async fn test_register_rejects_missing_fields() {
        let app = test_app().await;

        let res = app
            .clone()
            .oneshot(post_json("/register", json!({ "name": "alice" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await, json!({ "error": "Invalid input" }));

        let res = app
            .clone()
            .oneshot(post_json("/register", json!({ "embedding": [1.0] })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app
            .clone()
            .oneshot(post_json("/register", json!({ "name": "", "embedding": [1.0] })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_recognize_empty_registry_rejects() {
        let app = test_app().await;
        let res = app
            .oneshot(post_json("/recognize", json!({ "embedding": [1.0, 2.0] })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await, json!({ "allowed": false }));
    }

    #[tokio::test]
    async fn test_recognize_nearest_of_two() {
        let app = test_app().await;
        app.clone()
            .oneshot(post_json("/register", json!({ "name": "first", "embedding": [0.0, 0.0] })))
            .await
            .unwrap();
        app.clone()
            .oneshot(post_json("/register", json!({ "name": "second", "embedding": [1.0, 1.0] })))
            .await
            .unwrap();

        let res = app
            .oneshot(post_json("/recognize", json!({ "embedding": [0.0, 0.0] })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["allowed"], json!(true));
        assert_eq!(body["name"], json!("first"));
        assert_eq!(body["distance"], json!(0.0));
    }

    #[tokio::test]
    async fn test_recognize_outside_radius_is_not_allowed() {
        let app = test_app().await;
        app.clone()
            .oneshot(post_json("/register", json!({ "name": "far", "embedding": [10.0, 10.0] })))
            .await
            .unwrap();

        let res = app
            .oneshot(post_json("/recognize", json!({ "embedding": [0.0, 0.0] })))
            .await
            .unwrap();
        let body = body_json(res).await;
        assert_eq!(body["allowed"], json!(false));
        assert!(body.get("name").is_none());
    }

    #[tokio::test]
    async fn test_recognize_dimension_mismatch_is_rejected() {
        let app = test_app().await;
        app.clone()
            .oneshot(post_json("/register", json!({ "name": "a", "embedding": [1.0, 2.0, 3.0] })))
            .await
            .unwrap();

        let res = app
            .oneshot(post_json("/recognize", json!({ "embedding": [1.0] })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_liveness() {
        let app = test_app().await;
        let res = app.oneshot(get_req("/test")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await, json!({ "test": "Hello" }));
    }
}
