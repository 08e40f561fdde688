//! Global settings endpoints

use axum::{extract::State, routing::get, Json, Router};

use chat_core::chat::GlobalSettings;

use super::{internal, ApiError};
use crate::state::AppState;

/// GET /api/settings
async fn get_settings(State(state): State<AppState>) -> Result<Json<GlobalSettings>, ApiError> {
    state
        .chat_store()
        .global_settings()
        .await
        .map(Json)
        .map_err(|e| internal(e, "Could not load settings"))
}

/// PUT /api/settings - Replace the global settings; a blank prompt clears it
async fn update_settings(
    State(state): State<AppState>,
    Json(mut settings): Json<GlobalSettings>,
) -> Result<Json<GlobalSettings>, ApiError> {
    settings.prompt = settings
        .prompt
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    state
        .chat_store()
        .update_global_settings(settings)
        .await
        .map(Json)
        .map_err(|e| internal(e, "Could not save settings"))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/settings", get(get_settings).put(update_settings))
}

#[cfg(test)]
mod tests {
    use agent_runner::testing::ScriptedModel;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use chat_core::chat::ChatRepository;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::test_support::TestApp;

    fn put(body: &str) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri("/api/settings")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let app = TestApp::new(ScriptedModel::new()).await;

        let response = app
            .router()
            .oneshot(put(r#"{"prompt":"  Answer in French.  "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .router()
            .oneshot(Request::builder().uri("/api/settings").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["prompt"], "Answer in French.");
    }

    #[tokio::test]
    async fn blank_prompt_clears_setting() {
        let app = TestApp::new(ScriptedModel::new()).await;
        app.router().oneshot(put(r#"{"prompt":"x"}"#)).await.unwrap();

        let response = app.router().oneshot(put(r#"{"prompt":"   "}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let settings = app.chats.global_settings().await.unwrap();
        assert!(settings.prompt.is_none());
    }
}
