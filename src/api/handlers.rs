use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::models::{ChatRequest, ChatResponse, HealthResponse};
use crate::app_state::AppState;
use crate::llm::inference::DecodeControl;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.model_name.clone(),
    })
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;
    tracing::info!("Chat request: {:?}", request);

    let control = state.decode_control();
    // Stops the blocking decode if the client goes away mid-request.
    let _cancel = CancelOnDrop(control.clone());

    let worker = Arc::clone(&state);
    let response = tokio::task::spawn_blocking(move || worker.answer(&request.question, &control))
        .await??;

    tracing::info!("Response: {}", response);

    Ok(Json(ChatResponse { response }))
}

struct CancelOnDrop(DecodeControl);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
