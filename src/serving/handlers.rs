//! Request handlers

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::AppState;
use crate::error::{ModelOpsError, Result};
use crate::schema::Table;

/// Columns keyed by name, e.g. `{"input": ["hello"]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub input_data: Map<String, Value>,
}

/// Prediction outcome; failures are reported in `error` with quality 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// One record per input row
    pub inference: Vec<Value>,
    /// 1 on success, 0 on failure
    pub quality: u8,
    pub error: Option<String>,
}

impl PredictionResponse {
    pub fn success(inference: Vec<Value>) -> Self {
        Self {
            inference,
            quality: 1,
            error: None,
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Self {
            inference: Vec::new(),
            quality: 0,
            error: Some(error.to_string()),
        }
    }
}

/// Parse and run one prediction request
pub fn predict_request(state: &AppState, body: &[u8]) -> Result<Vec<Value>> {
    let request: PredictionRequest = serde_json::from_slice(body)
        .map_err(|e| ModelOpsError::ValidationError(format!("Invalid prediction request: {}", e)))?;
    let table = Table::from_json_columns(&request.input_data)?;
    let outputs = state.adapter.predict(&table)?;
    Ok(outputs.table().to_records().into_iter().map(Value::Object).collect())
}

pub async fn predict(State(state): State<Arc<AppState>>, body: Bytes) -> Json<PredictionResponse> {
    let worker_state = Arc::clone(&state);
    let result = tokio::task::spawn_blocking(move || predict_request(&worker_state, &body)).await;

    let response = match result {
        Ok(Ok(inference)) => {
            info!(rows = inference.len(), "Served prediction");
            PredictionResponse::success(inference)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Prediction request failed");
            PredictionResponse::failure(e)
        }
        Err(e) => {
            warn!(error = %e, "Prediction task failed");
            PredictionResponse::failure(format!("Prediction task failed: {}", e))
        }
    };
    Json(response)
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "model_uri": state.model_uri,
        "kind": state.adapter.metadata().kind,
    }))
}

pub async fn handle_404() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": true, "message": "Not found"})),
    )
}
