//! Integration test: chat model against a mocked OpenAI-compatible endpoint
//! Tests: request shape, auth, error mapping, parallel prediction, stored config binding

use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use modelops::error::ModelOpsError;
use modelops::models::{BackendError, BaselineChatModel, Model, ModelConfig, ModelKind};
use modelops::schema::Inputs;

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}
        ]
    })
}

fn bound_model(server: &MockServer, api_key: &str) -> BaselineChatModel {
    let mut model = BaselineChatModel::default().with_timeout_secs(5);
    model
        .load_context(&ModelConfig::openai("gpt-test", api_key, server.base_url()))
        .unwrap();
    model
}

// ============================================================================
// Prediction
// ============================================================================

#[test]
fn test_predict_posts_prompt_with_bearer_auth() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .header("authorization", "Bearer sk-test")
            .json_body_partial(r#"{"model": "gpt-test", "messages": [{"role": "user", "content": "hello"}]}"#);
        then.status(200).json_body(completion("hi there"));
    });

    let outputs = bound_model(&server, "sk-test")
        .predict(&Inputs::from_texts(["hello"]))
        .unwrap();

    mock.assert();
    assert_eq!(outputs.responses(), vec!["hi there"]);
    let metadata = outputs.records()[0].metadata.clone().unwrap();
    assert!(metadata.terminated);
    assert_eq!(metadata.messages, vec!["hi there"]);
}

#[test]
fn test_predict_sends_configured_temperature() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .json_body_partial(r#"{"temperature": 0.5}"#);
        then.status(200).json_body(completion("ok"));
    });

    bound_model(&server, "")
        .predict(&Inputs::from_texts(["a", "b", "c"]))
        .unwrap();
    mock.assert_hits(3);
}

#[test]
fn test_parallel_predict_keeps_row_order() {
    let server = MockServer::start();
    for word in ["one", "two", "three", "four"] {
        server.mock(move |when, then| {
            when.method(POST).path("/chat/completions").body_contains(word);
            then.status(200).json_body(completion(&word.to_uppercase()));
        });
    }

    let model = bound_model(&server, "").with_parallelism(4);
    let outputs = model
        .predict(&Inputs::from_texts(["one", "two", "three", "four"]))
        .unwrap();
    assert_eq!(outputs.responses(), vec!["ONE", "TWO", "THREE", "FOUR"]);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_error_status_is_reported_with_row() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(500).body("upstream down");
    });

    let err = bound_model(&server, "")
        .predict(&Inputs::from_texts(["hello"]))
        .unwrap_err();
    match err {
        ModelOpsError::Prediction {
            row: 0,
            source: BackendError::Status { code, body },
        } => {
            assert_eq!(code, 500);
            assert_eq!(body, "upstream down");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_slow_backend_times_out_without_partial_outputs() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200)
            .json_body(completion("too late"))
            .delay(Duration::from_secs(3));
    });

    let mut model = BaselineChatModel::default().with_timeout_secs(1);
    model
        .load_context(&ModelConfig::openai("gpt-test", "", server.base_url()))
        .unwrap();

    let result = model.predict(&Inputs::from_texts(["first", "second"]));
    match result {
        Err(ModelOpsError::Prediction {
            row: 0,
            source: BackendError::Timeout(1),
        }) => {}
        other => panic!("expected a timeout on the first row, got {other:?}"),
    }
    // The first failure stops the remaining rows
    mock.assert_hits(1);
}

#[test]
fn test_malformed_body_is_decode_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200).json_body(json!({"choices": []}));
    });

    let err = bound_model(&server, "")
        .predict(&Inputs::from_texts(["hello"]))
        .unwrap_err();
    assert!(matches!(
        err,
        ModelOpsError::Prediction {
            source: BackendError::Decode(_),
            ..
        }
    ));
}

#[test]
fn test_missing_credential_fails_binding() {
    let mut model = BaselineChatModel::default();
    let config = ModelConfig::openai("gpt", "${MODELOPS_IT_ABSENT_KEY}", "http://localhost:1");
    let err = model.load_context(&config).unwrap_err();
    assert!(matches!(err, ModelOpsError::MissingCredential(_)));
    assert!(!model.is_bound());
}

// ============================================================================
// Stored configs
// ============================================================================

#[test]
fn test_deserialized_model_binds_from_stored_config() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200).json_body(completion("stored"));
    });

    let original = bound_model(&server, "");
    let saved = serde_json::to_string(&ModelKind::BaselineChatModel(original)).unwrap();
    assert!(saved.contains(r#""KIND":"BaselineChatModel""#));

    let mut restored: ModelKind = serde_json::from_str(&saved).unwrap();
    assert!(!restored.is_bound());
    assert!(restored.bind_stored_context().unwrap());

    let outputs = restored.predict(&Inputs::from_texts(["x"])).unwrap();
    assert_eq!(outputs.responses(), vec!["stored"]);
}

#[test]
fn test_config_file_binding() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200).json_body(completion("from file"));
    });

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("model_config.json");
    let config = ModelConfig::openai("gpt-test", "", server.base_url());
    std::fs::write(&path, serde_json::to_vec(&config.to_value().unwrap()).unwrap()).unwrap();

    let mut model = BaselineChatModel::default().with_model_config_path(path.display().to_string());
    assert!(model.bind_stored_context().unwrap());
    let outputs = model.predict(&Inputs::from_texts(["x"])).unwrap();
    assert_eq!(outputs.responses(), vec!["from file"]);
}
