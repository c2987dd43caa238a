#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use mv_domain::config::Config;
use mv_domain::error::{Error, Result};
use mv_domain::tool::ToolCall;
use mv_gateway::state::AppState;
use mv_providers::{ChatRequest, ChatResponse, ModelClient, Usage};
use mv_store::InMemoryBackend;
use serde_json::Value;
use tower::ServiceExt;

/// Replays canned responses and records every request.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ChatResponse>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ChatResponse>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ModelClient for ScriptedModel {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(req);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Provider {
                provider: "scripted".into(),
                message: "script exhausted".into(),
            })
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-1"
    }
}

pub fn text_reply(text: &str) -> ChatResponse {
    ChatResponse {
        content: text.into(),
        tool_calls: Vec::new(),
        usage: Some(Usage {
            prompt_tokens: 100,
            completion_tokens: 10,
            total_tokens: 110,
        }),
        model: "scripted-1".into(),
        finish_reason: Some("stop".into()),
    }
}

pub fn tool_reply(call_id: &str, input: Value) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        tool_calls: vec![ToolCall {
            call_id: call_id.into(),
            tool_name: "memory".into(),
            arguments: input,
        }],
        usage: None,
        model: "scripted-1".into(),
        finish_reason: Some("tool_calls".into()),
    }
}

pub fn state(model: Option<Arc<dyn ModelClient>>, api_token: Option<&str>) -> AppState {
    mv_gateway::bootstrap::assemble_state(
        Arc::new(Config::default()),
        Arc::new(InMemoryBackend::new()),
        model,
        api_token,
    )
}

/// Send one request through the full router.
pub async fn send(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
    let app = mv_gateway::api::router(state.clone()).with_state(state.clone());
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn state_with_model(model: &Arc<ScriptedModel>) -> AppState {
    let model: Arc<dyn ModelClient> = model.clone();
    state(Some(model), None)
}
