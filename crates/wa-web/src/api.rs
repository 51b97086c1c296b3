//! Web shell routes and handlers
//!
//! One page with a single text field, and the JSON endpoint it posts to.

use axum::{
    Router,
    extract::State,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use wa_core::Dispatcher;

use crate::error::Result;

/// State shared across handlers
#[derive(Clone)]
pub struct WebState {
    pub dispatcher: Arc<Dispatcher>,
}

impl WebState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

/// Body of `POST /api/ask`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub input: String,
    /// Memory session to read from and append to
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Reply to `POST /api/ask`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub output: String,
    /// Tool invocations made while answering
    pub steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Create the web shell router
pub fn create_router(state: WebState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/ask", post(ask))
        .route("/health", get(health_check))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    Html(INDEX_HTML)
}

/// Run one turn through the dispatcher
async fn ask(State(state): State<WebState>, Json(request): Json<AskRequest>) -> Result<Json<AskResponse>> {
    let session_id = request.session_id.filter(|id| !id.trim().is_empty());
    info!(session = ?session_id, "Question received");

    let turn = state
        .dispatcher
        .run(&request.input, session_id.as_deref())
        .await?;

    let steps = turn.step_count();
    Ok(Json(AskResponse {
        output: turn.answer,
        steps,
        session_id,
    }))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "wa-web"
    }))
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Warehouse Demo</title>
    <style>
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #f5f5f5;
            color: #333;
            line-height: 1.6;
        }
        .container { max-width: 800px; margin: 0 auto; padding: 20px; }
        header {
            background: #2c3e50;
            color: white;
            padding: 20px;
            margin-bottom: 20px;
        }
        header h1 { font-size: 24px; }
        #query {
            width: 100%;
            padding: 12px;
            font-size: 16px;
            border: 1px solid #ccc;
            border-radius: 4px;
        }
        #output {
            background: white;
            border-radius: 8px;
            padding: 20px;
            margin-top: 20px;
            min-height: 80px;
            white-space: pre-wrap;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
        }
        .loading { opacity: 0.5; }
    </style>
</head>
<body>
    <header>
        <h1>Warehouse Demo</h1>
    </header>
    <div class="container">
        <form id="ask-form">
            <input id="query" type="text" placeholder="Type your query here" autocomplete="off">
        </form>
        <div id="output"></div>
    </div>
    <script>
        const sessionId = crypto.randomUUID();
        const form = document.getElementById('ask-form');
        const query = document.getElementById('query');
        const output = document.getElementById('output');

        form.addEventListener('submit', async (event) => {
            event.preventDefault();
            output.classList.add('loading');
            try {
                const res = await fetch('/api/ask', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ input: query.value, session_id: sessionId })
                });
                const body = await res.json();
                output.textContent = res.ok ? body.output : ('Error: ' + body.error);
            } catch (e) {
                output.textContent = 'Error: ' + e;
            } finally {
                output.classList.remove('loading');
            }
        });
    </script>
</body>
</html>
"#;
