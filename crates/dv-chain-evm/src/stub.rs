//! Scripted JSON-RPC node served on loopback for adapter tests.

use axum::{Json, Router, extract::State, routing::post};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Handler = Box<dyn Fn(&Value) -> Result<Value, Value> + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct StubNode {
    handlers: Arc<Mutex<HashMap<String, Handler>>>,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl StubNode {
    /// Answers `method` with whatever `handler` returns for the request params.
    /// `Err` values are sent as the JSON-RPC `error` object.
    pub(crate) fn on<F>(&self, method: &str, handler: F)
    where
        F: Fn(&Value) -> Result<Value, Value> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap()
            .insert(method.to_owned(), Box::new(handler));
    }

    pub(crate) fn respond(&self, method: &str, result: Value) {
        self.on(method, move |_| Ok(result.clone()));
    }

    pub(crate) fn fail(&self, method: &str, code: i64, message: &str) {
        let error = json!({ "code": code, "message": message });
        self.on(method, move |_| Err(error.clone()));
    }

    /// Params of every request for `method`, oldest first.
    pub(crate) fn calls(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(called, _)| called == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    /// Serves the node on an ephemeral port and returns its URL.
    pub(crate) async fn serve(&self) -> anyhow::Result<String> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);
        let app = Router::new().route("/", post(dispatch)).with_state(self.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(url)
    }
}

async fn dispatch(State(node): State<StubNode>, Json(request): Json<Value>) -> Json<Value> {
    let method = request["method"].as_str().unwrap_or_default().to_owned();
    let params = request["params"].clone();
    node.calls.lock().unwrap().push((method.clone(), params.clone()));

    let outcome = match node.handlers.lock().unwrap().get(&method) {
        Some(handler) => handler(&params),
        None => Err(json!({ "code": -32601, "message": format!("Method {method} not found") })),
    };

    let id = request["id"].clone();
    Json(match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(error) => json!({ "jsonrpc": "2.0", "id": id, "error": error }),
    })
}
