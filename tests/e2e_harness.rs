#![allow(dead_code)]

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;

pub type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Model name the mock completion server always fails for.
pub const BROKEN_MODEL: &str = "broken-model";

/// A `missionops serve` child process on a free port and a private data dir.
pub struct ServerHarness {
    child: Child,
    pub api_port: u16,
    pub api_base: String,
    completion_url: String,
    data_dir: TempDir,
    trace_log: Arc<Mutex<Vec<String>>>,
}

impl ServerHarness {
    pub async fn spawn(completion_url: &str) -> TestResult<Self> {
        let api_port = find_free_port()?;
        let data_dir = tempfile::Builder::new()
            .prefix("missionops-e2e")
            .tempdir()?;
        let log_file = std::fs::File::create(data_dir.path().join("serve.log"))?;
        let log_file_err = log_file.try_clone()?;

        let child = Command::new(binary_path())
            .arg("serve")
            .env("MISSIONOPS_DATA_DIR", data_dir.path())
            .env("MC_PORT", api_port.to_string())
            .env("OLLAMA_URL", completion_url)
            .env_remove("MC_API_KEY")
            .env_remove("MC_BIND_ALL")
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_file_err))
            .spawn()?;

        let mut harness = Self {
            child,
            api_port,
            api_base: format!("http://127.0.0.1:{}", api_port),
            completion_url: completion_url.to_string(),
            data_dir,
            trace_log: Arc::new(Mutex::new(Vec::new())),
        };

        harness.wait_until_ready().await?;
        Ok(harness)
    }

    pub fn data_dir(&self) -> &Path {
        self.data_dir.path()
    }

    async fn wait_until_ready(&mut self) -> TestResult<()> {
        for _ in 0..80 {
            if let Some(status) = self.child.try_wait()? {
                return Err(format!("missionops serve exited early with status: {}", status).into());
            }

            let res = reqwest::Client::new()
                .get(format!("{}/api/ops/health", self.api_base))
                .timeout(Duration::from_millis(700))
                .send()
                .await;

            if let Ok(resp) = res
                && resp.status().is_success()
            {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        Err("Timed out waiting for missionops API readiness".into())
    }

    /// Run a one-shot CLI command against the same data directory.
    pub fn cli(&self, args: &[&str], extra_env: &[(&str, &str)]) -> TestResult<Output> {
        let mut cmd = Command::new(binary_path());
        cmd.args(args)
            .env("MISSIONOPS_DATA_DIR", self.data_dir.path())
            .env("OLLAMA_URL", &self.completion_url);
        for (k, v) in extra_env {
            cmd.env(k, v);
        }
        Ok(cmd.output()?)
    }

    /// `missionops worker --kind <kind> --once`.
    pub fn run_worker_once(&self, kind: &str, extra_env: &[(&str, &str)]) -> TestResult<()> {
        let worker_id = format!("{}-e2e", kind);
        let out = self.cli(
            &["worker", "--kind", kind, "--id", &worker_id, "--once"],
            extra_env,
        )?;
        if !out.status.success() {
            return Err(format!(
                "worker {} failed: {}",
                kind,
                String::from_utf8_lossy(&out.stderr)
            )
            .into());
        }
        Ok(())
    }

    /// Returns `(status, body)`; non-JSON bodies come back as `{raw}`.
    pub async fn request_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> TestResult<(u16, Value)> {
        let url = format!("{}{}", self.api_base, path);
        let client = reqwest::Client::new();
        let mut req = client
            .request(method.clone(), &url)
            .timeout(Duration::from_secs(30));
        if let Some(payload) = body.clone() {
            req = req.json(&payload);
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        let parsed = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| json!({ "raw": text }));

        let mut traces = self.trace_log.lock().unwrap_or_else(|e| e.into_inner());
        traces.push(format!(
            "REQUEST {} {}\nBODY {}\nSTATUS {}\nRESPONSE {}",
            method,
            path,
            body.unwrap_or(Value::Null),
            status,
            parsed
        ));
        drop(traces);

        Ok((status, parsed))
    }

    pub async fn get(&self, path: &str) -> TestResult<(u16, Value)> {
        self.request_json(reqwest::Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> TestResult<(u16, Value)> {
        self.request_json(reqwest::Method::POST, path, body).await
    }

    pub fn persist_trace_file(&self, name: &str) -> TestResult<PathBuf> {
        let path = self.data_dir.path().join(format!("{}.trace.log", name));
        let lines = self.trace_log.lock().unwrap_or_else(|e| e.into_inner());
        std::fs::write(&path, lines.join("\n\n---\n\n"))?;
        Ok(path)
    }
}

impl Drop for ServerHarness {
    fn drop(&mut self) {
        let _ = self.persist_trace_file("serve");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[derive(Clone)]
struct MockServerState {
    prompts: Arc<Mutex<Vec<(String, String)>>>,
}

/// Ollama-compatible `/api/generate` that echoes the model it was asked for.
pub struct MockCompletionServer {
    pub port: u16,
    prompts: Arc<Mutex<Vec<(String, String)>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
}

async fn mock_generate(
    State(state): State<MockServerState>,
    Json(payload): Json<GenerateRequest>,
) -> (StatusCode, Json<Value>) {
    state
        .prompts
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push((payload.model.clone(), payload.prompt.clone()));

    if payload.model == BROKEN_MODEL {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "model not loaded" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({ "response": format!("  done by {}  ", payload.model), "done": true })),
    )
}

impl MockCompletionServer {
    pub async fn start() -> TestResult<Self> {
        let port = find_free_port()?;
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let state = MockServerState {
            prompts: Arc::clone(&prompts),
        };
        let app = Router::new()
            .route("/api/generate", post(mock_generate))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Ok(Self {
            port,
            prompts,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}/api/generate", self.port)
    }

    /// `(model, prompt)` pairs in arrival order.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

pub fn find_free_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Sandboxes without socket permissions skip rather than fail.
pub fn bind_not_permitted(err: &(dyn std::error::Error + Send + Sync)) -> bool {
    err.to_string().contains("Operation not permitted")
}

fn binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_missionops"))
}
