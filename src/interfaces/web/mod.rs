pub(crate) mod auth;
mod handlers;
pub(crate) mod router;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::config::Settings;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::ops::OpsEngine;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) engine: OpsEngine,
    pub(crate) settings: Arc<Settings>,
    pub(crate) log_tx: tokio::sync::broadcast::Sender<String>,
}

/// The `/api/ops` façade as a lifecycle component of `serve`.
pub struct ApiServer {
    state: AppState,
    cancel: CancellationToken,
}

impl ApiServer {
    pub fn new(
        engine: OpsEngine,
        settings: Arc<Settings>,
        log_tx: tokio::sync::broadcast::Sender<String>,
    ) -> Self {
        Self {
            state: AppState {
                engine,
                settings,
                log_tx,
            },
            cancel: CancellationToken::new(),
        }
    }
}

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(log) => Ok(Event::default().data(log)),
        Err(_) => Ok(Event::default().data("Log stream lagged")),
    });

    Sse::new(stream)
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server initializing...");
        if self.state.settings.api_key.is_none() && !self.state.settings.is_loopback() {
            tracing::warn!(
                "No API key configured on non-loopback bind {}; every request will be refused",
                self.state.settings.api_host
            );
        }
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!(
            "{}:{}",
            self.state.settings.api_host, self.state.settings.api_port
        );
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding API server to {}", addr))?;
        let app = router::build_api_router(self.state.clone());
        let cancel = self.cancel.clone();

        info!("API Server running at http://{addr}");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(cancel.cancelled_owned())
                .await
            {
                tracing::error!("API Server crashed: {}", e);
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server shutting down...");
        self.cancel.cancel();
        Ok(())
    }
}
