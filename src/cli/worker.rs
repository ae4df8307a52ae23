use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{WorkerArgs, open_engine};
use crate::core::config::Settings;
use crate::core::llm::ollama::OllamaCompleter;
use crate::core::ops::worker::WorkerConfig;
use crate::core::terminal::{print_info, print_success};
use crate::logging::init_logging;

pub async fn run_worker(settings: Settings, args: WorkerArgs) -> Result<()> {
    init_logging(&settings, false);
    let engine = open_engine(&settings).await?;

    let worker_id = args
        .worker_id
        .or_else(|| settings.worker_id.clone())
        .unwrap_or_else(|| WorkerConfig::default_worker_id(&args.kind));
    let config = WorkerConfig {
        kind: args.kind,
        worker_id,
        poll_interval: Duration::from_secs(settings.worker_poll_secs.max(1)),
        capability_timeout: Duration::from_secs(settings.capability_timeout_secs),
    };
    let completer = Arc::new(OllamaCompleter::new(settings.completion_url.clone()));
    let worker = engine.worker(completer, config);

    if args.once {
        if worker.run_once().await? {
            print_success(&format!("{} processed one step.", worker.id()));
        } else {
            print_info("No queued steps of this kind.");
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; stopping after the current step");
            on_signal.cancel();
        }
    });

    worker.run(cancel).await;
    Ok(())
}
