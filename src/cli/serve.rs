use anyhow::Result;
use console::style;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use super::{ServeArgs, open_engine};
use crate::core::config::Settings;
use crate::core::lifecycle::LifecycleManager;
use crate::core::terminal::{self, GuideSection};
use crate::interfaces::web::ApiServer;
use crate::logging::init_logging;

pub async fn run_serve(mut settings: Settings, args: ServeArgs) -> Result<()> {
    if let Some(host) = args.api_host {
        settings.api_host = host;
    }
    if let Some(port) = args.api_port {
        settings.api_port = port;
    }

    let log_tx = init_logging(&settings, false);
    let engine = open_engine(&settings).await?;
    let settings = Arc::new(settings);

    let mut lifecycle = LifecycleManager::new().await?;
    let interval = Duration::from_secs(settings.heartbeat_interval_secs.max(1));
    engine
        .heartbeat
        .clone()
        .schedule(&lifecycle.scheduler, interval)
        .await?;

    let api = ApiServer::new(engine.clone(), settings.clone(), log_tx);
    lifecycle.attach(Arc::new(Mutex::new(api)));
    lifecycle.start().await?;

    // First sweep right away rather than one interval after boot.
    engine.heartbeat.run_once().await;

    terminal::print_banner();
    GuideSection::new("missionops serve")
        .status(
            "API",
            &format!(
                "{}",
                style(format!("http://{}:{}/api/ops", settings.api_host, settings.api_port))
                    .underlined()
                    .cyan()
            ),
        )
        .status("Store", &settings.db_path().display().to_string())
        .status("Heartbeat", &format!("every {}s", interval.as_secs()))
        .status(
            "Auth",
            if settings.api_key.is_some() {
                "API key required"
            } else {
                "open (loopback only)"
            },
        )
        .blank()
        .status(
            "Press Ctrl+C to stop.",
            &format!("{}", style("Ctrl+C").bold().yellow()),
        )
        .print();
    println!();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    lifecycle.shutdown().await?;
    Ok(())
}
