use anyhow::Result;
use console::style;
use std::time::Duration;
use tracing::info;

use super::open_engine;
use crate::core::config::Settings;
use crate::core::lifecycle::LifecycleManager;
use crate::core::ops::heartbeat::ActionResult;
use crate::core::store::types::ActionRunStatus;
use crate::core::terminal::GuideSection;
use crate::logging::init_logging;

fn print_results(results: &[ActionResult]) {
    let mut section = GuideSection::new("Heartbeat");
    for r in results {
        let status = match r.status {
            ActionRunStatus::Ok => style("ok").green().to_string(),
            ActionRunStatus::Error => style("error").red().bold().to_string(),
        };
        let detail = match &r.error {
            Some(e) => format!("{} ({}ms) {}", status, r.duration_ms, e),
            None => format!("{} ({}ms)", status, r.duration_ms),
        };
        section = section.status(&r.action, &detail);
    }
    section.print();
    println!();
}

pub async fn run_heartbeat(settings: Settings, once: bool) -> Result<()> {
    init_logging(&settings, once);
    let engine = open_engine(&settings).await?;

    if once {
        let results = engine.heartbeat.run_once().await;
        print_results(&results);
        return Ok(());
    }

    let mut lifecycle = LifecycleManager::new().await?;
    let interval = Duration::from_secs(settings.heartbeat_interval_secs.max(1));
    engine
        .heartbeat
        .clone()
        .schedule(&lifecycle.scheduler, interval)
        .await?;
    lifecycle.start().await?;
    engine.heartbeat.run_once().await;

    tokio::signal::ctrl_c().await?;
    info!("Heartbeat stopping");
    lifecycle.shutdown().await?;
    Ok(())
}
