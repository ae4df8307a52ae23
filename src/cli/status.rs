use anyhow::Result;
use console::style;

use super::open_engine;
use crate::core::config::Settings;
use crate::core::terminal::{GuideSection, print_error};
use crate::logging::init_logging;

fn summarize(counts: &[(String, i64)]) -> String {
    if counts.is_empty() {
        return style("none").dim().to_string();
    }
    counts
        .iter()
        .map(|(status, n)| format!("{} {}", n, status))
        .collect::<Vec<_>>()
        .join(", ")
}

pub async fn run_status(settings: Settings) -> Result<()> {
    init_logging(&settings, true);
    let engine = open_engine(&settings).await?;

    if !engine.store.ping().await {
        print_error(&format!("Store at {} is unavailable", settings.db_path().display()));
        return Ok(());
    }

    GuideSection::new("missionops status")
        .status("Store", &format!("{} {}", style("OK").green().bold(), settings.db_path().display()))
        .status("Proposals", &summarize(&engine.store.count_proposals_by_status().await?))
        .status("Missions", &summarize(&engine.store.count_missions_by_status().await?))
        .status("Steps", &summarize(&engine.store.count_steps_by_status().await?))
        .print();
    println!();
    Ok(())
}
