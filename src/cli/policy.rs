use anyhow::{Context, Result, bail};
use console::style;

use super::open_engine;
use crate::core::config::Settings;
use crate::core::terminal::{GuideSection, print_success, print_warn};
use crate::logging::init_logging;

pub async fn run_policy_command(settings: Settings, rest: &[String]) -> Result<()> {
    init_logging(&settings, true);
    let engine = open_engine(&settings).await?;
    let sub = rest.first().map(String::as_str).unwrap_or("list");

    match sub {
        "list" => {
            let mut section = GuideSection::new("Policy");
            for row in engine.store.list_policy().await? {
                section = section.status(&row.key, &row.value.to_string());
            }
            section.print();
            println!();
        }
        "set" => {
            let (Some(key), Some(raw)) = (rest.get(1), rest.get(2)) else {
                bail!("Usage: missionops policy set <key> <json>");
            };
            let value: serde_json::Value = serde_json::from_str(raw)
                .with_context(|| format!("policy value for '{}' is not valid JSON", key))?;
            engine.store.set_policy(key, &value).await?;
            print_success(&format!("{} = {}", key, value));
        }
        "unset" => {
            let Some(key) = rest.get(1) else {
                bail!("Usage: missionops policy unset <key>");
            };
            if engine.store.delete_policy(key).await? {
                print_success(&format!("Removed policy '{}'", key));
            } else {
                print_warn(&format!("No policy named '{}'", key));
            }
        }
        other => bail!("Unknown policy command '{}'. Expected: list, set, unset", other),
    }
    Ok(())
}

pub async fn run_agent_model_command(settings: Settings, rest: &[String]) -> Result<()> {
    init_logging(&settings, true);
    let engine = open_engine(&settings).await?;

    match rest.first().map(String::as_str) {
        Some("set") => {
            let (Some(agent), Some(model)) = (rest.get(1), rest.get(2)) else {
                bail!("Usage: missionops agent-model set <agent> <model>");
            };
            engine.store.set_agent_model(agent, model).await?;
            print_success(&format!("{} now runs on {}", agent, model));
        }
        Some("clear") => {
            let Some(agent) = rest.get(1) else {
                bail!("Usage: missionops agent-model clear <agent>");
            };
            if engine.store.clear_agent_model(agent).await? {
                print_success(&format!("Cleared model override for {}", agent));
            } else {
                print_warn(&format!("{} has no stored override", agent));
            }
        }
        _ => bail!("Usage: missionops agent-model set <agent> <model> | clear <agent>"),
    }
    Ok(())
}

pub async fn run_routing(settings: Settings) -> Result<()> {
    init_logging(&settings, true);
    let engine = open_engine(&settings).await?;
    let table = engine.router.routing_table().await;

    let mut section = GuideSection::new("Model routing")
        .status("Default", &table.default)
        .status("Fallback", &table.fallback)
        .blank();
    for (agent, entry) in &table.overrides {
        section = section.text(&format!(
            "{:<14} {} {}",
            agent,
            entry.model,
            style(format!("({})", entry.source)).dim()
        ));
    }
    section.print();
    println!();
    Ok(())
}
