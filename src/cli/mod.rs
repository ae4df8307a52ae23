mod heartbeat;
mod policy;
mod proposals;
mod serve;
mod status;
mod worker;

use anyhow::Result;
use console::style;
use std::path::PathBuf;

use crate::core::config::Settings;
use crate::core::ops::OpsEngine;
use crate::core::ops::policy_gate::seed_default_policy;
use crate::core::store::OpsStore;
use crate::core::terminal::{self, GuideSection, print_error};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Processes")
        .command("serve", "Run the API server with the heartbeat scheduler")
        .command("worker", "Claim and execute steps of one kind")
        .command("heartbeat", "Run the stale-step sweep standalone")
        .print();

    GuideSection::new("Proposals")
        .command("propose", "Submit a proposal through the admission gates")
        .command("approve", "Approve a pending proposal and expand its mission")
        .command("reject", "Reject a pending proposal")
        .print();

    GuideSection::new("Configuration")
        .command("policy", "List, set or unset policy values")
        .command("agent-model", "Set or clear an agent's model override")
        .command("routing", "Show the resolved model routing table")
        .command("status", "Check the store and count work by status")
        .print();

    GuideSection::new("Examples")
        .hint("missionops worker --kind analyze", "")
        .hint(
            "missionops propose --agent ops --kind deploy --title \"Deploy v4\"",
            "",
        )
        .hint("missionops policy set daily_proposal_cap '{\"max\": 20}'", "")
        .print();

    println!(
        "\n {} {} <command> [args] [--config <path>]\n",
        style("Usage:").bold(),
        style("missionops").green()
    );
}

/// Value following `flag`, if present anywhere after `start`.
fn flag_value(args: &[String], start: usize, flags: &[&str]) -> Option<String> {
    let mut i = start;
    while i < args.len() {
        if flags.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], start: usize, flags: &[&str]) -> bool {
    args.iter()
        .skip(start)
        .any(|a| flags.contains(&a.as_str()))
}

/// Positional arguments after `start`, skipping flags and their values.
fn positionals(args: &[String], start: usize, valued_flags: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = start;
    while i < args.len() {
        let arg = args[i].as_str();
        if valued_flags.contains(&arg) {
            i += 2;
        } else if arg.starts_with("--") {
            i += 1;
        } else {
            out.push(args[i].clone());
            i += 1;
        }
    }
    out
}

pub(crate) fn parse_config_flag(args: &[String]) -> Option<PathBuf> {
    flag_value(args, 1, &["--config", "-c"]).map(PathBuf::from)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServeArgs {
    pub api_host: Option<String>,
    pub api_port: Option<u16>,
}

pub(crate) fn parse_serve_args(args: &[String], start: usize) -> ServeArgs {
    ServeArgs {
        api_host: flag_value(args, start, &["--api-host"]),
        api_port: flag_value(args, start, &["--api-port", "--port"]).and_then(|p| p.parse().ok()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WorkerArgs {
    pub kind: String,
    pub worker_id: Option<String>,
    pub once: bool,
}

pub(crate) fn parse_worker_args(args: &[String], start: usize) -> WorkerArgs {
    WorkerArgs {
        kind: flag_value(args, start, &["--kind", "-k"]).unwrap_or_default(),
        worker_id: flag_value(args, start, &["--id"]),
        once: has_flag(args, start, &["--once"]),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProposeArgs {
    pub agent: String,
    pub kind: String,
    pub title: String,
    pub body: Option<String>,
}

pub(crate) fn parse_propose_args(args: &[String], start: usize) -> ProposeArgs {
    ProposeArgs {
        agent: flag_value(args, start, &["--agent", "-a"]).unwrap_or_default(),
        kind: flag_value(args, start, &["--kind", "-k"]).unwrap_or_default(),
        title: flag_value(args, start, &["--title", "-t"]).unwrap_or_default(),
        body: flag_value(args, start, &["--body", "-b"]),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RejectArgs {
    pub id: Option<String>,
    pub reason: Option<String>,
}

pub(crate) fn parse_reject_args(args: &[String], start: usize) -> RejectArgs {
    RejectArgs {
        id: positionals(args, start, &["--reason", "-r", "--config", "-c"])
            .into_iter()
            .next(),
        reason: flag_value(args, start, &["--reason", "-r"]),
    }
}

/// Open the configured store, seed missing policy defaults and wire the engine.
pub(crate) async fn open_engine(settings: &Settings) -> Result<OpsEngine> {
    let store = OpsStore::open(settings.db_path()).await?;
    seed_default_policy(&store).await?;
    Ok(OpsEngine::new(store, settings))
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    let cmd = args[1].as_str();
    if matches!(cmd, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let settings = Settings::load(parse_config_flag(&args).as_deref())?;
    // Positional arguments for subcommands, with the global flag stripped.
    let rest = positionals(&args, 2, &["--config", "-c"]);

    match cmd {
        "serve" => serve::run_serve(settings, parse_serve_args(&args, 2)).await,
        "worker" => {
            let parsed = parse_worker_args(&args, 2);
            if parsed.kind.is_empty() {
                print_error("Error: --kind is required for worker.");
                return Ok(());
            }
            worker::run_worker(settings, parsed).await
        }
        "heartbeat" => heartbeat::run_heartbeat(settings, has_flag(&args, 2, &["--once"])).await,
        "propose" => {
            let parsed = parse_propose_args(&args, 2);
            proposals::run_propose(settings, parsed).await
        }
        "approve" => match rest.first() {
            Some(id) => proposals::run_approve(settings, id).await,
            None => {
                print_error("Usage: missionops approve <proposal_id>");
                Ok(())
            }
        },
        "reject" => {
            let parsed = parse_reject_args(&args, 2);
            match parsed.id {
                Some(id) => proposals::run_reject(settings, &id, parsed.reason.as_deref()).await,
                None => {
                    print_error("Usage: missionops reject <proposal_id> [--reason <text>]");
                    Ok(())
                }
            }
        }
        "policy" => policy::run_policy_command(settings, &rest).await,
        "agent-model" => policy::run_agent_model_command(settings, &rest).await,
        "routing" => policy::run_routing(settings).await,
        "status" => status::run_status(settings).await,
        _ => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_worker_args_reads_kind_id_and_once() {
        let args = argv(&["missionops", "worker", "--kind", "analyze", "--id", "w1", "--once"]);
        assert_eq!(
            parse_worker_args(&args, 2),
            WorkerArgs {
                kind: "analyze".to_string(),
                worker_id: Some("w1".to_string()),
                once: true,
            }
        );

        let bare = parse_worker_args(&argv(&["missionops", "worker", "--kind"]), 2);
        assert!(bare.kind.is_empty());
        assert!(!bare.once);
    }

    #[test]
    fn parse_propose_args_reads_all_fields() {
        let args = argv(&[
            "missionops",
            "propose",
            "--agent",
            "ops",
            "--kind",
            "deploy",
            "--title",
            "Deploy v4",
            "--body",
            "ship it",
        ]);
        let parsed = parse_propose_args(&args, 2);
        assert_eq!(parsed.agent, "ops");
        assert_eq!(parsed.kind, "deploy");
        assert_eq!(parsed.title, "Deploy v4");
        assert_eq!(parsed.body.as_deref(), Some("ship it"));
    }

    #[test]
    fn parse_reject_args_separates_id_and_reason() {
        let args = argv(&["missionops", "reject", "--reason", "dup", "abc-123"]);
        let parsed = parse_reject_args(&args, 2);
        assert_eq!(parsed.id.as_deref(), Some("abc-123"));
        assert_eq!(parsed.reason.as_deref(), Some("dup"));

        let no_id = parse_reject_args(&argv(&["missionops", "reject"]), 2);
        assert_eq!(no_id, RejectArgs { id: None, reason: None });
    }

    #[test]
    fn parse_serve_args_ignores_bad_port() {
        let args = argv(&["missionops", "serve", "--api-host", "0.0.0.0", "--api-port", "x"]);
        let parsed = parse_serve_args(&args, 2);
        assert_eq!(parsed.api_host.as_deref(), Some("0.0.0.0"));
        assert_eq!(parsed.api_port, None);
        assert_eq!(
            parse_serve_args(&argv(&["missionops", "serve", "--port", "9100"]), 2).api_port,
            Some(9100)
        );
    }

    #[test]
    fn config_flag_is_global_and_stripped_from_positionals() {
        let args = argv(&["missionops", "approve", "--config", "/tmp/m.toml", "p-1"]);
        assert_eq!(parse_config_flag(&args), Some(PathBuf::from("/tmp/m.toml")));
        assert_eq!(positionals(&args, 2, &["--config", "-c"]), vec!["p-1"]);
    }

    #[test]
    fn positionals_keep_policy_json_intact() {
        let args = argv(&["missionops", "policy", "set", "content_cap", "{\"max_per_day\": 3}"]);
        assert_eq!(
            positionals(&args, 2, &["--config", "-c"]),
            vec!["set", "content_cap", "{\"max_per_day\": 3}"]
        );
    }
}
