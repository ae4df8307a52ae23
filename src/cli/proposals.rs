use anyhow::{Result, bail};
use console::style;

use super::{ProposeArgs, open_engine};
use crate::core::config::Settings;
use crate::core::store::types::MissionWithSteps;
use crate::core::terminal::{GuideSection, print_info, print_success};
use crate::logging::init_logging;

fn print_mission(mission: &MissionWithSteps) {
    let mut section = GuideSection::new(&format!("Mission {}", mission.mission.id))
        .status("Title", &mission.mission.title)
        .status("Status", mission.mission.status.as_str());
    for (i, step) in mission.steps.iter().enumerate() {
        section = section.text(&format!(
            "{}. [{}] {} {}",
            i + 1,
            style(&step.kind).cyan(),
            step.title,
            style(&step.id).dim()
        ));
    }
    section.print();
    println!();
}

pub async fn run_propose(settings: Settings, args: ProposeArgs) -> Result<()> {
    init_logging(&settings, true);
    if args.agent.is_empty() || args.kind.is_empty() || args.title.is_empty() {
        bail!("Usage: missionops propose --agent <id> --kind <kind> --title <title> [--body <text>]");
    }
    let engine = open_engine(&settings).await?;
    let outcome = engine
        .proposals
        .create_proposal(&args.agent, &args.kind, &args.title, args.body.as_deref())
        .await?;

    print_success(&format!(
        "Proposal {} is {}",
        outcome.proposal.id,
        outcome.proposal.status.as_str()
    ));
    match &outcome.mission {
        Some(mission) => print_mission(mission),
        None => print_info("No mission yet. Approve it with 'missionops approve <id>'."),
    }
    Ok(())
}

pub async fn run_approve(settings: Settings, id: &str) -> Result<()> {
    init_logging(&settings, true);
    let engine = open_engine(&settings).await?;
    let outcome = engine.proposals.approve_proposal(id).await?;
    print_success(&format!("Proposal {} approved", outcome.proposal_id));
    match &outcome.mission {
        Some(mission) => print_mission(mission),
        None => bail!("Mission expansion failed; see the event log"),
    }
    Ok(())
}

pub async fn run_reject(settings: Settings, id: &str, reason: Option<&str>) -> Result<()> {
    init_logging(&settings, true);
    let engine = open_engine(&settings).await?;
    engine.proposals.reject_proposal(id, reason).await?;
    print_success(&format!("Proposal {} rejected", id));
    Ok(())
}
