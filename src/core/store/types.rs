use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ProposalStatus::Pending),
            "approved" => Some(ProposalStatus::Approved),
            "rejected" => Some(ProposalStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Active,
    Completed,
    Failed,
}

impl MissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MissionStatus::Active => "active",
            MissionStatus::Completed => "completed",
            MissionStatus::Failed => "failed",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "active" => Some(MissionStatus::Active),
            "completed" => Some(MissionStatus::Completed),
            "failed" => Some(MissionStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Queued => "queued",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(StepStatus::Queued),
            "running" => Some(StepStatus::Running),
            "completed" => Some(StepStatus::Completed),
            "failed" => Some(StepStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionRunStatus {
    Ok,
    Error,
}

impl ActionRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionRunStatus::Ok => "ok",
            ActionRunStatus::Error => "error",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "ok" => Some(ActionRunStatus::Ok),
            "error" => Some(ActionRunStatus::Error),
            _ => None,
        }
    }
}

macro_rules! sql_status {
    ($ty:ident, $label:literal) => {
        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                $ty::from_status(text).ok_or_else(|| {
                    FromSqlError::Other(format!("unknown {} status '{}'", $label, text).into())
                })
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }
    };
}

sql_status!(ProposalStatus, "proposal");
sql_status!(MissionStatus, "mission");
sql_status!(StepStatus, "step");
sql_status!(ActionRunStatus, "action run");

#[derive(Debug, Clone, serde::Serialize)]
pub struct ProposalRecord {
    pub id: String,
    pub agent_id: String,
    pub kind: String,
    pub title: String,
    pub body: Option<String>,
    pub status: ProposalStatus,
    pub policy_snapshot: Value,
    pub created_at: String,
    pub decided_at: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MissionRecord {
    pub id: String,
    pub proposal_id: String,
    pub title: String,
    pub status: MissionStatus,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StepRecord {
    pub id: String,
    pub mission_id: String,
    pub kind: String,
    pub title: String,
    pub input: Value,
    pub output: Option<Value>,
    pub status: StepStatus,
    pub worker_id: Option<String>,
    pub claimed_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
}

/// A step to be inserted alongside its mission.
#[derive(Debug, Clone)]
pub struct NewStep {
    pub kind: String,
    pub title: String,
    pub input: Value,
}

/// A mission together with the steps it owns.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MissionWithSteps {
    pub mission: MissionRecord,
    pub steps: Vec<StepRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StepCounts {
    pub total: i64,
    pub queued: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}

impl StepCounts {
    pub fn all_terminal(&self) -> bool {
        self.total > 0 && self.completed + self.failed == self.total
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EventRecord {
    pub id: i64,
    pub kind: String,
    pub source: Option<String>,
    pub payload: Option<Value>,
    pub created_at: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PolicyRecord {
    pub key: String,
    pub value: Value,
    pub updated_at: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ActionRunRecord {
    pub id: i64,
    pub action: String,
    pub status: ActionRunStatus,
    pub details: Value,
    pub duration_ms: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentConfigRecord {
    pub agent_id: String,
    pub model_override: Option<String>,
    pub updated_at: String,
}
