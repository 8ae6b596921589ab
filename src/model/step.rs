use serde::{Deserialize, Serialize};

/// Timestamp format used for `started_at` / `completed_at` / `created_at`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Normalized status of an embedded task node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusCode {
    #[default]
    Todo,
    Active,
    Done,
}

impl StatusCode {
    /// Normalize a raw status string. Matching is case-insensitive and
    /// ignores surrounding whitespace; anything unrecognized is `Todo`.
    pub fn normalize(raw: Option<&str>) -> StatusCode {
        StatusCode::parse(raw.unwrap_or_default()).unwrap_or(StatusCode::Todo)
    }

    /// Strict parse: `None` for unrecognized values
    pub fn parse(raw: &str) -> Option<StatusCode> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "TODO" => Some(StatusCode::Todo),
            "ACTIVE" => Some(StatusCode::Active),
            "DONE" => Some(StatusCode::Done),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Todo => "TODO",
            StatusCode::Active => "ACTIVE",
            StatusCode::Done => "DONE",
        }
    }
}

/// A unit of work. Steps may fan out into an embedded plan of task nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Step {
    /// Stable node id (`STEP-…`), empty if the store never assigned one
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub success_criteria: Vec<String>,
    pub tests: Vec<String>,
    pub blockers: Vec<String>,
    pub criteria_confirmed: bool,
    pub tests_confirmed: bool,
    pub criteria_auto_confirmed: bool,
    /// Set by the store when `tests` was empty at creation
    pub tests_auto_confirmed: bool,
    pub criteria_notes: Vec<String>,
    pub tests_notes: Vec<String>,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub progress_notes: Vec<String>,
    /// Status precomputed by the store. Takes precedence over local derivation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<StepPlan>,
}

impl Step {
    pub fn new(title: impl Into<String>) -> Self {
        Step {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Tasks of the embedded plan (empty if there is no plan)
    pub fn plan_tasks(&self) -> &[TaskNode] {
        self.plan.as_ref().map(|p| p.tasks.as_slice()).unwrap_or_default()
    }

    /// Mutable access to the plan's task list, creating the plan if needed
    pub fn plan_tasks_mut(&mut self) -> &mut Vec<TaskNode> {
        &mut self.plan.get_or_insert_with(StepPlan::default).tasks
    }
}

/// The sub-plan embedded in a step
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepPlan {
    pub title: String,
    pub tasks: Vec<TaskNode>,
}

/// A task embedded inside a step's plan, with its own nested steps
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskNode {
    /// Stable node id (`NODE-…`)
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<String>,
    /// Legacy key some stores emit instead of `status_code`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// True if the status was set directly rather than derived from steps
    pub status_manual: bool,
    pub blocked: bool,
    pub steps: Vec<Step>,
}

impl TaskNode {
    pub fn new(title: impl Into<String>) -> Self {
        TaskNode {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Raw status, preferring `status_code` over the legacy `status` key
    pub fn raw_status(&self) -> Option<&str> {
        self.status_code.as_deref().or(self.status.as_deref())
    }
}

/// A task as served by the intent store: the unit of caching and mutation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDocument {
    pub id: String,
    pub title: String,
    /// Bumped by the store on every accepted write
    pub revision: u64,
    pub steps: Vec<Step>,
}

/// Current local time in `TIMESTAMP_FORMAT`
pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}
