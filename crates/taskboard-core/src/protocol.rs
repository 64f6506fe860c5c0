//! Wire records exchanged with the build daemon
//!
//! The daemon sends a stream of length-delimited JSON records: a single
//! [`Header`] followed by any number of [`TaskUpdate`]s. Every `TaskUpdate`
//! field except `id` is optional, and field *presence* (not value) governs
//! whether it is applied — an absent field leaves the current value alone.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a build task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Logically absent; the task's slot is eligible for reuse
    #[default]
    Deleted,
    /// Scheduled but not yet started
    Pending,
    Running,
    Done,
    Passed,
    Failed,
    /// Could not run because a dependency failed
    Blocked,
}

impl TaskState {
    /// A settled state: the task will produce no further output until re-run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Done | TaskState::Passed | TaskState::Failed | TaskState::Blocked
        )
    }
}

/// First record of every connection. Consumed and logged; the engine does
/// not otherwise depend on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub project_root: String,
}

/// One delta for one task, identified by a daemon-assigned id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,

    /// Resource the task operates on; doubles as the task's tree path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noun: Option<String>,

    /// Human-readable task kind, e.g. "compile"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verb: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silent: Option<bool>,

    /// Raw log text, appended to the task's unparsed buffer (never replaced)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}
