use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hard ceiling on steps per task; one extra step may run while the
/// budget check observes the overflow.
pub const MAX_STEPS: usize = 50;

/// Whole-page perception by default; 0 = viewport only, positive =
/// viewport padded by N pixels.
pub const VIEWPORT_EXPANSION: i64 = -1;

/// Cumulative waiting beyond this gets the model a discouraging note.
pub const WAIT_WARNING_THRESHOLD: Duration = Duration::from_secs(3);

/// Free-text reasoning channels the model fills every step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Brain {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_previous_goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_goal: Option<String>,
}

/// The single action of one step: tool name, validated input, and the
/// result string fed back to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRecord {
    pub name: String,
    pub input: Value,
    pub output: String,
}

/// Token accounting reported by the model client for one step.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// One agent step, append-only within a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub brain: Brain,
    pub action: ActionRecord,
    pub usage: TokenUsage,
}

/// Outcome of one `execute` call.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub success: bool,
    pub data: String,
    pub history: Vec<HistoryEntry>,
}
