//! Workflow result types and the per-UUT task state machine (component I).

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::ids::{BibId, PortName, SessionToken, UutId};
use crate::validation::ValidationLevel;

/// Outcome of sending one command and classifying its response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Bytes received, as lossily-decoded text (binary responses are not in scope).
    pub response: String,
    /// Classified severity.
    pub level: ValidationLevel,
    /// Wall-clock duration of the attempt that ultimately succeeded or gave up.
    pub duration: Duration,
    /// Number of attempts made, including the first (i.e. `1 + retries_used`).
    pub attempts: u32,
    /// Error string, set when the command failed for a reason other than
    /// an ordinary FAIL-level classification (timeout, I/O error).
    pub error: Option<String>,
}

/// Outcome of running one [`crate::config_model::CommandSequence`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSequenceResult {
    /// Per-command results, in execution order.
    pub commands: Vec<CommandResult>,
    /// Whether the sequence as a whole is considered successful.
    pub success: bool,
    /// Total wall-clock duration of the sequence.
    pub duration: Duration,
    /// Set when the sequence was aborted short of all commands.
    pub aborted: bool,
}

impl CommandSequenceResult {
    /// Count of commands that classified as PASS or WARN.
    pub fn succeeded_count(&self) -> usize {
        self.commands.iter().filter(|c| c.level.should_continue_workflow()).count()
    }

    /// Total command count.
    pub fn total_count(&self) -> usize {
        self.commands.len()
    }
}

/// Outcome of one end-to-end run of one (BIB, UUT, Port) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BibWorkflowResult {
    pub bib_id: BibId,
    pub uut_id: UutId,
    pub port_name: PortName,
    pub session_token: Option<SessionToken>,
    pub started_at: SystemTime,
    pub ended_at: SystemTime,
    pub start_result: CommandSequenceResult,
    pub test_result: CommandSequenceResult,
    pub stop_result: CommandSequenceResult,
    /// Number of Test-sequence iterations completed.
    pub iterations: u64,
    pub success: bool,
    pub error: Option<String>,
    pub final_state: UutTaskState,
}

impl BibWorkflowResult {
    /// Total wall-clock duration of the run.
    pub fn duration(&self) -> Duration {
        self.ended_at.duration_since(self.started_at).unwrap_or_default()
    }
}

/// Per-UUT breakdown inside an [`AggregatedWorkflowResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UutBreakdown {
    pub uut_id: UutId,
    pub results: Vec<BibWorkflowResult>,
}

/// Aggregated results for one BIB across all its UUTs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedWorkflowResult {
    pub bib_id: BibId,
    pub uuts: Vec<UutBreakdown>,
}

impl AggregatedWorkflowResult {
    /// Total number of successful runs across all UUTs.
    pub fn success_count(&self) -> usize {
        self.uuts.iter().flat_map(|u| &u.results).filter(|r| r.success).count()
    }

    /// Total number of runs across all UUTs.
    pub fn total_count(&self) -> usize {
        self.uuts.iter().map(|u| u.results.len()).sum()
    }
}

/// Aggregated results across every running BIB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiBibWorkflowResult {
    pub bibs: Vec<AggregatedWorkflowResult>,
}

/// States of the per-UUT task state machine (spec.md §4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UutTaskState {
    Idle,
    WaitingForStart,
    RunningStart,
    InTestLoop,
    RunningStop,
    CriticalHalt,
    Completed,
    CompletedError,
    Cancelled,
}

impl UutTaskState {
    /// Terminal states: `Completed`, `CompletedError`, `CriticalHalt`, `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UutTaskState::Completed
                | UutTaskState::CompletedError
                | UutTaskState::CriticalHalt
                | UutTaskState::Cancelled
        )
    }
}

impl std::fmt::Display for UutTaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Metadata describing the extra outer map key used by [`HashMap`]-based
/// per-BIB task registries (orchestrator-internal, re-exported here so the
/// type shows up next to the rest of the workflow vocabulary).
pub type BibTaskRegistry<T> = HashMap<BibId, T>;
