//! Daily summary file: one line per completed (BIB, UUT, port) run,
//! appended to `logs/BIB_<id>/<date>/daily_summary_<date>.log` (spec.md §6).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use rigctl_core::workflow_model::{BibWorkflowResult, UutTaskState};

fn outcome_label(result: &BibWorkflowResult) -> &'static str {
    match result.final_state {
        UutTaskState::Completed if result.success => "PASS",
        UutTaskState::Completed | UutTaskState::CompletedError => "FAIL",
        UutTaskState::CriticalHalt => "CRITICAL",
        UutTaskState::Cancelled => "CANCELLED",
        _ => "INCOMPLETE",
    }
}

/// Append one summary line for `result`. Never fatal to the caller: the
/// workflow already ran to completion, so a summary write failure is
/// logged and swallowed rather than propagated.
pub fn append_daily_summary(log_dir: &Path, result: &BibWorkflowResult) -> std::io::Result<()> {
    let date = crate::router::today();
    let dir = log_dir.join(format!("BIB_{}", result.bib_id)).join(&date);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("daily_summary_{date}.log"));

    let session = result.session_token.as_ref().map(|t| t.short()).unwrap_or_else(|| "-".to_string());
    let line = format!(
        "{date} {} uut={} port={} session={} outcome={} iterations={} duration_ms={} error={}\n",
        result.bib_id,
        result.uut_id,
        result.port_name,
        session,
        outcome_label(result),
        result.iterations,
        result.duration().as_millis(),
        result.error.as_deref().unwrap_or("-"),
    );

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.write_all(line.as_bytes())
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use rigctl_core::ids::{BibId, PortName, UutId};
    use rigctl_core::workflow_model::CommandSequenceResult;

    use super::*;

    fn empty_sequence() -> CommandSequenceResult {
        CommandSequenceResult { commands: Vec::new(), success: true, duration: Default::default(), aborted: false }
    }

    fn sample_result(success: bool, final_state: UutTaskState) -> BibWorkflowResult {
        let now = SystemTime::now();
        BibWorkflowResult {
            bib_id: BibId::from("bib1"),
            uut_id: UutId::from("uut1"),
            port_name: PortName::from("COM3"),
            session_token: None,
            started_at: now,
            ended_at: now,
            start_result: empty_sequence(),
            test_result: empty_sequence(),
            stop_result: empty_sequence(),
            iterations: 3,
            success,
            error: None,
            final_state,
        }
    }

    #[test]
    fn appends_one_line_and_labels_outcomes() {
        let tmp = tempfile::tempdir().unwrap();
        let result = sample_result(true, UutTaskState::Completed);
        append_daily_summary(tmp.path(), &result).unwrap();

        let date = crate::router::today();
        let path = tmp.path().join("BIB_bib1").join(&date).join(format!("daily_summary_{date}.log"));
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("outcome=PASS"));
        assert!(content.contains("iterations=3"));
    }

    #[test]
    fn critical_halt_outcome_is_labeled_critical() {
        let tmp = tempfile::tempdir().unwrap();
        let result = sample_result(false, UutTaskState::CriticalHalt);
        append_daily_summary(tmp.path(), &result).unwrap();

        let date = crate::router::today();
        let path = tmp.path().join("BIB_bib1").join(&date).join(format!("daily_summary_{date}.log"));
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("outcome=CRITICAL"));
    }

    #[test]
    fn second_append_on_same_day_adds_a_second_line() {
        let tmp = tempfile::tempdir().unwrap();
        append_daily_summary(tmp.path(), &sample_result(true, UutTaskState::Completed)).unwrap();
        append_daily_summary(tmp.path(), &sample_result(false, UutTaskState::CompletedError)).unwrap();

        let date = crate::router::today();
        let path = tmp.path().join("BIB_bib1").join(&date).join(format!("daily_summary_{date}.log"));
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
