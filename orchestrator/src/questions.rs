//! `questions --state`: open questions across every memory file of a task.

use anyhow::Result;
use tracing::debug;

use crate::core::questions::{AggregatedQuestions, aggregate, render_questions};
use crate::io::init::OrchestratorPaths;
use crate::io::memory::{questions_at, task_memory_files};
use crate::io::session_store::validate_id;

/// Aggregate the Section 4 payloads written for `task_id`.
pub fn collect_questions(paths: &OrchestratorPaths, task_id: &str) -> Result<AggregatedQuestions> {
    validate_id(task_id)?;
    let mut payloads = Vec::new();
    for path in task_memory_files(paths, task_id)? {
        if let Some(payload) = questions_at(&path)? {
            debug!(path = %path.display(), count = payload.questions.len(), "questions found");
            payloads.push(payload);
        }
    }
    Ok(aggregate(&payloads))
}

pub fn render_open_questions(task_id: &str, aggregated: &AggregatedQuestions) -> String {
    if aggregated.questions.is_empty() {
        return format!("No open questions for task {task_id}.");
    }
    format!(
        "## Open Questions ({})\n\nTask: {task_id}\nBlocking: {}\n\n{}",
        aggregated.questions.len(),
        if aggregated.blocking { "yes" } else { "no" },
        render_questions(&aggregated.questions).trim_end()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestWorkspace;

    const TASK: &str = "abc123def456";

    fn section4(json: &str) -> String {
        format!("## Section 4: User Questions\n```json\n{json}\n```\n")
    }

    /// Duplicate ids keep their first occurrence and P0 sorts first.
    #[test]
    fn merges_questions_across_agents() {
        let ws = TestWorkspace::new();
        ws.write_memory(
            TASK,
            "analysis",
            &section4(
                r#"{"questions": [{"id": "Q2", "priority": "P2", "question": "Naming?"},
                                  {"id": "Q1", "priority": "P1", "question": "Which DB?"}]}"#,
            ),
        );
        ws.write_memory(
            TASK,
            "research",
            &section4(
                r#"{"questions": [{"id": "Q1", "priority": "P0", "question": "Duplicate"},
                                  {"id": "Q3", "priority": "P0", "question": "Auth provider?"}]}"#,
            ),
        );
        ws.write_memory("feedfacecafe", "analysis", &section4(r#"{"questions": []}"#));

        let aggregated = collect_questions(&ws.paths, TASK).expect("collect");
        let ids: Vec<&str> = aggregated.questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["Q3", "Q1", "Q2"]);
        assert!(aggregated.blocking);
        let text = render_open_questions(TASK, &aggregated);
        assert!(text.starts_with("## Open Questions (3)"));
        assert!(text.contains("- **[P1] Q1** Which DB?"));
    }

    #[test]
    fn no_memory_files_means_no_questions() {
        let ws = TestWorkspace::new();
        let aggregated = collect_questions(&ws.paths, TASK).expect("collect");
        assert_eq!(
            render_open_questions(TASK, &aggregated),
            "No open questions for task abc123def456."
        );
    }
}
