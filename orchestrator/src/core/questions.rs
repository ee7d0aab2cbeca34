//! Open questions raised by agents in Section 4 of their memory files.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    /// Blocking: work cannot continue without an answer.
    P0,
    P1,
    P2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub priority: Priority,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_phase: Option<String>,
}

/// The ```json block of Section 4.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QuestionsPayload {
    #[serde(default)]
    pub clarification_required: bool,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct AggregatedQuestions {
    pub questions: Vec<Question>,
    /// Any P0 question.
    pub blocking: bool,
    pub clarification_required: bool,
}

/// Merge payloads: first occurrence of an id wins, then sort by priority.
///
/// The sort is stable so questions of equal priority keep discovery order.
pub fn aggregate<'a>(payloads: impl IntoIterator<Item = &'a QuestionsPayload>) -> AggregatedQuestions {
    let mut seen = BTreeSet::new();
    let mut questions: Vec<Question> = Vec::new();
    for payload in payloads {
        for question in &payload.questions {
            if seen.insert(question.id.clone()) {
                questions.push(question.clone());
            }
        }
    }
    questions.sort_by_key(|q| q.priority);
    AggregatedQuestions {
        blocking: questions.iter().any(|q| q.priority == Priority::P0),
        clarification_required: !questions.is_empty(),
        questions,
    }
}

/// Markdown listing shown when a chain halts for clarification.
pub fn render_questions(questions: &[Question]) -> String {
    let mut out = String::new();
    for question in questions {
        out.push_str(&format!(
            "- **[{:?}] {}** {}\n",
            question.priority, question.id, question.question
        ));
        if let Some(context) = question.context.as_deref() {
            out.push_str(&format!("  - Context: {context}\n"));
        }
        for option in &question.options {
            out.push_str(&format!("  - Option: {option}\n"));
        }
    }
    out
}
