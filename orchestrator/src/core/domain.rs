//! Task domain classification for GATHER.
//!
//! Each domain implies different state to collect: a coding task needs the
//! project layout and git status, a correspondence task needs the thread and
//! recipient. Classification is a keyword score; multi-word keywords weigh
//! as many points as they have words.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskDomain {
    Coding,
    Correspondence,
    Research,
    Document,
    Social,
    Creative,
    Personal,
    Professional,
    TechnicalOps,
    Data,
    General,
}

/// Confidence reported when no keyword matched.
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

const CODING: &[&str] = &[
    "code", "implement", "function", "class", "api", "endpoint", "bug", "fix", "test",
    "refactor", "build", "deploy", "git", "commit", "merge", "branch", "module", "package",
    "library", "framework", "database", "query", "sql", "python", "javascript", "typescript",
    "rust", "go", "java", "script", "cli", "backend", "frontend", "server", "client",
];

const CORRESPONDENCE: &[&str] = &[
    "email", "write to", "reply", "respond", "message", "draft", "letter", "memo", "chat",
    "slack", "teams", "send", "cc", "bcc", "subject line", "recipient", "dear", "sincerely",
    "regards", "thanks", "follow up", "follow-up",
];

const RESEARCH: &[&str] = &[
    "research", "investigate", "explore", "find out", "learn about", "understand", "compare",
    "analyze", "study", "survey", "review", "best practices", "how does", "what is", "explain",
    "alternatives", "options", "tradeoffs", "trade-offs", "pros and cons",
];

const DOCUMENT: &[&str] = &[
    "document", "documentation", "readme", "guide", "tutorial", "manual", "spec",
    "specification", "wiki", "write up", "writeup", "report", "article", "blog post", "blog",
    "content", "markdown", "format",
];

const SOCIAL: &[&str] = &[
    "tweet", "post", "social media", "linkedin", "twitter", "facebook", "instagram", "tiktok",
    "youtube", "caption", "hashtag", "viral", "engagement", "followers", "audience", "brand",
];

const CREATIVE: &[&str] = &[
    "creative", "story", "poem", "narrative", "fiction", "design", "logo", "art", "visual",
    "aesthetic", "brainstorm", "idea", "concept", "imagination", "inspiration",
];

const PERSONAL: &[&str] = &[
    "personal", "my", "i want", "i need", "help me", "advice", "recommend", "suggestion",
    "opinion", "preference", "lifestyle", "hobby", "plan my",
];

const PROFESSIONAL: &[&str] = &[
    "professional", "work", "job", "career", "meeting", "presentation", "proposal", "client",
    "stakeholder", "project", "deadline", "milestone", "deliverable", "business", "company",
    "team", "manager",
];

const TECHNICAL_OPS: &[&str] = &[
    "deploy", "server", "infrastructure", "docker", "kubernetes", "k8s", "aws", "azure", "gcp",
    "cloud", "devops", "ci/cd", "pipeline", "monitoring", "logs", "metrics", "alert",
    "incident", "troubleshoot", "debug", "config", "configuration", "environment",
    "production", "staging",
];

const DATA: &[&str] = &[
    "data", "dataset", "csv", "json", "xml", "schema", "etl", "pipeline", "transform", "clean",
    "visualize", "chart", "graph", "analytics", "statistics", "ml", "machine learning", "model",
    "train", "predict",
];

impl TaskDomain {
    /// Classification order; the earlier domain wins a tie.
    pub const ALL: [TaskDomain; 11] = [
        TaskDomain::Coding,
        TaskDomain::Correspondence,
        TaskDomain::Research,
        TaskDomain::Document,
        TaskDomain::Social,
        TaskDomain::Creative,
        TaskDomain::Personal,
        TaskDomain::Professional,
        TaskDomain::TechnicalOps,
        TaskDomain::Data,
        TaskDomain::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskDomain::Coding => "coding",
            TaskDomain::Correspondence => "correspondence",
            TaskDomain::Research => "research",
            TaskDomain::Document => "document",
            TaskDomain::Social => "social",
            TaskDomain::Creative => "creative",
            TaskDomain::Personal => "personal",
            TaskDomain::Professional => "professional",
            TaskDomain::TechnicalOps => "technical_ops",
            TaskDomain::Data => "data",
            TaskDomain::General => "general",
        }
    }

    pub fn parse(raw: &str) -> Option<TaskDomain> {
        let wanted = raw.trim().to_lowercase();
        TaskDomain::ALL.into_iter().find(|d| d.as_str() == wanted)
    }

    pub fn description(self) -> &'static str {
        match self {
            TaskDomain::Coding => "Software development and programming tasks",
            TaskDomain::Correspondence => "Written communication (emails, messages, replies)",
            TaskDomain::Research => "Information gathering and analysis",
            TaskDomain::Document => "Documentation and technical writing",
            TaskDomain::Social => "Social media content creation",
            TaskDomain::Creative => "Creative and artistic work",
            TaskDomain::Personal => "Personal assistance and advice",
            TaskDomain::Professional => "Professional and business tasks",
            TaskDomain::TechnicalOps => "DevOps and infrastructure operations",
            TaskDomain::Data => "Data processing and analysis",
            TaskDomain::General => "General-purpose task",
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            TaskDomain::Coding => CODING,
            TaskDomain::Correspondence => CORRESPONDENCE,
            TaskDomain::Research => RESEARCH,
            TaskDomain::Document => DOCUMENT,
            TaskDomain::Social => SOCIAL,
            TaskDomain::Creative => CREATIVE,
            TaskDomain::Personal => PERSONAL,
            TaskDomain::Professional => PROFESSIONAL,
            TaskDomain::TechnicalOps => TECHNICAL_OPS,
            TaskDomain::Data => DATA,
            TaskDomain::General => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainClassification {
    pub domain: TaskDomain,
    /// In `0.0..=1.0`.
    pub confidence: f64,
}

/// Best-scoring domain for `query`.
///
/// Keywords match as substrings of the lower-cased query. Confidence is the
/// winning score against half the query's word count, capped at 1.0.
pub fn classify_domain(query: &str) -> DomainClassification {
    let lowered = query.to_lowercase();
    let mut best = (TaskDomain::General, 0usize);
    for domain in TaskDomain::ALL {
        let score: usize = domain
            .keywords()
            .iter()
            .filter(|keyword| lowered.contains(*keyword))
            .map(|keyword| keyword.split_whitespace().count())
            .sum();
        if score > best.1 {
            best = (domain, score);
        }
    }
    let (domain, score) = best;
    if score == 0 {
        return DomainClassification {
            domain: TaskDomain::General,
            confidence: FALLBACK_CONFIDENCE,
        };
    }
    let words = lowered.split_whitespace().count();
    DomainClassification {
        domain,
        confidence: (score as f64 / (words as f64 * 0.5)).min(1.0),
    }
}
