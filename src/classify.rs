//! # Stage: Log Classifier
//!
//! ## Responsibility
//! Classify raw log text into the tuple the knowledge engine consumes:
//! error type, representative error message, surrounding context lines, and
//! technology tag, plus severity grading, code-snippet extraction, and
//! root-cause hints for display. All classification is a fixed ordered rule
//! list evaluated first-match-wins; there is no trained model here.
//!
//! ## Guarantees
//! - Pure: `analyze` is a function of the input text only, no I/O
//! - Deterministic: rule tables are fixed and evaluated in declaration order
//! - Non-panicking on any input, including empty logs
//!
//! ## NOT Responsible For
//! - Retrieval or learning (see `knowledge`)
//! - Fetching log content from anywhere

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error-type rules
// ---------------------------------------------------------------------------

/// Ordered (tag, pattern) rules for error classification. Order is load
/// bearing: a line matching several patterns takes the first tag.
static ERROR_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("exception", r"(?i)exception|error|failure|failed|traceback"),
        ("timeout", r"(?i)timeout|timed out|connection refused"),
        ("memory", r"(?i)out of memory|memory (error|exceeded|limit)"),
        ("permission", r"(?i)permission denied|access denied|unauthorized"),
        ("syntax", r"(?i)syntax error|parse error|invalid syntax"),
        (
            "dependency",
            r"(?i)module not found|import error|cannot find|not installed",
        ),
        (
            "network",
            r"(?i)network (error|unreachable)|connection (refused|reset|error)",
        ),
    ]
    .into_iter()
    .map(|(tag, pattern)| {
        (
            tag,
            Regex::new(pattern).expect("error pattern must compile"),
        )
    })
    .collect()
});

/// First error-type rule matching `text`, or "unknown".
pub fn guess_error_type(text: &str) -> &'static str {
    ERROR_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(text))
        .map(|(tag, _)| *tag)
        .unwrap_or("unknown")
}

// ---------------------------------------------------------------------------
// Technology rules
// ---------------------------------------------------------------------------

/// Ordered keyword buckets for technology guessing over harvested text.
/// Plain substring containment on lowercased input; first bucket with any
/// hit wins.
static TECH_BUCKETS: Lazy<Vec<(&'static str, Vec<&'static str>)>> = Lazy::new(|| {
    vec![
        ("java", vec!["java", "springframework", "jakarta", "javax"]),
        (
            "python",
            vec!["python", "traceback", "importerror", "modulenotfounderror"],
        ),
        (
            "javascript",
            vec!["javascript", "typescript", "node.js", "npm", "yarn"],
        ),
        ("docker", vec!["docker", "container", "image", "dockerfile"]),
        (
            "kubernetes",
            vec!["kubernetes", "k8s", "pod", "deployment", "kubectl"],
        ),
        (
            "database",
            vec!["sql", "database", "mysql", "postgres", "mongodb"],
        ),
        (
            "web",
            vec!["http", "https", "status code", "request", "response"],
        ),
    ]
});

/// First technology bucket with any indicator contained in the combined
/// lowercased texts, or "unknown".
pub fn guess_technology(texts: &[&str]) -> &'static str {
    let combined = texts.join(" ").to_lowercase();
    TECH_BUCKETS
        .iter()
        .find(|(_, indicators)| indicators.iter().any(|i| combined.contains(i)))
        .map(|(tag, _)| *tag)
        .unwrap_or("unknown")
}

/// Word-boundary indicators used when scoring whole log files, where raw
/// substring matching would be too noisy.
static LOG_TECH_INDICATORS: Lazy<Vec<(&'static str, Vec<Regex>)>> = Lazy::new(|| {
    let compile = |indicators: &[&str]| -> Vec<Regex> {
        indicators
            .iter()
            .map(|i| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(i)))
                    .expect("technology indicator must compile")
            })
            .collect()
    };
    vec![
        ("java", compile(&["java.", "springframework", "jakarta", "javax."])),
        (
            "python",
            compile(&["traceback", "File \"", "ImportError", "ModuleNotFoundError"]),
        ),
        (
            "javascript",
            compile(&["TypeError", "ReferenceError", "node_modules", "npm", "yarn"]),
        ),
        ("docker", compile(&["docker", "container", "image", "Dockerfile"])),
        (
            "kubernetes",
            compile(&["kubectl", "pod", "deployment", "k8s", "namespace"]),
        ),
        (
            "database",
            compile(&["SQL", "query", "database", "mysql", "postgres", "mongodb"]),
        ),
        (
            "web",
            compile(&["http", "https", "status code", "request", "response"]),
        ),
    ]
});

/// Score every bucket by indicator hits and pick the highest; ties resolve
/// to the earlier bucket. Zero hits everywhere yields "unknown".
fn identify_technology(log_content: &str) -> String {
    let mut best: Option<(&'static str, usize)> = None;
    for (tag, indicators) in LOG_TECH_INDICATORS.iter() {
        let hits = indicators.iter().filter(|r| r.is_match(log_content)).count();
        if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
            best = Some((tag, hits));
        }
    }
    best.map(|(tag, _)| tag).unwrap_or("unknown").to_string()
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Graded impact of a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
        }
    }
}

const CRITICAL_TERMS: [&str; 5] = ["critical", "fatal", "crash", "down", "outage"];

fn determine_severity(error_type: &str, error_message: &str) -> Severity {
    let lowered = error_message.to_lowercase();
    if CRITICAL_TERMS.iter().any(|t| lowered.contains(t)) {
        return Severity::Critical;
    }
    match error_type {
        "exception" | "memory" | "network" => Severity::High,
        "timeout" | "permission" | "dependency" => Severity::Medium,
        "syntax" => Severity::Low,
        _ => Severity::Medium,
    }
}

// ---------------------------------------------------------------------------
// Code snippets
// ---------------------------------------------------------------------------

/// A `path:line` reference lifted from a stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub path: String,
    pub line: u64,
}

/// Code material found inside the log: fenced blocks and stack-trace file
/// references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSnippets {
    pub blocks: Vec<String>,
    pub file_references: Vec<FileRef>,
}

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:\w+)?\n(.*?)\n```").expect("block pattern must compile"));

static FILE_LINE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:at |File ")([^"]+):(\d+)"#).expect("file ref pattern must compile"));

fn extract_code_snippets(log_content: &str) -> CodeSnippets {
    let blocks = FENCED_BLOCK
        .captures_iter(log_content)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect();

    let file_references = FILE_LINE_REF
        .captures_iter(log_content)
        .filter_map(|c| {
            let path = c.get(1)?.as_str().to_string();
            let line = c.get(2)?.as_str().parse().ok()?;
            Some(FileRef { path, line })
        })
        .collect();

    CodeSnippets {
        blocks,
        file_references,
    }
}

// ---------------------------------------------------------------------------
// Root causes
// ---------------------------------------------------------------------------

fn error_type_causes(error_type: &str) -> &'static [&'static str] {
    match error_type {
        "exception" => &["Bug in application code", "Unexpected input"],
        "timeout" => &["Network congestion", "Service overload", "Deadlock"],
        "memory" => &["Memory leak", "Insufficient resources", "Large dataset"],
        "permission" => &["Incorrect permissions", "Security policy", "Authentication issue"],
        "syntax" => &["Code error", "Incompatible versions"],
        "dependency" => &["Missing library", "Version conflict"],
        "network" => &["Network failure", "Firewall issue", "DNS problem"],
        _ => &[],
    }
}

fn technology_causes(technology: &str) -> &'static [&'static str] {
    match technology {
        "java" => &["JVM issues", "Garbage collection problems"],
        "python" => &["GIL contention", "Package conflicts"],
        "javascript" => &["Async/callback issues", "Browser compatibility"],
        "docker" => &["Container resource limits", "Image issues"],
        "kubernetes" => &["Pod scheduling", "Resource quotas"],
        "database" => &["Query performance", "Lock contention"],
        "web" => &["CORS issues", "API rate limits"],
        _ => &[],
    }
}

/// Up to five likely causes: the fixed per-type list, then context-gated
/// infrastructure hints, then technology hints whose keywords appear in the
/// context.
fn identify_root_causes(error_type: &str, context: &[String], technology: &str) -> Vec<String> {
    let mut causes: Vec<String> = error_type_causes(error_type)
        .iter()
        .map(|c| c.to_string())
        .collect();

    let context_text = context.join(" ").to_lowercase();

    if context_text.contains("disk") && context_text.contains("space") {
        causes.push("Disk space issue".to_string());
    }
    if context_text.contains("cpu")
        && ["high", "load", "usage"].iter().any(|t| context_text.contains(t))
    {
        causes.push("High CPU usage".to_string());
    }
    if context_text.contains("connection") && context_text.contains("refused") {
        causes.push("Service unavailable".to_string());
    }
    if context_text.contains("version")
        && ["mismatch", "incompatible"].iter().any(|t| context_text.contains(t))
    {
        causes.push("Version incompatibility".to_string());
    }

    for cause in technology_causes(technology) {
        let relevant = cause
            .to_lowercase()
            .split_whitespace()
            .any(|keyword| context_text.contains(keyword));
        if relevant {
            causes.push(cause.to_string());
        }
    }

    causes.truncate(5);
    causes
}

// ---------------------------------------------------------------------------
// Error + context extraction
// ---------------------------------------------------------------------------

fn extract_error(log_content: &str) -> (String, String) {
    for (tag, pattern) in ERROR_PATTERNS.iter() {
        if pattern.is_match(log_content) {
            let line = log_content
                .lines()
                .find(|line| pattern.is_match(line))
                .unwrap_or("");
            return (tag.to_string(), line.trim().to_string());
        }
    }
    (
        "unknown".to_string(),
        "No specific error pattern detected".to_string(),
    )
}

/// The five lines before and after the first line containing
/// `error_message`, inclusive. Empty when the message is absent.
fn extract_context(log_content: &str, error_message: &str) -> Vec<String> {
    if error_message.is_empty() || !log_content.contains(error_message) {
        return Vec::new();
    }

    let lines: Vec<&str> = log_content.lines().collect();
    let Some(error_idx) = lines.iter().position(|line| line.contains(error_message)) else {
        return Vec::new();
    };

    let start = error_idx.saturating_sub(5);
    let end = (error_idx + 6).min(lines.len());
    lines[start..end].iter().map(|l| l.to_string()).collect()
}

// ---------------------------------------------------------------------------
// LogAnalysis
// ---------------------------------------------------------------------------

/// The classification tuple the knowledge engine consumes, plus display-only
/// extras (severity, snippets, root causes) the engine ignores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogAnalysis {
    pub technology: String,
    pub error_type: String,
    pub error_message: String,
    pub context: Vec<String>,
    pub severity: Severity,
    pub code_snippets: CodeSnippets,
    pub root_causes: Vec<String>,
}

impl LogAnalysis {
    /// Minimal analysis for callers that already know the classification
    /// (e.g. feedback submitted against a previous run).
    pub fn bare(error_type: &str, technology: &str) -> LogAnalysis {
        LogAnalysis {
            technology: technology.to_string(),
            error_type: error_type.to_string(),
            error_message: String::new(),
            context: Vec::new(),
            severity: Severity::Medium,
            code_snippets: CodeSnippets::default(),
            root_causes: Vec::new(),
        }
    }
}

/// Classify `log_content` end to end.
pub fn analyze(log_content: &str) -> LogAnalysis {
    let technology = identify_technology(log_content);
    let (error_type, error_message) = extract_error(log_content);
    let context = extract_context(log_content, &error_message);
    let severity = determine_severity(&error_type, &error_message);
    let code_snippets = extract_code_snippets(log_content);
    let root_causes = identify_root_causes(&error_type, &context, &technology);

    LogAnalysis {
        technology,
        error_type,
        error_message,
        context,
        severity,
        code_snippets,
        root_causes,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
