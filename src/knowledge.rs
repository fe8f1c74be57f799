//! # Stage: Knowledge Engine
//!
//! ## Responsibility
//! Retrieval and online learning over the record store. Given a new error
//! classification, return the top-K stored solutions ranked by TF-IDF cosine
//! similarity (falling back to success-rate ordering on tiny corpora).
//! Given feedback, update success/attempt counters on an existing solution
//! or append a newly observed one, then persist and refresh the vector
//! space.
//!
//! ## Guarantees
//! - The fitted space, when present, always reflects the current solutions
//!   sequence: every size-changing mutation rebuilds it (corpus at or above
//!   the minimum) or clears it (below)
//! - Retrieval never fails: no matches, empty stores, and unvectorizable
//!   corpora all produce ranked-or-empty results, never errors
//! - Learning never fails for "nothing extracted"; only persistence write
//!   failures propagate
//! - Thread-safe when wrapped in `Arc<Mutex<KnowledgeBase>>` by a concurrent
//!   host; mutations take `&mut self` so no two can interleave
//!
//! ## NOT Responsible For
//! - Classifying raw log text (see `classify`)
//! - Fetching external knowledge (harvest items arrive pre-extracted)

use std::cmp::Ordering;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::classify::{guess_error_type, guess_technology, LogAnalysis};
use crate::error::KbError;
use crate::now_secs;
use crate::store::{ExportPayload, KnowledgeStore, SolutionRecord};
use crate::vectorize::TfidfIndex;

/// Below this many records the similarity signal is statistically
/// meaningless; retrieval falls back to success-rate ordering instead.
pub const MIN_CORPUS_FOR_VECTORS: usize = 5;

// ---------------------------------------------------------------------------
// Feedback extraction
// ---------------------------------------------------------------------------

/// Trigger word, separator, then a broad run of solution-like characters so
/// multi-token code suggestions survive. Deliberately greedy: it can capture
/// trailing unrelated text, and that is accepted; downstream quality is
/// validated through feedback, not guaranteed here.
static SOLUTION_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?:fix|solve|resolve|solution|install)[\s:]+([\w\s.()\[\]{}'"`;:/\\,=+*&^%$#@!~-]+)"#,
    )
    .expect("solution phrase pattern must compile")
});

/// First remediation phrase found in free-text feedback, if any.
pub fn extract_solution_phrase(feedback: &str) -> Option<String> {
    SOLUTION_PHRASE
        .captures(feedback)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Documentation items are only worth harvesting when they talk about
/// errors or debugging at all.
static DOC_RELEVANCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)error|exception|troubleshoot|debug|issue|problem")
        .expect("doc relevance pattern must compile")
});

// ---------------------------------------------------------------------------
// Input shapes
// ---------------------------------------------------------------------------

/// One harvested knowledge item from an external extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KnowledgeItem {
    /// An issue-tracker extract: observed error plus the fix that closed it.
    Issue {
        error: String,
        solution: String,
        #[serde(default)]
        source: String,
    },
    /// A Q&A extract: question text plus the accepted answer.
    Stackoverflow {
        question: String,
        answer: String,
        #[serde(default)]
        source: String,
    },
    /// A documentation page; admitted only when it references error or
    /// debugging vocabulary.
    Documentation {
        title: String,
        content: String,
        #[serde(default)]
        source: String,
    },
}

/// A curated solution body for the seed path. Structured sub-fields are
/// joined into the record's solution text; the engine treats the result as
/// opaque corpus text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedSolution {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub references: Vec<String>,
}

impl SeedSolution {
    /// Join the non-empty sub-fields into one solution text.
    pub fn joined_text(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !self.title.is_empty() {
            parts.push(self.title.clone());
        }
        if !self.description.is_empty() {
            parts.push(self.description.clone());
        }
        if !self.steps.is_empty() {
            parts.push(self.steps.join("\n"));
        }
        if !self.code.is_empty() {
            parts.push(self.code.clone());
        }
        if !self.references.is_empty() {
            parts.push(self.references.join("\n"));
        }
        parts.join("\n")
    }
}

fn tag_or_unknown(tag: &str) -> &str {
    if tag.is_empty() {
        "unknown"
    } else {
        tag
    }
}

// ---------------------------------------------------------------------------
// KnowledgeBase
// ---------------------------------------------------------------------------

/// The knowledge engine: one record store mirrored to one file, plus the
/// lazily maintained TF-IDF space over its corpus.
pub struct KnowledgeBase {
    path: PathBuf,
    store: KnowledgeStore,
    index: Option<TfidfIndex>,
}

impl KnowledgeBase {
    /// Open (or initialize) the store at `path` and fit the vector space if
    /// the corpus is already large enough.
    pub fn open(path: impl Into<PathBuf>) -> Result<KnowledgeBase, KbError> {
        let path = path.into();
        let store = KnowledgeStore::load(&path)?;
        let mut kb = KnowledgeBase {
            path,
            store,
            index: None,
        };
        kb.refresh_index();
        Ok(kb)
    }

    /// Read access to the underlying store (stats, display).
    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    /// Number of stored solution records.
    pub fn len(&self) -> usize {
        self.store.solutions.len()
    }

    /// `true` when no records are stored.
    pub fn is_empty(&self) -> bool {
        self.store.solutions.is_empty()
    }

    fn persist(&mut self) -> Result<(), KbError> {
        self.store.save(&self.path)
    }

    /// Refit the space from the current corpus, or clear it below the
    /// minimum. Called after every size-changing mutation so a reader never
    /// observes a space that disagrees with `solutions`.
    fn refresh_index(&mut self) {
        if self.store.solutions.len() >= MIN_CORPUS_FOR_VECTORS {
            let corpus: Vec<String> = self
                .store
                .solutions
                .iter()
                .map(|s| s.corpus_text())
                .collect();
            self.index = TfidfIndex::fit(&corpus);
            debug!(docs = corpus.len(), "refitted similarity space");
        } else {
            self.index = None;
        }
    }

    // -----------------------------------------------------------------------
    // Retrieval
    // -----------------------------------------------------------------------

    /// Top `limit` stored solutions for a new error classification.
    ///
    /// Ranking is cosine similarity against the fitted space; stores smaller
    /// than the vectorization minimum (and corpora that yield no terms) fall
    /// back to success-rate ordering. Ties preserve insertion order in both
    /// paths. Takes `&mut self` only for the lazy refit; ranking semantics
    /// are a pure read.
    pub fn get_solutions(
        &mut self,
        error_type: &str,
        context: &[String],
        limit: usize,
    ) -> Vec<SolutionRecord> {
        if self.store.solutions.is_empty() {
            return Vec::new();
        }

        if self.store.solutions.len() < MIN_CORPUS_FOR_VECTORS {
            return self.by_success_rate(limit);
        }

        if self.index.is_none() {
            self.refresh_index();
        }
        let Some(index) = self.index.as_ref() else {
            // Corpus text produced no terms; similarity is undefined.
            return self.by_success_rate(limit);
        };

        let query = format!("{} {}", error_type, context.join(" "));
        let scores = index.score(&query);

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.cmp(&b))
        });
        order.truncate(limit);

        order
            .into_iter()
            .map(|i| self.store.solutions[i].clone())
            .collect()
    }

    fn by_success_rate(&self, limit: usize) -> Vec<SolutionRecord> {
        let mut ranked = self.store.solutions.clone();
        // Stable sort: ties keep insertion order.
        ranked.sort_by(|a, b| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(Ordering::Equal)
        });
        ranked.truncate(limit);
        ranked
    }

    // -----------------------------------------------------------------------
    // Learning
    // -----------------------------------------------------------------------

    /// Learn from one analyzed log and optional feedback.
    ///
    /// Counters for the analyzed error type and technology are always
    /// bumped. A structured `(solution_applied, solution_worked)` pair
    /// updates the matching record's counters or appends a new record; free
    /// text `feedback` is mined for a remediation phrase and trusted as a
    /// positive signal when one is found. Whatever happens, the store is
    /// persisted before returning.
    pub fn learn(
        &mut self,
        _log_content: Option<&str>,
        analysis: &LogAnalysis,
        feedback: Option<&str>,
        solution_applied: Option<&str>,
        solution_worked: Option<bool>,
    ) -> Result<bool, KbError> {
        let error_type = tag_or_unknown(&analysis.error_type).to_string();
        let technology = tag_or_unknown(&analysis.technology).to_string();

        *self
            .store
            .error_type_counts
            .entry(error_type.clone())
            .or_insert(0) += 1;
        *self
            .store
            .technology_counts
            .entry(technology.clone())
            .or_insert(0) += 1;

        let applied = solution_applied.filter(|s| !s.is_empty());
        if let (Some(applied), Some(worked)) = (applied, solution_worked) {
            if let Some(idx) = self.store.find_by_signature(&error_type, applied) {
                let record = &mut self.store.solutions[idx];
                record.attempts += 1;
                if worked {
                    record.successes += 1;
                }
                record.recompute_success_rate();
                info!(
                    id = %record.id,
                    attempts = record.attempts,
                    success_rate = record.success_rate,
                    "updated solution counters from feedback"
                );
                self.persist()?;
                return Ok(true);
            }

            let record = SolutionRecord {
                id: Uuid::new_v4().to_string(),
                error_type,
                error_message: analysis.error_message.clone(),
                context: analysis.context.clone(),
                technology,
                solution: applied.to_string(),
                attempts: 1,
                successes: u32::from(worked),
                success_rate: if worked { 1.0 } else { 0.0 },
                created_at: now_secs(),
                source: String::new(),
                feedback_count: 0,
            };
            info!(id = %record.id, worked, "recorded newly applied solution");
            self.store.push_verbatim(record);
            self.persist()?;
            self.refresh_index();
            return Ok(true);
        }

        if let Some(text) = feedback {
            if let Some(extracted) = extract_solution_phrase(text) {
                let record = SolutionRecord {
                    id: Uuid::new_v4().to_string(),
                    error_type,
                    error_message: analysis.error_message.clone(),
                    context: analysis.context.clone(),
                    technology,
                    solution: extracted,
                    // User feedback is trusted as a positive signal.
                    attempts: 1,
                    successes: 1,
                    success_rate: 1.0,
                    created_at: now_secs(),
                    source: String::new(),
                    feedback_count: 0,
                };
                info!(id = %record.id, "promoted solution from feedback text");
                self.store.push_verbatim(record);
                self.persist()?;
                self.refresh_index();
                return Ok(true);
            }
        }

        // Nothing to store; the counters still moved.
        self.persist()?;
        Ok(true)
    }

    /// Curated/seed insertion path, distinct from `learn`: the solution
    /// starts unproven (`success_rate` 0.0) until feedback arrives.
    pub fn add_solution(
        &mut self,
        error_type: &str,
        context_keywords: &[String],
        seed: SeedSolution,
    ) -> Result<bool, KbError> {
        let record = SolutionRecord {
            id: seed
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            error_type: error_type.to_string(),
            error_message: String::new(),
            context: context_keywords.to_vec(),
            technology: "unknown".to_string(),
            solution: seed.joined_text(),
            attempts: 0,
            successes: 0,
            success_rate: 0.0,
            created_at: now_secs(),
            source: String::new(),
            feedback_count: 0,
        };
        info!(id = %record.id, error_type, "seeded curated solution");
        self.store.append(record);
        self.persist()?;
        self.refresh_index();
        Ok(true)
    }

    /// Bulk-harvest path. Returns the number of items actually admitted.
    pub fn add_knowledge(&mut self, items: &[KnowledgeItem]) -> Result<usize, KbError> {
        let mut added = 0;
        for item in items {
            let record = match item {
                KnowledgeItem::Issue {
                    error,
                    solution,
                    source,
                } => Some(harvested_record(
                    guess_error_type(error),
                    error.clone(),
                    Vec::new(),
                    guess_technology(&[error, solution]),
                    solution.clone(),
                    source,
                )),
                KnowledgeItem::Stackoverflow {
                    question,
                    answer,
                    source,
                } => Some(harvested_record(
                    guess_error_type(question),
                    question.clone(),
                    Vec::new(),
                    guess_technology(&[question, answer]),
                    answer.clone(),
                    source,
                )),
                KnowledgeItem::Documentation {
                    title,
                    content,
                    source,
                } => {
                    let combined = format!("{} {}", title, content);
                    if DOC_RELEVANCE.is_match(&combined) {
                        Some(harvested_record(
                            guess_error_type(&combined),
                            title.clone(),
                            vec![content.clone()],
                            guess_technology(&[title, content]),
                            content.clone(),
                            source,
                        ))
                    } else {
                        None
                    }
                }
            };

            if let Some(record) = record {
                self.store.append(record);
                added += 1;
            }
        }

        if added > 0 {
            info!(added, "harvested knowledge items");
            self.persist()?;
            self.refresh_index();
        }
        Ok(added)
    }

    // -----------------------------------------------------------------------
    // Export / import
    // -----------------------------------------------------------------------

    /// Pure snapshot of the full solutions sequence plus metadata.
    pub fn export_data(&self) -> ExportPayload {
        self.store.export()
    }

    /// Merge a previously exported payload, persist, and refresh the space
    /// if anything was added. Returns the number of records imported.
    pub fn import_data(&mut self, data: &serde_json::Value) -> Result<usize, KbError> {
        let imported = self.store.merge(data)?;
        self.persist()?;
        if imported > 0 {
            info!(imported, "imported solution records");
            self.refresh_index();
        }
        Ok(imported)
    }
}

fn harvested_record(
    error_type: &str,
    error_message: String,
    context: Vec<String>,
    technology: &str,
    solution: String,
    source: &str,
) -> SolutionRecord {
    SolutionRecord {
        id: Uuid::new_v4().to_string(),
        error_type: error_type.to_string(),
        error_message,
        context,
        technology: technology.to_string(),
        solution,
        attempts: 1,
        successes: 1,
        success_rate: 1.0,
        created_at: now_secs(),
        source: source.to_string(),
        feedback_count: 0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::LogAnalysis;
    use tempfile::TempDir;

    fn open_kb(dir: &TempDir) -> KnowledgeBase {
        KnowledgeBase::open(dir.path().join("knowledge_db.json")).unwrap()
    }

    fn seeded_record(error_type: &str, solution: &str, success_rate: f64) -> SolutionRecord {
        SolutionRecord {
            id: Uuid::new_v4().to_string(),
            error_type: error_type.to_string(),
            error_message: format!("{} detected", error_type),
            context: vec![format!("{} context line", error_type)],
            technology: "unknown".to_string(),
            solution: solution.to_string(),
            attempts: 10,
            successes: (success_rate * 10.0).round() as u32,
            success_rate,
            created_at: 1_700_000_000,
            source: String::new(),
            feedback_count: 0,
        }
    }

    fn kb_with_records(dir: &TempDir, records: Vec<SolutionRecord>) -> KnowledgeBase {
        let mut kb = open_kb(dir);
        for record in records {
            kb.store.push_verbatim(record);
        }
        kb.refresh_index();
        kb
    }

    // -----------------------------------------------------------------------
    // extract_solution_phrase
    // -----------------------------------------------------------------------

    #[test]
    fn test_extract_phrase_after_fix() {
        let phrase = extract_solution_phrase("you can fix: pip install requests").unwrap();
        assert!(phrase.starts_with("pip install requests"));
    }

    #[test]
    fn test_extract_phrase_after_install() {
        let phrase = extract_solution_phrase("just install libssl-dev first").unwrap();
        assert!(phrase.starts_with("libssl-dev first"));
    }

    #[test]
    fn test_extract_phrase_keeps_code_punctuation() {
        let phrase =
            extract_solution_phrase("solution: kubectl rollout restart deployment/api").unwrap();
        assert!(phrase.contains("deployment/api"));
    }

    #[test]
    fn test_extract_phrase_is_greedy_past_sentence_end() {
        // The trailing text is captured too. Known and accepted heuristic.
        let phrase = extract_solution_phrase("fix: restart the pod. also unrelated words").unwrap();
        assert!(phrase.contains("also unrelated words"));
    }

    #[test]
    fn test_extract_phrase_case_insensitive() {
        assert!(extract_solution_phrase("SOLVE: reboot it").is_some());
    }

    #[test]
    fn test_extract_phrase_none_without_trigger() {
        assert!(extract_solution_phrase("this log looks bad").is_none());
    }

    // -----------------------------------------------------------------------
    // get_solutions — empty / small corpus
    // -----------------------------------------------------------------------

    #[test]
    fn test_get_solutions_empty_store() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        assert!(kb.get_solutions("timeout", &[], 5).is_empty());
    }

    #[test]
    fn test_small_store_sorted_by_success_rate() {
        let dir = TempDir::new().unwrap();
        let mut kb = kb_with_records(
            &dir,
            vec![
                seeded_record("timeout", "a", 0.9),
                seeded_record("timeout", "b", 0.2),
                seeded_record("timeout", "c", 0.5),
            ],
        );
        let results = kb.get_solutions("timeout", &[], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].solution, "a");
        assert_eq!(results[1].solution, "c");
    }

    #[test]
    fn test_small_store_ties_keep_insertion_order() {
        let dir = TempDir::new().unwrap();
        let mut kb = kb_with_records(
            &dir,
            vec![
                seeded_record("timeout", "first", 0.5),
                seeded_record("timeout", "second", 0.5),
                seeded_record("timeout", "third", 0.9),
            ],
        );
        let results = kb.get_solutions("timeout", &[], 3);
        assert_eq!(results[0].solution, "third");
        assert_eq!(results[1].solution, "first");
        assert_eq!(results[2].solution, "second");
    }

    #[test]
    fn test_small_store_respects_limit() {
        let dir = TempDir::new().unwrap();
        let mut kb = kb_with_records(
            &dir,
            vec![
                seeded_record("timeout", "a", 0.1),
                seeded_record("timeout", "b", 0.2),
            ],
        );
        assert_eq!(kb.get_solutions("timeout", &[], 1).len(), 1);
        assert_eq!(kb.get_solutions("timeout", &[], 10).len(), 2);
    }

    // -----------------------------------------------------------------------
    // get_solutions — vectorized path
    // -----------------------------------------------------------------------

    fn five_distinct_records() -> Vec<SolutionRecord> {
        vec![
            seeded_record("timeout", "increase upstream timeout", 0.1),
            seeded_record("memory", "raise container memory limit", 0.9),
            seeded_record("dependency", "pip install the missing module", 0.9),
            seeded_record("network", "check firewall and dns settings", 0.9),
            seeded_record("syntax", "run the linter and fix the parse", 0.9),
        ]
    }

    #[test]
    fn test_vectorized_retrieval_matches_error_type() {
        let dir = TempDir::new().unwrap();
        let mut kb = kb_with_records(&dir, five_distinct_records());
        let results = kb.get_solutions(
            "timeout",
            &["timeout context line".to_string()],
            1,
        );
        // Similarity must beat the success-rate ordering: the timeout record
        // has the LOWEST success rate but the closest text.
        assert_eq!(results[0].error_type, "timeout");
    }

    #[test]
    fn test_vectorized_retrieval_returns_top_limit_scores() {
        let dir = TempDir::new().unwrap();
        let mut kb = kb_with_records(&dir, five_distinct_records());
        let limit = 3;
        let results = kb.get_solutions("memory", &["memory context line".to_string()], limit);
        assert_eq!(results.len(), limit);
        assert_eq!(results[0].error_type, "memory");
    }

    #[test]
    fn test_vectorized_retrieval_no_signal_keeps_insertion_order() {
        let dir = TempDir::new().unwrap();
        let mut kb = kb_with_records(&dir, five_distinct_records());
        // Query shares no terms with any document: all scores 0.0, ties keep
        // insertion order.
        let results = kb.get_solutions("zzz", &["qqq www".to_string()], 2);
        assert_eq!(results[0].error_type, "timeout");
        assert_eq!(results[1].error_type, "memory");
    }

    #[test]
    fn test_lazy_build_when_index_absent() {
        let dir = TempDir::new().unwrap();
        let mut kb = kb_with_records(&dir, five_distinct_records());
        kb.index = None;
        let results = kb.get_solutions("dependency", &["pip install".to_string()], 1);
        assert_eq!(results[0].error_type, "dependency");
        assert!(kb.index.is_some(), "retrieval must have built the space lazily");
    }

    // -----------------------------------------------------------------------
    // learn — structured feedback
    // -----------------------------------------------------------------------

    #[test]
    fn test_learn_increments_counters_always() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        let analysis = LogAnalysis::bare("dependency", "python");
        kb.learn(None, &analysis, None, None, None).unwrap();
        assert_eq!(kb.store().error_type_counts["dependency"], 1);
        assert_eq!(kb.store().technology_counts["python"], 1);
        assert!(kb.is_empty(), "no record without feedback");
    }

    #[test]
    fn test_learn_defaults_empty_tags_to_unknown() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        let analysis = LogAnalysis::bare("", "");
        kb.learn(None, &analysis, None, None, None).unwrap();
        assert_eq!(kb.store().error_type_counts["unknown"], 1);
        assert_eq!(kb.store().technology_counts["unknown"], 1);
    }

    #[test]
    fn test_learn_twice_same_solution_merges() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        let analysis = LogAnalysis::bare("dependency", "python");

        kb.learn(None, &analysis, None, Some("pip install requests"), Some(true))
            .unwrap();
        kb.learn(None, &analysis, None, Some("pip install requests"), Some(true))
            .unwrap();

        assert_eq!(kb.len(), 1, "duplicate must merge, not append");
        let record = &kb.store().solutions[0];
        assert_eq!(record.attempts, 2);
        assert_eq!(record.successes, 2);
        assert_eq!(record.success_rate, 1.0);
    }

    #[test]
    fn test_learn_failed_solution_counts_attempt_only() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        let analysis = LogAnalysis::bare("timeout", "web");

        kb.learn(None, &analysis, None, Some("restart nginx"), Some(true))
            .unwrap();
        kb.learn(None, &analysis, None, Some("restart nginx"), Some(false))
            .unwrap();

        let record = &kb.store().solutions[0];
        assert_eq!(record.attempts, 2);
        assert_eq!(record.successes, 1);
        assert!((record.success_rate - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_learn_new_failed_solution_starts_at_zero_rate() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        let analysis = LogAnalysis::bare("timeout", "web");
        kb.learn(None, &analysis, None, Some("turn it off and on"), Some(false))
            .unwrap();
        let record = &kb.store().solutions[0];
        assert_eq!(record.attempts, 1);
        assert_eq!(record.successes, 0);
        assert_eq!(record.success_rate, 0.0);
    }

    #[test]
    fn test_learn_same_solution_different_error_type_appends() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        kb.learn(None, &LogAnalysis::bare("timeout", "web"), None, Some("restart"), Some(true))
            .unwrap();
        kb.learn(None, &LogAnalysis::bare("memory", "web"), None, Some("restart"), Some(true))
            .unwrap();
        assert_eq!(kb.len(), 2, "dedup key is (error_type, solution)");
    }

    // -----------------------------------------------------------------------
    // learn — free-text feedback
    // -----------------------------------------------------------------------

    #[test]
    fn test_learn_promotes_feedback_phrase() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        let analysis = LogAnalysis::bare("dependency", "python");
        kb.learn(
            None,
            &analysis,
            Some("you can fix: pip install requests"),
            None,
            None,
        )
        .unwrap();

        assert_eq!(kb.len(), 1);
        let record = &kb.store().solutions[0];
        assert!(record.solution.starts_with("pip install requests"));
        assert_eq!(record.attempts, 1);
        assert_eq!(record.successes, 1);
        assert_eq!(record.success_rate, 1.0);
        assert_eq!(kb.store().error_type_counts["dependency"], 1);
    }

    #[test]
    fn test_learn_feedback_without_trigger_stores_nothing() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        let analysis = LogAnalysis::bare("timeout", "web");
        let ok = kb
            .learn(None, &analysis, Some("that looks broken to me"), None, None)
            .unwrap();
        assert!(ok, "nothing extracted is not a failure");
        assert!(kb.is_empty());
        assert_eq!(kb.store().error_type_counts["timeout"], 1);
    }

    #[test]
    fn test_learn_structured_branch_wins_over_feedback() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        let analysis = LogAnalysis::bare("timeout", "web");
        kb.learn(
            None,
            &analysis,
            Some("fix: something else entirely"),
            Some("restart nginx"),
            Some(true),
        )
        .unwrap();
        assert_eq!(kb.len(), 1);
        assert_eq!(kb.store().solutions[0].solution, "restart nginx");
    }

    #[test]
    fn test_learn_persists_to_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("knowledge_db.json");
        {
            let mut kb = KnowledgeBase::open(&path).unwrap();
            kb.learn(
                None,
                &LogAnalysis::bare("timeout", "web"),
                None,
                Some("restart nginx"),
                Some(true),
            )
            .unwrap();
        }
        let reopened = KnowledgeBase::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.store().error_type_counts["timeout"], 1);
    }

    // -----------------------------------------------------------------------
    // add_solution
    // -----------------------------------------------------------------------

    #[test]
    fn test_add_solution_seeds_unproven_record() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        let seed = SeedSolution {
            title: "Bump the connection pool".to_string(),
            description: "Raise max_connections".to_string(),
            steps: vec!["edit config".to_string(), "restart service".to_string()],
            ..SeedSolution::default()
        };
        kb.add_solution("timeout", &["pool exhausted".to_string()], seed)
            .unwrap();

        let record = &kb.store().solutions[0];
        assert_eq!(record.error_type, "timeout");
        assert_eq!(record.attempts, 0);
        assert_eq!(record.success_rate, 0.0);
        assert_eq!(record.feedback_count, 0);
        assert!(record.solution.contains("Bump the connection pool"));
        assert!(record.solution.contains("restart service"));
        assert!(record.created_at > 1_698_000_000);
        assert_eq!(kb.store().error_type_counts["timeout"], 1);
    }

    #[test]
    fn test_add_solution_keeps_supplied_id() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        let seed = SeedSolution {
            id: Some("curated-001".to_string()),
            title: "Known fix".to_string(),
            ..SeedSolution::default()
        };
        kb.add_solution("memory", &[], seed).unwrap();
        assert_eq!(kb.store().solutions[0].id, "curated-001");
    }

    // -----------------------------------------------------------------------
    // add_knowledge
    // -----------------------------------------------------------------------

    #[test]
    fn test_add_knowledge_issue_item() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        let items = vec![KnowledgeItem::Issue {
            error: "connection timed out contacting registry".to_string(),
            solution: "configure the proxy for npm".to_string(),
            source: "https://tracker.example/issue/1".to_string(),
        }];
        assert_eq!(kb.add_knowledge(&items).unwrap(), 1);
        let record = &kb.store().solutions[0];
        assert_eq!(record.error_type, "timeout");
        assert_eq!(record.technology, "javascript");
        assert_eq!(record.attempts, 1);
        assert_eq!(record.success_rate, 1.0);
        assert_eq!(record.source, "https://tracker.example/issue/1");
    }

    #[test]
    fn test_add_knowledge_stackoverflow_item() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        let items = vec![KnowledgeItem::Stackoverflow {
            question: "Why is my import failing in python?".to_string(),
            answer: "pip install the package into the right venv".to_string(),
            source: String::new(),
        }];
        assert_eq!(kb.add_knowledge(&items).unwrap(), 1);
        let record = &kb.store().solutions[0];
        assert_eq!(record.error_message, "Why is my import failing in python?");
        assert_eq!(record.technology, "python");
    }

    #[test]
    fn test_add_knowledge_documentation_admitted_with_error_vocab() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        let items = vec![KnowledgeItem::Documentation {
            title: "Fixing ImportError".to_string(),
            content: "When you hit this error, install the missing package.".to_string(),
            source: String::new(),
        }];
        assert_eq!(kb.add_knowledge(&items).unwrap(), 1);
        let record = &kb.store().solutions[0];
        // "ImportError" matches the exception rule before the dependency rule.
        assert_eq!(record.error_type, "exception");
        assert_eq!(record.error_message, "Fixing ImportError");
        assert_eq!(record.context.len(), 1);
    }

    #[test]
    fn test_add_knowledge_documentation_rejected_without_error_vocab() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        let items = vec![KnowledgeItem::Documentation {
            title: "Getting started".to_string(),
            content: "Welcome to the platform tour.".to_string(),
            source: String::new(),
        }];
        assert_eq!(kb.add_knowledge(&items).unwrap(), 0);
        assert!(kb.is_empty());
    }

    #[test]
    fn test_add_knowledge_counts_error_types() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        let items = vec![KnowledgeItem::Issue {
            error: "permission denied writing cache".to_string(),
            solution: "chown the cache directory".to_string(),
            source: String::new(),
        }];
        kb.add_knowledge(&items).unwrap();
        assert_eq!(kb.store().error_type_counts["permission"], 1);
    }

    // -----------------------------------------------------------------------
    // export / import
    // -----------------------------------------------------------------------

    #[test]
    fn test_export_import_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut kb = kb_with_records(
            &dir,
            vec![
                seeded_record("timeout", "a", 0.5),
                seeded_record("memory", "b", 0.9),
            ],
        );
        let payload = serde_json::to_value(kb.export_data()).unwrap();

        let other_dir = TempDir::new().unwrap();
        let mut fresh = open_kb(&other_dir);
        assert_eq!(fresh.import_data(&payload).unwrap(), 2);
        assert_eq!(fresh.store().solutions, kb.store().solutions);
    }

    #[test]
    fn test_import_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut kb = kb_with_records(&dir, vec![seeded_record("timeout", "a", 0.5)]);
        let payload = serde_json::to_value(kb.export_data()).unwrap();

        let other_dir = TempDir::new().unwrap();
        let mut fresh = open_kb(&other_dir);
        assert_eq!(fresh.import_data(&payload).unwrap(), 1);
        assert_eq!(fresh.import_data(&payload).unwrap(), 0);
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn test_import_malformed_payload_rejected() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        let err = kb.import_data(&serde_json::json!("not an object"));
        assert!(matches!(err, Err(KbError::InvalidImport(_))));
        assert!(kb.is_empty());
    }

    #[test]
    fn test_import_refreshes_space_for_large_corpus() {
        let dir = TempDir::new().unwrap();
        let mut kb = kb_with_records(&dir, five_distinct_records());
        let payload = serde_json::to_value(kb.export_data()).unwrap();

        let other_dir = TempDir::new().unwrap();
        let mut fresh = open_kb(&other_dir);
        fresh.import_data(&payload).unwrap();
        assert!(fresh.index.is_some(), "space must reflect the imported corpus");
        assert_eq!(fresh.index.as_ref().map(|i| i.len()), Some(5));
    }

    // -----------------------------------------------------------------------
    // Staleness invariant
    // -----------------------------------------------------------------------

    #[test]
    fn test_space_cleared_below_minimum() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        kb.learn(
            None,
            &LogAnalysis::bare("timeout", "web"),
            None,
            Some("restart"),
            Some(true),
        )
        .unwrap();
        assert!(kb.index.is_none(), "one record is below the vectorization minimum");
    }

    #[test]
    fn test_space_tracks_corpus_growth() {
        let dir = TempDir::new().unwrap();
        let mut kb = open_kb(&dir);
        for (i, error_type) in ["timeout", "memory", "syntax", "network", "dependency"]
            .iter()
            .enumerate()
        {
            let solution = format!("apply fix number {}", i);
            kb.learn(
                None,
                &LogAnalysis::bare(error_type, "web"),
                None,
                Some(solution.as_str()),
                Some(true),
            )
            .unwrap();
        }
        assert_eq!(kb.len(), 5);
        assert_eq!(kb.index.as_ref().map(|i| i.len()), Some(5));
    }

    #[test]
    fn test_open_builds_space_for_existing_corpus() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("knowledge_db.json");
        {
            let mut kb = KnowledgeBase::open(&path).unwrap();
            for record in five_distinct_records() {
                kb.store.push_verbatim(record);
            }
            kb.persist().unwrap();
        }
        let kb = KnowledgeBase::open(&path).unwrap();
        assert_eq!(kb.index.as_ref().map(|i| i.len()), Some(5));
    }
}
