//! # Stage: Record Store
//!
//! ## Responsibility
//! In-memory mapping of solution records, durably mirrored to one JSON file.
//! Supports append, signature lookup, full export, and merge-import with
//! duplicate detection. The persisted layout is the durability contract:
//! a top-level object with `solutions`, `error_types`, `technologies`, and
//! `last_updated`.
//!
//! ## Guarantees
//! - A missing or corrupt store file is recovered by reinitializing an empty
//!   store and rewriting it; corruption is never fatal
//! - Saves go through a sibling temp file plus rename, so a concurrent
//!   reader never observes a half-written structure
//! - Records are insertion-ordered; nothing here ever deletes a record
//! - Non-panicking: no `unwrap` or `expect` in any production path
//!
//! ## NOT Responsible For
//! - Ranking, similarity, or the vector space (see `vectorize` / `knowledge`)
//! - Deciding when to persist (callers drive the save points)

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::KbError;
use crate::now_secs;

// ---------------------------------------------------------------------------
// SolutionRecord
// ---------------------------------------------------------------------------

/// One stored remediation entry tied to an error type/message/context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionRecord {
    /// Unique id, generated at creation. Never reused.
    #[serde(default = "new_record_id")]
    pub id: String,
    /// Category tag, e.g. "dependency", "timeout", "unknown".
    pub error_type: String,
    /// Representative error text for this record.
    #[serde(default)]
    pub error_message: String,
    /// Surrounding log lines or keyword hints. Order matters for display,
    /// not for matching.
    #[serde(default)]
    pub context: Vec<String>,
    /// Best-guess platform/library tag.
    #[serde(default = "unknown_tag")]
    pub technology: String,
    /// Free-text remediation description. Seeded solutions join their
    /// structured sub-fields into this text; the store treats it as opaque.
    #[serde(default)]
    pub solution: String,
    /// Times this solution was applied.
    #[serde(default)]
    pub attempts: u32,
    /// Times an application was confirmed working. Never exceeds `attempts`.
    #[serde(default)]
    pub successes: u32,
    /// `successes / attempts`, or 0.0 when never attempted. Recomputed on
    /// every counter update.
    #[serde(default)]
    pub success_rate: f64,
    /// Creation time, epoch seconds. Immutable. Older exports used the key
    /// `timestamp`; both are accepted on the way in.
    #[serde(default, alias = "timestamp")]
    pub created_at: u64,
    /// Provenance (origin URL); empty for user-entered solutions.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    /// Reserved counter seeded by the curated-add path.
    #[serde(default)]
    pub feedback_count: u32,
}

fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

fn unknown_tag() -> String {
    "unknown".to_string()
}

impl SolutionRecord {
    /// Recompute `success_rate` from the counters. Zero attempts map to 0.0.
    pub fn recompute_success_rate(&mut self) {
        self.success_rate = if self.attempts > 0 {
            f64::from(self.successes) / f64::from(self.attempts)
        } else {
            0.0
        };
    }

    /// The document string this record contributes to the similarity corpus.
    pub fn corpus_text(&self) -> String {
        format!(
            "{} {} {}",
            self.error_type,
            self.error_message,
            self.context.join(" ")
        )
    }
}

// ---------------------------------------------------------------------------
// Export payload
// ---------------------------------------------------------------------------

/// Summary metadata attached to an export snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub total_solutions: usize,
    pub exported_at: u64,
}

/// A pure, side-effect-free snapshot of the full solutions sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPayload {
    pub version: String,
    pub timestamp: u64,
    pub solutions: Vec<SolutionRecord>,
    pub metadata: ExportMetadata,
}

// ---------------------------------------------------------------------------
// KnowledgeStore
// ---------------------------------------------------------------------------

/// The aggregate: insertion-ordered solution records plus observability
/// counters. Serializes 1:1 to the persisted file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeStore {
    #[serde(default)]
    pub solutions: Vec<SolutionRecord>,
    /// Occurrences per error-type tag, bumped once per analyzed log. Not
    /// used in ranking.
    #[serde(default, rename = "error_types")]
    pub error_type_counts: HashMap<String, u64>,
    /// Occurrences per technology tag, bumped once per analyzed log.
    #[serde(default, rename = "technologies")]
    pub technology_counts: HashMap<String, u64>,
    /// Epoch seconds of the last persistence write.
    #[serde(default)]
    pub last_updated: u64,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        KnowledgeStore::default()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Load the store from `path`. A missing or unparseable file yields an
    /// empty store which is persisted immediately; only that recovery write
    /// can fail.
    pub fn load(path: &Path) -> Result<KnowledgeStore, KbError> {
        match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<KnowledgeStore>(&raw) {
                Ok(store) => {
                    debug!(
                        path = %path.display(),
                        solutions = store.solutions.len(),
                        "loaded knowledge store"
                    );
                    return Ok(store);
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "knowledge store is corrupt, reinitializing"
                    );
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no knowledge store yet, creating one");
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "knowledge store unreadable, reinitializing"
                );
            }
        }

        let mut store = KnowledgeStore::new();
        store.save(path)?;
        Ok(store)
    }

    /// Persist the store to `path`, stamping `last_updated`. The JSON is
    /// written to a sibling temp file and renamed over the target.
    pub fn save(&mut self, path: &Path) -> Result<(), KbError> {
        self.last_updated = now_secs();

        let encoded = serde_json::to_string_pretty(self)?;

        let persist_err = |source: std::io::Error| KbError::Persist {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(persist_err)?;
            }
        }

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, encoded).map_err(persist_err)?;
        fs::rename(&tmp, path).map_err(persist_err)?;

        debug!(path = %path.display(), solutions = self.solutions.len(), "saved knowledge store");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Append a record and count its error type.
    pub fn append(&mut self, record: SolutionRecord) {
        *self
            .error_type_counts
            .entry(record.error_type.clone())
            .or_insert(0) += 1;
        self.solutions.push(record);
    }

    /// Append a record without touching the counters. Used by `learn` (which
    /// has already counted the analyzed log) and by import (verbatim merge).
    pub fn push_verbatim(&mut self, record: SolutionRecord) {
        self.solutions.push(record);
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Index of the first record whose `(error_type, solution)` pair matches
    /// exactly, or `None`.
    pub fn find_by_signature(&self, error_type: &str, solution_text: &str) -> Option<usize> {
        self.solutions
            .iter()
            .position(|s| s.error_type == error_type && s.solution == solution_text)
    }

    // -----------------------------------------------------------------------
    // Export / import
    // -----------------------------------------------------------------------

    /// Snapshot the full solutions sequence plus summary metadata. Pure read.
    pub fn export(&self) -> ExportPayload {
        let now = now_secs();
        ExportPayload {
            version: "1.0".to_string(),
            timestamp: now,
            solutions: self.solutions.clone(),
            metadata: ExportMetadata {
                total_solutions: self.solutions.len(),
                exported_at: now,
            },
        }
    }

    /// Merge an import payload into the store. Structural problems (not an
    /// object, no `solutions` array) reject the whole call; individual
    /// entries are skipped when they lack `error_type`, fail to decode, or
    /// duplicate an existing `id` or `(error_type, error_message)` signature.
    /// Returns the number of records appended. In-memory only; the caller
    /// persists and rebuilds vectors.
    pub fn merge(&mut self, data: &serde_json::Value) -> Result<usize, KbError> {
        let object = data
            .as_object()
            .ok_or_else(|| KbError::InvalidImport("payload must be a JSON object".to_string()))?;
        let entries = object
            .get("solutions")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                KbError::InvalidImport("payload must contain a 'solutions' array".to_string())
            })?;

        let mut existing_ids: HashSet<String> =
            self.solutions.iter().map(|s| s.id.clone()).collect();
        let mut existing_signatures: HashSet<(String, String)> = self
            .solutions
            .iter()
            .map(|s| (s.error_type.clone(), s.error_message.clone()))
            .collect();

        let mut imported = 0;
        for entry in entries {
            // Entry-level skip: required field missing.
            if entry.get("error_type").and_then(|v| v.as_str()).is_none() {
                continue;
            }
            let record: SolutionRecord = match serde_json::from_value(entry.clone()) {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "skipping undecodable import entry");
                    continue;
                }
            };

            let signature = (record.error_type.clone(), record.error_message.clone());
            if existing_ids.contains(&record.id) || existing_signatures.contains(&signature) {
                continue;
            }

            existing_ids.insert(record.id.clone());
            existing_signatures.insert(signature);
            self.push_verbatim(record);
            imported += 1;
        }

        Ok(imported)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
