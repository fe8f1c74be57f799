//! # Stage: TF-IDF Vectorizer / Similarity Ranker
//!
//! ## Responsibility
//! Turn the free-text corpus of stored solution records into comparable
//! numeric vectors, and score a new query against that space using cosine
//! similarity. The corpus document for a record is its error type, error
//! message, and space-joined context lines; the query document is built the
//! same way from `(error_type, context)`.
//!
//! ## Guarantees
//! - Deterministic: vocabulary indices are assigned in sorted term order, so
//!   the same corpus always produces the same space
//! - Non-panicking: no `unwrap` or `expect` in any production path; zero
//!   vectors score 0.0 against everything
//! - A refit discards the previous space entirely; there is no incremental
//!   update
//! - Terms unseen at fit time contribute zero weight to a query
//!
//! ## NOT Responsible For
//! - Deciding whether a corpus is large enough to vectorize meaningfully
//!   (the knowledge engine holds that threshold)
//! - Persistence (the space is rebuilt from the store, never serialized)

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

// ---------------------------------------------------------------------------
// Stopwords
// ---------------------------------------------------------------------------

/// English stopwords removed before term weighting. Fixed embedded list; the
/// corpus is operational log text, so domain terms ("error", "timeout",
/// "connection") are deliberately NOT in it.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "am", "an",
        "and", "any", "are", "as", "at", "be", "because", "been", "before",
        "being", "below", "between", "both", "but", "by", "can", "cannot",
        "could", "did", "do", "does", "doing", "down", "during", "each",
        "few", "for", "from", "further", "had", "has", "have", "having",
        "he", "her", "here", "hers", "herself", "him", "himself", "his",
        "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
        "me", "more", "most", "my", "myself", "no", "nor", "not", "now",
        "of", "off", "on", "once", "only", "or", "other", "our", "ours",
        "ourselves", "out", "over", "own", "same", "she", "should", "so",
        "some", "such", "than", "that", "the", "their", "theirs", "them",
        "themselves", "then", "there", "these", "they", "this", "those",
        "through", "to", "too", "under", "until", "up", "very", "was", "we",
        "were", "what", "when", "where", "which", "while", "who", "whom",
        "why", "will", "with", "would", "you", "your", "yours", "yourself",
        "yourselves",
    ]
    .into_iter()
    .collect()
});

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// Split `text` into lowercase word tokens of length >= 2, stopwords removed.
///
/// A token is a maximal run of alphanumeric characters or underscores, which
/// keeps identifiers like `import_error` and `k8s` intact while splitting on
/// punctuation and whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in lowered.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            current.push(ch);
        } else if !current.is_empty() {
            flush_token(&mut tokens, &mut current);
        }
    }
    if !current.is_empty() {
        flush_token(&mut tokens, &mut current);
    }

    tokens
}

fn flush_token(tokens: &mut Vec<String>, current: &mut String) {
    if current.chars().count() >= 2 && !STOP_WORDS.contains(current.as_str()) {
        tokens.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

// ---------------------------------------------------------------------------
// TfidfIndex
// ---------------------------------------------------------------------------

/// A fitted term-weighting space over one corpus snapshot.
///
/// Weighting is term frequency × smoothed inverse document frequency,
/// `idf(t) = ln((1 + n_docs) / (1 + df(t))) + 1`, with document and query
/// vectors L2-normalized so cosine similarity reduces to a dot product.
#[derive(Debug, Clone)]
pub struct TfidfIndex {
    /// Term → column index, assigned in sorted term order.
    vocabulary: HashMap<String, usize>,
    /// Inverse document frequency per column.
    idf: Vec<f64>,
    /// One sparse L2-normalized vector per corpus document, in corpus order.
    doc_vectors: Vec<Vec<(usize, f64)>>,
}

impl TfidfIndex {
    /// Fit a space over `corpus`. Returns `None` when the corpus is empty or
    /// no document yields a single token (nothing to weight).
    pub fn fit(corpus: &[String]) -> Option<TfidfIndex> {
        if corpus.is_empty() {
            return None;
        }

        let tokenized: Vec<Vec<String>> = corpus.iter().map(|doc| tokenize(doc)).collect();

        // Document frequency per term.
        let mut df: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
            for term in unique {
                *df.entry(term).or_insert(0) += 1;
            }
        }
        if df.is_empty() {
            return None;
        }

        // Sorted term order keeps column assignment deterministic.
        let mut terms: Vec<&str> = df.keys().copied().collect();
        terms.sort_unstable();

        let vocabulary: HashMap<String, usize> = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i))
            .collect();

        let n_docs = corpus.len() as f64;
        let idf: Vec<f64> = terms
            .iter()
            .map(|t| {
                let dfi = df[*t] as f64;
                ((1.0 + n_docs) / (1.0 + dfi)).ln() + 1.0
            })
            .collect();

        let doc_vectors = tokenized
            .iter()
            .map(|tokens| {
                let mut counts: HashMap<usize, f64> = HashMap::new();
                for term in tokens {
                    if let Some(&col) = vocabulary.get(term.as_str()) {
                        *counts.entry(col).or_insert(0.0) += 1.0;
                    }
                }
                let mut vector: Vec<(usize, f64)> = counts
                    .into_iter()
                    .map(|(col, tf)| (col, tf * idf[col]))
                    .collect();
                vector.sort_unstable_by_key(|&(col, _)| col);
                l2_normalize(&mut vector);
                vector
            })
            .collect();

        Some(TfidfIndex {
            vocabulary,
            idf,
            doc_vectors,
        })
    }

    /// Number of corpus documents this space was fitted over.
    pub fn len(&self) -> usize {
        self.doc_vectors.len()
    }

    /// `true` when the space holds no documents.
    pub fn is_empty(&self) -> bool {
        self.doc_vectors.is_empty()
    }

    /// Number of distinct terms in the fitted vocabulary.
    pub fn vocab_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Project `query` into the fitted space and return its cosine similarity
    /// against every corpus document, in corpus order.
    ///
    /// Terms absent from the vocabulary are ignored. A query that projects to
    /// the zero vector scores 0.0 everywhere.
    pub fn score(&self, query: &str) -> Vec<f64> {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for term in tokenize(query) {
            if let Some(&col) = self.vocabulary.get(term.as_str()) {
                *counts.entry(col).or_insert(0.0) += 1.0;
            }
        }

        let mut query_vector: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(col, tf)| (col, tf * self.idf[col]))
            .collect();
        query_vector.sort_unstable_by_key(|&(col, _)| col);
        l2_normalize(&mut query_vector);

        if query_vector.is_empty() {
            return vec![0.0; self.doc_vectors.len()];
        }

        // Dense lookup for the query keeps the per-document dot product O(nnz).
        let dense: HashMap<usize, f64> = query_vector.into_iter().collect();
        self.doc_vectors
            .iter()
            .map(|doc| {
                doc.iter()
                    .map(|(col, w)| dense.get(col).copied().unwrap_or(0.0) * w)
                    .sum::<f64>()
            })
            .collect()
    }
}

/// Scale a sparse vector to unit L2 norm. Zero vectors are left empty so they
/// score 0.0 against everything.
fn l2_normalize(vector: &mut Vec<(usize, f64)>) {
    let norm = vector.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for (_, w) in vector.iter_mut() {
            *w /= norm;
        }
    } else {
        vector.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
