//! Term vocabulary with document-frequency extremes filtering

use std::collections::{HashMap, HashSet};

use counter::Counter;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TopicError};

/// Which terms survive the extremes filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPolicy {
    /// Drop terms found in fewer than this many documents
    pub no_below: usize,
    /// Drop terms found in more than this fraction of documents
    pub no_above: f64,
    /// Keep at most this many of the most frequent remaining terms
    pub keep_n: Option<usize>,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        FilterPolicy {
            no_below: 5,
            no_above: 0.5,
            keep_n: Some(100_000),
        }
    }
}

impl FilterPolicy {
    /// Keep every term; useful for tiny corpora
    pub fn keep_all() -> Self {
        FilterPolicy {
            no_below: 1,
            no_above: 1.0,
            keep_n: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    terms: Vec<String>,
    index: HashMap<String, usize>,
    doc_freqs: Vec<usize>,
    num_docs: usize,
}

impl Vocabulary {
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn id(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    pub fn term(&self, id: usize) -> Option<&str> {
        self.terms.get(id).map(String::as_str)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Number of documents containing the term at least once
    pub fn doc_freq(&self, id: usize) -> Option<usize> {
        self.doc_freqs.get(id).copied()
    }

    /// Number of documents the vocabulary was built from
    pub fn num_docs(&self) -> usize {
        self.num_docs
    }
}

/// Build a filtered vocabulary from normalized token sequences.
pub fn build_vocabulary(sequences: &[Vec<String>], policy: &FilterPolicy) -> Result<Vocabulary> {
    if sequences.is_empty() {
        return Err(TopicError::EmptyCorpus);
    }
    let num_docs = sequences.len();

    // First-seen order, with document frequencies
    let mut first_seen: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut doc_freq: Counter<&str> = Counter::new();
    for doc in sequences {
        let mut unique: HashSet<&str> = HashSet::new();
        for token in doc.iter().map(String::as_str) {
            if seen.insert(token) {
                first_seen.push(token);
            }
            unique.insert(token);
        }
        for token in unique {
            doc_freq[&token] += 1;
        }
    }

    let max_df = policy.no_above * num_docs as f64;
    let mut survivors: Vec<(usize, &str, usize)> = first_seen
        .iter()
        .enumerate()
        .map(|(order, term)| (order, *term, doc_freq[term]))
        .filter(|(_, _, df)| *df >= policy.no_below && (*df as f64) <= max_df)
        .collect();

    if let Some(keep_n) = policy.keep_n {
        if survivors.len() > keep_n {
            survivors.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
            survivors.truncate(keep_n);
            survivors.sort_by_key(|(order, _, _)| *order);
        }
    }

    info!(
        "Vocabulary: {} distinct terms, {} kept after filtering",
        first_seen.len(),
        survivors.len()
    );

    if survivors.is_empty() {
        return Err(TopicError::EmptyVocabulary {
            documents: num_docs,
        });
    }

    let mut terms = Vec::with_capacity(survivors.len());
    let mut index = HashMap::with_capacity(survivors.len());
    let mut doc_freqs = Vec::with_capacity(survivors.len());
    for (id, (_, term, df)) in survivors.into_iter().enumerate() {
        index.insert(term.to_string(), id);
        terms.push(term.to_string());
        doc_freqs.push(df);
    }

    Ok(Vocabulary {
        terms,
        index,
        doc_freqs,
        num_docs,
    })
}
