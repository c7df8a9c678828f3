//! Count and weighted (TF-IDF) encodings of a tokenized corpus

use std::fmt;

use counter::Counter;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TopicError};
use crate::vocabulary::Vocabulary;

/// Weights below this are dropped from weighted vectors
const WEIGHT_EPSILON: f64 = 1e-12;

/// Sparse document vector: (term id, weight), sorted by term id
pub type SparseVector = Vec<(usize, f64)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingKind {
    /// Raw occurrence counts
    #[serde(alias = "bow")]
    Count,
    /// Counts discounted by inverse document frequency
    #[serde(alias = "tfidf")]
    Weighted,
}

impl EncodingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingKind::Count => "count",
            EncodingKind::Weighted => "weighted",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "count" | "bow" => Some(EncodingKind::Count),
            "weighted" | "tfidf" => Some(EncodingKind::Weighted),
            _ => None,
        }
    }
}

impl fmt::Display for EncodingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One representation of every document, indexed like the token sequences
#[derive(Debug, Clone)]
pub struct CorpusEncoding {
    pub kind: EncodingKind,
    pub docs: Vec<SparseVector>,
    pub num_terms: usize,
}

impl CorpusEncoding {
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Inverse document frequencies fit once over the count corpus
#[derive(Debug, Clone)]
pub struct IdfModel {
    idf: Vec<f64>,
}

impl IdfModel {
    fn fit(count: &CorpusEncoding) -> Self {
        let mut dfs = vec![0usize; count.num_terms];
        for doc in &count.docs {
            for &(term, _) in doc {
                dfs[term] += 1;
            }
        }
        let n = count.docs.len() as f64;
        let idf = dfs
            .into_iter()
            .map(|df| if df == 0 { 0.0 } else { (n / df as f64).log2() })
            .collect();
        IdfModel { idf }
    }

    pub fn idf(&self, term: usize) -> f64 {
        self.idf.get(term).copied().unwrap_or(0.0)
    }

    /// TF-IDF weights, L2-normalized
    pub fn apply(&self, counts: &[(usize, f64)]) -> SparseVector {
        let weighted: Vec<(usize, f64)> = counts
            .iter()
            .map(|&(term, tf)| (term, tf * self.idf(term)))
            .collect();
        let norm = weighted.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm <= 0.0 {
            return Vec::new();
        }
        weighted
            .into_iter()
            .map(|(term, w)| (term, w / norm))
            .filter(|(_, w)| w.abs() > WEIGHT_EPSILON)
            .collect()
    }
}

/// Both encodings of a corpus plus the statistics needed to encode new text
#[derive(Debug, Clone)]
pub struct EncodedCorpus {
    pub count: CorpusEncoding,
    pub weighted: CorpusEncoding,
    pub idf: IdfModel,
}

impl EncodedCorpus {
    pub fn get(&self, kind: EncodingKind) -> &CorpusEncoding {
        match kind {
            EncodingKind::Count => &self.count,
            EncodingKind::Weighted => &self.weighted,
        }
    }

    pub fn len(&self) -> usize {
        self.count.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count.is_empty()
    }

    /// Encode an unseen token sequence the same way the corpus was encoded
    pub fn encode_document(
        &self,
        tokens: &[String],
        vocabulary: &Vocabulary,
        kind: EncodingKind,
    ) -> SparseVector {
        let counts = count_vector(tokens, vocabulary);
        match kind {
            EncodingKind::Count => counts,
            EncodingKind::Weighted => self.idf.apply(&counts),
        }
    }
}

/// Term counts for one document; tokens outside the vocabulary are dropped
pub fn count_vector(tokens: &[String], vocabulary: &Vocabulary) -> SparseVector {
    let counts: Counter<usize> = tokens.iter().filter_map(|t| vocabulary.id(t)).collect();
    let mut vector: SparseVector = counts
        .into_iter()
        .map(|(term, count)| (term, count as f64))
        .collect();
    vector.sort_by_key(|(term, _)| *term);
    vector
}

/// Build the count and weighted encodings of a corpus.
pub fn encode(sequences: &[Vec<String>], vocabulary: &Vocabulary) -> Result<EncodedCorpus> {
    if sequences.is_empty() {
        return Err(TopicError::EmptyCorpus);
    }

    let count = CorpusEncoding {
        kind: EncodingKind::Count,
        docs: sequences
            .iter()
            .map(|tokens| count_vector(tokens, vocabulary))
            .collect(),
        num_terms: vocabulary.len(),
    };

    let idf = IdfModel::fit(&count);
    let weighted = CorpusEncoding {
        kind: EncodingKind::Weighted,
        docs: count.docs.iter().map(|doc| idf.apply(doc)).collect(),
        num_terms: vocabulary.len(),
    };

    Ok(EncodedCorpus {
        count,
        weighted,
        idf,
    })
}
