//! Topic coherence from real co-occurrence in the source token sequences.
//!
//! Supported measures:
//! - `c_v`: boolean sliding window (110 tokens), NPMI context vectors compared
//!   by cosine against the whole top-term set
//! - `c_npmi`: boolean sliding window (10 tokens), mean pairwise NPMI
//! - `u_mass`: document co-occurrence, mean log conditional probability

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TopicError};
use crate::model::TrainedModel;
use crate::vocabulary::Vocabulary;

const EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoherenceMeasure {
    #[serde(rename = "c_v")]
    CV,
    #[serde(rename = "c_npmi")]
    CNpmi,
    #[serde(rename = "u_mass")]
    UMass,
}

impl CoherenceMeasure {
    fn default_window(&self) -> Option<usize> {
        match self {
            CoherenceMeasure::CV => Some(110),
            CoherenceMeasure::CNpmi => Some(10),
            CoherenceMeasure::UMass => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoherenceConfig {
    pub measure: CoherenceMeasure,
    /// Top terms considered per topic
    pub top_n: usize,
    /// Sliding window override; `None` uses the measure's default
    pub window_size: Option<usize>,
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        CoherenceConfig {
            measure: CoherenceMeasure::CV,
            top_n: 10,
            window_size: None,
        }
    }
}

/// Occurrence counts over boolean windows (or whole documents)
struct Occurrences {
    windows: f64,
    single: HashMap<usize, f64>,
    joint: HashMap<(usize, usize), f64>,
}

impl Occurrences {
    fn single(&self, a: usize) -> f64 {
        self.single.get(&a).copied().unwrap_or(0.0)
    }

    fn joint(&self, a: usize, b: usize) -> f64 {
        if a == b {
            return self.single(a);
        }
        let key = if a < b { (a, b) } else { (b, a) };
        self.joint.get(&key).copied().unwrap_or(0.0)
    }

    fn npmi(&self, a: usize, b: usize) -> f64 {
        let p_a = self.single(a) / self.windows;
        let p_b = self.single(b) / self.windows;
        let p_ab = self.joint(a, b) / self.windows + EPSILON;
        let pmi = (p_ab / (p_a * p_b + EPSILON)).ln();
        let denom = -p_ab.ln();
        if denom <= 0.0 {
            // Both terms are in every window
            1.0
        } else {
            pmi / denom
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CoherenceEvaluator {
    config: CoherenceConfig,
}

impl CoherenceEvaluator {
    pub fn new(config: CoherenceConfig) -> Self {
        CoherenceEvaluator { config }
    }

    pub fn config(&self) -> &CoherenceConfig {
        &self.config
    }

    /// Mean per-topic coherence of a model.
    pub fn score(
        &self,
        model: &TrainedModel,
        sequences: &[Vec<String>],
        vocabulary: &Vocabulary,
    ) -> Result<f64> {
        let topics: Vec<Vec<usize>> = (0..model.num_topics())
            .map(|topic| {
                model
                    .top_terms(topic, self.config.top_n)
                    .into_iter()
                    .map(|(term, _)| term)
                    .collect()
            })
            .collect();

        let relevant: HashSet<usize> = topics.iter().flatten().copied().collect();
        let window = self
            .config
            .window_size
            .or_else(|| self.config.measure.default_window());
        let occurrences = count_occurrences(sequences, vocabulary, &relevant, window);
        if occurrences.windows == 0.0 {
            return Err(TopicError::InsufficientData(
                "no text to count co-occurrences in".into(),
            ));
        }

        let mut total = 0.0;
        for (topic, terms) in topics.iter().enumerate() {
            if terms.len() < 2 {
                return Err(TopicError::InsufficientData(format!(
                    "topic {} has fewer than two terms",
                    topic
                )));
            }
            let co_occur = terms.iter().enumerate().any(|(i, &a)| {
                terms[i + 1..]
                    .iter()
                    .any(|&b| occurrences.joint(a, b) > 0.0)
            });
            if !co_occur {
                return Err(TopicError::InsufficientData(format!(
                    "top terms of topic {} never co-occur",
                    topic
                )));
            }

            total += match self.config.measure {
                CoherenceMeasure::CV => c_v(terms, &occurrences),
                CoherenceMeasure::CNpmi => c_npmi(terms, &occurrences),
                CoherenceMeasure::UMass => u_mass(terms, &occurrences)?,
            };
        }

        Ok(total / topics.len() as f64)
    }
}

fn c_npmi(terms: &[usize], occ: &Occurrences) -> f64 {
    let mut sum = 0.0;
    let mut pairs = 0;
    for i in 1..terms.len() {
        for j in 0..i {
            sum += occ.npmi(terms[i], terms[j]);
            pairs += 1;
        }
    }
    sum / pairs as f64
}

fn c_v(terms: &[usize], occ: &Occurrences) -> f64 {
    let vectors: Vec<Vec<f64>> = terms
        .iter()
        .map(|&a| terms.iter().map(|&b| occ.npmi(a, b)).collect())
        .collect();
    let topic_vector: Vec<f64> = (0..terms.len())
        .map(|j| vectors.iter().map(|v| v[j]).sum())
        .collect();

    let sims: f64 = vectors.iter().map(|v| cosine(v, &topic_vector)).sum();
    sims / terms.len() as f64
}

fn u_mass(terms: &[usize], occ: &Occurrences) -> Result<f64> {
    let mut sum = 0.0;
    let mut pairs = 0;
    for i in 1..terms.len() {
        for j in 0..i {
            let prior = occ.single(terms[j]);
            if prior == 0.0 {
                return Err(TopicError::InsufficientData(
                    "top term absent from every document".into(),
                ));
            }
            sum += ((occ.joint(terms[i], terms[j]) + EPSILON) / prior).ln();
            pairs += 1;
        }
    }
    Ok(sum / pairs as f64)
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Count boolean occurrences of the relevant terms.
///
/// With a window size, every window of that many positions is one context and
/// a document shorter than the window is a single context. Without one, every
/// document is a context. Tokens outside the vocabulary keep their position.
fn count_occurrences(
    sequences: &[Vec<String>],
    vocabulary: &Vocabulary,
    relevant: &HashSet<usize>,
    window: Option<usize>,
) -> Occurrences {
    let mut occ = Occurrences {
        windows: 0.0,
        single: HashMap::new(),
        joint: HashMap::new(),
    };

    for tokens in sequences {
        let ids: Vec<Option<usize>> = tokens
            .iter()
            .map(|t| vocabulary.id(t).filter(|id| relevant.contains(id)))
            .collect();
        if ids.is_empty() {
            continue;
        }

        let size = match window {
            Some(w) if w > 0 && w < ids.len() => w,
            _ => {
                record_context(&mut occ, ids.iter().flatten().copied().collect());
                continue;
            }
        };

        let mut live: HashMap<usize, usize> = HashMap::new();
        for id in ids[..size].iter().flatten() {
            *live.entry(*id).or_insert(0) += 1;
        }
        record_context(&mut occ, live.keys().copied().collect());
        for start in 1..=ids.len() - size {
            if let Some(out) = ids[start - 1] {
                if let Some(count) = live.get_mut(&out) {
                    *count -= 1;
                    if *count == 0 {
                        live.remove(&out);
                    }
                }
            }
            if let Some(incoming) = ids[start + size - 1] {
                *live.entry(incoming).or_insert(0) += 1;
            }
            record_context(&mut occ, live.keys().copied().collect());
        }
    }

    occ
}

fn record_context(occ: &mut Occurrences, present: HashSet<usize>) {
    occ.windows += 1.0;
    let mut present: Vec<usize> = present.into_iter().collect();
    present.sort_unstable();
    for (i, &a) in present.iter().enumerate() {
        *occ.single.entry(a).or_insert(0.0) += 1.0;
        for &b in &present[i + 1..] {
            *occ.joint.entry((a, b)).or_insert(0.0) += 1.0;
        }
    }
}
