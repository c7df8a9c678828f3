//! Trained topic models and the hyperparameters that produced them

use std::fmt;

use serde::{Deserialize, Serialize};
use statrs::function::gamma::digamma;

use crate::corpus::EncodingKind;
use crate::vocabulary::Vocabulary;

/// Inner E-step iterations per document
pub(crate) const MAX_INNER_ITERATIONS: usize = 50;
/// Mean absolute change in gamma below which a document's E-step stops
pub(crate) const GAMMA_THRESHOLD: f64 = 1e-3;

/// One point of the search grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HyperParams {
    pub topic_count: usize,
    pub iteration_budget: usize,
    pub encoding: EncodingKind,
}

impl fmt::Display for HyperParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "topics={} passes={} corpus={}",
            self.topic_count, self.iteration_budget, self.encoding
        )
    }
}

/// A fitted LDA model. Immutable once built.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    params: HyperParams,
    seed: u64,
    alpha: Vec<f64>,
    /// Variational topic-term parameters, topics x terms
    lambda: Vec<Vec<f64>>,
    /// exp(E[log beta]), cached for inference
    exp_elog_beta: Vec<Vec<f64>>,
    /// Normalized topic-term distributions
    topic_terms: Vec<Vec<f64>>,
    /// Normalized topic distribution of every training document
    doc_topics: Vec<Vec<f64>>,
}

impl TrainedModel {
    pub(crate) fn from_parts(
        params: HyperParams,
        seed: u64,
        alpha: Vec<f64>,
        lambda: Vec<Vec<f64>>,
        doc_topics: Vec<Vec<f64>>,
    ) -> Self {
        let exp_elog_beta = exp_elog_beta(&lambda);
        let topic_terms = lambda
            .iter()
            .map(|row| {
                let total: f64 = row.iter().sum();
                if total > 0.0 {
                    row.iter().map(|v| v / total).collect()
                } else {
                    vec![1.0 / row.len().max(1) as f64; row.len()]
                }
            })
            .collect();
        TrainedModel {
            params,
            seed,
            alpha,
            lambda,
            exp_elog_beta,
            topic_terms,
            doc_topics,
        }
    }

    pub fn params(&self) -> HyperParams {
        self.params
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn num_topics(&self) -> usize {
        self.lambda.len()
    }

    pub fn num_terms(&self) -> usize {
        self.lambda.first().map_or(0, Vec::len)
    }

    pub fn topic_terms(&self) -> &[Vec<f64>] {
        &self.topic_terms
    }

    pub fn doc_topics(&self) -> &[Vec<f64>] {
        &self.doc_topics
    }

    /// The `n` highest-probability term ids of a topic; ties by ascending id
    pub fn top_terms(&self, topic: usize, n: usize) -> Vec<(usize, f64)> {
        let Some(row) = self.topic_terms.get(topic) else {
            return Vec::new();
        };
        let mut ranked: Vec<(usize, f64)> = row.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    /// Most probable topic of a training document; ties go to the lower id
    pub fn dominant_topic(&self, doc: usize) -> Option<usize> {
        self.doc_topics.get(doc).and_then(|dist| argmax(dist))
    }

    /// Render a topic as `0.120*"revenu" + 0.081*"growth" + ...`
    pub fn format_topic(&self, topic: usize, n: usize, vocabulary: &Vocabulary) -> String {
        self.top_terms(topic, n)
            .into_iter()
            .map(|(term, p)| format!("{:.3}*\"{}\"", p, vocabulary.term(term).unwrap_or("?")))
            .collect::<Vec<_>>()
            .join(" + ")
    }

    /// Topic distribution of an unseen document vector
    pub fn infer(&self, doc: &[(usize, f64)]) -> Vec<f64> {
        let (gamma, _) = e_step_document(doc, &self.alpha, &self.exp_elog_beta);
        normalize(&gamma)
    }
}

pub(crate) fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

pub(crate) fn normalize(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter().map(|v| v / total).collect()
    } else {
        vec![1.0 / values.len().max(1) as f64; values.len()]
    }
}

/// E[log theta] (or E[log beta]) for one Dirichlet parameter vector
pub(crate) fn dirichlet_expectation(params: &[f64]) -> Vec<f64> {
    let total = digamma(params.iter().sum());
    params.iter().map(|&p| digamma(p) - total).collect()
}

pub(crate) fn exp_elog_beta(lambda: &[Vec<f64>]) -> Vec<Vec<f64>> {
    lambda
        .iter()
        .map(|row| dirichlet_expectation(row).into_iter().map(f64::exp).collect())
        .collect()
}

/// Variational E-step for one document.
///
/// Returns gamma and the document's contribution to the sufficient statistics,
/// as (term id, per-topic weight) pairs still to be multiplied by exp(E[log beta]).
pub(crate) fn e_step_document(
    doc: &[(usize, f64)],
    alpha: &[f64],
    exp_elog_beta: &[Vec<f64>],
) -> (Vec<f64>, Vec<(usize, Vec<f64>)>) {
    let k = alpha.len();
    let total: f64 = doc.iter().map(|(_, c)| c).sum();
    let mut gamma: Vec<f64> = alpha.iter().map(|a| a + total / k as f64).collect();

    if doc.is_empty() {
        return (alpha.to_vec(), Vec::new());
    }

    let mut exp_elog_theta: Vec<f64> = dirichlet_expectation(&gamma)
        .into_iter()
        .map(f64::exp)
        .collect();
    let mut phinorm = phi_norm(doc, &exp_elog_theta, exp_elog_beta);

    for _ in 0..MAX_INNER_ITERATIONS {
        let last = gamma.clone();
        for topic in 0..k {
            let weighted: f64 = doc
                .iter()
                .zip(&phinorm)
                .map(|(&(term, count), norm)| count / norm * exp_elog_beta[topic][term])
                .sum();
            gamma[topic] = alpha[topic] + exp_elog_theta[topic] * weighted;
        }
        exp_elog_theta = dirichlet_expectation(&gamma)
            .into_iter()
            .map(f64::exp)
            .collect();
        phinorm = phi_norm(doc, &exp_elog_theta, exp_elog_beta);

        let change = gamma
            .iter()
            .zip(&last)
            .map(|(a, b)| (a - b).abs())
            .sum::<f64>()
            / k as f64;
        if change < GAMMA_THRESHOLD {
            break;
        }
    }

    let sstats = doc
        .iter()
        .zip(&phinorm)
        .map(|(&(term, count), norm)| {
            let per_topic = exp_elog_theta.iter().map(|t| t * count / norm).collect();
            (term, per_topic)
        })
        .collect();

    (gamma, sstats)
}

fn phi_norm(doc: &[(usize, f64)], exp_elog_theta: &[f64], exp_elog_beta: &[Vec<f64>]) -> Vec<f64> {
    doc.iter()
        .map(|&(term, _)| {
            exp_elog_theta
                .iter()
                .enumerate()
                .map(|(topic, t)| t * exp_elog_beta[topic][term])
                .sum::<f64>()
                + 1e-100
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(topic_count: usize) -> HyperParams {
        HyperParams {
            topic_count,
            iteration_budget: 1,
            encoding: EncodingKind::Count,
        }
    }

    #[test]
    fn test_topic_terms_normalized() {
        let lambda = vec![vec![3.0, 1.0, 0.0], vec![0.5, 0.5, 1.0]];
        let model = TrainedModel::from_parts(params(2), 7, vec![0.5, 0.5], lambda, vec![]);
        for row in model.topic_terms() {
            assert_relative_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
        assert_eq!(model.top_terms(0, 2), vec![(0, 0.75), (1, 0.25)]);
        assert_eq!(model.num_terms(), 3);
        assert_eq!(model.seed(), 7);
    }

    #[test]
    fn test_top_terms_tie_break() {
        let lambda = vec![vec![1.0, 2.0, 2.0]];
        let model = TrainedModel::from_parts(params(1), 0, vec![1.0], lambda, vec![]);
        let ids: Vec<usize> = model.top_terms(0, 3).into_iter().map(|(t, _)| t).collect();
        assert_eq!(ids, vec![1, 2, 0]);
    }

    #[test]
    fn test_infer_prefers_matching_topic() {
        let lambda = vec![vec![10.0, 10.0, 0.1, 0.1], vec![0.1, 0.1, 10.0, 10.0]];
        let model = TrainedModel::from_parts(params(2), 0, vec![0.5, 0.5], lambda, vec![]);
        let dist = model.infer(&[(2, 2.0), (3, 1.0)]);
        assert!(dist[1] > dist[0]);
        assert_relative_eq!(dist.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_argmax_ties_to_lowest() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), Some(1));
        assert_eq!(argmax(&[]), None);
    }
}
