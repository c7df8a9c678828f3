//! Latent Dirichlet Allocation fit by batch variational Bayes.
//!
//! Each pass runs the per-document E-step over the whole corpus and then the
//! M-step `lambda = eta + sstats`. Initialization is seeded so that the same
//! hyperparameters and seed always reproduce the same model.

use rand::prelude::*;
use rand_distr::Gamma;
use rayon::prelude::*;
use tracing::debug;

use crate::corpus::CorpusEncoding;
use crate::error::{Result, TopicError};
use crate::model::{e_step_document, exp_elog_beta, normalize, HyperParams, TrainedModel};
use crate::sweep::CancellationToken;
use crate::vocabulary::Vocabulary;

/// Extra weight a seed document puts on its terms in the initial topic
const SEED_DOCUMENT_WEIGHT: f64 = 10.0;

/// Training priors. `None` means the symmetric default 1 / topic_count.
#[derive(Debug, Clone, Default)]
pub struct LdaConfig {
    pub alpha: Option<f64>,
    pub eta: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct LdaTrainer {
    config: LdaConfig,
    cancel: Option<CancellationToken>,
}

impl LdaTrainer {
    pub fn new(config: LdaConfig) -> Self {
        LdaTrainer {
            config,
            cancel: None,
        }
    }

    /// Abort between passes once the token is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Train one model over `corpus`.
    pub fn train(
        &self,
        corpus: &CorpusEncoding,
        vocabulary: &Vocabulary,
        topic_count: usize,
        iteration_budget: usize,
        seed: u64,
    ) -> Result<TrainedModel> {
        self.check_preconditions(corpus, vocabulary, topic_count, iteration_budget)?;

        let k = topic_count;
        let v = vocabulary.len();
        let alpha_value = self.config.alpha.unwrap_or(1.0 / k as f64);
        let eta = self.config.eta.unwrap_or(1.0 / k as f64);
        if alpha_value <= 0.0 || eta <= 0.0 {
            return Err(TopicError::InvalidHyperparameter(
                "alpha and eta must be positive".into(),
            ));
        }
        let alpha = vec![alpha_value; k];

        let mut rng = StdRng::seed_from_u64(seed);
        let mut lambda = initial_lambda(corpus, k, v, &mut rng)?;

        for pass in 0..iteration_budget {
            if self.is_cancelled() {
                return Err(TopicError::Cancelled);
            }

            let expected = exp_elog_beta(&lambda);
            let results: Vec<_> = corpus
                .docs
                .par_iter()
                .map(|doc| e_step_document(doc, &alpha, &expected))
                .collect();

            // Summed in document order so results do not depend on thread scheduling
            let mut sstats = vec![vec![0.0; v]; k];
            for (_, doc_stats) in &results {
                for (term, per_topic) in doc_stats {
                    for (topic, value) in per_topic.iter().enumerate() {
                        sstats[topic][*term] += value;
                    }
                }
            }
            for topic in 0..k {
                for term in 0..v {
                    lambda[topic][term] = eta + sstats[topic][term] * expected[topic][term];
                }
            }

            debug!(
                "pass {}/{} done for {} topics over {} documents",
                pass + 1,
                iteration_budget,
                k,
                corpus.len()
            );
        }

        let expected = exp_elog_beta(&lambda);
        let doc_topics: Vec<Vec<f64>> = corpus
            .docs
            .par_iter()
            .map(|doc| normalize(&e_step_document(doc, &alpha, &expected).0))
            .collect();

        let params = HyperParams {
            topic_count,
            iteration_budget,
            encoding: corpus.kind,
        };
        Ok(TrainedModel::from_parts(params, seed, alpha, lambda, doc_topics))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn check_preconditions(
        &self,
        corpus: &CorpusEncoding,
        vocabulary: &Vocabulary,
        topic_count: usize,
        iteration_budget: usize,
    ) -> Result<()> {
        if topic_count == 0 {
            return Err(TopicError::InvalidHyperparameter(
                "topic count must be at least 1".into(),
            ));
        }
        if iteration_budget == 0 {
            return Err(TopicError::InvalidHyperparameter(
                "iteration budget must be at least 1".into(),
            ));
        }
        if corpus.is_empty() {
            return Err(TopicError::InvalidHyperparameter("corpus is empty".into()));
        }
        if vocabulary.is_empty() {
            return Err(TopicError::InvalidHyperparameter("vocabulary is empty".into()));
        }
        if topic_count > vocabulary.len() {
            return Err(TopicError::InvalidHyperparameter(format!(
                "topic count {} exceeds the {} distinct terms",
                topic_count,
                vocabulary.len()
            )));
        }
        for doc in &corpus.docs {
            if let Some(&(term_id, _)) = doc.iter().find(|(term, _)| *term >= vocabulary.len()) {
                return Err(TopicError::VocabularyMismatch {
                    term_id,
                    vocabulary_size: vocabulary.len(),
                });
            }
        }
        Ok(())
    }
}

/// Gamma(100, 1/100) noise plus farthest-first document seeding.
///
/// The first seed document is drawn at random; each following topic is seeded
/// with the document least similar to the ones already chosen.
fn initial_lambda(
    corpus: &CorpusEncoding,
    k: usize,
    v: usize,
    rng: &mut StdRng,
) -> Result<Vec<Vec<f64>>> {
    let noise = Gamma::new(100.0, 0.01)
        .map_err(|e| TopicError::InvalidHyperparameter(format!("gamma prior: {}", e)))?;
    let mut lambda = vec![vec![0.0; v]; k];
    for row in lambda.iter_mut() {
        for value in row.iter_mut() {
            *value = noise.sample(rng);
        }
    }

    let candidates: Vec<usize> = (0..corpus.len())
        .filter(|&d| !corpus.docs[d].is_empty())
        .collect();
    if candidates.is_empty() {
        return Ok(lambda);
    }

    let mut seeds: Vec<usize> = vec![candidates[rng.gen_range(0..candidates.len())]];
    while seeds.len() < k.min(candidates.len()) {
        let next = candidates
            .iter()
            .filter(|d| !seeds.contains(*d))
            .map(|&d| {
                let closest = seeds
                    .iter()
                    .map(|&s| cosine(&corpus.docs[d], &corpus.docs[s]))
                    .fold(f64::NEG_INFINITY, f64::max);
                (d, closest)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(d, _)| d);
        match next {
            Some(d) => seeds.push(d),
            None => break,
        }
    }

    for (topic, &doc) in seeds.iter().enumerate() {
        let max_weight = corpus.docs[doc]
            .iter()
            .map(|(_, w)| *w)
            .fold(0.0, f64::max);
        if max_weight <= 0.0 {
            continue;
        }
        for &(term, weight) in &corpus.docs[doc] {
            lambda[topic][term] += SEED_DOCUMENT_WEIGHT * weight / max_weight;
        }
    }

    Ok(lambda)
}

fn cosine(a: &[(usize, f64)], b: &[(usize, f64)]) -> f64 {
    let (mut i, mut j, mut dot) = (0, 0, 0.0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    let na = a.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    let nb = b.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::encode;
    use crate::vocabulary::{build_vocabulary, FilterPolicy};
    use approx::assert_relative_eq;

    fn two_theme_corpus() -> (Vec<Vec<String>>, Vocabulary) {
        let raw = [
            "bank loan credit bank loan",
            "loan credit bank credit",
            "bank credit loan",
            "game team score team",
            "score game team game",
            "team score game",
        ];
        let seqs: Vec<Vec<String>> = raw
            .iter()
            .map(|d| d.split_whitespace().map(|s| s.to_string()).collect())
            .collect();
        let vocab = build_vocabulary(&seqs, &FilterPolicy::keep_all()).unwrap();
        (seqs, vocab)
    }

    #[test]
    fn test_separates_themes() {
        let (seqs, vocab) = two_theme_corpus();
        let corpus = encode(&seqs, &vocab).unwrap();
        let model = LdaTrainer::default()
            .train(&corpus.count, &vocab, 2, 10, 42)
            .unwrap();

        let dominant: Vec<usize> = (0..6).map(|d| model.dominant_topic(d).unwrap()).collect();
        assert_eq!(dominant[0], dominant[1]);
        assert_eq!(dominant[1], dominant[2]);
        assert_eq!(dominant[3], dominant[4]);
        assert_eq!(dominant[4], dominant[5]);
        assert_ne!(dominant[0], dominant[3]);

        for dist in model.doc_topics() {
            assert_relative_eq!(dist.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_same_seed_reproduces_model() {
        let (seqs, vocab) = two_theme_corpus();
        let corpus = encode(&seqs, &vocab).unwrap();
        let trainer = LdaTrainer::default();
        let a = trainer.train(&corpus.weighted, &vocab, 3, 4, 7).unwrap();
        let b = trainer.train(&corpus.weighted, &vocab, 3, 4, 7).unwrap();
        assert_eq!(a.topic_terms(), b.topic_terms());
        assert_eq!(a.doc_topics(), b.doc_topics());
        assert_eq!(a.params().encoding, crate::corpus::EncodingKind::Weighted);
    }

    #[test]
    fn test_invalid_hyperparameters() {
        let (seqs, vocab) = two_theme_corpus();
        let corpus = encode(&seqs, &vocab).unwrap();
        let trainer = LdaTrainer::default();

        for (k, passes) in [(0, 5), (2, 0), (vocab.len() + 1, 5)] {
            let err = trainer.train(&corpus.count, &vocab, k, passes, 1).unwrap_err();
            assert!(matches!(err, TopicError::InvalidHyperparameter(_)));
        }
    }

    #[test]
    fn test_cancelled_before_first_pass() {
        let (seqs, vocab) = two_theme_corpus();
        let corpus = encode(&seqs, &vocab).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = LdaTrainer::default()
            .with_cancellation(token)
            .train(&corpus.count, &vocab, 2, 3, 1)
            .unwrap_err();
        assert!(matches!(err, TopicError::Cancelled));
    }

    #[test]
    fn test_cosine() {
        assert_relative_eq!(cosine(&[(0, 1.0), (2, 1.0)], &[(0, 1.0), (2, 1.0)]), 1.0);
        assert_relative_eq!(cosine(&[(0, 1.0)], &[(1, 1.0)]), 0.0);
    }
}
