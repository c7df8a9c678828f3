//! Ranked topic assignments for a new document or a sample of the corpus

use rand::prelude::*;
use rand::seq::index;
use tracing::warn;

use crate::corpus::EncodedCorpus;
use crate::error::{Result, TopicError};
use crate::model::TrainedModel;
use crate::normalize::Normalizer;
use crate::vocabulary::Vocabulary;

pub const DEFAULT_SAMPLE_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Raw text, normalized and encoded like the training corpus
    Document(String),
    /// This many distinct corpus documents drawn at random
    Sample(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    /// Corpus index for sampled documents, `None` for ad-hoc text
    pub document: Option<usize>,
    /// (topic id, score), best first
    pub topics: Vec<(usize, f64)>,
}

/// Sort a topic distribution by descending score, ties by ascending topic id
pub fn rank_topics(distribution: &[f64]) -> Vec<(usize, f64)> {
    let mut ranked: Vec<(usize, f64)> = distribution.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}

impl QueryHit {
    /// The best-ranked topic with its top `n` terms rendered for display
    pub fn lead_topic(
        &self,
        model: &TrainedModel,
        vocabulary: &Vocabulary,
        n: usize,
    ) -> Option<(usize, String)> {
        let &(topic, _) = self.topics.first()?;
        Some((topic, model.format_topic(topic, n, vocabulary)))
    }
}

pub fn query(
    model: &TrainedModel,
    vocabulary: &Vocabulary,
    corpus: &EncodedCorpus,
    normalizer: &Normalizer,
    request: &Query,
    seed: u64,
) -> Result<Vec<QueryHit>> {
    match request {
        Query::Document(text) => {
            let tokens = normalizer.normalize_document("query", text)?;
            let vector = corpus.encode_document(&tokens, vocabulary, model.params().encoding);
            if vector.is_empty() {
                warn!("Query tokens {:?} carry no weight in the model vocabulary", tokens);
                return Err(TopicError::OutOfVocabulary {
                    document: "query".to_string(),
                });
            }
            Ok(vec![QueryHit {
                document: None,
                topics: rank_topics(&model.infer(&vector)),
            }])
        }
        Query::Sample(size) => {
            let available = model.doc_topics().len();
            let amount = (*size).min(available);
            let mut rng = StdRng::seed_from_u64(seed);
            let mut picked = index::sample(&mut rng, available, amount).into_vec();
            picked.sort_unstable();
            Ok(picked
                .into_iter()
                .map(|doc| QueryHit {
                    document: Some(doc),
                    topics: rank_topics(&model.doc_topics()[doc]),
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::encode;
    use crate::lda::LdaTrainer;
    use crate::vocabulary::{build_vocabulary, FilterPolicy};

    fn fixture() -> (Normalizer, Vocabulary, EncodedCorpus, TrainedModel) {
        let normalizer = Normalizer::new(3).unwrap();
        let raw = [
            "bank loans credit bank",
            "credit loans bank",
            "football team scored",
            "team football scored goals",
        ];
        let seqs: Vec<Vec<String>> = raw.iter().map(|d| normalizer.normalize(d).unwrap()).collect();
        let vocab = build_vocabulary(&seqs, &FilterPolicy::keep_all()).unwrap();
        let corpus = encode(&seqs, &vocab).unwrap();
        let model = LdaTrainer::default()
            .train(&corpus.count, &vocab, 2, 10, 3)
            .unwrap();
        (normalizer, vocab, corpus, model)
    }

    #[test]
    fn test_rank_topics_tie_break() {
        let ranked = rank_topics(&[0.25, 0.5, 0.25]);
        assert_eq!(ranked, vec![(1, 0.5), (0, 0.25), (2, 0.25)]);
    }

    #[test]
    fn test_document_query_matches_training_topic() {
        let (normalizer, vocab, corpus, model) = fixture();
        let hits = query(
            &model,
            &vocab,
            &corpus,
            &normalizer,
            &Query::Document("The bank extended credit".into()),
            0,
        )
        .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document, None);
        assert_eq!(Some(hits[0].topics[0].0), model.dominant_topic(0));
        assert!(hits[0].topics[0].1 >= hits[0].topics[1].1);

        let (lead, terms) = hits[0].lead_topic(&model, &vocab, 10).unwrap();
        assert_eq!(lead, hits[0].topics[0].0);
        assert!(terms.contains("*\"bank\""), "{}", terms);
    }

    #[test]
    fn test_sample_query() {
        let (normalizer, vocab, corpus, model) = fixture();
        let hits = query(&model, &vocab, &corpus, &normalizer, &Query::Sample(3), 11).unwrap();
        assert_eq!(hits.len(), 3);
        let again = query(&model, &vocab, &corpus, &normalizer, &Query::Sample(3), 11).unwrap();
        assert_eq!(hits, again);

        let all = query(&model, &vocab, &corpus, &normalizer, &Query::Sample(50), 11).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_unknown_terms_are_not_ranked() {
        let (normalizer, vocab, corpus, model) = fixture();
        let err = query(
            &model,
            &vocab,
            &corpus,
            &normalizer,
            &Query::Document("zebra giraffe elephant".into()),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, TopicError::OutOfVocabulary { .. }));
        assert_eq!(err.kind(), "out_of_vocabulary");
    }

    #[test]
    fn test_empty_query_document() {
        let (normalizer, vocab, corpus, model) = fixture();
        let err = query(
            &model,
            &vocab,
            &corpus,
            &normalizer,
            &Query::Document("the and of".into()),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, TopicError::EmptyDocument { .. }));
    }
}
