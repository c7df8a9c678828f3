//! The full pipeline behind one configuration

use std::sync::Arc;

use tracing::{info, warn};

use crate::audit::AuditTrail;
use crate::coherence::CoherenceEvaluator;
use crate::config::EngineConfig;
use crate::corpus::{encode, EncodedCorpus};
use crate::documents::{load_csv, load_transcripts, Document, SourceFormat};
use crate::error::{Result, TopicError};
use crate::model::TrainedModel;
use crate::normalize::Normalizer;
use crate::query::{query, Query, QueryHit};
use crate::sweep::{CancellationToken, ResultTable, SearchOrchestrator, SweepProgress};
use crate::vocabulary::{build_vocabulary, Vocabulary};

/// Documents that survived normalization, with their vocabulary and encodings
#[derive(Debug, Clone)]
pub struct PreparedCorpus {
    pub documents: Vec<Document>,
    pub sequences: Vec<Vec<String>>,
    pub vocabulary: Vocabulary,
    pub corpus: EncodedCorpus,
}

impl PreparedCorpus {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[derive(Debug)]
pub struct TopicEngine {
    config: EngineConfig,
    normalizer: Normalizer,
}

impl TopicEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let normalizer = Normalizer::new(config.min_token_length)?;
        Ok(TopicEngine { config, normalizer })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn load_documents(&self) -> Result<Vec<Document>> {
        match self.config.source {
            SourceFormat::Csv => load_csv(
                &self.config.data,
                &self.config.docs_field,
                self.config.id_field.as_deref(),
            ),
            SourceFormat::Transcripts => load_transcripts(&self.config.data, self.config.document_unit),
        }
    }

    /// Normalize, build the vocabulary, encode. Documents with no tokens left are skipped.
    pub fn prepare(&self, documents: Vec<Document>) -> Result<PreparedCorpus> {
        let total = documents.len();
        let mut kept = Vec::with_capacity(total);
        let mut sequences = Vec::with_capacity(total);

        for document in documents {
            match self.normalizer.normalize_document(&document.id, &document.text) {
                Ok(tokens) => {
                    sequences.push(tokens);
                    kept.push(document);
                }
                Err(TopicError::EmptyDocument { document }) => {
                    warn!("Skipping document {}: no tokens after normalization", document);
                }
                Err(e) => return Err(e),
            }
        }
        if kept.is_empty() {
            return Err(TopicError::EmptyCorpus);
        }
        info!("Normalized {} of {} documents", kept.len(), total);

        let vocabulary = build_vocabulary(&sequences, &self.config.vocabulary)?;
        let corpus = encode(&sequences, &vocabulary)?;
        Ok(PreparedCorpus {
            documents: kept,
            sequences,
            vocabulary,
            corpus,
        })
    }

    pub fn orchestrator(&self) -> SearchOrchestrator {
        SearchOrchestrator::new(CoherenceEvaluator::new(self.config.coherence), self.config.seed)
            .workers(self.config.workers)
            .on_progress(|progress: &SweepProgress| {
                info!(
                    "[{}/{}] {} coherence={}",
                    progress.completed,
                    progress.total,
                    progress.params,
                    progress
                        .coherence
                        .map(|c| format!("{:.4}", c))
                        .unwrap_or_else(|| "-".to_string())
                );
            })
    }

    /// Sweep the configured grid
    pub fn sweep(
        &self,
        prepared: &PreparedCorpus,
        cancel: CancellationToken,
        audit: Option<Arc<AuditTrail>>,
    ) -> Result<ResultTable> {
        let mut orchestrator = self.orchestrator().cancellation(cancel);
        if let Some(audit) = audit {
            info!("Auditing to {}", audit.path().display());
            orchestrator = orchestrator.audit(audit);
        }
        orchestrator.sweep_encoded(
            &prepared.sequences,
            &prepared.vocabulary,
            &prepared.corpus,
            &self.config.grid(),
        )
    }

    pub fn query(
        &self,
        prepared: &PreparedCorpus,
        model: &TrainedModel,
        request: &Query,
    ) -> Result<Vec<QueryHit>> {
        query(
            model,
            &prepared.vocabulary,
            &prepared.corpus,
            &self.normalizer,
            request,
            self.config.seed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TopicEngine {
        let config = EngineConfig::from_json_str(
            r#"{
                "data": "unused.csv",
                "docs_field": "text",
                "num_topics": [2, 3, 1],
                "num_passes": [5, 6, 1],
                "corpus_types": ["count"],
                "min_token_length": 3,
                "vocabulary": {"no_below": 1, "no_above": 1.0, "keep_n": null}
            }"#,
        )
        .unwrap();
        TopicEngine::new(config).unwrap()
    }

    #[test]
    fn test_prepare_skips_empty_documents() {
        let prepared = engine()
            .prepare(vec![
                Document::new("a", "revenue growth quarter"),
                Document::new("b", "<p>the and of</p>"),
                Document::new("c", "football season results"),
            ])
            .unwrap();
        assert_eq!(prepared.len(), 2);
        assert_eq!(prepared.documents[1].id, "c");
        assert_eq!(prepared.corpus.len(), 2);
    }

    #[test]
    fn test_prepare_all_empty() {
        let err = engine()
            .prepare(vec![Document::new("a", "123 456"), Document::new("b", "")])
            .unwrap_err();
        assert!(matches!(err, TopicError::EmptyCorpus));
    }
}
