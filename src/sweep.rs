//! Hyperparameter sweep: train and score every point of the grid.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audit::{AuditRecord, AuditTrail};
use crate::coherence::CoherenceEvaluator;
use crate::corpus::{encode, EncodedCorpus, EncodingKind};
use crate::error::{Result, TopicError};
use crate::lda::{LdaConfig, LdaTrainer};
use crate::model::{HyperParams, TrainedModel};
use crate::vocabulary::Vocabulary;

/// Shared flag for cooperative cancellation
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Upper bound on the number of tuples one sweep may train
pub const MAX_GRID_TUPLES: usize = 10_000;

/// Half-open `start..stop` stepped by `step`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub start: usize,
    pub stop: usize,
    pub step: usize,
}

impl RangeSpec {
    pub fn new(start: usize, stop: usize, step: usize) -> Self {
        RangeSpec { start, stop, step }
    }

    /// A range holding exactly one value
    pub fn single(value: usize) -> Self {
        RangeSpec::new(value, value + 1, 1)
    }

    /// Number of values, computed without materializing them
    pub fn len(&self) -> usize {
        if self.step == 0 || self.start >= self.stop {
            return 0;
        }
        (self.stop - self.start - 1) / self.step + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn values(&self) -> Vec<usize> {
        if self.step == 0 {
            return Vec::new();
        }
        (self.start..self.stop).step_by(self.step).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepGrid {
    pub topic_counts: RangeSpec,
    pub iterations: RangeSpec,
    pub encodings: Vec<EncodingKind>,
}

impl SweepGrid {
    /// Every tuple, ordered by topic count, then iterations, then encoding
    pub fn tuples(&self) -> Vec<HyperParams> {
        let mut encodings = self.encodings.clone();
        encodings.sort();
        encodings.dedup();

        let mut tuples = Vec::new();
        for topic_count in self.topic_counts.values() {
            for iteration_budget in self.iterations.values() {
                for &encoding in &encodings {
                    tuples.push(HyperParams {
                        topic_count,
                        iteration_budget,
                        encoding,
                    });
                }
            }
        }
        tuples
    }

    /// Reject grids that could never produce a model
    pub fn validate(&self) -> Result<()> {
        for (name, range) in [("num_topics", self.topic_counts), ("num_passes", self.iterations)] {
            if range.step == 0 {
                return Err(TopicError::ConfigValidation(format!("{} step must be positive", name)));
            }
            if range.start == 0 {
                return Err(TopicError::ConfigValidation(format!("{} must start at 1 or more", name)));
            }
            if range.start >= range.stop {
                return Err(TopicError::ConfigValidation(format!(
                    "{} range {}..{} is empty",
                    name, range.start, range.stop
                )));
            }
        }
        if self.encodings.is_empty() {
            return Err(TopicError::ConfigValidation(
                "corpus_types must name at least one encoding".into(),
            ));
        }

        for (name, range) in [("num_topics", self.topic_counts), ("num_passes", self.iterations)] {
            if range.len() > MAX_GRID_TUPLES {
                return Err(TopicError::ConfigValidation(format!(
                    "{} range yields {} values, more than the {} tuples a sweep allows",
                    name,
                    range.len(),
                    MAX_GRID_TUPLES
                )));
            }
        }
        let mut encodings = self.encodings.clone();
        encodings.sort();
        encodings.dedup();
        let total = self.topic_counts.len() * self.iterations.len() * encodings.len();
        if total > MAX_GRID_TUPLES {
            return Err(TopicError::ConfigValidation(format!(
                "num_topics x num_passes x corpus_types yields {} tuples, more than {}",
                total, MAX_GRID_TUPLES
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Succeeded { model: TrainedModel, coherence: f64 },
    Failed { reason: String },
    /// Never started because the sweep was cancelled
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SweepEntry {
    pub seed: u64,
    pub duration: Duration,
    pub outcome: Outcome,
}

impl SweepEntry {
    pub fn coherence(&self) -> Option<f64> {
        match &self.outcome {
            Outcome::Succeeded { coherence, .. } => Some(*coherence),
            _ => None,
        }
    }

    pub fn model(&self) -> Option<&TrainedModel> {
        match &self.outcome {
            Outcome::Succeeded { model, .. } => Some(model),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded { .. })
    }
}

/// Every evaluated tuple and what came of it
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    entries: BTreeMap<HyperParams, SweepEntry>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, params: HyperParams, entry: SweepEntry) {
        self.entries.insert(params, entry);
    }

    pub fn get(&self, params: &HyperParams) -> Option<&SweepEntry> {
        self.entries.get(params)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HyperParams, &SweepEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn successes(&self) -> usize {
        self.entries.values().filter(|e| e.is_success()).count()
    }
}

/// Reported after every finished tuple
#[derive(Debug, Clone)]
pub struct SweepProgress {
    pub params: HyperParams,
    pub completed: usize,
    pub total: usize,
    pub coherence: Option<f64>,
}

type ProgressCallback = Box<dyn Fn(&SweepProgress) + Send + Sync>;

/// Derive a per-tuple seed from the base seed (splitmix64 finalizer)
pub fn tuple_seed(base: u64, params: &HyperParams) -> u64 {
    let encoding = match params.encoding {
        EncodingKind::Count => 0u64,
        EncodingKind::Weighted => 1u64,
    };
    let mut z = base
        ^ (params.topic_count as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (params.iteration_budget as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
        ^ encoding.wrapping_mul(0x1656_67B1_9E37_79F9);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub struct SearchOrchestrator {
    lda: LdaConfig,
    evaluator: CoherenceEvaluator,
    base_seed: u64,
    workers: Option<usize>,
    cancel: CancellationToken,
    audit: Option<Arc<AuditTrail>>,
    progress: Option<ProgressCallback>,
}

impl SearchOrchestrator {
    pub fn new(evaluator: CoherenceEvaluator, base_seed: u64) -> Self {
        SearchOrchestrator {
            lda: LdaConfig::default(),
            evaluator,
            base_seed,
            workers: None,
            cancel: CancellationToken::new(),
            audit: None,
            progress: None,
        }
    }

    pub fn lda_config(mut self, config: LdaConfig) -> Self {
        self.lda = config;
        self
    }

    /// Size of the worker pool; `None` uses rayon's global pool
    pub fn workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn audit(mut self, audit: Arc<AuditTrail>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SweepProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Encode the corpus, then sweep the grid.
    pub fn sweep(
        &self,
        sequences: &[Vec<String>],
        vocabulary: &Vocabulary,
        grid: &SweepGrid,
    ) -> Result<ResultTable> {
        if sequences.is_empty() {
            return Err(TopicError::ConfigValidation(
                "cannot sweep an empty corpus".into(),
            ));
        }
        grid.validate()?;
        let corpus = encode(sequences, vocabulary)?;
        self.sweep_encoded(sequences, vocabulary, &corpus, grid)
    }

    /// Sweep the grid over an already encoded corpus.
    pub fn sweep_encoded(
        &self,
        sequences: &[Vec<String>],
        vocabulary: &Vocabulary,
        corpus: &EncodedCorpus,
        grid: &SweepGrid,
    ) -> Result<ResultTable> {
        if sequences.is_empty() || corpus.is_empty() {
            return Err(TopicError::ConfigValidation(
                "cannot sweep an empty corpus".into(),
            ));
        }
        if sequences.len() != corpus.len() {
            return Err(TopicError::ConfigValidation(format!(
                "{} token sequences but {} encoded documents",
                sequences.len(),
                corpus.len()
            )));
        }
        grid.validate()?;

        let tuples = grid.tuples();
        let total = tuples.len();
        info!("Sweeping {} hyperparameter tuples over {} documents", total, corpus.len());

        let table = Mutex::new(ResultTable::new());
        let completed = Mutex::new(0usize);

        let run = || {
            tuples.par_iter().for_each(|params| {
                let entry = self.evaluate(params, sequences, vocabulary, corpus);
                let coherence = entry.coherence();
                self.record_audit(params, &entry);

                let done = {
                    let mut table = table.lock().unwrap_or_else(|e| e.into_inner());
                    table.insert(*params, entry);
                    let mut count = completed.lock().unwrap_or_else(|e| e.into_inner());
                    *count += 1;
                    *count
                };

                if let Some(callback) = &self.progress {
                    callback(&SweepProgress {
                        params: *params,
                        completed: done,
                        total,
                        coherence,
                    });
                }
            })
        };

        match self.workers {
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| TopicError::ConfigValidation(format!("worker pool: {}", e)))?;
                pool.install(run);
            }
            None => run(),
        }

        let table = table.into_inner().unwrap_or_else(|e| e.into_inner());
        info!(
            "Sweep finished: {} of {} tuples succeeded",
            table.successes(),
            table.len()
        );
        Ok(table)
    }

    fn evaluate(
        &self,
        params: &HyperParams,
        sequences: &[Vec<String>],
        vocabulary: &Vocabulary,
        corpus: &EncodedCorpus,
    ) -> SweepEntry {
        let seed = tuple_seed(self.base_seed, params);
        if self.cancel.is_cancelled() {
            return SweepEntry {
                seed,
                duration: Duration::ZERO,
                outcome: Outcome::Cancelled,
            };
        }

        let started = Instant::now();
        let trainer = LdaTrainer::new(self.lda.clone()).with_cancellation(self.cancel.clone());
        let result = trainer
            .train(
                corpus.get(params.encoding),
                vocabulary,
                params.topic_count,
                params.iteration_budget,
                seed,
            )
            .and_then(|model| {
                let coherence = self.evaluator.score(&model, sequences, vocabulary)?;
                if coherence.is_nan() {
                    return Err(TopicError::InsufficientData("coherence is NaN".into()));
                }
                Ok((model, coherence))
            });
        let duration = started.elapsed();

        let outcome = match result {
            Ok((model, coherence)) => {
                info!("Built model: {} - coherence {:.4}", params, coherence);
                Outcome::Succeeded { model, coherence }
            }
            Err(TopicError::Cancelled) => Outcome::Cancelled,
            Err(e) => {
                warn!("Tuple {} failed: {}", params, e);
                Outcome::Failed {
                    reason: format!("{}: {}", e.kind(), e),
                }
            }
        };

        SweepEntry {
            seed,
            duration,
            outcome,
        }
    }

    fn record_audit(&self, params: &HyperParams, entry: &SweepEntry) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.record(&AuditRecord::from_entry(params, entry)) {
                warn!("Could not write audit line for {}: {}", params, e);
            }
        }
    }
}
