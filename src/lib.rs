//! Topic discovery over earnings-call transcripts: normalize documents, build a
//! vocabulary, sweep LDA hyperparameters and keep the most coherent model.

pub mod audit;
pub mod coherence;
pub mod config;
pub mod corpus;
pub mod documents;
pub mod engine;
pub mod error;
pub mod lda;
pub mod lemma;
pub mod model;
pub mod normalize;
pub mod query;
pub mod selector;
pub mod sweep;
pub mod vocabulary;

pub use audit::{AuditRecord, AuditTrail};
pub use coherence::{CoherenceConfig, CoherenceEvaluator, CoherenceMeasure};
pub use config::EngineConfig;
pub use corpus::{encode, EncodedCorpus, EncodingKind};
pub use documents::{Document, DocumentUnit, SourceFormat};
pub use engine::{PreparedCorpus, TopicEngine};
pub use error::{Result, TopicError};
pub use lda::{LdaConfig, LdaTrainer};
pub use model::{HyperParams, TrainedModel};
pub use normalize::Normalizer;
pub use query::{query, Query, QueryHit};
pub use selector::select_best;
pub use sweep::{CancellationToken, RangeSpec, ResultTable, SearchOrchestrator, SweepGrid};
pub use vocabulary::{build_vocabulary, FilterPolicy, Vocabulary};
