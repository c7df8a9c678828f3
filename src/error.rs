//! Error types for the topic engine

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, TopicError>;

/// Everything that can go wrong between reading documents and selecting a model
#[derive(Error, Debug)]
pub enum TopicError {
    /// Malformed or missing configuration; raised before any work starts
    #[error("invalid configuration: {0}")]
    ConfigValidation(String),

    /// A document normalized to zero tokens
    #[error("document {document} is empty after normalization")]
    EmptyDocument { document: String },

    /// Extremes filtering removed every term
    #[error("vocabulary is empty after filtering {documents} documents")]
    EmptyVocabulary { documents: usize },

    #[error("corpus contains no documents")]
    EmptyCorpus,

    #[error("invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),

    /// Coherence is undefined for the model's topics
    #[error("insufficient data for coherence: {0}")]
    InsufficientData(String),

    #[error("no successful model among {entries} sweep entries")]
    NoSuccessfulModel { entries: usize },

    /// A corpus encoding refers to a term the vocabulary does not know
    #[error("term id {term_id} does not resolve in a vocabulary of {vocabulary_size} terms")]
    VocabularyMismatch {
        term_id: usize,
        vocabulary_size: usize,
    },

    /// A query document shares no term with the model's vocabulary
    #[error("document {document} has no terms in the model vocabulary")]
    OutOfVocabulary { document: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("pattern error: {0}")]
    Regex(#[from] regex::Error),
}

impl TopicError {
    /// Short machine-friendly name used in audit lines
    pub fn kind(&self) -> &'static str {
        match self {
            TopicError::ConfigValidation(_) => "config_validation",
            TopicError::EmptyDocument { .. } => "empty_document",
            TopicError::EmptyVocabulary { .. } => "empty_vocabulary",
            TopicError::EmptyCorpus => "empty_corpus",
            TopicError::InvalidHyperparameter(_) => "invalid_hyperparameter",
            TopicError::InsufficientData(_) => "insufficient_data",
            TopicError::NoSuccessfulModel { .. } => "no_successful_model",
            TopicError::VocabularyMismatch { .. } => "vocabulary_mismatch",
            TopicError::OutOfVocabulary { .. } => "out_of_vocabulary",
            TopicError::Cancelled => "cancelled",
            TopicError::Io(_) => "io",
            TopicError::Csv(_) => "csv",
            TopicError::Json(_) => "json",
            TopicError::Regex(_) => "regex",
        }
    }
}
