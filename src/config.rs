//! Engine configuration, read from a JSON file and validated up front

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::coherence::{CoherenceConfig, CoherenceMeasure};
use crate::corpus::EncodingKind;
use crate::documents::{DocumentUnit, SourceFormat};
use crate::error::{Result, TopicError};
use crate::query::DEFAULT_SAMPLE_SIZE;
use crate::sweep::{RangeSpec, SweepGrid};
use crate::vocabulary::FilterPolicy;

pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Document source, relative paths resolved against the config file
    pub data: PathBuf,
    pub source: SourceFormat,
    pub docs_field: String,
    pub id_field: Option<String>,
    pub document_unit: DocumentUnit,
    pub num_topics: RangeSpec,
    pub num_passes: RangeSpec,
    pub corpus_types: Vec<EncodingKind>,
    pub min_token_length: usize,
    pub vocabulary: FilterPolicy,
    pub coherence: CoherenceConfig,
    pub seed: u64,
    pub sample_size: usize,
    pub workers: Option<usize>,
    pub audit_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            TopicError::ConfigValidation(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_json_str(&text)?;
        if config.data.is_relative() {
            if let Some(dir) = path.parent() {
                config.data = dir.join(&config.data);
            }
        }
        if let (Some(audit), Some(dir)) = (&config.audit_path, path.parent()) {
            if audit.is_relative() {
                config.audit_path = Some(dir.join(audit));
            }
        }
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| TopicError::ConfigValidation(format!("not valid JSON: {}", e)))?;
        let Value::Object(fields) = value else {
            return Err(TopicError::ConfigValidation(
                "top level must be a JSON object".into(),
            ));
        };
        let raw = RawConfig { fields };

        let num_topics = raw.range("num_topics")?;
        let num_passes = raw.range("num_passes")?;
        let corpus_types = raw.encodings()?;
        let grid = SweepGrid {
            topic_counts: num_topics,
            iterations: num_passes,
            encodings: corpus_types.clone(),
        };
        grid.validate()?;

        let min_token_length = raw
            .opt_usize("min_token_length")?
            .ok_or_else(|| TopicError::ConfigValidation("min_token_length: missing".into()))?;
        if min_token_length == 0 {
            return Err(TopicError::ConfigValidation(
                "min_token_length must be at least 1".into(),
            ));
        }

        let sample_size = raw.opt_usize("sample_size")?.unwrap_or(DEFAULT_SAMPLE_SIZE);
        let workers = raw.opt_usize("workers")?;
        if workers == Some(0) {
            return Err(TopicError::ConfigValidation(
                "workers must be at least 1 when set".into(),
            ));
        }

        let source = raw.source()?;
        // Transcript batches carry their text in `call_body`
        let docs_field = match (raw.opt_string_alias("docs_field", "docs")?, source) {
            (Some(field), _) => field,
            (None, SourceFormat::Transcripts) => "call_body".to_string(),
            (None, SourceFormat::Csv) => {
                return Err(TopicError::ConfigValidation("docs_field: missing".into()))
            }
        };

        Ok(EngineConfig {
            data: PathBuf::from(raw.string("data")?),
            source,
            docs_field,
            id_field: raw.opt_string("id_field")?,
            document_unit: raw.document_unit()?,
            num_topics,
            num_passes,
            corpus_types,
            min_token_length,
            vocabulary: raw.vocabulary()?,
            coherence: raw.coherence()?,
            seed: raw.opt_u64("seed")?.unwrap_or(DEFAULT_SEED),
            sample_size,
            workers,
            audit_path: raw.opt_string("audit_path")?.map(PathBuf::from),
        })
    }

    pub fn grid(&self) -> SweepGrid {
        SweepGrid {
            topic_counts: self.num_topics,
            iterations: self.num_passes,
            encodings: self.corpus_types.clone(),
        }
    }
}

/// The parsed JSON object before validation
struct RawConfig {
    fields: Map<String, Value>,
}

fn invalid(field: &str, expected: &str) -> TopicError {
    TopicError::ConfigValidation(format!("{}: expected {}", field, expected))
}

fn as_usize(field: &str, value: &Value) -> Result<usize> {
    value
        .as_u64()
        .map(|v| v as usize)
        .ok_or_else(|| invalid(field, "a non-negative integer"))
}

impl RawConfig {
    fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    fn string(&self, field: &str) -> Result<String> {
        self.opt_string(field)?
            .ok_or_else(|| TopicError::ConfigValidation(format!("{}: missing", field)))
    }

    fn opt_string(&self, field: &str) -> Result<Option<String>> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(Some(s.clone())),
            Some(_) => Err(invalid(field, "a non-empty string")),
        }
    }

    fn opt_string_alias(&self, field: &str, alias: &str) -> Result<Option<String>> {
        match self.opt_string(field)? {
            Some(s) => Ok(Some(s)),
            None => self.opt_string(alias),
        }
    }

    fn opt_usize(&self, field: &str) -> Result<Option<usize>> {
        self.get(field).map(|v| as_usize(field, v)).transpose()
    }

    fn opt_u64(&self, field: &str) -> Result<Option<u64>> {
        self.get(field)
            .map(|v| v.as_u64().ok_or_else(|| invalid(field, "a non-negative integer")))
            .transpose()
    }

    /// `[start, stop, step]`
    fn range(&self, field: &str) -> Result<RangeSpec> {
        let value = self
            .get(field)
            .ok_or_else(|| TopicError::ConfigValidation(format!("{}: missing", field)))?;
        let items = value
            .as_array()
            .filter(|items| items.len() == 3)
            .ok_or_else(|| invalid(field, "[start, stop, step], e.g. [1, 6, 2]"))?;
        let start = as_usize(field, &items[0])?;
        let stop = as_usize(field, &items[1])?;
        let step = as_usize(field, &items[2])?;
        Ok(RangeSpec::new(start, stop, step))
    }

    fn encodings(&self) -> Result<Vec<EncodingKind>> {
        let field = "corpus_types";
        let value = self
            .get(field)
            .or_else(|| self.get("corpus_type"))
            .ok_or_else(|| TopicError::ConfigValidation(format!("{}: missing", field)))?;
        let items = value
            .as_array()
            .ok_or_else(|| invalid(field, "a list of encodings"))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .and_then(EncodingKind::parse)
                    .ok_or_else(|| invalid(field, "\"count\"/\"bow\" or \"weighted\"/\"tfidf\""))
            })
            .collect()
    }

    fn source(&self) -> Result<SourceFormat> {
        match self.opt_string("source")?.as_deref() {
            None | Some("csv") => Ok(SourceFormat::Csv),
            Some("transcripts") => Ok(SourceFormat::Transcripts),
            Some(_) => Err(invalid("source", "\"csv\" or \"transcripts\"")),
        }
    }

    fn document_unit(&self) -> Result<DocumentUnit> {
        match self.opt_string("document_unit")?.as_deref() {
            None | Some("transcript") => Ok(DocumentUnit::Transcript),
            Some("speaker") => Ok(DocumentUnit::Speaker),
            Some(_) => Err(invalid("document_unit", "\"transcript\" or \"speaker\"")),
        }
    }

    fn vocabulary(&self) -> Result<FilterPolicy> {
        let Some(value) = self.get("vocabulary") else {
            return Ok(FilterPolicy::default());
        };
        let policy: FilterPolicy = serde_json::from_value(value.clone())
            .map_err(|e| TopicError::ConfigValidation(format!("vocabulary: {}", e)))?;
        if policy.no_below == 0 {
            return Err(invalid("vocabulary.no_below", "an integer of at least 1"));
        }
        if !(policy.no_above > 0.0 && policy.no_above <= 1.0) {
            return Err(invalid("vocabulary.no_above", "a fraction in (0, 1]"));
        }
        if policy.keep_n == Some(0) {
            return Err(invalid("vocabulary.keep_n", "a positive integer or null"));
        }
        Ok(policy)
    }

    fn coherence(&self) -> Result<CoherenceConfig> {
        let Some(value) = self.get("coherence") else {
            return Ok(CoherenceConfig::default());
        };
        let config: CoherenceConfig = serde_json::from_value(value.clone())
            .map_err(|e| TopicError::ConfigValidation(format!("coherence: {}", e)))?;
        if config.top_n < 2 {
            return Err(invalid("coherence.top_n", "an integer of at least 2"));
        }
        if config.window_size == Some(0) {
            return Err(invalid("coherence.window_size", "a positive integer or null"));
        }
        if config.measure == CoherenceMeasure::UMass && config.window_size.is_some() {
            return Err(TopicError::ConfigValidation(
                "coherence.window_size: u_mass counts whole documents".into(),
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"{
        "data": "calls.csv",
        "docs": "text",
        "num_topics": [1, 6, 2],
        "num_passes": [2, 8, 4],
        "corpus_type": ["bow", "tfidf"],
        "min_token_length": 3
    }"#;

    fn message(err: TopicError) -> String {
        match err {
            TopicError::ConfigValidation(msg) => msg,
            other => panic!("expected a configuration error, got {other}"),
        }
    }

    #[test]
    fn test_defaults_and_aliases() {
        let config = EngineConfig::from_json_str(MINIMAL).unwrap();
        assert_eq!(config.docs_field, "text");
        assert_eq!(config.source, SourceFormat::Csv);
        assert_eq!(config.corpus_types, vec![EncodingKind::Count, EncodingKind::Weighted]);
        assert_eq!(config.min_token_length, 3);
        assert_eq!(config.vocabulary, FilterPolicy::default());
        assert_eq!(config.coherence.measure, CoherenceMeasure::CV);
        assert_eq!(config.sample_size, 5);
        assert_eq!(config.grid().tuples().len(), 3 * 2 * 2);
    }

    #[test]
    fn test_full_config() {
        let config = EngineConfig::from_json_str(
            r#"{
                "data": "batch.json",
                "source": "transcripts",
                "document_unit": "speaker",
                "num_topics": [2, 3, 1],
                "num_passes": [5, 6, 1],
                "corpus_types": ["count"],
                "min_token_length": 2,
                "vocabulary": {"no_below": 1, "no_above": 1.0, "keep_n": null},
                "coherence": {"measure": "u_mass", "top_n": 5},
                "seed": 7,
                "workers": 2
            }"#,
        )
        .unwrap();
        assert_eq!(config.source, SourceFormat::Transcripts);
        assert_eq!(config.document_unit, DocumentUnit::Speaker);
        assert_eq!(config.vocabulary, FilterPolicy::keep_all());
        assert_eq!(config.coherence.top_n, 5);
        assert_eq!(config.seed, 7);
        assert_eq!(config.workers, Some(2));
    }

    #[test]
    fn test_errors_name_the_field() {
        let missing = MINIMAL.replace(r#""data": "calls.csv","#, "");
        assert!(message(EngineConfig::from_json_str(&missing).unwrap_err()).starts_with("data"));

        let bad_range = MINIMAL.replace("[1, 6, 2]", "[1, 6]");
        assert!(message(EngineConfig::from_json_str(&bad_range).unwrap_err()).starts_with("num_topics"));

        let empty_range = MINIMAL.replace("[2, 8, 4]", "[8, 2, 1]");
        assert!(message(EngineConfig::from_json_str(&empty_range).unwrap_err()).contains("num_passes"));

        let huge = MINIMAL.replace("[1, 6, 2]", "[1, 4000000000, 1]");
        assert!(message(EngineConfig::from_json_str(&huge).unwrap_err()).starts_with("num_topics"));

        let bad_kind = MINIMAL.replace(r#""tfidf""#, r#""lsi""#);
        assert!(message(EngineConfig::from_json_str(&bad_kind).unwrap_err()).starts_with("corpus_types"));

        let bad_measure = MINIMAL.replace("}", r#", "coherence": {"measure": "c_uci"}}"#);
        assert!(message(EngineConfig::from_json_str(&bad_measure).unwrap_err()).starts_with("coherence"));
    }

    #[test]
    fn test_required_fields_rejected_when_missing() {
        let cases = [
            ("docs_field", MINIMAL.replace(r#""docs": "text","#, "")),
            ("min_token_length", MINIMAL.replace(r#""min_token_length": 3"#, r#""min_token_length": null"#)),
            ("num_topics", MINIMAL.replace(r#""num_topics": [1, 6, 2],"#, "")),
            ("num_passes", MINIMAL.replace(r#""num_passes": [2, 8, 4],"#, "")),
            ("corpus_types", MINIMAL.replace(r#""corpus_type": ["bow", "tfidf"],"#, "")),
        ];
        for (field, text) in cases {
            assert_ne!(text, MINIMAL, "{} was not removed", field);
            let msg = message(EngineConfig::from_json_str(&text).unwrap_err());
            assert!(msg.starts_with(field), "{} rejected as: {}", field, msg);
        }
    }

    #[test]
    fn test_transcripts_need_no_docs_field() {
        let text = MINIMAL.replace(r#""docs": "text","#, r#""source": "transcripts","#);
        let config = EngineConfig::from_json_str(&text).unwrap();
        assert_eq!(config.docs_field, "call_body");
    }

    #[test]
    fn test_relative_paths_follow_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = EngineConfig::from_path(&path).unwrap();
        assert_eq!(config.data, dir.path().join("calls.csv"));
        assert_eq!(config.audit_path, None);
    }
}
