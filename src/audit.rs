//! Audit trail: one JSON line per evaluated hyperparameter tuple

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::corpus::EncodingKind;
use crate::error::{Result, TopicError};
use crate::model::HyperParams;
use crate::sweep::{Outcome, SweepEntry};

/// File name used when the configuration does not name one
pub const DEFAULT_AUDIT_FILE: &str = "topic_engine_audit_trail.txt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub topic_count: usize,
    pub iteration_budget: usize,
    pub encoding: EncodingKind,
    pub seed: u64,
    pub coherence: Option<f64>,
    pub failure: Option<String>,
    pub duration_ms: u64,
}

impl AuditRecord {
    pub fn from_entry(params: &HyperParams, entry: &SweepEntry) -> Self {
        let (coherence, failure) = match &entry.outcome {
            Outcome::Succeeded { coherence, .. } => (Some(*coherence), None),
            Outcome::Failed { reason } => (None, Some(reason.clone())),
            Outcome::Cancelled => (None, Some("cancelled".to_string())),
        };
        AuditRecord {
            timestamp: Utc::now(),
            topic_count: params.topic_count,
            iteration_budget: params.iteration_budget,
            encoding: params.encoding,
            seed: entry.seed,
            coherence,
            failure,
            duration_ms: entry.duration.as_millis() as u64,
        }
    }
}

pub struct AuditTrail {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl AuditTrail {
    /// Open (append) the audit file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(AuditTrail {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Default location: beside the configuration file
    pub fn default_path(config_path: &Path) -> PathBuf {
        config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(DEFAULT_AUDIT_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush, so completed tuples survive an interrupt
    pub fn record(&self, record: &AuditRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Read back every record of an audit file
pub fn read_audit(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>> {
    let text = std::fs::read_to_string(path)?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str::<AuditRecord>(line).map_err(TopicError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_records_one_line_per_tuple() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.txt");
        let trail = AuditTrail::open(&path).unwrap();

        let params = HyperParams {
            topic_count: 3,
            iteration_budget: 2,
            encoding: EncodingKind::Weighted,
        };
        let failed = SweepEntry {
            seed: 9,
            duration: Duration::from_millis(15),
            outcome: Outcome::Failed {
                reason: "insufficient_data: never co-occur".into(),
            },
        };
        trail.record(&AuditRecord::from_entry(&params, &failed)).unwrap();
        trail.record(&AuditRecord::from_entry(&params, &failed)).unwrap();

        let records = read_audit(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].topic_count, 3);
        assert_eq!(records[0].encoding, EncodingKind::Weighted);
        assert_eq!(records[0].coherence, None);
        assert_eq!(records[0].duration_ms, 15);
        assert!(records[0].failure.as_deref().unwrap().starts_with("insufficient_data"));
    }

    #[test]
    fn test_default_path_beside_config() {
        let path = AuditTrail::default_path(Path::new("/data/runs/engine.json"));
        assert_eq!(path, PathBuf::from("/data/runs/topic_engine_audit_trail.txt"));
    }
}
