//! Document sources: CSV exports and crawler transcript batches

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, TopicError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Document {
            id: id.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    #[default]
    Csv,
    Transcripts,
}

/// What counts as one document in a transcript batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentUnit {
    /// The whole call body of a company
    #[default]
    Transcript,
    /// One document per speaker
    Speaker,
}

/// One company's call as written by the crawler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// name -> position
    #[serde(default)]
    pub executives: BTreeMap<String, String>,
    /// name -> firm
    #[serde(default)]
    pub analysts: BTreeMap<String, String>,
    /// Paragraphs, starting at the operator's introduction
    #[serde(default)]
    pub call_body: Vec<String>,
}

impl TranscriptEntry {
    /// Everyone who may open a monologue, lowercased
    fn speakers(&self) -> HashSet<String> {
        self.executives
            .keys()
            .chain(self.analysts.keys())
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .chain(std::iter::once(OPERATOR.to_string()))
            .collect()
    }

    /// Per-speaker text in order of first appearance
    pub fn monologues(&self) -> Vec<(String, String)> {
        let speakers = self.speakers();
        let mut order: Vec<String> = Vec::new();
        let mut text: BTreeMap<String, String> = BTreeMap::new();
        let mut current: Option<String> = None;

        for paragraph in &self.call_body {
            let key = paragraph.trim().to_lowercase();
            if speakers.contains(&key) {
                if !text.contains_key(&key) {
                    order.push(key.clone());
                    text.insert(key.clone(), String::new());
                }
                current = Some(key);
                continue;
            }
            // Paragraphs before the first speaker line have no owner
            let Some(speaker) = &current else { continue };
            if let Some(buffer) = text.get_mut(speaker) {
                if !buffer.is_empty() {
                    buffer.push(' ');
                }
                buffer.push_str(paragraph.trim());
            }
        }

        order
            .into_iter()
            .filter_map(|speaker| {
                let body = text.remove(&speaker)?;
                (!body.is_empty()).then_some((speaker, body))
            })
            .collect()
    }
}

const OPERATOR: &str = "operator";

/// Read one document per row. Bytes that are not UTF-8 are replaced, not rejected.
pub fn load_csv(path: &Path, docs_field: &str, id_field: Option<&str>) -> Result<Vec<Document>> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);

    let headers = reader.byte_headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| String::from_utf8_lossy(h).trim() == name);

    let docs_col = column(docs_field).ok_or_else(|| {
        TopicError::ConfigValidation(format!(
            "docs_field: column '{}' not found in {}",
            docs_field,
            path.display()
        ))
    })?;
    let id_col = match id_field {
        Some(name) => Some(column(name).ok_or_else(|| {
            TopicError::ConfigValidation(format!(
                "id_field: column '{}' not found in {}",
                name,
                path.display()
            ))
        })?),
        None => None,
    };

    let mut documents = Vec::new();
    for (row, record) in reader.byte_records().enumerate() {
        let record = record?;
        let text = record
            .get(docs_col)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();
        let id = id_col
            .and_then(|col| record.get(col))
            .map(|b| String::from_utf8_lossy(b).trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| row.to_string());
        documents.push(Document { id, text });
    }

    info!("Loaded {} documents from {}", documents.len(), path.display());
    Ok(documents)
}

/// Read a crawler batch: `{company: {executives, analysts, call_body}}`
pub fn load_transcripts(path: &Path, unit: DocumentUnit) -> Result<Vec<Document>> {
    let file = File::open(path)?;
    let batch: BTreeMap<String, TranscriptEntry> = serde_json::from_reader(std::io::BufReader::new(file))?;
    let documents = transcript_documents(&batch, unit);
    info!(
        "Loaded {} documents from {} transcripts in {}",
        documents.len(),
        batch.len(),
        path.display()
    );
    Ok(documents)
}

pub fn transcript_documents(batch: &BTreeMap<String, TranscriptEntry>, unit: DocumentUnit) -> Vec<Document> {
    let mut documents = Vec::new();
    for (company, entry) in batch {
        match unit {
            DocumentUnit::Transcript => {
                documents.push(Document::new(company.clone(), entry.call_body.join("\n")));
            }
            DocumentUnit::Speaker => {
                let monologues = entry.monologues();
                debug!("{}: {} speakers", company, monologues.len());
                for (speaker, text) in monologues {
                    documents.push(Document::new(format!("{}/{}", company, speaker), text));
                }
            }
        }
    }
    documents
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_entry() -> TranscriptEntry {
        TranscriptEntry {
            executives: BTreeMap::from([("jane doe ".to_string(), " ceo".to_string())]),
            analysts: BTreeMap::from([("sam roe ".to_string(), " big bank".to_string())]),
            call_body: vec![
                "operator".into(),
                "welcome to the call.".into(),
                "jane doe".into(),
                "revenue grew strongly.".into(),
                "margins held.".into(),
                "sam roe".into(),
                "what about costs?".into(),
                "jane doe".into(),
                "costs fell.".into(),
            ],
        }
    }

    #[test]
    fn test_monologues_group_by_speaker() {
        let monologues = sample_entry().monologues();
        assert_eq!(monologues.len(), 3);
        assert_eq!(monologues[0], ("operator".to_string(), "welcome to the call.".to_string()));
        assert_eq!(monologues[1].0, "jane doe");
        assert_eq!(monologues[1].1, "revenue grew strongly. margins held. costs fell.");
        assert_eq!(monologues[2].0, "sam roe");
    }

    #[test]
    fn test_transcript_units() {
        let batch = BTreeMap::from([("acme".to_string(), sample_entry())]);
        let whole = transcript_documents(&batch, DocumentUnit::Transcript);
        assert_eq!(whole.len(), 1);
        assert_eq!(whole[0].id, "acme");
        assert!(whole[0].text.contains("costs fell."));

        let speakers = transcript_documents(&batch, DocumentUnit::Speaker);
        let ids: Vec<&str> = speakers.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["acme/operator", "acme/jane doe", "acme/sam roe"]);
    }

    #[test]
    fn test_load_transcripts_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"acme": {{"executives": {{"jane doe": "ceo"}}, "call_body": ["operator", "hello", "jane doe", "sales rose"]}}}}"#
        )
        .unwrap();
        let docs = load_transcripts(file.path(), DocumentUnit::Speaker).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1], Document::new("acme/jane doe", "sales rose"));
    }

    #[test]
    fn test_load_csv_lossy() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"company,text\nacme,caf\xe9 revenue\n,plain text\n").unwrap();

        let docs = load_csv(file.path(), "text", Some("company")).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "acme");
        assert!(docs[0].text.starts_with("caf"));
        assert!(docs[0].text.ends_with(" revenue"));
        // Blank id falls back to the row number
        assert_eq!(docs[1].id, "1");
    }

    #[test]
    fn test_load_csv_missing_column() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"company,body\nacme,x\n").unwrap();
        let err = load_csv(file.path(), "text", None).unwrap_err();
        match err {
            TopicError::ConfigValidation(msg) => assert!(msg.starts_with("docs_field")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
