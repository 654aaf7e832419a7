use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Facts about a legal act found in its own text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub adoption_date: Option<NaiveDate>,
    pub doc_type: Option<String>,
    pub document_number: Option<String>,
    pub last_edition: Option<NaiveDate>,
}

/// A loaded source file. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub source_path: String,
    pub file_name: String,
    pub extension: String,
    pub checksum: String,
    pub text: String,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StructuralLabel {
    #[serde(rename = "type")]
    pub kind: String,
    pub number: Option<String>,
    pub heading: String,
}

impl fmt::Display for StructuralLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.number, self.heading.is_empty()) {
            (Some(number), false) => write!(f, "{} {}. {}", self.kind, number, self.heading),
            (Some(number), true) => write!(f, "{} {}", self.kind, number),
            (None, false) => write!(f, "{} {}", self.kind, self.heading),
            (None, true) => write!(f, "{}", self.kind),
        }
    }
}

/// A contiguous span of normalized text. Offsets are in chars, `end` exclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructuralUnit {
    /// Rule type that opened the unit; `None` for text outside any heading.
    pub kind: Option<String>,
    pub number: Option<String>,
    pub heading: String,
    /// Position among the pieces of a subdivided unit.
    pub part: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// Enclosing headings, outermost first, ending with this unit's own label.
    pub path: Vec<StructuralLabel>,
}

impl StructuralUnit {
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }

    pub fn kind_name(&self) -> &str {
        self.kind.as_deref().unwrap_or("none")
    }
}

/// A mention of another legal act, e.g. a federal law or a code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct LegalReference {
    pub kind: String,
    pub text: String,
}

/// A lettered sub-item of a numbered item, e.g. `а) ...`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegalSubitem {
    pub number: String,
    pub text: String,
}

/// A numbered item (пункт) of an article, with its sub-items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegalItem {
    pub number: String,
    pub text: String,
    pub subitems: Vec<LegalSubitem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub point_id: u64,
    pub document_id: String,
    pub chunk_index: u64,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
    pub labels: Vec<StructuralLabel>,
    pub keywords: Vec<String>,
    pub references: Vec<LegalReference>,
    pub items: Vec<LegalItem>,
}

impl Chunk {
    pub fn section_path(&self) -> String {
        self.labels
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

/// Payload stored next to every vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordPayload {
    pub document_id: String,
    pub original_id: String,
    pub source_path: String,
    pub file_name: String,
    pub extension: String,
    pub checksum: String,
    pub chunk_index: u64,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
    pub labels: Vec<StructuralLabel>,
    pub section_path: String,
    pub keywords: Vec<String>,
    pub references: Vec<LegalReference>,
    pub items: Vec<LegalItem>,
    pub document: DocumentMetadata,
    pub embedding_degraded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexRecord {
    pub point_id: u64,
    pub vector: Vec<f32>,
    pub payload: RecordPayload,
}

impl IndexRecord {
    pub fn new(
        document: &Document,
        metadata: &DocumentMetadata,
        chunk: &Chunk,
        vector: Vec<f32>,
        embedding_degraded: bool,
    ) -> Self {
        Self {
            point_id: chunk.point_id,
            vector,
            payload: RecordPayload {
                document_id: document.document_id.clone(),
                original_id: chunk.chunk_id.clone(),
                source_path: document.source_path.clone(),
                file_name: document.file_name.clone(),
                extension: document.extension.clone(),
                checksum: document.checksum.clone(),
                chunk_index: chunk.chunk_index,
                start_offset: chunk.start_offset,
                end_offset: chunk.end_offset,
                text: chunk.text.clone(),
                labels: chunk.labels.clone(),
                section_path: chunk.section_path(),
                keywords: chunk.keywords.clone(),
                references: chunk.references.clone(),
                items: chunk.items.clone(),
                document: metadata.clone(),
                embedding_degraded,
            },
        }
    }
}
