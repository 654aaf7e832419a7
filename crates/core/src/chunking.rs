use crate::error::ConfigError;
use crate::models::{Chunk, StructuralLabel, StructuralUnit};
use sha2::{Digest, Sha256};
use std::ops::Range;

/// Slides a fixed-size window over the concatenated units of one document.
///
/// Keywords, references and items are left empty; see `MetadataExtractor::enrich`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBuilder {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkBuilder {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "processing.chunk_size",
                details: "must be positive".to_string(),
            });
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::Invalid {
                field: "processing.chunk_overlap",
                details: format!("overlap {chunk_overlap} must be smaller than chunk_size {chunk_size}"),
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Char ranges of every window over a stream of `len` chars.
    pub fn windows(&self, len: usize) -> Vec<Range<usize>> {
        let mut windows = Vec::new();
        if len == 0 {
            return windows;
        }

        let mut start = 0usize;
        loop {
            let end = (start + self.chunk_size).min(len);
            windows.push(start..end);
            if end == len {
                break;
            }
            start += self.step();
        }
        windows
    }

    pub fn build(&self, document_id: &str, units: &[StructuralUnit]) -> Vec<Chunk> {
        let stream = units
            .iter()
            .flat_map(|unit| unit.text.chars())
            .collect::<Vec<_>>();
        let base = units.first().map_or(0, |unit| unit.start);

        self.windows(stream.len())
            .into_iter()
            .enumerate()
            .map(|(index, window)| {
                let text = stream[window.clone()].iter().collect::<String>();
                let start = base + window.start;
                let end = base + window.end;
                let chunk_id = chunk_string_id(document_id, index as u64);

                Chunk {
                    point_id: stable_point_id(&chunk_id),
                    chunk_id,
                    document_id: document_id.to_string(),
                    chunk_index: index as u64,
                    start_offset: start,
                    end_offset: end,
                    labels: overlapping_labels(units, start, end),
                    keywords: Vec::new(),
                    references: Vec::new(),
                    items: Vec::new(),
                    text,
                }
            })
            .collect()
    }
}

/// Labels of every unit touching `[start, end)`, outermost first, without repeats.
fn overlapping_labels(units: &[StructuralUnit], start: usize, end: usize) -> Vec<StructuralLabel> {
    let mut labels: Vec<StructuralLabel> = Vec::new();
    for unit in units
        .iter()
        .filter(|unit| unit.start < end && unit.end > start)
    {
        for label in &unit.path {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
    }
    labels
}

pub fn chunk_string_id(document_id: &str, chunk_index: u64) -> String {
    format!("{document_id}_{chunk_index}")
}

/// Numeric point id: the trailing 8 bytes of SHA-256 over the string id.
pub fn stable_point_id(chunk_id: &str) -> u64 {
    let digest = Sha256::digest(chunk_id.as_bytes());
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&digest[digest.len() - 8..]);
    u64::from_be_bytes(tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(kind: Option<&str>, heading: &str, start: usize, text: &str) -> StructuralUnit {
        let path = kind
            .map(|kind| {
                vec![StructuralLabel {
                    kind: kind.to_string(),
                    number: None,
                    heading: heading.to_string(),
                }]
            })
            .unwrap_or_default();
        StructuralUnit {
            kind: kind.map(str::to_string),
            number: None,
            heading: heading.to_string(),
            part: 0,
            start,
            end: start + text.chars().count(),
            text: text.to_string(),
            path,
        }
    }

    #[test]
    fn long_single_unit_document_yields_three_windows() {
        let builder = ChunkBuilder::new(1_000, 200).unwrap();
        let text = "ю".repeat(2_300);
        let chunks = builder.build("doc", &[unit(None, "", 0, &text)]);

        let starts = chunks.iter().map(|c| c.start_offset).collect::<Vec<_>>();
        assert_eq!(starts, [0, 800, 1_600]);
        assert_eq!(chunks[2].text.chars().count(), 700);
        assert!(chunks.iter().all(|c| c.labels.is_empty()));
    }

    #[test]
    fn consecutive_chunks_share_exactly_the_overlap() {
        let builder = ChunkBuilder::new(50, 15).unwrap();
        let text = (0..40)
            .map(|i| format!("Пункт {i}. "))
            .collect::<String>();
        let chunks = builder.build("doc", &[unit(None, "", 0, &text)]);

        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let previous = pair[0].text.chars().collect::<Vec<_>>();
            let next = pair[1].text.chars().collect::<Vec<_>>();
            assert_eq!(previous.len(), 50);
            assert_eq!(&previous[previous.len() - 15..], &next[..15]);
        }
    }

    #[test]
    fn indices_are_contiguous_and_ids_stable() {
        let builder = ChunkBuilder::new(10, 3).unwrap();
        let units = [unit(None, "", 0, "Абвгдежзийклмнопрстуфхцчшщ")];
        let first = builder.build("doc-7", &units);
        let second = builder.build("doc-7", &units);

        assert_eq!(first, second);
        for (position, chunk) in first.iter().enumerate() {
            assert_eq!(chunk.chunk_index, position as u64);
            assert_eq!(chunk.chunk_id, format!("doc-7_{position}"));
            assert_eq!(chunk.point_id, stable_point_id(&chunk.chunk_id));
        }
        assert_ne!(first[0].point_id, first[1].point_id);
    }

    #[test]
    fn chunk_spanning_two_units_carries_both_labels() {
        let builder = ChunkBuilder::new(30, 5).unwrap();
        let first = "Глава 1. Начало\nТекст.\n";
        let second = "Глава 2. Продолжение\n";
        let units = [
            unit(Some("Глава"), "Начало", 0, first),
            unit(Some("Глава"), "Продолжение", first.chars().count(), second),
        ];
        let chunks = builder.build("doc", &units);

        let headings = chunks[0]
            .labels
            .iter()
            .map(|label| label.heading.as_str())
            .collect::<Vec<_>>();
        assert_eq!(headings, ["Начало", "Продолжение"]);
        assert_eq!(chunks.last().unwrap().labels.len(), 1);
    }

    #[test]
    fn short_document_is_a_single_chunk() {
        let builder = ChunkBuilder::new(100, 20).unwrap();
        let chunks = builder.build("doc", &[unit(None, "", 0, "Короткий текст.")]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Короткий текст.");
        assert!(builder.build("doc", &[]).is_empty());
    }

    #[test]
    fn overlap_equal_to_size_is_rejected() {
        assert!(ChunkBuilder::new(100, 100).is_err());
        assert!(ChunkBuilder::new(0, 0).is_err());
    }
}
