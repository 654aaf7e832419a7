//! Document-level facts and per-chunk enrichment for Russian legal acts.

use crate::error::ConfigError;
use crate::models::{Chunk, DocumentMetadata, LegalItem, LegalReference, LegalSubitem};
use crate::normalizer::builtin;
use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeSet;

/// Longer terms come first so the alternation prefers them.
const LEGAL_TERMS: [&str; 29] = [
    "правоспособность",
    "правоотношения",
    "представительство",
    "правонарушение",
    "дееспособность",
    "исковая давность",
    "ответственность",
    "обязательство",
    "обязательств",
    "собственность",
    "регулирование",
    "наследование",
    "компенсация",
    "возмещение",
    "наследство",
    "имущество",
    "сервитут",
    "владение",
    "договор",
    "субъект",
    "защита",
    "кодекс",
    "сделка",
    "объект",
    "ущерб",
    "право",
    "закон",
    "залог",
    "иск",
];

#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    title_and_date: Regex,
    codex: Regex,
    federal_law: Regex,
    document_number: Regex,
    last_edition: Regex,
    keywords: Regex,
    references: Vec<(&'static str, Regex)>,
    item: Regex,
    subitem: Regex,
}

impl MetadataExtractor {
    pub fn new() -> Result<Self, ConfigError> {
        let keyword_pattern = format!(r"(?i)\b(?:{})", LEGAL_TERMS.join("|"));

        Ok(Self {
            title_and_date: builtin(r#""([^"]+)"\s+от\s+(\d{2}\.\d{2}\.\d{4})"#)?,
            codex: builtin(r"(?i)гражданский\s+кодекс")?,
            federal_law: builtin(r"(?i)федеральный\s+закон")?,
            document_number: builtin(r"(?:\b[NН]|№)\s*(\d+(?:-[\p{Lu}\d]+)?)")?,
            last_edition: builtin(r"ред\.\s+от\s+(\d{2}\.\d{2}\.\d{4})")?,
            keywords: builtin(&keyword_pattern)?,
            item: builtin(r"(?m)^[ \t]*(\d+(?:\.\d+)*)\.[ \t]+")?,
            subitem: builtin(r"(?:^|\s)([а-я])\)\s+")?,
            references: vec![
                (
                    "federal_law",
                    builtin(
                        r#"(?i)федеральн(?:ый|ого|ому|ым)\s+закон(?:а|у|ом|е)?\s+(?:от\s+\d{1,2}\.\d{1,2}\.\d{4}\s+)?(?:[NН№]\s*\d+-[\p{Lu}]+\s+)?"[^"]+""#,
                    )?,
                ),
                (
                    "codex",
                    builtin(r"\p{Lu}\p{Ll}+(?:ым|им|ом|ого|ий|ый)\s+кодекс(?:а|е|ом|у)?\s+Российской\s+Федерации")?,
                ),
                (
                    "government_decree",
                    builtin(
                        r"(?i)постановлени(?:е|я|ю|ем)\s+правительства\s+российской\s+федерации\s+от\s+\d{1,2}\.\d{1,2}\.\d{4}(?:\s+[NН№]\s*\d+)?",
                    )?,
                ),
                (
                    "ministry_order",
                    builtin(
                        r"(?i)приказ(?:а|е|ом|у)?\s+(?:министерства|минфина|минюста|фнс)[^\n]{0,200}?\s+от\s+\d{1,2}\.\d{1,2}\.\d{4}(?:\s+[NН№]\s*\d+)?",
                    )?,
                ),
            ],
        })
    }

    pub fn document(&self, text: &str) -> DocumentMetadata {
        let mut metadata = DocumentMetadata::default();

        if let Some(captures) = self.title_and_date.captures(text) {
            metadata.title = captures.get(1).map(|m| m.as_str().trim().to_string());
            metadata.adoption_date = captures.get(2).and_then(|m| parse_date(m.as_str()));
        }

        metadata.doc_type = if self.codex.is_match(text) {
            Some("codex".to_string())
        } else if self.federal_law.is_match(text) {
            Some("federal_law".to_string())
        } else {
            None
        };

        metadata.document_number = self
            .document_number
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string());

        metadata.last_edition = self
            .last_edition
            .captures(text)
            .and_then(|captures| captures.get(1))
            .and_then(|m| parse_date(m.as_str()));

        metadata
    }

    /// Distinct legal terms in `text`, lower-cased and sorted.
    pub fn keywords(&self, text: &str) -> Vec<String> {
        self.keywords
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn references(&self, text: &str) -> Vec<LegalReference> {
        let mut found = Vec::new();
        for (kind, pattern) in &self.references {
            for m in pattern.find_iter(text) {
                let reference = LegalReference {
                    kind: (*kind).to_string(),
                    text: m.as_str().split_whitespace().collect::<Vec<_>>().join(" "),
                };
                if !found.contains(&reference) {
                    found.push(reference);
                }
            }
        }
        found
    }

    /// Numbered items that start a line in `text`. An item runs to the next
    /// item or the next blank line.
    pub fn items(&self, text: &str) -> Vec<LegalItem> {
        let heads = self
            .item
            .captures_iter(text)
            .filter_map(|captures| Some((captures.get(0)?, captures.get(1)?)))
            .collect::<Vec<_>>();

        heads
            .iter()
            .enumerate()
            .map(|(position, (head, number))| {
                let end = heads
                    .get(position + 1)
                    .map_or(text.len(), |(next, _)| next.start());
                let body = text[head.end()..end]
                    .split("\n\n")
                    .next()
                    .unwrap_or_default()
                    .trim();
                LegalItem {
                    number: number.as_str().to_string(),
                    text: body.to_string(),
                    subitems: self.subitems(body),
                }
            })
            .collect()
    }

    fn subitems(&self, item: &str) -> Vec<LegalSubitem> {
        let heads = self
            .subitem
            .captures_iter(item)
            .filter_map(|captures| Some((captures.get(0)?, captures.get(1)?)))
            .collect::<Vec<_>>();

        heads
            .iter()
            .enumerate()
            .map(|(position, (head, letter))| {
                let end = heads
                    .get(position + 1)
                    .map_or(item.len(), |(next, _)| next.start());
                LegalSubitem {
                    number: letter.as_str().to_string(),
                    text: item[head.end()..end].trim().to_string(),
                }
            })
            .collect()
    }

    pub fn enrich(&self, chunks: &mut [Chunk]) {
        for chunk in chunks {
            chunk.keywords = self.keywords(&chunk.text);
            chunk.references = self.references(&chunk.text);
            chunk.items = self.items(&chunk.text);
        }
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%d.%m.%Y").ok()
}
