//! Splits normalized legal text into structural units (sections, chapters,
//! articles) using ordered heading rules.
//!
//! Rules are tried in configuration order: when two rules match at the same
//! line start, the rule declared first wins. Units never overlap, are ordered
//! by position and concatenate back into the input text. Units longer than
//! the article threshold are cut at paragraph, sentence or word boundaries
//! into pieces of roughly equal size that inherit the parent heading.

use crate::error::ConfigError;
use crate::models::{StructuralLabel, StructuralUnit};
use regex::{Captures, Regex};
use std::ops::Range;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SectionRule {
    pub kind: String,
    regex: Regex,
    has_heading_group: bool,
    has_number_group: bool,
}

impl SectionRule {
    /// Compiles `pattern` in multi-line mode, anchored to the start of a line.
    pub fn new(kind: &str, pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(&format!("(?m)^(?:{pattern})")).map_err(|source| {
            ConfigError::Pattern {
                field: "processing.legal_text.section_patterns",
                pattern: pattern.to_string(),
                source,
            }
        })?;
        let has_group = |name: &str| regex.capture_names().flatten().any(|group| group == name);

        Ok(Self {
            kind: kind.to_string(),
            has_heading_group: has_group("heading"),
            has_number_group: has_group("number"),
            regex,
        })
    }

    fn heading(&self, captures: &Captures<'_>) -> String {
        let raw = if self.has_heading_group {
            captures.name("heading").map(|m| m.as_str())
        } else {
            (1..captures.len())
                .rev()
                .find_map(|index| captures.get(index))
                .map(|m| m.as_str())
        };
        raw.or_else(|| captures.get(0).map(|m| m.as_str()))
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    fn number(&self, captures: &Captures<'_>) -> Option<String> {
        if !self.has_number_group {
            return None;
        }
        captures
            .name("number")
            .map(|m| m.as_str().trim().to_string())
            .filter(|number| !number.is_empty())
    }
}

#[derive(Debug)]
struct HeadingMatch {
    byte_start: usize,
    rule_index: usize,
    label: StructuralLabel,
}

#[derive(Debug, Clone)]
pub struct StructureSegmenter {
    rules: Vec<SectionRule>,
    article_threshold: usize,
}

impl StructureSegmenter {
    pub fn new(rules: Vec<SectionRule>, article_threshold: usize) -> Result<Self, ConfigError> {
        if article_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "processing.legal_text.article_threshold",
                details: "must be positive".to_string(),
            });
        }
        Ok(Self {
            rules,
            article_threshold,
        })
    }

    pub fn rules(&self) -> &[SectionRule] {
        &self.rules
    }

    pub fn article_threshold(&self) -> usize {
        self.article_threshold
    }

    pub fn segment(&self, text: &str) -> Vec<StructuralUnit> {
        if text.is_empty() {
            return Vec::new();
        }

        let matches = self.find_headings(text);
        debug!(headings = matches.len(), "structural headings detected");

        let mut units = Vec::new();
        let mut context: Vec<Option<StructuralLabel>> = vec![None; self.rules.len()];
        let mut char_cursor = 0usize;

        let first_start = matches.first().map_or(text.len(), |m| m.byte_start);
        if first_start > 0 {
            let span = &text[..first_start];
            let chars = span.chars().count();
            units.push(StructuralUnit {
                kind: None,
                number: None,
                heading: String::new(),
                part: 0,
                start: 0,
                end: chars,
                text: span.to_string(),
                path: Vec::new(),
            });
            char_cursor = chars;
        }

        for (position, heading) in matches.iter().enumerate() {
            let byte_end = matches
                .get(position + 1)
                .map_or(text.len(), |next| next.byte_start);
            let span = &text[heading.byte_start..byte_end];
            let chars = span.chars().count();

            context[heading.rule_index] = Some(heading.label.clone());
            for deeper in context.iter_mut().skip(heading.rule_index + 1) {
                *deeper = None;
            }
            let path = context
                .iter()
                .take(heading.rule_index + 1)
                .flatten()
                .cloned()
                .collect::<Vec<_>>();

            units.push(StructuralUnit {
                kind: Some(heading.label.kind.clone()),
                number: heading.label.number.clone(),
                heading: heading.label.heading.clone(),
                part: 0,
                start: char_cursor,
                end: char_cursor + chars,
                text: span.to_string(),
                path,
            });
            char_cursor += chars;
        }

        units
            .into_iter()
            .flat_map(|unit| self.subdivide(unit))
            .collect()
    }

    fn find_headings(&self, text: &str) -> Vec<HeadingMatch> {
        let mut matches = Vec::new();
        for (rule_index, rule) in self.rules.iter().enumerate() {
            for captures in rule.regex.captures_iter(text) {
                let Some(whole) = captures.get(0) else {
                    continue;
                };
                if whole.as_str().trim().is_empty() {
                    continue;
                }
                matches.push(HeadingMatch {
                    byte_start: whole.start(),
                    rule_index,
                    label: StructuralLabel {
                        kind: rule.kind.clone(),
                        number: rule.number(&captures),
                        heading: rule.heading(&captures),
                    },
                });
            }
        }

        matches.sort_by_key(|m| (m.byte_start, m.rule_index));
        matches.dedup_by_key(|m| m.byte_start);
        matches
    }

    fn subdivide(&self, unit: StructuralUnit) -> Vec<StructuralUnit> {
        if unit.char_len() <= self.article_threshold {
            return vec![unit];
        }

        let chars = unit.text.chars().collect::<Vec<_>>();
        let ranges = split_ranges(&chars, self.article_threshold);
        debug!(
            kind = unit.kind_name(),
            heading = %unit.heading,
            length = chars.len(),
            pieces = ranges.len(),
            "subdividing oversized unit"
        );

        ranges
            .into_iter()
            .enumerate()
            .map(|(part, range)| StructuralUnit {
                kind: unit.kind.clone(),
                number: unit.number.clone(),
                heading: unit.heading.clone(),
                part,
                start: unit.start + range.start,
                end: unit.start + range.end,
                text: chars[range].iter().collect(),
                path: unit.path.clone(),
            })
            .collect()
    }
}

/// Cuts `chars` into consecutive ranges no longer than `limit`, each cut
/// placed near the point that would make the remaining pieces equal.
fn split_ranges(chars: &[char], limit: usize) -> Vec<Range<usize>> {
    let total = chars.len();
    let mut ranges = Vec::new();
    let mut cursor = 0usize;

    while total - cursor > limit {
        let remaining = total - cursor;
        let pieces = remaining.div_ceil(limit);
        let ideal = cursor + remaining / pieces;
        let cut = best_cut(chars, cursor, ideal, cursor + limit);
        ranges.push(cursor..cut);
        cursor = cut;
    }
    ranges.push(cursor..total);
    ranges
}

#[derive(Clone, Copy)]
enum Boundary {
    Paragraph,
    Sentence,
    Word,
}

impl Boundary {
    /// Whether a piece ending right before `cut` ends on this kind of boundary.
    fn ends_at(self, chars: &[char], cut: usize) -> bool {
        let last = chars[cut - 1];
        let before = cut.checked_sub(2).map(|index| chars[index]);
        match self {
            Boundary::Paragraph => last == '\n' && before == Some('\n'),
            Boundary::Sentence => {
                last == '\n'
                    || (last.is_whitespace()
                        && before.is_some_and(|c| matches!(c, '.' | '!' | '?' | ';')))
            }
            Boundary::Word => last.is_whitespace(),
        }
    }
}

fn best_cut(chars: &[char], lo: usize, ideal: usize, hi: usize) -> usize {
    let window_start = lo + ((ideal - lo) / 2).max(1);
    for boundary in [Boundary::Paragraph, Boundary::Sentence, Boundary::Word] {
        let nearest = (window_start..=hi)
            .filter(|&cut| boundary.ends_at(chars, cut))
            .min_by_key(|&cut| cut.abs_diff(ideal));
        if let Some(cut) = nearest {
            return cut;
        }
    }
    ideal.max(lo + 1)
}
