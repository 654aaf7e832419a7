use crate::error::ConfigError;
use regex::Regex;

/// Removes boilerplate noise from raw legal text before segmentation.
///
/// Built-in cleanup (line endings, soft hyphens, no-break spaces, typographic
/// quotes, `12|` line-number prefixes, whitespace runs) always runs; the
/// configured patterns run after it, in configured order, and every match is
/// deleted.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    patterns: Vec<Regex>,
    line_numbers: Regex,
    inline_space: Regex,
    blank_runs: Regex,
}

impl TextNormalizer {
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                    field: "processing.text_clean_patterns",
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            line_numbers: builtin(r"(?m)^[ \t]*\d+\|")?,
            inline_space: builtin(r"[ \t]+")?,
            blank_runs: builtin(r"\n{3,}")?,
        })
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn normalize(&self, raw: &str) -> String {
        let mut text = raw
            .replace("\r\n", "\n")
            .replace(['\r', '\u{c}', '\u{b}'], "\n")
            .replace('\u{ad}', "")
            .replace('\u{a0}', " ")
            .replace(['\u{201c}', '\u{201d}', '\u{201e}'], "\"");

        text = self.line_numbers.replace_all(&text, "").into_owned();
        for pattern in &self.patterns {
            text = pattern.replace_all(&text, "").into_owned();
        }

        let lines = text
            .lines()
            .map(|line| self.inline_space.replace_all(line.trim(), " ").into_owned())
            .collect::<Vec<_>>()
            .join("\n");

        self.blank_runs
            .replace_all(&lines, "\n\n")
            .trim()
            .to_string()
    }
}

pub(crate) fn builtin(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::Pattern {
        field: "builtin",
        pattern: pattern.to_string(),
        source,
    })
}
