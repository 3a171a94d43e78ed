//! Research brief parsing.
//!
//! A brief is a short UTF-8 Markdown document: the first H1 is the topic,
//! and optional `Audience:`, `Tone:`, `Target length:`, and `Type:` lines
//! refine it. Parsing never fails; missing fields stay unset and an empty
//! topic falls back to a fixed placeholder downstream.

/// Topic used when the brief contains no H1.
pub const FALLBACK_TOPIC: &str = "research topic";

/// A parsed research brief. Immutable for the duration of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Brief {
    /// Research topic (first H1 of the brief; may be empty).
    pub topic: String,
    /// Intended audience, when stated.
    pub audience: Option<String>,
    /// Requested tone, when stated.
    pub tone: Option<String>,
    /// Target report length in words; zero when unstated.
    pub target_length_words: u32,
    /// Free-form report type, normalized later by the template registry.
    pub report_type: Option<String>,
}

impl Brief {
    /// Parses a brief from Markdown text.
    ///
    /// Recognized line prefixes are case-insensitive: `Audience:`, `Tone:`,
    /// `Target length:` (integer, tolerant of a trailing `words`), and
    /// `Type:`.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let mut brief = Self::default();

        for line in input.lines() {
            let trimmed = line.trim();
            if brief.topic.is_empty()
                && let Some(rest) = trimmed.strip_prefix('#')
                && !rest.starts_with('#')
            {
                brief.topic = rest.trim().to_string();
                continue;
            }

            if let Some(value) = labeled_value(trimmed, "audience:") {
                brief.audience = non_empty(value);
            } else if let Some(value) = labeled_value(trimmed, "tone:") {
                brief.tone = non_empty(value);
            } else if let Some(value) = labeled_value(trimmed, "target length:") {
                brief.target_length_words = parse_word_count(value);
            } else if let Some(value) = labeled_value(trimmed, "type:") {
                brief.report_type = non_empty(value);
            }
        }

        brief
    }

    /// The topic, or [`FALLBACK_TOPIC`] when the brief had no H1.
    #[must_use]
    pub fn topic_or_default(&self) -> &str {
        if self.topic.is_empty() {
            FALLBACK_TOPIC
        } else {
            &self.topic
        }
    }
}

/// Returns the value after `label` when `line` starts with it
/// (case-insensitive).
fn labeled_value<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    if head.eq_ignore_ascii_case(label) {
        Some(line[label.len()..].trim())
    } else {
        None
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parses `"1200"`, `"1200 words"`, or `"1,200 words"` into a word count.
/// Unparseable values yield zero.
fn parse_word_count(value: &str) -> u32 {
    let digits: String = value
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}
