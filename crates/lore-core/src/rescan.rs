//! Literal word-boundary rescanning of note text.
//!
//! The database narrows candidate notes with full-text search; this module
//! produces the exact character spans inside each candidate.

use regex::Regex;

use crate::error::{Error, Result};
use crate::models::TextSpan;

/// Compiled matcher for one entity name.
///
/// Matching is case-insensitive and anchored on word boundaries. Regex
/// metacharacters in the name are matched literally. A boundary is only
/// required on a side where the name starts or ends with a word character,
/// so names such as `Orb (Lesser)` still match.
#[derive(Debug, Clone)]
pub struct WordMatcher {
    pattern: Regex,
}

impl WordMatcher {
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Name must not be empty".to_string()));
        }
        let lead = if name.starts_with(is_word_char) { r"\b" } else { "" };
        let trail = if name.ends_with(is_word_char) { r"\b" } else { "" };
        let pattern = Regex::new(&format!(r"(?i){}{}{}", lead, regex::escape(name), trail))
            .map_err(|e| Error::InvalidInput(format!("Name cannot be matched: {}", e)))?;
        Ok(Self { pattern })
    }

    /// All non-overlapping matches in `text`, as character spans in order.
    pub fn spans(&self, text: &str) -> Vec<TextSpan> {
        let mut spans = Vec::new();
        // Byte offsets advance monotonically, so character positions can be
        // counted incrementally instead of rescanning from the start.
        let mut byte_cursor = 0;
        let mut char_cursor = 0;
        for m in self.pattern.find_iter(text) {
            char_cursor += text[byte_cursor..m.start()].chars().count();
            let start = char_cursor;
            char_cursor += m.as_str().chars().count();
            byte_cursor = m.end();
            spans.push(TextSpan {
                start: start as i32,
                end: char_cursor as i32,
            });
        }
        spans
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Find every whole-word, case-insensitive occurrence of `name` in `text`.
///
/// # Examples
///
/// ```
/// use lore_core::find_word_spans;
///
/// let spans = find_word_spans("Gandalf", "gandalf met GANDALF's cousin").unwrap();
/// assert_eq!(spans.len(), 2);
/// assert_eq!((spans[0].start, spans[0].end), (0, 7));
/// ```
pub fn find_word_spans(name: &str, text: &str) -> Result<Vec<TextSpan>> {
    Ok(WordMatcher::new(name)?.spans(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(spans: &[TextSpan]) -> Vec<(i32, i32)> {
        spans.iter().map(|s| (s.start, s.end)).collect()
    }

    #[test]
    fn test_case_insensitive_whole_words() {
        let spans = find_word_spans("aria", "Aria met ARIA near aria.").unwrap();
        assert_eq!(pairs(&spans), vec![(0, 4), (9, 13), (19, 23)]);
    }

    #[test]
    fn test_ignores_partial_words() {
        let spans = find_word_spans("torch", "torches and a torchlight, then a torch").unwrap();
        assert_eq!(pairs(&spans), vec![(33, 38)]);
    }

    #[test]
    fn test_multi_word_name() {
        let spans = find_word_spans("Gandalf the Grey", "Hail, gandalf the grey!").unwrap();
        assert_eq!(pairs(&spans), vec![(6, 22)]);
    }

    #[test]
    fn test_metacharacters_are_literal() {
        let spans = find_word_spans("Orb (Lesser)", "the Orb (Lesser) glows").unwrap();
        assert_eq!(pairs(&spans), vec![(4, 16)]);

        let spans = find_word_spans("a.b", "axb a.b").unwrap();
        assert_eq!(pairs(&spans), vec![(4, 7)]);
    }

    #[test]
    fn test_offsets_are_characters_not_bytes() {
        let text = "Ærwyn and Æsir greet Aria";
        let spans = find_word_spans("Aria", text).unwrap();
        assert_eq!(pairs(&spans), vec![(21, 25)]);
        assert_eq!(spans[0].slice(text), Some("Aria"));
    }

    #[test]
    fn test_no_matches() {
        assert!(find_word_spans("Sauron", "a quiet evening").unwrap().is_empty());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            find_word_spans("   ", "anything"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_matcher_is_reusable() {
        let matcher = WordMatcher::new("Aria").unwrap();
        assert_eq!(matcher.spans("Aria").len(), 1);
        assert_eq!(matcher.spans("Aria and Aria").len(), 2);
        assert!(matcher.spans("arial").is_empty());
    }
}
