//! Sentence splitting with abbreviation protection.
//!
//! Dots inside known abbreviations are swapped for a private-use placeholder
//! before splitting and restored afterwards. The placeholder is a single
//! character, so character offsets in the protected text line up with the
//! original text and can be mapped back to lines.

use regex::Regex;
use std::sync::LazyLock;

use crate::fingerprint::unit_id;
use crate::models::{TextUnit, UnitKind};

const PLACEHOLDER: char = '\u{E000}';

/// Abbreviations whose dots never end a sentence. Matched case-insensitively
/// at a word boundary.
const ABBREVIATIONS: &[&str] = &[
    // titles
    "Dr.", "Mr.", "Mrs.", "Ms.", "Prof.", "St.", "Jr.", "Sr.",
    // common latin / prose
    "etc.", "vs.", "i.e.", "e.g.", "cf.", "approx.",
    // citation style
    "et al.", "p.", "pp.", "vol.", "vols.", "no.", "ed.", "eds.", "fig.", "ch.", "op. cit.", "ibid.",
];

static ABBREVIATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    let mut sorted: Vec<&str> = ABBREVIATIONS.to_vec();
    sorted.sort_by_key(|a| std::cmp::Reverse(a.len()));
    let alternatives: Vec<String> = sorted.iter().map(|a| regex::escape(a)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})", alternatives.join("|")))
        .expect("abbreviation pattern is valid")
});

/// Terminal punctuation followed by whitespace, or a blank line.
static BOUNDARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+|\n[ \t]*\n\s*").expect("boundary pattern is valid"));

pub fn segment_sentences(text: &str) -> Vec<TextUnit> {
    let protected = protect_abbreviations(text);
    let line_starts = line_start_offsets(text);

    let mut units = Vec::new();
    let mut piece_start = 0usize;
    let mut cursor = CharCursor::default();

    for m in BOUNDARY_RE.find_iter(&protected) {
        let punct_len = m
            .as_str()
            .find(|c: char| !matches!(c, '.' | '!' | '?'))
            .unwrap_or(m.len());
        let piece_end = m.start() + punct_len;
        push_sentence(&protected, piece_start, piece_end, &mut cursor, &line_starts, &mut units);
        piece_start = m.end();
    }
    push_sentence(
        &protected,
        piece_start,
        protected.len(),
        &mut cursor,
        &line_starts,
        &mut units,
    );

    units
}

fn protect_abbreviations(text: &str) -> String {
    ABBREVIATION_RE
        .replace_all(text, |caps: &regex::Captures| caps[0].replace('.', &PLACEHOLDER.to_string()))
        .into_owned()
}

fn restore_abbreviations(text: &str) -> String {
    text.replace(PLACEHOLDER, ".")
}

/// Character offset at which each line starts (newline counted as one char).
fn line_start_offsets(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut offset = 0usize;
    for line in text.split('\n') {
        starts.push(offset);
        offset += line.chars().count() + 1;
    }
    starts
}

/// 1-based line containing the character at `offset`.
fn line_of(line_starts: &[usize], offset: usize) -> usize {
    line_starts.partition_point(|&s| s <= offset).max(1)
}

/// Converts monotonically increasing byte offsets into character offsets
/// without rescanning the text from the start each time.
#[derive(Default)]
struct CharCursor {
    byte: usize,
    chars: usize,
}

impl CharCursor {
    fn advance_to(&mut self, text: &str, byte: usize) -> usize {
        if byte > self.byte {
            self.chars += text[self.byte..byte].chars().count();
            self.byte = byte;
        }
        self.chars
    }
}

fn push_sentence(
    protected: &str,
    start: usize,
    end: usize,
    cursor: &mut CharCursor,
    line_starts: &[usize],
    units: &mut Vec<TextUnit>,
) {
    if start >= end {
        return;
    }
    let piece = &protected[start..end];
    let trimmed = piece.trim();
    if trimmed.is_empty() {
        return;
    }

    let lead = piece.len() - piece.trim_start().len();
    let first_char = cursor.advance_to(protected, start + lead);
    let last_char = cursor.advance_to(protected, start + lead + trimmed.len()) - 1;

    let content = restore_abbreviations(trimmed);
    units.push(TextUnit {
        id: unit_id(&content),
        content,
        start_line: line_of(line_starts, first_char),
        end_line: line_of(line_starts, last_char),
        kind: UnitKind::Sentence,
        title: None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(units: &[TextUnit]) -> Vec<&str> {
        units.iter().map(|u| u.content.as_str()).collect()
    }

    #[test]
    fn test_splits_on_terminal_punctuation() {
        let units = segment_sentences("First one. Second one! Third one? Fourth");
        assert_eq!(
            contents(&units),
            vec!["First one.", "Second one!", "Third one?", "Fourth"]
        );
    }

    #[test]
    fn test_abbreviations_do_not_split() {
        let text = "Dr. Smith et al. compared pens vs. pencils, i.e. tools. See p. 12 etc. for more.";
        let units = segment_sentences(text);
        assert_eq!(
            contents(&units),
            vec![
                "Dr. Smith et al. compared pens vs. pencils, i.e. tools.",
                "See p. 12 etc. for more."
            ]
        );
    }

    #[test]
    fn test_abbreviation_match_is_case_insensitive() {
        let units = segment_sentences("Results are in FIG. 3 below. Next sentence.");
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].content, "Results are in FIG. 3 below.");
    }

    #[test]
    fn test_no_split_without_following_whitespace() {
        let units = segment_sentences("Version 2.5 shipped. Done.");
        assert_eq!(contents(&units), vec!["Version 2.5 shipped.", "Done."]);
    }

    #[test]
    fn test_blank_line_ends_sentence() {
        let units = segment_sentences("A heading without dot\n\nBody sentence here.");
        assert_eq!(
            contents(&units),
            vec!["A heading without dot", "Body sentence here."]
        );
    }

    #[test]
    fn test_line_attribution() {
        let text = "Line one starts. It continues\nonto line two.\n\nLast line é.";
        let units = segment_sentences(text);
        assert_eq!(units.len(), 3);
        assert_eq!((units[0].start_line, units[0].end_line), (1, 1));
        assert_eq!((units[1].start_line, units[1].end_line), (1, 2));
        assert_eq!((units[2].start_line, units[2].end_line), (4, 4));
    }

    #[test]
    fn test_placeholder_never_leaks() {
        let units = segment_sentences("See cf. the appendix. Also e.g. this.");
        assert!(units.iter().all(|u| !u.content.contains(PLACEHOLDER)));
        assert!(units.iter().all(|u| u.kind == UnitKind::Sentence));
    }
}
