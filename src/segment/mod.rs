//! Document segmentation: splits a working document into addressable units.
//!
//! Section and paragraph units partition the source lines: the first unit's
//! range starts at line 1, every unit ends on the line before the next one
//! starts, and the last unit ends on the last line. Blank separators and
//! dropped whitespace-only regions are therefore absorbed by a neighbour.

pub mod context;
pub mod paragraph;
pub mod section;
pub mod sentence;

use crate::fingerprint::unit_id;
use crate::models::{Granularity, TextUnit, UnitKind};

/// Split `text` into units at the requested granularity.
pub fn segment(text: &str, granularity: Granularity) -> Vec<TextUnit> {
    let text = normalize_newlines(text);
    if text.trim().is_empty() {
        return Vec::new();
    }

    match granularity {
        Granularity::Section => section::segment_sections(&text),
        Granularity::Paragraph => paragraph::segment_paragraphs(&text),
        Granularity::Sentence => sentence::segment_sentences(&text),
    }
}

pub(crate) fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Parse a Markdown ATX heading (`#`..`######` + space + title).
pub(crate) fn parse_heading(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim();
    if title.is_empty() {
        None
    } else {
        Some((level, title.to_string()))
    }
}

/// A block of lines found by one of the line-based splitters (0-based, inclusive).
pub(crate) struct Block {
    pub start: usize,
    pub end: usize,
    pub title: Option<String>,
}

/// Turn blocks into units whose ranges partition `[1, line_count]`.
pub(crate) fn partition_into_units(
    lines: &[&str],
    blocks: Vec<Block>,
    kind: UnitKind,
) -> Vec<TextUnit> {
    let starts: Vec<usize> = blocks.iter().map(|b| b.start).collect();
    let last_line = lines.len();

    blocks
        .into_iter()
        .enumerate()
        .map(|(i, block)| {
            let content = lines[block.start..=block.end].join("\n").trim().to_string();
            let start_line = if i == 0 { 1 } else { block.start + 1 };
            let end_line = starts.get(i + 1).copied().unwrap_or(last_line);
            TextUnit {
                id: unit_id(&content),
                content,
                start_line,
                end_line,
                kind,
                title: block.title,
            }
        })
        .collect()
}
