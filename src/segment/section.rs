//! Heading-delimited sections.

use super::{parse_heading, partition_into_units, Block};
use crate::models::{TextUnit, UnitKind};

/// Title given to content that precedes the first heading.
pub const INTRODUCTION_TITLE: &str = "Introduction";

/// Split at heading lines. Each heading opens a section that runs until the
/// next heading; text before the first heading becomes an implicit
/// "Introduction" section. Whitespace-only sections are dropped.
pub fn segment_sections(text: &str) -> Vec<TextUnit> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let mut blocks = Vec::new();
    let mut current_title = INTRODUCTION_TITLE.to_string();
    let mut current_start = 0usize;

    for (i, line) in lines.iter().enumerate() {
        if let Some((_, title)) = parse_heading(line) {
            if i > current_start {
                blocks.push(Block {
                    start: current_start,
                    end: i - 1,
                    title: Some(std::mem::take(&mut current_title)),
                });
            }
            current_title = title;
            current_start = i;
        }
    }
    blocks.push(Block {
        start: current_start,
        end: lines.len() - 1,
        title: Some(current_title),
    });

    blocks.retain(|b| lines[b.start..=b.end].iter().any(|l| !l.trim().is_empty()));

    partition_into_units(&lines, blocks, UnitKind::Section)
}
