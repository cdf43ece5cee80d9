//! Blank-line delimited paragraphs.

use super::{partition_into_units, Block};
use crate::models::{TextUnit, UnitKind};

/// Consecutive non-blank lines form one paragraph.
pub fn segment_paragraphs(text: &str) -> Vec<TextUnit> {
    let lines: Vec<&str> = text.lines().collect();
    let blocks = split_at_blank_lines(&lines);
    if blocks.is_empty() {
        return Vec::new();
    }
    partition_into_units(&lines, blocks, UnitKind::Paragraph)
}

fn split_at_blank_lines(lines: &[&str]) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut block_start = None;

    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            if let Some(start) = block_start.take() {
                blocks.push(Block {
                    start,
                    end: i - 1,
                    title: None,
                });
            }
        } else if block_start.is_none() {
            block_start = Some(i);
        }
    }

    // Last block
    if let Some(start) = block_start {
        blocks.push(Block {
            start,
            end: lines.len() - 1,
            title: None,
        });
    }

    blocks
}
