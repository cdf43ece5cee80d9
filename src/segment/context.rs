//! Document-level context: title and enclosing section per line.

use super::{normalize_newlines, parse_heading};
use crate::models::{DocumentContext, TextUnit};

/// Title plus a line → enclosing-section lookup, built once per document.
#[derive(Debug, Clone, Default)]
pub struct DocumentOutline {
    title: Option<String>,
    /// Index 0 is line 1.
    line_sections: Vec<Option<String>>,
}

impl DocumentOutline {
    /// The title is the first level-1 heading; every line's section is the
    /// nearest heading at or above it, at any level.
    pub fn build(text: &str) -> Self {
        let text = normalize_newlines(text);
        let mut title = None;
        let mut current: Option<String> = None;
        let mut line_sections = Vec::new();

        for line in text.lines() {
            if let Some((level, heading)) = parse_heading(line) {
                if level == 1 && title.is_none() {
                    title = Some(heading.clone());
                }
                current = Some(heading);
            }
            line_sections.push(current.clone());
        }

        Self {
            title,
            line_sections,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Enclosing section of a 1-based line, if any heading precedes it.
    pub fn section_at(&self, line: usize) -> Option<&str> {
        line.checked_sub(1)
            .and_then(|i| self.line_sections.get(i))
            .and_then(|s| s.as_deref())
    }

    pub fn context_at(&self, line: usize) -> DocumentContext {
        DocumentContext {
            title: self.title.clone(),
            current_section: self.section_at(line).map(str::to_string),
        }
    }

    /// Context for a unit. Uses the unit's last line: leading lines of a
    /// unit's range can be absorbed blank lines from before its heading.
    pub fn context_for(&self, unit: &TextUnit) -> DocumentContext {
        self.context_at(unit.end_line)
    }
}

/// Prefix `content` with the document title and enclosing section.
pub fn contextual_query(context: &DocumentContext, content: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(title) = context.title.as_deref() {
        parts.push(title);
    }
    if let Some(section) = context.current_section.as_deref() {
        if context.title.as_deref() != Some(section) {
            parts.push(section);
        }
    }

    if parts.is_empty() {
        content.to_string()
    } else {
        format!("{}\n\n{}", parts.join(" > "), content)
    }
}
