//! Listwise LLM reranking.
//!
//! One completion call sees the query and a numbered list of candidates and
//! answers with the numbers in relevance order. The reranker only reorders:
//! it never adds or drops a candidate, and a response it cannot read leaves
//! the input untouched.

use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use super::CompletionProvider;
use crate::models::Recommendation;

/// Characters of the query shown to the model.
const QUERY_EXCERPT_CHARS: usize = 500;
/// Characters of each candidate preview shown to the model.
const PREVIEW_CHARS: usize = 200;

static INTEGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("integer pattern is valid"));

pub struct Reranker {
    completion: Arc<dyn CompletionProvider>,
    /// Candidates beyond this many are appended unchanged.
    cap: usize,
}

impl Reranker {
    pub fn new(completion: Arc<dyn CompletionProvider>, cap: usize) -> Self {
        Self {
            completion,
            cap: cap.max(1),
        }
    }

    /// Reorder `candidates` by LLM judgement. Errors only when the completion
    /// call itself fails.
    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<Recommendation>,
    ) -> Result<Vec<Recommendation>> {
        if candidates.len() < 2 {
            return Ok(candidates);
        }

        let n = candidates.len().min(self.cap);
        let rest = candidates.split_off(n);
        let considered = candidates;

        let prompt = build_listwise_prompt(query, &considered);
        let response = self.completion.complete(&prompt, &[]).await?;

        let ranking = parse_ranking(&response, n);
        if ranking.is_empty() {
            tracing::warn!(
                "Rerank response had no usable ranking, keeping retrieval order. Raw: {}",
                truncate_chars(&response, 200)
            );
            let mut unchanged = considered;
            unchanged.extend(rest);
            return Ok(unchanged);
        }

        tracing::debug!("Reranked {n} candidates, {} ranked explicitly", ranking.len());
        let mut reranked = apply_ranking(considered, &ranking);
        reranked.extend(rest);
        Ok(reranked)
    }
}

fn build_listwise_prompt(query: &str, candidates: &[Recommendation]) -> String {
    let mut list = String::new();
    for (i, c) in candidates.iter().enumerate() {
        let preview = truncate_chars(&c.preview.replace('\n', " "), PREVIEW_CHARS);
        list.push_str(&format!("{}. {} - {}\n", i + 1, c.title, preview));
    }

    format!(
        "You are ranking bibliography entries by relevance to a passage of a document.\n\n\
         Passage:\n\"\"\"\n{}\n\"\"\"\n\n\
         Candidates:\n{list}\n\
         Respond with ONLY the candidate numbers, most relevant first, separated by commas. \
         Example: 3, 1, 2",
        truncate_chars(query, QUERY_EXCERPT_CHARS)
    )
}

/// 0-based candidate indices in the order the model ranked them. Keeps the
/// first occurrence of every integer in `[1, n]`; everything else is ignored.
fn parse_ranking(response: &str, n: usize) -> Vec<usize> {
    let mut seen = HashSet::new();
    INTEGER_RE
        .find_iter(response)
        .filter_map(|m| m.as_str().parse::<usize>().ok())
        .filter(|&k| (1..=n).contains(&k))
        .filter(|&k| seen.insert(k))
        .map(|k| k - 1)
        .collect()
}

/// Ranked candidates first, then unmentioned ones in their original order.
/// Scores become `(n - position) / n` so they fall with the new position.
fn apply_ranking(considered: Vec<Recommendation>, ranking: &[usize]) -> Vec<Recommendation> {
    let n = considered.len();
    let mut slots: Vec<Option<Recommendation>> = considered.into_iter().map(Some).collect();

    let mut ordered: Vec<Recommendation> = ranking
        .iter()
        .filter_map(|&i| slots.get_mut(i).and_then(Option::take))
        .collect();
    ordered.extend(slots.into_iter().flatten());

    for (position, candidate) in ordered.iter_mut().enumerate() {
        candidate.similarity = (n - position) as f32 / n as f32;
    }
    ordered
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
