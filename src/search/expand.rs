//! Dictionary-based bilingual query expansion.
//!
//! Every matched term yields its own variants (one per translation). Terms
//! are never combined into a single variant, so a query mentioning three
//! known terms with one translation each produces four variants, not eight.

use anyhow::{Context, Result};
use regex::{NoExpand, Regex, RegexBuilder};
use serde::Deserialize;
use std::path::Path;

/// Built-in English/French academic vocabulary, both directions.
const BUILTIN_TERMS: &[(&str, &[&str])] = &[
    ("bloom's taxonomy", &["taxonomie de bloom"]),
    ("taxonomie de bloom", &["bloom's taxonomy"]),
    ("literature review", &["revue de littérature", "revue de la littérature"]),
    ("revue de littérature", &["literature review"]),
    ("revue de la littérature", &["literature review"]),
    ("research question", &["question de recherche"]),
    ("question de recherche", &["research question"]),
    ("learning outcomes", &["acquis d'apprentissage", "résultats d'apprentissage"]),
    ("acquis d'apprentissage", &["learning outcomes"]),
    ("higher education", &["enseignement supérieur"]),
    ("enseignement supérieur", &["higher education"]),
    ("assessment", &["évaluation"]),
    ("évaluation", &["assessment", "evaluation"]),
    ("case study", &["étude de cas"]),
    ("étude de cas", &["case study"]),
    ("qualitative research", &["recherche qualitative"]),
    ("recherche qualitative", &["qualitative research"]),
    ("quantitative research", &["recherche quantitative"]),
    ("recherche quantitative", &["quantitative research"]),
    ("theoretical framework", &["cadre théorique"]),
    ("cadre théorique", &["theoretical framework"]),
    ("teacher training", &["formation des enseignants"]),
    ("formation des enseignants", &["teacher training"]),
    ("active learning", &["apprentissage actif"]),
    ("apprentissage actif", &["active learning"]),
    ("critical thinking", &["pensée critique", "esprit critique"]),
    ("pensée critique", &["critical thinking"]),
    ("esprit critique", &["critical thinking"]),
    ("feedback", &["rétroaction"]),
    ("rétroaction", &["feedback"]),
    ("curriculum", &["programme d'études"]),
    ("programme d'études", &["curriculum"]),
    ("pedagogy", &["pédagogie"]),
    ("pédagogie", &["pedagogy"]),
];

/// A dictionary entry as stored in an expansion-terms JSON file:
/// `[{"term": "peer review", "translations": ["évaluation par les pairs"]}]`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpansionTerm {
    pub term: String,
    pub translations: Vec<String>,
}

struct CompiledTerm {
    pattern: Regex,
    translations: Vec<String>,
}

/// Ordered term dictionary with precompiled case-insensitive matchers.
pub struct QueryExpander {
    terms: Vec<CompiledTerm>,
}

impl QueryExpander {
    pub fn new(terms: Vec<ExpansionTerm>) -> Result<Self> {
        let terms = terms
            .into_iter()
            .filter(|t| !t.term.trim().is_empty())
            .map(|t| {
                let pattern = RegexBuilder::new(&regex::escape(&t.term))
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("Invalid expansion term: {}", t.term))?;
                Ok(CompiledTerm {
                    pattern,
                    translations: t.translations,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { terms })
    }

    /// The built-in English/French vocabulary.
    pub fn builtin() -> Result<Self> {
        Self::new(builtin_terms())
    }

    /// Built-in vocabulary followed by the entries of `path`.
    pub fn with_terms_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read expansion terms from {}", path.display()))?;
        let extra: Vec<ExpansionTerm> = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse expansion terms in {}", path.display()))?;
        tracing::info!("Loaded {} extra expansion terms from {}", extra.len(), path.display());

        let mut terms = builtin_terms();
        terms.extend(extra);
        Self::new(terms)
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Query variants, the unmodified query first. Duplicates are skipped.
    pub fn expand(&self, query: &str) -> Vec<String> {
        let mut variants = vec![query.to_string()];

        for term in &self.terms {
            if !term.pattern.is_match(query) {
                continue;
            }
            for translation in &term.translations {
                let variant = term
                    .pattern
                    .replace_all(query, NoExpand(translation))
                    .into_owned();
                if !variants.contains(&variant) {
                    variants.push(variant);
                }
            }
        }

        variants
    }
}

fn builtin_terms() -> Vec<ExpansionTerm> {
    BUILTIN_TERMS
        .iter()
        .map(|(term, translations)| ExpansionTerm {
            term: term.to_string(),
            translations: translations.iter().map(|t| t.to_string()).collect(),
        })
        .collect()
}
