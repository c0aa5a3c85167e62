//! Search expression normalization.
//!
//! An expression such as `kinase or receptor-binding` is split on the
//! connective `or` into alternative terms. Each term is indexed under its
//! prefix key (the text before the first hyphen) so a highlight that stops
//! short of a hyphenated compound can be matched back to the full term.

use std::collections::BTreeMap;

/// Lookup table from lowercase prefix key to the full terms sharing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixMap {
    entries: BTreeMap<String, Vec<String>>,
}

impl PrefixMap {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Full terms sharing a prefix key.
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// The full term `text` spells exactly (case-insensitive), if any.
    pub fn exact_term(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.entries
            .values()
            .flatten()
            .find(|t| **t == lower)
            .map(String::as_str)
    }

    /// Full terms that begin with `span`, longest first.
    pub fn candidates_for(&self, span: &str) -> Vec<&str> {
        let lower = span.to_lowercase();
        if lower.is_empty() {
            return Vec::new();
        }
        let mut found: Vec<&str> = self
            .entries
            .values()
            .flatten()
            .filter(|t| t.starts_with(&lower))
            .map(String::as_str)
            .collect();
        found.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        found.dedup();
        found
    }

    fn insert(&mut self, term: String) {
        let key = prefix_key(&term).to_string();
        let slot = self.entries.entry(key).or_default();
        if !slot.contains(&term) {
            slot.push(term);
        }
    }
}

/// Text before the first hyphen, or the whole term.
pub fn prefix_key(term: &str) -> &str {
    term.split_once('-').map(|(head, _)| head).unwrap_or(term)
}

/// Split an expression into its alternative terms, lowercased and trimmed.
pub fn split_alternatives(expression: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for word in expression.split_whitespace() {
        if word.eq_ignore_ascii_case("or") {
            push_term(&mut terms, &current);
            current.clear();
        } else {
            current.push(word);
        }
    }
    push_term(&mut terms, &current);
    terms
}

fn push_term(terms: &mut Vec<String>, words: &[&str]) {
    let joined = words.join(" ");
    let trimmed = joined
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_lowercase();
    if !trimmed.is_empty() && !terms.contains(&trimmed) {
        terms.push(trimmed);
    }
}

/// Build the prefix map for an expression. An empty expression yields an empty map.
pub fn split_terms(expression: &str) -> PrefixMap {
    let mut map = PrefixMap::default();
    for term in split_alternatives(expression) {
        map.insert(term);
    }
    map
}
