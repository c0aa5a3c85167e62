//! Disambiguation of highlighted full-text snippets.
//!
//! The full-text index marks matches with [`HIGHLIGHT_START`] /
//! [`HIGHLIGHT_STOP`]. Its tokenizer does not know the user's original
//! terms, so a highlight may cover only part of a hyphenated compound
//! (`<b>receptor</b>-<b>binding</b>`) or a truncated stem (`<b>kin</b>ase`),
//! or it may be stemming noise unrelated to any term. [`disambiguate`]
//! reconciles every highlighted span against the [`PrefixMap`] and keeps
//! only confirmed terms, each with short context windows.

use tracing::trace;

use crate::models::TermContexts;
use crate::terms::PrefixMap;

pub const HIGHLIGHT_START: &str = "<b>";
pub const HIGHLIGHT_STOP: &str = "</b>";

/// Characters of snippet text kept on each side of a match.
pub const DEFAULT_CONTEXT_WINDOW: usize = 20;

/// A highlighted region of a snippet, in byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span<'a> {
    /// Offset of the start marker.
    start: usize,
    /// Offset just past the stop marker.
    end: usize,
    text: &'a str,
}

fn spans(snippet: &str) -> Vec<Span<'_>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(rel) = snippet[pos..].find(HIGHLIGHT_START) {
        let start = pos + rel;
        let text_start = start + HIGHLIGHT_START.len();
        let Some(stop_rel) = snippet[text_start..].find(HIGHLIGHT_STOP) else {
            break;
        };
        let text_end = text_start + stop_rel;
        let end = text_end + HIGHLIGHT_STOP.len();
        out.push(Span {
            start,
            end,
            text: &snippet[text_start..text_end],
        });
        pos = end;
    }
    out
}

/// A span only counts when it starts a token: the character before it
/// (ignoring a run of `;` list separators) is not part of a word.
fn at_token_start(snippet: &str, marker_start: usize) -> bool {
    let before = snippet[..marker_start].trim_end_matches(';');
    match before.chars().next_back() {
        None => true,
        Some(c) => !(c.is_alphanumeric() || c == '_' || c == '-'),
    }
}

/// Match `remainder` against the snippet text starting at `from`, stepping
/// over highlight markers. Returns the offset just past the matched text.
fn match_following(snippet: &str, from: usize, remainder: &str) -> Option<usize> {
    let mut pos = from;
    for expected in remainder.chars() {
        pos = skip_markers(snippet, pos);
        let actual = snippet[pos..].chars().next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
        pos += actual.len_utf8();
    }
    if snippet[pos..].starts_with(HIGHLIGHT_STOP) {
        pos += HIGHLIGHT_STOP.len();
    }
    Some(pos)
}

fn skip_markers(snippet: &str, mut pos: usize) -> usize {
    loop {
        let rest = &snippet[pos..];
        if rest.starts_with(HIGHLIGHT_START) {
            pos += HIGHLIGHT_START.len();
        } else if rest.starts_with(HIGHLIGHT_STOP) {
            pos += HIGHLIGHT_STOP.len();
        } else {
            return pos;
        }
    }
}

/// Byte offset `window` characters before `pos`. Markers are stepped over
/// without counting.
fn window_start(snippet: &str, mut pos: usize, window: usize) -> usize {
    let mut taken = 0;
    while pos > 0 {
        let before = &snippet[..pos];
        if before.ends_with(HIGHLIGHT_STOP) {
            pos -= HIGHLIGHT_STOP.len();
        } else if before.ends_with(HIGHLIGHT_START) {
            pos -= HIGHLIGHT_START.len();
        } else if taken < window {
            match before.char_indices().next_back() {
                Some((idx, _)) => pos = idx,
                None => break,
            }
            taken += 1;
        } else {
            break;
        }
    }
    pos
}

/// Byte offset `window` characters after `pos`. Markers are stepped over
/// without counting.
fn window_end(snippet: &str, mut pos: usize, window: usize) -> usize {
    let mut taken = 0;
    while pos < snippet.len() {
        let rest = &snippet[pos..];
        if rest.starts_with(HIGHLIGHT_START) {
            pos += HIGHLIGHT_START.len();
        } else if rest.starts_with(HIGHLIGHT_STOP) {
            pos += HIGHLIGHT_STOP.len();
        } else if taken < window {
            match rest.chars().next() {
                Some(c) => pos += c.len_utf8(),
                None => break,
            }
            taken += 1;
        } else {
            break;
        }
    }
    pos
}

fn context_window(snippet: &str, start: usize, end: usize, window: usize) -> String {
    let from = window_start(snippet, start, window);
    let to = window_end(snippet, end, window);
    snippet[from..to].to_string()
}

/// Resolve one highlighted span to a full term and the end of its match.
fn resolve<'t>(
    snippet: &str,
    span: &Span<'_>,
    prefixes: &'t PrefixMap,
) -> Option<(&'t str, usize)> {
    if let Some(term) = prefixes.exact_term(span.text) {
        return Some((term, span.end));
    }
    let lower = span.text.to_lowercase();
    for candidate in prefixes.candidates_for(&lower) {
        let remainder = &candidate[lower.len()..];
        if remainder.is_empty() {
            return Some((candidate, span.end));
        }
        if let Some(end) = match_following(snippet, span.end, remainder) {
            return Some((candidate, end));
        }
    }
    None
}

/// Confirm the terms highlighted in one snippet.
///
/// Returns lowercase term → context windows (one per occurrence).
pub fn disambiguate(snippet: &str, prefixes: &PrefixMap, window: usize) -> TermContexts {
    let mut contexts = TermContexts::new();
    if prefixes.is_empty() {
        return contexts;
    }
    for span in spans(snippet) {
        if span.text.trim().is_empty() || !at_token_start(snippet, span.start) {
            continue;
        }
        match resolve(snippet, &span, prefixes) {
            Some((term, end)) => {
                contexts
                    .entry(term.to_string())
                    .or_default()
                    .push(context_window(snippet, span.start, end, window));
            }
            None => trace!(span = span.text, "discarding highlight with no matching term"),
        }
    }
    contexts
}

/// Confirm the terms of every snippet of one document.
pub fn disambiguate_all<S: AsRef<str>>(
    snippets: &[S],
    prefixes: &PrefixMap,
    window: usize,
) -> TermContexts {
    let mut contexts = TermContexts::new();
    for snippet in snippets {
        merge_contexts(&mut contexts, disambiguate(snippet.as_ref(), prefixes, window));
    }
    contexts
}

pub fn merge_contexts(into: &mut TermContexts, from: TermContexts) {
    for (term, windows) in from {
        into.entry(term).or_default().extend(windows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terms::split_terms;

    #[test]
    fn truncated_highlight_is_reconstructed() {
        let map = split_terms("kinase");
        let found = disambiguate("protein <b>kin</b>ase activity", &map, 20);
        assert_eq!(found.len(), 1);
        assert_eq!(
            found["kinase"],
            vec!["protein <b>kin</b>ase activity".to_string()]
        );
    }

    #[test]
    fn unrelated_highlight_is_discarded() {
        let map = split_terms("kinase");
        assert!(disambiguate("alpha <b>tubulin</b> beta", &map, 20).is_empty());
    }

    #[test]
    fn hyphen_compound_with_nested_marker() {
        let map = split_terms("receptor-binding or kinase");
        let found = disambiguate("x <b>receptor</b>-<b>binding</b> domain", &map, 20);
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["receptor-binding"]);
    }

    #[test]
    fn prefix_without_expected_remainder_is_discarded() {
        let map = split_terms("receptor-binding");
        assert!(disambiguate("the <b>receptor</b> alone", &map, 20).is_empty());
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let map = split_terms("brca1");
        let found = disambiguate("P1,<b>BRCA1</b>,0.5 P2,<b>brca1</b>,0.7", &map, 20);
        assert_eq!(found["brca1"].len(), 2);
    }

    #[test]
    fn mid_word_spans_are_ignored() {
        let map = split_terms("ase");
        assert!(disambiguate("kin<b>ase</b> and foo-<b>ase</b>", &map, 20).is_empty());
        let found = disambiguate("list ;;<b>ase</b> ok", &map, 20);
        assert!(found.contains_key("ase"));
    }

    #[test]
    fn windows_are_clipped_to_snippet_bounds() {
        let map = split_terms("tp53");
        let found = disambiguate("<b>TP53</b>", &map, 20);
        assert_eq!(found["tp53"], vec!["<b>TP53</b>".to_string()]);

        let long = format!("{}<b>TP53</b>{}", "a ".repeat(30), " z".repeat(30));
        let window = &disambiguate(&long, &map, 5)["tp53"][0];
        assert_eq!(window, " a a <b>TP53</b> z z ");
    }

    #[test]
    fn windows_respect_utf8_boundaries() {
        let map = split_terms("akt1");
        let found = disambiguate("ééééé <b>AKT1</b> ööööö", &map, 3);
        let window = &found["akt1"][0];
        assert!(window.contains("<b>AKT1</b>"));
    }

    #[test]
    fn snippets_merge_per_document() {
        let map = split_terms("a1 or b2");
        let all = disambiguate_all(&["<b>A1</b> x", "y <b>B2</b>", "<b>a1</b>"], &map, 20);
        assert_eq!(all["a1"].len(), 2);
        assert_eq!(all["b2"].len(), 1);
    }

    #[test]
    fn empty_prefix_map_confirms_nothing() {
        assert!(disambiguate("<b>x</b>", &PrefixMap::default(), 20).is_empty());
    }

    #[test]
    fn windows_count_characters_not_bytes() {
        let map = split_terms("akt1");
        let snippet = format!("{} <b>AKT1</b> {}", "é".repeat(30), "ö".repeat(30));
        let window = &disambiguate(&snippet, &map, 20)["akt1"][0];
        let expected = format!("{} <b>AKT1</b> {}", "é".repeat(19), "ö".repeat(19));
        assert_eq!(window, &expected);
    }

    #[test]
    fn markers_do_not_use_up_the_window() {
        let map = split_terms("tp53");
        let found = disambiguate("ab <b>x</b> <b>TP53</b> <b>y</b> cd", &map, 4);
        assert_eq!(found["tp53"], vec!["b <b>x</b> <b>TP53</b> <b>y</b> c".to_string()]);
    }

    #[test]
    fn exact_term_wins_over_longer_reconstruction() {
        let map = split_terms("kin or kinase");
        let found = disambiguate("x <b>kin</b>ase y", &map, 20);
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["kin"]);
    }
}
