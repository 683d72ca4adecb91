//! Fuzzy matching over node keys.
//!
//! Scores combine edit similarity (whole key, trailing segments, and
//! per-token) with token-set Jaccard overlap. A score of 1.0 is an exact
//! match; unrelated keys land near zero.

use super::Tree;
use crate::node::{Kind, Node, NodeId};
use rustc_hash::FxHashSet;
use strsim::normalized_levenshtein;

/// Candidates scoring below this are dropped by [`Tree::search`].
const MIN_SCORE: f64 = 0.45;

/// Weight of the edit-distance part of a score; the rest is token overlap.
const EDIT_WEIGHT: f64 = 0.8;

/// Lowercase and collapse whitespace, dropping brackets and dashes.
fn refine(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '-'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Split on separators and on lower-to-upper camel case humps.
fn tokens(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in raw.chars() {
        if c.is_whitespace() || matches!(c, '.' | '_' | '-' | '/' | '(' | ')') {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn jaccard(a: &[String], b: &[String]) -> f64 {
    let a: FxHashSet<&str> = a.iter().map(String::as_str).collect();
    let b: FxHashSet<&str> = b.iter().map(String::as_str).collect();
    let inter = a.intersection(&b).count();
    let union = a.len() + b.len() - inter;
    if union == 0 { 0.0 } else { inter as f64 / union as f64 }
}

/// Similarity of a free-text `query` to a dotted `key`, in `0.0..=1.0`.
pub fn similarity(query: &str, key: &str) -> f64 {
    let query = refine(query);
    let key = key.to_lowercase();
    if query.is_empty() || key.is_empty() {
        return 0.0;
    }

    let whole = normalized_levenshtein(&query, &key);

    let depth = query.split('.').count();
    let segments: Vec<&str> = key.split('.').collect();
    let suffix = segments[segments.len().saturating_sub(depth)..].join(".");
    let trailing = normalized_levenshtein(&query, &suffix);

    let query_tokens = tokens(&query);
    let key_tokens = tokens(&key);
    let per_token = if query_tokens.is_empty() {
        0.0
    } else {
        query_tokens
            .iter()
            .map(|q| {
                key_tokens
                    .iter()
                    .map(|k| normalized_levenshtein(q, k))
                    .fold(0.0, f64::max)
            })
            .sum::<f64>()
            / query_tokens.len() as f64
    };

    let edit = whole.max(trailing).max(per_token * 0.9);
    EDIT_WEIGHT * edit + (1.0 - EDIT_WEIGHT) * jaccard(&query_tokens, &key_tokens)
}

impl Tree {
    /// Keys closest to `query`, best first.
    pub fn suggest(&self, query: &str, n: usize) -> Vec<String> {
        let mut scored: Vec<(f64, &Node)> = self
            .nodes()
            .map(|node| (similarity(query, node.key.as_str()), node))
            .collect();
        sort_by_score(&mut scored);
        scored
            .into_iter()
            .take(n)
            .map(|(_, node)| node.key.to_string())
            .collect()
    }

    /// Multi-term fuzzy search.
    ///
    /// Terms are applied deepest match first, each narrowing the candidates
    /// left by the previous one. Hits are ranked by their summed score and,
    /// with `kind`, truncated to that kind (duplicates removed).
    pub fn search(&self, terms: &[&str], n_best: usize, kind: Option<Kind>) -> Vec<&Node> {
        let mut ordered: Vec<(&str, usize)> = terms
            .iter()
            .map(|term| (*term, self.best_depth(term)))
            .collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1));

        let mut candidates: Vec<(f64, &Node)> = self.nodes().map(|n| (0.0, n)).collect();
        for (term, _) in ordered {
            candidates = candidates
                .into_iter()
                .filter_map(|(total, node)| {
                    let score = similarity(term, node.key.as_str());
                    (score >= MIN_SCORE).then_some((total + score, node))
                })
                .collect();
        }
        sort_by_score(&mut candidates);

        let hits = candidates.into_iter().map(|(_, node)| node);
        match kind {
            None => hits.take(n_best).collect(),
            Some(kind) => {
                let mut seen: FxHashSet<NodeId> = FxHashSet::default();
                hits.filter_map(|node| self.truncate(node.id, kind))
                    .filter(|node| seen.insert(node.id))
                    .take(n_best)
                    .collect()
            }
        }
    }

    /// Depth of the single best match for `term`.
    fn best_depth(&self, term: &str) -> usize {
        self.nodes()
            .map(|node| (similarity(term, node.key.as_str()), node.depth))
            .fold((f64::MIN, 0), |best, cur| if cur.0 > best.0 { cur } else { best })
            .1
    }
}

/// Highest score first; ties keep tree order.
fn sort_by_score(scored: &mut [(f64, &Node)]) {
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{TreeOptions, tests::sample_lobby};
    use std::path::Path;

    fn tree() -> Tree {
        Tree::hot("dam", Path::new("/lake/dam"), sample_lobby(), TreeOptions::default(), true)
    }

    #[test]
    fn test_similarity_bounds() {
        assert!((similarity("dam.load", "dam.load") - 1.0).abs() < 1e-9);
        assert!(similarity("", "dam") == 0.0);
        assert!(similarity("mcp", "dam.prices.results.mcp") > similarity("mcp", "dam.load"));
    }

    #[test]
    fn test_refine_and_tokens() {
        assert_eq!(refine("  Day-Ahead  (DAM) "), "dayahead dam");
        assert_eq!(tokens("dam.prices_total"), vec!["dam", "prices", "total"]);
        assert_eq!(tokens("totalLoad"), vec!["total", "load"]);
    }

    #[test]
    fn test_suggest_ranks_typos() {
        let tree = tree();
        let suggestions = tree.suggest("prices.resuls", 3);
        assert_eq!(suggestions[0], "dam.prices.results");
        assert_eq!(suggestions.len(), 3);
    }

    #[test]
    fn test_search_narrows_by_terms() {
        let tree = tree();
        let hits = tree.search(&["prices", "mcp"], 5, None);
        assert_eq!(hits[0].key.as_str(), "dam.prices.results.mcp");
        assert!(hits.iter().all(|n| n.key.as_str().starts_with("dam.prices")));
    }

    #[test]
    fn test_search_truncates_to_kind() {
        let tree = tree();
        let hits = tree.search(&["volume"], 5, Some(Kind::Field));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key.as_str(), "dam.prices");
    }
}
