//! Expansion of wildcard and negated terms into concrete prefixes.

use std::sync::Arc;

use tracing::debug;

use crate::{
    error::Result,
    flatten::PATH_SEPARATOR,
    pattern_store::{LikePattern, PatternStore},
};

/// Prefixes a term expanded to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expansion {
    pub prefixes: Vec<String>,
    pub limit: usize,
    /// More prefixes matched than `limit` allowed.
    pub truncated: bool,
}

impl Expansion {
    /// Whether at least one stored prefix matched. A term that found nothing
    /// contributes the empty set.
    pub fn found(&self) -> bool {
        !self.prefixes.is_empty()
    }

    fn bounded(mut prefixes: Vec<String>, limit: usize) -> Self {
        let truncated = prefixes.len() > limit;
        prefixes.truncate(limit);
        Self {
            prefixes,
            limit,
            truncated,
        }
    }
}

/// Resolves `*`/`?` and `!` terms against a [`PatternStore`].
#[derive(Clone)]
pub struct PatternResolver {
    store: Arc<dyn PatternStore>,
}

impl PatternResolver {
    pub fn new(store: Arc<dyn PatternStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn PatternStore {
        self.store.as_ref()
    }

    /// Expand a wildcard term to at most `limit` stored prefixes, shortest
    /// first.
    ///
    /// A term without wildcard characters is looked up exactly.
    pub fn resolve_wildcard(&self, term: &str, limit: usize) -> Result<Expansion> {
        let pattern = LikePattern::parse(term);

        if let Some(literal) = pattern.as_literal() {
            let prefixes = if self.store.contains(&literal)? {
                vec![literal]
            } else {
                Vec::new()
            };
            return Ok(Expansion::bounded(prefixes, limit));
        }

        let matched = self.store.matching(&pattern, limit.saturating_add(1))?;
        let expansion = Expansion::bounded(matched, limit);
        debug!(
            term,
            pattern = %pattern,
            matched = expansion.prefixes.len(),
            truncated = expansion.truncated,
            "expanded wildcard"
        );
        Ok(expansion)
    }

    /// Expand a negated term (without its leading `!`) to at most `limit`
    /// prefixes that do not match it, in lexicographic order.
    ///
    /// A field-qualified term (`f:v`, `f:g:v`) only considers prefixes that
    /// start with its field path; a bare term considers every prefix.
    pub fn resolve_negation(&self, term: &str, limit: usize) -> Result<Expansion> {
        let pattern = LikePattern::parse(term);
        let scope = negation_scope(term).map(|s| LikePattern::parse(s).followed_by_any());

        let matched =
            self.store
                .excluding(scope.as_ref(), &pattern, limit.saturating_add(1))?;
        let expansion = Expansion::bounded(matched, limit);
        debug!(
            term,
            scope = scope.as_ref().map(ToString::to_string),
            matched = expansion.prefixes.len(),
            truncated = expansion.truncated,
            "expanded negation"
        );
        Ok(expansion)
    }
}

/// Every segment but the last of a colon-separated term, or `None` for a
/// single-segment term.
pub fn negation_scope(term: &str) -> Option<&str> {
    term.rsplit_once(PATH_SEPARATOR).map(|(scope, _)| scope)
}

impl std::fmt::Debug for PatternResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;
    use crate::pattern_store::TantivyPatternStore;

    fn resolver(prefixes: &[&str]) -> PatternResolver {
        let store = TantivyPatternStore::open_in_ram().unwrap();
        store.rebuild(prefixes.iter().copied()).unwrap();
        PatternResolver::new(Arc::new(store))
    }

    #[test]
    fn literal_term_is_an_exact_lookup() {
        let resolver = resolver(&["name:mark", "name:marks"]);
        let expansion = resolver.resolve_wildcard("name:mark", 20).unwrap();
        assert_eq!(expansion.prefixes, vec!["name:mark"]);
        assert!(!expansion.truncated);

        let missing = resolver.resolve_wildcard("name:mar", 20).unwrap();
        assert!(!missing.found());
    }

    #[test]
    fn wildcard_requires_a_stored_superstring() {
        let resolver = resolver(&["name:mark"]);
        let expansion = resolver.resolve_wildcard("name:mark?", 20).unwrap();
        assert!(!expansion.found());
    }

    #[test]
    fn wildcard_truncation_is_reported() {
        let resolver = resolver(&["a:b", "a:bb", "a:bbb"]);

        let exact_fit = resolver.resolve_wildcard("a:b*", 3).unwrap();
        assert!(!exact_fit.truncated);

        let cut = resolver.resolve_wildcard("a:b*", 2).unwrap();
        assert_eq!(cut.prefixes, vec!["a:b", "a:bb"]);
        assert!(cut.truncated);
        assert_eq!(cut.limit, 2);
    }

    #[test]
    fn negation_scope_splits_on_last_separator() {
        assert_eq!(negation_scope("type:p"), Some("type"));
        assert_eq!(negation_scope("ids:type:passport"), Some("ids:type"));
        assert_eq!(negation_scope("passport"), None);
    }

    #[test]
    fn field_qualified_negation_stays_in_field() {
        let resolver = resolver(&["type:p", "type:v", "name:v", "typeset:x"]);
        let expansion = resolver.resolve_negation("type:p", 200).unwrap();
        assert_eq!(expansion.prefixes, vec!["type:v", "typeset:x"]);
    }

    #[test]
    fn bare_negation_spans_all_prefixes() {
        let resolver = resolver(&["type:p", "type:v", "name:v"]);
        let bare = resolver.resolve_negation("p", 200).unwrap();
        assert_eq!(bare.prefixes, vec!["name:v", "type:p", "type:v"]);
    }

    #[test]
    fn negation_with_wildcards() {
        let resolver = resolver(&["name:mark", "name:marko", "name:ivan"]);
        let expansion = resolver.resolve_negation("name:mark*", 200).unwrap();
        assert_eq!(expansion.prefixes, vec!["name:ivan"]);
    }

    #[test]
    fn negation_truncates_lexicographically() {
        let resolver = resolver(&["n:c", "n:a", "n:b", "n:x"]);
        let expansion = resolver.resolve_negation("n:x", 2).unwrap();
        assert_eq!(expansion.prefixes, vec!["n:a", "n:b"]);
        assert!(expansion.truncated);
    }

    /// Whole-string match with `*` and `?`, by plain recursion.
    fn like(pattern: &[char], text: &[char]) -> bool {
        match pattern.split_first() {
            None => text.is_empty(),
            Some(('*', rest)) => (0..=text.len()).any(|i| like(rest, &text[i..])),
            Some(('?', rest)) => !text.is_empty() && like(rest, &text[1..]),
            Some((c, rest)) => text.first() == Some(c) && like(rest, &text[1..]),
        }
    }

    fn like_str(pattern: &str, text: &str) -> bool {
        let pattern: Vec<char> = pattern.chars().collect();
        let text: Vec<char> = text.chars().collect();
        like(&pattern, &text)
    }

    /// Replace characters of `literal` with `?` (mask 1) or `*` (mask 2).
    fn generalize(literal: &str, mask: &[u8]) -> String {
        literal
            .chars()
            .enumerate()
            .map(|(i, c)| match mask.get(i) {
                Some(1) => '?',
                Some(2) => '*',
                _ => c,
            })
            .collect()
    }

    fn corpus() -> impl Strategy<Value = BTreeSet<String>> {
        prop::collection::btree_set("(a|b|ab)(:x|:y)?:[abc]{1,4}", 1..30)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn wildcard_expansion_contains_every_generalized_literal(
            prefixes in corpus(),
            pick in any::<prop::sample::Index>(),
            mask in prop::collection::vec(0u8..3, 0..12),
        ) {
            let prefixes: Vec<&str> = prefixes.iter().map(String::as_str).collect();
            let literal = prefixes[pick.index(prefixes.len())];
            let term = generalize(literal, &mask);

            let expansion = resolver(&prefixes).resolve_wildcard(&term, 10_000).unwrap();
            prop_assert!(expansion.prefixes.iter().any(|p| p == literal), "{term}");
            for prefix in &expansion.prefixes {
                prop_assert!(like_str(&term, prefix), "{term} matched {prefix}");
            }
        }

        #[test]
        fn negation_is_the_complement_within_its_scope(
            prefixes in corpus(),
            pick in any::<prop::sample::Index>(),
            mask in prop::collection::vec(0u8..3, 0..12),
        ) {
            let prefixes: Vec<&str> = prefixes.iter().map(String::as_str).collect();
            let term = generalize(prefixes[pick.index(prefixes.len())], &mask);
            let scope = negation_scope(&term).map(|s| format!("{s}*"));

            let expansion = resolver(&prefixes).resolve_negation(&term, 10_000).unwrap();
            let want: Vec<&str> = prefixes
                .iter()
                .copied()
                .filter(|p| scope.as_deref().is_none_or(|s| like_str(s, p)))
                .filter(|p| !like_str(&term, p))
                .collect();
            prop_assert_eq!(expansion.prefixes, want, "{}", term);
        }
    }
}
