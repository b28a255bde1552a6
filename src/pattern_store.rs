//! Substring-matching store over the corpus of indexed prefixes.
//!
//! Wildcard and negated query terms are answered here rather than from the
//! in-memory [`PrefixIndex`](crate::prefix_index::PrefixIndex): the store
//! receives a [`LikePattern`] and returns concrete prefix strings, which the
//! evaluator then resolves to posting lists.

use std::{collections::BTreeSet, fmt, path::Path};

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    collector::Count,
    doc,
    query::TermQuery,
    schema::*,
};

use crate::error::Result;

/// Field names used in the schema.
pub mod fields {
    pub const PREFIX: &str = "prefix";
}

const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// One piece of a [`LikePattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternPart {
    Literal(String),
    /// `*` in a query term, `%` in LIKE syntax.
    AnyRun,
    /// `?` in a query term, `_` in LIKE syntax.
    AnyOne,
}

/// A whole-string match pattern with "any run" and "any one" wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LikePattern {
    parts: Vec<PatternPart>,
}

impl LikePattern {
    /// Parse a query term, treating `*` and `?` as wildcards and every
    /// other character literally.
    pub fn parse(term: &str) -> Self {
        let mut pattern = Self::default();
        for c in term.chars() {
            match c {
                '*' => pattern.parts.push(PatternPart::AnyRun),
                '?' => pattern.parts.push(PatternPart::AnyOne),
                c => pattern.push_literal(c),
            }
        }
        pattern
    }

    fn push_literal(&mut self, c: char) {
        if let Some(PatternPart::Literal(text)) = self.parts.last_mut() {
            text.push(c);
        } else {
            self.parts.push(PatternPart::Literal(c.to_string()));
        }
    }

    pub fn parts(&self) -> &[PatternPart] {
        &self.parts
    }

    pub fn has_wildcards(&self) -> bool {
        self.parts
            .iter()
            .any(|p| !matches!(p, PatternPart::Literal(_)))
    }

    /// The literal text when the pattern has no wildcards.
    pub fn as_literal(&self) -> Option<String> {
        if self.has_wildcards() {
            return None;
        }
        Some(
            self.parts
                .iter()
                .map(|p| match p {
                    PatternPart::Literal(text) => text.as_str(),
                    _ => "",
                })
                .collect(),
        )
    }

    /// This pattern followed by an any-run, i.e. "starts with".
    pub fn followed_by_any(mut self) -> Self {
        self.parts.push(PatternPart::AnyRun);
        self
    }

    /// Literal text every match starts with.
    pub fn literal_prefix(&self) -> &str {
        match self.parts.first() {
            Some(PatternPart::Literal(text)) => text,
            _ => "",
        }
    }

    pub fn matcher(&self) -> LikeMatcher {
        let mut tokens = Vec::new();
        for part in &self.parts {
            match part {
                PatternPart::Literal(text) => tokens.extend(text.chars().map(Token::Char)),
                PatternPart::AnyRun => tokens.push(Token::Run),
                PatternPart::AnyOne => tokens.push(Token::One),
            }
        }
        LikeMatcher { tokens }
    }

    /// Whether `text` matches the whole pattern.
    pub fn matches(&self, text: &str) -> bool {
        self.matcher().matches(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Char(char),
    One,
    Run,
}

/// A [`LikePattern`] flattened to one token per character, for matching
/// many candidates.
///
/// Matching backtracks only to the most recent any-run, so it never builds
/// an automaton, and its cost is bounded by the product of the pattern and
/// text lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeMatcher {
    tokens: Vec<Token>,
}

impl LikeMatcher {
    pub fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().collect();
        let (mut p, mut t) = (0, 0);
        // Token after the last any-run, and the text position it resumed at.
        let mut resume: Option<(usize, usize)> = None;

        while t < text.len() {
            match self.tokens.get(p) {
                Some(Token::Run) => {
                    p += 1;
                    resume = Some((p, t));
                    continue;
                }
                Some(Token::One) => {
                    p += 1;
                    t += 1;
                    continue;
                }
                Some(Token::Char(c)) if *c == text[t] => {
                    p += 1;
                    t += 1;
                    continue;
                }
                _ => {}
            }

            let Some((after_run, from)) = resume else {
                return false;
            };
            p = after_run;
            t = from + 1;
            resume = Some((after_run, t));
        }

        self.tokens[p..].iter().all(|token| *token == Token::Run)
    }
}

/// Renders SQL `LIKE` syntax with `\` escaping literal `%`, `_` and `\`.
impl fmt::Display for LikePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                PatternPart::Literal(text) => {
                    for c in text.chars() {
                        if matches!(c, '%' | '_' | '\\') {
                            write!(f, "\\")?;
                        }
                        write!(f, "{c}")?;
                    }
                }
                PatternPart::AnyRun => write!(f, "%")?,
                PatternPart::AnyOne => write!(f, "_")?,
            }
        }
        Ok(())
    }
}

/// Case-sensitive pattern lookups over a static corpus of prefix strings.
///
/// Implementations must be safe to share between concurrently evaluated
/// queries.
pub trait PatternStore: Send + Sync {
    /// Whether `prefix` is stored verbatim.
    fn contains(&self, prefix: &str) -> Result<bool>;

    /// Distinct stored prefixes matching `pattern`, shortest first (ties in
    /// lexicographic order), at most `limit` of them.
    fn matching(&self, pattern: &LikePattern, limit: usize)
    -> Result<Vec<String>>;

    /// Distinct stored prefixes that match `scope` (every prefix when it is
    /// `None`) but not `pattern`, in lexicographic order, at most `limit`.
    fn excluding(
        &self,
        scope: Option<&LikePattern>,
        pattern: &LikePattern,
        limit: usize,
    ) -> Result<Vec<String>>;

    /// Number of stored prefixes.
    fn len(&self) -> Result<usize>;
}

/// [`PatternStore`] backed by a Tantivy index holding one document per
/// prefix in a raw (untokenized) field.
///
/// Patterns are answered from the term dictionary, which holds each prefix
/// once in lexicographic order: a scan starts at the pattern's literal
/// prefix and stops as soon as keys leave it.
pub struct TantivyPatternStore {
    index: Index,
    reader: IndexReader,
    prefix: Field,
}

fn build_schema() -> (Schema, Field) {
    let mut builder = Schema::builder();
    let prefix = builder.add_text_field(fields::PREFIX, STRING);
    (builder.build(), prefix)
}

impl TantivyPatternStore {
    /// Open or create a pattern store at the given directory.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, _) = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(mmap_dir, schema, tantivy::IndexSettings::default())?
        };

        Self::from_index(index)
    }

    /// Create an in-memory pattern store (for tests and lexical sessions
    /// that never touch disk).
    pub fn open_in_ram() -> Result<Self> {
        let (schema, _) = build_schema();
        Self::from_index(Index::create_in_ram(schema))
    }

    fn from_index(index: Index) -> Result<Self> {
        let prefix = index.schema().get_field(fields::PREFIX)?;
        let reader = index.reader()?;
        Ok(Self {
            index,
            reader,
            prefix,
        })
    }

    /// Replace the stored corpus with `prefixes`.
    ///
    /// The new corpus becomes visible to readers only after the commit.
    pub fn rebuild<'a>(
        &self,
        prefixes: impl IntoIterator<Item = &'a str>,
    ) -> Result<usize> {
        let mut writer: IndexWriter = self.index.writer(WRITER_MEMORY_BUDGET)?;
        // Drops every segment, so no stale term survives the commit.
        writer.delete_all_documents()?;

        let mut count = 0;
        for prefix in prefixes {
            writer.add_document(doc!(self.prefix => prefix))?;
            count += 1;
        }

        writer.commit()?;
        self.reader.reload()?;
        Ok(count)
    }

    /// Visit stored prefixes starting with `lead`, in lexicographic order
    /// within each segment. Returning `false` from `visit` skips the rest
    /// of the current segment.
    fn scan(&self, lead: &str, mut visit: impl FnMut(&str) -> bool) -> Result<()> {
        let searcher = self.reader.searcher();
        for segment in searcher.segment_readers() {
            let inverted = segment.inverted_index(self.prefix)?;
            let mut terms = inverted.terms().range().ge(lead.as_bytes()).into_stream()?;
            while terms.advance() {
                let key = terms.key();
                if !key.starts_with(lead.as_bytes()) {
                    break;
                }
                let Ok(prefix) = std::str::from_utf8(key) else {
                    continue;
                };
                if !visit(prefix) {
                    break;
                }
            }
        }
        Ok(())
    }
}

impl PatternStore for TantivyPatternStore {
    fn contains(&self, prefix: &str) -> Result<bool> {
        let searcher = self.reader.searcher();
        let term = tantivy::Term::from_field_text(self.prefix, prefix);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        Ok(searcher.search(&query, &Count)? > 0)
    }

    fn matching(
        &self,
        pattern: &LikePattern,
        limit: usize,
    ) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let matcher = pattern.matcher();

        // The `limit` best (length, prefix) pairs seen so far.
        let mut best: BTreeSet<(usize, String)> = BTreeSet::new();
        self.scan(pattern.literal_prefix(), |prefix| {
            if !matcher.matches(prefix) {
                return true;
            }
            let rank = prefix.chars().count();
            let beaten = best.len() >= limit
                && best
                    .last()
                    .is_some_and(|(len, text)| (*len, text.as_str()) <= (rank, prefix));
            if !beaten {
                best.insert((rank, prefix.to_string()));
                if best.len() > limit {
                    best.pop_last();
                }
            }
            true
        })?;

        Ok(best.into_iter().map(|(_, prefix)| prefix).collect())
    }

    fn excluding(
        &self,
        scope: Option<&LikePattern>,
        pattern: &LikePattern,
        limit: usize,
    ) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let matcher = pattern.matcher();
        let scope_matcher = scope.map(LikePattern::matcher);
        let lead = scope.map_or("", LikePattern::literal_prefix);

        let mut found: BTreeSet<String> = BTreeSet::new();
        self.scan(lead, |prefix| {
            // Keys only grow from here, so this segment has nothing better.
            if found.len() >= limit
                && found.last().is_some_and(|last| last.as_str() <= prefix)
            {
                return false;
            }
            let in_scope = scope_matcher.as_ref().is_none_or(|m| m.matches(prefix));
            if in_scope && !matcher.matches(prefix) {
                found.insert(prefix.to_string());
                if found.len() > limit {
                    found.pop_last();
                }
            }
            true
        })?;

        Ok(found.into_iter().collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.reader.searcher().num_docs() as usize)
    }
}

impl std::fmt::Debug for TantivyPatternStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TantivyPatternStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(prefixes: &[&str]) -> TantivyPatternStore {
        let store = TantivyPatternStore::open_in_ram().unwrap();
        store.rebuild(prefixes.iter().copied()).unwrap();
        store
    }

    #[test]
    fn parse_splits_wildcards() {
        let pattern = LikePattern::parse("name:m?sta*a");
        assert_eq!(
            pattern.parts(),
            &[
                PatternPart::Literal("name:m".into()),
                PatternPart::AnyOne,
                PatternPart::Literal("sta".into()),
                PatternPart::AnyRun,
                PatternPart::Literal("a".into()),
            ]
        );
        assert!(pattern.has_wildcards());
        assert_eq!(pattern.as_literal(), None);
    }

    #[test]
    fn literal_patterns_round_trip_their_text() {
        let pattern = LikePattern::parse("type:p");
        assert!(!pattern.has_wildcards());
        assert_eq!(pattern.as_literal().as_deref(), Some("type:p"));
    }

    #[test]
    fn display_renders_like_syntax() {
        assert_eq!(LikePattern::parse("a_b*c?").to_string(), "a\\_b%c_");
    }

    #[test]
    fn matcher_treats_metacharacters_literally() {
        let pattern = LikePattern::parse("a.b*");
        assert!(pattern.matches("a.b:x"));
        assert!(!pattern.matches("axb:x"));
        assert!(LikePattern::parse("a(b)+%_").matches("a(b)+%_"));
    }

    #[test]
    fn matcher_backtracks_over_runs() {
        let pattern = LikePattern::parse("n*a?a");
        assert!(pattern.matches("name:ana"));
        assert!(pattern.matches("nabba"));
        assert!(!pattern.matches("name:an"));
        assert!(LikePattern::parse("*").matches(""));
        assert!(LikePattern::parse("**?").matches("x"));
        assert!(!LikePattern::parse("?").matches(""));
    }

    #[test]
    fn literal_prefix_stops_at_the_first_wildcard() {
        assert_eq!(LikePattern::parse("name:m?sta*").literal_prefix(), "name:m");
        assert_eq!(LikePattern::parse("*:x").literal_prefix(), "");
    }

    #[test]
    fn long_literal_with_a_wildcard_resolves() {
        let prefix = format!("name:{}", "x".repeat(1500));
        let store = store(&[prefix.as_str(), "name:y"]);
        let found = store
            .matching(&LikePattern::parse(&format!("{prefix}*")), 10)
            .unwrap();
        assert_eq!(found, vec![prefix]);
    }

    #[test]
    fn many_wildcards_resolve() {
        let store = store(&["name:abc", "name:abcd"]);
        let pattern = format!("name:{}", "*".repeat(200));
        let found = store.matching(&LikePattern::parse(&pattern), 10).unwrap();
        assert_eq!(found, vec!["name:abc", "name:abcd"]);

        let pattern = format!("{}?", "*".repeat(120));
        let found = store
            .excluding(None, &LikePattern::parse(&pattern), 10)
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn excluding_stops_at_limit_in_lexicographic_order() {
        let prefixes: Vec<String> = (0..50).map(|i| format!("a:{i:02}")).collect();
        let store = store(&prefixes.iter().map(String::as_str).collect::<Vec<_>>());
        let found = store
            .excluding(None, &LikePattern::parse("a:00"), 3)
            .unwrap();
        assert_eq!(found, vec!["a:01", "a:02", "a:03"]);
    }

    #[test]
    fn zero_limit_returns_nothing() {
        let store = store(&["a:b"]);
        assert!(store.matching(&LikePattern::parse("a:*"), 0).unwrap().is_empty());
        assert!(store.excluding(None, &LikePattern::parse("x"), 0).unwrap().is_empty());
    }

    #[test]
    fn contains_is_exact_and_case_sensitive() {
        let store = store(&["name:mark", "datesOfBirth:1947"]);
        assert!(store.contains("name:mark").unwrap());
        assert!(!store.contains("name:mar").unwrap());
        assert!(store.contains("datesOfBirth:1947").unwrap());
        assert!(!store.contains("datesofbirth:1947").unwrap());
    }

    #[test]
    fn matching_orders_shortest_first() {
        let store = store(&["name:marko", "name:mark", "name:markus", "type:p"]);
        let found = store
            .matching(&LikePattern::parse("name:mark*"), 10)
            .unwrap();
        assert_eq!(found, vec!["name:mark", "name:marko", "name:markus"]);
    }

    #[test]
    fn matching_truncates_to_limit() {
        let store = store(&["a:bb", "a:b", "a:bbb"]);
        let found = store.matching(&LikePattern::parse("a:b*"), 2).unwrap();
        assert_eq!(found, vec!["a:b", "a:bb"]);
    }

    #[test]
    fn any_one_requires_exactly_one_character() {
        let store = store(&["name:mark", "name:marks"]);
        let found = store
            .matching(&LikePattern::parse("name:mark?"), 10)
            .unwrap();
        assert_eq!(found, vec!["name:marks"]);
    }

    #[test]
    fn excluding_within_scope() {
        let store = store(&["type:p", "type:v", "type:a", "name:p"]);
        let scope = LikePattern::parse("type").followed_by_any();
        let found = store
            .excluding(Some(&scope), &LikePattern::parse("type:p"), 10)
            .unwrap();
        assert_eq!(found, vec!["type:a", "type:v"]);
    }

    #[test]
    fn excluding_without_scope_spans_the_corpus() {
        let store = store(&["type:p", "type:v", "name:p"]);
        let found = store
            .excluding(None, &LikePattern::parse("type:p"), 10)
            .unwrap();
        assert_eq!(found, vec!["name:p", "type:v"]);
    }

    #[test]
    fn rebuild_replaces_corpus() {
        let store = store(&["a:x", "a:y"]);
        assert_eq!(store.len().unwrap(), 2);
        store.rebuild(["b:z"]).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert!(!store.contains("a:x").unwrap());
    }

    #[test]
    fn disk_persistence() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("patterns");

        {
            let store = TantivyPatternStore::open(&dir).unwrap();
            store.rebuild(["name:ivan"]).unwrap();
        }

        {
            let store = TantivyPatternStore::open(&dir).unwrap();
            assert!(store.contains("name:ivan").unwrap());
        }
    }
}
