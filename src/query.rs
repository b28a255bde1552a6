//! Query grammar: the JSON wire form parsed into a typed tree.
//!
//! ```text
//! { "and"|"or": [ <term> | <query object>, ... ],
//!   "select": [ <field>, ... ],
//!   "wel": <positive integer> }
//! ```
//!
//! Terms are classified once, here, so evaluation never re-inspects the
//! term text.

use serde_json::{Map, Value};
use tracing::warn;

use crate::{
    error::{Error, Result},
    flatten::PATH_SEPARATOR,
};

/// Key of the field-selection option.
pub const SELECT_KEY: &str = "select";
/// Older name of [`SELECT_KEY`], still accepted.
pub const LEGACY_SELECT_KEY: &str = "filter_fields";
/// Key of the wildcard expansion limit override.
pub const WEL_KEY: &str = "wel";

const NEGATION_MARK: char = '!';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    And,
    Or,
}

impl Operator {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "and" => Some(Self::And),
            "or" => Some(Self::Or),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TermKind {
    Exact,
    Wildcard,
    Not,
    Semantic,
}

/// A classified term string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// `field:value`, looked up verbatim.
    Exact(String),
    /// Contains `*` or `?`.
    Wildcard(String),
    /// The pattern after the leading `!`, itself possibly a wildcard.
    Not(String),
    /// Free text without a field path.
    Semantic(String),
}

impl Term {
    /// Classify a term: `!` first, then wildcards, then `field:value`, and
    /// anything else is free text.
    pub fn classify(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(Error::malformed("empty term"));
        }

        if let Some(pattern) = raw.strip_prefix(NEGATION_MARK) {
            if pattern.is_empty() {
                return Err(Error::malformed(format!(
                    "'{raw}' negates nothing"
                )));
            }
            check_field_path(raw, pattern)?;
            return Ok(Self::Not(pattern.to_string()));
        }

        check_field_path(raw, raw)?;
        if raw.contains(['*', '?']) {
            Ok(Self::Wildcard(raw.to_string()))
        } else if raw.contains(PATH_SEPARATOR) {
            Ok(Self::Exact(raw.to_string()))
        } else {
            Ok(Self::Semantic(raw.to_string()))
        }
    }

    pub fn kind(&self) -> TermKind {
        match self {
            Self::Exact(_) => TermKind::Exact,
            Self::Wildcard(_) => TermKind::Wildcard,
            Self::Not(_) => TermKind::Not,
            Self::Semantic(_) => TermKind::Semantic,
        }
    }

    /// The term as written in the query.
    pub fn source(&self) -> String {
        match self {
            Self::Not(pattern) => format!("{NEGATION_MARK}{pattern}"),
            Self::Exact(t) | Self::Wildcard(t) | Self::Semantic(t) => t.clone(),
        }
    }
}

/// A term with a path must name a field and a value.
fn check_field_path(raw: &str, pattern: &str) -> Result<()> {
    let Some((field, _)) = pattern.split_once(PATH_SEPARATOR) else {
        return Ok(());
    };
    let value = pattern
        .rsplit_once(PATH_SEPARATOR)
        .map(|(_, v)| v)
        .unwrap_or_default();

    if field.is_empty() {
        return Err(Error::malformed(format!("'{raw}' has an empty field")));
    }
    if value.is_empty() {
        return Err(Error::malformed(format!("'{raw}' has an empty value")));
    }
    Ok(())
}

/// One operator key of a query object with its children in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub operator: Operator,
    pub children: Vec<QueryNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNode {
    Term(Term),
    Group(Group),
    /// A nested object with zero or several operator keys. Every group is
    /// evaluated and the last one's result is the node's value.
    Groups(Vec<Group>),
}

impl QueryNode {
    fn from_groups(mut groups: Vec<Group>) -> Self {
        if groups.len() == 1 {
            Self::Group(groups.remove(0))
        } else {
            Self::Groups(groups)
        }
    }
}

/// Non-structural directives carried by the top-level object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Fields to project result records onto. `None` or empty returns full
    /// records.
    pub select: Option<Vec<String>>,
    /// Per-query wildcard expansion limit.
    pub wel: Option<usize>,
}

/// A parsed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub root: QueryNode,
    pub options: QueryOptions,
    /// Keys that were neither operators nor options, at any depth.
    pub ignored_keys: Vec<String>,
}

impl Query {
    /// Parse query text.
    ///
    /// # Examples
    ///
    /// ```
    /// use sieve::query::{Query, QueryNode, Term};
    ///
    /// let query = Query::parse(r#"{"and": ["type:p", "name:j*"], "wel": 5}"#).unwrap();
    /// assert_eq!(query.options.wel, Some(5));
    /// let QueryNode::Group(group) = &query.root else { panic!() };
    /// assert_eq!(group.children[1], QueryNode::Term(Term::Wildcard("name:j*".into())));
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(|e| {
            Error::malformed(format!("invalid JSON: {e}"))
        })?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::malformed("query must be a JSON object"));
        };

        let mut parser = Parser::default();
        let options = parser.options(map);
        let root = QueryNode::from_groups(parser.groups(map, true)?);

        Ok(Self {
            root,
            options,
            ignored_keys: parser.ignored_keys,
        })
    }

    /// Every term in document order.
    pub fn terms(&self) -> Vec<&Term> {
        fn walk<'a>(node: &'a QueryNode, out: &mut Vec<&'a Term>) {
            match node {
                QueryNode::Term(term) => out.push(term),
                QueryNode::Group(group) => {
                    group.children.iter().for_each(|c| walk(c, out))
                }
                QueryNode::Groups(groups) => groups
                    .iter()
                    .flat_map(|g| &g.children)
                    .for_each(|c| walk(c, out)),
            }
        }

        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }
}

#[derive(Default)]
struct Parser {
    ignored_keys: Vec<String>,
}

impl Parser {
    fn options(&mut self, map: &Map<String, Value>) -> QueryOptions {
        let select = map
            .get(SELECT_KEY)
            .map(|v| (SELECT_KEY, v))
            .or_else(|| map.get(LEGACY_SELECT_KEY).map(|v| (LEGACY_SELECT_KEY, v)))
            .and_then(|(key, value)| match string_list(value) {
                Some(fields) => Some(fields),
                None => {
                    warn!(key, %value, "ignoring field selection that is not a list of strings");
                    None
                }
            });

        let wel = map.get(WEL_KEY).and_then(|value| {
            match value.as_u64().filter(|n| *n > 0) {
                Some(n) => Some(usize::try_from(n).unwrap_or(usize::MAX)),
                None => {
                    warn!(%value, "ignoring expansion limit that is not a positive integer");
                    None
                }
            }
        });

        QueryOptions { select, wel }
    }

    fn groups(&mut self, map: &Map<String, Value>, top_level: bool) -> Result<Vec<Group>> {
        let mut groups = Vec::new();
        for (key, value) in map {
            if let Some(operator) = Operator::from_key(key) {
                groups.push(self.group(operator, value)?);
            } else if top_level && is_option_key(key) {
                continue;
            } else {
                warn!(key = %key, "ignoring unrecognized query key");
                self.ignored_keys.push(key.clone());
            }
        }
        Ok(groups)
    }

    fn group(&mut self, operator: Operator, value: &Value) -> Result<Group> {
        let Value::Array(items) = value else {
            return Err(Error::malformed(format!(
                "'{}' must be followed by a list",
                operator.as_str()
            )));
        };

        let children = items
            .iter()
            .map(|item| match item {
                Value::String(raw) => Term::classify(raw).map(QueryNode::Term),
                Value::Object(inner) => {
                    self.groups(inner, false).map(QueryNode::from_groups)
                }
                other => Err(Error::malformed(format!(
                    "'{}' children must be terms or query objects, got {other}",
                    operator.as_str()
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Group { operator, children })
    }
}

fn is_option_key(key: &str) -> bool {
    matches!(key, SELECT_KEY | LEGACY_SELECT_KEY | WEL_KEY)
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}
