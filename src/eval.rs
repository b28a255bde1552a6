//! Bottom-up evaluation of a parsed [`Query`] into a set of record ids.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::{
    error::{Error, Result},
    pattern::{Expansion, PatternResolver},
    prefix_index::{PrefixIndex, RecordId},
    query::{Group, Operator, Query, QueryNode, Term, TermKind},
    semantic::SemanticResolver,
};

pub const DEFAULT_WEL: usize = 20;
pub const DEFAULT_NEL: usize = 200;

/// Result of evaluating a node. Ordered so that output is deterministic.
pub type RecordSet = BTreeSet<RecordId>;

/// Expansion caps for wildcard and negated terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub wel: usize,
    pub nel: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            wel: DEFAULT_WEL,
            nel: DEFAULT_NEL,
        }
    }
}

/// What one term contributed to an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermReport {
    pub term: String,
    pub kind: TermKind,
    /// Distinct prefixes the term resolved to.
    pub matched: usize,
    /// Expansion cap in force, for wildcard and negated terms.
    pub limit: Option<usize>,
    /// The cap cut the expansion short; results may be incomplete.
    pub truncated: bool,
    /// Distinct records the term contributed.
    pub records: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub records: RecordSet,
    /// One report per term, in document order.
    pub reports: Vec<TermReport>,
}

impl Evaluation {
    pub fn truncated(&self) -> bool {
        self.reports.iter().any(|r| r.truncated)
    }
}

/// Evaluates queries against one immutable index.
///
/// Holds only shared references, so one evaluator may serve concurrent
/// queries.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    index: &'a PrefixIndex,
    patterns: &'a PatternResolver,
    semantic: Option<&'a SemanticResolver>,
    limits: Limits,
}

impl<'a> Evaluator<'a> {
    pub fn new(index: &'a PrefixIndex, patterns: &'a PatternResolver) -> Self {
        Self {
            index,
            patterns,
            semantic: None,
            limits: Limits::default(),
        }
    }

    /// Enable free-text terms. Without a resolver they match nothing.
    pub fn with_semantic(mut self, semantic: Option<&'a SemanticResolver>) -> Self {
        self.semantic = semantic;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Evaluate `query`, honoring its `wel` override.
    pub fn evaluate(&self, query: &Query) -> Result<Evaluation> {
        let mut pass = Pass {
            evaluator: self,
            wel: query.options.wel.unwrap_or(self.limits.wel),
            reports: Vec::new(),
        };
        let records = pass.node(&query.root)?;
        Ok(Evaluation {
            records,
            reports: pass.reports,
        })
    }
}

/// State of a single evaluation.
struct Pass<'e, 'a> {
    evaluator: &'e Evaluator<'a>,
    wel: usize,
    reports: Vec<TermReport>,
}

impl Pass<'_, '_> {
    fn node(&mut self, node: &QueryNode) -> Result<RecordSet> {
        match node {
            QueryNode::Term(term) => self.term(term),
            QueryNode::Group(group) => self.group(group),
            QueryNode::Groups(groups) => {
                let mut last = RecordSet::new();
                for group in groups {
                    last = self.group(group)?;
                }
                Ok(last)
            }
        }
    }

    /// Left fold over the children; the first child seeds the accumulator
    /// and a group without children is empty.
    fn group(&mut self, group: &Group) -> Result<RecordSet> {
        let folded = group.children.iter().try_fold(
            None,
            |acc: Option<RecordSet>, child| -> Result<Option<RecordSet>> {
                let set = self.node(child)?;
                Ok(Some(match acc {
                    None => set,
                    Some(acc) => combine(group.operator, acc, set),
                }))
            },
        )?;
        Ok(folded.unwrap_or_default())
    }

    fn term(&mut self, term: &Term) -> Result<RecordSet> {
        let index = self.evaluator.index;
        let patterns = self.evaluator.patterns;
        let failed = |source: Error| Error::TermFailed {
            term: term.source(),
            source: Box::new(source),
        };

        let (prefixes, limit, truncated) = match term {
            Term::Exact(prefix) => {
                let found = index.contains(prefix);
                (found.then(|| prefix.clone()).into_iter().collect(), None, false)
            }
            Term::Wildcard(pattern) => {
                let Expansion {
                    prefixes,
                    limit,
                    truncated,
                } = patterns.resolve_wildcard(pattern, self.wel).map_err(failed)?;
                (prefixes, Some(limit), truncated)
            }
            Term::Not(pattern) => {
                let Expansion {
                    prefixes,
                    limit,
                    truncated,
                } = patterns
                    .resolve_negation(pattern, self.evaluator.limits.nel)
                    .map_err(failed)?;
                (prefixes, Some(limit), truncated)
            }
            Term::Semantic(text) => match self.evaluator.semantic {
                Some(semantic) => {
                    let matches = semantic.resolve(text, index).map_err(failed)?;
                    let prefixes: Vec<String> =
                        matches.into_iter().map(|m| m.prefix).collect();
                    (prefixes, Some(semantic.k()), false)
                }
                None => {
                    debug!(text = %text, "semantic matching is disabled; term matches nothing");
                    (Vec::new(), None, false)
                }
            },
        };

        let records: RecordSet = prefixes
            .iter()
            .flat_map(|prefix| index.lookup(prefix).iter().copied())
            .collect();

        if truncated {
            debug!(
                term = %term.source(),
                limit,
                "expansion limit reached; results may be incomplete"
            );
        }
        self.reports.push(TermReport {
            term: term.source(),
            kind: term.kind(),
            matched: prefixes.len(),
            limit,
            truncated,
            records: records.len(),
        });
        Ok(records)
    }
}

fn combine(operator: Operator, mut acc: RecordSet, set: RecordSet) -> RecordSet {
    match operator {
        Operator::And => {
            acc.retain(|id| set.contains(id));
            acc
        }
        Operator::Or => {
            acc.extend(set);
            acc
        }
    }
}
