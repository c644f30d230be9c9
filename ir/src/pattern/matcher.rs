//! Pattern matcher.

use tracing::trace;

use crate::pattern::{Pattern, PatternMap};
use crate::{Graph, NodeId};

/// One pattern tree plus the state of its latest match attempt.
///
/// Every call to [`match_node`](Self::match_node) starts from a clean slate.
/// Bindings and the match path are built on scratch state and only published
/// when the whole pattern matched, so a failed attempt leaves the matcher
/// empty.
#[derive(Debug, Clone)]
pub struct Matcher {
    pattern: Pattern,
    pattern_map: PatternMap,
    match_path: Vec<NodeId>,
    match_root: Option<NodeId>,
}

impl Matcher {
    pub fn new(pattern: impl Into<Pattern>) -> Self {
        Self { pattern: pattern.into(), pattern_map: PatternMap::new(), match_path: Vec::new(), match_root: None }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Match the pattern rooted at `node`.
    pub fn match_node(&mut self, graph: &Graph, node: NodeId) -> bool {
        self.pattern_map.clear();
        self.match_path.clear();
        self.match_root = None;

        let mut bindings = PatternMap::new();
        let mut path = Vec::new();
        let matched = match_pattern(&self.pattern, graph, node, &mut bindings, &mut path);

        if matched {
            self.pattern_map = bindings;
            self.match_path = path;
            self.match_root = Some(node);
        }
        trace!(%node, matched, bindings = self.pattern_map.len(), "match attempt");
        matched
    }

    /// Bindings of the latest successful match (empty after a failure).
    pub fn pattern_map(&self) -> &PatternMap {
        &self.pattern_map
    }

    /// Concrete nodes visited along the accepted path, in pre-order.
    ///
    /// Contains nodes matched by `Op` patterns and nodes absorbed by `Skip`;
    /// label-bound nodes are not included.
    pub fn match_path(&self) -> &[NodeId] {
        &self.match_path
    }

    pub fn match_root(&self) -> Option<NodeId> {
        self.match_root
    }
}

fn match_pattern(pattern: &Pattern, graph: &Graph, node: NodeId, map: &mut PatternMap, path: &mut Vec<NodeId>) -> bool {
    match pattern {
        Pattern::Label(label) => match map.get(label) {
            Some(bound) => bound == node,
            None => {
                let accepted = label.accepts(&graph[node]);
                if accepted {
                    map.insert(label.id(), node);
                }
                accepted
            }
        },
        Pattern::Skip { predicate, inner } => {
            let mut current = node;
            loop {
                let candidate = &graph[current];
                match candidate.args() {
                    [sole] if predicate.test(candidate) => {
                        path.push(current);
                        current = *sole;
                    }
                    _ => break,
                }
            }
            match_pattern(inner, graph, current, map, path)
        }
        Pattern::Op { kind, args } => {
            let candidate = &graph[node];
            if candidate.kind() != *kind || candidate.args().len() != args.len() {
                return false;
            }
            path.push(node);
            args.iter().zip(candidate.args()).all(|(arg_pattern, &arg)| match_pattern(arg_pattern, graph, arg, map, path))
        }
    }
}
