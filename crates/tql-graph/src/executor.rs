//! Pattern matching over a graph snapshot
//!
//! Matches are enumerated depth-first and streamed straight into the rest of
//! the pattern. Within one match a relationship is traversed at most once, so
//! variable-length patterns always terminate; unbounded `*` walks run until
//! the matching relationships are exhausted. Every traversal is charged
//! against a per-query budget and a query that exceeds it fails instead of
//! returning a partial result.

use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashSet;
use tql_core::{Cell, Node, Path, Relationship, Row};

use crate::query::{
    CompareOp, Condition, Direction, Literal, NodePattern, PatternPart, Query, RelPattern,
    ReturnItem,
};
use crate::Store;

/// Relationship traversals one query may spend before it is abandoned
pub const DEFAULT_TRAVERSAL_BUDGET: usize = 100_000;

#[derive(Debug, Clone, PartialEq)]
enum Binding {
    Node(NodeIndex),
    Rel(EdgeIndex),
    Rels(Vec<EdgeIndex>),
    Path(Vec<NodeIndex>, Vec<EdgeIndex>),
}

type Bindings = Vec<(String, Binding)>;

fn lookup<'a>(bindings: &'a Bindings, name: &str) -> Option<&'a Binding> {
    bindings
        .iter()
        .rev()
        .find(|(bound, _)| bound == name)
        .map(|(_, binding)| binding)
}

/// Why a search stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    /// Enough matches for LIMIT
    Limit,
    /// Traversal budget spent
    Budget,
}

/// Mutable state of one depth-first search
struct Search<'q> {
    query: &'q Query,
    budget: usize,
    traversals: usize,
    wanted: Option<usize>,
    matches: Vec<Bindings>,
    bindings: Bindings,
    used: HashSet<EdgeIndex>,
    path_nodes: Vec<NodeIndex>,
    path_edges: Vec<EdgeIndex>,
}

impl<'q> Search<'q> {
    fn new(query: &'q Query, budget: usize) -> Self {
        Self {
            query,
            budget,
            traversals: 0,
            // DISTINCT deduplicates after matching, so it needs every match
            wanted: if query.distinct { None } else { query.limit },
            matches: Vec::new(),
            bindings: Bindings::new(),
            used: HashSet::new(),
            path_nodes: Vec::new(),
            path_edges: Vec::new(),
        }
    }

    fn spend(&mut self) -> Result<(), Halt> {
        self.traversals += 1;
        if self.traversals > self.budget {
            Err(Halt::Budget)
        } else {
            Ok(())
        }
    }
}

/// Evaluates parsed queries against one snapshot
pub(crate) struct Executor<'g> {
    store: &'g Store,
    budget: usize,
}

impl<'g> Executor<'g> {
    pub(crate) fn new(store: &'g Store) -> Self {
        Self {
            store,
            budget: DEFAULT_TRAVERSAL_BUDGET,
        }
    }

    pub(crate) fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    /// Run a query to completion
    pub(crate) fn run(&self, query: &Query) -> Result<Vec<Row>, String> {
        self.check_return_items(query)?;

        let mut search = Search::new(query, self.budget);
        if search.wanted != Some(0) {
            match self.match_parts(&mut search, 0) {
                Ok(()) | Err(Halt::Limit) => {}
                Err(Halt::Budget) => {
                    return Err(format!(
                        "Pattern expansion exceeded the traversal budget of {} relationships",
                        self.budget
                    ))
                }
            }
        }

        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        for bindings in &search.matches {
            if query.limit.map_or(false, |limit| rows.len() >= limit) {
                break;
            }
            let row = self.project(query, bindings);
            if query.distinct {
                let key = serde_json::to_string(&row).map_err(|e| e.to_string())?;
                if !seen.insert(key) {
                    continue;
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }

    fn check_return_items(&self, query: &Query) -> Result<(), String> {
        let declared = declared_variables(query);
        let referenced = query
            .items
            .iter()
            .filter_map(|item| match item {
                ReturnItem::All => None,
                ReturnItem::Var { name, .. } => Some(name),
                ReturnItem::Property { var, .. } => Some(var),
            })
            .chain(query.conditions.iter().map(|c| match c {
                Condition::Compare { var, .. } | Condition::In { var, .. } => var,
            }));

        for var in referenced {
            if !declared.contains(var) {
                return Err(format!("Variable `{var}` not defined"));
            }
        }
        Ok(())
    }

    fn match_parts(&self, search: &mut Search, index: usize) -> Result<(), Halt> {
        let query = search.query;
        let Some(part) = query.parts.get(index) else {
            if query
                .conditions
                .iter()
                .all(|condition| self.condition_holds(condition, &search.bindings))
            {
                search.matches.push(search.bindings.clone());
                if search.wanted.map_or(false, |wanted| search.matches.len() >= wanted) {
                    return Err(Halt::Limit);
                }
            }
            return Ok(());
        };

        let outer_nodes = std::mem::take(&mut search.path_nodes);
        let outer_edges = std::mem::take(&mut search.path_edges);
        let result = self.match_starts(search, index, part);
        search.path_nodes = outer_nodes;
        search.path_edges = outer_edges;
        result
    }

    fn match_starts(&self, search: &mut Search, index: usize, part: &PatternPart) -> Result<(), Halt> {
        for start in self.node_candidates(&part.start, &search.bindings) {
            let mark = search.bindings.len();
            bind_node(&mut search.bindings, &part.start, start);
            search.path_nodes.clear();
            search.path_nodes.push(start);
            search.path_edges.clear();

            let result = self.extend_chain(search, index, part, 0, start);
            search.bindings.truncate(mark);
            result?;
        }
        Ok(())
    }

    fn extend_chain(
        &self,
        search: &mut Search,
        index: usize,
        part: &PatternPart,
        step: usize,
        current: NodeIndex,
    ) -> Result<(), Halt> {
        let Some((rel, _)) = part.chain.get(step) else {
            let mark = search.bindings.len();
            if let Some(name) = &part.path_var {
                let path = Binding::Path(search.path_nodes.clone(), search.path_edges.clone());
                search.bindings.push((name.clone(), path));
            }
            let result = self.match_parts(search, index + 1);
            search.bindings.truncate(mark);
            return result;
        };

        match rel.length {
            None => {
                for (edge, other) in self.steps(current, rel, &search.used) {
                    search.spend()?;
                    search.used.insert(edge);
                    let result = self.advance(search, index, part, step, current, &[edge], &[other]);
                    search.used.remove(&edge);
                    result?;
                }
                Ok(())
            }
            Some((min, max)) => {
                let mut walk = Walk {
                    from: current,
                    min,
                    max,
                    edges: Vec::new(),
                    nodes: Vec::new(),
                };
                self.walk(search, index, part, step, rel, current, &mut walk)
            }
        }
    }

    /// Extend a variable-length walk one relationship at a time, handing
    /// every long enough prefix to the rest of the pattern
    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        search: &mut Search,
        index: usize,
        part: &PatternPart,
        step: usize,
        rel: &RelPattern,
        current: NodeIndex,
        walk: &mut Walk,
    ) -> Result<(), Halt> {
        if walk.edges.len() >= walk.min {
            self.advance(search, index, part, step, walk.from, &walk.edges, &walk.nodes)?;
        }
        if walk.max.map_or(false, |max| walk.edges.len() >= max) {
            return Ok(());
        }

        for (edge, other) in self.steps(current, rel, &search.used) {
            search.spend()?;
            search.used.insert(edge);
            walk.edges.push(edge);
            walk.nodes.push(other);
            let result = self.walk(search, index, part, step, rel, other, walk);
            walk.nodes.pop();
            walk.edges.pop();
            search.used.remove(&edge);
            result?;
        }
        Ok(())
    }

    /// Bind one traversal of `part.chain[step]` and continue with the next
    /// step; the traversed relationships are already marked used
    #[allow(clippy::too_many_arguments)]
    fn advance(
        &self,
        search: &mut Search,
        index: usize,
        part: &PatternPart,
        step: usize,
        from: NodeIndex,
        edges: &[EdgeIndex],
        nodes: &[NodeIndex],
    ) -> Result<(), Halt> {
        let Some((rel, next)) = part.chain.get(step) else {
            return Ok(());
        };
        let end = nodes.last().copied().unwrap_or(from);
        if !self.node_matches(next, end, &search.bindings) {
            return Ok(());
        }

        let rel_binding = match (rel.length, edges) {
            (None, [edge]) => Binding::Rel(*edge),
            _ => Binding::Rels(edges.to_vec()),
        };
        if let Some(name) = &rel.var {
            if let Some(existing) = lookup(&search.bindings, name) {
                if *existing != rel_binding {
                    return Ok(());
                }
            }
        }

        let mark = search.bindings.len();
        if let Some(name) = &rel.var {
            search.bindings.push((name.clone(), rel_binding));
        }
        bind_node(&mut search.bindings, next, end);

        let nodes_mark = search.path_nodes.len();
        let edges_mark = search.path_edges.len();
        search.path_nodes.extend_from_slice(nodes);
        search.path_edges.extend_from_slice(edges);

        let result = self.extend_chain(search, index, part, step + 1, end);

        search.path_nodes.truncate(nodes_mark);
        search.path_edges.truncate(edges_mark);
        search.bindings.truncate(mark);
        result
    }

    /// Single hops from `current` allowed by `rel`
    fn steps(
        &self,
        current: NodeIndex,
        rel: &RelPattern,
        used: &HashSet<EdgeIndex>,
    ) -> Vec<(EdgeIndex, NodeIndex)> {
        let mut steps = Vec::new();
        let outgoing = matches!(rel.direction, Direction::Outgoing | Direction::Both);
        let incoming = matches!(rel.direction, Direction::Incoming | Direction::Both);

        if outgoing {
            for edge in self
                .store
                .edges_directed(current, petgraph::Direction::Outgoing)
            {
                steps.push((edge.id(), edge.target()));
            }
        }
        if incoming {
            for edge in self
                .store
                .edges_directed(current, petgraph::Direction::Incoming)
            {
                // A self-loop already appeared as an outgoing edge
                if outgoing && edge.source() == edge.target() {
                    continue;
                }
                steps.push((edge.id(), edge.source()));
            }
        }

        steps.retain(|(edge, _)| !used.contains(edge) && self.edge_matches(rel, *edge));
        steps.sort();
        steps
    }

    fn edge_matches(&self, rel: &RelPattern, edge: EdgeIndex) -> bool {
        let Some(stored) = self.store.edge_weight(edge) else {
            return false;
        };
        (rel.types.is_empty() || rel.types.iter().any(|t| *t == stored.rel_type))
            && properties_match(&rel.properties, &stored.properties)
    }

    fn node_candidates(&self, pattern: &NodePattern, bindings: &Bindings) -> Vec<NodeIndex> {
        if let Some(Binding::Node(bound)) = pattern.var.as_ref().and_then(|v| lookup(bindings, v))
        {
            return if self.node_matches(pattern, *bound, bindings) {
                vec![*bound]
            } else {
                Vec::new()
            };
        }
        self.store
            .node_indices()
            .filter(|index| self.node_matches(pattern, *index, bindings))
            .collect()
    }

    fn node_matches(&self, pattern: &NodePattern, index: NodeIndex, bindings: &Bindings) -> bool {
        if let Some(var) = &pattern.var {
            match lookup(bindings, var) {
                Some(Binding::Node(bound)) if *bound != index => return false,
                Some(Binding::Node(_)) | None => {}
                // Name already bound to a relationship or path
                Some(_) => return false,
            }
        }
        let Some(stored) = self.store.node_weight(index) else {
            return false;
        };
        pattern.labels.iter().all(|label| stored.labels.contains(label))
            && properties_match(&pattern.properties, &stored.properties)
    }

    fn condition_holds(&self, condition: &Condition, bindings: &Bindings) -> bool {
        match condition {
            Condition::Compare { var, key, op, value } => {
                let Some(actual) = self.property_of(bindings, var, key) else {
                    return false;
                };
                let expected = value.to_json();
                match op {
                    CompareOp::Eq => actual == expected,
                    CompareOp::Ne => actual != expected,
                }
            }
            Condition::In { var, key, values } => {
                let Some(actual) = self.property_of(bindings, var, key) else {
                    return false;
                };
                values.iter().any(|value| value.to_json() == actual)
            }
        }
    }

    fn property_of(&self, bindings: &Bindings, var: &str, key: &str) -> Option<serde_json::Value> {
        let properties = match lookup(bindings, var)? {
            Binding::Node(index) => &self.store.node_weight(*index)?.properties,
            Binding::Rel(edge) => &self.store.edge_weight(*edge)?.properties,
            Binding::Rels(_) | Binding::Path(..) => return None,
        };
        properties.get(key).cloned()
    }

    fn project(&self, query: &Query, bindings: &Bindings) -> Row {
        let mut fields = Vec::new();
        for item in &query.items {
            match item {
                ReturnItem::All => {
                    for name in declared_variables_in_order(query) {
                        if let Some(binding) = lookup(bindings, &name) {
                            fields.push((name.clone(), self.cell(binding)));
                        }
                    }
                }
                ReturnItem::Var { name, .. } => {
                    let cell = lookup(bindings, name)
                        .map(|binding| self.cell(binding))
                        .unwrap_or(Cell::Scalar(serde_json::Value::Null));
                    fields.push((item.column(), cell));
                }
                ReturnItem::Property { var, key, .. } => {
                    let value = self
                        .property_of(bindings, var, key)
                        .unwrap_or(serde_json::Value::Null);
                    fields.push((item.column(), Cell::Scalar(value)));
                }
            }
        }
        Row::new(fields)
    }

    fn cell(&self, binding: &Binding) -> Cell {
        match binding {
            Binding::Node(index) => Cell::Node(self.node(*index)),
            Binding::Rel(edge) => Cell::Relationship(self.relationship(*edge)),
            Binding::Rels(edges) => Cell::List(
                edges
                    .iter()
                    .map(|edge| Cell::Relationship(self.relationship(*edge)))
                    .collect(),
            ),
            Binding::Path(nodes, edges) => Cell::Path(Path {
                nodes: nodes.iter().map(|index| self.node(*index)).collect(),
                relationships: edges.iter().map(|edge| self.relationship(*edge)).collect(),
            }),
        }
    }

    pub(crate) fn node(&self, index: NodeIndex) -> Node {
        let mut node = Node::new(index.index() as u64);
        if let Some(stored) = self.store.node_weight(index) {
            node.labels = stored.labels.clone();
            node.properties = stored.properties.clone();
        }
        node
    }

    fn relationship(&self, edge: EdgeIndex) -> Relationship {
        let (source, target) = self
            .store
            .edge_endpoints(edge)
            .unwrap_or((NodeIndex::end(), NodeIndex::end()));
        let stored = self.store.edge_weight(edge);
        Relationship {
            id: edge.index() as u64,
            rel_type: stored.map(|s| s.rel_type.clone()).unwrap_or_default(),
            start: self.node(source),
            end: self.node(target),
            properties: stored.map(|s| s.properties.clone()).unwrap_or_default(),
        }
    }
}

fn bind_node(bindings: &mut Bindings, pattern: &NodePattern, index: NodeIndex) {
    if let Some(var) = &pattern.var {
        if lookup(bindings, var).is_none() {
            bindings.push((var.clone(), Binding::Node(index)));
        }
    }
}

fn properties_match(expected: &[(String, Literal)], actual: &tql_core::Properties) -> bool {
    expected
        .iter()
        .all(|(key, value)| actual.get(key) == Some(&value.to_json()))
}

fn declared_variables_in_order(query: &Query) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut push = |name: &Option<String>| {
        if let Some(name) = name {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    };
    for part in &query.parts {
        push(&part.path_var);
        push(&part.start.var);
        for (rel, node) in &part.chain {
            push(&rel.var);
            push(&node.var);
        }
    }
    names
}

fn declared_variables(query: &Query) -> HashSet<String> {
    declared_variables_in_order(query).into_iter().collect()
}

/// A variable-length traversal in progress
struct Walk {
    from: NodeIndex,
    min: usize,
    max: Option<usize>,
    edges: Vec<EdgeIndex>,
    nodes: Vec<NodeIndex>,
}
