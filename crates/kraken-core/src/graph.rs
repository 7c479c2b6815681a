//! The task graph: a DAG over [`Task`]s built from declared and property-inferred
//! relationships. Before being handed to an executor, a graph is usually [`TaskGraph::trim`]med
//! down to only what the requested goal tasks actually need.

use crate::address::Address;
use crate::error::{KrakenError, Result};
use crate::task::{Task, TaskStatus};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct Edge {
    strict: bool,
    /// Set for edges synthesized by unpacking group membership rather than declared directly.
    implicit: bool,
}

/// A directed graph of tasks, with edges pointing from a dependency to its dependant.
pub struct TaskGraph {
    graph: DiGraph<Address, Edge>,
    indices: HashMap<Address, NodeIndex>,
    tasks: HashMap<Address, Arc<dyn Task>>,
    results: HashMap<Address, TaskStatus>,
    ok_tasks: HashSet<Address>,
    failed_tasks: HashSet<Address>,
}

impl TaskGraph {
    /// Builds a graph containing `goals` and every task transitively reachable through their
    /// relationships. `resolve` turns an address declared in a relationship into the concrete
    /// tasks it selects (normally [`crate::context::Context::resolve_tasks`] wrapped down to a
    /// single selector).
    pub fn build(
        goals: &[Arc<dyn Task>],
        resolve: impl Fn(&Address) -> Result<Vec<Arc<dyn Task>>>,
    ) -> Result<Self> {
        let mut graph = Self {
            graph: DiGraph::new(),
            indices: HashMap::new(),
            tasks: HashMap::new(),
            results: HashMap::new(),
            ok_tasks: HashSet::new(),
            failed_tasks: HashSet::new(),
        };
        for task in goals {
            graph.add_task(task.clone(), &resolve)?;
        }
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn get_task(&self, address: &Address) -> Option<Arc<dyn Task>> {
        self.tasks.get(address).cloned()
    }

    /// Every task in the graph, in no particular order.
    pub fn tasks(&self) -> impl Iterator<Item = Arc<dyn Task>> + '_ {
        self.tasks.values().cloned()
    }

    fn node_of(&self, address: &Address) -> NodeIndex {
        *self
            .indices
            .get(address)
            .unwrap_or_else(|| panic!("{address} not in graph"))
    }

    fn add_task(
        &mut self,
        task: Arc<dyn Task>,
        resolve: &impl Fn(&Address) -> Result<Vec<Arc<dyn Task>>>,
    ) -> Result<()> {
        let address = task.address();
        if self.tasks.contains_key(&address) {
            return Ok(());
        }
        let index = self.graph.add_node(address.clone());
        self.indices.insert(address.clone(), index);
        self.tasks.insert(address.clone(), task.clone());

        for rel in task.relationships(&|addr| resolve(addr))? {
            let other_address = rel.other_task.address();
            if !self.tasks.contains_key(&other_address) {
                self.add_task(rel.other_task.clone(), resolve)?;
            }

            let (from, to) = if rel.inverse {
                (address.clone(), other_address.clone())
            } else {
                (other_address.clone(), address.clone())
            };
            self.add_edge(&from, &to, rel.strict, false);

            // A group's own members are already connected by the edge above; the implicit
            // unpacking below is only for a group depending on (or being depended on by)
            // something outside of itself.
            if let Some(group) = task.as_group() {
                if !rel.inverse && group.members().iter().any(|m| m.address() == other_address) {
                    continue;
                }
            }

            // When a group is on one end of a relationship, every member implicitly inherits it:
            // depending on a group means depending on everything in it, transitively through
            // nested groups.
            let (upstream, downstream) = if rel.inverse {
                (address.clone(), other_address.clone())
            } else {
                (other_address.clone(), address.clone())
            };
            if let Some(downstream_group) = self.tasks.get(&downstream).cloned() {
                if let Some(group) = downstream_group.as_group() {
                    let mut stack = group.members();
                    while let Some(member) = stack.pop() {
                        if !self.tasks.contains_key(&member.address()) {
                            self.add_task(member.clone(), resolve)?;
                        }
                        if let Some(nested) = member.as_group() {
                            stack.extend(nested.members());
                            continue;
                        }
                        if upstream != member.address() {
                            self.add_edge(&upstream, &member.address(), rel.strict, true);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn get_edge(&self, from: &Address, to: &Address) -> Option<Edge> {
        let a = *self.indices.get(from)?;
        let b = *self.indices.get(to)?;
        self.graph.find_edge(a, b).map(|e| self.graph[e])
    }

    fn add_edge(&mut self, from: &Address, to: &Address, strict: bool, implicit: bool) {
        let a = self.node_of(from);
        let b = self.node_of(to);
        if let Some(existing) = self.graph.find_edge(a, b) {
            let edge = &mut self.graph[existing];
            edge.strict = edge.strict || strict;
            edge.implicit = edge.implicit && implicit;
        } else {
            self.graph.add_edge(a, b, Edge { strict, implicit });
        }
    }

    pub fn predecessors(&self, address: &Address) -> Vec<Arc<dyn Task>> {
        self.graph
            .neighbors_directed(self.node_of(address), Direction::Incoming)
            .map(|idx| self.tasks[&self.graph[idx]].clone())
            .collect()
    }

    pub fn successors(&self, address: &Address) -> Vec<Arc<dyn Task>> {
        self.graph
            .neighbors_directed(self.node_of(address), Direction::Outgoing)
            .map(|idx| self.tasks[&self.graph[idx]].clone())
            .collect()
    }

    pub fn get_status(&self, address: &Address) -> Option<&TaskStatus> {
        self.results.get(address)
    }

    /// Records the outcome of running a task. Panics if a non-started result is already present,
    /// matching the original system's "a task cannot be executed twice" invariant.
    pub fn set_status(&mut self, address: &Address, status: TaskStatus) {
        if let Some(existing) = self.results.get(address) {
            if !matches!(existing.status_type, crate::task::TaskStatusType::Started) {
                panic!("already have a status for task `{address}`");
            }
        }
        if status.is_ok() {
            self.ok_tasks.insert(address.clone());
        }
        if matches!(status.status_type, crate::task::TaskStatusType::Failed) {
            self.failed_tasks.insert(address.clone());
        }
        self.results.insert(address.clone(), status);
    }

    pub fn is_complete(&self) -> bool {
        self.tasks.keys().all(|a| self.ok_tasks.contains(a))
    }

    /// True if `address` names a [`crate::task::GroupTask`] that is empty, or only (transitively)
    /// depends on other empty groups -- such a group contributes nothing to the build and can be
    /// dropped from the required set during [`TaskGraph::trim`].
    fn is_empty_group_subtree(&self, address: &Address) -> bool {
        fn is_empty_group(graph: &TaskGraph, address: &Address) -> bool {
            graph
                .tasks
                .get(address)
                .and_then(|t| t.as_group())
                .is_some_and(|g| g.members().is_empty())
        }
        fn is_empty_group_or_subtree(graph: &TaskGraph, address: &Address) -> bool {
            let Some(group) = graph.tasks.get(address).and_then(|t| t.as_group()) else {
                return false;
            };
            let _ = group;
            graph
                .graph
                .neighbors_directed(graph.node_of(address), Direction::Incoming)
                .all(|pred| is_empty_group_or_subtree(graph, &graph.graph[pred]))
        }
        is_empty_group(self, address) || is_empty_group_or_subtree(self, address)
    }

    /// Returns the set of task addresses required, transitively, to run every task in `goals`:
    /// the goals themselves plus every strict predecessor, skipping empty group subtrees.
    fn required_tasks(&self, goals: &[Arc<dyn Task>]) -> Result<HashSet<Address>> {
        fn recurse(
            graph: &TaskGraph,
            address: &Address,
            visited: &mut HashSet<Address>,
            path: &mut Vec<Address>,
        ) -> Result<()> {
            if path.contains(address) {
                return Err(KrakenError::Other(format!(
                    "dependency cycle: {}",
                    path.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(" -> ")
                )));
            }
            visited.insert(address.clone());
            path.push(address.clone());
            for pred in graph
                .graph
                .neighbors_directed(graph.node_of(address), Direction::Incoming)
                .map(|idx| graph.graph[idx].clone())
                .collect::<Vec<_>>()
            {
                if graph.get_edge(&pred, address).is_some_and(|e| e.strict) {
                    if graph.is_empty_group_subtree(&pred) {
                        continue;
                    }
                    recurse(graph, &pred, visited, path)?;
                }
            }
            path.pop();
            Ok(())
        }

        let mut required = HashSet::new();
        for task in goals {
            recurse(self, &task.address(), &mut required, &mut Vec::new())?;
        }
        Ok(required)
    }

    /// Returns a copy of this graph with every node not required by `goals` removed, keeping
    /// transitive edges through the removed nodes so scheduling order is preserved.
    pub fn trim(&self, goals: &[Arc<dyn Task>]) -> Result<TaskGraph> {
        let required = self.required_tasks(goals)?;
        let removable: Vec<Address> = self
            .tasks
            .keys()
            .filter(|a| !required.contains(*a))
            .cloned()
            .collect();

        let mut trimmed = self.clone_structure();
        for address in removable {
            let incoming: Vec<(Address, Edge)> = trimmed
                .graph
                .neighbors_directed(trimmed.node_of(&address), Direction::Incoming)
                .map(|idx| (trimmed.graph[idx].clone(), trimmed.get_edge(&trimmed.graph[idx], &address).unwrap()))
                .collect();
            let outgoing: Vec<(Address, Edge)> = trimmed
                .graph
                .neighbors_directed(trimmed.node_of(&address), Direction::Outgoing)
                .map(|idx| (trimmed.graph[idx].clone(), trimmed.get_edge(&address, &trimmed.graph[idx]).unwrap()))
                .collect();
            for (pred, in_edge) in &incoming {
                for (succ, out_edge) in &outgoing {
                    trimmed.add_edge(pred, succ, in_edge.strict || out_edge.strict, in_edge.implicit && out_edge.implicit);
                }
            }
            trimmed.remove_node(&address);
        }
        trimmed.absorb_results(self);
        Ok(trimmed)
    }

    fn remove_node(&mut self, address: &Address) {
        if let Some(index) = self.indices.remove(address) {
            self.graph.remove_node(index);
            // petgraph's `remove_node` swaps the last node into the freed slot; re-sync indices.
            for (addr, idx) in self.indices.iter_mut() {
                if self.graph.node_weight(*idx) != Some(addr) {
                    *idx = self
                        .graph
                        .node_indices()
                        .find(|i| &self.graph[*i] == addr)
                        .expect("node still present");
                }
            }
        }
        self.tasks.remove(address);
    }

    fn clone_structure(&self) -> TaskGraph {
        TaskGraph {
            graph: self.graph.clone(),
            indices: self.indices.clone(),
            tasks: self.tasks.clone(),
            results: HashMap::new(),
            ok_tasks: HashSet::new(),
            failed_tasks: HashSet::new(),
        }
    }

    /// Merges results from `other` into this graph (only for tasks this graph still contains).
    /// When both graphs disagree on a task's status, the not-ok one wins.
    fn absorb_results(&mut self, other: &TaskGraph) {
        for address in self.tasks.keys().cloned().collect::<Vec<_>>() {
            let resolved = match (other.results.get(&address), self.results.get(&address)) {
                (Some(a), Some(b)) if a.status_type != b.status_type => {
                    Some(if a.is_not_ok() { a.clone() } else { b.clone() })
                }
                (Some(a), None) => Some(a.clone()),
                (None, Some(b)) => Some(b.clone()),
                (Some(_), Some(b)) => Some(b.clone()),
                (None, None) => None,
            };
            if let Some(status) = resolved {
                if status.is_ok() {
                    self.ok_tasks.insert(address.clone());
                }
                if matches!(status.status_type, crate::task::TaskStatusType::Failed) {
                    self.failed_tasks.insert(address.clone());
                }
                self.results.insert(address, status);
            }
        }
    }

    /// The subgraph of tasks still outstanding: completed (ok) tasks removed, along with any
    /// non-strict edge from a failed task (since a failure no longer blocks an order-only
    /// dependant).
    fn ready_graph(&self) -> (DiGraph<Address, Edge>, HashMap<Address, NodeIndex>) {
        let mut removable_edges = HashSet::new();
        for failed in &self.failed_tasks {
            for succ_idx in self.graph.neighbors_directed(self.node_of(failed), Direction::Outgoing) {
                let succ = self.graph[succ_idx].clone();
                let succ_task = &self.tasks[&succ];
                if let Some(group) = succ_task.as_group() {
                    let member_addresses: HashSet<Address> = group.members().iter().map(|m| m.address()).collect();
                    if !member_addresses.is_subset(&self.failed_tasks.union(&self.ok_tasks).cloned().collect()) {
                        continue;
                    }
                    for grand_idx in self.graph.neighbors_directed(succ_idx, Direction::Outgoing) {
                        let grand = self.graph[grand_idx].clone();
                        if !self.get_edge(&succ, &grand).unwrap().strict {
                            removable_edges.insert((succ.clone(), grand));
                        }
                    }
                } else if !self.get_edge(failed, &succ).unwrap().strict {
                    removable_edges.insert((failed.clone(), succ));
                }
            }
        }

        let mut ready = DiGraph::new();
        let mut indices = HashMap::new();
        for address in self.tasks.keys() {
            if !self.ok_tasks.contains(address) {
                indices.insert(address.clone(), ready.add_node(address.clone()));
            }
        }
        for edge in self.graph.edge_indices() {
            let (a, b) = self.graph.edge_endpoints(edge).unwrap();
            let (from, to) = (self.graph[a].clone(), self.graph[b].clone());
            if removable_edges.contains(&(from.clone(), to.clone())) {
                continue;
            }
            if let (Some(&ai), Some(&bi)) = (indices.get(&from), indices.get(&to)) {
                ready.add_edge(ai, bi, self.graph[edge]);
            }
        }
        (ready, indices)
    }

    fn predecessor_addresses(&self, address: &Address) -> Vec<Address> {
        self.graph
            .neighbors_directed(self.node_of(address), Direction::Incoming)
            .map(|idx| self.graph[idx].clone())
            .collect()
    }

    /// Leaf tasks of the graph: those with no dependants. These are the original build goals,
    /// since a goal is never itself a dependency of anything else in its own graph.
    fn goal_addresses(&self) -> Vec<Address> {
        self.tasks
            .keys()
            .filter(|a| self.graph.neighbors_directed(self.node_of(a), Direction::Outgoing).count() == 0)
            .cloned()
            .collect()
    }

    /// Returns a copy of the graph, transitively reduced: an edge `u -> v` is dropped whenever
    /// some other successor `w` of `u` can also reach `v`. When `keep_explicit` is true, edges
    /// with `implicit=false` survive the reduction even if they would otherwise be redundant.
    pub fn reduce(&self, keep_explicit: bool) -> TaskGraph {
        let nodes: Vec<NodeIndex> = self.graph.node_indices().collect();
        let mut reachable: HashMap<NodeIndex, HashSet<NodeIndex>> = HashMap::new();
        for &n in &nodes {
            let mut seen = HashSet::new();
            let mut stack = vec![n];
            while let Some(cur) = stack.pop() {
                for succ in self.graph.neighbors_directed(cur, Direction::Outgoing) {
                    if seen.insert(succ) {
                        stack.push(succ);
                    }
                }
            }
            reachable.insert(n, seen);
        }

        let mut new_graph = DiGraph::new();
        let mut new_indices = HashMap::new();
        for &n in &nodes {
            let address = self.graph[n].clone();
            new_indices.insert(address.clone(), new_graph.add_node(address));
        }
        for edge in self.graph.edge_indices() {
            let (u, v) = self.graph.edge_endpoints(edge).unwrap();
            let data = self.graph[edge];
            let kept_explicitly = keep_explicit && !data.implicit;
            let redundant = !kept_explicitly
                && self
                    .graph
                    .neighbors_directed(u, Direction::Outgoing)
                    .any(|w| w != v && reachable.get(&w).is_some_and(|r| r.contains(&v)));
            if !redundant {
                let ua = &self.graph[u];
                let va = &self.graph[v];
                new_graph.add_edge(new_indices[ua], new_indices[va], data);
            }
        }

        let mut reduced = TaskGraph {
            graph: new_graph,
            indices: new_indices,
            tasks: self.tasks.clone(),
            results: HashMap::new(),
            ok_tasks: HashSet::new(),
            failed_tasks: HashSet::new(),
        };
        reduced.absorb_results(self);
        reduced
    }

    /// Tags `direct` and the predecessor closure of `recursive` with `skip`, except where a task
    /// in that closure is still required by something outside the skipped set. `reset` first
    /// removes (rather than re-applies) any existing `skip` tag of the same `origin`, and such
    /// tasks are not implicitly re-added to the skipped set the way an un-reset tag would be.
    ///
    /// Algorithm: color `direct ∪ recursive` (plus any pre-existing same-origin skip tags, unless
    /// `reset`) "red". Color the full predecessor closure of `recursive` "blue". Then walk
    /// backwards from the graph's goal tasks (its leaves), discoloring any blue task reached,
    /// but never walking through a red task. Whatever remains blue gets the skip tag; if such a
    /// task has no recorded status yet, it's given status *Skipped*.
    pub fn mark_tasks_as_skipped(
        &mut self,
        direct: &[Address],
        recursive: &[Address],
        reason: &str,
        origin: Option<&str>,
        reset: bool,
    ) {
        let mut red: HashSet<Address> = direct.iter().cloned().collect();
        red.extend(recursive.iter().cloned());

        for (address, task) in self.tasks.iter().map(|(a, t)| (a.clone(), t.clone())).collect::<Vec<_>>() {
            for tag in task.core().tags("skip") {
                if tag.origin.as_deref() == origin {
                    if reset {
                        task.core().remove_tag(&tag);
                    } else {
                        red.insert(address.clone());
                    }
                }
            }
        }

        let mut blue: HashSet<Address> = HashSet::new();
        let mut stack: Vec<Address> = recursive.to_vec();
        while let Some(address) = stack.pop() {
            if !blue.insert(address.clone()) {
                continue;
            }
            stack.extend(self.predecessor_addresses(&address));
        }

        let mut discolored: HashSet<Address> = HashSet::new();
        let mut stack: Vec<Address> = self.goal_addresses();
        while let Some(address) = stack.pop() {
            if red.contains(&address) || !discolored.insert(address.clone()) {
                continue;
            }
            blue.remove(&address);
            stack.extend(self.predecessor_addresses(&address));
        }

        for address in blue {
            if let Some(task) = self.tasks.get(&address) {
                task.core().add_tag("skip", reason, origin.map(str::to_string));
                if self.results.get(&address).is_none() {
                    self.set_status(&address, TaskStatus::skipped(Some(reason.to_string())));
                }
            }
        }
    }

    /// Returns every task whose predecessors have all completed (or been removed as no-longer-
    /// blocking) and that has no result recorded yet. Group tasks are never returned: they're
    /// marked skipped immediately and their readiness recurses once more.
    pub fn ready(&mut self) -> Vec<Arc<dyn Task>> {
        let (ready_graph, indices) = self.ready_graph();
        let root: Vec<Address> = indices
            .iter()
            .filter(|(addr, idx)| ready_graph.neighbors_directed(**idx, Direction::Incoming).count() == 0 && !self.results.contains_key(*addr))
            .map(|(addr, _)| addr.clone())
            .collect();
        if root.is_empty() {
            return Vec::new();
        }

        let mut non_groups = Vec::new();
        let mut groups = Vec::new();
        for address in root {
            let task = self.tasks[&address].clone();
            if task.as_group().is_some() {
                groups.push(address);
            } else {
                non_groups.push(task);
            }
        }
        for address in groups {
            self.set_status(&address, TaskStatus::skipped(None));
        }
        if non_groups.is_empty() {
            self.ready()
        } else {
            non_groups
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{RelationshipMode, TaskCore, TaskStatus};

    struct Stub(TaskCore);

    impl Stub {
        fn new(address: Address) -> Arc<Self> {
            Arc::new(Self(TaskCore::new(address)))
        }
    }

    impl Task for Stub {
        fn core(&self) -> &TaskCore {
            &self.0
        }

        fn execute(&self) -> Result<TaskStatus> {
            Ok(TaskStatus::succeeded(None))
        }
    }

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn no_resolve(address: &Address) -> Result<Vec<Arc<dyn Task>>> {
        Err(KrakenError::TaskResolution(format!("not resolvable in this test: {address}")))
    }

    #[test]
    fn build_pulls_in_strict_dependency() {
        let upstream = Stub::new(addr(":a"));
        let downstream = Stub::new(addr(":b"));
        downstream.core().depends_on_task(upstream.clone(), RelationshipMode::Strict);

        let graph = TaskGraph::build(&[downstream.clone() as Arc<dyn Task>], no_resolve).unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.get_task(&addr(":a")).is_some());
    }

    #[test]
    fn trim_keeps_only_strict_dependencies_of_goals() {
        let a = Stub::new(addr(":a"));
        let b = Stub::new(addr(":b"));
        let c = Stub::new(addr(":c"));
        b.core().depends_on_task(a.clone(), RelationshipMode::Strict);
        c.core().depends_on_task(a.clone(), RelationshipMode::OrderOnly);

        let goals: Vec<Arc<dyn Task>> = vec![b.clone(), c.clone()];
        let graph = TaskGraph::build(&goals, no_resolve).unwrap();

        let trimmed = graph.trim(&[b.clone() as Arc<dyn Task>]).unwrap();
        assert!(trimmed.get_task(&addr(":a")).is_some());
        assert!(trimmed.get_task(&addr(":b")).is_some());
        assert!(trimmed.get_task(&addr(":c")).is_none());
    }

    #[test]
    fn ready_returns_tasks_with_no_predecessors() {
        let a = Stub::new(addr(":a"));
        let b = Stub::new(addr(":b"));
        b.core().depends_on_task(a.clone(), RelationshipMode::Strict);

        let mut graph = TaskGraph::build(&[b.clone() as Arc<dyn Task>], no_resolve).unwrap();
        let ready = graph.ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].address(), addr(":a"));
    }

    #[test]
    fn is_complete_once_every_task_succeeds() {
        let a = Stub::new(addr(":a"));
        let mut graph = TaskGraph::build(&[a.clone() as Arc<dyn Task>], no_resolve).unwrap();
        assert!(!graph.is_complete());
        graph.set_status(&addr(":a"), TaskStatus::succeeded(None));
        assert!(graph.is_complete());
    }

    #[test]
    fn reduce_drops_the_redundant_shortcut_edge() {
        // a depends_on b depends_on c, plus a depends_on c directly -- the c->a edge this
        // produces is implied by the two-hop c->b->a path.
        let a = Stub::new(addr(":a"));
        let b = Stub::new(addr(":b"));
        let c = Stub::new(addr(":c"));
        b.core().depends_on_task(c.clone(), RelationshipMode::Strict);
        a.core().depends_on_task(b.clone(), RelationshipMode::Strict);
        a.core().depends_on_task(c.clone(), RelationshipMode::Strict);

        let graph = TaskGraph::build(&[a.clone() as Arc<dyn Task>], no_resolve).unwrap();
        assert!(graph.get_edge(&addr(":c"), &addr(":a")).is_some(), "the direct edge exists before reduction");

        let reduced = graph.reduce(false);
        assert!(reduced.get_edge(&addr(":c"), &addr(":b")).is_some());
        assert!(reduced.get_edge(&addr(":b"), &addr(":a")).is_some());
        assert!(reduced.get_edge(&addr(":c"), &addr(":a")).is_none(), "the direct edge is implied by c->b->a");
    }

    #[test]
    fn reduce_keep_explicit_preserves_non_implicit_edges() {
        let a = Stub::new(addr(":a"));
        let b = Stub::new(addr(":b"));
        let c = Stub::new(addr(":c"));
        b.core().depends_on_task(c.clone(), RelationshipMode::Strict);
        a.core().depends_on_task(b.clone(), RelationshipMode::Strict);
        a.core().depends_on_task(c.clone(), RelationshipMode::Strict);

        let graph = TaskGraph::build(&[a.clone() as Arc<dyn Task>], no_resolve).unwrap();
        let reduced = graph.reduce(true);
        assert!(reduced.get_edge(&addr(":c"), &addr(":a")).is_some(), "explicit edges survive with keep_explicit");
    }

    #[test]
    fn skip_marking_never_drops_a_task_still_required_elsewhere() {
        // a depends_on {b, c}; b depends_on c. Marking only b recursive-skipped must leave c
        // alone, since a still needs it directly.
        let a = Stub::new(addr(":a"));
        let b = Stub::new(addr(":b"));
        let c = Stub::new(addr(":c"));
        b.core().depends_on_task(c.clone(), RelationshipMode::Strict);
        a.core().depends_on_task(b.clone(), RelationshipMode::Strict);
        a.core().depends_on_task(c.clone(), RelationshipMode::Strict);

        let mut graph = TaskGraph::build(&[a.clone() as Arc<dyn Task>], no_resolve).unwrap();
        graph.mark_tasks_as_skipped(&[], &[addr(":b")], "not needed", Some("test"), false);

        assert!(!b.core().tags("skip").is_empty(), "b should be skipped");
        assert!(c.core().tags("skip").is_empty(), "c is still required by a and must not be skipped");
    }

    #[test]
    fn skip_marking_propagates_through_the_whole_predecessor_closure() {
        let a = Stub::new(addr(":a"));
        let b = Stub::new(addr(":b"));
        let c = Stub::new(addr(":c"));
        b.core().depends_on_task(c.clone(), RelationshipMode::Strict);
        a.core().depends_on_task(b.clone(), RelationshipMode::Strict);
        a.core().depends_on_task(c.clone(), RelationshipMode::Strict);

        let mut graph = TaskGraph::build(&[a.clone() as Arc<dyn Task>], no_resolve).unwrap();
        graph.mark_tasks_as_skipped(&[], &[addr(":a")], "not needed", Some("test"), false);

        assert!(!a.core().tags("skip").is_empty());
        assert!(!b.core().tags("skip").is_empty());
        assert!(!c.core().tags("skip").is_empty());
    }
}
