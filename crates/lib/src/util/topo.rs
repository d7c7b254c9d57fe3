//! Dependency-ordered traversal.
//!
//! [`DependencyGraph`] stores nodes and "depends on" relations in a petgraph
//! `DiGraph` with edges running from dependency to dependent, and produces an order
//! in which every node comes after everything it depends on.
//!
//! Unlike `petgraph::algo::toposort`, the walk is seeded explicitly and visits
//! dependencies in insertion order, so the result is stable for a given input and
//! a cycle is reported as the exact path that closes it.

use std::collections::HashSet;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

/// A dependency cycle, listed from the first node on the cycle back to the node that
/// closes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle(pub Vec<NodeIndex>);

/// Nodes linked by "must come before" edges, shared by rule and module ordering.
///
/// Edges run from a dependency to its dependent, so a topological order lists every
/// dependency ahead of the nodes that need it.
#[derive(Debug, Clone)]
pub struct DependencyGraph<N> {
  /// The underlying graph. Node indices follow insertion order.
  graph: DiGraph<N, ()>,
}

impl<N> Default for DependencyGraph<N> {
  fn default() -> Self {
    Self { graph: DiGraph::new() }
  }
}

impl<N> DependencyGraph<N> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_node(&mut self, node: N) -> NodeIndex {
    self.graph.add_node(node)
  }

  /// Record that `dependent` depends on `dependency`. Repeated relations are merged.
  pub fn add_dependency(&mut self, dependent: NodeIndex, dependency: NodeIndex) {
    self.graph.update_edge(dependency, dependent, ());
  }

  pub fn node(&self, index: NodeIndex) -> Option<&N> {
    self.graph.node_weight(index)
  }

  pub fn node_count(&self) -> usize {
    self.graph.node_count()
  }

  pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
    self.graph.node_indices()
  }

  /// Direct dependencies of a node, in insertion order.
  pub fn dependencies(&self, index: NodeIndex) -> Vec<NodeIndex> {
    let mut deps: Vec<NodeIndex> = self.graph.neighbors_directed(index, Direction::Incoming).collect();
    deps.sort();
    deps
  }

  /// Direct dependents of a node, in insertion order.
  pub fn dependents(&self, index: NodeIndex) -> Vec<NodeIndex> {
    let mut dependents: Vec<NodeIndex> = self.graph.neighbors_directed(index, Direction::Outgoing).collect();
    dependents.sort();
    dependents
  }

  /// Nodes nothing else depends on.
  pub fn roots(&self) -> Vec<NodeIndex> {
    self
      .graph
      .node_indices()
      .filter(|&index| self.graph.neighbors_directed(index, Direction::Outgoing).next().is_none())
      .collect()
  }

  /// Order every node reachable from `seeds` so that dependencies precede dependents.
  ///
  /// Each node appears once. Seeds are walked in the order given.
  pub fn topological_order(&self, seeds: impl IntoIterator<Item = NodeIndex>) -> Result<Vec<NodeIndex>, Cycle> {
    let mut walk = Walk {
      graph: self,
      emitted: HashSet::new(),
      path: Vec::new(),
      order: Vec::new(),
    };
    for seed in seeds {
      walk.visit(seed)?;
    }
    Ok(walk.order)
  }
}

struct Walk<'g, N> {
  graph: &'g DependencyGraph<N>,
  emitted: HashSet<NodeIndex>,
  /// Nodes currently being visited, outermost first.
  path: Vec<NodeIndex>,
  order: Vec<NodeIndex>,
}

impl<N> Walk<'_, N> {
  fn visit(&mut self, node: NodeIndex) -> Result<(), Cycle> {
    if self.emitted.contains(&node) {
      return Ok(());
    }
    if let Some(start) = self.path.iter().position(|&visiting| visiting == node) {
      return Err(Cycle(self.path.split_off(start)));
    }

    self.path.push(node);
    for dependency in self.graph.dependencies(node) {
      self.visit(dependency)?;
    }
    self.path.pop();

    self.emitted.insert(node);
    self.order.push(node);
    Ok(())
  }
}
