//! Dependencies between a product's rules, derived from file tags.
//!
//! A rule depends on every rule producing a tag it consumes, whether as an input, a
//! "using" or an explicit dependency. There are no declared edges between rules.

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::graph::NodeIndex;
use thiserror::Error;
use tracing::{debug, trace};

use crate::language::{FileTags, Rule};
use crate::util::topo::{Cycle, DependencyGraph};

#[derive(Debug, Error)]
pub enum RuleGraphError {
  #[error("cyclic rule dependency: {}", rules.join(" -> "))]
  CyclicRuleDependency { rules: Vec<String> },
}

/// The rules of one product, connected by the tags they consume and produce.
///
/// A rule depends on every rule producing one of its input, using or explicit
/// dependency tags.
pub struct RuleGraph {
  /// One node per rule, in declaration order.
  graph: DependencyGraph<Arc<Rule>>,

  /// Rules producing one of the product's delivered file tags.
  root_rules: Vec<NodeIndex>,
}

impl RuleGraph {
  /// Connect `rules` through their tags. Nodes keep the declaration order of `rules`.
  pub fn build(rules: &[Arc<Rule>], product_file_tags: &FileTags) -> Self {
    let mut graph = DependencyGraph::new();
    let nodes: Vec<NodeIndex> = rules.iter().map(|rule| graph.add_node(rule.clone())).collect();

    let mut producers: HashMap<String, Vec<NodeIndex>> = HashMap::new();
    for (rule, &node) in rules.iter().zip(&nodes) {
      for tag in rule.output_file_tags() {
        producers.entry(tag).or_default().push(node);
      }
    }

    for (rule, &node) in rules.iter().zip(&nodes) {
      let consumed = rule.inputs.iter().chain(&rule.usings).chain(&rule.explicitly_depends_on);
      for tag in consumed {
        for &producer in producers.get(tag).into_iter().flatten() {
          trace!(rule = %rule, tag = %tag, "rule depends on producer");
          graph.add_dependency(node, producer);
        }
      }
    }

    let mut root_rules: Vec<NodeIndex> = product_file_tags
      .iter()
      .filter_map(|tag| producers.get(tag))
      .flatten()
      .copied()
      .collect();
    root_rules.sort();
    root_rules.dedup();

    debug!(rules = rules.len(), roots = root_rules.len(), "built rule graph");
    Self { graph, root_rules }
  }

  fn rules_at(&self, nodes: &[NodeIndex]) -> Vec<Arc<Rule>> {
    nodes.iter().filter_map(|&node| self.graph.node(node).cloned()).collect()
  }

  /// Rules producing one of the product's own tags.
  pub fn root_rules(&self) -> Vec<Arc<Rule>> {
    self.rules_at(&self.root_rules)
  }

  /// Rules the given rule depends on directly, in declaration order.
  pub fn dependencies_of(&self, rule: &Arc<Rule>) -> Vec<Arc<Rule>> {
    let Some(node) = self.graph.nodes().find(|&n| self.graph.node(n).is_some_and(|r| Arc::ptr_eq(r, rule))) else {
      return Vec::new();
    };
    self.rules_at(&self.graph.dependencies(node))
  }

  /// Every rule, after all rules it depends on.
  ///
  /// Ties are broken by declaration order.
  pub fn top_sorted(&self) -> Result<Vec<Arc<Rule>>, RuleGraphError> {
    let order = self.graph.topological_order(self.graph.nodes()).map_err(|Cycle(cycle)| {
      RuleGraphError::CyclicRuleDependency {
        rules: self.rules_at(&cycle).iter().map(|rule| rule.to_string()).collect(),
      }
    })?;
    Ok(self.rules_at(&order))
  }
}
