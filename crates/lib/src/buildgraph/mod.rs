//! Rule dependency graphs.

mod rule_graph;

pub use rule_graph::{RuleGraph, RuleGraphError};
