//! Workflow definitions and their step graphs.
//!
//! A [`WorkflowGraph`] maps each step identity to its outgoing transitions.
//! Steps without an entry, or with an empty one, are terminal. The graph is
//! built once through [`GraphBuilder`] and never mutated afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::step::{START_STEP_REF, START_TRANSITION};

/// Outgoing edges of one step: transition name -> next step identity.
pub type Transitions = HashMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    edges: HashMap<String, Transitions>,
}

impl WorkflowGraph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder {
            start_step: START_STEP_REF.to_string(),
            edges: HashMap::new(),
        }
    }

    /// Outgoing transitions of `step`, `None` if the step has no entry.
    pub fn transitions(&self, step: &str) -> Option<&Transitions> {
        self.edges.get(step)
    }

    pub fn is_terminal(&self, step: &str) -> bool {
        self.transitions(step).is_none_or(|t| t.is_empty())
    }

    /// Target of `transition` out of `step`.
    pub fn next(&self, step: &str, transition: &str) -> Option<&str> {
        self.transitions(step)
            .and_then(|t| t.get(transition))
            .map(String::as_str)
    }

    /// Every step identity mentioned by the graph, sorted.
    pub fn steps(&self) -> Vec<&str> {
        let mut steps: Vec<&str> = self
            .edges
            .iter()
            .flat_map(|(from, t)| {
                std::iter::once(from.as_str()).chain(t.values().map(String::as_str))
            })
            .collect();
        steps.sort_unstable();
        steps.dedup();
        steps
    }
}

/// Accumulates edges; `build` freezes them into a [`WorkflowGraph`].
#[derive(Debug)]
pub struct GraphBuilder {
    start_step: String,
    edges: HashMap<String, Transitions>,
}

impl GraphBuilder {
    /// Wires the start step into the workflow's entry step.
    pub fn start(self, entry: &str) -> Self {
        let start = self.start_step.clone();
        self.edge(&start, START_TRANSITION, entry)
    }

    pub fn edge(mut self, from: &str, transition: &str, to: &str) -> Self {
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(transition.to_string(), to.to_string());
        self
    }

    /// Records an explicit empty entry, marking `step` terminal.
    pub fn terminal(mut self, step: &str) -> Self {
        self.edges.entry(step.to_string()).or_default();
        self
    }

    pub fn build(self) -> WorkflowGraph {
        WorkflowGraph { edges: self.edges }
    }
}

/// A registered workflow: identity, short name for log files, and graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub identity: String,
    pub name: String,
    pub graph: WorkflowGraph,
}

impl WorkflowDefinition {
    pub fn new(identity: impl Into<String>, name: impl Into<String>, graph: WorkflowGraph) -> Self {
        Self {
            identity: identity.into(),
            name: name.into(),
            graph,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = START_STEP_REF;

    fn review_graph() -> WorkflowGraph {
        WorkflowGraph::builder()
            .start("demo.Draft")
            .edge("demo.Draft", "next", "demo.Review")
            .edge("demo.Review", "approve", "demo.Publish")
            .edge("demo.Review", "reject", "demo.Archive")
            .terminal("demo.Archive")
            .build()
    }

    #[test]
    fn start_edge_points_at_entry() {
        let graph = review_graph();
        assert_eq!(graph.next(START, START_TRANSITION), Some("demo.Draft"));
    }

    #[test]
    fn lookups_follow_named_edges() {
        let graph = review_graph();
        assert_eq!(graph.next("demo.Review", "reject"), Some("demo.Archive"));
        assert_eq!(graph.next("demo.Review", "maybe"), None);
        assert_eq!(graph.transitions("demo.Review").map(|t| t.len()), Some(2));
    }

    #[test]
    fn missing_and_empty_entries_are_terminal() {
        let graph = review_graph();
        assert!(graph.is_terminal("demo.Publish"));
        assert!(graph.is_terminal("demo.Archive"));
        assert!(!graph.is_terminal("demo.Draft"));
    }

    #[test]
    fn steps_lists_every_node_once() {
        let graph = review_graph();
        assert_eq!(
            graph.steps(),
            vec![
                "demo.Archive",
                "demo.Draft",
                "demo.Publish",
                "demo.Review",
                START
            ]
        );
    }
}
