//! Execution Graph Models
//!
//! Derived node/edge structures the renderer consumes. Statuses mirror the
//! underlying stage/category records; edges encode pipeline structure and
//! are static per mode.

use serde::{Deserialize, Serialize};

use super::session::StageStatus;

/// What a graph node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry node for the whole pipeline
    Start,
    /// One stage (sommelier or technique)
    Stage,
    /// One technique category (deep flow only)
    Category,
    /// The synthesis step
    Synthesis,
    /// Exit node
    End,
}

/// One node in the derived execution graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Stable node identifier (stage/category id, or `start`/`synthesis`/`end`)
    pub id: String,
    /// Node role in the pipeline
    pub kind: NodeKind,
    /// Display label
    pub label: String,
    /// Mirrored lifecycle status
    pub status: StageStatus,
    /// Observation ordinal; `None` until first observed
    pub step: Option<u32>,
    /// Score for completed stage nodes
    pub score: Option<f64>,
    /// True when a timeline cursor places this node after the current step
    pub is_future: bool,
}

/// One directed structural edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node id
    pub from: String,
    /// Target node id
    pub to: String,
}

impl GraphEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// The derived execution graph for one snapshot version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionGraph {
    /// All nodes, start node first
    pub nodes: Vec<GraphNode>,
    /// Structural edges for the inferred mode
    pub edges: Vec<GraphEdge>,
    /// Highest observation ordinal across nodes
    pub max_step: u32,
}

impl ExecutionGraph {
    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
