//! Execution Graph Builder
//!
//! Derives the node/edge graph the renderer consumes from a session
//! snapshot. Edges are structural metadata fixed by the inferred mode; node
//! statuses and steps are refreshed on every snapshot version.

use crate::models::graph::{ExecutionGraph, GraphEdge, GraphNode, NodeKind};
use crate::models::session::{
    CategoryStatus, EvaluationPhase, PipelineMode, SessionSnapshot, StageStatus,
    CLASSIC_SOMMELIERS, DEEP_CATEGORIES,
};

/// Node ids for the fixed pipeline endpoints.
pub const START_NODE: &str = "start";
pub const SYNTHESIS_NODE: &str = "synthesis";
pub const END_NODE: &str = "end";

/// Builds execution graphs from snapshots.
#[derive(Debug, Default)]
pub struct ExecutionGraphBuilder;

impl ExecutionGraphBuilder {
    /// Derive the graph for one snapshot version.
    ///
    /// Nodes that no event has referenced yet are present with an implicit
    /// `Queued` status and no step, so the renderer can show the full
    /// pipeline shape from the first frame.
    pub fn build(snapshot: &SessionSnapshot) -> ExecutionGraph {
        let mode = snapshot.mode.unwrap_or(PipelineMode::Classic);

        let mut nodes = vec![GraphNode {
            id: START_NODE.to_string(),
            kind: NodeKind::Start,
            label: "Start".to_string(),
            status: StageStatus::Complete,
            step: Some(0),
            score: None,
            is_future: false,
        }];
        let mut edges = Vec::new();

        match mode {
            PipelineMode::Classic => Self::build_classic(snapshot, &mut nodes, &mut edges),
            PipelineMode::Deep => Self::build_deep(snapshot, &mut nodes, &mut edges),
        }

        nodes.push(GraphNode {
            id: SYNTHESIS_NODE.to_string(),
            kind: NodeKind::Synthesis,
            label: "Synthesis".to_string(),
            status: snapshot.synthesis_status,
            step: snapshot.synthesis_step,
            score: snapshot.final_score,
            is_future: false,
        });
        nodes.push(GraphNode {
            id: END_NODE.to_string(),
            kind: NodeKind::End,
            label: "End".to_string(),
            status: Self::end_status(snapshot),
            step: None,
            score: None,
            is_future: false,
        });
        edges.push(GraphEdge::new(SYNTHESIS_NODE, END_NODE));

        let max_step = nodes.iter().filter_map(|n| n.step).max().unwrap_or(0);

        ExecutionGraph {
            nodes,
            edges,
            max_step,
        }
    }

    /// Classic flow: start fans out to the six sommeliers, each feeds the
    /// synthesis step.
    fn build_classic(
        snapshot: &SessionSnapshot,
        nodes: &mut Vec<GraphNode>,
        edges: &mut Vec<GraphEdge>,
    ) {
        // Known roster first, in pipeline order; then any extra ids the
        // server sent that the roster does not know about.
        let mut ids: Vec<&str> = CLASSIC_SOMMELIERS.to_vec();
        for id in snapshot.stages.keys() {
            if !ids.contains(&id.as_str()) {
                ids.push(id);
            }
        }

        for id in ids {
            nodes.push(Self::stage_node(snapshot, id));
            edges.push(GraphEdge::new(START_NODE, id));
            edges.push(GraphEdge::new(id, SYNTHESIS_NODE));
        }
    }

    /// Deep flow: start fans out to the eight categories; observed technique
    /// nodes hang off their category; categories feed the synthesis step.
    fn build_deep(
        snapshot: &SessionSnapshot,
        nodes: &mut Vec<GraphNode>,
        edges: &mut Vec<GraphEdge>,
    ) {
        let mut category_ids: Vec<&str> = DEEP_CATEGORIES.iter().map(|(id, _)| *id).collect();
        for id in snapshot.categories.keys() {
            if !category_ids.contains(&id.as_str()) {
                category_ids.push(id);
            }
        }

        for cid in &category_ids {
            let (status, step, label) = match snapshot.categories.get(*cid) {
                Some(record) => (
                    match record.status {
                        CategoryStatus::Pending => StageStatus::Queued,
                        CategoryStatus::Running => StageStatus::Running,
                        CategoryStatus::Complete => StageStatus::Complete,
                    },
                    record.step,
                    format!(
                        "{} ({}/{})",
                        title(cid),
                        record.completed_count,
                        record.total_count
                    ),
                ),
                None => (StageStatus::Queued, None, title(cid)),
            };
            nodes.push(GraphNode {
                id: (*cid).to_string(),
                kind: NodeKind::Category,
                label,
                status,
                step,
                score: None,
                is_future: false,
            });
            edges.push(GraphEdge::new(START_NODE, *cid));
            edges.push(GraphEdge::new(*cid, SYNTHESIS_NODE));
        }

        // Only observed techniques get nodes; 75 placeholders would drown
        // the renderer.
        for (id, record) in &snapshot.stages {
            nodes.push(Self::stage_node(snapshot, id));
            if let Some(cid) = &record.category_id {
                edges.push(GraphEdge::new(cid.clone(), id.clone()));
            } else {
                edges.push(GraphEdge::new(START_NODE, id.clone()));
            }
        }
    }

    /// Node for one stage id, observed or not.
    fn stage_node(snapshot: &SessionSnapshot, id: &str) -> GraphNode {
        match snapshot.stages.get(id) {
            Some(record) => GraphNode {
                id: record.id.clone(),
                kind: NodeKind::Stage,
                label: record.display_name.clone(),
                status: record.status,
                step: record.step,
                score: record.score,
                is_future: false,
            },
            None => GraphNode {
                id: id.to_string(),
                kind: NodeKind::Stage,
                label: title(id),
                status: StageStatus::Queued,
                step: None,
                score: None,
                is_future: false,
            },
        }
    }

    fn end_status(snapshot: &SessionSnapshot) -> StageStatus {
        match snapshot.phase {
            EvaluationPhase::Complete => StageStatus::Complete,
            EvaluationPhase::Error => StageStatus::Error,
            _ => StageStatus::Queued,
        }
    }
}

fn title(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
