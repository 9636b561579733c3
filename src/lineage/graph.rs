//! Impact graph over affected fields
//!
//! Nodes are deduplicated by field id; an edge points from an upstream field
//! to the field its lineage feeds.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use super::{AssetKey, ImpactedAsset, ShowBy};

/// A field in the impact graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpactNode {
    pub key: AssetKey,
    pub label: String,
}

#[derive(Debug, Default)]
pub struct ImpactGraph {
    graph: DiGraph<ImpactNode, ()>,
    node_indices: HashMap<i64, NodeIndex>,
}

impl ImpactGraph {
    pub fn from_assets(assets: &[ImpactedAsset]) -> Self {
        let mut graph = Self::default();
        for asset in assets {
            graph.add_asset(asset);
        }
        graph
    }

    fn add_asset(&mut self, asset: &ImpactedAsset) -> NodeIndex {
        let target = self.node(asset);
        let mut previous: Option<NodeIndex> = None;
        for ancestor in asset.impact_chain() {
            let index = self.add_asset(ancestor);
            if let Some(previous) = previous {
                self.graph.update_edge(previous, index, ());
            }
            previous = Some(index);
        }
        if let Some(previous) = previous {
            self.graph.update_edge(previous, target, ());
        }
        target
    }

    fn node(&mut self, asset: &ImpactedAsset) -> NodeIndex {
        let field_id = asset.key().field_id;
        if let Some(index) = self.node_indices.get(&field_id) {
            return *index;
        }
        let index = self.graph.add_node(ImpactNode {
            key: asset.key(),
            label: asset.pretty_print_string(ShowBy::Field),
        });
        self.node_indices.insert(field_id, index);
        index
    }

    pub fn graph(&self) -> &DiGraph<ImpactNode, ()> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Field ids directly fed by `field_id`
    pub fn downstream(&self, field_id: i64) -> Vec<i64> {
        self.neighbors(field_id, Direction::Outgoing)
    }

    /// Field ids directly feeding `field_id`
    pub fn upstream(&self, field_id: i64) -> Vec<i64> {
        self.neighbors(field_id, Direction::Incoming)
    }

    fn neighbors(&self, field_id: i64, direction: Direction) -> Vec<i64> {
        let Some(index) = self.node_indices.get(&field_id) else {
            return Vec::new();
        };
        let mut ids: Vec<i64> = self
            .graph
            .neighbors_directed(*index, direction)
            .map(|neighbor| self.graph[neighbor].key.field_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Fields with no upstream in the graph, i.e. where the breakage starts
    pub fn roots(&self) -> Vec<i64> {
        let mut roots: Vec<i64> = self
            .graph
            .node_indices()
            .filter(|index| {
                self.graph
                    .neighbors_directed(*index, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|index| self.graph[index].key.field_id)
            .collect();
        roots.sort_unstable();
        roots
    }

    /// Export to DOT format for visualization
    pub fn to_dot(&self) -> String {
        let mut output = String::new();

        output.push_str("digraph LineageImpact {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10, fillcolor=\"#FFE0B2\", color=\"#404040\"];\n");
        output.push_str("  edge [color=\"#F44336\"];\n");
        output.push('\n');

        let roots = self.roots();
        for index in self.graph.node_indices() {
            let node = &self.graph[index];
            let fill = if roots.contains(&node.key.field_id) {
                "#F44336"
            } else {
                "#FFE0B2"
            };
            output.push_str(&format!(
                "  \"field_{}\" [label=\"{}\", fillcolor=\"{}\"];\n",
                node.key.field_id,
                node.label.replace('"', "\\\""),
                fill
            ));
        }

        output.push('\n');

        for edge in self.graph.edge_references() {
            let source = &self.graph[edge.source()];
            let target = &self.graph[edge.target()];
            output.push_str(&format!(
                "  \"field_{}\" -> \"field_{}\";\n",
                source.key.field_id, target.key.field_id
            ));
        }

        output.push_str("}\n");
        output
    }
}
