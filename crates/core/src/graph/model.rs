use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

pub type NodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Document,
    Section,
    Paragraph,
    Heading,
    Table,
    Image,
    List,
    Code,
    Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Contains,
    Follows,
    References,
    Cites,
    Related,
}

/// Character-offset + page position of a node's source content.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    pub page: u32,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    pub label: String,
    pub content: String,
    pub position: Position,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type,
            label: label.into(),
            content: String::new(),
            position: Position::default(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn set_meta(&mut self, key: &str, value: impl Serialize) {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.insert(key.to_string(), v);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: EdgeType,
    pub weight: f64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Total nodes/edges, histogram by type, degree stats (§4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub nodes_by_type: HashMap<String, usize>,
    pub avg_degree: f64,
    pub max_degree: usize,
}

/// Owns the complete set of nodes and edges for one document. Immutable
/// after the Graph Builder publishes it (§5) — all mutation happens through
/// `add_node`/`add_edge` during the single build pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentGraph {
    nodes: HashMap<NodeId, Node>,
    edges: Vec<Edge>,
    #[serde(default)]
    root_id: Option<NodeId>,
}

impl DocumentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects a duplicate id (§4.1). The first `document`-typed node added
    /// becomes the graph's root.
    pub fn add_node(&mut self, node: Node) -> CoreResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(CoreError::Graph(format!("duplicate node id '{}'", node.id)));
        }
        if node.node_type == NodeType::Document {
            if self.root_id.is_some() {
                return Err(CoreError::Graph(
                    "graph already has a document root".to_string(),
                ));
            }
            self.root_id = Some(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Rejects dangling endpoints, self-loops, and duplicate (source, target,
    /// type) triples (§3, §4.1).
    pub fn add_edge(&mut self, edge: Edge) -> CoreResult<()> {
        if edge.source == edge.target {
            return Err(CoreError::Graph(format!(
                "self-loop edge on node '{}'",
                edge.source
            )));
        }
        if !self.nodes.contains_key(&edge.source) {
            return Err(CoreError::Graph(format!(
                "edge source '{}' does not exist",
                edge.source
            )));
        }
        if !self.nodes.contains_key(&edge.target) {
            return Err(CoreError::Graph(format!(
                "edge target '{}' does not exist",
                edge.target
            )));
        }
        let duplicate = self.edges.iter().any(|e| {
            e.source == edge.source && e.target == edge.target && e.edge_type == edge.edge_type
        });
        if duplicate {
            return Err(CoreError::Graph(format!(
                "duplicate edge triple ({}, {}, {:?})",
                edge.source, edge.target, edge.edge_type
            )));
        }
        self.edges.push(edge);
        Ok(())
    }

    pub fn root_id(&self) -> Option<&NodeId> {
        self.root_id.as_ref()
    }

    /// Attaches a metadata key to an existing node. Used once, by the
    /// Graph Builder, to stamp build statistics onto the document root
    /// before publication (§4.4 step 8) — not a general post-build
    /// mutation path.
    pub fn set_node_metadata(&mut self, id: &str, key: &str, value: impl Serialize) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.set_meta(key, value);
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| n.node_type == node_type)
            .collect()
    }

    /// Neighbors of `id` reachable by any edge type in `edge_types`, in
    /// either direction.
    pub fn neighbors(&self, id: &str, edge_types: &[EdgeType]) -> Vec<&Node> {
        let mut out = Vec::new();
        for edge in &self.edges {
            if !edge_types.contains(&edge.edge_type) {
                continue;
            }
            if edge.source == id {
                if let Some(n) = self.nodes.get(&edge.target) {
                    out.push(n);
                }
            } else if edge.target == id {
                if let Some(n) = self.nodes.get(&edge.source) {
                    out.push(n);
                }
            }
        }
        out
    }

    /// Walk `contains` edges upward from `id` until a node of `node_type` is
    /// found.
    pub fn find_parent_of_type(&self, id: &str, node_type: NodeType) -> Option<&Node> {
        let mut current = id.to_string();
        loop {
            let parent = self.edges.iter().find_map(|e| {
                if e.edge_type == EdgeType::Contains && e.target == current {
                    Some(e.source.clone())
                } else {
                    None
                }
            })?;
            let parent_node = self.nodes.get(&parent)?;
            if parent_node.node_type == node_type {
                return Some(parent_node);
            }
            current = parent;
        }
    }

    pub fn children_of(&self, id: &str) -> Vec<&Node> {
        self.edges
            .iter()
            .filter(|e| e.edge_type == EdgeType::Contains && e.source == id)
            .filter_map(|e| self.nodes.get(&e.target))
            .collect()
    }

    /// Verifies the invariants of §3/§8: every edge's endpoints exist, no
    /// self-loops, no duplicate triples, `contains` forms a tree rooted at
    /// the unique document node, every node is reachable from root.
    pub fn validate(&self) -> CoreResult<()> {
        let root_id = self
            .root_id
            .clone()
            .ok_or_else(|| CoreError::Graph("graph has no document root".to_string()))?;

        let mut seen_triples = std::collections::HashSet::new();
        for edge in &self.edges {
            if edge.source == edge.target {
                return Err(CoreError::Graph(format!("self-loop on '{}'", edge.source)));
            }
            if !self.nodes.contains_key(&edge.source) || !self.nodes.contains_key(&edge.target) {
                return Err(CoreError::Graph("edge with dangling endpoint".to_string()));
            }
            let triple = (edge.source.clone(), edge.target.clone(), edge.edge_type);
            if !seen_triples.insert(triple) {
                return Err(CoreError::Graph("duplicate edge triple".to_string()));
            }
        }

        let mut reachable = std::collections::HashSet::new();
        let mut stack = vec![root_id.clone()];
        reachable.insert(root_id.clone());
        while let Some(current) = stack.pop() {
            for edge in &self.edges {
                if edge.edge_type == EdgeType::Contains
                    && edge.source == current
                    && reachable.insert(edge.target.clone())
                {
                    stack.push(edge.target.clone());
                }
            }
        }
        if reachable.len() != self.nodes.len() {
            return Err(CoreError::Graph(
                "not every node is reachable from the document root via contains edges"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Build statistics computed on demand (§4.1): totals, histogram by
    /// type, average/max degree.
    pub fn stats(&self) -> GraphStats {
        let mut nodes_by_type: HashMap<String, usize> = HashMap::new();
        for node in self.nodes.values() {
            *nodes_by_type
                .entry(format!("{:?}", node.node_type).to_lowercase())
                .or_insert(0) += 1;
        }

        let mut degree: HashMap<&str, usize> = HashMap::new();
        for edge in &self.edges {
            *degree.entry(edge.source.as_str()).or_insert(0) += 1;
            *degree.entry(edge.target.as_str()).or_insert(0) += 1;
        }
        let max_degree = degree.values().copied().max().unwrap_or(0);
        let avg_degree = if self.nodes.is_empty() {
            0.0
        } else {
            degree.values().sum::<usize>() as f64 / self.nodes.len() as f64
        };

        GraphStats {
            total_nodes: self.nodes.len(),
            total_edges: self.edges.len(),
            nodes_by_type,
            avg_degree,
            max_degree,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_graph() -> DocumentGraph {
        let mut g = DocumentGraph::new();
        g.add_node(Node::new("doc-1", NodeType::Document, "Document"))
            .unwrap();
        g.add_node(Node::new("page-1", NodeType::Metadata, "Page 1"))
            .unwrap();
        g.add_edge(Edge {
            source: "doc-1".to_string(),
            target: "page-1".to_string(),
            edge_type: EdgeType::Contains,
            weight: 1.0,
            metadata: Default::default(),
        })
        .unwrap();
        g
    }

    #[test]
    fn rejects_duplicate_node_id() {
        let mut g = doc_graph();
        let err = g
            .add_node(Node::new("page-1", NodeType::Metadata, "dup"))
            .unwrap_err();
        assert!(matches!(err, CoreError::Graph(_)));
    }

    #[test]
    fn rejects_self_loop() {
        let mut g = doc_graph();
        let err = g
            .add_edge(Edge {
                source: "page-1".to_string(),
                target: "page-1".to_string(),
                edge_type: EdgeType::Follows,
                weight: 1.0,
                metadata: Default::default(),
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Graph(_)));
    }

    #[test]
    fn rejects_dangling_edge() {
        let mut g = doc_graph();
        let err = g
            .add_edge(Edge {
                source: "page-1".to_string(),
                target: "ghost".to_string(),
                edge_type: EdgeType::Contains,
                weight: 1.0,
                metadata: Default::default(),
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Graph(_)));
    }

    #[test]
    fn rejects_duplicate_triple() {
        let mut g = doc_graph();
        let err = g
            .add_edge(Edge {
                source: "doc-1".to_string(),
                target: "page-1".to_string(),
                edge_type: EdgeType::Contains,
                weight: 1.0,
                metadata: Default::default(),
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Graph(_)));
    }

    #[test]
    fn validates_tree_reachability() {
        let g = doc_graph();
        assert!(g.validate().is_ok());
    }

    #[test]
    fn find_parent_of_type_walks_contains() {
        let mut g = doc_graph();
        g.add_node(Node::new("para-1", NodeType::Paragraph, "p"))
            .unwrap();
        g.add_edge(Edge {
            source: "page-1".to_string(),
            target: "para-1".to_string(),
            edge_type: EdgeType::Contains,
            weight: 1.0,
            metadata: Default::default(),
        })
        .unwrap();
        let parent = g.find_parent_of_type("para-1", NodeType::Document).unwrap();
        assert_eq!(parent.id, "doc-1");
    }

    #[test]
    fn stats_counts_nodes_and_degree() {
        let g = doc_graph();
        let stats = g.stats();
        assert_eq!(stats.total_nodes, 2);
        assert_eq!(stats.total_edges, 1);
        assert_eq!(stats.max_degree, 1);
    }
}
