//! Hierarchical graph store.
//!
//! A [`Graph`] is a labeled multigraph. Each [`Node`] may own one nested
//! child graph, which lets an exporter drill down from components into the
//! operations they contain. Ids are looked up by linear scan; keeping them
//! unique is the caller's job.
//!
//! The store does not serialize itself. Renderers walk it with a
//! [`GraphVisitor`].

pub mod builder;

pub use builder::ModelGraphBuilder;

use std::collections::BTreeMap;

/// Create an empty graph with the given label.
pub fn create_graph(label: impl Into<String>) -> Graph {
    Graph::new(label)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    label: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn find_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn find_edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn find_edge_mut(&mut self, id: &str) -> Option<&mut Edge> {
        self.edges.iter_mut().find(|e| e.id == id)
    }

    /// Append a node. Does not check for duplicate ids.
    pub fn add_node(&mut self, id: impl Into<String>, label: impl Into<String>) -> &mut Node {
        self.nodes.push(Node::new(id, label));
        let last = self.nodes.len() - 1;
        &mut self.nodes[last]
    }

    /// Append an edge between two nodes of this graph. Returns `None` if an
    /// endpoint is not a node of this graph. Parallel edges are allowed.
    pub fn add_edge(
        &mut self,
        id: impl Into<String>,
        source: &str,
        target: &str,
        label: impl Into<String>,
    ) -> Option<&mut Edge> {
        if self.find_node(source).is_none() || self.find_node(target).is_none() {
            tracing::debug!(source, target, graph = %self.label, "Edge endpoint not in graph");
            return None;
        }
        self.edges.push(Edge {
            id: id.into(),
            source: source.to_string(),
            target: target.to_string(),
            label: label.into(),
            properties: BTreeMap::new(),
        });
        self.edges.last_mut()
    }

    /// Edges leaving the node `id`.
    pub fn outgoing_edges<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// Walk the graph depth-first, descending into child graphs after their node.
    pub fn accept<V: GraphVisitor + ?Sized>(&self, visitor: &mut V) {
        self.accept_at(visitor, 0);
    }

    fn accept_at<V: GraphVisitor + ?Sized>(&self, visitor: &mut V, depth: usize) {
        visitor.enter_graph(self, depth);
        for node in &self.nodes {
            visitor.visit_node(node, depth);
            if let Some(child) = node.child_graph() {
                child.accept_at(visitor, depth + 1);
            }
        }
        for edge in &self.edges {
            visitor.visit_edge(edge, depth);
        }
        visitor.leave_graph(self, depth);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: String,
    pub label: String,
    pub properties: BTreeMap<String, String>,
    child: Option<Box<Graph>>,
}

impl Node {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            properties: BTreeMap::new(),
            child: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.properties.insert(key.into(), value.to_string());
        self
    }

    /// Create an empty child graph labeled with the node id.
    ///
    /// If the node already owns a child graph it is kept unchanged; call
    /// [`remove_child_graph`](Self::remove_child_graph) first to replace it.
    pub fn create_child_graph(&mut self) -> &mut Graph {
        if self.child.is_some() {
            tracing::debug!(node = %self.id, "Child graph already exists, keeping it");
        }
        let id = &self.id;
        self.child.get_or_insert_with(|| Box::new(Graph::new(id.clone())))
    }

    pub fn remove_child_graph(&mut self) -> Option<Graph> {
        self.child.take().map(|g| *g)
    }

    pub fn has_child_graph(&self) -> bool {
        self.child.is_some()
    }

    pub fn child_graph(&self) -> Option<&Graph> {
        self.child.as_deref()
    }

    pub fn child_graph_mut(&mut self) -> Option<&mut Graph> {
        self.child.as_deref_mut()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    id: String,
    source: String,
    target: String,
    pub label: String,
    pub properties: BTreeMap<String, String>,
}

impl Edge {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.properties.insert(key.into(), value.to_string());
        self
    }
}

/// Callbacks for [`Graph::accept`]. All methods default to no-ops.
pub trait GraphVisitor {
    fn enter_graph(&mut self, _graph: &Graph, _depth: usize) {}

    fn visit_node(&mut self, _node: &Node, _depth: usize) {}

    fn visit_edge(&mut self, _edge: &Edge, _depth: usize) {}

    fn leave_graph(&mut self, _graph: &Graph, _depth: usize) {}
}
