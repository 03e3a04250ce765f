//! Resource graph of one compilation run.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::error::CompileError;
use crate::inference::DependencyLookup;
use crate::types::{AttributeValue, ResourceAddress};

/// Why a node exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum NodeOrigin {
    /// Suggested by the oracle for this intent.
    Intent { intent: String },
    /// Created to satisfy a required dependency no intent supplied.
    Dependency,
}

/// One resource instance to emit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceNode {
    /// `<kind>.<name>`, unique within a graph.
    pub id: String,
    pub kind: String,
    /// Block label.
    pub name: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Ids of nodes this node references.
    pub dependencies: Vec<String>,
    pub origin: NodeOrigin,
}

impl ResourceNode {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, origin: NodeOrigin) -> Self {
        let kind = kind.into();
        let name = name.into();
        Self {
            id: format!("{}.{}", kind, name),
            kind,
            name,
            attributes: BTreeMap::new(),
            dependencies: Vec::new(),
            origin,
        }
    }

    pub fn address(&self) -> ResourceAddress {
        ResourceAddress::new(self.kind.clone(), self.name.clone())
    }
}

/// `from` references `to` through `attribute`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub attribute: String,
}

/// Nodes plus directed dependency edges. Must stay acyclic to be emitted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
    edges: Vec<DependencyEdge>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, returning its id.
    pub fn add_node(&mut self, node: ResourceNode) -> Result<String, CompileError> {
        if self.index.contains_key(&node.id) {
            return Err(CompileError::DuplicateNode { id: node.id });
        }
        let id = node.id.clone();
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(id)
    }

    /// Record that `from` references `to` through `attribute`.
    pub fn add_edge(&mut self, from: &str, to: &str, attribute: &str) -> Result<(), CompileError> {
        if !self.index.contains_key(to) {
            return Err(CompileError::UnknownNode { id: to.to_string() });
        }
        let idx = *self
            .index
            .get(from)
            .ok_or_else(|| CompileError::UnknownNode { id: from.to_string() })?;

        let edge = DependencyEdge {
            from: from.to_string(),
            to: to.to_string(),
            attribute: attribute.to_string(),
        };
        if self.edges.contains(&edge) {
            return Ok(());
        }
        self.edges.push(edge);

        let deps = &mut self.nodes[idx].dependencies;
        if !deps.iter().any(|d| d == to) {
            deps.push(to.to_string());
        }
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut ResourceNode> {
        self.index.get(id).map(|&i| &mut self.nodes[i])
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a DependencyEdge> + 'a {
        self.edges.iter().filter(move |e| e.from == id)
    }

    /// First node of `kind` in insertion order.
    pub fn find_by_kind(&self, kind: &str) -> Option<&ResourceNode> {
        self.nodes.iter().find(|n| n.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Lookup that resolves reference attributes of `from` through its edges.
    pub fn lookup_for<'a>(&'a self, from: &'a str) -> GraphLookup<'a> {
        GraphLookup { graph: self, from }
    }

    /// Nodes ordered so every node comes after all nodes it depends on.
    ///
    /// Depth-first over insertion order, so the result is deterministic.
    ///
    /// # Errors
    ///
    /// `DependencyCycle` naming the kind first seen twice on the current path.
    pub fn topological_order(&self) -> Result<Vec<&ResourceNode>, CompileError> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut visited = HashSet::new();
        let mut visiting = HashSet::new();

        for node in &self.nodes {
            self.visit(&node.id, &mut order, &mut visited, &mut visiting)?;
        }

        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        id: &str,
        order: &mut Vec<&'a ResourceNode>,
        visited: &mut HashSet<String>,
        visiting: &mut HashSet<String>,
    ) -> Result<(), CompileError> {
        let node = self
            .node(id)
            .ok_or_else(|| CompileError::UnknownNode { id: id.to_string() })?;

        if visiting.contains(id) {
            return Err(CompileError::DependencyCycle {
                kind: node.kind.clone(),
            });
        }
        if visited.contains(id) {
            return Ok(());
        }

        visiting.insert(id.to_string());
        for dep in &node.dependencies {
            self.visit(dep, order, visited, visiting)?;
        }
        visiting.remove(id);

        visited.insert(id.to_string());
        order.push(node);
        Ok(())
    }
}

/// Resolves a node's reference attributes to the nodes its edges point at.
#[derive(Debug, Clone, Copy)]
pub struct GraphLookup<'a> {
    graph: &'a ResourceGraph,
    from: &'a str,
}

impl DependencyLookup for GraphLookup<'_> {
    fn resolve(&self, attribute: &str) -> Option<ResourceAddress> {
        self.graph
            .edges_from(self.from)
            .find(|e| e.attribute == attribute)
            .and_then(|e| self.graph.node(&e.to))
            .map(ResourceNode::address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(kind: &str, name: &str) -> ResourceNode {
        ResourceNode::new(kind, name, NodeOrigin::Dependency)
    }

    #[test]
    fn dependencies_come_first() {
        let mut graph = ResourceGraph::new();
        let app = graph.add_node(node("azurerm_linux_web_app", "site")).unwrap();
        let plan = graph.add_node(node("azurerm_service_plan", "shared")).unwrap();
        graph.add_edge(&app, &plan, "service_plan_id").unwrap();

        let order: Vec<&str> = graph
            .topological_order()
            .unwrap()
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(
            order,
            vec!["azurerm_service_plan.shared", "azurerm_linux_web_app.site"]
        );
    }

    #[test]
    fn mutual_reference_is_a_cycle() {
        let mut graph = ResourceGraph::new();
        let x = graph.add_node(node("acme_x", "a")).unwrap();
        let y = graph.add_node(node("acme_y", "a")).unwrap();
        graph.add_edge(&x, &y, "y_id").unwrap();
        graph.add_edge(&y, &x, "x_id").unwrap();

        let result = graph.topological_order();
        assert!(matches!(result, Err(CompileError::DependencyCycle { kind }) if kind == "acme_x"));
    }

    #[test]
    fn duplicate_node_rejected() {
        let mut graph = ResourceGraph::new();
        graph.add_node(node("acme_x", "a")).unwrap();
        let result = graph.add_node(node("acme_x", "a"));
        assert!(matches!(result, Err(CompileError::DuplicateNode { .. })));
    }

    #[test]
    fn edge_to_unknown_node_rejected() {
        let mut graph = ResourceGraph::new();
        let x = graph.add_node(node("acme_x", "a")).unwrap();
        let result = graph.add_edge(&x, "acme_y.a", "y_id");
        assert!(matches!(result, Err(CompileError::UnknownNode { id }) if id == "acme_y.a"));
    }

    #[test]
    fn repeated_edge_recorded_once() {
        let mut graph = ResourceGraph::new();
        let x = graph.add_node(node("acme_x", "a")).unwrap();
        let y = graph.add_node(node("acme_y", "a")).unwrap();
        graph.add_edge(&x, &y, "y_id").unwrap();
        graph.add_edge(&x, &y, "y_id").unwrap();
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.node(&x).unwrap().dependencies, vec![y]);
    }

    #[test]
    fn lookup_follows_edges_by_attribute() {
        let mut graph = ResourceGraph::new();
        let app = graph.add_node(node("azurerm_linux_web_app", "site")).unwrap();
        let plan = graph.add_node(node("azurerm_service_plan", "shared")).unwrap();
        graph.add_edge(&app, &plan, "service_plan_id").unwrap();

        let lookup = graph.lookup_for(&app);
        assert_eq!(
            lookup.resolve("service_plan_id"),
            Some(ResourceAddress::new("azurerm_service_plan", "shared"))
        );
        assert_eq!(lookup.resolve("subnet_id"), None);
    }
}
