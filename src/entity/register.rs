//! Keyed lookup over loaded entities.
//!
//! Entities reference each other by id; the register is the single place
//! those ids resolve. Groups may arrive with nodes and edges embedded
//! inline or as `{ "id": … }` stubs — inserting a group normalizes both
//! forms into flat id-keyed maps, so edges never hold pointers into a
//! cyclic object graph.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Backend, HasId, QueryEdge, QueryGroup, QueryNode, StoredQuery};
use crate::error::{EngineError, EntityKind, Result};

/// An `{ "id": … }` stub standing in for a full entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefStub {
    pub id: String,
}

/// An entity reference as it appears on the wire: inline or stub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityRef<T> {
    Inline(T),
    Ref(RefStub),
}

impl<T: HasId> EntityRef<T> {
    pub fn id(&self) -> &str {
        match self {
            EntityRef::Inline(entity) => entity.id(),
            EntityRef::Ref(stub) => &stub.id,
        }
    }
}

/// Flat id-keyed store of every entity kind the engine consumes.
#[derive(Debug, Default)]
pub struct EntityRegister {
    queries: HashMap<String, Arc<StoredQuery>>,
    nodes: HashMap<String, Arc<QueryNode>>,
    edges: HashMap<String, Arc<QueryEdge>>,
    groups: HashMap<String, Arc<QueryGroup>>,
    backends: HashMap<String, Arc<Backend>>,
}

impl EntityRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_query(&mut self, query: StoredQuery) {
        self.queries.insert(query.id.clone(), Arc::new(query));
    }

    pub fn insert_node(&mut self, node: QueryNode) {
        self.nodes.insert(node.id.clone(), Arc::new(node));
    }

    pub fn insert_edge(&mut self, edge: QueryEdge) {
        self.edges.insert(edge.id.clone(), Arc::new(edge));
    }

    pub fn insert_backend(&mut self, backend: Backend) {
        self.backends.insert(backend.id.clone(), Arc::new(backend));
    }

    /// Insert a group, hoisting any inline nodes and edges into the flat
    /// maps. The stored group only carries id stubs afterwards.
    pub fn insert_group(&mut self, mut group: QueryGroup) {
        for node_ref in &mut group.nodes {
            if let EntityRef::Inline(node) = node_ref {
                let id = node.id.clone();
                self.nodes.insert(id.clone(), Arc::new(node.clone()));
                *node_ref = EntityRef::Ref(RefStub { id });
            }
        }
        for edge_ref in &mut group.edges {
            if let EntityRef::Inline(edge) = edge_ref {
                let id = edge.id.clone();
                self.edges.insert(id.clone(), Arc::new(edge.clone()));
                *edge_ref = EntityRef::Ref(RefStub { id });
            }
        }
        self.groups.insert(group.id.clone(), Arc::new(group));
    }

    pub fn query(&self, id: &str) -> Result<Arc<StoredQuery>> {
        self.queries.get(id).cloned().ok_or_else(|| {
            EngineError::UnresolvedReference {
                kind: EntityKind::Query,
                id: id.to_string(),
            }
        })
    }

    pub fn node(&self, id: &str) -> Result<Arc<QueryNode>> {
        self.nodes.get(id).cloned().ok_or_else(|| {
            EngineError::UnresolvedReference {
                kind: EntityKind::Node,
                id: id.to_string(),
            }
        })
    }

    pub fn edge(&self, id: &str) -> Result<Arc<QueryEdge>> {
        self.edges.get(id).cloned().ok_or_else(|| {
            EngineError::UnresolvedReference {
                kind: EntityKind::Edge,
                id: id.to_string(),
            }
        })
    }

    pub fn group(&self, id: &str) -> Result<Arc<QueryGroup>> {
        self.groups.get(id).cloned().ok_or_else(|| {
            EngineError::UnresolvedReference {
                kind: EntityKind::Group,
                id: id.to_string(),
            }
        })
    }

    pub fn backend(&self, id: &str) -> Result<Arc<Backend>> {
        self.backends.get(id).cloned().ok_or_else(|| {
            EngineError::UnresolvedReference {
                kind: EntityKind::Backend,
                id: id.to_string(),
            }
        })
    }
}
