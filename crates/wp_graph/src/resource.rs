//! The declaration capability shared by every resource kind.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;

use crate::id::LogicalId;
use crate::value::{Properties, Value};

/// A resource kind that can be declared into a graph.
///
/// Implementors are plain data: the graph asks for the provider type
/// name and the rendered properties once, at declaration time.
pub trait Declare {
    /// Provider type name, e.g. `AWS::EC2::VPC`.
    fn resource_type(&self) -> &'static str;

    fn properties(&self) -> Properties;
}

/// What the provisioning engine does with a node when it leaves the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeletionPolicy {
    Delete,
    Retain,
    Snapshot,
}

/// Typed reference to a declared node.
///
/// Handles are only produced by [`crate::ResourceGraph`], so holding one
/// proves the node exists earlier in construction order.
pub struct Handle<R> {
    id: LogicalId,
    _kind: PhantomData<fn() -> R>,
}

impl<R> Handle<R> {
    pub(crate) fn new(id: LogicalId) -> Self {
        Self {
            id,
            _kind: PhantomData,
        }
    }

    pub fn identifier(&self) -> &LogicalId {
        &self.id
    }

    /// The node's primary identifier.
    pub fn reference(&self) -> Value {
        Value::Ref(self.id.clone())
    }

    pub fn attr(&self, name: impl Into<String>) -> Value {
        Value::GetAtt(self.id.clone(), name.into())
    }
}

impl<R> Clone for Handle<R> {
    fn clone(&self) -> Self {
        Self::new(self.id.clone())
    }
}

impl<R> PartialEq for Handle<R> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<R> Eq for Handle<R> {}

impl<R> fmt::Debug for Handle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.id).finish()
    }
}

/// A node as it appears in the rendered template.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: LogicalId,
    pub resource_type: &'static str,
    pub properties: Properties,
    pub depends_on: Vec<LogicalId>,
    pub deletion_policy: Option<DeletionPolicy>,
}

impl Node {
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Nodes this one must follow, from references and explicit ordering.
    pub fn dependencies(&self) -> Vec<&LogicalId> {
        let mut deps = self.properties.references();
        deps.extend(self.depends_on.iter());
        deps.sort();
        deps.dedup();
        deps
    }
}

/// Extra per-node settings.
#[derive(Debug, Clone, Default)]
pub struct DeclareOptions {
    pub(crate) depends_on: Vec<LogicalId>,
    pub(crate) deletion_policy: Option<DeletionPolicy>,
}

impl DeclareOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Order this node after another one it does not reference.
    pub fn depends_on<R>(mut self, handle: &Handle<R>) -> Self {
        self.depends_on.push(handle.identifier().clone());
        self
    }

    pub fn deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self
    }

    /// Keep the live resource when it is removed from the graph.
    pub fn retain(self) -> Self {
        self.deletion_policy(DeletionPolicy::Retain)
    }
}
