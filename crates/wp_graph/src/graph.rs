//! The resource graph and its ordering checks.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::error::{GraphError, GraphResult};
use crate::id::LogicalId;
use crate::resource::{Declare, DeclareOptions, Handle, Node};
use crate::template::{Output, Template};
use crate::value::Value;

/// A directed acyclic graph of resource declarations.
///
/// Nodes may only reference nodes declared before them, so declaration
/// order is always a valid topological order.
#[derive(Debug, Default)]
pub struct ResourceGraph {
    description: String,
    metadata: BTreeMap<String, Value>,
    nodes: Vec<Node>,
    index: HashMap<LogicalId, usize>,
    outputs: Vec<Output>,
}

impl ResourceGraph {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// Declare a node with default options.
    pub fn declare<R: Declare>(&mut self, id: impl Into<String>, resource: R) -> GraphResult<Handle<R>> {
        self.declare_with(id, resource, DeclareOptions::default())
    }

    /// Declare a node.
    ///
    /// Fails when the id is taken or when any reference or explicit
    /// dependency points at a node not yet declared.
    pub fn declare_with<R: Declare>(
        &mut self,
        id: impl Into<String>,
        resource: R,
        options: DeclareOptions,
    ) -> GraphResult<Handle<R>> {
        let id = LogicalId::new(id)?;
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateId(id));
        }

        let properties = resource.properties();
        for target in properties.references().into_iter().chain(options.depends_on.iter()) {
            self.ensure_declared(id.as_str(), target)?;
        }

        let node = Node {
            id: id.clone(),
            resource_type: resource.resource_type(),
            properties,
            depends_on: options.depends_on,
            deletion_policy: options.deletion_policy,
        };

        debug!("Declared {} ({})", node.id, node.resource_type);
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(Handle::new(id))
    }

    /// Expose a value from the template, optionally exported by name.
    pub fn output(
        &mut self,
        name: impl Into<String>,
        value: Value,
        export: Option<String>,
    ) -> GraphResult<()> {
        let name = LogicalId::new(name)?;
        if self.outputs.iter().any(|o| o.name == name) {
            return Err(GraphError::DuplicateOutput(name.to_string()));
        }
        for target in value.references() {
            self.ensure_declared(name.as_str(), target)?;
        }
        self.outputs.push(Output {
            name,
            value,
            export,
        });
        Ok(())
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Scope that prefixes every logical id with `prefix`.
    pub fn scope(&mut self, prefix: impl Into<String>) -> Scope<'_> {
        Scope {
            graph: self,
            prefix: prefix.into(),
        }
    }

    pub fn node(&self, id: &LogicalId) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &LogicalId) -> bool {
        self.index.contains_key(id)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn into_template(self) -> Template {
        Template {
            description: self.description,
            metadata: self.metadata,
            resources: self.nodes,
            outputs: self.outputs,
        }
    }

    fn ensure_declared(&self, node: &str, target: &LogicalId) -> GraphResult<()> {
        if self.index.contains_key(target) {
            Ok(())
        } else {
            Err(GraphError::UnresolvedReference {
                node: node.to_string(),
                missing: target.clone(),
            })
        }
    }
}

/// A component's view of the graph.
///
/// Builders declare through a scope so that ids from different
/// components never collide.
#[derive(Debug)]
pub struct Scope<'g> {
    graph: &'g mut ResourceGraph,
    prefix: String,
}

impl Scope<'_> {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full logical id for a name inside this scope.
    pub fn id(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub fn declare<R: Declare>(&mut self, name: &str, resource: R) -> GraphResult<Handle<R>> {
        let id = self.id(name);
        self.graph.declare(id, resource)
    }

    pub fn declare_with<R: Declare>(
        &mut self,
        name: &str,
        resource: R,
        options: DeclareOptions,
    ) -> GraphResult<Handle<R>> {
        let id = self.id(name);
        self.graph.declare_with(id, resource, options)
    }

    pub fn output(&mut self, name: &str, value: Value, export: Option<String>) -> GraphResult<()> {
        let id = self.id(name);
        self.graph.output(id, value, export)
    }

    pub fn graph(&self) -> &ResourceGraph {
        &*self.graph
    }
}
