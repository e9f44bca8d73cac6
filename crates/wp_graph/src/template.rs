//! Rendered template handed to the provisioning engine.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::GraphResult;
use crate::id::LogicalId;
use crate::resource::Node;
use crate::value::Value;

pub const FORMAT_VERSION: &str = "2010-09-09";

/// A value exposed by the template.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub name: LogicalId,
    pub value: Value,
    pub export: Option<String>,
}

/// A complete, self-contained resource template.
///
/// Resources keep declaration order; every reference inside resolves to
/// a resource of the same template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub description: String,
    pub metadata: BTreeMap<String, Value>,
    pub resources: Vec<Node>,
    pub outputs: Vec<Output>,
}

impl Template {
    pub fn resource(&self, id: &str) -> Option<&Node> {
        self.resources.iter().find(|n| n.id.as_str() == id)
    }

    pub fn resources_of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.resources
            .iter()
            .filter(move |n| n.resource_type == resource_type)
    }

    pub fn count_of_type(&self, resource_type: &str) -> usize {
        self.resources_of_type(resource_type).count()
    }

    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.name.as_str() == name)
    }

    pub fn to_json(&self) -> GraphResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> GraphResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

struct Resources<'a>(&'a [Node]);

impl Serialize for Resources<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for node in self.0 {
            map.serialize_entry(node.id.as_str(), &RenderedNode(node))?;
        }
        map.end()
    }
}

struct RenderedNode<'a>(&'a Node);

impl Serialize for RenderedNode<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let node = self.0;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("Type", node.resource_type)?;
        if !node.depends_on.is_empty() {
            map.serialize_entry("DependsOn", &node.depends_on)?;
        }
        if let Some(policy) = node.deletion_policy {
            map.serialize_entry("DeletionPolicy", &policy)?;
            map.serialize_entry("UpdateReplacePolicy", &policy)?;
        }
        if !node.properties.is_empty() {
            map.serialize_entry("Properties", &node.properties)?;
        }
        map.end()
    }
}

struct Outputs<'a>(&'a [Output]);

impl Serialize for Outputs<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for output in self.0 {
            map.serialize_entry(output.name.as_str(), &RenderedOutput(output))?;
        }
        map.end()
    }
}

struct RenderedOutput<'a>(&'a Output);

impl Serialize for RenderedOutput<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let output = self.0;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("Value", &output.value)?;
        if let Some(export) = &output.export {
            let mut name = BTreeMap::new();
            name.insert("Name", export);
            map.serialize_entry("Export", &name)?;
        }
        map.end()
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("AWSTemplateFormatVersion", FORMAT_VERSION)?;
        map.serialize_entry("Description", &self.description)?;
        if !self.metadata.is_empty() {
            map.serialize_entry("Metadata", &self.metadata)?;
        }
        map.serialize_entry("Resources", &Resources(&self.resources))?;
        if !self.outputs.is_empty() {
            map.serialize_entry("Outputs", &Outputs(&self.outputs))?;
        }
        map.end()
    }
}
