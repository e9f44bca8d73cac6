//! Property values, including intrinsic references between nodes.

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::id::LogicalId;

/// Values resolved by the provisioning engine rather than by this program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pseudo {
    Region,
    AccountId,
    StackName,
    Partition,
    UrlSuffix,
}

impl Pseudo {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pseudo::Region => "AWS::Region",
            Pseudo::AccountId => "AWS::AccountId",
            Pseudo::StackName => "AWS::StackName",
            Pseudo::Partition => "AWS::Partition",
            Pseudo::UrlSuffix => "AWS::URLSuffix",
        }
    }
}

/// A property value in a declared node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Map(Properties),
    /// Primary identifier of another node.
    Ref(LogicalId),
    /// Named attribute of another node.
    GetAtt(LogicalId, String),
    Join(String, Vec<Value>),
    Select(usize, Box<Value>),
    /// Availability zones of the target region.
    GetAzs,
    Pseudo(Pseudo),
}

impl Value {
    pub fn join(separator: impl Into<String>, parts: Vec<Value>) -> Self {
        Value::Join(separator.into(), parts)
    }

    /// Availability zone at `index` in the target region.
    pub fn availability_zone(index: usize) -> Self {
        Value::Select(index, Box::new(Value::GetAzs))
    }

    /// Resource tags in `[{Key, Value}]` form.
    pub fn tags<K, V>(tags: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::List(
            tags.into_iter()
                .map(|(key, value)| {
                    let key: String = key.into();
                    Value::Map(Properties::new().set("Key", key).set("Value", value))
                })
                .collect(),
        )
    }

    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Every node this value points at, in order of appearance.
    pub fn references(&self) -> Vec<&LogicalId> {
        let mut found = Vec::new();
        self.collect_references(&mut found);
        found
    }

    fn collect_references<'a>(&'a self, found: &mut Vec<&'a LogicalId>) {
        match self {
            Value::Ref(id) | Value::GetAtt(id, _) => found.push(id),
            Value::List(items) | Value::Join(_, items) => {
                for item in items {
                    item.collect_references(found);
                }
            }
            Value::Map(props) => {
                for value in props.values() {
                    value.collect_references(found);
                }
            }
            Value::Select(_, inner) => inner.collect_references(found),
            Value::Null
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Str(_)
            | Value::GetAzs
            | Value::Pseudo(_) => {}
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Properties> {
        match self {
            Value::Map(props) => Some(props),
            _ => None,
        }
    }

    /// Target of a `Ref`, if this value is one.
    pub fn as_ref_id(&self) -> Option<&LogicalId> {
        match self {
            Value::Ref(id) => Some(id),
            _ => None,
        }
    }

    /// Look up a nested key in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|props| props.get(key))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Str(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u16> for Value {
    fn from(i: u16) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u8> for Value {
    fn from(i: u8) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Properties> for Value {
    fn from(props: Properties) -> Self {
        Value::Map(props)
    }
}

impl From<Pseudo> for Value {
    fn from(p: Pseudo) -> Self {
        Value::Pseudo(p)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(props) => props.serialize(serializer),
            Value::Ref(id) => single(serializer, "Ref", id),
            Value::GetAtt(id, attr) => {
                single(serializer, "Fn::GetAtt", &(id.as_str(), attr.as_str()))
            }
            Value::Join(separator, parts) => {
                single(serializer, "Fn::Join", &(separator.as_str(), parts))
            }
            Value::Select(index, inner) => single(serializer, "Fn::Select", &(index, inner)),
            Value::GetAzs => single(serializer, "Fn::GetAZs", ""),
            Value::Pseudo(p) => single(serializer, "Ref", p.as_str()),
        }
    }
}

fn single<S, T>(serializer: S, key: &str, value: &T) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize + ?Sized,
{
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(key, value)?;
    map.end()
}

/// Ordered property map of a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(BTreeMap<String, Value>);

impl Properties {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Set the key only when a value is present.
    pub fn set_opt(self, key: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn references(&self) -> Vec<&LogicalId> {
        let mut found = Vec::new();
        for value in self.0.values() {
            value.collect_references(&mut found);
        }
        found
    }
}

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> LogicalId {
        LogicalId::new(s).unwrap()
    }

    #[test]
    fn test_intrinsic_shapes() {
        let value = Value::list(vec![
            Value::Ref(id("Vpc")),
            Value::GetAtt(id("Cluster"), "Endpoint.Address".to_string()),
            Value::availability_zone(2),
            Value::Pseudo(Pseudo::Region),
        ]);

        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!([
                {"Ref": "Vpc"},
                {"Fn::GetAtt": ["Cluster", "Endpoint.Address"]},
                {"Fn::Select": [2, {"Fn::GetAZs": ""}]},
                {"Ref": "AWS::Region"}
            ])
        );
    }

    #[test]
    fn test_join_serialization() {
        let value = Value::join(":", vec![Value::Ref(id("Repo")), "latest".into()]);
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({"Fn::Join": [":", [{"Ref": "Repo"}, "latest"]]})
        );
    }

    #[test]
    fn test_tags() {
        let tags = Value::tags([("Name", "dev-exprj-vpc")]);
        assert_eq!(
            serde_json::to_value(&tags).unwrap(),
            json!([{"Key": "Name", "Value": "dev-exprj-vpc"}])
        );
    }

    #[test]
    fn test_references_are_collected_from_nested_values() {
        let props = Properties::new()
            .set("VpcId", Value::Ref(id("Vpc")))
            .set(
                "Nested",
                Properties::new().set(
                    "Items",
                    Value::list(vec![Value::GetAtt(id("Sg"), "GroupId".to_string())]),
                ),
            )
            .set("Plain", "text");

        let refs: Vec<_> = props.references().into_iter().map(|r| r.as_str()).collect();
        // keys iterate in sorted order: Nested, Plain, VpcId
        assert_eq!(refs, vec!["Sg", "Vpc"]);
    }

    #[test]
    fn test_set_opt() {
        let props = Properties::new()
            .set_opt("Present", Some(1u32))
            .set_opt("Absent", None::<u32>);
        assert_eq!(props.len(), 1);
        assert_eq!(props.get("Present").and_then(Value::as_int), Some(1));
    }
}
