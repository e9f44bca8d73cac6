//! Resource kinds declared by the builders.
//!
//! Each kind is a plain struct implementing [`wp_graph::Declare`]; fields
//! that point at other nodes hold a [`wp_graph::Value`] obtained from a
//! handle, so the graph can check declaration order.

pub mod compute;
pub mod data;
pub mod delivery;
pub mod network;
pub mod security;
pub mod storage;

use wp_graph::Value;

/// `Name` tag in the provider's tag-list form.
pub(crate) fn name_tag(name: &str) -> Value {
    Value::tags([("Name", name)])
}

/// An AWS service principal, e.g. `ecs-tasks.amazonaws.com`.
pub(crate) fn service_principal(service: &str) -> String {
    format!("{}.amazonaws.com", service)
}
