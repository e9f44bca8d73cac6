//! # wp_graph
//!
//! Declarative resource graph for infrastructure templates.
//!
//! Every resource kind implements [`Declare`]; declaring it into a
//! [`ResourceGraph`] returns a typed [`Handle`] whose identifier later
//! declarations may reference. The graph refuses references to nodes
//! that have not been declared yet, so construction order is always a
//! valid dependency order and the rendered [`Template`] never contains a
//! dangling reference.
//!
//! ## Example
//!
//! ```rust
//! use wp_graph::{Declare, Properties, ResourceGraph};
//!
//! struct Vpc;
//!
//! impl Declare for Vpc {
//!     fn resource_type(&self) -> &'static str {
//!         "AWS::EC2::VPC"
//!     }
//!
//!     fn properties(&self) -> Properties {
//!         Properties::new().set("CidrBlock", "10.0.0.0/16")
//!     }
//! }
//!
//! let mut graph = ResourceGraph::new("example");
//! let vpc = graph.declare("Vpc", Vpc).unwrap();
//! graph.output("VpcId", vpc.reference(), None).unwrap();
//! let json = graph.into_template().to_json().unwrap();
//! assert!(json.contains("AWS::EC2::VPC"));
//! ```

pub mod cidr;
pub mod error;
pub mod graph;
pub mod id;
pub mod resource;
pub mod template;
pub mod value;

pub use error::{GraphError, GraphResult};
pub use graph::{ResourceGraph, Scope};
pub use id::LogicalId;
pub use resource::{Declare, DeclareOptions, DeletionPolicy, Handle, Node};
pub use template::{Output, Template};
pub use value::{Properties, Pseudo, Value};
