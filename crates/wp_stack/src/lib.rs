//! # wp_stack
//!
//! Builds the WordPress hosting infrastructure as a resource graph.
//!
//! The builders run in dependency order, each taking the references the
//! previous ones returned:
//!
//! 1. [`NetworkBuilder`]: VPC, public/private/isolated subnets, NAT
//! 2. [`DatabaseBuilder`]: serverless or provisioned cluster, per profile
//! 3. [`ApplicationBuilder`]: load balancer, file system, container service
//! 4. [`DeliveryPipelineBuilder`]: image release pipeline
//!
//! [`synthesize`] runs the chain for one profile and, when the profile
//! asks for it, wraps it in an [`InfrastructurePipelineBuilder`] pipeline.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use wp_stack::{synthesize, OutputFormat, SynthOptions};
//!
//! let profile = wp_config::resolve(Some("dev")).unwrap();
//! let assembly = synthesize(&profile, &SynthOptions::default()).unwrap();
//! assembly.write_to(Path::new("cdk.out"), OutputFormat::Json).unwrap();
//! ```

pub mod application;
pub mod assembly;
pub mod database;
pub mod error;
pub mod network;
pub mod pipeline;
pub mod resources;
pub mod stack;

pub use application::{ApplicationBuilder, ComputeReference};
pub use assembly::{Assembly, DockerImageAsset, OutputFormat, StackArtifact};
pub use database::{DatabaseBuilder, DatabaseReference, DatabaseShape, PrivateZone};
pub use error::{StackError, StackResult};
pub use network::{NetworkBuilder, NetworkGraph, SubnetGroup, Tier};
pub use pipeline::{DeliveryPipelineBuilder, InfrastructurePipelineBuilder, PipelineReference};
pub use stack::{build_application, synthesize, ApplicationStack, SynthOptions};
