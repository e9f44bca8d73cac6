//! Composition root: wires the builders together for one profile.

use std::path::PathBuf;

use tracing::info;
use wp_config::Profile;
use wp_graph::ResourceGraph;

use crate::application::{ApplicationBuilder, ComputeReference};
use crate::assembly::{Assembly, DockerImageAsset, StackArtifact};
use crate::database::{DatabaseBuilder, DatabaseReference, DatabaseShape, PrivateZone};
use crate::error::StackResult;
use crate::network::{NetworkBuilder, NetworkGraph};
use crate::pipeline::{DeliveryPipelineBuilder, InfrastructurePipelineBuilder, PipelineReference};

/// Directory holding the WordPress image build context.
pub const DEFAULT_IMAGE_CONTEXT: &str = "docker";

/// Inputs that do not come from the profile.
#[derive(Debug, Clone)]
pub struct SynthOptions {
    pub image_context: PathBuf,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            image_context: PathBuf::from(DEFAULT_IMAGE_CONTEXT),
        }
    }
}

/// `<env>-<project>-stack`
pub fn application_stack_name(profile: &Profile) -> String {
    format!("{}-stack", profile.prefix())
}

/// `<env>-<project>-infrastructure-pipeline`
pub fn pipeline_stack_name(profile: &Profile) -> String {
    format!("{}-infrastructure-pipeline", profile.prefix())
}

/// The application stack's components, in build order.
#[derive(Debug, Clone)]
pub struct ApplicationStack {
    pub network: NetworkGraph,
    pub zone: PrivateZone,
    pub database: DatabaseReference,
    pub compute: ComputeReference,
    pub delivery: PipelineReference,
}

/// Declare network, database, application and delivery pipeline into `graph`.
pub fn build_application(
    graph: &mut ResourceGraph,
    profile: &Profile,
    options: &SynthOptions,
) -> StackResult<ApplicationStack> {
    let prefix = profile.prefix();
    for (key, value) in profile.stack_tags() {
        graph.set_metadata(key, value);
    }

    // Decided up front so a bad capacity fails before any declaration.
    let shape = DatabaseShape::select(profile.production, &profile.database)?;

    let network = NetworkBuilder::from_config(&prefix, &profile.network).build(graph)?;
    let zone = PrivateZone::declare(graph, &network, &profile.private_hosted_zone_name)?;
    let database = DatabaseBuilder::new(&prefix, shape)
        .deletion_protection(profile.production)
        .build(graph, &network, &network.isolated, &zone)?;
    let image = DockerImageAsset::staged(
        format!("{}-image", prefix),
        &options.image_context,
        &profile.account_id,
        &profile.region,
    );
    let compute = ApplicationBuilder::new(&prefix, profile.ecs.clone(), image)
        .production(profile.production)
        .build(graph, &network, &database)?;
    let delivery = DeliveryPipelineBuilder::new(&prefix).build(graph, &compute)?;

    Ok(ApplicationStack {
        network,
        zone,
        database,
        compute,
        delivery,
    })
}

fn artifact(profile: &Profile, name: String, graph: ResourceGraph, depends_on: Vec<String>) -> StackArtifact {
    StackArtifact {
        name,
        account: profile.account_id.clone(),
        region: profile.region.clone(),
        tags: profile.stack_tags(),
        template: graph.into_template(),
        depends_on,
    }
}

/// Synthesize every stack for `profile`.
///
/// With the infrastructure pipeline enabled, the pipeline stack comes
/// first and the application stack is deployed by its last stage.
/// Nothing is returned unless every stack built.
pub fn synthesize(profile: &Profile, options: &SynthOptions) -> StackResult<Assembly> {
    profile.validate()?;
    info!(
        "Synthesizing {} ({}, {})",
        profile.prefix(),
        profile.region,
        if profile.infrastructure_pipeline { "pipeline" } else { "direct" }
    );

    let app_name = application_stack_name(profile);
    let mut app_graph = ResourceGraph::new(format!("WordPress application stack {}", app_name));
    let application = build_application(&mut app_graph, profile, options)?;
    let image = application.compute.image.clone();

    if !profile.infrastructure_pipeline {
        return Ok(Assembly {
            stacks: vec![artifact(profile, app_name, app_graph, Vec::new())],
            assets: vec![image],
        });
    }

    let pipeline_name = pipeline_stack_name(profile);
    let mut pipeline_graph = ResourceGraph::new(format!("Infrastructure pipeline {}", pipeline_name));
    for (key, value) in profile.stack_tags() {
        pipeline_graph.set_metadata(key, value);
    }
    InfrastructurePipelineBuilder::new(
        &profile.name,
        &profile.project,
        &profile.repository.arn,
        &profile.repository.branch,
    )
    .image(image.clone())
    .build(&mut pipeline_graph)?;

    Ok(Assembly {
        stacks: vec![
            artifact(profile, pipeline_name.clone(), pipeline_graph, Vec::new()),
            artifact(profile, app_name, app_graph, vec![pipeline_name]),
        ],
        assets: vec![image],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wp_config::ProfileCatalog;

    fn profile(name: &str) -> Profile {
        ProfileCatalog::builtin().unwrap().get(name).unwrap().clone()
    }

    #[test]
    fn test_stack_names() {
        let dev = profile("dev");
        assert_eq!(application_stack_name(&dev), "dev-exprj-stack");
        assert_eq!(pipeline_stack_name(&dev), "dev-exprj-infrastructure-pipeline");
    }

    #[test]
    fn test_pipeline_mode_wraps_application() {
        let assembly = synthesize(&profile("dev"), &SynthOptions::default()).unwrap();
        let names: Vec<_> = assembly.stacks.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["dev-exprj-infrastructure-pipeline", "dev-exprj-stack"]);
        assert_eq!(
            assembly.stack("dev-exprj-stack").unwrap().depends_on,
            vec!["dev-exprj-infrastructure-pipeline".to_string()]
        );
    }

    #[test]
    fn test_direct_mode_has_one_stack() {
        let mut dev = profile("dev");
        dev.infrastructure_pipeline = false;
        let assembly = synthesize(&dev, &SynthOptions::default()).unwrap();
        assert_eq!(assembly.stacks.len(), 1);
        assert_eq!(assembly.primary().unwrap().name, "dev-exprj-stack");
        assert_eq!(assembly.assets.len(), 1);
        assert_eq!(
            assembly.assets[0].repository_name,
            "cdk-hnb659fds-container-assets-364050767034-eu-central-1"
        );
    }

    #[test]
    fn test_invalid_profile_fails_before_building() {
        let mut dev = profile("dev");
        dev.network.nat_count = 0;
        let err = synthesize(&dev, &SynthOptions::default()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_tags_in_metadata() {
        let assembly = synthesize(&profile("dev"), &SynthOptions::default()).unwrap();
        for stack in &assembly.stacks {
            assert_eq!(
                stack.template.metadata.get("CostAccount").and_then(|v| v.as_str()),
                Some("dev")
            );
            assert_eq!(stack.tags.get("Environment").map(String::as_str), Some("dev"));
        }
    }
}
