//! Delivery pipelines: the image release pipeline and the self-mutating
//! infrastructure pipeline that wraps the whole stack.

use tracing::info;
use wp_graph::{Handle, Properties, Pseudo, ResourceGraph, Scope, Value};

use crate::application::{ComputeReference, IMAGE_TAG};
use crate::assembly::DockerImageAsset;
use crate::error::{StackError, StackResult};
use crate::resources::delivery::{
    pipeline_arn, Action, BuildProject, BuildSource, EventRule, Pipeline, Stage,
};
use crate::resources::security::Role;
use crate::resources::storage::Bucket;

/// Directory the synth step writes the assembly into.
pub const ASSEMBLY_DIR: &str = "cdk.out";

const IMAGE_DEFINITION_BUILDSPEC: &str = r#"version: 0.2
phases:
  build:
    commands:
      - IMAGE_URI=$(jq -r '.ImageURI' imageDetail.json)
      - printf '[{"name":"%s","imageUri":"%s"}]' "$CONTAINER_NAME" "$IMAGE_URI" > imagedefinitions.json
artifacts:
  files:
    - imagedefinitions.json
"#;

const SYNTH_BUILDSPEC: &str = r#"version: 0.2
phases:
  install:
    commands:
      - curl --proto '=https' --tlsv1.2 -sSf https://sh.rustup.rs | sh -s -- -y --profile minimal
      - . "$HOME/.cargo/env"
  build:
    commands:
      - cargo run --release -p wp_cli -- --environment "$ENVIRONMENT_NAME" --output cdk.out
artifacts:
  base-directory: cdk.out
  files:
    - '**/*'
"#;

const ASSETS_BUILDSPEC: &str = r#"version: 0.2
phases:
  pre_build:
    commands:
      - REGISTRY="$AWS_ACCOUNT_ID.dkr.ecr.$AWS_DEFAULT_REGION.amazonaws.com"
      - aws ecr get-login-password | docker login --username AWS --password-stdin "$REGISTRY"
  build:
    commands:
      - docker build -t "$REGISTRY/$REPOSITORY_NAME:$IMAGE_TAG" "$CODEBUILD_SRC_DIR/$IMAGE_DIRECTORY"
      - docker push "$REGISTRY/$REPOSITORY_NAME:$IMAGE_TAG"
"#;

/// Repository name from a CodeCommit ARN, `arn:aws:codecommit:<region>:<account>:<name>`.
pub fn repository_name_from_arn(arn: &str) -> StackResult<&str> {
    match arn.rsplit(':').next() {
        Some(name) if arn.starts_with("arn:") && !name.is_empty() => Ok(name),
        _ => Err(StackError::invalid(
            "repository.arn",
            format!("'{}' does not name a repository", arn),
        )),
    }
}

/// A declared pipeline.
#[derive(Debug, Clone)]
pub struct PipelineReference {
    pub pipeline: Handle<Pipeline>,
    pub name: String,
    pub stages: Vec<String>,
    pub artifact_bucket: Handle<Bucket>,
}

fn artifact_bucket(scope: &mut Scope<'_>) -> StackResult<Handle<Bucket>> {
    Ok(scope.declare("ArtifactBucket", Bucket::default())?)
}

/// Event rule that starts `pipeline` on matching events.
fn trigger(
    scope: &mut Scope<'_>,
    pipeline: &Handle<Pipeline>,
    description: String,
    pattern: Properties,
) -> StackResult<()> {
    let arn = pipeline_arn(pipeline.reference());
    let role = scope.declare(
        "EventsRole",
        Role::for_service("events").allow(["codepipeline:StartPipelineExecution"], vec![arn.clone()]),
    )?;
    scope.declare(
        "TriggerRule",
        EventRule {
            description,
            pattern,
            target: arn,
            role: role.attr("Arn"),
        },
    )?;
    Ok(())
}

/// Three-stage release of a new container image to the service:
/// `Source` → `CreateImageDefinition` → `Deploy`.
pub struct DeliveryPipelineBuilder {
    prefix: String,
}

impl DeliveryPipelineBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn build(self, graph: &mut ResourceGraph, compute: &ComputeReference) -> StackResult<PipelineReference> {
        info!("Building delivery pipeline for {}", compute.service_name);
        let mut scope = graph.scope("Delivery");
        let bucket = artifact_bucket(&mut scope)?;
        let any: Value = "*".into();

        let build_role = scope.declare(
            "BuildRole",
            Role::for_service("codebuild")
                .allow(
                    ["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"],
                    vec![any.clone()],
                )
                .allow(
                    ["s3:GetObject", "s3:PutObject", "s3:GetBucketLocation"],
                    vec![
                        bucket.attr("Arn"),
                        Value::join("", vec![bucket.attr("Arn"), "/*".into()]),
                    ],
                ),
        )?;
        let project_name = format!("{}-image-definition", compute.container_name);
        let project = scope.declare(
            "ImageDefinitionProject",
            BuildProject {
                name: format!("{}-{}", self.prefix, project_name),
                role: build_role.attr("Arn"),
                source: BuildSource::Pipeline,
                buildspec: IMAGE_DEFINITION_BUILDSPEC.to_string(),
                environment: vec![("CONTAINER_NAME".to_string(), compute.container_name.clone().into())],
                privileged: false,
            },
        )?;

        let pipeline_role = scope.declare(
            "PipelineRole",
            Role::for_service("codepipeline")
                .allow(
                    ["s3:GetObject", "s3:PutObject", "s3:GetBucketVersioning"],
                    vec![
                        bucket.attr("Arn"),
                        Value::join("", vec![bucket.attr("Arn"), "/*".into()]),
                    ],
                )
                .allow(["ecr:DescribeImages"], vec![compute.repository.attr("Arn")])
                .allow(
                    ["codebuild:StartBuild", "codebuild:BatchGetBuilds"],
                    vec![project.attr("Arn")],
                )
                .allow(
                    [
                        "ecs:DescribeServices",
                        "ecs:DescribeTaskDefinition",
                        "ecs:RegisterTaskDefinition",
                        "ecs:UpdateService",
                        "iam:PassRole",
                    ],
                    vec![any],
                ),
        )?;

        let stages = vec![
            Stage::new(
                "Source",
                vec![Action::ecr_source(
                    "Image",
                    compute.repository.reference(),
                    IMAGE_TAG,
                    "Image",
                )],
            ),
            Stage::new(
                "CreateImageDefinition",
                vec![Action::codebuild("ImageDefinition", project.reference(), "Image", Some("ImageDefinition"))],
            ),
            Stage::new(
                "Deploy",
                vec![Action::ecs_deploy(
                    "Deploy",
                    compute.cluster.reference(),
                    compute.service.attr("Name"),
                    "ImageDefinition",
                )],
            ),
        ];
        let name = format!("{}-{}-pipeline", self.prefix, compute.container_name);
        let definition = Pipeline {
            name: name.clone(),
            role: pipeline_role.attr("Arn"),
            artifact_bucket: bucket.reference(),
            stages,
            restart_on_update: false,
        };
        let stage_names = definition.stage_names().into_iter().map(String::from).collect();
        let pipeline = scope.declare("Pipeline", definition)?;

        trigger(
            &mut scope,
            &pipeline,
            format!("Release new {} images", compute.repository_name),
            Properties::new()
                .set("source", Value::list(["aws.ecr"]))
                .set("detail-type", Value::list(["ECR Image Action"]))
                .set(
                    "detail",
                    Properties::new()
                        .set("action-type", Value::list(["PUSH"]))
                        .set("result", Value::list(["SUCCESS"]))
                        .set("repository-name", Value::list([compute.repository_name.as_str()]))
                        .set("image-tag", Value::list([IMAGE_TAG])),
                ),
        )?;

        Ok(PipelineReference {
            pipeline,
            name,
            stages: stage_names,
            artifact_bucket: bucket,
        })
    }
}

/// Pipeline that rebuilds this program's output on every push, updates
/// itself, publishes the image and then deploys the application stack.
pub struct InfrastructurePipelineBuilder {
    environment: String,
    project: String,
    repository_arn: String,
    branch: String,
    pipeline_stack: String,
    application_stack: String,
    image: Option<DockerImageAsset>,
}

impl InfrastructurePipelineBuilder {
    pub fn new(
        environment: impl Into<String>,
        project: impl Into<String>,
        repository_arn: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        let environment = environment.into();
        let project = project.into();
        Self {
            pipeline_stack: format!("{}-{}-infrastructure-pipeline", environment, project),
            application_stack: format!("{}-{}-stack", environment, project),
            image: None,
            environment,
            project,
            repository_arn: repository_arn.into(),
            branch: branch.into(),
        }
    }

    /// The image the asset stage builds and stages for the application stack.
    pub fn image(mut self, image: DockerImageAsset) -> Self {
        self.image = Some(image);
        self
    }

    pub fn pipeline_stack(&self) -> &str {
        &self.pipeline_stack
    }

    pub fn application_stack(&self) -> &str {
        &self.application_stack
    }

    pub fn build(self, graph: &mut ResourceGraph) -> StackResult<PipelineReference> {
        let repository = repository_name_from_arn(&self.repository_arn)?.to_string();
        let image = self.image.as_ref().ok_or_else(|| {
            StackError::MissingDependency("infrastructure pipeline needs the application image".to_string())
        })?;
        info!(
            "Building infrastructure pipeline for {}@{}",
            repository, self.branch
        );

        let mut scope = graph.scope("Infrastructure");
        let bucket = artifact_bucket(&mut scope)?;
        let any: Value = "*".into();
        let bucket_objects = vec![
            bucket.attr("Arn"),
            Value::join("", vec![bucket.attr("Arn"), "/*".into()]),
        ];

        let build_role = scope.declare(
            "BuildRole",
            Role::for_service("codebuild")
                .allow(
                    ["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"],
                    vec![any.clone()],
                )
                .allow(["s3:GetObject", "s3:PutObject"], bucket_objects.clone())
                .allow(
                    [
                        "ecr:GetAuthorizationToken",
                        "ecr:BatchCheckLayerAvailability",
                        "ecr:InitiateLayerUpload",
                        "ecr:UploadLayerPart",
                        "ecr:CompleteLayerUpload",
                        "ecr:PutImage",
                        "kms:Decrypt",
                        "kms:GenerateDataKey",
                    ],
                    vec![any.clone()],
                ),
        )?;
        let synth = scope.declare(
            "SynthProject",
            BuildProject {
                name: format!("{}-{}-synth", self.environment, self.project),
                role: build_role.attr("Arn"),
                source: BuildSource::Pipeline,
                buildspec: SYNTH_BUILDSPEC.to_string(),
                environment: vec![("ENVIRONMENT_NAME".to_string(), self.environment.clone().into())],
                privileged: false,
            },
        )?;
        let assets = scope.declare(
            "AssetsProject",
            BuildProject {
                name: format!("{}-{}-assets", self.environment, self.project),
                role: build_role.attr("Arn"),
                source: BuildSource::Pipeline,
                buildspec: ASSETS_BUILDSPEC.to_string(),
                environment: vec![
                    ("AWS_ACCOUNT_ID".to_string(), Pseudo::AccountId.into()),
                    (
                        "IMAGE_DIRECTORY".to_string(),
                        image.directory.display().to_string().into(),
                    ),
                    ("REPOSITORY_NAME".to_string(), image.repository_name.clone().into()),
                    ("IMAGE_TAG".to_string(), image.tag.clone().into()),
                ],
                privileged: true,
            },
        )?;

        let deploy_role = scope.declare(
            "DeployRole",
            Role::for_service("cloudformation")
                .with_managed_policy("arn:aws:iam::aws:policy/AdministratorAccess"),
        )?;
        let pipeline_role = scope.declare(
            "PipelineRole",
            Role::for_service("codepipeline")
                .allow(
                    ["s3:GetObject", "s3:PutObject", "s3:GetBucketVersioning"],
                    bucket_objects,
                )
                .allow(
                    [
                        "codecommit:GetBranch",
                        "codecommit:GetCommit",
                        "codecommit:UploadArchive",
                        "codecommit:GetUploadArchiveStatus",
                    ],
                    vec![self.repository_arn.clone().into()],
                )
                .allow(
                    ["codebuild:StartBuild", "codebuild:BatchGetBuilds"],
                    vec![synth.attr("Arn"), assets.attr("Arn")],
                )
                .allow(
                    [
                        "cloudformation:CreateStack",
                        "cloudformation:DescribeStacks",
                        "cloudformation:UpdateStack",
                        "iam:PassRole",
                    ],
                    vec![any],
                ),
        )?;

        let template = |stack: &str| format!("{}.template.json", stack);
        let stages = vec![
            Stage::new(
                "Source",
                vec![Action::codecommit_source("Source", &repository, &self.branch, "Source")],
            ),
            Stage::new(
                "Synth",
                vec![Action::codebuild("Synth", synth.reference(), "Source", Some("Synth"))],
            ),
            Stage::new(
                "UpdatePipeline",
                vec![Action::cloudformation_deploy(
                    "SelfMutate",
                    &self.pipeline_stack,
                    &template(&self.pipeline_stack),
                    deploy_role.attr("Arn"),
                    "Synth",
                )],
            ),
            Stage::new(
                "Assets",
                vec![Action::codebuild("DockerAsset", assets.reference(), "Source", None)],
            ),
            Stage::new(
                "DeploymentStage",
                vec![Action::cloudformation_deploy(
                    "Deploy",
                    &self.application_stack,
                    &template(&self.application_stack),
                    deploy_role.attr("Arn"),
                    "Synth",
                )],
            ),
        ];
        let name = format!("{}-{}-pipeline", self.environment, self.project);
        let definition = Pipeline {
            name: name.clone(),
            role: pipeline_role.attr("Arn"),
            artifact_bucket: bucket.reference(),
            stages,
            restart_on_update: true,
        };
        let stage_names = definition.stage_names().into_iter().map(String::from).collect();
        let pipeline = scope.declare("Pipeline", definition)?;

        trigger(
            &mut scope,
            &pipeline,
            format!("Synthesize on push to {}", self.branch),
            Properties::new()
                .set("source", Value::list(["aws.codecommit"]))
                .set("detail-type", Value::list(["CodeCommit Repository State Change"]))
                .set("resources", Value::list([self.repository_arn.as_str()]))
                .set(
                    "detail",
                    Properties::new()
                        .set("event", Value::list(["referenceCreated", "referenceUpdated"]))
                        .set("referenceName", Value::list([self.branch.as_str()])),
                ),
        )?;

        scope.output("PipelineName", pipeline.reference(), None)?;

        Ok(PipelineReference {
            pipeline,
            name,
            stages: stage_names,
            artifact_bucket: bucket,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> DockerImageAsset {
        DockerImageAsset::staged("dev-exprj-image", "docker", "364050767034", "eu-central-1")
    }

    #[test]
    fn test_repository_name_from_arn() {
        assert_eq!(
            repository_name_from_arn("arn:aws:codecommit:eu-central-1:364050767034:wordpress-ecs").unwrap(),
            "wordpress-ecs"
        );
        assert!(repository_name_from_arn("wordpress-ecs").is_err());
        assert!(repository_name_from_arn("arn:aws:codecommit:eu-central-1:1:").is_err());
    }

    #[test]
    fn test_infrastructure_pipeline_stages() {
        let mut graph = ResourceGraph::new("pipeline");
        let builder = InfrastructurePipelineBuilder::new(
            "dev",
            "exprj",
            "arn:aws:codecommit:eu-central-1:364050767034:wordpress-ecs",
            "develop",
        )
        .image(image());
        assert_eq!(builder.pipeline_stack(), "dev-exprj-infrastructure-pipeline");
        assert_eq!(builder.application_stack(), "dev-exprj-stack");

        let reference = builder.build(&mut graph).unwrap();
        assert_eq!(reference.name, "dev-exprj-pipeline");
        assert_eq!(
            reference.stages,
            vec!["Source", "Synth", "UpdatePipeline", "Assets", "DeploymentStage"]
        );

        let template = graph.into_template();
        let pipeline = template.resource("InfrastructurePipeline").unwrap();
        assert_eq!(pipeline.property("RestartExecutionOnUpdate"), Some(&Value::Bool(true)));

        // The asset stage pushes into a repository that exists before the first run.
        assert_eq!(template.count_of_type("AWS::ECR::Repository"), 0);
        let assets = template.resource("InfrastructureAssetsProject").unwrap();
        let variables = assets
            .property("Environment")
            .and_then(|e| e.get("EnvironmentVariables"))
            .and_then(Value::as_list)
            .unwrap();
        let repository = variables
            .iter()
            .find(|v| v.get("Name").and_then(Value::as_str) == Some("REPOSITORY_NAME"))
            .and_then(|v| v.get("Value"))
            .and_then(Value::as_str);
        assert_eq!(
            repository,
            Some("cdk-hnb659fds-container-assets-364050767034-eu-central-1")
        );
        assert_eq!(template.count_of_type("AWS::Events::Rule"), 1);
    }

    #[test]
    fn test_infrastructure_pipeline_needs_image() {
        let mut graph = ResourceGraph::new("pipeline");
        let err = InfrastructurePipelineBuilder::new(
            "dev",
            "exprj",
            "arn:aws:codecommit:eu-central-1:364050767034:wordpress-ecs",
            "develop",
        )
        .build(&mut graph)
        .unwrap_err();
        assert!(matches!(err, StackError::MissingDependency(_)));
    }
}
