//! Build, release and event resources.

use wp_graph::{Declare, Properties, Pseudo, Value};

/// File the image-definition step writes for the deploy step.
pub const IMAGE_DEFINITIONS_FILE: &str = "imagedefinitions.json";
/// Minutes the rolling deployment may take before the pipeline fails it.
pub const DEPLOY_TIMEOUT_MINUTES: u32 = 5;
pub const BUILD_IMAGE: &str = "aws/codebuild/standard:5.0";

/// Where a build project gets its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildSource {
    /// Artifacts handed over by a pipeline action.
    #[default]
    Pipeline,
    /// Started through the API with only the buildspec and variables.
    Standalone,
}

impl BuildSource {
    fn as_str(&self) -> &'static str {
        match self {
            BuildSource::Pipeline => "CODEPIPELINE",
            BuildSource::Standalone => "NO_SOURCE",
        }
    }

    fn artifacts(&self) -> &'static str {
        match self {
            BuildSource::Pipeline => "CODEPIPELINE",
            BuildSource::Standalone => "NO_ARTIFACTS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildProject {
    pub name: String,
    pub role: Value,
    pub source: BuildSource,
    pub buildspec: String,
    pub environment: Vec<(String, Value)>,
    /// Whether the build may run a container daemon.
    pub privileged: bool,
}

impl Declare for BuildProject {
    fn resource_type(&self) -> &'static str {
        "AWS::CodeBuild::Project"
    }

    fn properties(&self) -> Properties {
        let variables = self.environment.iter().map(|(name, value)| {
            Properties::new()
                .set("Name", name)
                .set("Type", "PLAINTEXT")
                .set("Value", value.clone())
        });

        Properties::new()
            .set("Name", &self.name)
            .set("ServiceRole", self.role.clone())
            .set(
                "Source",
                Properties::new()
                    .set("Type", self.source.as_str())
                    .set("BuildSpec", &self.buildspec),
            )
            .set("Artifacts", Properties::new().set("Type", self.source.artifacts()))
            .set(
                "Environment",
                Properties::new()
                    .set("Type", "LINUX_CONTAINER")
                    .set("ComputeType", "BUILD_GENERAL1_SMALL")
                    .set("Image", BUILD_IMAGE)
                    .set("PrivilegedMode", self.privileged)
                    .set("EnvironmentVariables", Value::list(variables)),
            )
    }
}

/// One step of a pipeline stage.
#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    pub category: &'static str,
    pub provider: &'static str,
    pub configuration: Properties,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl Action {
    fn new(name: &str, category: &'static str, provider: &'static str, configuration: Properties) -> Self {
        Self {
            name: name.to_string(),
            category,
            provider,
            configuration,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn input(mut self, artifact: &str) -> Self {
        self.inputs.push(artifact.to_string());
        self
    }

    fn output(mut self, artifact: &str) -> Self {
        self.outputs.push(artifact.to_string());
        self
    }

    /// Fetch the latest image reference pushed under `tag`.
    pub fn ecr_source(name: &str, repository: Value, tag: &str, output: &str) -> Self {
        let config = Properties::new()
            .set("RepositoryName", repository)
            .set("ImageTag", tag);
        Self::new(name, "Source", "ECR", config).output(output)
    }

    /// Fetch `branch` of a source repository; changes arrive as events, not polling.
    pub fn codecommit_source(name: &str, repository: &str, branch: &str, output: &str) -> Self {
        let config = Properties::new()
            .set("RepositoryName", repository)
            .set("BranchName", branch)
            .set("PollForSourceChanges", false);
        Self::new(name, "Source", "CodeCommit", config).output(output)
    }

    pub fn codebuild(name: &str, project: Value, input: &str, output: Option<&str>) -> Self {
        let config = Properties::new().set("ProjectName", project);
        let action = Self::new(name, "Build", "CodeBuild", config).input(input);
        match output {
            Some(output) => action.output(output),
            None => action,
        }
    }

    /// Rolling deployment of an image-definitions file to a service.
    pub fn ecs_deploy(name: &str, cluster: Value, service: Value, input: &str) -> Self {
        let config = Properties::new()
            .set("ClusterName", cluster)
            .set("ServiceName", service)
            .set("FileName", IMAGE_DEFINITIONS_FILE)
            .set("DeploymentTimeout", DEPLOY_TIMEOUT_MINUTES.to_string());
        Self::new(name, "Deploy", "ECS", config).input(input)
    }

    /// Create or update a stack from a template inside `input`.
    pub fn cloudformation_deploy(name: &str, stack_name: &str, template: &str, role: Value, input: &str) -> Self {
        let config = Properties::new()
            .set("ActionMode", "CREATE_UPDATE")
            .set("StackName", stack_name)
            .set("TemplatePath", format!("{}::{}", input, template))
            .set("RoleArn", role)
            .set("Capabilities", "CAPABILITY_NAMED_IAM,CAPABILITY_AUTO_EXPAND");
        Self::new(name, "Deploy", "CloudFormation", config).input(input)
    }

    fn render(&self) -> Properties {
        let artifacts = |names: &[String]| Value::list(names.iter().map(|n| Properties::new().set("Name", n)));

        Properties::new()
            .set("Name", &self.name)
            .set(
                "ActionTypeId",
                Properties::new()
                    .set("Category", self.category)
                    .set("Owner", "AWS")
                    .set("Provider", self.provider)
                    .set("Version", "1"),
            )
            .set("Configuration", self.configuration.clone())
            .set("InputArtifacts", artifacts(&self.inputs))
            .set("OutputArtifacts", artifacts(&self.outputs))
            .set("RunOrder", 1u32)
    }
}

#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub actions: Vec<Action>,
}

impl Stage {
    pub fn new(name: &str, actions: Vec<Action>) -> Self {
        Self {
            name: name.to_string(),
            actions,
        }
    }
}

/// A linear release pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,
    pub role: Value,
    pub artifact_bucket: Value,
    pub stages: Vec<Stage>,
    pub restart_on_update: bool,
}

impl Pipeline {
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }
}

impl Declare for Pipeline {
    fn resource_type(&self) -> &'static str {
        "AWS::CodePipeline::Pipeline"
    }

    fn properties(&self) -> Properties {
        let stages = self.stages.iter().map(|stage| {
            Properties::new()
                .set("Name", &stage.name)
                .set("Actions", Value::list(stage.actions.iter().map(Action::render)))
        });

        Properties::new()
            .set("Name", &self.name)
            .set("RoleArn", self.role.clone())
            .set(
                "ArtifactStore",
                Properties::new()
                    .set("Type", "S3")
                    .set("Location", self.artifact_bucket.clone()),
            )
            .set("RestartExecutionOnUpdate", self.restart_on_update)
            .set("Stages", Value::list(stages))
    }
}

/// `arn:<partition>:codepipeline:<region>:<account>:<name>`
pub fn pipeline_arn(pipeline: Value) -> Value {
    Value::join(
        "",
        vec![
            "arn:".into(),
            Pseudo::Partition.into(),
            ":codepipeline:".into(),
            Pseudo::Region.into(),
            ":".into(),
            Pseudo::AccountId.into(),
            ":".into(),
            pipeline,
        ],
    )
}

/// Starts a pipeline when a matching event arrives.
#[derive(Debug, Clone)]
pub struct EventRule {
    pub description: String,
    pub pattern: Properties,
    pub target: Value,
    pub role: Value,
}

impl Declare for EventRule {
    fn resource_type(&self) -> &'static str {
        "AWS::Events::Rule"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("Description", &self.description)
            .set("EventPattern", self.pattern.clone())
            .set("State", "ENABLED")
            .set(
                "Targets",
                Value::list([Properties::new()
                    .set("Id", "Target0")
                    .set("Arn", self.target.clone())
                    .set("RoleArn", self.role.clone())]),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ecs_deploy_timeout() {
        let action = Action::ecs_deploy("Deploy", "cluster".into(), "service".into(), "ImageDefinition");
        let rendered = serde_json::to_value(action.render()).unwrap();
        assert_eq!(rendered["Configuration"]["DeploymentTimeout"], json!("5"));
        assert_eq!(rendered["Configuration"]["FileName"], json!(IMAGE_DEFINITIONS_FILE));
        assert_eq!(rendered["InputArtifacts"], json!([{"Name": "ImageDefinition"}]));
        assert_eq!(rendered["ActionTypeId"]["Provider"], json!("ECS"));
    }

    #[test]
    fn test_standalone_project_has_no_pipeline_io() {
        let project = BuildProject {
            name: "copy".to_string(),
            role: Value::Null,
            source: BuildSource::Standalone,
            buildspec: "version: 0.2".to_string(),
            environment: Vec::new(),
            privileged: true,
        };
        let rendered = serde_json::to_value(project.properties()).unwrap();
        assert_eq!(rendered["Source"]["Type"], json!("NO_SOURCE"));
        assert_eq!(rendered["Artifacts"]["Type"], json!("NO_ARTIFACTS"));
        assert_eq!(rendered["Environment"]["PrivilegedMode"], json!(true));
    }

    #[test]
    fn test_stage_order_is_kept() {
        let pipeline = Pipeline {
            name: "p".to_string(),
            role: Value::Null,
            artifact_bucket: Value::Null,
            stages: vec![
                Stage::new("Source", Vec::new()),
                Stage::new("Build", Vec::new()),
                Stage::new("Deploy", Vec::new()),
            ],
            restart_on_update: false,
        };
        assert_eq!(pipeline.stage_names(), vec!["Source", "Build", "Deploy"]);
        let rendered = serde_json::to_value(pipeline.properties()).unwrap();
        assert_eq!(rendered["Stages"][2]["Name"], json!("Deploy"));
    }

    #[test]
    fn test_cloudformation_template_path() {
        let action = Action::cloudformation_deploy("Deploy", "dev-exprj-stack", "stack.template.json", Value::Null, "Synth");
        assert_eq!(
            action.configuration.get("TemplatePath").and_then(Value::as_str),
            Some("Synth::stack.template.json")
        );
    }
}
