//! Application tier: load balancer, shared file system, image registry
//! and the container service running WordPress.

use tracing::{debug, info};
use wp_config::EcsConfig;
use wp_graph::{DeclareOptions, DeletionPolicy, Handle, ResourceGraph, Value};

use crate::assembly::DockerImageAsset;
use crate::database::DatabaseReference;
use crate::error::{StackError, StackResult};
use crate::network::NetworkGraph;
use crate::resources::compute::{
    Cluster, ContainerDefinition, CpuScalingPolicy, Function, Listener, LoadBalancer, ScalableTarget,
    Service, TargetGroup, TaskDefinition, FUNCTION_MAX_TIMEOUT_SECONDS, LISTENER_PORT,
    SCALE_COOLDOWN_SECONDS, TARGET_CPU_UTILIZATION,
};
use crate::resources::delivery::{BuildProject, BuildSource};
use crate::resources::network::{IngressRule, SecurityGroup, SecurityGroupIngress, ANY_IPV4};
use crate::resources::security::{KmsAlias, KmsKey, Role};
use crate::resources::storage::{
    AccessLogBucketPolicy, Bucket, BucketAutoDelete, FileSystem, ImageCopy, LogGroup, MountTarget,
    Repository, LOG_RETENTION_DAYS,
};

pub const CONTAINER_NAME: &str = "wordpress";
pub const CONTENT_MOUNT_PATH: &str = "/var/www/html/wp-content";
pub const CONTENT_VOLUME: &str = "wp-content";
pub const NFS_PORT: u16 = 2049;
pub const IMAGE_TAG: &str = "latest";

const TASK_EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy";
const FUNCTION_EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";
const AUTO_DELETE_TIMEOUT_SECONDS: u32 = 300;

const AUTO_DELETE_HANDLER: &str = r#"import boto3
import cfnresponse


def handler(event, context):
    try:
        if event["RequestType"] == "Delete":
            bucket = boto3.resource("s3").Bucket(event["ResourceProperties"]["BucketName"])
            bucket.object_versions.delete()
        cfnresponse.send(event, context, cfnresponse.SUCCESS, {})
    except Exception as error:
        cfnresponse.send(event, context, cfnresponse.FAILED, {"Error": str(error)})
"#;

const IMAGE_COPY_HANDLER: &str = r#"import time

import boto3
import cfnresponse


def handler(event, context):
    try:
        if event["RequestType"] != "Delete":
            props = event["ResourceProperties"]
            codebuild = boto3.client("codebuild")
            build = codebuild.start_build(
                projectName=props["ProjectName"],
                environmentVariablesOverride=[
                    {"name": "SOURCE_IMAGE", "value": props["SourceImage"], "type": "PLAINTEXT"},
                    {"name": "DESTINATION_IMAGE", "value": props["DestinationImage"], "type": "PLAINTEXT"},
                ],
            )["build"]
            while build["buildStatus"] == "IN_PROGRESS":
                time.sleep(15)
                build = codebuild.batch_get_builds(ids=[build["id"]])["builds"][0]
            if build["buildStatus"] != "SUCCEEDED":
                raise RuntimeError("build %s ended %s" % (build["id"], build["buildStatus"]))
        cfnresponse.send(event, context, cfnresponse.SUCCESS, {})
    except Exception as error:
        cfnresponse.send(event, context, cfnresponse.FAILED, {"Error": str(error)})
"#;

const IMAGE_COPY_BUILDSPEC: &str = r#"version: 0.2
phases:
  pre_build:
    commands:
      - aws ecr get-login-password | docker login --username AWS --password-stdin "${DESTINATION_IMAGE%%/*}"
  build:
    commands:
      - docker pull "$SOURCE_IMAGE"
      - docker tag "$SOURCE_IMAGE" "$DESTINATION_IMAGE"
      - docker push "$DESTINATION_IMAGE"
"#;

/// What later builders need from the application tier.
#[derive(Debug, Clone)]
pub struct ComputeReference {
    pub load_balancer: Handle<LoadBalancer>,
    pub security_group: Handle<SecurityGroup>,
    pub database_ingress: Handle<SecurityGroupIngress>,
    pub file_system: Handle<FileSystem>,
    pub repository: Handle<Repository>,
    pub repository_name: String,
    /// Fills the repository from the staged image; the service waits for it.
    pub image_copy: Handle<ImageCopy>,
    pub cluster: Handle<Cluster>,
    pub task_definition: Handle<TaskDefinition>,
    pub target_group: Handle<TargetGroup>,
    pub listener: Handle<Listener>,
    pub service: Handle<Service>,
    pub service_name: String,
    pub container_name: String,
    /// Image built from the local context and staged before deployment.
    pub image: DockerImageAsset,
}

impl ComputeReference {
    pub fn load_balancer_dns(&self) -> Value {
        self.load_balancer.attr("DNSName")
    }
}

/// Builds the WordPress service.
pub struct ApplicationBuilder {
    prefix: String,
    ecs: EcsConfig,
    image: DockerImageAsset,
    production: bool,
}

impl ApplicationBuilder {
    pub fn new(prefix: impl Into<String>, ecs: EcsConfig, image: DockerImageAsset) -> Self {
        Self {
            prefix: prefix.into(),
            ecs,
            image,
            production: false,
        }
    }

    /// Keep stateful storage when the stack is deleted.
    pub fn production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    fn check(&self) -> StackResult<()> {
        if self.ecs.min == 0 {
            return Err(StackError::invalid("ecs.min", "at least one task must run"));
        }
        if self.ecs.min > self.ecs.max {
            return Err(StackError::invalid(
                "ecs.min",
                format!("{} exceeds max {}", self.ecs.min, self.ecs.max),
            ));
        }
        if self.ecs.port == 0 {
            return Err(StackError::invalid("ecs.port", "must not be 0"));
        }
        Ok(())
    }

    /// Declare the application tier.
    ///
    /// Opens the database security group to the service security group
    /// on the database port.
    pub fn build(
        self,
        graph: &mut ResourceGraph,
        network: &NetworkGraph,
        database: &DatabaseReference,
    ) -> StackResult<ComputeReference> {
        self.check()?;
        network.public.require("load balancer")?;
        network.private.require("container service")?;
        info!(
            "Building application {} ({} cpu, {} MiB, {}..{} tasks)",
            self.ecs.service_name, self.ecs.cpu, self.ecs.memory, self.ecs.min, self.ecs.max
        );

        let retention = if self.production {
            DeletionPolicy::Retain
        } else {
            DeletionPolicy::Delete
        };
        let mut scope = graph.scope("Application");

        // (a) access logs
        let log_bucket = scope.declare_with(
            "AccessLogBucket",
            Bucket {
                bucket_name: Some(format!("{}-access-log", self.prefix)),
                kms_key: None,
            },
            DeclareOptions::new().deletion_policy(retention),
        )?;
        let log_bucket_policy = scope.declare(
            "AccessLogBucketPolicy",
            AccessLogBucketPolicy {
                bucket: log_bucket.reference(),
                bucket_arn: log_bucket.attr("Arn"),
            },
        )?;
        let mut load_balancer_options = DeclareOptions::new().depends_on(&log_bucket_policy);
        if !self.production {
            let objects = vec![
                log_bucket.attr("Arn"),
                Value::join("", vec![log_bucket.attr("Arn"), "/*".into()]),
            ];
            let role = scope.declare(
                "AccessLogAutoDeleteRole",
                Role::for_service("lambda")
                    .with_managed_policy(FUNCTION_EXECUTION_POLICY)
                    .allow(
                        [
                            "s3:ListBucket",
                            "s3:ListBucketVersions",
                            "s3:DeleteObject",
                            "s3:DeleteObjectVersion",
                        ],
                        objects,
                    ),
            )?;
            let function = scope.declare(
                "AccessLogAutoDeleteFunction",
                Function {
                    description: format!("Empties {}-access-log before it is deleted", self.prefix),
                    role: role.attr("Arn"),
                    source: AUTO_DELETE_HANDLER.to_string(),
                    timeout_seconds: AUTO_DELETE_TIMEOUT_SECONDS,
                },
            )?;
            let auto_delete = scope.declare(
                "AccessLogAutoDelete",
                BucketAutoDelete {
                    service_token: function.attr("Arn"),
                    bucket: log_bucket.reference(),
                },
            )?;
            // Deleted after the load balancer stops writing logs.
            load_balancer_options = load_balancer_options.depends_on(&auto_delete);
            debug!("Access log bucket is emptied on delete");
        }

        // (b, c) load balancer
        let lb_security_group = scope.declare(
            "LoadBalancerSecurityGroup",
            SecurityGroup {
                vpc: network.vpc_id(),
                group_name: format!("{}-alb-sg", self.prefix),
                description: format!("{} load balancer", self.prefix),
                ingress: vec![IngressRule::from_cidr(ANY_IPV4, LISTENER_PORT, "HTTP from anywhere")],
            },
        )?;
        let load_balancer = scope.declare_with(
            "LoadBalancer",
            LoadBalancer {
                subnets: network.public.ids(),
                security_group: lb_security_group.attr("GroupId"),
                access_log_bucket: log_bucket.reference(),
            },
            load_balancer_options,
        )?;

        // (d) service security group, then open the database to it
        let security_group = scope.declare(
            "ServiceSecurityGroup",
            SecurityGroup {
                vpc: network.vpc_id(),
                group_name: format!("{}-ecs-sg", self.prefix),
                description: format!("{} container service", self.prefix),
                ingress: vec![IngressRule::from_group(
                    lb_security_group.attr("GroupId"),
                    self.ecs.port,
                    "Traffic from the load balancer",
                )],
            },
        )?;
        let database_ingress = scope.declare(
            "DatabaseIngress",
            SecurityGroupIngress {
                group: database.security_group_id(),
                rule: IngressRule::from_group(
                    security_group.attr("GroupId"),
                    database.port,
                    "Database access from the container service",
                ),
            },
        )?;

        // (e) shared file system
        let efs_key = scope.declare(
            "FileSystemKey",
            KmsKey {
                description: format!("{} file system encryption key", self.prefix),
            },
        )?;
        scope.declare(
            "FileSystemKeyAlias",
            KmsAlias::new(&format!("{}/efs", self.prefix), efs_key.reference()),
        )?;
        let efs_security_group = scope.declare(
            "FileSystemSecurityGroup",
            SecurityGroup {
                vpc: network.vpc_id(),
                group_name: format!("{}-efs-sg", self.prefix),
                description: format!("{} file system", self.prefix),
                ingress: vec![IngressRule::from_group(
                    security_group.attr("GroupId"),
                    NFS_PORT,
                    "NFS from the container service",
                )],
            },
        )?;
        let file_system = scope.declare_with(
            "FileSystem",
            FileSystem {
                kms_key: efs_key.attr("Arn"),
                name: format!("{}-efs", self.prefix),
            },
            DeclareOptions::new().deletion_policy(retention),
        )?;
        let mut mount_targets = Vec::with_capacity(network.private.len());
        for subnet in &network.private.subnets {
            mount_targets.push(scope.declare(
                &format!("MountTarget{}", subnet.availability_zone + 1),
                MountTarget {
                    file_system: file_system.reference(),
                    subnet: subnet.handle.reference(),
                    security_group: efs_security_group.attr("GroupId"),
                },
            )?);
        }

        // (f) image registry
        let ecr_key = scope.declare(
            "RepositoryKey",
            KmsKey {
                description: format!("{} image registry encryption key", self.prefix),
            },
        )?;
        scope.declare(
            "RepositoryKeyAlias",
            KmsAlias::new(&format!("{}/ecr", self.prefix), ecr_key.reference()),
        )?;
        let repository_name = format!("{}-{}", self.prefix, self.ecs.service_name);
        let repository = scope.declare_with(
            "Repository",
            Repository {
                name: repository_name.clone(),
                kms_key: ecr_key.attr("Arn"),
                empty_on_delete: !self.production,
            },
            DeclareOptions::new().deletion_policy(retention),
        )?;
        let image = Value::join(
            ":",
            vec![repository.attr("RepositoryUri"), IMAGE_TAG.into()],
        );

        // The staged image is copied in before anything pulls from the repository.
        let copy_project_role = scope.declare(
            "ImageCopyProjectRole",
            Role::for_service("codebuild")
                .allow(
                    [
                        "logs:CreateLogGroup",
                        "logs:CreateLogStream",
                        "logs:PutLogEvents",
                        "ecr:GetAuthorizationToken",
                        "ecr:BatchCheckLayerAvailability",
                        "ecr:BatchGetImage",
                        "ecr:GetDownloadUrlForLayer",
                    ],
                    vec!["*".into()],
                )
                .allow(
                    [
                        "ecr:InitiateLayerUpload",
                        "ecr:UploadLayerPart",
                        "ecr:CompleteLayerUpload",
                        "ecr:PutImage",
                    ],
                    vec![repository.attr("Arn")],
                )
                .allow(["kms:Decrypt", "kms:GenerateDataKey"], vec![ecr_key.attr("Arn")]),
        )?;
        let copy_project = scope.declare(
            "ImageCopyProject",
            BuildProject {
                name: format!("{}-image-copy", self.prefix),
                role: copy_project_role.attr("Arn"),
                source: BuildSource::Standalone,
                buildspec: IMAGE_COPY_BUILDSPEC.to_string(),
                environment: Vec::new(),
                privileged: true,
            },
        )?;
        let copy_function_role = scope.declare(
            "ImageCopyFunctionRole",
            Role::for_service("lambda")
                .with_managed_policy(FUNCTION_EXECUTION_POLICY)
                .allow(
                    ["codebuild:StartBuild", "codebuild:BatchGetBuilds"],
                    vec![copy_project.attr("Arn")],
                ),
        )?;
        let copy_function = scope.declare(
            "ImageCopyFunction",
            Function {
                description: format!("Copies the staged image into {}", repository_name),
                role: copy_function_role.attr("Arn"),
                source: IMAGE_COPY_HANDLER.to_string(),
                timeout_seconds: FUNCTION_MAX_TIMEOUT_SECONDS,
            },
        )?;
        let image_copy = scope.declare(
            "ImageCopy",
            ImageCopy {
                service_token: copy_function.attr("Arn"),
                project: copy_project.reference(),
                source_image: self.image.image_uri(),
                destination_image: image.clone(),
            },
        )?;

        // (g) cluster, task definition
        let secret_arn = database.secret.reference();
        let execution_role = scope.declare(
            "TaskExecutionRole",
            Role::for_service("ecs-tasks")
                .with_managed_policy(TASK_EXECUTION_POLICY)
                .allow(
                    ["secretsmanager:GetSecretValue", "secretsmanager:DescribeSecret"],
                    vec![secret_arn.clone()],
                )
                .allow(["kms:Decrypt"], vec![database.kms_key.attr("Arn"), ecr_key.attr("Arn")]),
        )?;
        let task_role = scope.declare(
            "TaskRole",
            Role::for_service("ecs-tasks").allow(
                [
                    "elasticfilesystem:ClientMount",
                    "elasticfilesystem:ClientWrite",
                    "elasticfilesystem:ClientRootAccess",
                ],
                vec![file_system.attr("Arn")],
            ),
        )?;
        let log_group_name = format!("{}-{}", self.prefix, self.ecs.service_name);
        let log_group = scope.declare_with(
            "LogGroup",
            LogGroup {
                name: log_group_name,
                retention_days: LOG_RETENTION_DAYS,
            },
            DeclareOptions::new().retain(),
        )?;
        let cluster = scope.declare(
            "Cluster",
            Cluster {
                name: format!("{}-cluster", self.prefix),
            },
        )?;

        let secret_field = |field: &str| {
            Value::join("", vec![secret_arn.clone(), format!(":{}::", field).into()])
        };
        let mut task_options = DeclareOptions::new();
        for target in &mount_targets {
            task_options = task_options.depends_on(target);
        }
        let task_definition = scope.declare_with(
            "TaskDefinition",
            TaskDefinition {
                family: format!("{}-{}", self.prefix, self.ecs.service_name),
                cpu: self.ecs.cpu,
                memory: self.ecs.memory,
                execution_role: execution_role.attr("Arn"),
                task_role: task_role.attr("Arn"),
                volume_name: CONTENT_VOLUME.to_string(),
                file_system: file_system.reference(),
                container: ContainerDefinition {
                    name: CONTAINER_NAME.to_string(),
                    image,
                    port: self.ecs.port,
                    environment: vec![(
                        "WORDPRESS_DB_HOST".to_string(),
                        database.hostname.clone().into(),
                    )],
                    secrets: vec![
                        ("WORDPRESS_DB_PASSWORD".to_string(), secret_field("password")),
                        ("WORDPRESS_DB_USER".to_string(), secret_field("username")),
                        ("WORDPRESS_DB_NAME".to_string(), secret_field("dbname")),
                    ],
                    mount_path: CONTENT_MOUNT_PATH.to_string(),
                    log_group: log_group.reference(),
                    log_prefix: self.ecs.service_name.clone(),
                },
            },
            task_options,
        )?;

        // (h, i) target group and listener come before the service that registers with them
        let target_group = scope.declare(
            "TargetGroup",
            TargetGroup {
                vpc: network.vpc_id(),
                port: self.ecs.port,
            },
        )?;
        let listener = scope.declare(
            "Listener",
            Listener {
                load_balancer: load_balancer.reference(),
                target_group: target_group.reference(),
                port: LISTENER_PORT,
            },
        )?;

        let service_name = format!("{}-{}", self.prefix, self.ecs.service_name);
        let service = scope.declare_with(
            "Service",
            Service {
                name: service_name.clone(),
                cluster: cluster.reference(),
                task_definition: task_definition.reference(),
                desired_count: self.ecs.min,
                subnets: network.private.ids(),
                security_group: security_group.attr("GroupId"),
                target_group: target_group.reference(),
                container_name: CONTAINER_NAME.to_string(),
                container_port: self.ecs.port,
            },
            DeclareOptions::new()
                .depends_on(&listener)
                .depends_on(&database_ingress)
                .depends_on(&image_copy),
        )?;

        // (j) scaling
        let scalable_target = scope.declare(
            "ScalableTarget",
            ScalableTarget {
                cluster: cluster.reference(),
                service_name: service.attr("Name"),
                min_capacity: self.ecs.min,
                max_capacity: self.ecs.max,
            },
        )?;
        scope.declare(
            "CpuScaling",
            CpuScalingPolicy {
                name: format!("{}-cpu-scaling", self.prefix),
                scalable_target: scalable_target.reference(),
                target_utilization: TARGET_CPU_UTILIZATION,
                cooldown_seconds: SCALE_COOLDOWN_SECONDS,
            },
        )?;

        scope.output(
            "LoadBalancerDns",
            load_balancer.attr("DNSName"),
            Some(format!("{}-alb-dns", self.prefix)),
        )?;
        scope.output("RepositoryUri", repository.attr("RepositoryUri"), None)?;

        Ok(ComputeReference {
            load_balancer,
            security_group,
            database_ingress,
            file_system,
            repository,
            repository_name,
            image_copy,
            cluster,
            task_definition,
            target_group,
            listener,
            service,
            service_name,
            container_name: CONTAINER_NAME.to_string(),
            image: self.image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseBuilder, DatabaseShape, PrivateZone};
    use crate::network::NetworkBuilder;
    use wp_config::CapacityUnit;

    fn ecs(min: u32, max: u32) -> EcsConfig {
        EcsConfig {
            service_name: "wordpress".to_string(),
            cpu: 512,
            memory: 1024,
            min,
            max,
            port: 80,
        }
    }

    fn image() -> DockerImageAsset {
        DockerImageAsset::staged("dev-exprj-image", "docker", "364050767034", "eu-central-1")
    }

    fn upstream(graph: &mut ResourceGraph) -> (NetworkGraph, DatabaseReference) {
        let network = NetworkBuilder::new("dev-exprj", "10.230.0.0/16", 24, 1)
            .build(graph)
            .unwrap();
        let zone = PrivateZone::declare(graph, &network, "dev.wp.internal").unwrap();
        let shape = DatabaseShape::Serverless {
            min_capacity: CapacityUnit::Acu1,
            max_capacity: CapacityUnit::Acu2,
            auto_pause_minutes: 10,
        };
        let database = DatabaseBuilder::new("dev-exprj", shape)
            .build(graph, &network, &network.isolated, &zone)
            .unwrap();
        (network, database)
    }

    #[test]
    fn test_database_ingress_uses_service_group() {
        let mut graph = ResourceGraph::new("app");
        let (network, database) = upstream(&mut graph);
        let compute = ApplicationBuilder::new("dev-exprj", ecs(1, 2), image())
            .build(&mut graph, &network, &database)
            .unwrap();

        let ingress = graph.node(compute.database_ingress.identifier()).unwrap();
        assert_eq!(ingress.property("GroupId"), Some(&database.security_group_id()));
        assert_eq!(
            ingress.property("SourceSecurityGroupId"),
            Some(&compute.security_group.attr("GroupId"))
        );
        assert!(ingress.property("CidrIp").is_none());
        assert_eq!(ingress.property("FromPort").and_then(Value::as_int), Some(3306));
    }

    #[test]
    fn test_service_follows_target_group_and_listener() {
        let mut graph = ResourceGraph::new("app");
        let (network, database) = upstream(&mut graph);
        let compute = ApplicationBuilder::new("dev-exprj", ecs(1, 2), image())
            .build(&mut graph, &network, &database)
            .unwrap();

        let position = |id: &wp_graph::LogicalId| graph.nodes().iter().position(|n| &n.id == id).unwrap();
        let service = position(compute.service.identifier());
        assert!(position(compute.target_group.identifier()) < service);
        assert!(position(compute.listener.identifier()) < service);
        assert!(position(compute.database_ingress.identifier()) < service);
    }

    #[test]
    fn test_one_container_one_load_balancer() {
        let mut graph = ResourceGraph::new("app");
        let (network, database) = upstream(&mut graph);
        let compute = ApplicationBuilder::new("dev-exprj", ecs(1, 3), image())
            .build(&mut graph, &network, &database)
            .unwrap();
        assert_eq!(compute.image.directory, std::path::PathBuf::from("docker"));
        assert_eq!(compute.repository_name, "dev-exprj-wordpress");

        let template = graph.into_template();
        assert_eq!(template.count_of_type("AWS::ElasticLoadBalancingV2::LoadBalancer"), 1);
        assert_eq!(template.count_of_type("AWS::EFS::MountTarget"), 3);
        let task = template.resource("ApplicationTaskDefinition").unwrap();
        let containers = task.property("ContainerDefinitions").and_then(Value::as_list).unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(
            containers[0].get("Environment").and_then(Value::as_list).unwrap()[0].get("Value"),
            Some(&Value::from("db.dev.wp.internal"))
        );
    }

    #[test]
    fn test_rejects_inverted_task_bounds() {
        let mut graph = ResourceGraph::new("app");
        let (network, database) = upstream(&mut graph);
        let before = graph.len();
        let err = ApplicationBuilder::new("dev-exprj", ecs(3, 1), image())
            .build(&mut graph, &network, &database)
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(graph.len(), before);
    }

    #[test]
    fn test_service_waits_for_image_copy() {
        let mut graph = ResourceGraph::new("app");
        let (network, database) = upstream(&mut graph);
        let compute = ApplicationBuilder::new("dev-exprj", ecs(1, 2), image())
            .build(&mut graph, &network, &database)
            .unwrap();

        let copy = graph.node(compute.image_copy.identifier()).unwrap();
        assert_eq!(copy.property("SourceImage"), Some(&compute.image.image_uri()));
        let destination = Value::join(
            ":",
            vec![compute.repository.attr("RepositoryUri"), IMAGE_TAG.into()],
        );
        assert_eq!(copy.property("DestinationImage"), Some(&destination));

        let service = graph.node(compute.service.identifier()).unwrap();
        assert!(service.depends_on.contains(compute.image_copy.identifier()));

        let template = graph.into_template();
        let task = template.resource("ApplicationTaskDefinition").unwrap();
        let containers = task.property("ContainerDefinitions").and_then(Value::as_list).unwrap();
        assert_eq!(containers[0].get("Image"), Some(&destination));
        let project = template.resource("ApplicationImageCopyProject").unwrap();
        assert_eq!(
            project.property("Source").and_then(|s| s.get("Type")).and_then(Value::as_str),
            Some("NO_SOURCE")
        );
    }

    #[test]
    fn test_non_production_storage_is_emptied_on_delete() {
        let mut graph = ResourceGraph::new("app");
        let (network, database) = upstream(&mut graph);
        let compute = ApplicationBuilder::new("dev-exprj", ecs(1, 2), image())
            .build(&mut graph, &network, &database)
            .unwrap();

        let template = graph.into_template();
        let bucket = template.resource("ApplicationAccessLogBucket").unwrap();
        assert_eq!(bucket.deletion_policy, Some(DeletionPolicy::Delete));
        let auto_delete = template.resource("ApplicationAccessLogAutoDelete").unwrap();
        assert_eq!(auto_delete.resource_type, "Custom::S3AutoDeleteObjects");
        assert_eq!(
            auto_delete.property("BucketName").and_then(Value::as_ref_id).map(|id| id.as_str()),
            Some("ApplicationAccessLogBucket")
        );
        let load_balancer = template.resource(compute.load_balancer.identifier().as_str()).unwrap();
        assert!(load_balancer
            .depends_on
            .iter()
            .any(|id| id.as_str() == "ApplicationAccessLogAutoDelete"));

        let repository = template.resource("ApplicationRepository").unwrap();
        assert_eq!(repository.property("EmptyOnDelete"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_production_storage_is_retained() {
        let mut graph = ResourceGraph::new("app");
        let (network, database) = upstream(&mut graph);
        ApplicationBuilder::new("prod-exprj", ecs(2, 6), image())
            .production(true)
            .build(&mut graph, &network, &database)
            .unwrap();

        let template = graph.into_template();
        let bucket = template.resource("ApplicationAccessLogBucket").unwrap();
        assert_eq!(bucket.deletion_policy, Some(DeletionPolicy::Retain));
        assert_eq!(template.count_of_type("Custom::S3AutoDeleteObjects"), 0);
        let repository = template.resource("ApplicationRepository").unwrap();
        assert_eq!(repository.property("EmptyOnDelete"), Some(&Value::Bool(false)));
        assert_eq!(template.count_of_type("Custom::ImageCopy"), 1);
    }
}
