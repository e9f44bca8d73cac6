//! Load balancing, container runtime and scaling resources.

use wp_graph::{Declare, Properties, Pseudo, Value};

/// Consecutive successes before a target counts as healthy.
pub const HEALTHY_THRESHOLD: u32 = 2;
/// Consecutive failures before a target counts as unhealthy.
pub const UNHEALTHY_THRESHOLD: u32 = 3;
pub const HEALTH_CHECK_TIMEOUT_SECONDS: u32 = 15;
pub const HEALTHY_HTTP_CODES: &str = "200-399";
pub const DEREGISTRATION_DELAY_SECONDS: u32 = 30;
pub const LISTENER_PORT: u16 = 80;
pub const TARGET_CPU_UTILIZATION: u32 = 75;
pub const SCALE_COOLDOWN_SECONDS: u32 = 60;

/// Runtime of the functions backing custom resources.
pub const FUNCTION_RUNTIME: &str = "python3.12";
/// Longest a function may run, in seconds.
pub const FUNCTION_MAX_TIMEOUT_SECONDS: u32 = 900;

/// Internet-facing application load balancer.
#[derive(Debug, Clone)]
pub struct LoadBalancer {
    pub subnets: Vec<Value>,
    pub security_group: Value,
    pub access_log_bucket: Value,
}

impl Declare for LoadBalancer {
    fn resource_type(&self) -> &'static str {
        "AWS::ElasticLoadBalancingV2::LoadBalancer"
    }

    fn properties(&self) -> Properties {
        let attribute = |key: &str, value: Value| Properties::new().set("Key", key).set("Value", value);

        Properties::new()
            .set("Type", "application")
            .set("Scheme", "internet-facing")
            .set("Subnets", Value::List(self.subnets.clone()))
            .set("SecurityGroups", Value::list([self.security_group.clone()]))
            .set(
                "LoadBalancerAttributes",
                Value::list([
                    attribute("access_logs.s3.enabled", "true".into()),
                    attribute("access_logs.s3.bucket", self.access_log_bucket.clone()),
                ]),
            )
    }
}

/// HTTP target group of IP targets, health-checked on `/`.
#[derive(Debug, Clone)]
pub struct TargetGroup {
    pub vpc: Value,
    pub port: u16,
}

impl Declare for TargetGroup {
    fn resource_type(&self) -> &'static str {
        "AWS::ElasticLoadBalancingV2::TargetGroup"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("VpcId", self.vpc.clone())
            .set("Port", self.port)
            .set("Protocol", "HTTP")
            .set("TargetType", "ip")
            .set("HealthCheckPath", "/")
            .set("HealthyThresholdCount", HEALTHY_THRESHOLD)
            .set("UnhealthyThresholdCount", UNHEALTHY_THRESHOLD)
            .set("HealthCheckTimeoutSeconds", HEALTH_CHECK_TIMEOUT_SECONDS)
            .set("Matcher", Properties::new().set("HttpCode", HEALTHY_HTTP_CODES))
            .set(
                "TargetGroupAttributes",
                Value::list([Properties::new()
                    .set("Key", "deregistration_delay.timeout_seconds")
                    .set("Value", DEREGISTRATION_DELAY_SECONDS.to_string())]),
            )
    }
}

#[derive(Debug, Clone)]
pub struct Listener {
    pub load_balancer: Value,
    pub target_group: Value,
    pub port: u16,
}

impl Declare for Listener {
    fn resource_type(&self) -> &'static str {
        "AWS::ElasticLoadBalancingV2::Listener"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("LoadBalancerArn", self.load_balancer.clone())
            .set("Port", self.port)
            .set("Protocol", "HTTP")
            .set(
                "DefaultActions",
                Value::list([Properties::new()
                    .set("Type", "forward")
                    .set("TargetGroupArn", self.target_group.clone())]),
            )
    }
}

#[derive(Debug, Clone)]
pub struct Cluster {
    pub name: String,
}

impl Declare for Cluster {
    fn resource_type(&self) -> &'static str {
        "AWS::ECS::Cluster"
    }

    fn properties(&self) -> Properties {
        Properties::new().set("ClusterName", &self.name).set(
            "ClusterSettings",
            Value::list([Properties::new()
                .set("Name", "containerInsights")
                .set("Value", "enabled")]),
        )
    }
}

/// The single container of a task.
#[derive(Debug, Clone)]
pub struct ContainerDefinition {
    pub name: String,
    pub image: Value,
    pub port: u16,
    pub environment: Vec<(String, Value)>,
    /// Variables filled from a secret at task start.
    pub secrets: Vec<(String, Value)>,
    pub mount_path: String,
    pub log_group: Value,
    pub log_prefix: String,
}

impl ContainerDefinition {
    fn render(&self, volume: &str) -> Properties {
        let environment = self
            .environment
            .iter()
            .map(|(name, value)| Properties::new().set("Name", name).set("Value", value.clone()));
        let secrets = self
            .secrets
            .iter()
            .map(|(name, from)| Properties::new().set("Name", name).set("ValueFrom", from.clone()));

        Properties::new()
            .set("Name", &self.name)
            .set("Image", self.image.clone())
            .set("Essential", true)
            .set(
                "PortMappings",
                Value::list([Properties::new()
                    .set("ContainerPort", self.port)
                    .set("Protocol", "tcp")]),
            )
            .set("Environment", Value::list(environment))
            .set("Secrets", Value::list(secrets))
            .set(
                "MountPoints",
                Value::list([Properties::new()
                    .set("SourceVolume", volume)
                    .set("ContainerPath", &self.mount_path)
                    .set("ReadOnly", false)]),
            )
            .set(
                "LogConfiguration",
                Properties::new().set("LogDriver", "awslogs").set(
                    "Options",
                    Properties::new()
                        .set("awslogs-group", self.log_group.clone())
                        .set("awslogs-region", Pseudo::Region)
                        .set("awslogs-stream-prefix", &self.log_prefix),
                ),
            )
    }
}

/// Fargate task definition with one container and one EFS volume.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    pub family: String,
    pub cpu: u32,
    pub memory: u32,
    pub execution_role: Value,
    pub task_role: Value,
    pub volume_name: String,
    pub file_system: Value,
    pub container: ContainerDefinition,
}

impl Declare for TaskDefinition {
    fn resource_type(&self) -> &'static str {
        "AWS::ECS::TaskDefinition"
    }

    fn properties(&self) -> Properties {
        let volume = Properties::new().set("Name", &self.volume_name).set(
            "EFSVolumeConfiguration",
            Properties::new()
                .set("FilesystemId", self.file_system.clone())
                .set("TransitEncryption", "ENABLED"),
        );

        Properties::new()
            .set("Family", &self.family)
            .set("Cpu", self.cpu.to_string())
            .set("Memory", self.memory.to_string())
            .set("NetworkMode", "awsvpc")
            .set("RequiresCompatibilities", Value::list(["FARGATE"]))
            .set("ExecutionRoleArn", self.execution_role.clone())
            .set("TaskRoleArn", self.task_role.clone())
            .set("Volumes", Value::list([volume]))
            .set(
                "ContainerDefinitions",
                Value::list([self.container.render(&self.volume_name)]),
            )
    }
}

/// Fargate service registered with one target group.
#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    pub cluster: Value,
    pub task_definition: Value,
    pub desired_count: u32,
    pub subnets: Vec<Value>,
    pub security_group: Value,
    pub target_group: Value,
    pub container_name: String,
    pub container_port: u16,
}

impl Declare for Service {
    fn resource_type(&self) -> &'static str {
        "AWS::ECS::Service"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("ServiceName", &self.name)
            .set("Cluster", self.cluster.clone())
            .set("TaskDefinition", self.task_definition.clone())
            .set("DesiredCount", self.desired_count)
            .set("LaunchType", "FARGATE")
            .set("PlatformVersion", "1.4.0")
            .set("HealthCheckGracePeriodSeconds", 60u32)
            .set(
                "DeploymentConfiguration",
                Properties::new()
                    .set("MinimumHealthyPercent", 50u32)
                    .set("MaximumPercent", 200u32),
            )
            .set(
                "NetworkConfiguration",
                Properties::new().set(
                    "AwsvpcConfiguration",
                    Properties::new()
                        .set("AssignPublicIp", "DISABLED")
                        .set("Subnets", Value::List(self.subnets.clone()))
                        .set("SecurityGroups", Value::list([self.security_group.clone()])),
                ),
            )
            .set(
                "LoadBalancers",
                Value::list([Properties::new()
                    .set("ContainerName", &self.container_name)
                    .set("ContainerPort", self.container_port)
                    .set("TargetGroupArn", self.target_group.clone())]),
            )
    }
}

/// Bounds on a service's task count.
#[derive(Debug, Clone)]
pub struct ScalableTarget {
    pub cluster: Value,
    pub service_name: Value,
    pub min_capacity: u32,
    pub max_capacity: u32,
}

impl Declare for ScalableTarget {
    fn resource_type(&self) -> &'static str {
        "AWS::ApplicationAutoScaling::ScalableTarget"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("ServiceNamespace", "ecs")
            .set("ScalableDimension", "ecs:service:DesiredCount")
            .set(
                "ResourceId",
                Value::join(
                    "/",
                    vec!["service".into(), self.cluster.clone(), self.service_name.clone()],
                ),
            )
            .set("MinCapacity", self.min_capacity)
            .set("MaxCapacity", self.max_capacity)
    }
}

/// Target tracking on average service CPU.
#[derive(Debug, Clone)]
pub struct CpuScalingPolicy {
    pub name: String,
    pub scalable_target: Value,
    pub target_utilization: u32,
    pub cooldown_seconds: u32,
}

impl Declare for CpuScalingPolicy {
    fn resource_type(&self) -> &'static str {
        "AWS::ApplicationAutoScaling::ScalingPolicy"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("PolicyName", &self.name)
            .set("PolicyType", "TargetTrackingScaling")
            .set("ScalingTargetId", self.scalable_target.clone())
            .set(
                "TargetTrackingScalingPolicyConfiguration",
                Properties::new()
                    .set("TargetValue", self.target_utilization)
                    .set("ScaleInCooldown", self.cooldown_seconds)
                    .set("ScaleOutCooldown", self.cooldown_seconds)
                    .set(
                        "PredefinedMetricSpecification",
                        Properties::new()
                            .set("PredefinedMetricType", "ECSServiceAverageCPUUtilization"),
                    ),
            )
    }
}

/// A function whose source is inlined into the template.
///
/// Inline sources are stored as `index.py`, so the handler lives in
/// module `index`.
#[derive(Debug, Clone)]
pub struct Function {
    pub description: String,
    pub role: Value,
    pub source: String,
    pub timeout_seconds: u32,
}

impl Declare for Function {
    fn resource_type(&self) -> &'static str {
        "AWS::Lambda::Function"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("Description", &self.description)
            .set("Runtime", FUNCTION_RUNTIME)
            .set("Handler", "index.handler")
            .set("Role", self.role.clone())
            .set("Timeout", self.timeout_seconds.min(FUNCTION_MAX_TIMEOUT_SECONDS))
            .set("Code", Properties::new().set("ZipFile", &self.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wp_graph::LogicalId;

    fn reference(id: &str) -> Value {
        Value::Ref(LogicalId::new(id).unwrap())
    }

    #[test]
    fn test_target_group_health_check() {
        let tg = TargetGroup {
            vpc: reference("Vpc"),
            port: 80,
        };
        let rendered = serde_json::to_value(tg.properties()).unwrap();
        assert_eq!(rendered["HealthyThresholdCount"], json!(2));
        assert_eq!(rendered["UnhealthyThresholdCount"], json!(3));
        assert_eq!(rendered["HealthCheckTimeoutSeconds"], json!(15));
        assert_eq!(rendered["Matcher"]["HttpCode"], json!("200-399"));
        assert_eq!(rendered["TargetGroupAttributes"][0]["Value"], json!("30"));
    }

    #[test]
    fn test_task_definition_single_container() {
        let task = TaskDefinition {
            family: "wordpress".to_string(),
            cpu: 512,
            memory: 1024,
            execution_role: reference("ExecRole"),
            task_role: reference("TaskRole"),
            volume_name: "wp-content".to_string(),
            file_system: reference("Fs"),
            container: ContainerDefinition {
                name: "wordpress".to_string(),
                image: "wordpress:latest".into(),
                port: 80,
                environment: vec![("WORDPRESS_DB_HOST".to_string(), "db.internal".into())],
                secrets: vec![("WORDPRESS_DB_USER".to_string(), "arn:secret:username::".into())],
                mount_path: "/var/www/html/wp-content".to_string(),
                log_group: reference("Logs"),
                log_prefix: "wordpress".to_string(),
            },
        };
        let rendered = serde_json::to_value(task.properties()).unwrap();
        let containers = rendered["ContainerDefinitions"].as_array().unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0]["MountPoints"][0]["SourceVolume"], json!("wp-content"));
        assert_eq!(rendered["Cpu"], json!("512"));
        assert_eq!(rendered["Volumes"][0]["Name"], json!("wp-content"));
    }

    #[test]
    fn test_function_inline_source() {
        let function = Function {
            description: "empties a bucket".to_string(),
            role: reference("Role"),
            source: "def handler(event, context):\n    pass\n".to_string(),
            timeout_seconds: 3600,
        };
        let rendered = serde_json::to_value(function.properties()).unwrap();
        assert_eq!(rendered["Handler"], json!("index.handler"));
        assert_eq!(rendered["Runtime"], json!(FUNCTION_RUNTIME));
        assert_eq!(rendered["Timeout"], json!(900));
        assert!(rendered["Code"]["ZipFile"].as_str().unwrap().starts_with("def handler"));
    }

    #[test]
    fn test_scaling_policy_cooldowns() {
        let policy = CpuScalingPolicy {
            name: "cpu".to_string(),
            scalable_target: reference("Target"),
            target_utilization: TARGET_CPU_UTILIZATION,
            cooldown_seconds: SCALE_COOLDOWN_SECONDS,
        };
        let rendered = serde_json::to_value(policy.properties()).unwrap();
        let config = &rendered["TargetTrackingScalingPolicyConfiguration"];
        assert_eq!(config["TargetValue"], json!(75));
        assert_eq!(config["ScaleInCooldown"], json!(60));
        assert_eq!(config["ScaleOutCooldown"], json!(60));
    }
}
