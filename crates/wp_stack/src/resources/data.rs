//! Relational database and private DNS resources.

use wp_config::CapacityUnit;
use wp_graph::{Declare, Properties, Pseudo, Value};

pub const DB_ENGINE: &str = "aurora-mysql";
pub const DB_PORT: u16 = 3306;
pub const SERVERLESS_ENGINE_VERSION: &str = "5.7.mysql_aurora.2.07.1";
pub const PROVISIONED_ENGINE_VERSION: &str = "5.7.mysql_aurora.2.11.1";

#[derive(Debug, Clone)]
pub struct DbSubnetGroup {
    pub description: String,
    pub subnets: Vec<Value>,
}

impl Declare for DbSubnetGroup {
    fn resource_type(&self) -> &'static str {
        "AWS::RDS::DBSubnetGroup"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("DBSubnetGroupDescription", &self.description)
            .set("SubnetIds", Value::List(self.subnets.clone()))
    }
}

/// How the cluster obtains compute.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMode {
    Serverless {
        min_capacity: CapacityUnit,
        max_capacity: CapacityUnit,
        seconds_until_auto_pause: u32,
    },
    /// Capacity comes from separately declared [`DbInstance`]s.
    Provisioned,
}

/// Dynamic reference into a credentials secret, resolved at deploy time.
pub fn secret_field(secret: &Value, field: &str) -> Value {
    Value::join(
        "",
        vec![
            "{{resolve:secretsmanager:".into(),
            secret.clone(),
            format!(":SecretString:{}}}}}", field).into(),
        ],
    )
}

#[derive(Debug, Clone)]
pub struct DbCluster {
    pub mode: EngineMode,
    pub database_name: String,
    pub subnet_group: Value,
    pub security_group: Value,
    pub kms_key: Value,
    pub secret: Value,
    pub deletion_protection: bool,
    pub log_exports: Vec<String>,
}

impl Declare for DbCluster {
    fn resource_type(&self) -> &'static str {
        "AWS::RDS::DBCluster"
    }

    fn properties(&self) -> Properties {
        let props = Properties::new()
            .set("Engine", DB_ENGINE)
            .set("DatabaseName", &self.database_name)
            .set("Port", DB_PORT)
            .set("DBSubnetGroupName", self.subnet_group.clone())
            .set("VpcSecurityGroupIds", Value::list([self.security_group.clone()]))
            .set("StorageEncrypted", true)
            .set("KmsKeyId", self.kms_key.clone())
            .set("MasterUsername", secret_field(&self.secret, "username"))
            .set("MasterUserPassword", secret_field(&self.secret, "password"))
            .set("DeletionProtection", self.deletion_protection)
            .set("CopyTagsToSnapshot", true);

        let props = if self.log_exports.is_empty() {
            props
        } else {
            props.set("EnableCloudwatchLogsExports", Value::list(self.log_exports.iter()))
        };

        match &self.mode {
            EngineMode::Serverless {
                min_capacity,
                max_capacity,
                seconds_until_auto_pause,
            } => props
                .set("EngineMode", "serverless")
                .set("EngineVersion", SERVERLESS_ENGINE_VERSION)
                .set(
                    "ScalingConfiguration",
                    Properties::new()
                        .set("AutoPause", true)
                        .set("MinCapacity", min_capacity.units())
                        .set("MaxCapacity", max_capacity.units())
                        .set("SecondsUntilAutoPause", *seconds_until_auto_pause),
                ),
            EngineMode::Provisioned => props
                .set("EngineMode", "provisioned")
                .set("EngineVersion", PROVISIONED_ENGINE_VERSION),
        }
    }
}

/// One writer or reader instance of a provisioned cluster.
#[derive(Debug, Clone)]
pub struct DbInstance {
    pub cluster: Value,
    pub instance_class: String,
    pub subnet_group: Value,
    pub availability_zone: Value,
}

impl Declare for DbInstance {
    fn resource_type(&self) -> &'static str {
        "AWS::RDS::DBInstance"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("Engine", DB_ENGINE)
            .set("DBClusterIdentifier", self.cluster.clone())
            .set("DBInstanceClass", format!("db.{}", self.instance_class))
            .set("DBSubnetGroupName", self.subnet_group.clone())
            .set("AvailabilityZone", self.availability_zone.clone())
            .set("PubliclyAccessible", false)
    }
}

/// Private DNS zone visible only inside the given VPC.
#[derive(Debug, Clone)]
pub struct HostedZone {
    pub name: String,
    pub vpc: Value,
}

impl Declare for HostedZone {
    fn resource_type(&self) -> &'static str {
        "AWS::Route53::HostedZone"
    }

    fn properties(&self) -> Properties {
        Properties::new().set("Name", &self.name).set(
            "VPCs",
            Value::list([Properties::new()
                .set("VPCId", self.vpc.clone())
                .set("VPCRegion", Pseudo::Region)]),
        )
    }
}

#[derive(Debug, Clone)]
pub struct CnameRecord {
    pub zone: Value,
    pub zone_name: String,
    pub record_name: String,
    pub target: Value,
    pub ttl: u32,
}

impl CnameRecord {
    /// Fully qualified record name, `<record>.<zone>.`
    pub fn fqdn(&self) -> String {
        format!("{}.{}.", self.record_name, self.zone_name.trim_end_matches('.'))
    }
}

impl Declare for CnameRecord {
    fn resource_type(&self) -> &'static str {
        "AWS::Route53::RecordSet"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("HostedZoneId", self.zone.clone())
            .set("Name", self.fqdn())
            .set("Type", "CNAME")
            .set("TTL", self.ttl.to_string())
            .set("ResourceRecords", Value::list([self.target.clone()]))
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

    fn cluster(mode: EngineMode) -> DbCluster {
        DbCluster {
            mode,
            database_name: "wordpress".to_string(),
            subnet_group: reference("SubnetGroup"),
            security_group: reference("Sg"),
            kms_key: reference("Key"),
            secret: reference("Secret"),
            deletion_protection: false,
            log_exports: Vec::new(),
        }
    }

    #[test]
    fn test_serverless_scaling() {
        let props = cluster(EngineMode::Serverless {
            min_capacity: CapacityUnit::Acu1,
            max_capacity: CapacityUnit::Acu2,
            seconds_until_auto_pause: 600,
        })
        .properties();
        let rendered = serde_json::to_value(&props).unwrap();
        assert_eq!(rendered["EngineMode"], json!("serverless"));
        assert_eq!(
            rendered["ScalingConfiguration"],
            json!({"AutoPause": true, "MinCapacity": 1, "MaxCapacity": 2, "SecondsUntilAutoPause": 600})
        );
    }

    #[test]
    fn test_provisioned_has_no_scaling() {
        let props = cluster(EngineMode::Provisioned).properties();
        assert!(props.get("ScalingConfiguration").is_none());
        assert_eq!(
            props.get("EngineVersion").and_then(Value::as_str),
            Some(PROVISIONED_ENGINE_VERSION)
        );
    }

    #[test]
    fn test_secret_field_reference() {
        let rendered = serde_json::to_value(secret_field(&reference("Secret"), "username")).unwrap();
        assert_eq!(
            rendered,
            json!({"Fn::Join": ["", ["{{resolve:secretsmanager:", {"Ref": "Secret"}, ":SecretString:username}}"]]})
        );
    }

    #[test]
    fn test_cname_fqdn() {
        let record = CnameRecord {
            zone: reference("Zone"),
            zone_name: "dev.wp.internal".to_string(),
            record_name: "db".to_string(),
            target: Value::Null,
            ttl: 1800,
        };
        assert_eq!(record.fqdn(), "db.dev.wp.internal.");
        assert_eq!(record.properties().get("TTL").and_then(Value::as_str), Some("1800"));
    }
}
