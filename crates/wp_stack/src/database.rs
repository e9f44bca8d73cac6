//! Database topology: serverless or provisioned, chosen by the profile.

use tracing::{debug, info};
use wp_config::{CapacityUnit, DatabaseConfig, AUTO_PAUSE_MINUTES, AZ_COUNT};
use wp_graph::{DeclareOptions, DeletionPolicy, Handle, ResourceGraph, Value};

use crate::error::{StackError, StackResult};
use crate::network::{NetworkGraph, SubnetGroup};
use crate::resources::data::{
    CnameRecord, DbCluster, DbInstance, DbSubnetGroup, EngineMode, HostedZone, DB_PORT,
};
use crate::resources::network::SecurityGroup;
use crate::resources::security::{DatabaseSecret, KmsAlias, KmsKey, SecretAttachment};

pub const DATABASE_NAME: &str = "wordpress";
pub const MASTER_USERNAME: &str = "master";
/// Subdomain of the private zone that resolves to the database endpoint.
pub const DATABASE_RECORD: &str = "db";
pub const DATABASE_RECORD_TTL: u32 = 1800;

/// The database variant, decided once from the profile.
///
/// Exactly one variant exists per synthesis; there is no state with both
/// or neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseShape {
    Serverless {
        min_capacity: CapacityUnit,
        max_capacity: CapacityUnit,
        auto_pause_minutes: u32,
    },
    Provisioned {
        instance_count: u32,
        instance_class: String,
    },
}

impl DatabaseShape {
    /// Pick the variant from the `production` flag.
    ///
    /// The configured sub-config must match: production profiles carry a
    /// provisioned block, all others a serverless one.
    pub fn select(production: bool, config: &DatabaseConfig) -> StackResult<Self> {
        match (production, config) {
            (false, DatabaseConfig::Serverless(serverless)) => {
                let min_capacity = CapacityUnit::try_from(serverless.min_capacity)
                    .map_err(|e| StackError::invalid("database.serverless.min_capacity", e.to_string()))?;
                let max_capacity = CapacityUnit::try_from(serverless.max_capacity)
                    .map_err(|e| StackError::invalid("database.serverless.max_capacity", e.to_string()))?;
                if min_capacity > max_capacity {
                    return Err(StackError::invalid(
                        "database.serverless.min_capacity",
                        format!("{} exceeds max capacity {}", min_capacity, max_capacity),
                    ));
                }
                if !AUTO_PAUSE_MINUTES.contains(&serverless.auto_pause_minutes) {
                    return Err(StackError::invalid(
                        "database.serverless.auto_pause_minutes",
                        format!(
                            "must be between {} and {}, got {}",
                            AUTO_PAUSE_MINUTES.start(),
                            AUTO_PAUSE_MINUTES.end(),
                            serverless.auto_pause_minutes
                        ),
                    ));
                }
                Ok(Self::Serverless {
                    min_capacity,
                    max_capacity,
                    auto_pause_minutes: serverless.auto_pause_minutes,
                })
            }
            (true, DatabaseConfig::Provisioned(provisioned)) => {
                if provisioned.az_count == 0 || provisioned.az_count > u32::from(AZ_COUNT) {
                    return Err(StackError::invalid(
                        "database.provisioned.az_count",
                        format!("must be between 1 and {}, got {}", AZ_COUNT, provisioned.az_count),
                    ));
                }
                Ok(Self::Provisioned {
                    instance_count: provisioned.az_count,
                    instance_class: provisioned.instance_type.clone(),
                })
            }
            (production, config) => Err(StackError::invalid(
                "database",
                format!(
                    "a {} profile cannot use a {} database",
                    if production { "production" } else { "non-production" },
                    config.kind()
                ),
            )),
        }
    }

    pub fn is_serverless(&self) -> bool {
        matches!(self, Self::Serverless { .. })
    }
}

/// The private DNS zone the database record lives in.
#[derive(Debug, Clone)]
pub struct PrivateZone {
    pub handle: Handle<HostedZone>,
    pub name: String,
}

impl PrivateZone {
    pub fn declare(graph: &mut ResourceGraph, network: &NetworkGraph, name: &str) -> StackResult<Self> {
        let handle = graph.declare(
            "PrivateHostedZone",
            HostedZone {
                name: name.to_string(),
                vpc: network.vpc_id(),
            },
        )?;
        Ok(Self {
            handle,
            name: name.to_string(),
        })
    }
}

/// What the rest of the graph needs from the database, whichever variant.
#[derive(Debug, Clone)]
pub struct DatabaseReference {
    pub shape: DatabaseShape,
    pub cluster: Handle<DbCluster>,
    pub instances: Vec<Handle<DbInstance>>,
    pub security_group: Handle<SecurityGroup>,
    pub secret: Handle<DatabaseSecret>,
    pub kms_key: Handle<KmsKey>,
    /// `db.<zone>`, resolvable inside the VPC.
    pub hostname: String,
    pub port: u16,
}

impl DatabaseReference {
    pub fn endpoint(&self) -> Value {
        self.cluster.attr("Endpoint.Address")
    }

    pub fn security_group_id(&self) -> Value {
        self.security_group.attr("GroupId")
    }
}

/// Builds the database cluster inside the isolated subnets.
pub struct DatabaseBuilder {
    prefix: String,
    shape: DatabaseShape,
    deletion_protection: bool,
}

impl DatabaseBuilder {
    pub fn new(prefix: impl Into<String>, shape: DatabaseShape) -> Self {
        Self {
            prefix: prefix.into(),
            shape,
            deletion_protection: false,
        }
    }

    pub fn deletion_protection(mut self, enabled: bool) -> Self {
        self.deletion_protection = enabled;
        self
    }

    /// Declare key, secret, security group, cluster and DNS record.
    ///
    /// The security group is created with no ingress; the compute tier
    /// opens it later.
    pub fn build(
        self,
        graph: &mut ResourceGraph,
        network: &NetworkGraph,
        subnets: &SubnetGroup,
        zone: &PrivateZone,
    ) -> StackResult<DatabaseReference> {
        subnets.require("database")?;
        info!(
            "Building {} database for {}",
            if self.shape.is_serverless() { "serverless" } else { "provisioned" },
            self.prefix
        );

        let mut scope = graph.scope("Database");
        let kms_key = scope.declare(
            "Key",
            KmsKey {
                description: format!("{} database encryption key", self.prefix),
            },
        )?;
        scope.declare(
            "KeyAlias",
            KmsAlias::new(&format!("{}/aurora-serverless", self.prefix), kms_key.reference()),
        )?;

        let secret = scope.declare(
            "Secret",
            DatabaseSecret {
                name: format!("{}-database-secret", self.prefix),
                username: MASTER_USERNAME.to_string(),
                database_name: DATABASE_NAME.to_string(),
                kms_key: kms_key.reference(),
            },
        )?;

        let security_group = scope.declare(
            "SecurityGroup",
            SecurityGroup {
                vpc: network.vpc_id(),
                group_name: format!("{}-database-sg", self.prefix),
                description: format!("{} database", self.prefix),
                ingress: Vec::new(),
            },
        )?;

        let subnet_group = scope.declare(
            "SubnetGroup",
            DbSubnetGroup {
                description: format!("{} isolated subnets", self.prefix),
                subnets: subnets.ids(),
            },
        )?;

        let (mode, log_exports) = match &self.shape {
            DatabaseShape::Serverless {
                min_capacity,
                max_capacity,
                auto_pause_minutes,
            } => {
                let seconds_until_auto_pause = auto_pause_minutes.checked_mul(60).ok_or_else(|| {
                    StackError::invalid(
                        "database.serverless.auto_pause_minutes",
                        format!("{} minutes overflows the pause timer", auto_pause_minutes),
                    )
                })?;
                (
                    EngineMode::Serverless {
                        min_capacity: *min_capacity,
                        max_capacity: *max_capacity,
                        seconds_until_auto_pause,
                    },
                    Vec::new(),
                )
            }
            DatabaseShape::Provisioned { .. } => (
                EngineMode::Provisioned,
                vec!["error".to_string(), "slowquery".to_string()],
            ),
        };

        let policy = if self.deletion_protection {
            DeletionPolicy::Snapshot
        } else {
            DeletionPolicy::Delete
        };
        let cluster = scope.declare_with(
            "Cluster",
            DbCluster {
                mode,
                database_name: DATABASE_NAME.to_string(),
                subnet_group: subnet_group.reference(),
                security_group: security_group.attr("GroupId"),
                kms_key: kms_key.attr("Arn"),
                secret: secret.reference(),
                deletion_protection: self.deletion_protection,
                log_exports,
            },
            DeclareOptions::new().deletion_policy(policy),
        )?;

        let mut instances = Vec::new();
        if let DatabaseShape::Provisioned {
            instance_count,
            instance_class,
        } = &self.shape
        {
            for i in 0..*instance_count as usize {
                // Snapshots are taken at cluster level only.
                let instance = scope.declare(
                    &format!("Instance{}", i + 1),
                    DbInstance {
                        cluster: cluster.reference(),
                        instance_class: instance_class.clone(),
                        subnet_group: subnet_group.reference(),
                        availability_zone: Value::availability_zone(i),
                    },
                )?;
                debug!("Declared database instance {} ({})", i + 1, instance_class);
                instances.push(instance);
            }
        }

        scope.declare(
            "SecretAttachment",
            SecretAttachment {
                secret: secret.reference(),
                target: cluster.reference(),
            },
        )?;

        let record = CnameRecord {
            zone: zone.handle.reference(),
            zone_name: zone.name.clone(),
            record_name: DATABASE_RECORD.to_string(),
            target: cluster.attr("Endpoint.Address"),
            ttl: DATABASE_RECORD_TTL,
        };
        let hostname = record.fqdn().trim_end_matches('.').to_string();
        scope.declare("Record", record)?;

        scope.output("Endpoint", cluster.attr("Endpoint.Address"), None)?;
        scope.output(
            "SecretArn",
            secret.reference(),
            Some(format!("{}-database-secret-arn", self.prefix)),
        )?;

        Ok(DatabaseReference {
            shape: self.shape,
            cluster,
            instances,
            security_group,
            secret,
            kms_key,
            hostname,
            port: DB_PORT,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkBuilder;
    use wp_config::{ProvisionedConfig, ServerlessConfig};

    fn serverless(min: u32, max: u32) -> DatabaseConfig {
        DatabaseConfig::Serverless(ServerlessConfig {
            min_capacity: min,
            max_capacity: max,
            auto_pause_minutes: 10,
        })
    }

    fn provisioned(az_count: u32) -> DatabaseConfig {
        DatabaseConfig::Provisioned(ProvisionedConfig {
            az_count,
            instance_type: "t3.medium".to_string(),
        })
    }

    fn build(shape: DatabaseShape, protect: bool) -> (ResourceGraph, DatabaseReference) {
        let mut graph = ResourceGraph::new("db");
        let network = NetworkBuilder::new("dev-exprj", "10.230.0.0/16", 24, 1)
            .build(&mut graph)
            .unwrap();
        let zone = PrivateZone::declare(&mut graph, &network, "dev.wp.internal").unwrap();
        let reference = DatabaseBuilder::new("dev-exprj", shape)
            .deletion_protection(protect)
            .build(&mut graph, &network, &network.isolated, &zone)
            .unwrap();
        (graph, reference)
    }

    #[test]
    fn test_production_flag_selects_variant() {
        let shape = DatabaseShape::select(false, &serverless(1, 2)).unwrap();
        assert_eq!(
            shape,
            DatabaseShape::Serverless {
                min_capacity: CapacityUnit::Acu1,
                max_capacity: CapacityUnit::Acu2,
                auto_pause_minutes: 10,
            }
        );

        let shape = DatabaseShape::select(true, &provisioned(2)).unwrap();
        assert_eq!(
            shape,
            DatabaseShape::Provisioned {
                instance_count: 2,
                instance_class: "t3.medium".to_string(),
            }
        );
    }

    #[test]
    fn test_mismatched_variant_rejected() {
        assert!(DatabaseShape::select(true, &serverless(1, 2)).is_err());
        assert!(DatabaseShape::select(false, &provisioned(2)).is_err());
    }

    #[test]
    fn test_capacity_outside_table_rejected() {
        for (min, max) in [(3, 4), (1, 128), (0, 2)] {
            let err = DatabaseShape::select(false, &serverless(min, max)).unwrap_err();
            assert!(err.is_validation(), "{min}/{max} should be rejected");
        }
        assert!(DatabaseShape::select(false, &serverless(4, 2)).is_err());
    }

    #[test]
    fn test_auto_pause_outside_range_rejected() {
        for minutes in [0, 4, 1441, u32::MAX] {
            let config = DatabaseConfig::Serverless(ServerlessConfig {
                min_capacity: 1,
                max_capacity: 2,
                auto_pause_minutes: minutes,
            });
            let err = DatabaseShape::select(false, &config).unwrap_err();
            assert!(err.is_validation());
            assert!(err.to_string().contains("database.serverless.auto_pause_minutes"));
        }
    }

    #[test]
    fn test_auto_pause_overflow_fails_build() {
        let shape = DatabaseShape::Serverless {
            min_capacity: CapacityUnit::Acu1,
            max_capacity: CapacityUnit::Acu2,
            auto_pause_minutes: u32::MAX,
        };
        let mut graph = ResourceGraph::new("db");
        let network = NetworkBuilder::new("dev-exprj", "10.230.0.0/16", 24, 1)
            .build(&mut graph)
            .unwrap();
        let zone = PrivateZone::declare(&mut graph, &network, "dev.wp.internal").unwrap();
        let err = DatabaseBuilder::new("dev-exprj", shape)
            .build(&mut graph, &network, &network.isolated, &zone)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_serverless_build() {
        let shape = DatabaseShape::select(false, &serverless(1, 2)).unwrap();
        let (graph, reference) = build(shape, false);
        assert!(reference.instances.is_empty());
        assert_eq!(reference.hostname, "db.dev.wp.internal");

        let template = graph.into_template();
        assert_eq!(template.count_of_type("AWS::RDS::DBInstance"), 0);
        let cluster = template.resource(reference.cluster.identifier().as_str()).unwrap();
        assert_eq!(cluster.property("DeletionProtection"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_provisioned_build() {
        let shape = DatabaseShape::select(true, &provisioned(2)).unwrap();
        let (graph, reference) = build(shape, true);
        assert_eq!(reference.instances.len(), 2);

        let template = graph.into_template();
        for instance in template.resources_of_type("AWS::RDS::DBInstance") {
            assert_eq!(
                instance.property("DBInstanceClass").and_then(Value::as_str),
                Some("db.t3.medium")
            );
        }
        let cluster = template.resource(reference.cluster.identifier().as_str()).unwrap();
        assert_eq!(cluster.property("DeletionProtection"), Some(&Value::Bool(true)));
        assert_eq!(cluster.deletion_policy, Some(DeletionPolicy::Snapshot));
    }

    #[test]
    fn test_security_group_starts_closed() {
        let shape = DatabaseShape::select(false, &serverless(1, 2)).unwrap();
        let (graph, reference) = build(shape, false);
        let node = graph.node(reference.security_group.identifier()).unwrap();
        assert_eq!(
            node.property("SecurityGroupIngress").and_then(Value::as_list).map(|l| l.len()),
            Some(0)
        );
    }

    #[test]
    fn test_cname_points_at_endpoint() {
        let shape = DatabaseShape::select(false, &serverless(1, 2)).unwrap();
        let (graph, reference) = build(shape, false);
        let template = graph.into_template();
        let record = template.resource("DatabaseRecord").unwrap();
        assert_eq!(record.property("Name").and_then(Value::as_str), Some("db.dev.wp.internal."));
        assert_eq!(
            record.property("ResourceRecords"),
            Some(&Value::list([reference.endpoint()]))
        );
    }
}
