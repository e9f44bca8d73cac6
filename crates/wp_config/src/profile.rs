//! Environment profile definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::OnceLock;

use ipnet::Ipv4Net;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Number of availability zones every network spans.
pub const AZ_COUNT: u8 = 3;

/// Subnet blocks reserved inside the VPC range, whatever the tiers use.
pub const RESERVED_SUBNET_BLOCKS: u32 = 16;

/// Idle minutes before a serverless cluster pauses.
pub const AUTO_PAUSE_MINUTES: RangeInclusive<u32> = 5..=1440;

/// Fargate CPU sizes accepted by the task definition.
const FARGATE_CPU_UNITS: [u32; 5] = [256, 512, 1024, 2048, 4096];

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9-]*$").expect("static regex"))
}

fn account_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{12}$").expect("static regex"))
}

fn region_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d$").expect("static regex"))
}

fn instance_class_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9]*\.[a-z0-9]+$").expect("static regex"))
}

/// A named, immutable environment profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub project: String,
    pub account_id: String,
    pub region: String,
    pub repository: RepositoryConfig,
    /// Deploy through the self-mutating infrastructure pipeline.
    pub infrastructure_pipeline: bool,
    pub production: bool,
    pub cost_account: String,
    pub private_hosted_zone_name: String,
    pub network: NetworkConfig,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub database: DatabaseConfig,
    pub ecs: EcsConfig,
}

/// Source repository watched by the infrastructure pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub arn: String,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub cidr: String,
    pub subnet_mask: u8,
    pub nat_count: u8,
}

/// Database shape. Exactly one variant exists per profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseConfig {
    Serverless(ServerlessConfig),
    Provisioned(ProvisionedConfig),
}

impl DatabaseConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Serverless(_) => "serverless",
            Self::Provisioned(_) => "provisioned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerlessConfig {
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub auto_pause_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedConfig {
    pub az_count: u32,
    pub instance_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcsConfig {
    pub service_name: String,
    pub cpu: u32,
    pub memory: u32,
    pub min: u32,
    pub max: u32,
    pub port: u16,
}

/// Serverless capacity units recognized by the database engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CapacityUnit {
    Acu1,
    Acu2,
    Acu4,
    Acu8,
    Acu16,
    Acu32,
    Acu64,
}

impl CapacityUnit {
    pub fn all() -> [Self; 7] {
        [
            Self::Acu1,
            Self::Acu2,
            Self::Acu4,
            Self::Acu8,
            Self::Acu16,
            Self::Acu32,
            Self::Acu64,
        ]
    }

    pub fn units(&self) -> u32 {
        match self {
            Self::Acu1 => 1,
            Self::Acu2 => 2,
            Self::Acu4 => 4,
            Self::Acu8 => 8,
            Self::Acu16 => 16,
            Self::Acu32 => 32,
            Self::Acu64 => 64,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acu1 => "ACU_1",
            Self::Acu2 => "ACU_2",
            Self::Acu4 => "ACU_4",
            Self::Acu8 => "ACU_8",
            Self::Acu16 => "ACU_16",
            Self::Acu32 => "ACU_32",
            Self::Acu64 => "ACU_64",
        }
    }
}

impl TryFrom<u32> for CapacityUnit {
    type Error = ConfigError;

    fn try_from(value: u32) -> ConfigResult<Self> {
        Self::all()
            .into_iter()
            .find(|unit| unit.units() == value)
            .ok_or(ConfigError::UnsupportedCapacity(value))
    }
}

impl fmt::Display for CapacityUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of checking a profile, with every violation found.
#[derive(Debug, Default)]
pub struct ProfileReport {
    pub violations: Vec<(String, String)>,
}

impl ProfileReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    fn add(&mut self, field: &str, message: impl Into<String>) {
        self.violations.push((field.to_string(), message.into()));
    }

    /// Convert into a result carrying the first violation.
    pub fn into_result(self) -> ConfigResult<()> {
        match self.violations.into_iter().next() {
            Some((field, message)) => Err(ConfigError::Invalid { field, message }),
            None => Ok(()),
        }
    }
}

impl Profile {
    /// Resource name prefix, `<env>-<project>`.
    pub fn prefix(&self) -> String {
        format!("{}-{}", self.name, self.project)
    }

    /// Tags applied to every stack synthesized for this profile.
    pub fn stack_tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Environment".to_string(), self.name.clone()),
            ("CostAccount".to_string(), self.cost_account.clone()),
        ])
    }

    /// Validate the profile, failing on the first violation.
    pub fn validate(&self) -> ConfigResult<()> {
        self.check().into_result()
    }

    /// Check the profile and report every violation.
    pub fn check(&self) -> ProfileReport {
        let mut report = ProfileReport::default();
        let slug = slug_pattern();

        if !slug.is_match(&self.name) {
            report.add("name", format!("'{}' must be lowercase alphanumeric with hyphens", self.name));
        }
        if !slug.is_match(&self.project) {
            report.add("project", format!("'{}' must be lowercase alphanumeric with hyphens", self.project));
        }

        if !account_pattern().is_match(&self.account_id) {
            report.add("account_id", "must be a 12 digit account number");
        }

        if !region_pattern().is_match(&self.region) {
            report.add("region", format!("'{}' is not a region name", self.region));
        }

        if !self.repository.arn.starts_with("arn:") {
            report.add("repository.arn", "must be an ARN");
        }
        if self.repository.branch.trim().is_empty() {
            report.add("repository.branch", "cannot be empty");
        }
        if self.cost_account.trim().is_empty() {
            report.add("cost_account", "cannot be empty");
        }
        if self.private_hosted_zone_name.trim().is_empty() {
            report.add("private_hosted_zone_name", "cannot be empty");
        }

        self.check_network(&mut report);
        self.check_database(&mut report);
        self.check_ecs(&mut report);

        report
    }

    fn check_network(&self, report: &mut ProfileReport) {
        let network = &self.network;

        match network.cidr.parse::<Ipv4Net>() {
            Ok(net) => {
                if !(16..=28).contains(&network.subnet_mask) {
                    report.add("network.subnet_mask", "must be between 16 and 28");
                } else if network.subnet_mask < net.prefix_len() {
                    report.add(
                        "network.subnet_mask",
                        format!("/{} is wider than the VPC range {}", network.subnet_mask, net),
                    );
                } else {
                    let blocks = 1u64 << (network.subnet_mask - net.prefix_len());
                    if blocks < RESERVED_SUBNET_BLOCKS as u64 {
                        report.add(
                            "network.subnet_mask",
                            format!(
                                "{} only holds {} /{} blocks, {} are reserved",
                                net, blocks, network.subnet_mask, RESERVED_SUBNET_BLOCKS
                            ),
                        );
                    }
                }
            }
            Err(_) => report.add("network.cidr", format!("'{}' is not an IPv4 CIDR", network.cidr)),
        }

        if network.nat_count == 0 || network.nat_count > AZ_COUNT {
            report.add(
                "network.nat_count",
                format!("{} must be between 1 and {}", network.nat_count, AZ_COUNT),
            );
        }
    }

    fn check_database(&self, report: &mut ProfileReport) {
        match (&self.database, self.production) {
            (DatabaseConfig::Serverless(serverless), false) => {
                let min = CapacityUnit::try_from(serverless.min_capacity);
                let max = CapacityUnit::try_from(serverless.max_capacity);
                if let Err(e) = &min {
                    report.add("database.serverless.min_capacity", e.to_string());
                }
                if let Err(e) = &max {
                    report.add("database.serverless.max_capacity", e.to_string());
                }
                if let (Ok(min), Ok(max)) = (min, max) {
                    if min > max {
                        report.add("database.serverless.min_capacity", "cannot exceed max_capacity");
                    }
                }
                if !AUTO_PAUSE_MINUTES.contains(&serverless.auto_pause_minutes) {
                    report.add(
                        "database.serverless.auto_pause_minutes",
                        format!(
                            "must be between {} and {}",
                            AUTO_PAUSE_MINUTES.start(),
                            AUTO_PAUSE_MINUTES.end()
                        ),
                    );
                }
            }
            (DatabaseConfig::Provisioned(provisioned), true) => {
                if provisioned.az_count == 0 || provisioned.az_count > AZ_COUNT as u32 {
                    report.add(
                        "database.provisioned.az_count",
                        format!("must be between 1 and {}", AZ_COUNT),
                    );
                }
                if !instance_class_pattern().is_match(&provisioned.instance_type) {
                    report.add(
                        "database.provisioned.instance_type",
                        format!("'{}' is not an instance class", provisioned.instance_type),
                    );
                }
            }
            (other, production) => report.add(
                "database",
                format!(
                    "a {} profile requires a {} database, found {}",
                    if production { "production" } else { "non-production" },
                    if production { "provisioned" } else { "serverless" },
                    other.kind()
                ),
            ),
        }
    }

    fn check_ecs(&self, report: &mut ProfileReport) {
        let ecs = &self.ecs;
        if !slug_pattern().is_match(&ecs.service_name) {
            report.add("ecs.service_name", "must be lowercase alphanumeric with hyphens");
        }
        if !FARGATE_CPU_UNITS.contains(&ecs.cpu) {
            report.add("ecs.cpu", format!("{} is not a Fargate CPU size", ecs.cpu));
        }
        if ecs.memory < 512 {
            report.add("ecs.memory", "must be at least 512 MiB");
        }
        if ecs.min == 0 {
            report.add("ecs.min", "at least one task must run");
        }
        if ecs.min > ecs.max {
            report.add("ecs.min", "cannot exceed ecs.max");
        }
        if ecs.port == 0 {
            report.add("ecs.port", "cannot be zero");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev() -> Profile {
        serde_yaml::from_str(include_str!("../profiles/dev.yaml")).unwrap()
    }

    #[test]
    fn test_capacity_table() {
        for value in [1u32, 2, 4, 8, 16, 32, 64] {
            assert_eq!(CapacityUnit::try_from(value).unwrap().units(), value);
        }
        assert_eq!(CapacityUnit::try_from(2u32).unwrap().as_str(), "ACU_2");
    }

    #[test]
    fn test_capacity_out_of_table() {
        for value in [0u32, 3, 5, 12, 65, 128] {
            assert!(matches!(
                CapacityUnit::try_from(value),
                Err(ConfigError::UnsupportedCapacity(v)) if v == value
            ));
        }
    }

    #[test]
    fn test_prefix_and_tags() {
        let profile = dev();
        assert_eq!(profile.prefix(), "dev-exprj");
        let tags = profile.stack_tags();
        assert_eq!(tags["Environment"], "dev");
        assert_eq!(tags["CostAccount"], "dev");
    }

    #[test]
    fn test_database_reads_as_nested_map() {
        let database = dev().database;
        assert_eq!(
            database,
            DatabaseConfig::Serverless(ServerlessConfig {
                min_capacity: 1,
                max_capacity: 2,
                auto_pause_minutes: 10,
            })
        );

        let prod: Profile = serde_yaml::from_str(include_str!("../profiles/prod.yaml")).unwrap();
        assert_eq!(prod.database.kind(), "provisioned");

        let rendered = serde_yaml::to_string(&prod).unwrap();
        assert!(rendered.contains("database:\n  provisioned:\n"));
        let reparsed: Profile = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(reparsed, prod);
    }

    #[test]
    fn test_patterns_checked_repeatedly() {
        let mut profile = dev();
        for _ in 0..3 {
            assert!(profile.check().is_valid());
        }
        profile.account_id = "1234".to_string();
        profile.ecs.service_name = "Word Press".to_string();
        let report = profile.check();
        let fields: Vec<_> = report.violations.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(fields, vec!["account_id", "ecs.service_name"]);
    }

    #[test]
    fn test_dev_profile_is_valid() {
        assert!(dev().check().is_valid());
    }

    #[test]
    fn test_nat_count_rejected() {
        let mut profile = dev();
        profile.network.nat_count = 4;
        let err = profile.validate().unwrap_err();
        assert_eq!(err.field(), Some("network.nat_count"));

        profile.network.nat_count = 0;
        assert_eq!(profile.validate().unwrap_err().field(), Some("network.nat_count"));
    }

    #[test]
    fn test_capacity_rejected_by_validation() {
        let mut profile = dev();
        profile.database = DatabaseConfig::Serverless(ServerlessConfig {
            min_capacity: 3,
            max_capacity: 2,
            auto_pause_minutes: 10,
        });
        let err = profile.validate().unwrap_err();
        assert_eq!(err.field(), Some("database.serverless.min_capacity"));
    }

    #[test]
    fn test_database_must_follow_production_flag() {
        let mut profile = dev();
        profile.production = true;
        let err = profile.validate().unwrap_err();
        assert_eq!(err.field(), Some("database"));
        assert!(err.to_string().contains("provisioned"));
    }

    #[test]
    fn test_subnet_mask_needs_reserved_blocks() {
        let mut profile = dev();
        profile.network.cidr = "10.0.0.0/22".to_string();
        profile.network.subnet_mask = 24;
        let report = profile.check();
        assert!(!report.is_valid());
        assert_eq!(report.violations[0].0, "network.subnet_mask");
    }

    #[test]
    fn test_report_collects_every_violation() {
        let mut profile = dev();
        profile.region = "nowhere".to_string();
        profile.ecs.cpu = 300;
        profile.ecs.min = 3;
        let report = profile.check();
        let fields: Vec<_> = report.violations.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(fields, vec!["region", "ecs.cpu", "ecs.min"]);
    }
}
