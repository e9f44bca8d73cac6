//! Object, file, image and log storage.

use wp_graph::{Declare, Properties, Value};

use super::service_principal;

/// Retention of container logs, in days (six months).
pub const LOG_RETENTION_DAYS: u32 = 180;

#[derive(Debug, Clone, Default)]
pub struct Bucket {
    /// Physical name; the engine generates one when absent.
    pub bucket_name: Option<String>,
    pub kms_key: Option<Value>,
}

impl Declare for Bucket {
    fn resource_type(&self) -> &'static str {
        "AWS::S3::Bucket"
    }

    fn properties(&self) -> Properties {
        let encryption = match &self.kms_key {
            Some(key) => Properties::new()
                .set("SSEAlgorithm", "aws:kms")
                .set("KMSMasterKeyID", key.clone()),
            None => Properties::new().set("SSEAlgorithm", "AES256"),
        };

        Properties::new()
            .set_opt("BucketName", self.bucket_name.as_ref())
            .set(
                "BucketEncryption",
                Properties::new().set(
                    "ServerSideEncryptionConfiguration",
                    Value::list([Properties::new().set("ServerSideEncryptionByDefault", encryption)]),
                ),
            )
            .set(
                "PublicAccessBlockConfiguration",
                Properties::new()
                    .set("BlockPublicAcls", true)
                    .set("BlockPublicPolicy", true)
                    .set("IgnorePublicAcls", true)
                    .set("RestrictPublicBuckets", true),
            )
    }
}

/// Lets the load balancer's log delivery service write into a bucket.
#[derive(Debug, Clone)]
pub struct AccessLogBucketPolicy {
    pub bucket: Value,
    pub bucket_arn: Value,
}

impl Declare for AccessLogBucketPolicy {
    fn resource_type(&self) -> &'static str {
        "AWS::S3::BucketPolicy"
    }

    fn properties(&self) -> Properties {
        let objects = Value::join("", vec![self.bucket_arn.clone(), "/*".into()]);
        let statement = Properties::new()
            .set("Effect", "Allow")
            .set(
                "Principal",
                Properties::new().set("Service", service_principal("logdelivery.elasticloadbalancing")),
            )
            .set("Action", "s3:PutObject")
            .set("Resource", objects);

        Properties::new().set("Bucket", self.bucket.clone()).set(
            "PolicyDocument",
            Properties::new()
                .set("Version", "2012-10-17")
                .set("Statement", Value::list([statement])),
        )
    }
}

/// Encrypted elastic file system.
#[derive(Debug, Clone)]
pub struct FileSystem {
    pub kms_key: Value,
    pub name: String,
}

impl Declare for FileSystem {
    fn resource_type(&self) -> &'static str {
        "AWS::EFS::FileSystem"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("Encrypted", true)
            .set("KmsKeyId", self.kms_key.clone())
            .set("PerformanceMode", "generalPurpose")
            .set(
                "FileSystemTags",
                Value::tags([("Name", self.name.as_str())]),
            )
    }
}

#[derive(Debug, Clone)]
pub struct MountTarget {
    pub file_system: Value,
    pub subnet: Value,
    pub security_group: Value,
}

impl Declare for MountTarget {
    fn resource_type(&self) -> &'static str {
        "AWS::EFS::MountTarget"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("FileSystemId", self.file_system.clone())
            .set("SubnetId", self.subnet.clone())
            .set("SecurityGroups", Value::list([self.security_group.clone()]))
    }
}

/// Removes every object of a bucket when the resource is deleted, so the
/// bucket itself can be deleted after it.
#[derive(Debug, Clone)]
pub struct BucketAutoDelete {
    pub service_token: Value,
    pub bucket: Value,
}

impl Declare for BucketAutoDelete {
    fn resource_type(&self) -> &'static str {
        "Custom::S3AutoDeleteObjects"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("ServiceToken", self.service_token.clone())
            .set("BucketName", self.bucket.clone())
    }
}

/// Container image registry encrypted with a customer key.
#[derive(Debug, Clone)]
pub struct Repository {
    pub name: String,
    pub kms_key: Value,
    /// Delete stored images together with the repository.
    pub empty_on_delete: bool,
}

impl Declare for Repository {
    fn resource_type(&self) -> &'static str {
        "AWS::ECR::Repository"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("RepositoryName", &self.name)
            .set(
                "EncryptionConfiguration",
                Properties::new()
                    .set("EncryptionType", "KMS")
                    .set("KmsKey", self.kms_key.clone()),
            )
            .set(
                "ImageScanningConfiguration",
                Properties::new().set("ScanOnPush", true),
            )
            .set("EmptyOnDelete", self.empty_on_delete)
    }
}

/// Copies an image from one registry location to another on create and
/// update, through a standalone build project.
#[derive(Debug, Clone)]
pub struct ImageCopy {
    pub service_token: Value,
    pub project: Value,
    pub source_image: Value,
    pub destination_image: Value,
}

impl Declare for ImageCopy {
    fn resource_type(&self) -> &'static str {
        "Custom::ImageCopy"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("ServiceToken", self.service_token.clone())
            .set("ProjectName", self.project.clone())
            .set("SourceImage", self.source_image.clone())
            .set("DestinationImage", self.destination_image.clone())
    }
}

#[derive(Debug, Clone)]
pub struct LogGroup {
    pub name: String,
    pub retention_days: u32,
}

impl Declare for LogGroup {
    fn resource_type(&self) -> &'static str {
        "AWS::Logs::LogGroup"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("LogGroupName", &self.name)
            .set("RetentionInDays", self.retention_days)
    }
}
