//! Keys, secrets and identities.

use wp_graph::{Declare, Properties, Pseudo, Value};

use super::service_principal;

/// An IAM policy statement that allows `actions` on `resources`.
#[derive(Debug, Clone)]
pub struct PolicyStatement {
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
}

impl PolicyStatement {
    pub fn allow<S: Into<String>>(actions: impl IntoIterator<Item = S>, resources: Vec<Value>) -> Self {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
            resources,
        }
    }

    fn render(&self) -> Properties {
        Properties::new()
            .set("Effect", "Allow")
            .set("Action", Value::list(self.actions.iter()))
            .set("Resource", Value::List(self.resources.clone()))
    }
}

fn policy_document(statements: impl IntoIterator<Item = Properties>) -> Properties {
    Properties::new()
        .set("Version", "2012-10-17")
        .set("Statement", Value::list(statements))
}

/// `arn:<partition>:iam::<account>:root`
fn account_root() -> Value {
    Value::join(
        "",
        vec![
            "arn:".into(),
            Pseudo::Partition.into(),
            ":iam::".into(),
            Pseudo::AccountId.into(),
            ":root".into(),
        ],
    )
}

/// Customer-managed encryption key administered by the owning account.
#[derive(Debug, Clone)]
pub struct KmsKey {
    pub description: String,
}

impl Declare for KmsKey {
    fn resource_type(&self) -> &'static str {
        "AWS::KMS::Key"
    }

    fn properties(&self) -> Properties {
        let admin = Properties::new()
            .set("Effect", "Allow")
            .set("Principal", Properties::new().set("AWS", account_root()))
            .set("Action", "kms:*")
            .set("Resource", "*");

        Properties::new()
            .set("Description", &self.description)
            .set("EnableKeyRotation", true)
            .set("KeyPolicy", policy_document([admin]))
    }
}

#[derive(Debug, Clone)]
pub struct KmsAlias {
    pub alias_name: String,
    pub target_key: Value,
}

impl KmsAlias {
    /// Alias `alias/<name>` for `target_key`.
    pub fn new(name: &str, target_key: Value) -> Self {
        Self {
            alias_name: format!("alias/{}", name),
            target_key,
        }
    }
}

impl Declare for KmsAlias {
    fn resource_type(&self) -> &'static str {
        "AWS::KMS::Alias"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("AliasName", &self.alias_name)
            .set("TargetKeyId", self.target_key.clone())
    }
}

/// Database credentials generated once by the secret store.
#[derive(Debug, Clone)]
pub struct DatabaseSecret {
    pub name: String,
    pub username: String,
    pub database_name: String,
    pub kms_key: Value,
}

impl Declare for DatabaseSecret {
    fn resource_type(&self) -> &'static str {
        "AWS::SecretsManager::Secret"
    }

    fn properties(&self) -> Properties {
        let template = format!(
            "{{\"username\":\"{}\",\"dbname\":\"{}\"}}",
            self.username, self.database_name
        );
        Properties::new()
            .set("Name", &self.name)
            .set("KmsKeyId", self.kms_key.clone())
            .set(
                "GenerateSecretString",
                Properties::new()
                    .set("SecretStringTemplate", template)
                    .set("GenerateStringKey", "password")
                    .set("PasswordLength", 30u32)
                    .set("ExcludeCharacters", "\"@/\\ '"),
            )
    }
}

/// Binds a secret to the database that consumes it, filling in host and port.
#[derive(Debug, Clone)]
pub struct SecretAttachment {
    pub secret: Value,
    pub target: Value,
}

impl Declare for SecretAttachment {
    fn resource_type(&self) -> &'static str {
        "AWS::SecretsManager::SecretTargetAttachment"
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .set("SecretId", self.secret.clone())
            .set("TargetId", self.target.clone())
            .set("TargetType", "AWS::RDS::DBCluster")
    }
}

/// A role assumed by an AWS service, with one inline policy.
#[derive(Debug, Clone)]
pub struct Role {
    pub assumed_by: String,
    pub managed_policy_arns: Vec<String>,
    pub statements: Vec<PolicyStatement>,
}

impl Role {
    pub fn for_service(service: &str) -> Self {
        Self {
            assumed_by: service.to_string(),
            managed_policy_arns: Vec::new(),
            statements: Vec::new(),
        }
    }

    pub fn with_managed_policy(mut self, arn: impl Into<String>) -> Self {
        self.managed_policy_arns.push(arn.into());
        self
    }

    pub fn allow<S: Into<String>>(mut self, actions: impl IntoIterator<Item = S>, resources: Vec<Value>) -> Self {
        self.statements.push(PolicyStatement::allow(actions, resources));
        self
    }
}

impl Declare for Role {
    fn resource_type(&self) -> &'static str {
        "AWS::IAM::Role"
    }

    fn properties(&self) -> Properties {
        let trust = Properties::new()
            .set("Effect", "Allow")
            .set(
                "Principal",
                Properties::new().set("Service", service_principal(&self.assumed_by)),
            )
            .set("Action", "sts:AssumeRole");

        let props = Properties::new().set("AssumeRolePolicyDocument", policy_document([trust]));
        let props = if self.managed_policy_arns.is_empty() {
            props
        } else {
            props.set("ManagedPolicyArns", Value::list(self.managed_policy_arns.iter()))
        };

        if self.statements.is_empty() {
            props
        } else {
            let inline = Properties::new()
                .set("PolicyName", "default")
                .set(
                    "PolicyDocument",
                    policy_document(self.statements.iter().map(PolicyStatement::render)),
                );
            props.set("Policies", Value::list([inline]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wp_graph::LogicalId;

    #[test]
    fn test_role_trust_and_policy() {
        let bucket = Value::GetAtt(LogicalId::new("Bucket").unwrap(), "Arn".to_string());
        let role = Role::for_service("codebuild").allow(["s3:GetObject"], vec![bucket]);
        let rendered = serde_json::to_value(role.properties()).unwrap();

        assert_eq!(
            rendered["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"],
            json!("codebuild.amazonaws.com")
        );
        assert_eq!(
            rendered["Policies"][0]["PolicyDocument"]["Statement"][0]["Resource"],
            json!([{"Fn::GetAtt": ["Bucket", "Arn"]}])
        );
        assert!(rendered.get("ManagedPolicyArns").is_none());
    }

    #[test]
    fn test_secret_username_template() {
        let key = Value::Ref(LogicalId::new("Key").unwrap());
        let secret = DatabaseSecret {
            name: "dev-exprj-database-secret".to_string(),
            username: "master".to_string(),
            database_name: "wordpress".to_string(),
            kms_key: key,
        };
        let rendered = serde_json::to_value(secret.properties()).unwrap();
        assert_eq!(
            rendered["GenerateSecretString"]["SecretStringTemplate"],
            json!("{\"username\":\"master\",\"dbname\":\"wordpress\"}")
        );
        assert_eq!(rendered["GenerateSecretString"]["GenerateStringKey"], json!("password"));
    }

    #[test]
    fn test_key_administered_by_account() {
        let key = KmsKey {
            description: "dev-exprj database encryption key".to_string(),
        };
        let rendered = serde_json::to_value(key.properties()).unwrap();
        let statements = rendered["KeyPolicy"]["Statement"].as_array().unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0]["Action"], json!("kms:*"));
        assert_eq!(rendered["EnableKeyRotation"], json!(true));
    }

    #[test]
    fn test_alias_prefix() {
        let alias = KmsAlias::new("dev-exprj/efs", Value::Null);
        assert_eq!(alias.alias_name, "alias/dev-exprj/efs");
    }
}
