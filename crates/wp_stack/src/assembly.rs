//! Cloud assembly: the synthesized stacks plus the manifest that ties them
//! to accounts, regions and build assets.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};
use wp_graph::{Pseudo, Template, Value};

use crate::error::StackResult;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: &str = "1.0.0";
/// Qualifier of the resources created when an environment is bootstrapped.
pub const BOOTSTRAP_QUALIFIER: &str = "hnb659fds";

/// Container asset repository every bootstrapped environment carries.
pub fn asset_repository_name(account: &str, region: &str) -> String {
    format!("cdk-{}-container-assets-{}-{}", BOOTSTRAP_QUALIFIER, account, region)
}

/// Template encoding on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        }
    }

    pub fn render(&self, template: &Template) -> StackResult<String> {
        let rendered = match self {
            OutputFormat::Json => template.to_json()?,
            OutputFormat::Yaml => template.to_yaml()?,
        };
        Ok(rendered)
    }
}

/// A container image to build from a local directory and push into the
/// asset repository before any stack that uses it deploys.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerImageAsset {
    pub id: String,
    pub directory: PathBuf,
    pub repository_name: String,
    pub tag: String,
}

impl DockerImageAsset {
    /// An image staged in the environment's bootstrap asset repository,
    /// tagged with its id.
    pub fn staged(id: impl Into<String>, directory: impl Into<PathBuf>, account: &str, region: &str) -> Self {
        let id = id.into();
        Self {
            tag: id.clone(),
            id,
            directory: directory.into(),
            repository_name: asset_repository_name(account, region),
        }
    }

    /// `<account>.dkr.ecr.<region>.<suffix>/<repository>:<tag>`
    pub fn image_uri(&self) -> Value {
        Value::join(
            "",
            vec![
                Pseudo::AccountId.into(),
                ".dkr.ecr.".into(),
                Pseudo::Region.into(),
                ".".into(),
                Pseudo::UrlSuffix.into(),
                format!("/{}:{}", self.repository_name, self.tag).into(),
            ],
        )
    }
}

/// One deployable stack.
#[derive(Debug, Clone)]
pub struct StackArtifact {
    pub name: String,
    pub account: String,
    pub region: String,
    pub tags: BTreeMap<String, String>,
    pub template: Template,
    /// Stacks that must deploy first.
    pub depends_on: Vec<String>,
}

impl StackArtifact {
    pub fn template_file(&self, format: OutputFormat) -> String {
        format!("{}.template.{}", self.name, format.extension())
    }
}

/// Everything one synthesis produced.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub stacks: Vec<StackArtifact>,
    pub assets: Vec<DockerImageAsset>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Manifest<'a> {
    version: &'static str,
    artifacts: BTreeMap<&'a str, ManifestArtifact<'a>>,
    assets: &'a [DockerImageAsset],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestArtifact<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    environment: String,
    template_file: String,
    tags: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "no_dependencies")]
    dependencies: &'a [String],
}

fn no_dependencies(dependencies: &&[String]) -> bool {
    dependencies.is_empty()
}

impl Assembly {
    /// The stack a direct deployment starts from.
    pub fn primary(&self) -> Option<&StackArtifact> {
        self.stacks.first()
    }

    pub fn stack(&self, name: &str) -> Option<&StackArtifact> {
        self.stacks.iter().find(|s| s.name == name)
    }

    fn manifest(&self, format: OutputFormat) -> Manifest<'_> {
        let artifacts = self
            .stacks
            .iter()
            .map(|stack| {
                (
                    stack.name.as_str(),
                    ManifestArtifact {
                        kind: "aws:cloudformation:stack",
                        environment: format!("aws://{}/{}", stack.account, stack.region),
                        template_file: stack.template_file(format),
                        tags: &stack.tags,
                        dependencies: &stack.depends_on,
                    },
                )
            })
            .collect();

        Manifest {
            version: MANIFEST_VERSION,
            artifacts,
            assets: &self.assets,
        }
    }

    /// Write every template and the manifest into `dir`.
    ///
    /// All documents are rendered before the first file is written.
    pub fn write_to(&self, dir: &Path, format: OutputFormat) -> StackResult<Vec<PathBuf>> {
        let mut documents = Vec::with_capacity(self.stacks.len() + 1);
        for stack in &self.stacks {
            documents.push((stack.template_file(format), format.render(&stack.template)?));
        }
        documents.push((
            MANIFEST_FILE.to_string(),
            serde_json::to_string_pretty(&self.manifest(format))?,
        ));

        fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(documents.len());
        for (file, content) in documents {
            let path = dir.join(file);
            fs::write(&path, content)?;
            debug!("Wrote {}", path.display());
            written.push(path);
        }

        info!("Wrote {} stack(s) to {}", self.stacks.len(), dir.display());
        Ok(written)
    }
}
