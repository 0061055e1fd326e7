//! Storage for workflow artifacts: the bucket declaration, canonical object
//! paths for each artifact kind, and the requirements constraints gate.

use std::fs;
use std::path::{Path, PathBuf};

use airframe_types::RemovalPolicy;
use airframe_util::{attribute_token, join_object_key, normalize_prefix};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PolicyViolation;

pub const STORAGE_BUCKET_ID: &str = "DagStorageBucket";
pub const DEFAULT_DAGS_PATH: &str = "dags/";

/// Substring a requirements file must contain to show it installs against the
/// upstream Airflow constraints file for its version.
pub const CONSTRAINTS_MARKER: &str = "--constraint \"https://raw.githubusercontent.com/apache/airflow/constraints-";

/// Options for uploading a local directory into the bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeployOptions {
    /// Glob patterns left out of the upload.
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub retain_on_delete: Option<bool>,
    /// Remove objects under the destination prefix that are not in the source.
    #[serde(default)]
    pub prune: Option<bool>,
}

/// Where workflow definitions live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DagsOptions {
    #[serde(default = "default_dags_path")]
    pub s3_path: String,
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    #[serde(default)]
    pub deploy_options: Option<DeployOptions>,
}

fn default_dags_path() -> String {
    DEFAULT_DAGS_PATH.to_string()
}

impl Default for DagsOptions {
    fn default() -> Self {
        Self {
            s3_path: default_dags_path(),
            local_path: None,
            deploy_options: None,
        }
    }
}

/// A single file in the configs prefix, optionally pinned to an object version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ArtifactDescriptor {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl ArtifactDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Plugins, requirements, and startup script sharing one prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigsOptions {
    #[serde(default)]
    pub s3_prefix: String,
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    #[serde(default)]
    pub requirements: Option<ArtifactDescriptor>,
    #[serde(default)]
    pub plugins: Option<ArtifactDescriptor>,
    #[serde(default)]
    pub startup_script: Option<ArtifactDescriptor>,
    #[serde(default)]
    pub deploy_options: Option<DeployOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DagStorageProps {
    #[serde(default)]
    pub bucket_name: Option<String>,
    #[serde(default)]
    pub versioned: bool,
    /// Expire non-current object versions after this many days (versioned buckets only).
    #[serde(default)]
    pub noncurrent_version_expiration_days: Option<u32>,
    #[serde(default)]
    pub removal_policy: RemovalPolicy,
    #[serde(default)]
    pub dags_options: Option<DagsOptions>,
    #[serde(default)]
    pub configs_options: Option<ConfigsOptions>,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactKind {
    Dags,
    Plugins,
    Requirements,
    StartupScript,
}

/// Resolved object path of one artifact kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactReference {
    pub kind: ArtifactKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Resolve the path of `kind` under `prefix`.
///
/// Without a descriptor the artifact is absent: no path and no version.
pub fn resolve_artifact(kind: ArtifactKind, prefix: &str, descriptor: Option<&ArtifactDescriptor>) -> Option<ArtifactReference> {
    let descriptor = descriptor?;
    Some(ArtifactReference {
        kind,
        path: join_object_key(prefix, &descriptor.name),
        version: descriptor.version.clone(),
    })
}

/// Whether requirements text pins installs to the upstream constraints file.
pub fn has_constraints_marker(content: &str) -> bool {
    content.contains(CONSTRAINTS_MARKER)
}

/// Read the local requirements file and refuse it unless it carries the constraints marker.
///
/// A file that cannot be read fails the check.
pub fn check_requirements_constraints(path: &Path) -> Result<(), PolicyViolation> {
    let content = fs::read_to_string(path).map_err(|source| PolicyViolation::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    if !has_constraints_marker(&content) {
        return Err(PolicyViolation::MissingConstraints {
            path: path.to_path_buf(),
            marker: CONSTRAINTS_MARKER,
        });
    }
    debug!(path = %path.display(), "requirements file pins upstream constraints");
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRule {
    pub id: String,
    pub noncurrent_version_expiration_days: u32,
}

/// Bucket holding every workflow artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageBucket {
    pub logical_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
    pub versioned: bool,
    pub encryption: String,
    pub bucket_key_enabled: bool,
    pub block_public_access: String,
    pub removal_policy: RemovalPolicy,
    pub auto_delete_objects: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lifecycle_rules: Vec<LifecycleRule>,
}

impl StorageBucket {
    fn new(props: &DagStorageProps) -> Self {
        let lifecycle_rules = match (props.versioned, props.noncurrent_version_expiration_days) {
            (true, Some(days)) => vec![LifecycleRule {
                id: "DeleteOldVersions".to_string(),
                noncurrent_version_expiration_days: days,
            }],
            _ => Vec::new(),
        };
        Self {
            logical_id: STORAGE_BUCKET_ID.to_string(),
            bucket_name: props.bucket_name.clone(),
            versioned: props.versioned,
            encryption: "S3_MANAGED".to_string(),
            bucket_key_enabled: true,
            block_public_access: "BLOCK_ALL".to_string(),
            removal_policy: props.removal_policy,
            auto_delete_objects: props.removal_policy == RemovalPolicy::Destroy,
            lifecycle_rules,
        }
    }

    /// ARN of the bucket, or an attribute token when the name is left to the provisioner.
    pub fn arn(&self) -> String {
        match &self.bucket_name {
            Some(name) => format!("arn:aws:s3:::{name}"),
            None => attribute_token(&self.logical_id, "Arn"),
        }
    }
}

/// Upload of a local directory into the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketDeployment {
    pub logical_id: String,
    pub source: PathBuf,
    pub destination_key_prefix: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    pub retain_on_delete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prune: Option<bool>,
}

impl BucketDeployment {
    fn new(logical_id: &str, source: &Path, prefix: &str, options: Option<&DeployOptions>) -> Self {
        Self {
            logical_id: logical_id.to_string(),
            source: source.to_path_buf(),
            destination_key_prefix: prefix.to_string(),
            exclude: options.map(|o| o.exclude.clone()).unwrap_or_default(),
            retain_on_delete: options.and_then(|o| o.retain_on_delete).unwrap_or(false),
            prune: options.and_then(|o| o.prune),
        }
    }
}

/// Resolved storage declaration for an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DagStorage {
    pub bucket: StorageBucket,
    pub dags: ArtifactReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins: Option<ArtifactReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<ArtifactReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_script: Option<ArtifactReference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deployments: Vec<BucketDeployment>,
}

impl DagStorage {
    /// Resolve paths for every artifact kind and run the requirements gate.
    ///
    /// The gate only runs when the requirements file is available locally
    /// (a `localPath` on the configs options and a requirements descriptor).
    pub fn new(props: DagStorageProps) -> Result<Self, PolicyViolation> {
        let bucket = StorageBucket::new(&props);
        let dags_options = props.dags_options.clone().unwrap_or_default();
        let configs = props.configs_options.clone().unwrap_or_default();

        let dags = ArtifactReference {
            kind: ArtifactKind::Dags,
            path: normalize_prefix(&dags_options.s3_path),
            version: None,
        };
        let plugins = resolve_artifact(ArtifactKind::Plugins, &configs.s3_prefix, configs.plugins.as_ref());
        let requirements = resolve_artifact(ArtifactKind::Requirements, &configs.s3_prefix, configs.requirements.as_ref());
        let startup_script = resolve_artifact(ArtifactKind::StartupScript, &configs.s3_prefix, configs.startup_script.as_ref());

        match (&configs.local_path, &configs.requirements) {
            (Some(local_dir), Some(descriptor)) => check_requirements_constraints(&local_dir.join(&descriptor.name))?,
            _ => debug!("requirements not available locally; constraints check skipped"),
        }

        let mut deployments = Vec::new();
        if let Some(local_path) = &dags_options.local_path {
            deployments.push(BucketDeployment::new(
                "DagsDeployment",
                local_path,
                &dags.path,
                dags_options.deploy_options.as_ref(),
            ));
        }
        if let Some(local_path) = &configs.local_path {
            deployments.push(BucketDeployment::new(
                "ConfigsDeployment",
                local_path,
                &normalize_prefix(&configs.s3_prefix),
                configs.deploy_options.as_ref(),
            ));
        }

        info!(
            bucket = %bucket.arn(),
            dags = %dags.path,
            plugins = plugins.as_ref().map(|r| r.path.as_str()).unwrap_or("-"),
            requirements = requirements.as_ref().map(|r| r.path.as_str()).unwrap_or("-"),
            startup_script = startup_script.as_ref().map(|r| r.path.as_str()).unwrap_or("-"),
            "resolved artifact storage"
        );

        Ok(Self {
            bucket,
            dags,
            plugins,
            requirements,
            startup_script,
            deployments,
        })
    }

    pub fn bucket_arn(&self) -> String {
        self.bucket.arn()
    }

    pub fn artifact(&self, kind: ArtifactKind) -> Option<&ArtifactReference> {
        match kind {
            ArtifactKind::Dags => Some(&self.dags),
            ArtifactKind::Plugins => self.plugins.as_ref(),
            ArtifactKind::Requirements => self.requirements.as_ref(),
            ArtifactKind::StartupScript => self.startup_script.as_ref(),
        }
    }
}
