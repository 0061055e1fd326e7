//! Environment manifests: one YAML or JSON file describing a deployment.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use airframe_types::{EndpointManagement, EnvironmentClass, LoggingConfiguration, PolicyStatement, WebserverAccessMode};
use airframe_util::expand_tilde;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::context::DeploymentContext;
use crate::environment::{Environment, EnvironmentAttributes, EnvironmentDeclaration, EnvironmentProps, LogRetention, OptionsFormat};
use crate::error::{ConfigurationError, EngineError};
use crate::network::{NetworkProps, SecurityGroup, Vpc, VpcProps};
use crate::options::{EmailBackendOptions, SecretsBackendOptions};
use crate::policy::ExecutionRole;
use crate::pool::{AirflowPool, AirflowPoolProps};
use crate::sizing::{Sizing, SizingProps};
use crate::storage::{DagStorage, DagStorageProps};

pub const MANIFEST_PATH_ENV: &str = "AIRFRAME_MANIFEST_PATH";
pub const DEFAULT_MANIFEST_FILE: &str = "airframe.yaml";

/// Manifest path from `AIRFRAME_MANIFEST_PATH`, else `./airframe.yaml`.
pub fn default_manifest_path() -> PathBuf {
    if let Ok(path) = env::var(MANIFEST_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }
    PathBuf::from(DEFAULT_MANIFEST_FILE)
}

/// Requested sizing. Counts left out take the class preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SizingSpec {
    pub environment_class: EnvironmentClass,
    #[serde(default)]
    pub min_workers: Option<u32>,
    #[serde(default)]
    pub max_workers: Option<u32>,
    #[serde(default)]
    pub min_webservers: Option<u32>,
    #[serde(default)]
    pub max_webservers: Option<u32>,
    #[serde(default)]
    pub schedulers: Option<u32>,
}

impl SizingSpec {
    pub fn props(&self) -> SizingProps {
        let preset = SizingProps::preset(self.environment_class);
        SizingProps {
            environment_class: self.environment_class,
            min_workers: self.min_workers.unwrap_or(preset.min_workers),
            max_workers: self.max_workers.unwrap_or(preset.max_workers),
            min_webservers: self.min_webservers.unwrap_or(preset.min_webservers),
            max_webservers: self.max_webservers.unwrap_or(preset.max_webservers),
            schedulers: self.schedulers.unwrap_or(preset.schedulers),
        }
    }

    pub fn validate(&self) -> Result<Sizing, ConfigurationError> {
        Sizing::custom(self.props())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnvironmentSpec {
    pub name: String,
    pub airflow_version: String,
    #[serde(default)]
    pub airflow_configuration_options: IndexMap<String, Value>,
    #[serde(default)]
    pub webserver_access_mode: Option<WebserverAccessMode>,
    #[serde(default)]
    pub endpoint_management: Option<EndpointManagement>,
    /// Defaults to the micro preset.
    #[serde(default)]
    pub sizing: Option<SizingSpec>,
    #[serde(default)]
    pub kms_key: Option<String>,
    #[serde(default)]
    pub logging_configuration: Option<LoggingConfiguration>,
    #[serde(default)]
    pub weekly_maintenance_window_start: Option<String>,
    #[serde(default)]
    pub tags: IndexMap<String, String>,
    #[serde(default)]
    pub execution_role_name: Option<String>,
}

/// One deployment: where, what storage, which environment, and its extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Manifest {
    pub context: DeploymentContext,
    #[serde(default)]
    pub storage: DagStorageProps,
    /// Existing placement. Without it a VPC is declared from `vpc` (public routing by default).
    #[serde(default)]
    pub network: Option<NetworkProps>,
    #[serde(default)]
    pub vpc: Option<VpcProps>,
    pub environment: EnvironmentSpec,
    /// Present (even empty) to enable the secrets backend.
    #[serde(default)]
    pub secrets_backend: Option<SecretsBackendOptions>,
    #[serde(default)]
    pub email_backend: Option<EmailBackendOptions>,
    /// Extra statements for the execution policy.
    #[serde(default)]
    pub permissions: Vec<PolicyStatement>,
    #[serde(default)]
    pub pools: Vec<AirflowPoolProps>,
}

impl Manifest {
    /// Parse manifest text. JSON when `is_json`, YAML otherwise.
    pub fn parse(content: &str, is_json: bool) -> Result<Self> {
        let manifest = if is_json {
            serde_json::from_str(content).context("Failed to parse manifest as JSON")?
        } else {
            serde_yaml::from_str(content).context("Failed to parse manifest as YAML")?
        };
        Ok(manifest)
    }

    /// Resolve relative local paths against `base_dir`.
    pub fn resolve_local_paths(&mut self, base_dir: &Path) {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        };
        if let Some(local_path) = self.storage.dags_options.as_mut().and_then(|o| o.local_path.as_mut()) {
            rebase(local_path);
        }
        if let Some(local_path) = self.storage.configs_options.as_mut().and_then(|o| o.local_path.as_mut()) {
            rebase(local_path);
        }
    }

    /// Run every validator and assemble the deployment. Nothing is built if any check fails.
    pub fn build(&self) -> Result<Deployment, EngineError> {
        let sizing = match &self.environment.sizing {
            Some(spec) => spec.validate()?,
            None => Sizing::default(),
        };
        let dag_storage = DagStorage::new(self.storage.clone())?;
        let (network, vpc) = match (&self.network, &self.vpc) {
            (Some(_), Some(_)) => return Err(ConfigurationError::NetworkConflict.into()),
            (Some(network), None) => (network.clone(), None),
            (None, vpc_props) => {
                let vpc = Vpc::new(&self.context, &vpc_props.clone().unwrap_or_default())?;
                (vpc.network_props(), Some(vpc))
            }
        };

        let spec = &self.environment;
        let mut environment = Environment::new(
            &self.context,
            EnvironmentProps {
                name: spec.name.clone(),
                airflow_version: spec.airflow_version.clone(),
                airflow_configuration_options: spec.airflow_configuration_options.clone(),
                dag_storage,
                network,
                webserver_access_mode: spec.webserver_access_mode,
                endpoint_management: spec.endpoint_management,
                sizing,
                kms_key: spec.kms_key.clone(),
                logging_configuration: spec.logging_configuration.clone(),
                weekly_maintenance_window_start: spec.weekly_maintenance_window_start.clone(),
                tags: spec.tags.clone(),
                execution_role_name: spec.execution_role_name.clone(),
            },
        )?;

        if let Some(options) = &self.secrets_backend {
            environment.enable_secrets_backend(Some(options.clone()))?;
        }
        if let Some(options) = &self.email_backend {
            environment.enable_email_backend(options.clone())?;
        }
        for statement in &self.permissions {
            environment.add_to_role_policy(statement.clone())?;
        }

        let pools = self
            .pools
            .iter()
            .map(|props| AirflowPool::new(&environment, props.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(environment = environment.name(), pools = pools.len(), "assembled deployment");
        Ok(Deployment { vpc, environment, pools })
    }
}

/// Load a manifest from disk, resolving relative local paths against its directory.
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let mut manifest = Manifest::parse(&content, is_json).with_context(|| format!("Invalid manifest: {}", path.display()))?;
    if let Some(base_dir) = path.parent() {
        manifest.resolve_local_paths(base_dir);
    }
    info!(path = %path.display(), environment = %manifest.environment.name, "loaded manifest");
    Ok(manifest)
}

/// A built environment and the pools declared on it.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub vpc: Option<Vpc>,
    pub environment: Environment,
    pub pools: Vec<AirflowPool>,
}

impl Deployment {
    /// Materialize every declaration for the provisioning mechanism.
    pub fn synthesize(&self, format: OptionsFormat) -> SynthesizedStack {
        let environment = &self.environment;
        SynthesizedStack {
            vpc: self.vpc.clone(),
            storage: environment.dag_storage().clone(),
            execution_role: environment.execution_role().clone(),
            security_group: environment.security_group().cloned(),
            environment: environment.declaration(format),
            attributes: environment.attributes().clone(),
            log_retentions: environment.log_retentions().to_vec(),
            pools: self.pools.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizedStack {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc: Option<Vpc>,
    pub storage: DagStorage,
    pub execution_role: ExecutionRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_group: Option<SecurityGroup>,
    pub environment: EnvironmentDeclaration,
    pub attributes: EnvironmentAttributes,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub log_retentions: Vec<LogRetention>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pools: Vec<AirflowPool>,
}
