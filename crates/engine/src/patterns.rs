//! Ready-made environment layouts.

use airframe_types::{RemovalPolicy, WebserverAccessMode};
use indexmap::IndexMap;
use serde_json::Value;

use crate::context::DeploymentContext;
use crate::environment::{Environment, EnvironmentProps};
use crate::error::EngineError;
use crate::network::{NetworkProps, Vpc};
use crate::sizing::Sizing;
use crate::storage::{ConfigsOptions, DagStorage, DagStorageProps, DagsOptions};

#[derive(Debug, Clone, Default)]
pub struct PublicRoutingProps {
    pub environment_name: String,
    pub airflow_version: String,
    /// Defaults to the micro preset.
    pub sizing: Option<Sizing>,
    /// Existing placement. When absent a two-zone public/private VPC is declared.
    pub network: Option<NetworkProps>,
    pub bucket_name: Option<String>,
    pub dags_options: Option<DagsOptions>,
    pub configs_options: Option<ConfigsOptions>,
    pub airflow_configuration_options: IndexMap<String, Value>,
    pub removal_policy: Option<RemovalPolicy>,
}

/// A public-routing environment and the VPC declared for it, if any.
#[derive(Debug, Clone)]
pub struct PublicRouting {
    pub vpc: Option<Vpc>,
    pub environment: Environment,
}

/// Environment with a public webserver and secrets looked up in the secrets store.
pub fn public_routing_environment(context: &DeploymentContext, props: PublicRoutingProps) -> Result<PublicRouting, EngineError> {
    let (network, vpc) = match props.network {
        Some(network) => (network, None),
        None => {
            let vpc = Vpc::environment_default();
            (vpc.network_props(), Some(vpc))
        }
    };

    let dag_storage = DagStorage::new(DagStorageProps {
        bucket_name: props.bucket_name,
        dags_options: props.dags_options,
        configs_options: props.configs_options,
        removal_policy: props.removal_policy.unwrap_or_default(),
        ..Default::default()
    })?;

    let mut environment = Environment::new(
        context,
        EnvironmentProps {
            name: props.environment_name,
            airflow_version: props.airflow_version,
            airflow_configuration_options: props.airflow_configuration_options,
            dag_storage,
            network,
            webserver_access_mode: Some(WebserverAccessMode::PublicOnly),
            endpoint_management: None,
            sizing: props.sizing.unwrap_or_default(),
            kms_key: None,
            logging_configuration: None,
            weekly_maintenance_window_start: None,
            tags: IndexMap::new(),
            execution_role_name: None,
        },
    )?;
    environment.enable_secrets_backend(None)?;
    Ok(PublicRouting { vpc, environment })
}
