//! The managed environment: composes sizing, storage, execution identity,
//! configuration options, and network placement into one declaration.

use airframe_types::{
    EndpointManagement, EnvironmentClass, LogType, LoggingConfiguration, PolicyStatement, RetentionDays, WebserverAccessMode,
};
use airframe_util::{arn_resource_name, attribute_token};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::context::DeploymentContext;
use crate::error::ConfigurationError;
use crate::maintenance::{MaintenanceWindow, validate_maintenance_window};
use crate::network::{NetworkConfiguration, NetworkProps, SecurityGroup, resolve_network};
use crate::options::{ConfigurationOptions, EmailBackendOptions, SecretsBackendOptions};
use crate::policy::{ExecutionRole, email_statements, secrets_statements};
use crate::sizing::Sizing;
use crate::storage::DagStorage;

pub const ENVIRONMENT_ID: &str = "MWAAEnvironment";

/// Inputs for [`Environment::new`].
#[derive(Debug, Clone)]
pub struct EnvironmentProps {
    pub name: String,
    pub airflow_version: String,
    pub airflow_configuration_options: IndexMap<String, Value>,
    pub dag_storage: DagStorage,
    pub network: NetworkProps,
    pub webserver_access_mode: Option<WebserverAccessMode>,
    pub endpoint_management: Option<EndpointManagement>,
    pub sizing: Sizing,
    pub kms_key: Option<String>,
    pub logging_configuration: Option<LoggingConfiguration>,
    pub weekly_maintenance_window_start: Option<String>,
    pub tags: IndexMap<String, String>,
    pub execution_role_name: Option<String>,
}

/// Values only known once the environment is provisioned, as attribute tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentAttributes {
    pub arn: String,
    pub celery_executor_queue: String,
    pub database_vpc_endpoint_service: String,
    pub webserver_url: String,
    pub webserver_vpc_endpoint_service: String,
    /// Log group ARN per log type, keyed by its logical name (e.g. `TaskLogs`).
    pub log_group_arns: IndexMap<String, String>,
}

impl EnvironmentAttributes {
    fn bind(logical_id: &str) -> Self {
        let log_group_arns = LogType::ALL
            .iter()
            .map(|log_type| {
                let logical_name = log_type.logical_name();
                let token = attribute_token(logical_id, &format!("LoggingConfiguration.{logical_name}.CloudWatchLogGroupArn"));
                (logical_name, token)
            })
            .collect();
        Self {
            arn: attribute_token(logical_id, "Arn"),
            celery_executor_queue: attribute_token(logical_id, "CeleryExecutorQueue"),
            database_vpc_endpoint_service: attribute_token(logical_id, "DatabaseVpcEndpointService"),
            webserver_url: attribute_token(logical_id, "WebserverUrl"),
            webserver_vpc_endpoint_service: attribute_token(logical_id, "WebserverVpcEndpointService"),
            log_group_arns,
        }
    }

    pub fn log_group_arn(&self, log_type: LogType) -> Option<&str> {
        self.log_group_arns.get(&log_type.logical_name()).map(String::as_str)
    }
}

/// Retention override for one of the environment's log groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRetention {
    pub logical_id: String,
    pub log_group_name: String,
    pub retention_in_days: RetentionDays,
}

/// How configuration options appear in the declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OptionsFormat {
    #[default]
    Structured,
    /// Every value rendered as a string.
    Flat,
}

/// The environment resource as handed to the provisioning mechanism.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentDeclaration {
    pub logical_id: String,
    pub name: String,
    pub airflow_version: String,
    pub airflow_configuration_options: IndexMap<String, Value>,
    pub execution_role_arn: String,
    pub source_bucket_arn: String,
    pub dag_s3_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins_s3_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins_s3_object_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements_s3_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements_s3_object_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_script_s3_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_script_s3_object_version: Option<String>,
    pub environment_class: EnvironmentClass,
    pub min_workers: u32,
    pub max_workers: u32,
    pub min_webservers: u32,
    pub max_webservers: u32,
    pub schedulers: u32,
    pub webserver_access_mode: WebserverAccessMode,
    pub network_configuration: NetworkConfiguration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_management: Option<EndpointManagement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kms_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging_configuration: Option<LoggingConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_maintenance_window_start: Option<MaintenanceWindow>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub tags: IndexMap<String, String>,
    /// Logical ids that must be provisioned before the environment.
    pub depends_on: Vec<String>,
}

/// A configured environment.
///
/// Construction validates every input; afterwards the configuration options and
/// the execution policy can still grow until [`Environment::declaration`] is read.
#[derive(Debug, Clone)]
pub struct Environment {
    name: String,
    context: DeploymentContext,
    airflow_version: String,
    dag_storage: DagStorage,
    sizing: Sizing,
    webserver_access_mode: WebserverAccessMode,
    endpoint_management: Option<EndpointManagement>,
    kms_key: Option<String>,
    logging_configuration: Option<LoggingConfiguration>,
    maintenance_window: Option<MaintenanceWindow>,
    tags: IndexMap<String, String>,
    options: ConfigurationOptions,
    execution_role: ExecutionRole,
    network: NetworkConfiguration,
    security_group: Option<SecurityGroup>,
    attributes: EnvironmentAttributes,
    log_retentions: Vec<LogRetention>,
}

impl Environment {
    pub fn new(context: &DeploymentContext, props: EnvironmentProps) -> Result<Self, ConfigurationError> {
        let EnvironmentProps {
            name,
            airflow_version,
            airflow_configuration_options,
            dag_storage,
            network,
            webserver_access_mode,
            endpoint_management,
            sizing,
            kms_key,
            logging_configuration,
            weekly_maintenance_window_start,
            tags,
            execution_role_name,
        } = props;

        if name.trim().is_empty() {
            return Err(ConfigurationError::EmptyEnvironmentName);
        }
        let maintenance_window = validate_maintenance_window(weekly_maintenance_window_start.as_deref())?;

        let options = ConfigurationOptions::merge(airflow_configuration_options);
        let execution_role = ExecutionRole::new(&name, execution_role_name, &dag_storage.bucket_arn(), context);
        let (network, security_group) = resolve_network(&network);
        let attributes = EnvironmentAttributes::bind(ENVIRONMENT_ID);
        let log_retentions = log_retentions(&attributes, logging_configuration.as_ref());

        info!(
            environment = %name,
            class = %sizing.environment_class(),
            statements = execution_role.policy.len(),
            retentions = log_retentions.len(),
            "configured environment"
        );

        Ok(Self {
            name,
            context: context.clone(),
            airflow_version,
            dag_storage,
            sizing,
            webserver_access_mode: webserver_access_mode.unwrap_or_default(),
            endpoint_management,
            kms_key,
            logging_configuration,
            maintenance_window,
            tags,
            options,
            execution_role,
            network,
            security_group,
            attributes,
            log_retentions,
        })
    }

    /// Look up connections and variables in the secrets store.
    ///
    /// Sets the backend options and grants secret reads under both prefixes.
    pub fn enable_secrets_backend(&mut self, options: Option<SecretsBackendOptions>) -> Result<(), ConfigurationError> {
        let options = options.unwrap_or_default();
        options.apply(&mut self.options);
        self.execution_role.policy.extend(secrets_statements(
            options.connections_prefix(),
            options.variables_prefix(),
            &self.context,
        ))?;
        debug!(environment = %self.name, "secrets backend enabled");
        Ok(())
    }

    /// Send notifications by email. Grants send-mail only for the default connection.
    pub fn enable_email_backend(&mut self, options: EmailBackendOptions) -> Result<(), ConfigurationError> {
        options.apply(&mut self.options);
        self.execution_role.policy.extend(email_statements(options.conn_id()))?;
        debug!(environment = %self.name, conn_id = options.conn_id(), "email backend enabled");
        Ok(())
    }

    /// Append a statement to the execution policy. Returns `false` if an identical one was present.
    pub fn add_to_role_policy(&mut self, statement: PolicyStatement) -> Result<bool, ConfigurationError> {
        self.execution_role.policy.append(statement)
    }

    pub fn set_airflow_configuration_option(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.options.set(key, value);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &DeploymentContext {
        &self.context
    }

    pub fn arn(&self) -> &str {
        &self.attributes.arn
    }

    pub fn attributes(&self) -> &EnvironmentAttributes {
        &self.attributes
    }

    pub fn sizing(&self) -> &Sizing {
        &self.sizing
    }

    pub fn dag_storage(&self) -> &DagStorage {
        &self.dag_storage
    }

    pub fn execution_role(&self) -> &ExecutionRole {
        &self.execution_role
    }

    pub fn configuration_options(&self) -> &ConfigurationOptions {
        &self.options
    }

    pub fn security_group(&self) -> Option<&SecurityGroup> {
        self.security_group.as_ref()
    }

    pub fn log_retentions(&self) -> &[LogRetention] {
        &self.log_retentions
    }

    /// Materialize the environment resource, reading the options as they are now.
    pub fn declaration(&self, format: OptionsFormat) -> EnvironmentDeclaration {
        let airflow_configuration_options = match format {
            OptionsFormat::Structured => self.options.materialize(),
            OptionsFormat::Flat => self
                .options
                .materialize_flat()
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect(),
        };

        let storage = &self.dag_storage;
        let mut depends_on = vec![storage.bucket.logical_id.clone()];
        depends_on.extend(storage.deployments.iter().map(|deployment| deployment.logical_id.clone()));
        depends_on.push(self.execution_role.logical_id.clone());

        debug!(environment = %self.name, options = airflow_configuration_options.len(), "materialized declaration");

        EnvironmentDeclaration {
            logical_id: ENVIRONMENT_ID.to_string(),
            name: self.name.clone(),
            airflow_version: self.airflow_version.clone(),
            airflow_configuration_options,
            execution_role_arn: self.execution_role.arn_token(),
            source_bucket_arn: storage.bucket_arn(),
            dag_s3_path: storage.dags.path.clone(),
            plugins_s3_path: storage.plugins.as_ref().map(|r| r.path.clone()),
            plugins_s3_object_version: storage.plugins.as_ref().and_then(|r| r.version.clone()),
            requirements_s3_path: storage.requirements.as_ref().map(|r| r.path.clone()),
            requirements_s3_object_version: storage.requirements.as_ref().and_then(|r| r.version.clone()),
            startup_script_s3_path: storage.startup_script.as_ref().map(|r| r.path.clone()),
            startup_script_s3_object_version: storage.startup_script.as_ref().and_then(|r| r.version.clone()),
            environment_class: self.sizing.environment_class(),
            min_workers: self.sizing.min_workers(),
            max_workers: self.sizing.max_workers(),
            min_webservers: self.sizing.min_webservers(),
            max_webservers: self.sizing.max_webservers(),
            schedulers: self.sizing.schedulers(),
            webserver_access_mode: self.webserver_access_mode,
            network_configuration: self.network.clone(),
            endpoint_management: self.endpoint_management,
            kms_key: self.kms_key.clone(),
            logging_configuration: self.logging_configuration.clone(),
            weekly_maintenance_window_start: self.maintenance_window.clone(),
            tags: self.tags.clone(),
            depends_on,
        }
    }
}

fn log_retentions(attributes: &EnvironmentAttributes, logging: Option<&LoggingConfiguration>) -> Vec<LogRetention> {
    let Some(logging) = logging else {
        return Vec::new();
    };
    LogType::ALL
        .iter()
        .filter_map(|log_type| {
            let retention = logging.retention(*log_type)?;
            let arn = attributes.log_group_arn(*log_type)?;
            // Retention binds to the group name, never the ARN.
            Some(LogRetention {
                logical_id: format!("{}LogRetention", log_type.logical_name()),
                log_group_name: arn_resource_name(arn),
                retention_in_days: retention,
            })
        })
        .collect()
}
