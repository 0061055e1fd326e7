//! Airflow pools managed through a custom resource.
//!
//! The declaration wires an external event handler to the environment's REST
//! API. [`plan_pool_request`] is the handler's decision table: given the event
//! type and whether the pool already exists, which REST call (if any) to make.

use std::fmt;
use std::str::FromStr;

use airframe_types::PolicyStatement;
use heck::ToUpperCamelCase;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::environment::{ENVIRONMENT_ID, Environment};
use crate::error::{ConfigurationError, PoolRequestError};

pub const DEFAULT_POOL_SLOTS: u32 = 3;
pub const DEFAULT_AIRFLOW_ROLE: &str = "Op";
pub const ACCEPTED_STATUS_CODES: [u16; 3] = [200, 201, 204];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AirflowPoolProps {
    pub pool_name: String,
    #[serde(default)]
    pub pool_slots: Option<u32>,
    #[serde(default)]
    pub pool_description: Option<String>,
    /// Airflow role the handler acts as.
    #[serde(default)]
    pub airflow_role: Option<String>,
}

impl AirflowPoolProps {
    pub fn new(pool_name: impl Into<String>) -> Self {
        Self {
            pool_name: pool_name.into(),
            pool_slots: None,
            pool_description: None,
            airflow_role: None,
        }
    }
}

/// Custom resource declaring one pool on an environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AirflowPool {
    pub logical_id: String,
    /// Properties handed to the event handler.
    pub properties: IndexMap<String, Value>,
    /// Grants of the handler's own identity.
    pub handler_policy: Vec<PolicyStatement>,
    pub physical_id: String,
    pub depends_on: Vec<String>,
}

impl AirflowPool {
    pub fn new(environment: &Environment, props: AirflowPoolProps) -> Result<Self, ConfigurationError> {
        let AirflowPoolProps {
            pool_name,
            pool_slots,
            pool_description,
            airflow_role,
        } = props;
        validate_pool_name(&pool_name)?;

        let env_name = environment.name();
        let ctx = environment.context();
        let role = airflow_role.as_deref().unwrap_or(DEFAULT_AIRFLOW_ROLE);

        let mut properties = IndexMap::new();
        properties.insert("MwaaEnvName".to_string(), Value::from(env_name));
        properties.insert("PoolName".to_string(), Value::from(pool_name.as_str()));
        properties.insert("PoolSlots".to_string(), Value::from(pool_slots.unwrap_or(DEFAULT_POOL_SLOTS)));
        properties.insert("PoolDescription".to_string(), Value::from(pool_description.unwrap_or_default()));

        let handler_policy = vec![
            PolicyStatement::allow(["airflow:InvokeRestApi"])
                .on([format!("arn:aws:airflow:{}:{}:role/{env_name}/{role}", ctx.region, ctx.account)]),
        ];

        debug!(environment = env_name, pool = %pool_name, "declared airflow pool");
        Ok(Self {
            logical_id: format!("AirflowPool{}", pool_name.to_upper_camel_case()),
            properties,
            handler_policy,
            physical_id: format!("{env_name}-{pool_name}"),
            depends_on: vec![ENVIRONMENT_ID.to_string()],
        })
    }

    pub fn pool_name(&self) -> Option<&str> {
        self.properties.get("PoolName").and_then(Value::as_str)
    }
}

fn validate_pool_name(name: &str) -> Result<(), ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidPool {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.trim().is_empty() {
        return Err(invalid("pool name must not be empty"));
    }
    if name.contains('/') {
        return Err(invalid("pool name must not contain '/'"));
    }
    Ok(())
}

/// Lifecycle event delivered to the handler.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl FromStr for RequestType {
    type Err = PoolRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Create" => Ok(Self::Create),
            "Update" => Ok(Self::Update),
            "Delete" => Ok(Self::Delete),
            other => Err(PoolRequestError::UnsupportedRequestType(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// One call against the environment's REST API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestRequest {
    pub method: HttpMethod,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Request that tells whether `pool_name` exists (200 yes, 404 no).
pub fn existence_probe(pool_name: &str) -> RestRequest {
    RestRequest {
        method: HttpMethod::Get,
        path: format!("/pools/{pool_name}"),
        body: None,
    }
}

/// Pool fields as the handler receives them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSpec {
    pub name: String,
    pub slots: u32,
    pub description: String,
}

/// Decide the REST call for an event. `Ok(None)` means nothing to do.
pub fn plan_pool_request(request_type: &str, pool: &PoolSpec, exists: bool) -> Result<Option<RestRequest>, PoolRequestError> {
    let method = match request_type.parse::<RequestType>()? {
        RequestType::Create if exists => return Err(PoolRequestError::AlreadyExists(pool.name.clone())),
        RequestType::Create => HttpMethod::Post,
        RequestType::Update if exists => HttpMethod::Patch,
        RequestType::Update => HttpMethod::Post,
        RequestType::Delete if !exists => {
            info!(pool = %pool.name, "pool does not exist, skipping delete");
            return Ok(None);
        }
        RequestType::Delete => HttpMethod::Delete,
    };

    let path = match method {
        HttpMethod::Post => "/pools".to_string(),
        _ => format!("/pools/{}", pool.name),
    };
    let body = (method != HttpMethod::Delete).then(|| {
        json!({
            "name": pool.name,
            "slots": pool.slots,
            "description": pool.description,
        })
    });
    Ok(Some(RestRequest { method, path, body }))
}

/// Accept only the success codes the pool API returns.
pub fn check_response_status(status: u16) -> Result<(), PoolRequestError> {
    if ACCEPTED_STATUS_CODES.contains(&status) {
        Ok(())
    } else {
        Err(PoolRequestError::UnexpectedStatus(status))
    }
}
