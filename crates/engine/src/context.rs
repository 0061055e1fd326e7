//! Region and account the declaration is built for.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeploymentContext {
    pub region: String,
    pub account: String,
}

impl DeploymentContext {
    pub fn new(region: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account: account.into(),
        }
    }

    /// ARN of the environment named `name` in this region and account.
    pub fn environment_arn(&self, name: &str) -> String {
        format!("arn:aws:airflow:{}:{}:environment/{name}", self.region, self.account)
    }

    pub fn service_endpoint(&self, service: &str) -> String {
        format!("com.amazonaws.{}.{service}", self.region)
    }
}
