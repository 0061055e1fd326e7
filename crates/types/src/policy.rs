//! Permission statements and trust policies for execution identities.
//!
//! Statements serialize in the IAM policy-document shape (`Effect`, `Action`,
//! `Resource`, `NotResource`, `Condition`) so a declaration can be handed to the
//! provisioning mechanism without further translation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Condition operator (e.g. `StringLike`) to condition key to expected value.
pub type Conditions = IndexMap<String, IndexMap<String, ConditionValue>>;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Expected value of a condition key: a single string or a list of alternatives.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Single(String),
    List(Vec<String>),
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for ConditionValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for ConditionValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

/// One permission statement.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyStatement {
    #[serde(rename = "Effect")]
    pub effect: Effect,
    #[serde(rename = "Action")]
    pub actions: Vec<String>,
    #[serde(rename = "Resource", default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(rename = "NotResource", default, skip_serializing_if = "Vec::is_empty")]
    pub not_resources: Vec<String>,
    #[serde(rename = "Condition", default, skip_serializing_if = "IndexMap::is_empty")]
    pub conditions: Conditions,
}

impl PolicyStatement {
    pub fn new<I, S>(effect: Effect, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            effect,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: Vec::new(),
            not_resources: Vec::new(),
            conditions: IndexMap::new(),
        }
    }

    pub fn allow<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Effect::Allow, actions)
    }

    pub fn deny<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Effect::Deny, actions)
    }

    /// Scope the statement to the given resource patterns.
    pub fn on<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources.extend(resources.into_iter().map(Into::into));
        self
    }

    /// Scope the statement to everything except the given resource patterns.
    pub fn not_on<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.not_resources.extend(resources.into_iter().map(Into::into));
        self
    }

    /// Add a condition, e.g. `when("StringLike", "kms:ViaService", ...)`.
    pub fn when(mut self, operator: impl Into<String>, key: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        self.conditions.entry(operator.into()).or_default().insert(key.into(), value.into());
        self
    }
}

/// A service allowed to assume an identity, with the conditions it must satisfy.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipal {
    pub service: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub conditions: Conditions,
}

/// Which principals may assume an execution identity.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustPolicy {
    pub principals: Vec<ServicePrincipal>,
}

impl TrustPolicy {
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.principals.iter().map(|principal| principal.service.as_str())
    }
}
