//! Runtime configuration options and the two backend extensions that write into them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::policy::DEFAULT_CONNECTION_ID;

pub const CATCHUP_BY_DEFAULT_KEY: &str = "scheduler.catchup_by_default";

pub const SECRETS_BACKEND_KEY: &str = "secrets.backend";
pub const SECRETS_BACKEND_KWARGS_KEY: &str = "secrets.backend_kwargs";
pub const SECRETS_MANAGER_BACKEND: &str = "airflow.providers.amazon.aws.secrets.secrets_manager.SecretsManagerBackend";

pub const EMAIL_BACKEND_KEY: &str = "email.email_backend";
pub const EMAIL_FROM_KEY: &str = "email.from_email";
pub const EMAIL_CONN_ID_KEY: &str = "email.conn_id";
pub const SES_EMAIL_BACKEND: &str = "airflow.providers.amazon.aws.utils.emailer.send_email";

pub const DEFAULT_CONNECTIONS_PREFIX: &str = "airflow/connections";
pub const DEFAULT_VARIABLES_PREFIX: &str = "airflow/variables";
/// Hides the platform connection from secret lookups.
pub const DEFAULT_CONNECTIONS_LOOKUP_PATTERN: &str = "^(?!aws_default$).*$";

/// Dotted option key to value, e.g. `core.default_timezone`.
///
/// Precedence is default < constructor overrides < later `set` calls. The map is
/// read through [`ConfigurationOptions::materialize`], so every write made before
/// that call is visible in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConfigurationOptions {
    entries: IndexMap<String, Value>,
}

impl Default for ConfigurationOptions {
    fn default() -> Self {
        let mut entries = IndexMap::new();
        entries.insert(CATCHUP_BY_DEFAULT_KEY.to_string(), Value::Bool(false));
        Self { entries }
    }
}

impl ConfigurationOptions {
    /// Defaults overlaid with `overrides`; an override wins on key collision.
    pub fn merge(overrides: IndexMap<String, Value>) -> Self {
        let mut options = Self::default();
        for (key, value) in overrides {
            options.set(key, value);
        }
        options
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        debug!(key = %key, value = %value, "set configuration option");
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the current options.
    pub fn materialize(&self) -> IndexMap<String, Value> {
        self.entries.clone()
    }

    /// Snapshot with every value rendered as a string, for targets that only take flat strings.
    pub fn materialize_flat(&self) -> IndexMap<String, String> {
        self.entries
            .iter()
            .map(|(key, value)| (key.clone(), stringify(value)))
            .collect()
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Secret lookup prefixes and patterns. Unset fields take the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecretsBackendOptions {
    #[serde(default)]
    pub connections_prefix: Option<String>,
    #[serde(default)]
    pub connections_lookup_pattern: Option<String>,
    #[serde(default)]
    pub variables_prefix: Option<String>,
    #[serde(default)]
    pub variables_lookup_pattern: Option<String>,
}

impl SecretsBackendOptions {
    pub fn connections_prefix(&self) -> &str {
        self.connections_prefix.as_deref().unwrap_or(DEFAULT_CONNECTIONS_PREFIX)
    }

    pub fn connections_lookup_pattern(&self) -> &str {
        self.connections_lookup_pattern
            .as_deref()
            .unwrap_or(DEFAULT_CONNECTIONS_LOOKUP_PATTERN)
    }

    pub fn variables_prefix(&self) -> &str {
        self.variables_prefix.as_deref().unwrap_or(DEFAULT_VARIABLES_PREFIX)
    }

    /// JSON keyword arguments handed to the backend class.
    pub fn backend_kwargs(&self) -> String {
        let mut kwargs = Map::new();
        kwargs.insert("connections_prefix".into(), self.connections_prefix().into());
        kwargs.insert("connections_lookup_pattern".into(), self.connections_lookup_pattern().into());
        kwargs.insert("variables_prefix".into(), self.variables_prefix().into());
        if let Some(pattern) = &self.variables_lookup_pattern {
            kwargs.insert("variables_lookup_pattern".into(), pattern.as_str().into());
        }
        Value::Object(kwargs).to_string()
    }

    pub fn apply(&self, options: &mut ConfigurationOptions) {
        options.set(SECRETS_BACKEND_KEY, SECRETS_MANAGER_BACKEND);
        options.set(SECRETS_BACKEND_KWARGS_KEY, self.backend_kwargs());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EmailBackendOptions {
    pub from_email: String,
    #[serde(default)]
    pub conn_id: Option<String>,
}

impl EmailBackendOptions {
    pub fn new(from_email: impl Into<String>) -> Self {
        Self {
            from_email: from_email.into(),
            conn_id: None,
        }
    }

    pub fn conn_id(&self) -> &str {
        self.conn_id.as_deref().unwrap_or(DEFAULT_CONNECTION_ID)
    }

    pub fn apply(&self, options: &mut ConfigurationOptions) {
        options.set(EMAIL_BACKEND_KEY, SES_EMAIL_BACKEND);
        options.set(EMAIL_FROM_KEY, self.from_email.as_str());
        options.set(EMAIL_CONN_ID_KEY, self.conn_id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_catchup_is_disabled_unless_overridden() {
        let options = ConfigurationOptions::merge(IndexMap::new());
        assert_eq!(options.get(CATCHUP_BY_DEFAULT_KEY), Some(&json!(false)));

        let mut overrides = IndexMap::new();
        overrides.insert(CATCHUP_BY_DEFAULT_KEY.to_string(), json!(true));
        overrides.insert("core.default_timezone".to_string(), json!("utc"));
        let options = ConfigurationOptions::merge(overrides);
        assert_eq!(options.get(CATCHUP_BY_DEFAULT_KEY), Some(&json!(true)));
        assert_eq!(options.len(), 2);
    }

    #[test]
    fn setters_before_materialize_are_visible() {
        let mut options = ConfigurationOptions::default();
        let before = options.materialize();
        options.set("webserver.expose_config", true);
        assert!(!before.contains_key("webserver.expose_config"));
        assert_eq!(options.materialize()["webserver.expose_config"], json!(true));
    }

    #[test]
    fn flat_snapshot_stringifies_values() {
        let mut options = ConfigurationOptions::default();
        options.set("celery.worker_autoscale", 5);
        options.set("core.default_timezone", "utc");
        let flat = options.materialize_flat();
        assert_eq!(flat[CATCHUP_BY_DEFAULT_KEY], "false");
        assert_eq!(flat["celery.worker_autoscale"], "5");
        assert_eq!(flat["core.default_timezone"], "utc");
    }

    #[test]
    fn secrets_backend_defaults() {
        let mut options = ConfigurationOptions::default();
        SecretsBackendOptions::default().apply(&mut options);
        assert_eq!(options.get(SECRETS_BACKEND_KEY), Some(&json!(SECRETS_MANAGER_BACKEND)));

        let kwargs: Value = serde_json::from_str(options.get(SECRETS_BACKEND_KWARGS_KEY).and_then(Value::as_str).unwrap()).unwrap();
        assert_eq!(
            kwargs,
            json!({
                "connections_prefix": "airflow/connections",
                "connections_lookup_pattern": "^(?!aws_default$).*$",
                "variables_prefix": "airflow/variables",
            })
        );
    }

    #[test]
    fn secrets_backend_twice_keeps_keys_and_last_write_wins() {
        let mut options = ConfigurationOptions::default();
        SecretsBackendOptions::default().apply(&mut options);
        let custom = SecretsBackendOptions {
            variables_prefix: Some("team/variables".into()),
            variables_lookup_pattern: Some("^team_.*$".into()),
            ..Default::default()
        };
        custom.apply(&mut options);

        assert!(options.contains_key(SECRETS_BACKEND_KEY));
        let kwargs: Value = serde_json::from_str(options.get(SECRETS_BACKEND_KWARGS_KEY).and_then(Value::as_str).unwrap()).unwrap();
        assert_eq!(kwargs["variables_prefix"], json!("team/variables"));
        assert_eq!(kwargs["variables_lookup_pattern"], json!("^team_.*$"));
        assert_eq!(kwargs["connections_prefix"], json!("airflow/connections"));
    }

    #[test]
    fn email_backend_defaults_connection() {
        let mut options = ConfigurationOptions::default();
        EmailBackendOptions::new("airflow@example.com").apply(&mut options);
        assert_eq!(options.get(EMAIL_BACKEND_KEY), Some(&json!(SES_EMAIL_BACKEND)));
        assert_eq!(options.get(EMAIL_FROM_KEY), Some(&json!("airflow@example.com")));
        assert_eq!(options.get(EMAIL_CONN_ID_KEY), Some(&json!("aws_default")));
    }
}
