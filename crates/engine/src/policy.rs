//! Execution identity: baseline permission set, trust policy, and extension statements.

use airframe_types::{Conditions, Effect, PolicyStatement, ServicePrincipal, TrustPolicy};
use serde::Serialize;
use tracing::debug;

use crate::context::DeploymentContext;
use crate::error::ConfigurationError;

pub const EXECUTION_ROLE_ID: &str = "MWAAExecutionRole";
pub const EXECUTION_ROLE_PATH: &str = "/service-role/";
pub const INLINE_POLICY_NAME: &str = "mwaaExecutionPolicy";

/// Connection id the platform provisions for the runtime's own identity.
pub const DEFAULT_CONNECTION_ID: &str = "aws_default";

const TRUSTED_SERVICES: [&str; 2] = ["airflow.amazonaws.com", "airflow-env.amazonaws.com"];

/// Ordered, append-only permission statements for one execution identity.
///
/// Appending a statement identical to one already held is a no-op, so repeated
/// extension calls never duplicate grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExecutionPolicy {
    statements: Vec<PolicyStatement>,
}

impl ExecutionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append after validating the statement's shape. Returns `true` if it was new.
    pub fn append(&mut self, statement: PolicyStatement) -> Result<bool, ConfigurationError> {
        validate_statement(&statement)?;
        if self.statements.contains(&statement) {
            debug!(actions = ?statement.actions, "permission statement already present; skipped");
            return Ok(false);
        }
        self.statements.push(statement);
        Ok(true)
    }

    pub fn extend<I>(&mut self, statements: I) -> Result<(), ConfigurationError>
    where
        I: IntoIterator<Item = PolicyStatement>,
    {
        for statement in statements {
            self.append(statement)?;
        }
        Ok(())
    }

    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Whether any statement with `effect` grants `action`.
    pub fn grants(&self, effect: Effect, action: &str) -> bool {
        self.statements
            .iter()
            .any(|statement| statement.effect == effect && statement.actions.iter().any(|a| a == action))
    }
}

/// A statement needs at least one action and exactly one of resources or not-resources.
pub fn validate_statement(statement: &PolicyStatement) -> Result<(), ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidStatement { reason: reason.to_string() };
    if statement.actions.is_empty() || statement.actions.iter().any(|action| action.trim().is_empty()) {
        return Err(invalid("at least one non-empty action is required"));
    }
    match (statement.resources.is_empty(), statement.not_resources.is_empty()) {
        (true, true) => Err(invalid("either Resource or NotResource must be set")),
        (false, false) => Err(invalid("Resource and NotResource cannot both be set")),
        _ => Ok(()),
    }
}

/// Fixed statements every environment's identity starts with.
pub fn baseline_statements(environment_name: &str, bucket_arn: &str, ctx: &DeploymentContext) -> Vec<PolicyStatement> {
    let DeploymentContext { region, account } = ctx;
    vec![
        PolicyStatement::allow(["airflow:PublishMetrics"]).on([ctx.environment_arn(environment_name)]),
        PolicyStatement::deny(["s3:ListAllMyBuckets"]).on(["*"]),
        PolicyStatement::allow(["s3:GetObject*", "s3:GetBucket*", "s3:List*"]).on([bucket_arn.to_string(), format!("{bucket_arn}/*")]),
        PolicyStatement::allow([
            "logs:CreateLogStream",
            "logs:CreateLogGroup",
            "logs:PutLogEvents",
            "logs:GetLogEvents",
            "logs:GetLogRecord",
            "logs:GetLogGroupFields",
            "logs:GetQueryResults",
        ])
        .on([format!("arn:aws:logs:{region}:{account}:log-group:airflow-{environment_name}-*")]),
        PolicyStatement::allow(["cloudwatch:PutMetricData"]).on(["*"]),
        PolicyStatement::allow([
            "sqs:ChangeMessageVisibility",
            "sqs:DeleteMessage",
            "sqs:GetQueueAttributes",
            "sqs:ReceiveMessage",
        ])
        .on([format!("arn:aws:sqs:{region}:*:airflow-celery-*")]),
        PolicyStatement::allow(["kms:Decrypt", "kms:DescribeKey", "kms:GenerateDataKey*", "kms:Encrypt"])
            .not_on([format!("arn:aws:kms:*:{account}:key/*")])
            .when("StringLike", "kms:ViaService", vec![format!("sqs.{region}.amazonaws.com")]),
    ]
}

/// Trust policy letting the managed service assume the identity for this environment only.
pub fn trust_policy(environment_name: &str, ctx: &DeploymentContext) -> TrustPolicy {
    let principals = TRUSTED_SERVICES
        .iter()
        .map(|service| {
            let mut conditions = Conditions::new();
            conditions
                .entry("ArnLike".to_string())
                .or_default()
                .insert("aws:SourceArn".to_string(), ctx.environment_arn(environment_name).into());
            conditions
                .entry("StringEquals".to_string())
                .or_default()
                .insert("aws:SourceAccount".to_string(), ctx.account.clone().into());
            ServicePrincipal {
                service: service.to_string(),
                conditions,
            }
        })
        .collect();
    TrustPolicy { principals }
}

/// Secret reads under the connection and variable prefixes, plus listing.
pub fn secrets_statements(connections_prefix: &str, variables_prefix: &str, ctx: &DeploymentContext) -> Vec<PolicyStatement> {
    let DeploymentContext { region, account } = ctx;
    vec![
        PolicyStatement::allow([
            "secretsmanager:GetResourcePolicy",
            "secretsmanager:GetSecretValue",
            "secretsmanager:DescribeSecret",
            "secretsmanager:ListSecretVersionIds",
        ])
        .on([
            format!("arn:aws:secretsmanager:{region}:{account}:secret:{connections_prefix}/*"),
            format!("arn:aws:secretsmanager:{region}:{account}:secret:{variables_prefix}/*"),
        ]),
        PolicyStatement::allow(["secretsmanager:ListSecrets"]).on(["*"]),
    ]
}

/// Send-mail grant, only needed when mail goes out through the runtime's own identity.
pub fn email_statements(conn_id: &str) -> Vec<PolicyStatement> {
    if conn_id == DEFAULT_CONNECTION_ID {
        vec![PolicyStatement::allow(["ses:SendEmail"]).on(["*"])]
    } else {
        Vec::new()
    }
}

/// Identity the environment runs as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRole {
    pub logical_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    pub path: String,
    pub assumed_by: TrustPolicy,
    pub policy_name: String,
    pub policy: ExecutionPolicy,
}

impl ExecutionRole {
    /// Role carrying the baseline statements for `environment_name`.
    pub fn new(environment_name: &str, role_name: Option<String>, bucket_arn: &str, ctx: &DeploymentContext) -> Self {
        let mut policy = ExecutionPolicy::new();
        for statement in baseline_statements(environment_name, bucket_arn, ctx) {
            debug_assert!(validate_statement(&statement).is_ok());
            if !policy.statements.contains(&statement) {
                policy.statements.push(statement);
            }
        }
        debug!(environment = environment_name, statements = policy.len(), "synthesized execution policy");
        Self {
            logical_id: EXECUTION_ROLE_ID.to_string(),
            role_name,
            path: EXECUTION_ROLE_PATH.to_string(),
            assumed_by: trust_policy(environment_name, ctx),
            policy_name: INLINE_POLICY_NAME.to_string(),
            policy,
        }
    }

    pub fn arn_token(&self) -> String {
        airframe_util::attribute_token(&self.logical_id, "Arn")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airframe_types::ConditionValue;

    fn ctx() -> DeploymentContext {
        DeploymentContext::new("eu-west-1", "111122223333")
    }

    #[test]
    fn baseline_is_deterministic_and_scoped() {
        let first = baseline_statements("analytics", "arn:aws:s3:::dags-bucket", &ctx());
        let second = baseline_statements("analytics", "arn:aws:s3:::dags-bucket", &ctx());
        assert_eq!(first, second);
        assert_eq!(first.len(), 7);

        assert_eq!(first[0].resources, vec!["arn:aws:airflow:eu-west-1:111122223333:environment/analytics"]);
        assert_eq!(first[1].effect, Effect::Deny);
        assert_eq!(first[1].actions, vec!["s3:ListAllMyBuckets"]);
        assert_eq!(first[2].resources, vec!["arn:aws:s3:::dags-bucket", "arn:aws:s3:::dags-bucket/*"]);
        assert_eq!(first[3].resources, vec!["arn:aws:logs:eu-west-1:111122223333:log-group:airflow-analytics-*"]);
        assert_eq!(first[4].resources, vec!["*"]);
        assert_eq!(first[5].resources, vec!["arn:aws:sqs:eu-west-1:*:airflow-celery-*"]);
        assert!(first[6].resources.is_empty());
        assert_eq!(first[6].not_resources, vec!["arn:aws:kms:*:111122223333:key/*"]);
        assert_eq!(
            first[6].conditions["StringLike"]["kms:ViaService"],
            ConditionValue::List(vec!["sqs.eu-west-1.amazonaws.com".to_string()])
        );
        assert!(first.iter().all(|statement| validate_statement(statement).is_ok()));
    }

    #[test]
    fn trust_policy_guards_against_confused_deputy() {
        let trust = trust_policy("analytics", &ctx());
        assert_eq!(trust.services().collect::<Vec<_>>(), vec!["airflow.amazonaws.com", "airflow-env.amazonaws.com"]);
        for principal in &trust.principals {
            assert_eq!(
                principal.conditions["ArnLike"]["aws:SourceArn"],
                ConditionValue::Single("arn:aws:airflow:eu-west-1:111122223333:environment/analytics".to_string())
            );
            assert_eq!(
                principal.conditions["StringEquals"]["aws:SourceAccount"],
                ConditionValue::Single("111122223333".to_string())
            );
        }
    }

    #[test]
    fn append_is_monotonic_and_deduplicated() {
        let mut policy = ExecutionPolicy::new();
        policy.extend(secrets_statements("airflow/connections", "airflow/variables", &ctx())).unwrap();
        assert_eq!(policy.len(), 2);
        policy.extend(secrets_statements("airflow/connections", "airflow/variables", &ctx())).unwrap();
        assert_eq!(policy.len(), 2);

        assert!(policy.append(PolicyStatement::allow(["ses:SendEmail"]).on(["*"])).unwrap());
        assert!(!policy.append(PolicyStatement::allow(["ses:SendEmail"]).on(["*"])).unwrap());
        assert_eq!(policy.len(), 3);
        assert!(policy.grants(Effect::Allow, "secretsmanager:ListSecrets"));
    }

    #[test]
    fn malformed_statements_are_rejected() {
        let mut policy = ExecutionPolicy::new();
        assert!(policy.append(PolicyStatement::allow(Vec::<String>::new()).on(["*"])).is_err());
        assert!(policy.append(PolicyStatement::allow(["s3:GetObject"])).is_err());
        let both = PolicyStatement::allow(["s3:GetObject"]).on(["*"]).not_on(["arn:aws:s3:::x"]);
        assert_eq!(
            policy.append(both).unwrap_err().to_string(),
            "Invalid permission statement: Resource and NotResource cannot both be set"
        );
        assert!(policy.is_empty());
    }

    #[test]
    fn email_grant_only_for_default_connection() {
        assert_eq!(email_statements("aws_default").len(), 1);
        assert!(email_statements("smtp_relay").is_empty());
    }

    #[test]
    fn role_carries_baseline_and_trust() {
        let role = ExecutionRole::new("analytics", None, "${DagStorageBucket.Arn}", &ctx());
        assert_eq!(role.path, "/service-role/");
        assert_eq!(role.policy_name, "mwaaExecutionPolicy");
        assert_eq!(role.policy.len(), 7);
        assert_eq!(role.arn_token(), "${MWAAExecutionRole.Arn}");
        assert!(role.policy.statements()[2].resources.contains(&"${DagStorageBucket.Arn}/*".to_string()));
    }
}
