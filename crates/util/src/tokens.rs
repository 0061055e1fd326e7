//! Symbolic references to attributes that only exist once resources are provisioned.
//!
//! A token renders as `${LogicalId.Attribute}`. The provisioning mechanism
//! substitutes the real value when it materialises the declaration.

/// Reference to `attribute` of the resource declared as `logical_id`.
pub fn attribute_token(logical_id: &str, attribute: &str) -> String {
    format!("${{{logical_id}.{attribute}}}")
}

/// Whether `value` is (or embeds) an unresolved attribute token.
pub fn is_token(value: &str) -> bool {
    value.contains("${") && value.contains('}')
}

/// Resource name of an ARN such as `arn:aws:logs:eu-west-1:123:log-group:name:*`.
///
/// Returns the name segment (`name`) for `type:name` style ARNs and the part after the
/// last `/` for `type/name` style ones. An attribute token ending in `Arn` maps to the
/// matching `Name` attribute of the same resource. Other tokens and strings that are
/// not ARNs are returned unchanged.
pub fn arn_resource_name(arn: &str) -> String {
    if let Some(attribute) = arn.strip_prefix("${").and_then(|rest| rest.strip_suffix("Arn}"))
        && !attribute.contains(['$', '{', '}'])
    {
        return format!("${{{attribute}Name}}");
    }
    if is_token(arn) || !arn.starts_with("arn:") {
        return arn.to_string();
    }
    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    let Some(resource) = parts.get(5) else {
        return arn.to_string();
    };
    if let Some((_, rest)) = resource.split_once(':') {
        rest.trim_end_matches(":*").to_string()
    } else if let Some((_, rest)) = resource.rsplit_once('/') {
        rest.to_string()
    } else {
        resource.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_tokens_are_recognised() {
        let token = attribute_token("MWAAEnvironment", "Arn");
        assert_eq!(token, "${MWAAEnvironment.Arn}");
        assert!(is_token(&token));
        assert!(is_token(&format!("{token}/*")));
        assert!(!is_token("arn:aws:s3:::bucket"));
    }

    #[test]
    fn log_group_names_are_extracted_from_arns() {
        assert_eq!(
            arn_resource_name("arn:aws:logs:eu-west-1:111122223333:log-group:airflow-env-Task:*"),
            "airflow-env-Task"
        );
        assert_eq!(arn_resource_name("arn:aws:iam::111122223333:role/service-role/exec"), "exec");
        assert_eq!(arn_resource_name("arn:aws:s3:::bucket"), "bucket");
    }

    #[test]
    fn arn_tokens_map_to_name_attributes() {
        let token = attribute_token("MWAAEnvironment", "LoggingConfiguration.TaskLogs.CloudWatchLogGroupArn");
        assert_eq!(
            arn_resource_name(&token),
            "${MWAAEnvironment.LoggingConfiguration.TaskLogs.CloudWatchLogGroupName}"
        );
    }

    #[test]
    fn other_tokens_pass_through_unchanged() {
        let url = attribute_token("MWAAEnvironment", "WebserverUrl");
        assert_eq!(arn_resource_name(&url), url);
        let embedded = format!("{}/*", attribute_token("DagStorageBucket", "Arn"));
        assert_eq!(arn_resource_name(&embedded), embedded);
        assert_eq!(arn_resource_name("airflow-env-Task"), "airflow-env-Task");
    }
}
