use std::fs;
use std::path::{Path, PathBuf};

use airframe_engine::{
    ConfigurationError, EngineError, Manifest, OptionsFormat, PolicyViolation, Sizing, SizingProps, load_manifest,
    validate_maintenance_window,
};
use airframe_types::{Effect, EnvironmentClass, RetentionDays, WebserverAccessMode};
use serde_json::json;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data").join(name)
}

fn counts(class: EnvironmentClass, all: u32) -> SizingProps {
    SizingProps {
        environment_class: class,
        min_workers: all,
        max_workers: all,
        min_webservers: all,
        max_webservers: all,
        schedulers: all,
    }
}

#[test]
fn micro_sizing_accepts_only_ones() {
    assert!(Sizing::custom(counts(EnvironmentClass::Mw1Micro, 1)).is_ok());
    let err = Sizing::custom(counts(EnvironmentClass::Mw1Micro, 2)).expect_err("micro with twos must fail");
    assert_eq!(
        err.to_string(),
        "For MW1_MICRO environment class, minWorkers, maxWorkers, minWebservers, maxWebservers, and schedulers must all be 1."
    );
}

#[test]
fn maintenance_window_shapes() {
    assert!(validate_maintenance_window(Some("Mon:10:00")).is_ok());
    assert!(validate_maintenance_window(Some("Monday-10:00")).is_err());
}

#[test]
fn full_manifest_synthesizes_every_declaration() {
    let deployment = load_manifest(&fixture("full_manifest.yaml"))
        .expect("load manifest")
        .build()
        .expect("build deployment");
    let stack = deployment.synthesize(OptionsFormat::Structured);

    let environment = &stack.environment;
    assert_eq!(environment.name, "analytics");
    assert_eq!(environment.environment_class, EnvironmentClass::Mw1Medium);
    assert_eq!((environment.min_workers, environment.max_workers), (2, 12));
    assert_eq!(environment.webserver_access_mode, WebserverAccessMode::PrivateOnly);
    assert_eq!(environment.source_bucket_arn, "arn:aws:s3:::analytics-airflow-artifacts");
    assert_eq!(environment.dag_s3_path, "dags/");
    assert_eq!(environment.requirements_s3_path.as_deref(), Some("configs/requirements.txt"));
    assert_eq!(
        environment.requirements_s3_object_version.as_deref(),
        Some("3sL4kqtJlcpXroDTDmJ.rmSpXd3dIbrHY")
    );
    assert_eq!(environment.plugins_s3_path.as_deref(), Some("configs/plugins.zip"));
    assert!(environment.startup_script_s3_path.is_none());
    assert_eq!(environment.weekly_maintenance_window_start.as_ref().map(|w| w.as_str()), Some("Sun:03:30"));
    assert_eq!(environment.tags["team"], "data-platform");
    assert_eq!(
        environment.depends_on,
        vec!["DagStorageBucket", "DagsDeployment", "ConfigsDeployment", "MWAAExecutionRole"]
    );

    let options = &environment.airflow_configuration_options;
    assert_eq!(options["scheduler.catchup_by_default"], json!(false));
    assert_eq!(options["celery.worker_autoscale"], json!(5));
    assert_eq!(options["email.conn_id"], json!("aws_default"));
    let kwargs: serde_json::Value =
        serde_json::from_str(options["secrets.backend_kwargs"].as_str().expect("kwargs string")).expect("kwargs json");
    assert_eq!(kwargs["variables_lookup_pattern"], json!("^analytics_.*$"));

    let policy = &stack.execution_role.policy;
    assert!(policy.grants(Effect::Deny, "s3:ListAllMyBuckets"));
    assert!(policy.grants(Effect::Allow, "secretsmanager:GetSecretValue"));
    assert!(policy.grants(Effect::Allow, "ses:SendEmail"));
    assert!(policy.grants(Effect::Allow, "s3:PutObject"));
    assert_eq!(policy.len(), 7 + 2 + 1 + 1);

    assert_eq!(stack.log_retentions.len(), 1);
    assert_eq!(stack.log_retentions[0].logical_id, "TaskLogsLogRetention");
    assert_eq!(stack.log_retentions[0].retention_in_days, RetentionDays::try_from(14u32).expect("allowed retention"));

    assert!(stack.storage.bucket.auto_delete_objects);
    assert_eq!(stack.storage.bucket.lifecycle_rules.len(), 1);
    let configs = stack
        .storage
        .deployments
        .iter()
        .find(|d| d.logical_id == "ConfigsDeployment")
        .expect("configs deployment");
    assert!(configs.retain_on_delete);
    assert!(configs.source.ends_with("tests/data/configs"));
    let dags = stack
        .storage
        .deployments
        .iter()
        .find(|d| d.logical_id == "DagsDeployment")
        .expect("dags deployment");
    assert!(dags.source.join("daily_exports.py").is_file());
    assert_eq!(
        stack.log_retentions[0].log_group_name,
        "${MWAAEnvironment.LoggingConfiguration.TaskLogs.CloudWatchLogGroupName}"
    );
    assert!(stack.vpc.is_none());

    assert_eq!(stack.pools.len(), 2);
    assert_eq!(stack.pools[0].properties["PoolSlots"], json!(8));
    assert_eq!(stack.pools[1].properties["PoolSlots"], json!(3));
    assert_eq!(stack.pools[1].physical_id, "analytics-slack_alerts");
    assert!(stack.security_group.is_some());
}

#[test]
fn flat_synthesis_renders_strings() {
    let deployment = load_manifest(&fixture("full_manifest.yaml")).unwrap().build().unwrap();
    let stack = deployment.synthesize(OptionsFormat::Flat);
    let options = &stack.environment.airflow_configuration_options;
    assert!(options.values().all(|value| value.is_string()));
    assert_eq!(options["celery.worker_autoscale"], json!("5"));

    let rendered = serde_json::to_value(&stack).unwrap();
    assert_eq!(rendered["executionRole"]["path"], json!("/service-role/"));
    assert_eq!(rendered["environment"]["environmentClass"], json!("mw1.medium"));
}

#[test]
fn unpinned_requirements_fail_the_build() {
    let dir = tempfile::tempdir().unwrap();
    fs::copy(fixture("unpinned/requirements.txt"), dir.path().join("requirements.txt")).unwrap();
    let manifest_path = dir.path().join("airframe.yaml");
    fs::write(
        &manifest_path,
        r#"
context: { region: us-east-1, account: "123456789012" }
network: { vpcId: vpc-1, subnetIds: [subnet-1] }
storage:
  configsOptions:
    s3Prefix: configs
    localPath: .
    requirements: { name: requirements.txt }
environment: { name: etl, airflowVersion: "2.10.3" }
"#,
    )
    .unwrap();

    let result = load_manifest(&manifest_path).unwrap().build();
    assert!(
        matches!(result, Err(EngineError::Policy(PolicyViolation::MissingConstraints { .. }))),
        "got {result:?}"
    );
}

#[test]
fn invalid_sizing_stops_the_build_before_storage() {
    let text = r#"
context: { region: us-east-1, account: "123456789012" }
network: { vpcId: vpc-1, subnetIds: [subnet-1] }
storage:
  configsOptions:
    localPath: /nonexistent/airframe
    requirements: { name: requirements.txt }
environment:
  name: etl
  airflowVersion: "2.10.3"
  sizing: { environmentClass: mw1.large, minWebservers: 1 }
"#;
    let err = Manifest::parse(text, false).unwrap().build().unwrap_err();
    assert!(
        matches!(err, EngineError::Configuration(ConfigurationError::CountOutOfRange { field: "minWebservers", .. })),
        "got {err:?}"
    );
}

#[test]
fn json_manifests_and_bad_retention() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("airframe.json");
    fs::write(
        &path,
        r#"{
  "context": { "region": "us-east-1", "account": "123456789012" },
  "network": { "vpcId": "vpc-1", "subnetIds": ["subnet-1"] },
  "environment": { "name": "etl", "airflowVersion": "2.10.3" }
}"#,
    )
    .unwrap();
    assert!(load_manifest(&path).unwrap().build().is_ok());

    let bad = r#"{
  "context": { "region": "us-east-1", "account": "123456789012" },
  "network": { "vpcId": "vpc-1", "subnetIds": ["subnet-1"] },
  "environment": {
    "name": "etl",
    "airflowVersion": "2.10.3",
    "loggingConfiguration": { "taskLogs": { "retention": 2 } }
  }
}"#;
    assert!(Manifest::parse(bad, true).is_err());
}
