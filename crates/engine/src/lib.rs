//! # Airframe Engine
//!
//! Derives and validates the configuration of a managed Airflow environment from
//! a small set of high-level inputs, producing declarations for an external
//! provisioning mechanism.
//!
//! ## Key Features
//!
//! - **Sizing**: class presets and validated custom worker/webserver/scheduler counts
//! - **Artifact storage**: canonical object paths and versions, plus a constraints gate on requirements files
//! - **Execution policy**: least-privilege permission set and trust policy for the runtime identity
//! - **Configuration options**: defaults, overrides, and backend extensions, materialized on demand
//!
//! ## Usage
//!
//! ```rust
//! use airframe_engine::{OptionsFormat, load_manifest};
//!
//! let temp_dir = tempfile::tempdir()?;
//! let manifest_path = temp_dir.path().join("airframe.yaml");
//! std::fs::write(&manifest_path, r#"
//! context: { region: eu-west-1, account: "111122223333" }
//! network: { vpcId: vpc-1, subnetIds: [subnet-1, subnet-2] }
//! environment:
//!   name: analytics
//!   airflowVersion: "2.10.3"
//!   sizing: { environmentClass: mw1.small, maxWorkers: 10 }
//! secretsBackend: {}
//! "#)?;
//!
//! let deployment = load_manifest(&manifest_path)?.build()?;
//! let stack = deployment.synthesize(OptionsFormat::Flat);
//! assert_eq!(stack.environment.max_workers, 10);
//! println!("{}", serde_json::to_string_pretty(&stack)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`sizing`**: capacity classes and count validation
//! - **`maintenance`**: weekly maintenance window format check
//! - **`storage`**: bucket declaration, artifact paths, requirements constraints gate
//! - **`network`**: placement, the default security group, and declared VPCs with their endpoints
//! - **`policy`**: execution role, baseline statements, trust policy
//! - **`options`**: runtime configuration options and backend extensions
//! - **`environment`**: composes the above into the environment declaration
//! - **`pool`**: pool custom resources and the handler's request planner
//! - **`manifest`**: loading a deployment description from disk

pub mod context;
pub mod environment;
pub mod error;
pub mod maintenance;
pub mod manifest;
pub mod network;
pub mod options;
pub mod patterns;
pub mod policy;
pub mod pool;
pub mod sizing;
pub mod storage;

pub use context::DeploymentContext;
pub use environment::{Environment, EnvironmentAttributes, EnvironmentDeclaration, EnvironmentProps, LogRetention, OptionsFormat};
pub use error::{ConfigurationError, EngineError, PolicyViolation, PoolRequestError};
pub use maintenance::{MaintenanceWindow, validate_maintenance_window};
pub use manifest::{Deployment, Manifest, SynthesizedStack, default_manifest_path, load_manifest};
pub use network::{NetworkConfiguration, NetworkProps, SecurityGroup, SubnetType, Vpc, VpcProps, VpcRouting};
pub use options::{ConfigurationOptions, EmailBackendOptions, SecretsBackendOptions};
pub use patterns::{PublicRouting, PublicRoutingProps, public_routing_environment};
pub use policy::{ExecutionPolicy, ExecutionRole};
pub use pool::{AirflowPool, AirflowPoolProps, PoolSpec, RestRequest, plan_pool_request};
pub use sizing::{Sizing, SizingProps, validate_sizing};
pub use storage::{ArtifactDescriptor, ArtifactKind, ArtifactReference, ConfigsOptions, DagStorage, DagStorageProps, DagsOptions};
