use std::fs;
use std::path::{Path, PathBuf};

use airframe_engine::{Deployment, OptionsFormat, default_manifest_path, load_manifest};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Validate and synthesize managed Airflow environment declarations.
#[derive(Parser, Debug)]
#[command(name = "airframe", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every validator against a manifest
    Validate {
        /// Manifest path (defaults to $AIRFRAME_MANIFEST_PATH or ./airframe.yaml)
        manifest: Option<PathBuf>,
    },
    /// Print the materialized declarations as JSON
    Synth {
        manifest: Option<PathBuf>,

        /// Render every configuration option value as a string
        #[arg(long)]
        flat_options: bool,

        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_tracing();
    match Cli::parse().command {
        Command::Validate { manifest } => {
            let path = manifest.unwrap_or_else(default_manifest_path);
            let deployment = build(&path)?;
            println!(
                "{}: environment '{}' is valid ({} permission statements, {} pools)",
                path.display(),
                deployment.environment.name(),
                deployment.environment.execution_role().policy.len(),
                deployment.pools.len()
            );
            Ok(())
        }
        Command::Synth {
            manifest,
            flat_options,
            output,
        } => {
            let path = manifest.unwrap_or_else(default_manifest_path);
            let format = if flat_options { OptionsFormat::Flat } else { OptionsFormat::Structured };
            let rendered = synth(&path, format)?;
            match output {
                Some(output) => {
                    fs::write(&output, rendered).with_context(|| format!("Failed to write {}", output.display()))?;
                    info!(path = %output.display(), "wrote declarations");
                }
                None => println!("{rendered}"),
            }
            Ok(())
        }
    }
}

/// `RUST_LOG` directives, or `info` when unset or unparsable.
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

fn build(path: &Path) -> Result<Deployment> {
    let manifest = load_manifest(path)?;
    manifest
        .build()
        .with_context(|| format!("Manifest {} failed validation", path.display()))
}

fn synth(path: &Path, format: OptionsFormat) -> Result<String> {
    let stack = build(path)?.synthesize(format);
    serde_json::to_string_pretty(&stack).context("Failed to render declarations")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
context: { region: eu-west-1, account: "111122223333" }
network: { vpcId: vpc-1, subnetIds: [subnet-1] }
environment:
  name: analytics
  airflowVersion: "2.10.3"
  airflowConfigurationOptions: { core.parallelism: 64 }
"#;

    #[test]
    fn rust_log_controls_verbosity() {
        temp_env::with_var("RUST_LOG", None::<&str>, || {
            assert_eq!(log_filter().to_string(), EnvFilter::new("info").to_string());
        });
        temp_env::with_var("RUST_LOG", Some("debug"), || {
            init_tracing();
            assert!(tracing::enabled!(tracing::Level::DEBUG));
            assert!(!tracing::enabled!(tracing::Level::TRACE));
        });
    }

    #[test]
    fn synth_renders_flat_options() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("airframe.yaml");
        fs::write(&path, MANIFEST).unwrap();

        let rendered: serde_json::Value = serde_json::from_str(&synth(&path, OptionsFormat::Flat).unwrap()).unwrap();
        assert_eq!(rendered["environment"]["airflowConfigurationOptions"]["core.parallelism"], "64");
        assert_eq!(rendered["environment"]["name"], "analytics");
    }

    #[test]
    fn validation_errors_name_the_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("airframe.yaml");
        fs::write(&path, MANIFEST.replace("airflowVersion", "weeklyMaintenanceWindowStart: Monday-10:00\n  airflowVersion")).unwrap();

        let err = build(&path).unwrap_err();
        assert!(err.to_string().contains("failed validation"));
        assert!(format!("{err:#}").contains("weeklyMaintenanceWindowStart"));
    }
}
