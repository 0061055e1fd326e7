//! Airflow log destinations and their retention settings.

use std::{error::Error, fmt};

use heck::ToUpperCamelCase;
use serde::{Deserialize, Serialize};

/// Airflow log level for a log destination.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

/// The five log destinations an environment publishes to.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    DagProcessing,
    Scheduler,
    Task,
    Webserver,
    Worker,
}

impl LogType {
    pub const ALL: [LogType; 5] = [Self::DagProcessing, Self::Scheduler, Self::Task, Self::Webserver, Self::Worker];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DagProcessing => "dag_processing",
            Self::Scheduler => "scheduler",
            Self::Task => "task",
            Self::Webserver => "webserver",
            Self::Worker => "worker",
        }
    }

    /// Name used for the destination in declarations, e.g. `DagProcessingLogs`.
    pub fn logical_name(&self) -> String {
        format!("{}Logs", self.as_str().to_upper_camel_case())
    }
}

/// Retention period accepted by CloudWatch Logs, in days.
///
/// Only the discrete periods the log service supports can be constructed; any
/// other number is rejected on conversion (and therefore on deserialization).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RetentionDays(u32);

impl RetentionDays {
    pub const ALLOWED: [u32; 22] = [
        1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922, 3288, 3653,
    ];

    pub const ONE_DAY: RetentionDays = RetentionDays(1);
    pub const ONE_WEEK: RetentionDays = RetentionDays(7);
    pub const ONE_MONTH: RetentionDays = RetentionDays(30);
    pub const ONE_YEAR: RetentionDays = RetentionDays(365);

    pub fn days(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for RetentionDays {
    type Error = ParseRetentionDaysError;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        if Self::ALLOWED.contains(&days) {
            Ok(Self(days))
        } else {
            Err(ParseRetentionDaysError(days))
        }
    }
}

impl From<RetentionDays> for u32 {
    fn from(value: RetentionDays) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseRetentionDaysError(pub u32);

impl fmt::Display for ParseRetentionDaysError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported log retention of {} days", self.0)
    }
}

impl Error for ParseRetentionDaysError {}

/// Settings for a single log destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggingConfigurationProperty {
    /// Whether the destination is published to CloudWatch Logs.
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub log_level: Option<LogLevel>,
    /// Optional retention override applied to the destination's log group.
    #[serde(default)]
    pub retention: Option<RetentionDays>,
}

/// Logging settings keyed by destination. Absent entries keep service defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggingConfiguration {
    #[serde(default)]
    pub dag_processing_logs: Option<LoggingConfigurationProperty>,
    #[serde(default)]
    pub scheduler_logs: Option<LoggingConfigurationProperty>,
    #[serde(default)]
    pub task_logs: Option<LoggingConfigurationProperty>,
    #[serde(default)]
    pub webserver_logs: Option<LoggingConfigurationProperty>,
    #[serde(default)]
    pub worker_logs: Option<LoggingConfigurationProperty>,
}

impl LoggingConfiguration {
    pub fn get(&self, log_type: LogType) -> Option<&LoggingConfigurationProperty> {
        match log_type {
            LogType::DagProcessing => self.dag_processing_logs.as_ref(),
            LogType::Scheduler => self.scheduler_logs.as_ref(),
            LogType::Task => self.task_logs.as_ref(),
            LogType::Webserver => self.webserver_logs.as_ref(),
            LogType::Worker => self.worker_logs.as_ref(),
        }
    }

    pub fn retention(&self, log_type: LogType) -> Option<RetentionDays> {
        self.get(log_type).and_then(|property| property.retention)
    }
}
