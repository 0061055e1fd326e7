//! Weekly maintenance window start token.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::ConfigurationError;

// Day names and hour/minute ranges are left to the provisioning API.
static WINDOW_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-zA-Z]+):([0-9]{2}):([0-9]{2})$").expect("maintenance window regex should compile"));

/// A `Day:HH:MM` token such as `Sun:10:00`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MaintenanceWindow(String);

impl MaintenanceWindow {
    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        if WINDOW_REGEX.is_match(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(ConfigurationError::MaintenanceWindowFormat { value: value.to_string() })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MaintenanceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate an optional window. Absent and empty values pass through as `None`.
pub fn validate_maintenance_window(value: Option<&str>) -> Result<Option<MaintenanceWindow>, ConfigurationError> {
    match value {
        None | Some("") => Ok(None),
        Some(token) => MaintenanceWindow::parse(token).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_day_hour_minute_tokens() {
        assert_eq!(
            validate_maintenance_window(Some("Mon:10:00")).unwrap().map(|w| w.to_string()),
            Some("Mon:10:00".to_string())
        );
        assert!(validate_maintenance_window(Some("SUN:23:30")).is_ok());
    }

    #[test]
    fn absent_window_passes_through() {
        assert_eq!(validate_maintenance_window(None), Ok(None));
        assert_eq!(validate_maintenance_window(Some("")), Ok(None));
    }

    #[test]
    fn rejects_malformed_tokens() {
        for bad in ["Monday-10:00", "Mon:1:00", "Mon:10:00:00", "10:00", "Mon 10:00", "Mo1:10:00"] {
            let err = validate_maintenance_window(Some(bad)).unwrap_err();
            assert_eq!(err.to_string(), "Invalid format for weeklyMaintenanceWindowStart. Expected format: \"Day:HH:mm\"");
        }
    }

    #[test]
    fn day_and_time_values_are_not_interpreted() {
        // loose contract: only the shape is checked
        assert!(validate_maintenance_window(Some("Someday:99:99")).is_ok());
    }
}
