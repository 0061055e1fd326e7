//! Capacity sizing for an environment.
//!
//! A [`Sizing`] can only be obtained through [`Sizing::custom`] or one of the
//! class presets, so every value in circulation has passed [`validate_sizing`].

use airframe_types::EnvironmentClass;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigurationError;

const WORKER_BOUNDS: (u32, u32) = (1, 25);
const WEBSERVER_BOUNDS: (u32, u32) = (2, 5);
const SCHEDULER_BOUNDS: (u32, u32) = (2, 5);

/// Requested class and counts, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SizingProps {
    pub environment_class: EnvironmentClass,
    pub min_workers: u32,
    pub max_workers: u32,
    pub min_webservers: u32,
    pub max_webservers: u32,
    pub schedulers: u32,
}

impl SizingProps {
    /// Default counts for a class: all ones for the fixed class, 2/5/2/5/2 otherwise.
    pub fn preset(environment_class: EnvironmentClass) -> Self {
        if environment_class.is_fixed() {
            Self {
                environment_class,
                min_workers: 1,
                max_workers: 1,
                min_webservers: 1,
                max_webservers: 1,
                schedulers: 1,
            }
        } else {
            Self {
                environment_class,
                min_workers: 2,
                max_workers: 5,
                min_webservers: 2,
                max_webservers: 5,
                schedulers: 2,
            }
        }
    }
}

/// Validated, immutable sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Sizing {
    props: SizingProps,
}

impl Sizing {
    pub fn mw1_micro() -> Self {
        Self::preset(EnvironmentClass::Mw1Micro)
    }

    pub fn mw1_small() -> Self {
        Self::preset(EnvironmentClass::Mw1Small)
    }

    pub fn mw1_medium() -> Self {
        Self::preset(EnvironmentClass::Mw1Medium)
    }

    pub fn mw1_large() -> Self {
        Self::preset(EnvironmentClass::Mw1Large)
    }

    /// Preset counts for `environment_class`.
    pub fn preset(environment_class: EnvironmentClass) -> Self {
        let props = SizingProps::preset(environment_class);
        debug_assert!(validate_sizing(&props).is_ok(), "preset sizing for {environment_class} must validate");
        Self { props }
    }

    /// Sizing with caller-chosen counts.
    pub fn custom(props: SizingProps) -> Result<Self, ConfigurationError> {
        validate_sizing(&props)?;
        debug!(class = %props.environment_class, "validated sizing");
        Ok(Self { props })
    }

    pub fn environment_class(&self) -> EnvironmentClass {
        self.props.environment_class
    }

    pub fn min_workers(&self) -> u32 {
        self.props.min_workers
    }

    pub fn max_workers(&self) -> u32 {
        self.props.max_workers
    }

    pub fn min_webservers(&self) -> u32 {
        self.props.min_webservers
    }

    pub fn max_webservers(&self) -> u32 {
        self.props.max_webservers
    }

    pub fn schedulers(&self) -> u32 {
        self.props.schedulers
    }

    pub fn props(&self) -> &SizingProps {
        &self.props
    }
}

impl Default for Sizing {
    fn default() -> Self {
        Self::mw1_micro()
    }
}

/// Check `props` against the rules of its class.
///
/// Ranged classes are checked in a fixed order and the first failing rule is
/// reported: worker range, worker order, webserver range, webserver order,
/// scheduler range.
pub fn validate_sizing(props: &SizingProps) -> Result<(), ConfigurationError> {
    let SizingProps {
        environment_class,
        min_workers,
        max_workers,
        min_webservers,
        max_webservers,
        schedulers,
    } = *props;

    if environment_class.is_fixed() {
        if [min_workers, max_workers, min_webservers, max_webservers, schedulers].iter().any(|count| *count != 1) {
            return Err(ConfigurationError::FixedTierCounts);
        }
        return Ok(());
    }

    check_range("minWorkers", min_workers, WORKER_BOUNDS)?;
    check_range("maxWorkers", max_workers, WORKER_BOUNDS)?;
    check_order(("minWorkers", min_workers), ("maxWorkers", max_workers))?;
    check_range("minWebservers", min_webservers, WEBSERVER_BOUNDS)?;
    check_range("maxWebservers", max_webservers, WEBSERVER_BOUNDS)?;
    check_order(("minWebservers", min_webservers), ("maxWebservers", max_webservers))?;
    check_range("schedulers", schedulers, SCHEDULER_BOUNDS)
}

fn check_range(field: &'static str, value: u32, (min, max): (u32, u32)) -> Result<(), ConfigurationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigurationError::CountOutOfRange { field, min, max })
    }
}

fn check_order(lower: (&'static str, u32), upper: (&'static str, u32)) -> Result<(), ConfigurationError> {
    if lower.1 <= upper.1 {
        Ok(())
    } else {
        Err(ConfigurationError::CountOrder {
            lower: lower.0,
            upper: upper.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(class: EnvironmentClass, counts: [u32; 5]) -> SizingProps {
        SizingProps {
            environment_class: class,
            min_workers: counts[0],
            max_workers: counts[1],
            min_webservers: counts[2],
            max_webservers: counts[3],
            schedulers: counts[4],
        }
    }

    #[test]
    fn presets_have_expected_counts() {
        let micro = Sizing::mw1_micro();
        assert_eq!(micro.environment_class(), EnvironmentClass::Mw1Micro);
        assert_eq!(
            [micro.min_workers(), micro.max_workers(), micro.min_webservers(), micro.max_webservers(), micro.schedulers()],
            [1, 1, 1, 1, 1]
        );

        for (sizing, class) in [
            (Sizing::mw1_small(), EnvironmentClass::Mw1Small),
            (Sizing::mw1_medium(), EnvironmentClass::Mw1Medium),
            (Sizing::mw1_large(), EnvironmentClass::Mw1Large),
        ] {
            assert_eq!(sizing.environment_class(), class);
            assert_eq!(sizing.props(), &props(class, [2, 5, 2, 5, 2]));
            assert!(validate_sizing(sizing.props()).is_ok());
        }
    }

    #[test]
    fn fixed_tier_requires_every_count_to_be_one() {
        assert!(Sizing::custom(props(EnvironmentClass::Mw1Micro, [1, 1, 1, 1, 1])).is_ok());
        for position in 0..5 {
            let mut counts = [1; 5];
            counts[position] = 2;
            assert_eq!(
                Sizing::custom(props(EnvironmentClass::Mw1Micro, counts)),
                Err(ConfigurationError::FixedTierCounts),
                "count {position} set to 2 should be rejected"
            );
        }
        assert_eq!(
            Sizing::custom(props(EnvironmentClass::Mw1Micro, [2, 2, 2, 2, 2])).unwrap_err().to_string(),
            "For MW1_MICRO environment class, minWorkers, maxWorkers, minWebservers, maxWebservers, and schedulers must all be 1."
        );
    }

    #[test]
    fn custom_ranged_sizing_is_accepted() {
        let sizing = Sizing::custom(props(EnvironmentClass::Mw1Small, [3, 10, 3, 4, 3])).unwrap();
        assert_eq!(sizing.max_workers(), 10);
        assert_eq!(sizing.max_webservers(), 4);
        assert!(Sizing::custom(props(EnvironmentClass::Mw1Large, [25, 25, 5, 5, 5])).is_ok());
        assert!(Sizing::custom(props(EnvironmentClass::Mw1Medium, [1, 1, 2, 2, 2])).is_ok());
    }

    #[test]
    fn each_ranged_rule_reports_its_own_message() {
        let cases = [
            ([0, 5, 2, 5, 2], "minWorkers must be between 1 and 25."),
            ([2, 30, 2, 5, 2], "maxWorkers must be between 1 and 25."),
            ([6, 5, 2, 5, 2], "minWorkers must be less than or equal to maxWorkers."),
            ([2, 5, 1, 5, 2], "minWebservers must be between 2 and 5."),
            ([2, 5, 2, 6, 2], "maxWebservers must be between 2 and 5."),
            ([2, 5, 5, 3, 2], "minWebservers must be less than or equal to maxWebservers."),
            ([2, 5, 2, 5, 6], "schedulers must be between 2 and 5."),
            ([2, 5, 2, 5, 1], "schedulers must be between 2 and 5."),
        ];
        for (counts, message) in cases {
            let err = Sizing::custom(props(EnvironmentClass::Mw1Small, counts)).unwrap_err();
            assert_eq!(err.to_string(), format!("For non-MW1_MICRO environment classes, {message}"), "counts {counts:?}");
        }
    }

    #[test]
    fn first_violation_in_check_order_wins() {
        // worker order, webserver range, and scheduler range all fail; worker order comes first
        let err = Sizing::custom(props(EnvironmentClass::Mw1Medium, [6, 5, 9, 9, 0])).unwrap_err();
        assert_eq!(err, ConfigurationError::CountOrder { lower: "minWorkers", upper: "maxWorkers" });

        // webserver order before scheduler range
        let err = Sizing::custom(props(EnvironmentClass::Mw1Large, [1, 1, 4, 3, 9])).unwrap_err();
        assert_eq!(err, ConfigurationError::CountOrder { lower: "minWebservers", upper: "maxWebservers" });
    }
}
