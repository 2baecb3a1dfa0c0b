use super::{Phase, RolloutConfig, Strategy};
use std::time::Duration;

/// Validate a configuration for one phase
///
/// Runs before any cluster call so a bad invocation never mutates anything.
///
/// # Validation Rules
/// - `timeout` must be a valid duration (e.g., "30s", "5m")
/// - Canary deploy: `percentage` is required and must be 0-100
/// - `baselineAndCanaryReplicas` must be 0-100 when set
/// - Basic strategy: only deploy is supported
///
/// # Returns
/// * `Ok(())` - Validation passed
/// * `Err(String)` - Validation error message
pub fn validate_config(config: &RolloutConfig, phase: Phase) -> Result<(), String> {
    if let Some(timeout) = &config.timeout {
        validate_timeout(timeout)?;
    }

    match config.strategy {
        Strategy::Canary => {
            if phase == Phase::Deploy {
                config.canary_percentage()?;
            }
            config.replica_override()?;
        }
        Strategy::Basic if phase != Phase::Deploy => {
            return Err(format!("{phase} is not supported by the basic strategy"));
        }
        Strategy::Basic | Strategy::BlueGreen => {}
    }

    for key in config.annotations.keys() {
        if key.is_empty() {
            return Err("annotation keys cannot be empty".to_string());
        }
    }

    Ok(())
}

pub fn validate_timeout(timeout: &str) -> Result<(), String> {
    match parse_duration(timeout) {
        Some(_) => Ok(()),
        None => Err(format!(
            "timeout '{timeout}' is invalid: expected a duration like 30s, 5m or 1h"
        )),
    }
}

/// Parse a duration string like "5m", "30s", "1h" into std::time::Duration
///
/// Supported formats:
/// - "30s" → 30 seconds (max 24h = 86400s)
/// - "5m" → 5 minutes (max 24h = 1440m)
/// - "2h" → 2 hours (max 1 week = 168h)
///
/// Zero is rejected.
pub fn parse_duration(duration_str: &str) -> Option<Duration> {
    let duration_str = duration_str.trim();
    let unit = duration_str.chars().last()?;
    let number: u64 = duration_str[..duration_str.len() - unit.len_utf8()]
        .parse()
        .ok()?;

    if number == 0 {
        return None;
    }

    let (limit, seconds_per_unit) = match unit {
        's' => (86_400, 1),
        'm' => (1_440, 60),
        'h' => (168, 3_600),
        _ => return None,
    };
    if number > limit {
        return None;
    }
    number.checked_mul(seconds_per_unit).map(Duration::from_secs)
}
