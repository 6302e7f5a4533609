use crate::config::Config;
use crate::error::ConfigError;

/// Lowest accepted poll interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Lowest accepted retry interval.
pub const MIN_RETRY_INTERVAL_MS: u64 = 1;

/// Validate a [`Config`], returning every violation found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |field: &str, message: String| {
        errors.push(ConfigError::Validation {
            field: field.to_string(),
            message,
        })
    };

    if config.backend.adapter.trim().is_empty() {
        fail("backend.adapter", "must not be empty".to_string());
    }

    let [lo, hi] = config.backend.port_range;
    if lo >= hi {
        fail(
            "backend.port_range",
            format!("lower bound must be below upper bound, got [{lo}, {hi}]"),
        );
    }
    if lo < 1024 {
        fail(
            "backend.port_range",
            format!("must not include privileged ports, got lower bound {lo}"),
        );
    }

    if config.poll.interval_ms < MIN_POLL_INTERVAL_MS {
        fail(
            "poll.interval_ms",
            format!(
                "must be at least {MIN_POLL_INTERVAL_MS}, got {}",
                config.poll.interval_ms
            ),
        );
    }

    if config.retry.interval_ms < MIN_RETRY_INTERVAL_MS {
        fail(
            "retry.interval_ms",
            format!(
                "must be at least {MIN_RETRY_INTERVAL_MS}, got {}",
                config.retry.interval_ms
            ),
        );
    }
    if let Some(deadline) = config.retry.deadline_ms {
        if deadline < config.retry.interval_ms {
            fail(
                "retry.deadline_ms",
                format!(
                    "must not be shorter than retry.interval_ms ({}), got {deadline}",
                    config.retry.interval_ms
                ),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(errs: &[ConfigError]) -> Vec<String> {
        errs.iter()
            .map(|e| match e {
                ConfigError::Validation { field, .. } => field.clone(),
                other => panic!("unexpected error: {other}"),
            })
            .collect()
    }

    #[test]
    fn default_config_passes() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn empty_adapter_rejected() {
        let mut cfg = Config::default();
        cfg.backend.adapter = "   ".into();
        let errs = validate(&cfg).unwrap_err();
        assert_eq!(fields(&errs), vec!["backend.adapter"]);
    }

    #[test]
    fn inverted_port_range_rejected() {
        let mut cfg = Config::default();
        cfg.backend.port_range = [13000, 12000];
        let errs = validate(&cfg).unwrap_err();
        assert_eq!(fields(&errs), vec!["backend.port_range"]);
    }

    #[test]
    fn privileged_ports_rejected() {
        let mut cfg = Config::default();
        cfg.backend.port_range = [80, 2000];
        let errs = validate(&cfg).unwrap_err();
        assert!(errs[0].to_string().contains("privileged"));
    }

    #[test]
    fn poll_interval_minimum() {
        let mut cfg = Config::default();
        cfg.poll.interval_ms = 99;
        assert_eq!(fields(&validate(&cfg).unwrap_err()), vec!["poll.interval_ms"]);
        cfg.poll.interval_ms = 100;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn deadline_shorter_than_interval_rejected() {
        let mut cfg = Config::default();
        cfg.retry.deadline_ms = Some(50);
        assert_eq!(fields(&validate(&cfg).unwrap_err()), vec!["retry.deadline_ms"]);
        cfg.retry.deadline_ms = Some(200);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn multiple_errors_returned() {
        let mut cfg = Config::default();
        cfg.backend.adapter = String::new();
        cfg.poll.interval_ms = 1;
        cfg.retry.interval_ms = 0;
        let errs = validate(&cfg).unwrap_err();
        assert_eq!(
            fields(&errs),
            vec!["backend.adapter", "poll.interval_ms", "retry.interval_ms"]
        );
    }
}
