use crate::config::Config;
use crate::error::ConfigError;

/// Overlay a TOML fragment on top of `base`.
///
/// Keys present in the overlay win; tables are merged key by key so a
/// project file can override a single setting without repeating the rest
/// of its section.
pub fn merge_configs(base: &Config, overlay_toml: &str) -> Result<Config, ConfigError> {
    let mut merged = toml::Value::try_from(base).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let overlay: toml::Value =
        toml::from_str(overlay_toml).map_err(|e| ConfigError::Parse(e.to_string()))?;

    merge_values(&mut merged, overlay);

    merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))
}

fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, val) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(slot) => merge_values(slot, val),
                    None => {
                        base_table.insert(key, val);
                    }
                }
            }
        }
        (slot, overlay) => *slot = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_overlay_returns_base() {
        let base = Config::default();
        assert_eq!(merge_configs(&base, "").unwrap(), base);
    }

    #[test]
    fn overlay_replaces_single_key_in_section() {
        let base = Config::default();
        let merged = merge_configs(&base, "[poll]\ninterval_ms = 250\n").unwrap();
        assert_eq!(merged.poll.interval_ms, 250);
        assert_eq!(merged.poll.initial_stop_interval_ms, 500);
        assert_eq!(merged.backend, base.backend);
    }

    #[test]
    fn overlay_adds_optional_values() {
        let base = Config::default();
        let merged = merge_configs(&base, "[retry]\ndeadline_ms = 3000\n").unwrap();
        assert_eq!(merged.retry.deadline_ms, Some(3000));
        assert_eq!(merged.retry.interval_ms, 200);
    }

    #[test]
    fn environment_tables_merge_per_variable() {
        let base = merge_configs(
            &Config::default(),
            "[debug.environment]\nA = \"1\"\nB = \"2\"\n",
        )
        .unwrap();
        let merged = merge_configs(&base, "[debug.environment]\nB = \"3\"\n").unwrap();
        let env = merged.debug.environment.unwrap();
        assert_eq!(env["A"], "1");
        assert_eq!(env["B"], "3");
    }

    #[test]
    fn arrays_are_replaced_not_appended() {
        let base = merge_configs(&Config::default(), "[debug]\nparams = [\"a\", \"b\"]\n").unwrap();
        let merged = merge_configs(&base, "[debug]\nparams = [\"c\"]\n").unwrap();
        assert_eq!(merged.debug.params, vec!["c"]);
    }

    #[test]
    fn invalid_overlay_returns_parse_error() {
        let result = merge_configs(&Config::default(), "{{invalid}}");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn wrongly_typed_overlay_returns_parse_error() {
        let result = merge_configs(&Config::default(), "[poll]\ninterval_ms = \"fast\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
