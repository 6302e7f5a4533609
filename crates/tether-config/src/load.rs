use std::path::{Path, PathBuf};

use tether_platform::paths::{find_project_root, project_dir};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

/// Content written into a newly-created global config file.
const DEFAULT_CONFIG_CONTENT: &str = r#"# tether configuration
# Uncomment and edit settings below to override defaults.
# A project may override any of these in <project>/.tether/config.toml.

# [backend]
# adapter = "lldb-dap"
# port_range = [12000, 13000]
# startup_delay_ms = 500
# exit_grace_ms = 2000

# [poll]
# interval_ms = 1000
# initial_stop_interval_ms = 500

# [retry]
# interval_ms = 200
# deadline_ms = 30000

# [debug]
# executable = "${project_path}/target/debug/app"
# params = []
# path = "/opt/sdk/lib"
# working_dir = "${project_path}"

# [debug.environment]
# RUST_BACKTRACE = "1"

# [console]
# auto_show = true

# [log]
# level = "info"
# file = "/tmp/tether.log"
"#;

/// Load and merge configuration.
///
/// 1. Reads `config_dir/config.toml`, creating it with commented-out
///    defaults if missing.
/// 2. Reads `<project>/.tether/config.toml` from the nearest ancestor of
///    `project_dir` that has one.
/// 3. Merges `Config::default() <- global <- project`.
/// 4. Validates the result.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O, parse or validation failure.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir)?;
    }

    if !global_path.exists() {
        std::fs::write(&global_path, DEFAULT_CONFIG_CONTENT).map_err(|e| {
            ConfigError::CreateDefault {
                path: global_path.clone(),
                reason: e.to_string(),
            }
        })?;
        tracing::info!("created default config at {}", global_path.display());
    }

    let mut config = Config::default();

    let global_content = std::fs::read_to_string(&global_path)?;
    if has_non_comment_content(&global_content) {
        config = merge_configs(&config, &global_content)?;
    }

    if let Some(project_path) = project_dir.and_then(find_project_config) {
        tracing::debug!("merging project config {}", project_path.display());
        let project_content = std::fs::read_to_string(&project_path)?;
        config = merge_configs(&config, &project_content)?;
    }

    validate(&config).map_err(ConfigError::Invalid)?;
    Ok(config)
}

/// Parse a TOML string directly into a validated [`Config`].
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate(&config).map_err(ConfigError::Invalid)?;
    Ok(config)
}

fn find_project_config(start: &Path) -> Option<PathBuf> {
    let root = find_project_root(start)?;
    let candidate = project_dir(&root).join("config.toml");
    candidate.is_file().then_some(candidate)
}

fn has_non_comment_content(content: &str) -> bool {
    content.lines().any(|l| {
        let trimmed = l.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })
}
