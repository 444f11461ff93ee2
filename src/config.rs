use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Directory holding schedule and execution data.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub runner: RunnerSection,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let expanded = expand_env_vars(&contents)?;
        Ok(serde_saphyr::from_str(&expanded)?)
    }
}

/// Resolve a path relative to the config file directory.
///
/// Absolute paths are returned as-is; relative paths are joined with the
/// config file's parent directory so behavior does not depend on the
/// current working directory.
pub fn resolve_path(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    config_dir.join(path)
}

/// Default data directory (relative to the config file).
pub const DEFAULT_DATA_DIR: &str = ".reportd";
/// Schedule definitions directory (relative to the data dir).
pub const SCHEDULES_DIR: &str = "schedules";
/// Execution records directory (relative to the data dir).
pub const EXECUTIONS_DIR: &str = "executions";

// ============================================================================
// SchedulerSection
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SchedulerSection {
    /// Number of report jobs that may execute at once.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// How often the dispatch loop scans the queue for due work.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

fn default_max_concurrent_jobs() -> usize {
    5
}

fn default_tick_interval_ms() -> u64 {
    500
}

// ============================================================================
// RunnerSection
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RunnerSection {
    /// Report pipeline command jobs are handed to. Required for `serve`.
    #[serde(default)]
    pub command: Option<PathBuf>,
    /// Arguments passed to the command before the job request.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the command.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Per-job timeout.
    #[serde(default = "default_job_timeout")]
    pub timeout_seconds: u64,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            working_dir: None,
            timeout_seconds: default_job_timeout(),
        }
    }
}

fn default_job_timeout() -> u64 {
    600
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in the raw config text.
///
/// Supports shell-compatible syntax:
/// - `${VAR}` - required variable, errors if not set
/// - `${VAR:-default}` - variable with a default value
/// - `$$` - escaped `$`
///
/// Nested references (`${VAR:-${OTHER}}`) are not supported, and an
/// unclosed `${` is an error.
///
/// ```yaml
/// data_dir: ${REPORTD_DATA:-.reportd}
/// runner:
///   command: ${REPORT_PIPELINE}
/// ```
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' {
            match chars.peek() {
                // Escaped $ -> literal $
                Some('$') => {
                    chars.next();
                    result.push('$');
                }
                // Start of variable reference
                Some('{') => {
                    chars.next();
                    let expanded = parse_var_reference(&mut chars)?;
                    result.push_str(&expanded);
                }
                // Not a variable reference, keep literal $
                _ => {
                    result.push('$');
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}

/// Parse a variable reference after the opening `${` has been consumed.
fn parse_var_reference(
    chars: &mut std::iter::Peekable<std::str::Chars>,
) -> Result<String, ConfigError> {
    let mut var_name = String::new();
    let mut default_value: Option<String> = None;
    let mut in_default = false;
    let mut found_closing_brace = false;

    while let Some(&c) = chars.peek() {
        match c {
            '}' => {
                chars.next();
                found_closing_brace = true;
                break;
            }
            ':' if !in_default => {
                chars.next();
                if chars.peek() == Some(&'-') {
                    chars.next();
                    in_default = true;
                    default_value = Some(String::new());
                } else {
                    // ':' without '-' is part of the name (unusual but valid)
                    var_name.push(':');
                }
            }
            _ => {
                chars.next();
                if in_default {
                    default_value.as_mut().unwrap().push(c);
                } else {
                    var_name.push(c);
                }
            }
        }
    }

    if !found_closing_brace {
        return Err(ConfigError::UnclosedVarReference);
    }

    match std::env::var(&var_name) {
        Ok(value) => Ok(value),
        Err(_) => match default_value {
            Some(default) => Ok(default),
            None => Err(ConfigError::MissingEnvVar(var_name)),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.data_dir.is_none());
        assert_eq!(config.scheduler.max_concurrent_jobs, 5);
        assert_eq!(config.scheduler.tick_interval_ms, 500);
        assert!(config.runner.command.is_none());
        assert!(config.runner.args.is_empty());
        assert!(config.runner.working_dir.is_none());
        assert_eq!(config.runner.timeout_seconds, 600);
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_defaults() {
        let tmp_dir = TempDir::new().unwrap();
        let missing_path = tmp_dir.path().join("missing-config.yaml");
        let config = Config::load(&missing_path).await.unwrap();
        assert_eq!(config.scheduler.max_concurrent_jobs, 5);
        assert!(config.runner.command.is_none());
    }

    #[tokio::test]
    async fn test_load_valid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
data_dir: "/var/lib/reportd"
scheduler:
  max_concurrent_jobs: 2
  tick_interval_ms: 250
runner:
  command: "/usr/local/bin/report-pipeline"
  args: ["--format", "pdf"]
  working_dir: "/srv/reports"
  timeout_seconds: 120
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/reportd")));
        assert_eq!(config.scheduler.max_concurrent_jobs, 2);
        assert_eq!(config.scheduler.tick_interval_ms, 250);
        assert_eq!(
            config.runner.command,
            Some(PathBuf::from("/usr/local/bin/report-pipeline"))
        );
        assert_eq!(config.runner.args, vec!["--format", "pdf"]);
        assert_eq!(config.runner.working_dir, Some(PathBuf::from("/srv/reports")));
        assert_eq!(config.runner.timeout_seconds, 120);
    }

    #[tokio::test]
    async fn test_load_partial_yaml_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
scheduler:
  max_concurrent_jobs: 8
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.scheduler.max_concurrent_jobs, 8);
        assert_eq!(config.scheduler.tick_interval_ms, 500); // default
        assert_eq!(config.runner.timeout_seconds, 600); // default
        assert!(config.data_dir.is_none()); // default
    }

    #[tokio::test]
    async fn test_load_invalid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(file.path()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_path_absolute() {
        let config_path = Path::new("/etc/reportd/reportd.yaml");
        let result = resolve_path(config_path, Path::new("/var/lib/reportd"));
        assert_eq!(result, PathBuf::from("/var/lib/reportd"));
    }

    #[test]
    fn test_resolve_path_relative() {
        let config_path = Path::new("/etc/reportd/reportd.yaml");
        let result = resolve_path(config_path, Path::new(".reportd"));
        assert_eq!(result, PathBuf::from("/etc/reportd/.reportd"));
    }

    #[test]
    fn test_resolve_path_config_in_current_dir() {
        let config_path = Path::new("reportd.yaml");
        let result = resolve_path(config_path, Path::new(".reportd/schedules"));
        assert_eq!(result, PathBuf::from(".reportd/schedules"));
    }

    #[test]
    fn test_expand_env_vars_no_vars() {
        let input = "plain string without variables";
        let result = expand_env_vars(input).unwrap();
        assert_eq!(result, input);
    }

    #[test]
    fn test_expand_env_vars_required_var() {
        // SAFETY: Single-threaded test
        unsafe { std::env::set_var("REPORTD_TEST_REQUIRED", "test_value") };
        let result = expand_env_vars("prefix ${REPORTD_TEST_REQUIRED} suffix").unwrap();
        assert_eq!(result, "prefix test_value suffix");
        unsafe { std::env::remove_var("REPORTD_TEST_REQUIRED") };
    }

    #[test]
    fn test_expand_env_vars_missing_required_var() {
        // SAFETY: Single-threaded test
        unsafe { std::env::remove_var("REPORTD_MISSING_VAR_12345") };
        let result = expand_env_vars("value: ${REPORTD_MISSING_VAR_12345}");
        match result {
            Err(ConfigError::MissingEnvVar(name)) => {
                assert_eq!(name, "REPORTD_MISSING_VAR_12345");
            }
            other => panic!("expected MissingEnvVar, got {other:?}"),
        }
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        // SAFETY: Single-threaded test
        unsafe { std::env::remove_var("REPORTD_UNSET_WITH_DEFAULT") };
        let result = expand_env_vars("value: ${REPORTD_UNSET_WITH_DEFAULT:-fallback}").unwrap();
        assert_eq!(result, "value: fallback");
    }

    #[test]
    fn test_expand_env_vars_set_var_beats_default() {
        // SAFETY: Single-threaded test
        unsafe { std::env::set_var("REPORTD_SET_WITH_DEFAULT", "actual") };
        let result = expand_env_vars("${REPORTD_SET_WITH_DEFAULT:-fallback}").unwrap();
        assert_eq!(result, "actual");
        unsafe { std::env::remove_var("REPORTD_SET_WITH_DEFAULT") };
    }

    #[test]
    fn test_expand_env_vars_empty_default() {
        // SAFETY: Single-threaded test
        unsafe { std::env::remove_var("REPORTD_EMPTY_DEFAULT") };
        let result = expand_env_vars("value: '${REPORTD_EMPTY_DEFAULT:-}'").unwrap();
        assert_eq!(result, "value: ''");
    }

    #[test]
    fn test_expand_env_vars_escaped_dollar() {
        let result = expand_env_vars("price: $$100").unwrap();
        assert_eq!(result, "price: $100");
    }

    #[test]
    fn test_expand_env_vars_lone_dollar_kept() {
        let result = expand_env_vars("cost is $5").unwrap();
        assert_eq!(result, "cost is $5");
    }

    #[test]
    fn test_expand_env_vars_unclosed_brace() {
        let result = expand_env_vars("value: ${UNCLOSED_VAR");
        assert!(matches!(result, Err(ConfigError::UnclosedVarReference)));
    }

    #[tokio::test]
    async fn test_config_load_expands_env_vars() {
        // SAFETY: Single-threaded test
        unsafe { std::env::set_var("REPORTD_TEST_PIPELINE", "/opt/pipeline/run") };

        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
runner:
  command: ${{REPORTD_TEST_PIPELINE}}
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(
            config.runner.command,
            Some(PathBuf::from("/opt/pipeline/run"))
        );

        unsafe { std::env::remove_var("REPORTD_TEST_PIPELINE") };
    }
}
