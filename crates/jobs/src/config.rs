use std::path::PathBuf;
use std::str::FromStr;

use refinery_core::log_buffer::DEFAULT_LOG_CAPACITY;
use refinery_events::DEFAULT_MAX_SUBSCRIBERS_PER_JOB;

/// Job engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// Log entries retained per job before the oldest are evicted.
    pub log_capacity: usize,
    /// Maximum concurrently running processes; `0` means unbounded.
    pub max_concurrent: usize,
    /// Maximum live subscribers per job; `0` means unbounded.
    pub max_subscribers_per_job: usize,
    /// Working directory for jobs that do not name one.
    pub working_dir: PathBuf,
    /// Executable used for import / refine / contract jobs.
    pub cli_program: String,
    /// Root under which per-job output directories are created.
    pub output_root: PathBuf,
}

impl JobsConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default              |
    /// |------------------------|----------------------|
    /// | `JOB_LOG_CAPACITY`     | `2000`               |
    /// | `JOB_MAX_CONCURRENT`   | `0` (unbounded)      |
    /// | `JOB_MAX_SUBSCRIBERS`  | `64`                 |
    /// | `JOB_WORKING_DIR`      | process cwd          |
    /// | `REFINERY_CLI`         | `refinery`           |
    /// | `REFINERY_OUTPUT_ROOT` | `./data/outputs`     |
    ///
    /// Panics on unparsable numbers so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let log_capacity = parse_env("JOB_LOG_CAPACITY", defaults.log_capacity);
        let max_concurrent = parse_env("JOB_MAX_CONCURRENT", defaults.max_concurrent);
        let max_subscribers_per_job =
            parse_env("JOB_MAX_SUBSCRIBERS", defaults.max_subscribers_per_job);

        let working_dir = std::env::var("JOB_WORKING_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.working_dir);

        let cli_program = std::env::var("REFINERY_CLI")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.cli_program);

        let output_root = std::env::var("REFINERY_OUTPUT_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.output_root);

        Self {
            log_capacity,
            max_concurrent,
            max_subscribers_per_job,
            working_dir,
            cli_program,
            output_root,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
            max_concurrent: 0,
            max_subscribers_per_job: DEFAULT_MAX_SUBSCRIBERS_PER_JOB,
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            cli_program: "refinery".to_string(),
            output_root: PathBuf::from("./data/outputs"),
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid number: {e}")),
        Err(_) => default,
    }
}
