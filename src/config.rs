//! Application configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::UnmappedActionPolicy;

/// Development default values - NEVER use in production.
pub mod defaults {
    pub const DEV_DATABASE_URL: &str = "sqlite://qa-pipeline.db?mode=rwc";
    pub const DEV_DB_MAX_CONNECTIONS: u32 = 5;
    pub const DEV_RUNNER_PROGRAM: &str = "npx";
    pub const DEV_RUNNER_ARGS: &str = "cypress run --spec";
    pub const DEV_RUNNER_TIMEOUT_SECS: u64 = 900; // 15 minutes per script
    pub const DEV_ARTIFACTS_DIR: &str = "./artifacts";
    pub const DEV_QUEUE_CAPACITY: usize = 256;
    pub const DEV_STALE_RUN_GRACE_SECS: u64 = 300;
    pub const DEV_RECOVERY_INTERVAL_SECS: u64 = 60;
}

/// Runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Parse environment from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    /// Check if this is a development environment.
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// Check if this is a production environment.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Database connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URL (`postgres://...` or `sqlite:...`)
    pub url: String,
    /// Upper bound on pooled connections
    pub max_connections: u32,
}

/// External test tool invocation settings.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Executable of the test-automation tool
    pub program: String,
    /// Fixed arguments placed before the script path
    pub args: Vec<String>,
    /// Working directory for the tool (inherits the process cwd when unset)
    pub working_dir: Option<PathBuf>,
    /// Directory the tool writes screenshots/videos into
    pub artifacts_dir: PathBuf,
    /// Wall-clock bound on one script execution
    pub timeout: Duration,
}

/// Background execution settings.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Number of runs executed concurrently
    pub workers: usize,
    /// Pending tasks buffered before `create_run` waits for space
    pub queue_capacity: usize,
    /// Extra time past the runner timeout before a `running` run counts as abandoned
    pub stale_run_grace: Duration,
    /// How often the recovery sweep runs
    pub recovery_interval: Duration,
}

/// Authorization settings.
#[derive(Debug, Clone, Copy)]
pub struct AuthzConfig {
    /// Decision for action verbs that do not classify as read/create/update/delete
    pub unmapped_action_policy: UnmappedActionPolicy,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Runtime environment
    pub environment: Environment,
    /// Database settings
    pub database: DatabaseConfig,
    /// Test tool settings
    pub runner: RunnerConfig,
    /// Worker pool settings
    pub execution: ExecutionConfig,
    /// Authorization engine settings
    pub authz: AuthzConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In development mode (RUST_ENV=development) every variable has a default.
    /// In production mode DATABASE_URL must point at a non-default database.
    ///
    /// Environment variables:
    /// - `RUST_ENV`: Environment (development/production) - REQUIRED
    /// - `DATABASE_URL`: Database connection string
    /// - `QAP_DB_MAX_CONNECTIONS`: Pool size (default: 5)
    /// - `QAP_RUNNER_PROGRAM`: Test tool executable (default: npx)
    /// - `QAP_RUNNER_ARGS`: Whitespace-separated fixed arguments (default: "cypress run --spec")
    /// - `QAP_RUNNER_WORKDIR`: Working directory for the test tool
    /// - `QAP_RUNNER_TIMEOUT_SECS`: Per-script timeout (default: 900)
    /// - `QAP_ARTIFACTS_DIR`: Screenshot/video output directory (default: ./artifacts)
    /// - `QAP_EXECUTION_WORKERS`: Concurrent executions (default: CPU count)
    /// - `QAP_QUEUE_CAPACITY`: Execution queue bound (default: 256)
    /// - `QAP_STALE_RUN_GRACE_SECS`: Grace before abandoned runs are closed (default: 300)
    /// - `QAP_RECOVERY_INTERVAL_SECS`: Recovery sweep interval (default: 60)
    /// - `QAP_UNMAPPED_ACTION_POLICY`: allow/deny for unclassified actions (default: allow)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Parse environment - required
        let env_str = env::var("RUST_ENV").map_err(|_| ConfigError::MissingEnvVar("RUST_ENV"))?;

        let environment = Environment::parse(&env_str).ok_or(ConfigError::InvalidValue(
            "RUST_ENV must be 'development' or 'production'",
        ))?;

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").unwrap_or_else(|_| defaults::DEV_DATABASE_URL.to_string()),
            max_connections: parse_var(
                "QAP_DB_MAX_CONNECTIONS",
                defaults::DEV_DB_MAX_CONNECTIONS,
                "QAP_DB_MAX_CONNECTIONS must be a valid number",
            )?,
        };

        let runner = RunnerConfig {
            program: env::var("QAP_RUNNER_PROGRAM")
                .unwrap_or_else(|_| defaults::DEV_RUNNER_PROGRAM.to_string()),
            args: env::var("QAP_RUNNER_ARGS")
                .unwrap_or_else(|_| defaults::DEV_RUNNER_ARGS.to_string())
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            working_dir: env::var("QAP_RUNNER_WORKDIR").ok().map(PathBuf::from),
            artifacts_dir: PathBuf::from(
                env::var("QAP_ARTIFACTS_DIR")
                    .unwrap_or_else(|_| defaults::DEV_ARTIFACTS_DIR.to_string()),
            ),
            timeout: Duration::from_secs(parse_var(
                "QAP_RUNNER_TIMEOUT_SECS",
                defaults::DEV_RUNNER_TIMEOUT_SECS,
                "QAP_RUNNER_TIMEOUT_SECS must be a valid number",
            )?),
        };

        let execution = ExecutionConfig {
            workers: parse_var(
                "QAP_EXECUTION_WORKERS",
                num_cpus::get(),
                "QAP_EXECUTION_WORKERS must be a valid number",
            )?,
            queue_capacity: parse_var(
                "QAP_QUEUE_CAPACITY",
                defaults::DEV_QUEUE_CAPACITY,
                "QAP_QUEUE_CAPACITY must be a valid number",
            )?,
            stale_run_grace: Duration::from_secs(parse_var(
                "QAP_STALE_RUN_GRACE_SECS",
                defaults::DEV_STALE_RUN_GRACE_SECS,
                "QAP_STALE_RUN_GRACE_SECS must be a valid number",
            )?),
            recovery_interval: Duration::from_secs(parse_var(
                "QAP_RECOVERY_INTERVAL_SECS",
                defaults::DEV_RECOVERY_INTERVAL_SECS,
                "QAP_RECOVERY_INTERVAL_SECS must be a valid number",
            )?),
        };

        let unmapped_action_policy = match env::var("QAP_UNMAPPED_ACTION_POLICY") {
            Ok(value) => UnmappedActionPolicy::parse(&value).ok_or(ConfigError::InvalidValue(
                "QAP_UNMAPPED_ACTION_POLICY must be 'allow' or 'deny'",
            ))?,
            Err(_) => UnmappedActionPolicy::default(),
        };

        let config = Config {
            environment,
            database,
            runner,
            execution,
            authz: AuthzConfig {
                unmapped_action_policy,
            },
        };

        config.validate()?;

        // Validate production configuration
        if environment.is_production() {
            config.validate_production()?;
        }

        Ok(config)
    }

    /// Reject values that would make the pipeline unusable in any environment.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.program.trim().is_empty() {
            return Err(ConfigError::InvalidValue("QAP_RUNNER_PROGRAM must not be empty"));
        }
        if self.runner.timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "QAP_RUNNER_TIMEOUT_SECS must be greater than zero",
            ));
        }
        if self.execution.workers == 0 {
            return Err(ConfigError::InvalidValue(
                "QAP_EXECUTION_WORKERS must be greater than zero",
            ));
        }
        if self.execution.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "QAP_QUEUE_CAPACITY must be greater than zero",
            ));
        }
        if self.execution.recovery_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "QAP_RECOVERY_INTERVAL_SECS must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Validate that production configuration does not use development defaults.
    fn validate_production(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.database.url == defaults::DEV_DATABASE_URL {
            errors.push(format!(
                "DATABASE_URL is using development default '{}'. Set a production PostgreSQL URL.",
                defaults::DEV_DATABASE_URL
            ));
        } else if self.database.url.starts_with("sqlite:") {
            errors.push(
                "DATABASE_URL points at SQLite. Production requires PostgreSQL.".to_string(),
            );
        }

        if !errors.is_empty() {
            return Err(ConfigError::ProductionValidation(errors));
        }

        Ok(())
    }

    /// Check if running in development mode.
    pub fn is_development(&self) -> bool {
        self.environment.is_development()
    }
}

fn parse_var<T: std::str::FromStr>(
    name: &str,
    default: T,
    message: &'static str,
) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(message)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(&'static str),

    #[error("Production configuration validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    ProductionValidation(Vec<String>),
}
