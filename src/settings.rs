use std::time::Duration;

use crate::environment::Environment;

/// Prefix of the generic `<PREFIX>_<labels>_USR/_PSW` variables
pub const ENV_PREFIX: &str = "DOCKER";
pub const ENV_USERNAME_SUFFIX: &str = "USR";
pub const ENV_PASSWORD_SUFFIX: &str = "PSW";
pub const ENV_SEPARATOR: &str = "_";

pub const ENV_IGNORE_LOGIN: &str = "IGNORE_DOCKER_LOGIN";
pub const ENV_DEBUG_MODE: &str = "DOCKER_CREDENTIAL_ENV_DEBUG";
pub const ENV_DOCKER_CONFIG: &str = "DOCKER_CONFIG";

pub const ENV_AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const ENV_AWS_ROLE_ARN: &str = "AWS_ROLE_ARN";
pub const ENV_AWS_PROFILE: &str = "AWS_PROFILE";

pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
/// Username GitHub expects when a token is used as the password
pub const GITHUB_TOKEN_USERNAME: &str = "x-access-token";

pub const ECR_MAX_ATTEMPTS: u32 = 10;
pub const ECR_MAX_BACKOFF: Duration = Duration::from_secs(5);
pub const ECR_TIMEOUT: Duration = Duration::from_secs(30);
pub const ASSUME_ROLE_SESSION_NAME: &str = "docker-credential-env";

/// Process-level switches read once per invocation
#[derive(Debug, Clone, Copy, Default)]
pub struct Settings {
    /// Emit credential-source diagnostics on stderr
    pub debug: bool,
    /// Turn `store`/`erase` into successful no-ops
    pub ignore_login: bool,
}

impl Settings {
    pub fn from_env(env: &dyn Environment) -> Self {
        Self {
            debug: env.flag(ENV_DEBUG_MODE),
            ignore_login: env.non_empty(ENV_IGNORE_LOGIN).is_some(),
        }
    }

    /// Default tracing filter when `RUST_LOG` is not set
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug {
            "warn,docker_credential_env=debug"
        } else {
            "warn"
        }
    }
}
