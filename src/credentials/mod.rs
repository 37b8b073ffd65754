pub mod aws;
pub mod ecr;
pub mod ghcr;
pub mod hostname;
pub mod tiered;

use std::fmt;
use std::sync::Arc;

use crate::environment::{Environment, ProcessEnv};
use crate::error::CredentialError;
use crate::settings::Settings;

use aws::AccountContext;
use ecr::{EcrTokenIssuer, TokenIssuer};
use hostname::RegistryKind;

/// A registry login. Both fields are always non-empty.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    username: String,
    secret: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"** redacted **")
            .finish()
    }
}

/// Maps a registry server URL to credentials.
///
/// Resolution order:
/// 1. `DOCKER_<labels>_USR/_PSW` pairs, most specific first
/// 2. AWS ECR token exchange for `<account>.dkr.ecr.<region>.amazonaws.com`
/// 3. `GITHUB_TOKEN` for `ghcr.io`
///
/// `Ok(None)` means no source matched, which is not a failure.
pub struct Resolver {
    env: Box<dyn Environment>,
    issuer: Arc<dyn TokenIssuer>,
    settings: Settings,
}

impl Resolver {
    pub fn new(env: impl Environment + 'static, issuer: Arc<dyn TokenIssuer>) -> Self {
        let settings = Settings::from_env(&env);
        Self {
            env: Box::new(env),
            issuer,
            settings,
        }
    }

    /// Resolver over the process environment, using the AWS SDK for ECR
    pub fn from_process_env() -> Self {
        Self::new(ProcessEnv, Arc::new(EcrTokenIssuer::default()))
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub async fn get(&self, server_url: &str) -> Result<Option<Credential>, CredentialError> {
        let hostname = hostname::normalize(server_url)?;
        let env = self.env.as_ref();

        if let Some(credential) = tiered::lookup(env, &hostname) {
            return Ok(Some(credential));
        }

        match RegistryKind::classify(&hostname) {
            RegistryKind::ManagedCloudRegistry { account, region } => {
                let account = AccountContext::new(account, region);
                ecr::exchange(env, self.issuer.as_ref(), &account, self.settings.debug)
                    .await
                    .map(Some)
            }
            RegistryKind::PackageRegistry => Ok(ghcr::lookup(env)),
            RegistryKind::Generic => {
                tracing::debug!("No credentials configured for {}", hostname);
                Ok(None)
            }
        }
    }
}
