//! AWS credential selection for a single account.
//!
//! Account-suffixed variables (`AWS_ACCESS_KEY_ID_<account>`, ...) take
//! precedence over the standard ones. Once any suffixed credential variable
//! is present, the suffixed access key and secret key are both mandatory:
//! there is no silent fallback to ambient credentials in that case.

use std::fmt;

use crate::environment::Environment;
use crate::error::CredentialError;
use crate::settings::{
    ENV_AWS_ACCESS_KEY_ID, ENV_AWS_PROFILE, ENV_AWS_ROLE_ARN, ENV_AWS_SECRET_ACCESS_KEY,
    ENV_AWS_SESSION_TOKEN,
};

/// The AWS principal whose credentials are being resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountContext {
    pub account_id: String,
    /// Only used in diagnostics
    pub region: String,
}

impl AccountContext {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
        }
    }

    fn suffixed(&self, name: &str) -> String {
        format!("{}_{}", name, self.account_id)
    }

    pub fn registry_host(&self) -> String {
        format!("{}.dkr.ecr.{}.amazonaws.com", self.account_id, self.region)
    }
}

/// Where a set of AWS credentials came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Suffixed { account: String },
    Standard { account: String },
    Profile { name: String },
    AssumedRole { role_arn: String },
}

impl CredentialSource {
    /// Provider name attached to the SDK credentials object
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Suffixed { .. } => "SuffixedEnvironment",
            Self::Standard { .. } => "StandardEnvironment",
            Self::Profile { .. } => "Profile",
            Self::AssumedRole { .. } => "AssumeRole",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suffixed { account } => {
                write!(f, "Suffixed AWS Environment (Account: {})", account)
            }
            Self::Standard { account } => {
                write!(f, "Standard AWS Environment (Account: {})", account)
            }
            Self::Profile { name } => write!(f, "AWS Profile ({})", name),
            Self::AssumedRole { role_arn } => write!(f, "Assumed Role ({})", role_arn),
        }
    }
}

/// Static AWS keys plus a description of their origin
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedAwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub source: CredentialSource,
}

impl fmt::Debug for ResolvedAwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedAwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .field("source", &self.source)
            .finish()
    }
}

/// How the SDK should authenticate before the optional role assumption
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwsIdentity {
    /// Explicit keys from the environment
    Static(ResolvedAwsCredentials),
    /// A named profile, loaded through the SDK's shared config files
    Profile(String),
}

impl AwsIdentity {
    pub fn source(&self) -> CredentialSource {
        match self {
            Self::Static(creds) => creds.source.clone(),
            Self::Profile(name) => CredentialSource::Profile { name: name.clone() },
        }
    }
}

/// Result of resolving an account: the base identity and the role to assume, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCredentials {
    pub identity: AwsIdentity,
    pub role_arn: Option<String>,
}

impl AccountCredentials {
    /// Human-readable description of the effective credential source
    pub fn describe(&self) -> String {
        match &self.role_arn {
            Some(role_arn) => format!(
                "{} via {}",
                CredentialSource::AssumedRole {
                    role_arn: role_arn.clone()
                },
                self.identity.source()
            ),
            None => self.identity.source().to_string(),
        }
    }
}

type IdentityResolver =
    fn(&dyn Environment, &AccountContext) -> Result<Option<AwsIdentity>, CredentialError>;

/// Resolvers in priority order; the first `Some` wins, the first error aborts.
const IDENTITY_RESOLVERS: &[(&str, IdentityResolver)] = &[
    ("suffixed-environment", from_suffixed_env),
    ("suffixed-profile", from_suffixed_profile),
    ("standard-environment", from_standard_env),
    ("standard-profile", from_standard_profile),
];

/// Resolve the credentials and role to use for `account`.
pub fn resolve_account(
    env: &dyn Environment,
    account: &AccountContext,
) -> Result<AccountCredentials, CredentialError> {
    if account.account_id.is_empty() {
        return Err(CredentialError::MissingAccountId);
    }

    let mut identity = None;
    for (name, resolver) in IDENTITY_RESOLVERS {
        if let Some(found) = resolver(env, account)? {
            tracing::debug!(
                resolver = *name,
                account = %account.account_id,
                "Resolved AWS identity"
            );
            identity = Some(found);
            break;
        }
    }

    let identity = identity.ok_or_else(|| CredentialError::NoCredentials {
        variable: ENV_AWS_ACCESS_KEY_ID.to_string(),
    })?;

    let account_specific = match &identity {
        AwsIdentity::Static(creds) => {
            matches!(creds.source, CredentialSource::Suffixed { .. })
        }
        AwsIdentity::Profile(_) => env.non_empty(&account.suffixed(ENV_AWS_PROFILE)).is_some(),
    };
    let role_arn = role_arn(env, account, account_specific);

    Ok(AccountCredentials { identity, role_arn })
}

/// Account-suffixed keys, under the all-or-nothing rule
fn from_suffixed_env(
    env: &dyn Environment,
    account: &AccountContext,
) -> Result<Option<AwsIdentity>, CredentialError> {
    let access_key_var = account.suffixed(ENV_AWS_ACCESS_KEY_ID);
    let secret_key_var = account.suffixed(ENV_AWS_SECRET_ACCESS_KEY);
    let session_token_var = account.suffixed(ENV_AWS_SESSION_TOKEN);

    let access_key_id = env.non_empty(&access_key_var);
    let secret_access_key = env.non_empty(&secret_key_var);
    let session_token = env.non_empty(&session_token_var);

    if access_key_id.is_none() && secret_access_key.is_none() && session_token.is_none() {
        return Ok(None);
    }

    let access_key_id = access_key_id.ok_or(CredentialError::IncompleteAccountCredentials {
        variable: access_key_var,
    })?;
    let secret_access_key =
        secret_access_key.ok_or(CredentialError::IncompleteAccountCredentials {
            variable: secret_key_var,
        })?;

    Ok(Some(AwsIdentity::Static(ResolvedAwsCredentials {
        access_key_id,
        secret_access_key,
        session_token,
        source: CredentialSource::Suffixed {
            account: account.account_id.clone(),
        },
    })))
}

fn from_suffixed_profile(
    env: &dyn Environment,
    account: &AccountContext,
) -> Result<Option<AwsIdentity>, CredentialError> {
    Ok(env
        .non_empty(&account.suffixed(ENV_AWS_PROFILE))
        .map(AwsIdentity::Profile))
}

/// Standard keys. Both absent means "not applicable"; only one present is an error.
fn from_standard_env(
    env: &dyn Environment,
    account: &AccountContext,
) -> Result<Option<AwsIdentity>, CredentialError> {
    let access_key_id = env.non_empty(ENV_AWS_ACCESS_KEY_ID);
    let secret_access_key = env.non_empty(ENV_AWS_SECRET_ACCESS_KEY);

    match (access_key_id, secret_access_key) {
        (None, None) => Ok(None),
        (None, Some(_)) => Err(CredentialError::NoCredentials {
            variable: ENV_AWS_ACCESS_KEY_ID.to_string(),
        }),
        (Some(_), None) => Err(CredentialError::NoCredentials {
            variable: ENV_AWS_SECRET_ACCESS_KEY.to_string(),
        }),
        (Some(access_key_id), Some(secret_access_key)) => {
            Ok(Some(AwsIdentity::Static(ResolvedAwsCredentials {
                access_key_id,
                secret_access_key,
                session_token: env.non_empty(ENV_AWS_SESSION_TOKEN),
                source: CredentialSource::Standard {
                    account: account.account_id.clone(),
                },
            })))
        }
    }
}

fn from_standard_profile(
    env: &dyn Environment,
    _account: &AccountContext,
) -> Result<Option<AwsIdentity>, CredentialError> {
    Ok(env.non_empty(ENV_AWS_PROFILE).map(AwsIdentity::Profile))
}

/// The role to assume, if any.
///
/// The suffixed role always applies. The standard `AWS_ROLE_ARN` only applies
/// when the credentials themselves are not account-specific.
pub fn role_arn(
    env: &dyn Environment,
    account: &AccountContext,
    account_specific: bool,
) -> Option<String> {
    if let Some(arn) = env.non_empty(&account.suffixed(ENV_AWS_ROLE_ARN)) {
        return Some(arn.trim().to_string());
    }

    if account_specific {
        return None;
    }

    env.non_empty(ENV_AWS_ROLE_ARN)
        .map(|arn| arn.trim().to_string())
}
