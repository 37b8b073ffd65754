use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::identity::IdentityCache;
use aws_config::profile::profile_file::ProfileFiles;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_ecr::config::Credentials;
use aws_sdk_ecr::operation::get_authorization_token::GetAuthorizationTokenOutput;
use aws_sdk_ecr::Client as EcrClient;
use base64::Engine;
use chrono::{DateTime, Utc};

use crate::environment::Environment;
use crate::error::{describe_sdk_error, CredentialError};
use crate::settings::{ASSUME_ROLE_SESSION_NAME, ECR_MAX_ATTEMPTS, ECR_MAX_BACKOFF, ECR_TIMEOUT};

use super::aws::{resolve_account, AccountContext, AccountCredentials, AwsIdentity};
use super::Credential;

const GET_AUTHORIZATION_TOKEN: &str = "ecr:GetAuthorizationToken";
const ASSUME_ROLE: &str = "sts:AssumeRole";

/// Raw authorization data returned by the registry
#[derive(Debug, Clone, Default)]
pub struct AuthorizationToken {
    /// Base64 of `username:password`
    pub token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthorizationToken {
    /// Take the first `authorizationData` entry of a `GetAuthorizationToken` response
    fn from_output(
        account_id: &str,
        output: &GetAuthorizationTokenOutput,
    ) -> Result<Self, CredentialError> {
        let auth_data = output.authorization_data().first().ok_or_else(|| {
            CredentialError::Remote {
                operation: GET_AUTHORIZATION_TOKEN,
                message: format!("no authorization data returned for {:?}", account_id),
            }
        })?;

        Ok(Self {
            token: auth_data.authorization_token().map(str::to_string),
            expires_at: auth_data
                .expires_at()
                .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
        })
    }
}

/// Issues registry authorization tokens for an AWS account
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn authorization_token(
        &self,
        account: &AccountContext,
        credentials: &AccountCredentials,
    ) -> Result<AuthorizationToken, CredentialError>;
}

/// Token issuer backed by the AWS SDK (ECR `GetAuthorizationToken`, STS `AssumeRole`)
#[derive(Debug, Default, Clone)]
pub struct EcrTokenIssuer {
    /// Shared config/credentials files; the SDK's default locations when unset
    profile_files: Option<ProfileFiles>,
}

impl EcrTokenIssuer {
    async fn sdk_config(
        &self,
        account: &AccountContext,
        credentials: &AccountCredentials,
    ) -> SdkConfig {
        let retry_config = RetryConfig::standard()
            .with_max_attempts(ECR_MAX_ATTEMPTS)
            .with_max_backoff(ECR_MAX_BACKOFF);

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(account.region.clone()))
            .retry_config(retry_config)
            .identity_cache(IdentityCache::lazy().build());

        if let Some(files) = &self.profile_files {
            loader = loader.profile_files(files.clone());
        }

        let loader = match &credentials.identity {
            AwsIdentity::Static(creds) => loader.credentials_provider(Credentials::new(
                &creds.access_key_id,
                &creds.secret_access_key,
                creds.session_token.clone(),
                None,
                creds.source.provider_name(),
            )),
            // The default chain would prefer AWS_ACCESS_KEY_ID over the profile,
            // so the profile provider is installed explicitly.
            AwsIdentity::Profile(name) => {
                let mut provider = ProfileFileCredentialsProvider::builder().profile_name(name);
                if let Some(files) = &self.profile_files {
                    provider = provider.profile_files(files.clone());
                }
                loader
                    .profile_name(name)
                    .credentials_provider(provider.build())
            }
        };

        loader.load().await
    }

    /// Exchange the base identity for temporary credentials of `role_arn`
    async fn assume_role(
        config: &SdkConfig,
        role_arn: &str,
    ) -> Result<Credentials, CredentialError> {
        let sts = aws_sdk_sts::Client::new(config);

        let output = sts
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(ASSUME_ROLE_SESSION_NAME)
            .send()
            .await
            .map_err(|e| CredentialError::Remote {
                operation: ASSUME_ROLE,
                message: describe_sdk_error(&e),
            })?;

        let assumed = output.credentials().ok_or_else(|| CredentialError::Remote {
            operation: ASSUME_ROLE,
            message: format!("no credentials returned for role {}", role_arn),
        })?;

        Ok(Credentials::new(
            assumed.access_key_id(),
            assumed.secret_access_key(),
            Some(assumed.session_token().to_string()),
            SystemTime::try_from(*assumed.expiration()).ok(),
            "AssumeRole",
        ))
    }
}

#[async_trait]
impl TokenIssuer for EcrTokenIssuer {
    async fn authorization_token(
        &self,
        account: &AccountContext,
        credentials: &AccountCredentials,
    ) -> Result<AuthorizationToken, CredentialError> {
        let config = self.sdk_config(account, credentials).await;

        let mut ecr_config = aws_sdk_ecr::config::Builder::from(&config);
        if let Some(role_arn) = &credentials.role_arn {
            tracing::debug!("Assuming role {} for account {}", role_arn, account.account_id);
            let assumed = Self::assume_role(&config, role_arn).await?;
            ecr_config = ecr_config.credentials_provider(assumed);
        }

        let client = EcrClient::from_conf(ecr_config.build());

        let response = client
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| CredentialError::Remote {
                operation: GET_AUTHORIZATION_TOKEN,
                message: describe_sdk_error(&e),
            })?;

        AuthorizationToken::from_output(&account.account_id, &response)
    }
}

/// Decode a base64 `username:password` registry token.
///
/// Splits on the first colon only; the password may itself contain colons.
pub fn decode_token(account_id: &str, token: Option<&str>) -> Result<Credential, CredentialError> {
    let token = token.ok_or_else(|| {
        CredentialError::Decode(format!("authorization token for {:?} is nil", account_id))
    })?;

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(token.trim())
        .map_err(|e| {
            CredentialError::Decode(format!(
                "failed to decode authorization token for {:?}: {}",
                account_id, e
            ))
        })?;

    let decoded = String::from_utf8(decoded).map_err(|_| {
        CredentialError::Decode(format!(
            "authorization token for {:?} is not valid UTF-8",
            account_id
        ))
    })?;

    match decoded.split_once(':') {
        Some((username, secret)) if !username.is_empty() && !secret.is_empty() => {
            Ok(Credential::new(username, secret))
        }
        _ => Err(CredentialError::Decode(format!(
            "invalid authorization token format for {:?}",
            account_id
        ))),
    }
}

/// Resolve AWS credentials for `account` and trade them for registry credentials.
///
/// The token request (including any role assumption) is bounded by a fixed timeout.
pub async fn exchange(
    env: &dyn Environment,
    issuer: &dyn TokenIssuer,
    account: &AccountContext,
    debug: bool,
) -> Result<Credential, CredentialError> {
    let credentials = resolve_account(env, account)?;

    if debug {
        tracing::info!(
            "Authenticating access to '{}/' with {:?}",
            account.registry_host(),
            credentials.describe()
        );
    }

    let request = issuer.authorization_token(account, &credentials);
    let token = tokio::time::timeout(ECR_TIMEOUT, request)
        .await
        .map_err(|_| CredentialError::Timeout(ECR_TIMEOUT))??;

    if debug {
        if let Some(expires_at) = token.expires_at {
            tracing::info!(
                "ECR token for {:?} will expire at {} (UTC)",
                account.account_id,
                expires_at.to_rfc3339()
            );
        }
    }

    decode_token(&account.account_id, token.token.as_deref())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::environment::env_from;
    use crate::error::ErrorKind;
    use aws_config::profile::profile_file::ProfileFileKind;
    use aws_credential_types::provider::ProvideCredentials;
    use aws_sdk_ecr::primitives::DateTime as SdkDateTime;
    use aws_sdk_ecr::types::AuthorizationData;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Issuer that returns a canned token and records what it was asked for
    #[derive(Default)]
    pub(crate) struct StubIssuer {
        pub token: Option<String>,
        pub delay: Option<Duration>,
        pub seen: Mutex<Vec<AccountCredentials>>,
    }

    impl StubIssuer {
        pub(crate) fn returning(plain: &str) -> Self {
            Self {
                token: Some(base64::engine::general_purpose::STANDARD.encode(plain)),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl TokenIssuer for StubIssuer {
        async fn authorization_token(
            &self,
            _account: &AccountContext,
            credentials: &AccountCredentials,
        ) -> Result<AuthorizationToken, CredentialError> {
            self.seen.lock().unwrap().push(credentials.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(AuthorizationToken {
                token: self.token.clone(),
                expires_at: Some(Utc::now()),
            })
        }
    }

    fn account() -> AccountContext {
        AccountContext::new("123456789012", "us-east-1")
    }

    #[test]
    fn test_decode_token() {
        let token = base64::engine::general_purpose::STANDARD.encode("AWS:secrettoken");
        let credential = decode_token("123", Some(token.as_str())).unwrap();
        assert_eq!(credential, Credential::new("AWS", "secrettoken"));
    }

    #[test]
    fn test_decode_token_splits_on_first_colon() {
        let token = base64::engine::general_purpose::STANDARD.encode("AWS:pass:with:colons");
        let credential = decode_token("123", Some(token.as_str())).unwrap();
        assert_eq!(credential.secret(), "pass:with:colons");
    }

    #[test]
    fn test_decode_token_errors() {
        let nil = decode_token("123", None).unwrap_err();
        assert_eq!(nil.kind(), ErrorKind::Decode);
        assert_eq!(nil.to_string(), "ecr: authorization token for \"123\" is nil");

        let bad_base64 = decode_token("123", Some("not base64!")).unwrap_err();
        assert_eq!(bad_base64.kind(), ErrorKind::Decode);

        let no_colon = base64::engine::general_purpose::STANDARD.encode("AWSsecret");
        let err = decode_token("123", Some(no_colon.as_str())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ecr: invalid authorization token format for \"123\""
        );
    }

    async fn provided_access_key(config: &SdkConfig) -> String {
        config
            .credentials_provider()
            .unwrap()
            .provide_credentials()
            .await
            .unwrap()
            .access_key_id()
            .to_string()
    }

    #[tokio::test]
    async fn test_sdk_config_static_credentials() {
        let env = env_from(&[
            ("AWS_ACCESS_KEY_ID_123456789012", "SUFFIXEDKEY"),
            ("AWS_SECRET_ACCESS_KEY_123456789012", "SUFFIXEDSECRET"),
            ("AWS_ACCESS_KEY_ID", "STDKEY"),
            ("AWS_SECRET_ACCESS_KEY", "STDSECRET"),
        ]);
        let account = AccountContext::new("123456789012", "eu-central-1");
        let credentials = resolve_account(&env, &account).unwrap();

        let config = EcrTokenIssuer::default()
            .sdk_config(&account, &credentials)
            .await;

        assert_eq!(config.region(), Some(&Region::new("eu-central-1")));
        let retry = config.retry_config().unwrap();
        assert_eq!(retry.max_attempts(), ECR_MAX_ATTEMPTS);
        assert_eq!(retry.max_backoff(), ECR_MAX_BACKOFF);
        assert_eq!(provided_access_key(&config).await, "SUFFIXEDKEY");
    }

    #[tokio::test]
    async fn test_sdk_config_profile_wins_over_standard_keys() {
        let temp_dir = TempDir::new().unwrap();
        let credentials_file = temp_dir.path().join("credentials");
        std::fs::write(
            &credentials_file,
            "[acct-profile]\naws_access_key_id = PROFILEKEY\naws_secret_access_key = PROFILESECRET\n",
        )
        .unwrap();

        let env = env_from(&[
            ("AWS_PROFILE_123456789012", "acct-profile"),
            ("AWS_ACCESS_KEY_ID", "AMBIENTKEY"),
            ("AWS_SECRET_ACCESS_KEY", "AMBIENTSECRET"),
        ]);
        let credentials = resolve_account(&env, &account()).unwrap();
        assert_eq!(
            credentials.identity,
            AwsIdentity::Profile("acct-profile".into())
        );

        let issuer = EcrTokenIssuer {
            profile_files: Some(
                ProfileFiles::builder()
                    .with_file(ProfileFileKind::Credentials, &credentials_file)
                    .build(),
            ),
        };
        let config = issuer.sdk_config(&account(), &credentials).await;

        assert_eq!(config.region(), Some(&Region::new("us-east-1")));
        assert_eq!(provided_access_key(&config).await, "PROFILEKEY");
    }

    #[test]
    fn test_authorization_token_from_output() {
        let output = GetAuthorizationTokenOutput::builder()
            .authorization_data(
                AuthorizationData::builder()
                    .authorization_token("QVdTOnNlY3JldA==")
                    .expires_at(SdkDateTime::from_secs(1_700_000_000))
                    .build(),
            )
            .build();

        let token = AuthorizationToken::from_output("123", &output).unwrap();
        assert_eq!(token.token.as_deref(), Some("QVdTOnNlY3JldA=="));
        assert_eq!(
            token.expires_at,
            DateTime::from_timestamp(1_700_000_000, 0)
        );
    }

    #[test]
    fn test_authorization_token_missing_data() {
        let output = GetAuthorizationTokenOutput::builder().build();

        let err = AuthorizationToken::from_output("123", &output).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert_eq!(
            err.to_string(),
            "ecr:GetAuthorizationToken failed: no authorization data returned for \"123\""
        );
    }

    #[tokio::test]
    async fn test_exchange_with_standard_credentials() {
        let env = env_from(&[
            ("AWS_ACCESS_KEY_ID", "STD-AKIA..."),
            ("AWS_SECRET_ACCESS_KEY", "STD-wJalr..."),
        ]);
        let issuer = StubIssuer::returning("AWS:secrettoken");

        let credential = exchange(&env, &issuer, &account(), true).await.unwrap();
        assert_eq!(credential, Credential::new("AWS", "secrettoken"));

        let seen = issuer.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0].identity, AwsIdentity::Static(_)));
        assert_eq!(seen[0].role_arn, None);
    }

    #[tokio::test]
    async fn test_exchange_stops_on_partial_config() {
        let env = env_from(&[("AWS_ACCESS_KEY_ID_123456789012", "AKIA...")]);
        let issuer = StubIssuer::returning("AWS:secrettoken");

        let err = exchange(&env, &issuer, &account(), false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialConfig);
        assert!(issuer.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_nil_token() {
        let env = env_from(&[
            ("AWS_ACCESS_KEY_ID", "STD-AKIA..."),
            ("AWS_SECRET_ACCESS_KEY", "STD-wJalr..."),
        ]);
        let issuer = StubIssuer::default();

        let err = exchange(&env, &issuer, &account(), false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exchange_times_out() {
        let env = env_from(&[
            ("AWS_ACCESS_KEY_ID", "STD-AKIA..."),
            ("AWS_SECRET_ACCESS_KEY", "STD-wJalr..."),
        ]);
        let issuer = StubIssuer {
            delay: Some(ECR_TIMEOUT + Duration::from_secs(1)),
            ..StubIssuer::returning("AWS:secrettoken")
        };

        let err = exchange(&env, &issuer, &account(), false).await.unwrap_err();
        assert!(matches!(err, CredentialError::Timeout(_)));
    }
}
