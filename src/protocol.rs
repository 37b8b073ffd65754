//! The docker credential-helper protocol: one verb per invocation, the
//! payload on stdin and the JSON response on stdout.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::credentials::Resolver;
use crate::error::CredentialError;
use crate::settings::Settings;

/// Response to `get`
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetResponse<'a> {
    #[serde(rename = "ServerURL")]
    pub server_url: &'a str,
    pub username: &'a str,
    pub secret: &'a str,
}

/// Payload of `store`; only parsed so that malformed input is still rejected
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoreRequest {
    #[serde(rename = "ServerURL")]
    pub server_url: String,
    #[allow(dead_code)]
    pub username: String,
    #[allow(dead_code)]
    pub secret: String,
}

fn read_input(mut input: impl Read) -> Result<String> {
    let mut buffer = String::new();
    input
        .read_to_string(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer.trim().to_string())
}

/// `get`: resolve credentials for the server URL on stdin.
///
/// Writes `{}` when no credentials are configured for the host.
pub async fn get(resolver: &Resolver, input: impl Read, mut out: impl Write) -> Result<()> {
    let server_url = read_input(input)?;
    if server_url.is_empty() {
        anyhow::bail!("no credentials server URL");
    }

    let credential = resolver.get(&server_url).await?;

    match credential {
        Some(credential) => {
            let response = GetResponse {
                server_url: &server_url,
                username: credential.username(),
                secret: credential.secret(),
            };
            serde_json::to_writer(&mut out, &response).context("Failed to write response")?;
        }
        None => {
            tracing::debug!("No credentials found for {}", server_url);
            serde_json::to_writer(&mut out, &serde_json::json!({}))
                .context("Failed to write response")?;
        }
    }

    writeln!(out).context("Failed to write response")?;
    Ok(())
}

/// `store`: this helper never persists credentials
pub fn store(settings: &Settings, input: impl Read) -> Result<()> {
    let payload = read_input(input)?;
    let request: StoreRequest =
        serde_json::from_str(&payload).context("Failed to parse credentials from stdin")?;

    if settings.ignore_login {
        tracing::debug!("Ignoring store for {}", request.server_url);
        return Ok(());
    }

    Err(CredentialError::NotSupported { verb: "store" }.into())
}

/// `erase`: nothing is stored, so nothing can be erased
pub fn erase(settings: &Settings, input: impl Read) -> Result<()> {
    let server_url = read_input(input)?;

    if settings.ignore_login {
        tracing::debug!("Ignoring erase for {}", server_url);
        return Ok(());
    }

    Err(CredentialError::NotSupported { verb: "erase" }.into())
}

/// `list` is never supported
pub fn list() -> Result<()> {
    Err(CredentialError::NotSupported { verb: "list" }.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::ecr::tests::StubIssuer;
    use crate::environment::env_from;
    use std::sync::Arc;

    const STORE_PAYLOAD: &str =
        r#"{"ServerURL":"https://example.com","Username":"u","Secret":"p"}"#;

    fn resolver(pairs: &[(&str, &str)]) -> Resolver {
        Resolver::new(env_from(pairs), Arc::new(StubIssuer::default()))
    }

    async fn run_get(resolver: &Resolver, input: &str) -> Result<String> {
        let mut out = Vec::new();
        get(resolver, input.as_bytes(), &mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_get_found() {
        let resolver = resolver(&[("DOCKER_example_com_USR", "u"), ("DOCKER_example_com_PSW", "p")]);

        let out = run_get(&resolver, "https://example.com\n").await.unwrap();
        assert_eq!(
            out,
            "{\"ServerURL\":\"https://example.com\",\"Username\":\"u\",\"Secret\":\"p\"}\n"
        );
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let out = run_get(&resolver(&[]), "example.net").await.unwrap();
        assert_eq!(out, "{}\n");
    }

    #[tokio::test]
    async fn test_get_empty_input() {
        let err = run_get(&resolver(&[]), "  \n").await.unwrap_err();
        assert_eq!(err.to_string(), "no credentials server URL");
    }

    #[test]
    fn test_store_and_erase_not_supported() {
        let settings = Settings::default();

        let err = store(&settings, STORE_PAYLOAD.as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "store: not supported");

        let err = erase(&settings, "https://example.com".as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "erase: not supported");

        let err = list().unwrap_err();
        assert_eq!(err.to_string(), "list: not supported");
    }

    #[test]
    fn test_store_and_erase_ignored() {
        let settings = Settings {
            ignore_login: true,
            ..Settings::default()
        };

        assert!(store(&settings, STORE_PAYLOAD.as_bytes()).is_ok());
        assert!(erase(&settings, "https://example.com".as_bytes()).is_ok());
    }

    #[test]
    fn test_store_rejects_malformed_payload() {
        let settings = Settings {
            ignore_login: true,
            ..Settings::default()
        };
        assert!(store(&settings, "not json".as_bytes()).is_err());
    }
}
