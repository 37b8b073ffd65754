use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use crate::error::CredentialError;

const DEFAULT_SCHEME: &str = "https://";

lazy_static! {
    static ref ECR_HOSTNAME: Regex = Regex::new(
        r"^(?P<account>[0-9]+)\.dkr\.ecr\.(?P<region>[-a-z0-9]+)\.amazonaws\.com$"
    )
    .expect("valid ECR hostname pattern");
    static ref GHCR_HOSTNAME: Regex = Regex::new(r"^ghcr\.io$").expect("valid GHCR pattern");
    static ref URL_SCHEME: Regex =
        Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").expect("valid URL scheme pattern");
}

/// Extract the bare hostname from a registry server URL.
///
/// Accepts `https://host/path`, `host/path`, `host:port` and plain `host`;
/// inputs without a leading scheme get `https://` prepended before parsing.
pub fn normalize(server_url: &str) -> Result<String, CredentialError> {
    let server_url = server_url.trim();
    let candidate = if URL_SCHEME.is_match(server_url) {
        server_url.to_string()
    } else {
        format!("{}{}", DEFAULT_SCHEME, server_url)
    };

    let parsed = Url::parse(&candidate).map_err(|source| CredentialError::InvalidServerUrl {
        url: server_url.to_string(),
        source,
    })?;

    parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .map(|host| host.to_ascii_lowercase())
        .ok_or_else(|| CredentialError::MissingHost(server_url.to_string()))
}

/// Which registry-specific resolution path applies to a hostname
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryKind {
    /// No registry-specific logic; only the environment tier applies
    Generic,
    /// AWS ECR: `<account>.dkr.ecr.<region>.amazonaws.com`
    ManagedCloudRegistry { account: String, region: String },
    /// GitHub Container Registry: `ghcr.io`
    PackageRegistry,
}

impl RegistryKind {
    pub fn classify(hostname: &str) -> Self {
        if let Some(caps) = ECR_HOSTNAME.captures(hostname) {
            return Self::ManagedCloudRegistry {
                account: caps["account"].to_string(),
                region: caps["region"].to_string(),
            };
        }

        if GHCR_HOSTNAME.is_match(hostname) {
            return Self::PackageRegistry;
        }

        Self::Generic
    }
}
