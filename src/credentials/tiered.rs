use crate::environment::Environment;
use crate::settings::{ENV_PASSWORD_SUFFIX, ENV_PREFIX, ENV_SEPARATOR, ENV_USERNAME_SUFFIX};

use super::Credential;

/// Build the username/password variable names for `labels[offset..]`.
///
/// The offset is clamped into `0..=labels.len()`; the final offset yields
/// the catch-all `DOCKER__USR`/`DOCKER__PSW` pair.
pub fn env_variables(labels: &[&str], offset: isize) -> (String, String) {
    let offset = offset.clamp(0, labels.len() as isize) as usize;
    let fragment = labels[offset..].join(ENV_SEPARATOR);

    let username = [ENV_PREFIX, &fragment, ENV_USERNAME_SUFFIX].join(ENV_SEPARATOR);
    let password = [ENV_PREFIX, &fragment, ENV_PASSWORD_SUFFIX].join(ENV_SEPARATOR);
    (username, password)
}

/// All candidate variable pairs for a hostname, most specific first
pub fn candidates(hostname: &str) -> Vec<(String, String)> {
    let hostname = hostname.replace('-', "_");
    let labels: Vec<&str> = hostname.split('.').collect();

    (0..=labels.len())
        .map(|offset| env_variables(&labels, offset as isize))
        .collect()
}

/// Find the first candidate pair where both variables are set.
///
/// `None` is not an error: the caller moves on to the registry-specific tiers.
pub fn lookup(env: &dyn Environment, hostname: &str) -> Option<Credential> {
    candidates(hostname)
        .into_iter()
        .find_map(|(username_var, password_var)| {
            let username = env.non_empty(&username_var)?;
            let secret = env.non_empty(&password_var)?;
            tracing::debug!("Using credentials from {} / {}", username_var, password_var);
            Some(Credential { username, secret })
        })
}
