use crate::environment::Environment;
use crate::settings::{ENV_GITHUB_TOKEN, GITHUB_TOKEN_USERNAME};

use super::Credential;

/// GitHub Container Registry login from `GITHUB_TOKEN`; `None` when the token is unset
pub fn lookup(env: &dyn Environment) -> Option<Credential> {
    env.non_empty(ENV_GITHUB_TOKEN)
        .map(|token| Credential::new(GITHUB_TOKEN_USERNAME, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::env_from;

    #[test]
    fn test_lookup() {
        let env = env_from(&[("GITHUB_TOKEN", "t1")]);
        assert_eq!(lookup(&env), Some(Credential::new("x-access-token", "t1")));
        assert_eq!(lookup(&env_from(&[])), None);
        assert_eq!(lookup(&env_from(&[("GITHUB_TOKEN", "")])), None);
    }
}
