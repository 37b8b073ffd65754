//! `setup` subcommand: registers this helper in the Docker client config.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::environment::Environment;
use crate::settings::ENV_DOCKER_CONFIG;

/// Name docker uses to find this binary (`docker-credential-<name>`)
const HELPER_NAME: &str = "env";
const CREDS_STORE_KEY: &str = "credsStore";
const CRED_HELPERS_KEY: &str = "credHelpers";

/// What `setup` should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupTarget {
    /// Print the current configuration
    Show,
    /// Use this helper as the default credential store
    Default,
    /// Use this helper for one registry
    Registry(String),
}

impl SetupTarget {
    pub fn parse(arg: &str) -> Result<Self> {
        match arg {
            "show" => Ok(Self::Show),
            "default" => Ok(Self::Default),
            registry => {
                validate_registry(registry)?;
                Ok(Self::Registry(registry.to_string()))
            }
        }
    }
}

fn validate_registry(registry: &str) -> Result<()> {
    if registry.is_empty() {
        anyhow::bail!("registry cannot be empty");
    }
    if registry.contains([' ', '/', '\\']) {
        anyhow::bail!("invalid registry: {:?}", registry);
    }
    Ok(())
}

/// Location of the Docker client config: `$DOCKER_CONFIG/config.json`, else `~/.docker/config.json`
pub fn config_path(env: &dyn Environment) -> Result<PathBuf> {
    if let Some(dir) = env.non_empty(ENV_DOCKER_CONFIG) {
        return Ok(PathBuf::from(dir).join("config.json"));
    }

    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".docker").join("config.json"))
}

/// The Docker client config document.
///
/// Kept as a generic JSON object so keys this helper does not manage survive a rewrite.
#[derive(Debug, Default)]
pub struct DockerConfig {
    document: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    default: bool,
    registries: Vec<String>,
}

impl DockerConfig {
    /// Load the config, or an empty one if the file does not exist yet
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read Docker config file {}", path.display()))?;

        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let document: Map<String, Value> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse Docker config file {}", path.display()))?;

        Ok(Self { document })
    }

    /// Write the config with tab indentation, creating the directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            create_config_dir(dir)?;
        }

        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.document
            .serialize(&mut serializer)
            .context("Failed to serialize Docker config")?;

        write_config_file(path, &buffer)
            .with_context(|| format!("Failed to write Docker config file {}", path.display()))
    }

    pub fn is_default(&self) -> bool {
        self.document.get(CREDS_STORE_KEY).and_then(Value::as_str) == Some(HELPER_NAME)
    }

    /// Registries mapped to this helper, sorted
    pub fn registries(&self) -> Vec<String> {
        let registries: BTreeSet<String> = self
            .document
            .get(CRED_HELPERS_KEY)
            .and_then(Value::as_object)
            .map(|helpers| {
                helpers
                    .iter()
                    .filter(|(_, helper)| helper.as_str() == Some(HELPER_NAME))
                    .map(|(registry, _)| registry.clone())
                    .collect()
            })
            .unwrap_or_default();

        registries.into_iter().collect()
    }

    pub fn is_registry_configured(&self, registry: &str) -> bool {
        self.document
            .get(CRED_HELPERS_KEY)
            .and_then(|helpers| helpers.get(registry))
            .and_then(Value::as_str)
            == Some(HELPER_NAME)
    }

    pub fn set_default(&mut self) {
        self.document
            .insert(CREDS_STORE_KEY.to_string(), Value::from(HELPER_NAME));
    }

    pub fn set_registry(&mut self, registry: &str) {
        let helpers = self
            .document
            .entry(CRED_HELPERS_KEY)
            .or_insert_with(|| Value::Object(Map::new()));

        if !helpers.is_object() {
            *helpers = Value::Object(Map::new());
        }

        if let Value::Object(helpers) = helpers {
            helpers.insert(registry.to_string(), Value::from(HELPER_NAME));
        }
    }
}

#[cfg(unix)]
fn create_config_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_config_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_config_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_config_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    fs::write(path, contents)
}

/// Run `setup` against the config file at `path`
pub fn run(target: &SetupTarget, path: &Path, out: &mut impl Write) -> Result<()> {
    let mut config = DockerConfig::load(path)?;

    match target {
        SetupTarget::Show => {
            let output = ShowOutput {
                default: config.is_default(),
                registries: config.registries(),
            };
            let yaml = serde_yaml::to_string(&output).context("Failed to render output as YAML")?;
            write!(out, "{}", yaml)?;
        }
        SetupTarget::Default => {
            if config.is_default() {
                writeln!(
                    out,
                    "Default credential store is already configured to use {:?} credential helper",
                    HELPER_NAME
                )?;
                return Ok(());
            }

            config.set_default();
            config.save(path)?;
            tracing::debug!("Updated {}", path.display());
            writeln!(
                out,
                "Default credential store successfully configured to use {:?} credential helper",
                HELPER_NAME
            )?;
        }
        SetupTarget::Registry(registry) => {
            if config.is_registry_configured(registry) {
                writeln!(
                    out,
                    "Registry {:?} is already configured to use {:?} credential helper",
                    registry, HELPER_NAME
                )?;
                return Ok(());
            }

            config.set_registry(registry);
            config.save(path)?;
            tracing::debug!("Updated {}", path.display());
            writeln!(
                out,
                "Registry {:?} successfully configured to use {:?} credential helper",
                registry, HELPER_NAME
            )?;
        }
    }

    Ok(())
}
