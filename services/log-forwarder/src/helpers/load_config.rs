// Local crates
use crate::helpers::names::is_valid_container_name;

// External crates
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::instrument;

/// Pre-flight configuration failures. Raised before any remote or Docker
/// interaction happens.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    MissingField(&'static str),
    #[error(
        "container name '{0}' is invalid; allowed characters are a-z, A-Z, 0-9, '_', '.' and '-'"
    )]
    InvalidContainerName(String),
}

/// Static configuration consumed by the pipeline. Assembled from CLI flags,
/// optionally seeded from a TOML file; validated before the pipeline starts.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub destination: DestinationConfig,
    #[serde(default)]
    pub aws: AwsConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ContainerConfig {
    /// Docker image to run. Must already be present on the local machine.
    pub image: String,
    /// Command executed in the container via `/bin/sh -c`.
    pub command: String,
    /// Container name; Docker assigns one if unset.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DestinationConfig {
    /// CloudWatch log group name.
    pub group: String,
    /// CloudWatch log stream name.
    pub stream: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AwsConfig {
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Config {
    /// Load and parse a configuration file.
    #[instrument(name = "config_loader", level = "trace", skip_all)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "Loading configuration file"
        );

        let config_str = fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read config file at {:?}", path_ref))?;
        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse TOML from {:?}", path_ref))?;

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "Configuration file loaded successfully"
        );
        Ok(config)
    }

    /// All required fields must be non-empty before the pipeline starts;
    /// absence here is a configuration error, not a pipeline error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.container.image.is_empty() {
            return Err(ConfigError::MissingField("docker-image"));
        }
        if self.container.command.is_empty() {
            return Err(ConfigError::MissingField("bash-command"));
        }
        self.validate_destination()?;
        if let Some(name) = self.container.name.as_deref() {
            if !is_valid_container_name(name) {
                return Err(ConfigError::InvalidContainerName(name.to_string()));
            }
        }
        Ok(())
    }

    /// Destination-only validation, for commands that never touch Docker.
    pub fn validate_destination(&self) -> Result<(), ConfigError> {
        if self.destination.group.is_empty() {
            return Err(ConfigError::MissingField("aws-cloudwatch-group"));
        }
        if self.destination.stream.is_empty() {
            return Err(ConfigError::MissingField("aws-cloudwatch-stream"));
        }
        Ok(())
    }

    /// Effective region, defaulting like the AWS SDKs do.
    pub fn region(&self) -> String {
        self.aws
            .region
            .clone()
            .or_else(|| std::env::var("AWS_REGION").ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| "us-east-1".to_string())
    }

    /// Effective endpoint override, falling back to `AWS_ENDPOINT_URL`.
    pub fn endpoint(&self) -> Option<String> {
        self.aws.endpoint.clone().or_else(|| {
            std::env::var("AWS_ENDPOINT_URL")
                .ok()
                .filter(|v| !v.is_empty())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config() -> Config {
        Config {
            container: ContainerConfig {
                image: "alpine:3.20".to_string(),
                command: "while true; do date; sleep 1; done".to_string(),
                name: Some("date-loop".to_string()),
            },
            destination: DestinationConfig {
                group: "/containers/date-loop".to_string(),
                stream: "stdout".to_string(),
            },
            aws: AwsConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        full_config().validate().unwrap();
    }

    #[test]
    fn empty_required_fields_are_rejected() {
        let mut config = full_config();
        config.container.image.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField("docker-image"))
        ));

        let mut config = full_config();
        config.destination.stream.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField("aws-cloudwatch-stream"))
        ));
    }

    #[test]
    fn bad_container_name_is_rejected() {
        let mut config = full_config();
        config.container.name = Some("bad name!".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidContainerName(_))
        ));
    }

    #[test]
    fn parses_toml_sections() {
        let config: Config = toml::from_str(
            r#"
            [container]
            image = "alpine:3.20"
            command = "echo hi"

            [destination]
            group = "/containers/demo"
            stream = "stdout"

            [aws]
            region = "eu-central-1"
            "#,
        )
        .unwrap();

        assert_eq!(config.container.image, "alpine:3.20");
        assert_eq!(config.destination.group, "/containers/demo");
        assert_eq!(config.aws.region.as_deref(), Some("eu-central-1"));
        assert!(config.container.name.is_none());
        config.validate().unwrap();
    }
}
