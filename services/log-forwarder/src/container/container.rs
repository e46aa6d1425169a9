// Local crates
use crate::helpers::load_config::ContainerConfig;

// External crates
use bollard::Docker;
use bollard::container::{Config, CreateContainerOptions, StartContainerOptions};
use bollard::image::ListImagesOptions;
use std::collections::HashMap;
use tracing::instrument;

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("image '{0}' not found on the local machine, install it using \"docker pull {0}\"")]
    ImageNotFound(String),
    #[error("docker api error: {0}")]
    Api(#[from] bollard::errors::Error),
}

/// Creates and starts the monitored container. The container is a log
/// source collaborator: this module never inspects its output, it only
/// manages the start lifecycle and hands the Docker connection to the
/// tailer.
#[derive(Debug)]
pub struct ContainerRunner {
    docker: Docker,
    config: ContainerConfig,
}

impl ContainerRunner {
    pub fn new(config: ContainerConfig) -> Result<Self, ContainerError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker, config })
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Whether the configured image is available locally.
    pub async fn image_exists(&self) -> Result<bool, ContainerError> {
        let filters = HashMap::from([(
            "reference".to_string(),
            vec![self.config.image.clone()],
        )]);
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                filters,
                ..Default::default()
            }))
            .await?;
        Ok(!images.is_empty())
    }

    /// Create the container and return its id. The command runs under
    /// `/bin/sh -c`; `PYTHONUNBUFFERED=1` keeps interpreter output
    /// line-buffered so lines arrive as they are produced.
    #[instrument(name = "container::create", skip_all, level = "debug")]
    pub async fn create(&self) -> Result<String, ContainerError> {
        if !self.image_exists().await? {
            return Err(ContainerError::ImageNotFound(self.config.image.clone()));
        }

        let options = self.config.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });

        let response = self
            .docker
            .create_container(
                options,
                Config {
                    image: Some(self.config.image.clone()),
                    cmd: Some(vec![
                        "/bin/sh".to_string(),
                        "-c".to_string(),
                        self.config.command.clone(),
                    ]),
                    env: Some(vec!["PYTHONUNBUFFERED=1".to_string()]),
                    ..Default::default()
                },
            )
            .await?;

        for warning in &response.warnings {
            tracing::warn!(warning = %warning, "Docker reported a warning during container creation");
        }

        Ok(response.id)
    }

    #[instrument(name = "container::start", skip_all, level = "debug")]
    pub async fn start(&self, id: &str) -> Result<(), ContainerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }
}
