use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use crate::process::Cmd;

pub trait ContainerRegistry {
    fn uri(&self) -> &str;

    /// Push `image_name` and return its repository digest.
    fn push_image(&self, image_name: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct DockerRegistry {
    uri: String,
    docker: String,
}

impl DockerRegistry {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            docker: "docker".to_string(),
        }
    }

    pub fn with_docker_binary(mut self, docker: impl Into<String>) -> Self {
        self.docker = docker.into();
        self
    }
}

impl ContainerRegistry for DockerRegistry {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn push_image(&self, image_name: &str) -> Result<String> {
        if !image_name.starts_with(&self.uri) {
            return Err(anyhow!(
                "Image '{}' does not belong to container registry '{}'",
                image_name,
                self.uri
            ));
        }

        info!(image = image_name, "Pushing image");
        let push = Cmd::new(&self.docker)
            .args(["push", image_name])
            .error_msg(format!("Failed to push image '{image_name}'"))
            .run()?;
        for line in push.stdout.lines() {
            debug!("{line}");
        }

        let inspect = Cmd::new(&self.docker)
            .args([
                "image",
                "inspect",
                "--format",
                "{{json .RepoDigests}}",
                image_name,
            ])
            .error_msg(format!("Failed to inspect pushed image '{image_name}'"))
            .run()?;
        let digests: Vec<String> = serde_json::from_str(inspect.stdout_trimmed())
            .with_context(|| format!("Unexpected repo digest output for '{image_name}'"))?;

        let digest = select_repo_digest(&digests, image_name)
            .ok_or_else(|| anyhow!("No repository digest recorded for '{image_name}'"))?;
        info!(image = image_name, digest = %digest, "Image pushed");
        Ok(digest)
    }
}

pub fn repository_of(image_name: &str) -> &str {
    let without_digest = image_name.split('@').next().unwrap_or(image_name);
    match without_digest.rfind(':') {
        Some(idx) if !without_digest[idx..].contains('/') => &without_digest[..idx],
        _ => without_digest,
    }
}

/// Pick the digest entry that belongs to the repository of `image_name`.
pub fn select_repo_digest(repo_digests: &[String], image_name: &str) -> Option<String> {
    let repository = repository_of(image_name);
    repo_digests
        .iter()
        .find(|digest| digest.split('@').next() == Some(repository))
        .cloned()
}
