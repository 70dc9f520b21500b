use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid build configuration: {0}")]
    InvalidConfiguration(String),

    #[error(
        "Unable to run pipeline with the given build configuration: no Dockerfile or custom \
         parent image specified and no files will be copied or requirements installed"
    )]
    InsufficientConfiguration,

    #[error("Unable to build and push image because stack '{stack}' has no container registry")]
    NoContainerRegistry { stack: String },

    #[error("Unable to export local python packages: '{command}' exited with code {code}: {stderr}")]
    EnvironmentExport {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Unknown integration '{name}'. Available integrations: {available}")]
    UnknownIntegration { name: String, available: String },

    #[error("Failed to read requirements file '{}'", path.display())]
    RequirementsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy active profile into build context at '{}'", path.display())]
    ProfileCopy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}

pub type BuildResult<T, E = BuildError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_keep_their_message() {
        let err: BuildError = anyhow::anyhow!("docker daemon not reachable").into();
        assert_eq!(err.to_string(), "docker daemon not reachable");
    }

    #[test]
    fn unknown_integration_lists_alternatives() {
        let err = BuildError::UnknownIntegration {
            name: "awz".into(),
            available: "aws, kubeflow".into(),
        };
        let message = err.to_string();
        assert!(message.contains("'awz'"));
        assert!(message.contains("aws, kubeflow"));
    }
}
