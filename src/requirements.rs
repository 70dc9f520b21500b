use std::collections::BTreeSet;
use std::fs;

use tracing::info;

use crate::config::{BuildConfiguration, Requirements};
use crate::error::{BuildError, BuildResult};
use crate::integrations::IntegrationRegistry;
use crate::process::CommandExecutor;
use crate::stack::Stack;

pub const LOCAL_REQUIREMENTS_FILE: &str = ".pipeline_local_requirements";
pub const USER_REQUIREMENTS_FILE: &str = ".pipeline_user_requirements";
pub const INTEGRATION_REQUIREMENTS_FILE: &str = ".pipeline_integration_requirements";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementFile {
    pub name: String,
    pub content: String,
}

impl RequirementFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

pub fn file_names(files: &[RequirementFile]) -> Vec<String> {
    files.iter().map(|file| file.name.clone()).collect()
}

pub struct RequirementsCollator<'a> {
    integrations: &'a IntegrationRegistry,
    executor: &'a dyn CommandExecutor,
}

impl<'a> RequirementsCollator<'a> {
    pub fn new(integrations: &'a IntegrationRegistry, executor: &'a dyn CommandExecutor) -> Self {
        Self {
            integrations,
            executor,
        }
    }

    /// Collect requirement files in install order: local environment, user
    /// requirements, then integration and stack requirements. Sources that are
    /// not configured or turn out empty are skipped.
    pub fn gather(
        &self,
        config: &BuildConfiguration,
        stack: &dyn Stack,
    ) -> BuildResult<Vec<RequirementFile>> {
        let mut files = Vec::new();
        info!("Gathering requirements for Docker build");

        if let Some(content) = self.local_environment(config)? {
            files.push(RequirementFile::new(LOCAL_REQUIREMENTS_FILE, content));
            info!("Including python packages from local environment");
        }

        if let Some(content) = user_requirements(config)? {
            files.push(RequirementFile::new(USER_REQUIREMENTS_FILE, content));
        }

        let integration_requirements = self.integration_requirements(config, stack)?;
        if !integration_requirements.is_empty() {
            let sorted: Vec<_> = integration_requirements.into_iter().collect();
            info!(
                "Including integration requirements: {}",
                sorted
                    .iter()
                    .map(|r| format!("`{r}`"))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            files.push(RequirementFile::new(
                INTEGRATION_REQUIREMENTS_FILE,
                sorted.join("\n"),
            ));
        }

        Ok(files)
    }

    fn local_environment(&self, config: &BuildConfiguration) -> BuildResult<Option<String>> {
        let Some(method) = config.replicate_local_environment() else {
            return Ok(None);
        };

        let command = method.command();
        let output = self.executor.execute(command)?;
        if !output.success() {
            return Err(BuildError::EnvironmentExport {
                command: command.to_string(),
                code: output.code,
                stderr: output.stderr_trimmed().to_string(),
            });
        }
        Ok(Some(output.stdout))
    }

    fn integration_requirements(
        &self,
        config: &BuildConfiguration,
        stack: &dyn Stack,
    ) -> BuildResult<BTreeSet<String>> {
        let mut requirements = BTreeSet::new();
        for integration in config.required_integrations() {
            requirements.extend(
                self.integrations
                    .select_requirements(integration)?
                    .iter()
                    .cloned(),
            );
        }

        if config.install_stack_requirements() {
            requirements.extend(stack.requirements());
        }

        Ok(requirements)
    }
}

fn user_requirements(config: &BuildConfiguration) -> BuildResult<Option<String>> {
    let content = match config.requirements() {
        None => return Ok(None),
        Some(Requirements::FilePath(path)) => {
            let content =
                fs::read_to_string(path).map_err(|source| BuildError::RequirementsFile {
                    path: path.clone(),
                    source,
                })?;
            info!(
                "Including user-defined requirements from file `{}`",
                fs::canonicalize(path)
                    .unwrap_or_else(|_| path.clone())
                    .display()
            );
            content
        }
        Some(Requirements::Inline(packages)) => {
            info!(
                "Including user-defined requirements: {}",
                packages
                    .iter()
                    .map(|r| format!("`{r}`"))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            packages.join("\n")
        }
    };

    Ok((!content.is_empty()).then_some(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use crate::registry::ContainerRegistry;

    struct NoExec;

    impl CommandExecutor for NoExec {
        fn execute(&self, command: &str) -> anyhow::Result<CommandOutput> {
            panic!("unexpected command: {command}");
        }
    }

    struct EmptyStack;

    impl Stack for EmptyStack {
        fn name(&self) -> &str {
            "empty"
        }

        fn requirements(&self) -> BTreeSet<String> {
            BTreeSet::new()
        }

        fn container_registry(&self) -> Option<&dyn ContainerRegistry> {
            None
        }
    }

    #[test]
    fn empty_inline_list_produces_no_file() {
        let integrations = IntegrationRegistry::new();
        let collator = RequirementsCollator::new(&integrations, &NoExec);
        let config = BuildConfiguration::default().with_packages(Vec::<String>::new());

        let files = collator.gather(&config, &EmptyStack).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn missing_requirements_file_is_reported() {
        let integrations = IntegrationRegistry::new();
        let collator = RequirementsCollator::new(&integrations, &NoExec);
        let config =
            BuildConfiguration::default().with_requirements_file("/nonexistent/requirements.txt");

        let err = collator.gather(&config, &EmptyStack).unwrap_err();
        assert!(matches!(err, BuildError::RequirementsFile { .. }));
    }

    #[test]
    fn file_names_keep_order() {
        let files = vec![
            RequirementFile::new(USER_REQUIREMENTS_FILE, "a"),
            RequirementFile::new(INTEGRATION_REQUIREMENTS_FILE, "b"),
        ];
        assert_eq!(
            file_names(&files),
            vec![USER_REQUIREMENTS_FILE, INTEGRATION_REQUIREMENTS_FILE]
        );
    }
}
