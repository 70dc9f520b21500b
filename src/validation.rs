use serde::Serialize;

use crate::builder::{BuilderSettings, plan_build};
use crate::config::{BuildConfiguration, Requirements};
use crate::error::BuildError;
use crate::integrations::IntegrationRegistry;
use crate::recipe::Recipe;

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

pub fn validate_recipe(
    recipe: &Recipe,
    integrations: &IntegrationRegistry,
    settings: &BuilderSettings,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    if recipe.version != 1 {
        report
            .errors
            .push(format!("Unsupported recipe version: {}", recipe.version));
    }

    if !is_valid_tag(&recipe.pipeline) {
        report.errors.push(format!(
            "Pipeline name '{}' cannot be used as an image tag",
            recipe.pipeline
        ));
    }

    if recipe.stack.name.trim().is_empty() {
        report.errors.push("Stack name cannot be empty".into());
    }

    for component in &recipe.stack.components {
        if let Some(integration) = &component.integration
            && !integrations.contains(integration)
        {
            report.errors.push(format!(
                "Stack component '{}' ({}) uses unknown integration '{}'",
                component.kind, component.flavor, integration
            ));
        }
    }

    let config = recipe.build_configuration();
    report.merge(validate_configuration(&config, integrations));

    let parent_image = config
        .parent_image()
        .or(recipe.stack.docker_parent_image.as_deref())
        .unwrap_or(&settings.default_parent_image);
    if config.dockerfile().is_some() && parent_image != settings.default_parent_image {
        report.warnings.push(format!(
            "Both a Dockerfile and the parent image '{parent_image}' are configured, the parent image is ignored"
        ));
    }
    if let Err(BuildError::InsufficientConfiguration) = plan_build(
        &config,
        recipe.entrypoint(),
        &recipe.pipeline,
        parent_image,
        &settings.default_parent_image,
    ) {
        report
            .errors
            .push(BuildError::InsufficientConfiguration.to_string());
    }

    if recipe.stack.container_registry.is_none() {
        report.warnings.push(format!(
            "Stack '{}' has no container registry, images can be built but not pushed",
            recipe.stack.name
        ));
    }

    report
}

/// Checks that only need the build configuration itself.
pub fn validate_configuration(
    config: &BuildConfiguration,
    integrations: &IntegrationRegistry,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    for integration in config.required_integrations() {
        if !integrations.contains(integration) {
            report.errors.push(format!(
                "Unknown integration '{}'. Available integrations: {}",
                integration,
                integrations.known_integrations().join(", ")
            ));
        }
    }

    if let Some(dockerfile) = config.dockerfile() {
        if !dockerfile.is_file() {
            report
                .errors
                .push(format!("Dockerfile not found: {}", dockerfile.display()));
        }
    } else if !config.build_options().is_empty() {
        report
            .warnings
            .push("Build options only apply to a custom Dockerfile and are ignored".into());
    }

    if let Some(root) = config.build_context_root()
        && !root.is_dir()
    {
        report.errors.push(format!(
            "Build context root is not a directory: {}",
            root.display()
        ));
    }

    if let Some(Requirements::FilePath(path)) = config.requirements()
        && !path.is_file()
    {
        report
            .errors
            .push(format!("Requirements file not found: {}", path.display()));
    }

    if let Some(dockerignore) = config.dockerignore() {
        match std::fs::read_to_string(dockerignore) {
            Ok(content) => {
                for (idx, line) in content.lines().enumerate() {
                    let pattern = line.trim().trim_start_matches('!');
                    if pattern.is_empty() || pattern.starts_with('#') {
                        continue;
                    }
                    if let Err(err) = glob::Pattern::new(pattern) {
                        report.errors.push(format!(
                            "{}:{}: '{}' is not a valid pattern: {}",
                            dockerignore.display(),
                            idx + 1,
                            line,
                            err
                        ));
                    }
                }
            }
            Err(err) => report.errors.push(format!(
                "Failed to read dockerignore {}: {}",
                dockerignore.display(),
                err
            )),
        }
    }

    if config.target_repository().is_empty() {
        report
            .errors
            .push("Target repository cannot be empty".into());
    }

    report
}

/// Docker tag grammar: up to 128 of `[A-Za-z0-9_.-]`, not starting with `.` or `-`.
pub fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.len() <= 128
        && !tag.starts_with(['.', '-'])
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
