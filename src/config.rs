use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BuildError, BuildResult};

pub const DEFAULT_TARGET_REPOSITORY: &str = "pipeline-image";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentExportMethod {
    PipFreeze,
    PoetryExport,
}

impl EnvironmentExportMethod {
    pub fn command(&self) -> &'static str {
        match self {
            EnvironmentExportMethod::PipFreeze => "pip freeze",
            EnvironmentExportMethod::PoetryExport => "poetry export --format=requirements.txt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Requirements {
    FilePath(PathBuf),
    Inline(Vec<String>),
}

impl Requirements {
    pub fn is_empty(&self) -> bool {
        match self {
            Requirements::FilePath(path) => path.as_os_str().is_empty(),
            Requirements::Inline(packages) => packages.is_empty(),
        }
    }
}

/// Immutable build configuration. Unknown fields are rejected when parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfiguration {
    parent_image: Option<String>,
    dockerfile: Option<PathBuf>,
    build_context_root: Option<PathBuf>,
    build_options: Map<String, Value>,
    target_repository: String,
    replicate_local_environment: Option<EnvironmentExportMethod>,
    requirements: Option<Requirements>,
    required_integrations: Vec<String>,
    install_stack_requirements: bool,
    environment: Map<String, Value>,
    dockerignore: Option<PathBuf>,
    copy_files: bool,
    copy_profile: bool,
}

impl Default for BuildConfiguration {
    fn default() -> Self {
        Self {
            parent_image: None,
            dockerfile: None,
            build_context_root: None,
            build_options: Map::new(),
            target_repository: DEFAULT_TARGET_REPOSITORY.to_string(),
            replicate_local_environment: None,
            requirements: None,
            required_integrations: Vec::new(),
            install_stack_requirements: true,
            environment: Map::new(),
            dockerignore: None,
            copy_files: true,
            copy_profile: true,
        }
    }
}

impl BuildConfiguration {
    pub fn from_yaml(yaml: &str) -> BuildResult<Self> {
        serde_yaml::from_str(yaml).map_err(|err| BuildError::InvalidConfiguration(err.to_string()))
    }

    pub fn from_value(value: Value) -> BuildResult<Self> {
        serde_json::from_value(value)
            .map_err(|err| BuildError::InvalidConfiguration(err.to_string()))
    }

    pub fn with_parent_image(mut self, image: impl Into<String>) -> Self {
        self.parent_image = Some(image.into());
        self
    }

    pub fn with_dockerfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.dockerfile = Some(path.into());
        self
    }

    pub fn with_build_context_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.build_context_root = Some(path.into());
        self
    }

    pub fn with_build_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.build_options.insert(key.into(), value.into());
        self
    }

    pub fn with_target_repository(mut self, repository: impl Into<String>) -> Self {
        self.target_repository = repository.into();
        self
    }

    pub fn with_local_environment(mut self, method: EnvironmentExportMethod) -> Self {
        self.replicate_local_environment = Some(method);
        self
    }

    pub fn with_requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = Some(requirements);
        self
    }

    pub fn with_requirements_file(self, path: impl Into<PathBuf>) -> Self {
        self.with_requirements(Requirements::FilePath(path.into()))
    }

    pub fn with_packages<I, S>(self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_requirements(Requirements::Inline(
            packages.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn with_integration(mut self, name: impl Into<String>) -> Self {
        self.required_integrations.push(name.into());
        self
    }

    pub fn with_stack_requirements(mut self, install: bool) -> Self {
        self.install_stack_requirements = install;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_dockerignore(mut self, path: impl Into<PathBuf>) -> Self {
        self.dockerignore = Some(path.into());
        self
    }

    pub fn with_copy_files(mut self, copy: bool) -> Self {
        self.copy_files = copy;
        self
    }

    pub fn with_copy_profile(mut self, copy: bool) -> Self {
        self.copy_profile = copy;
        self
    }

    pub fn parent_image(&self) -> Option<&str> {
        self.parent_image.as_deref()
    }

    pub fn dockerfile(&self) -> Option<&Path> {
        self.dockerfile.as_deref()
    }

    pub fn build_context_root(&self) -> Option<&Path> {
        self.build_context_root.as_deref()
    }

    pub fn build_options(&self) -> &Map<String, Value> {
        &self.build_options
    }

    pub fn target_repository(&self) -> &str {
        &self.target_repository
    }

    pub fn replicate_local_environment(&self) -> Option<EnvironmentExportMethod> {
        self.replicate_local_environment
    }

    pub fn requirements(&self) -> Option<&Requirements> {
        self.requirements.as_ref()
    }

    pub fn required_integrations(&self) -> &[String] {
        &self.required_integrations
    }

    pub fn install_stack_requirements(&self) -> bool {
        self.install_stack_requirements
    }

    pub fn environment(&self) -> &Map<String, Value> {
        &self.environment
    }

    pub fn dockerignore(&self) -> Option<&Path> {
        self.dockerignore.as_deref()
    }

    pub fn copy_files(&self) -> bool {
        self.copy_files
    }

    pub fn copy_profile(&self) -> bool {
        self.copy_profile
    }

    pub fn relative_to(mut self, base: &Path) -> Self {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        if let Some(path) = self.dockerfile.as_mut() {
            rebase(path);
        }
        if let Some(path) = self.build_context_root.as_mut() {
            rebase(path);
        }
        if let Some(path) = self.dockerignore.as_mut() {
            rebase(path);
        }
        if let Some(Requirements::FilePath(path)) = self.requirements.as_mut() {
            rebase(path);
        }
        self
    }
}

pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_documented_values() {
        let config = BuildConfiguration::default();
        assert_eq!(config.target_repository(), "pipeline-image");
        assert!(config.install_stack_requirements());
        assert!(config.copy_files());
        assert!(config.copy_profile());
        assert!(config.parent_image().is_none());
        assert!(config.requirements().is_none());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let yaml = r#"
parent_image: "python:3.10"
copy_everything: true
"#;
        let err = BuildConfiguration::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, BuildError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("copy_everything"));
    }

    #[test]
    fn requirements_accept_path_or_list() {
        let from_path = BuildConfiguration::from_yaml("requirements: requirements.txt").unwrap();
        assert_eq!(
            from_path.requirements(),
            Some(&Requirements::FilePath(PathBuf::from("requirements.txt")))
        );

        let from_list = BuildConfiguration::from_yaml("requirements: [numpy, pandas]").unwrap();
        assert_eq!(
            from_list.requirements(),
            Some(&Requirements::Inline(vec![
                "numpy".to_string(),
                "pandas".to_string()
            ]))
        );
    }

    #[test]
    fn environment_keeps_insertion_order() {
        let yaml = r#"
environment:
  zeta: 1
  alpha: two
  mid: true
"#;
        let config = BuildConfiguration::from_yaml(yaml).unwrap();
        let keys: Vec<_> = config.environment().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn export_method_parses_snake_case() {
        let config =
            BuildConfiguration::from_yaml("replicate_local_environment: poetry_export").unwrap();
        assert_eq!(
            config.replicate_local_environment().map(|m| m.command()),
            Some("poetry export --format=requirements.txt")
        );
    }

    #[test]
    fn from_value_rejects_unknown_fields() {
        let result = BuildConfiguration::from_value(json!({ "dockerfile": "Dockerfile", "foo": 1 }));
        assert!(result.is_err());
    }

    #[test]
    fn relative_paths_are_rebased() {
        let config = BuildConfiguration::default()
            .with_dockerfile("docker/Dockerfile")
            .with_requirements_file("/abs/requirements.txt")
            .relative_to(Path::new("/work"));
        assert_eq!(config.dockerfile(), Some(Path::new("/work/docker/Dockerfile")));
        assert_eq!(
            config.requirements(),
            Some(&Requirements::FilePath(PathBuf::from("/abs/requirements.txt")))
        );
    }

    #[test]
    fn value_text_keeps_strings_verbatim() {
        assert_eq!(value_to_text(&json!("a b")), "a b");
        assert_eq!(value_to_text(&json!(3)), "3");
        assert_eq!(value_to_text(&json!(true)), "true");
    }
}
