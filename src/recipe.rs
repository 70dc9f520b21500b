use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::BuildConfiguration;
use crate::integrations::IntegrationRegistry;
use crate::stack::StackSpec;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    pub version: u32,
    pub pipeline: String,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub docker: BuildConfiguration,
    pub stack: StackSpec,
    #[serde(default)]
    pub integrations: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Recipe {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recipe file: {}", path.display()))?;
        let mut recipe = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse recipe YAML: {}", path.display()))?;
        recipe.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(recipe)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn build_configuration(&self) -> BuildConfiguration {
        self.docker.clone().relative_to(&self.base_dir)
    }

    pub fn integration_registry(&self) -> IntegrationRegistry {
        let mut registry = IntegrationRegistry::with_defaults();
        registry.extend(&self.integrations);
        registry
    }

    pub fn entrypoint(&self) -> Option<&str> {
        self.entrypoint.as_deref().filter(|e| !e.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPE: &str = r#"
version: 1
pipeline: training
entrypoint: python -m pipeline.run
docker:
  requirements: [numpy, pandas]
  copy_files: false
stack:
  name: prod
  container_registry:
    uri: registry.example.com/ml
  components:
    - kind: orchestrator
      flavor: kubeflow
      integration: kubeflow
integrations:
  internal: ["internal-sdk==2.0"]
"#;

    #[test]
    fn parses_full_recipe() {
        let recipe = Recipe::from_yaml(RECIPE).unwrap();
        assert_eq!(recipe.pipeline, "training");
        assert_eq!(recipe.entrypoint(), Some("python -m pipeline.run"));
        assert!(!recipe.docker.copy_files());
        assert!(recipe.docker.copy_profile());
        assert_eq!(recipe.stack.components.len(), 1);

        let registry = recipe.integration_registry();
        assert!(registry.contains("internal"));
        assert!(registry.contains("aws"));
    }

    #[test]
    fn load_resolves_files_next_to_recipe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recipe.yaml");
        std::fs::write(
            &path,
            "version: 1\npipeline: p\ndocker:\n  dockerfile: Dockerfile\nstack:\n  name: local\n",
        )
        .unwrap();

        let recipe = Recipe::load(&path).unwrap();
        assert_eq!(
            recipe.build_configuration().dockerfile(),
            Some(dir.path().join("Dockerfile").as_path())
        );
    }

    #[test]
    fn unknown_top_level_keys_fail() {
        let err = Recipe::from_yaml("version: 1\npipeline: p\nstack: {name: s}\nextra: 1\n")
            .unwrap_err();
        assert!(err.to_string().contains("extra"));
    }
}
