use std::collections::{BTreeMap, HashMap};

use crate::error::{BuildError, BuildResult};

/// Named bundles of pip requirements tied to an infrastructure backend.
#[derive(Debug, Clone, Default)]
pub struct IntegrationRegistry {
    integrations: HashMap<String, Vec<String>>,
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self {
            integrations: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        register_defaults(&mut registry);
        registry
    }

    pub fn register<I, S>(&mut self, name: impl Into<String>, requirements: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.integrations.insert(
            name.into(),
            requirements.into_iter().map(Into::into).collect(),
        );
    }

    pub fn extend(&mut self, integrations: &BTreeMap<String, Vec<String>>) {
        for (name, requirements) in integrations {
            self.register(name.clone(), requirements.iter().cloned());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.integrations.contains_key(name)
    }

    pub fn select_requirements(&self, name: &str) -> BuildResult<&[String]> {
        self.integrations
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| BuildError::UnknownIntegration {
                name: name.to_string(),
                available: self.known_integrations().join(", "),
            })
    }

    pub fn known_integrations(&self) -> Vec<String> {
        let mut names: Vec<_> = self.integrations.keys().cloned().collect();
        names.sort();
        names
    }
}

pub fn register_defaults(registry: &mut IntegrationRegistry) {
    registry.register("aws", ["boto3==1.21.0", "sagemaker==2.82.2"]);
    registry.register("kubeflow", ["kfp==1.8.9"]);
    registry.register("gcp", ["kfp==1.8.9", "gcsfs", "google-cloud-aiplatform"]);
    registry.register("azure", ["adlfs", "azure-keyvault-secrets", "azure-identity"]);
    registry.register("sklearn", ["scikit-learn"]);
    registry.register("tensorflow", ["tensorflow"]);
    registry.register("pytorch", ["torch"]);
    registry.register("mlflow", ["mlflow"]);
    registry.register("kserve", ["kserve"]);
    registry.register("seldon", ["seldon-core"]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_aws_and_kubeflow() {
        let registry = IntegrationRegistry::with_defaults();
        assert_eq!(
            registry.select_requirements("aws").unwrap(),
            ["boto3==1.21.0", "sagemaker==2.82.2"]
        );
        assert_eq!(registry.select_requirements("kubeflow").unwrap(), ["kfp==1.8.9"]);
    }

    #[test]
    fn unknown_integration_fails() {
        let mut registry = IntegrationRegistry::new();
        registry.register("aws", ["boto3"]);
        let err = registry.select_requirements("AWS").unwrap_err();
        match err {
            BuildError::UnknownIntegration { name, available } => {
                assert_eq!(name, "AWS");
                assert_eq!(available, "aws");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn extend_overrides_existing_entries() {
        let mut registry = IntegrationRegistry::with_defaults();
        let mut extra = BTreeMap::new();
        extra.insert("kubeflow".to_string(), vec!["kfp==2.0.0".to_string()]);
        extra.insert("internal".to_string(), vec!["acme-tools".to_string()]);
        registry.extend(&extra);

        assert_eq!(registry.select_requirements("kubeflow").unwrap(), ["kfp==2.0.0"]);
        assert!(registry.contains("internal"));
    }

    #[test]
    fn known_integrations_are_sorted() {
        let registry = IntegrationRegistry::with_defaults();
        let names = registry.known_integrations();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
