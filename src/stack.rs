use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::BuildResult;
use crate::integrations::IntegrationRegistry;
use crate::registry::{ContainerRegistry, DockerRegistry};

pub trait Stack {
    fn name(&self) -> &str;

    fn requirements(&self) -> BTreeSet<String>;

    fn container_registry(&self) -> Option<&dyn ContainerRegistry>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackSpec {
    pub name: String,
    #[serde(default)]
    pub container_registry: Option<RegistrySpec>,
    #[serde(default)]
    pub docker_parent_image: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySpec {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentSpec {
    pub kind: String,
    pub flavor: String,
    #[serde(default)]
    pub integration: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConfiguredStack {
    name: String,
    requirements: BTreeSet<String>,
    registry: Option<DockerRegistry>,
}

impl ConfiguredStack {
    pub fn from_spec(spec: &StackSpec, integrations: &IntegrationRegistry) -> BuildResult<Self> {
        let mut requirements = BTreeSet::new();
        for component in &spec.components {
            if let Some(integration) = &component.integration {
                requirements.extend(integrations.select_requirements(integration)?.iter().cloned());
            }
        }

        Ok(Self {
            name: spec.name.clone(),
            requirements,
            registry: spec
                .container_registry
                .as_ref()
                .map(|registry| DockerRegistry::new(registry.uri.clone())),
        })
    }
}

impl Stack for ConfiguredStack {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> BTreeSet<String> {
        self.requirements.clone()
    }

    fn container_registry(&self) -> Option<&dyn ContainerRegistry> {
        self.registry.as_ref().map(|r| r as &dyn ContainerRegistry)
    }
}
