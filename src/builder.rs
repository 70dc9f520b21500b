use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::BuildConfiguration;
use crate::docker::{BuildRequest, DockerfileSource, ImageBuilder};
use crate::dockerfile;
use crate::error::{BuildError, BuildResult};
use crate::integrations::IntegrationRegistry;
use crate::observability::MetricsCollector;
use crate::process::CommandExecutor;
use crate::profile::ActiveProfileCopy;
use crate::requirements::{RequirementFile, RequirementsCollator, file_names};
use crate::stack::Stack;

pub const DEFAULT_PARENT_REPOSITORY: &str = "pipelineimage/runtime";
pub const DEFAULT_PYTHON_VERSION: &str = "3.10";
pub const INTERMEDIATE_IMAGE_REPOSITORY: &str = "pipeline-image-intermediate";

pub fn default_parent_image(python_version: &str) -> String {
    format!(
        "{DEFAULT_PARENT_REPOSITORY}:{}-py{python_version}",
        env!("CARGO_PKG_VERSION")
    )
}

pub fn intermediate_image_name(pipeline_name: &str) -> String {
    format!("{INTERMEDIATE_IMAGE_REPOSITORY}:{pipeline_name}")
}

#[derive(Debug, Clone)]
pub struct BuilderSettings {
    pub default_parent_image: String,
    pub source_root: PathBuf,
    pub profile_dir: Option<PathBuf>,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            default_parent_image: default_parent_image(DEFAULT_PYTHON_VERSION),
            source_root: PathBuf::from("."),
            profile_dir: dirs::config_dir().map(|dir| dir.join("pipeline-image")),
        }
    }
}

pub fn requires_build(config: &BuildConfiguration, entrypoint: Option<&str>) -> bool {
    config.requirements().is_some_and(|r| !r.is_empty())
        || !config.required_integrations().is_empty()
        || config.replicate_local_environment().is_some()
        || config.install_stack_requirements()
        || !config.environment().is_empty()
        || config.copy_files()
        || config.copy_profile()
        || entrypoint.is_some_and(|e| !e.is_empty())
}

/// How the target image will be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildPlan {
    Dockerfile { dockerfile: PathBuf },
    DockerfileThenSynthesize {
        dockerfile: PathBuf,
        intermediate_image: String,
    },
    TagParent { parent_image: String },
    Synthesize { parent_image: String },
}

impl BuildPlan {
    pub fn synthesis_parent(&self) -> Option<&str> {
        match self {
            BuildPlan::DockerfileThenSynthesize {
                intermediate_image, ..
            } => Some(intermediate_image),
            BuildPlan::Synthesize { parent_image } => Some(parent_image),
            BuildPlan::Dockerfile { .. } | BuildPlan::TagParent { .. } => None,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            BuildPlan::Dockerfile { dockerfile } => {
                format!("build {} as the target image", dockerfile.display())
            }
            BuildPlan::DockerfileThenSynthesize {
                dockerfile,
                intermediate_image,
            } => format!(
                "build {} as {}, then synthesize the target image on top",
                dockerfile.display(),
                intermediate_image
            ),
            BuildPlan::TagParent { parent_image } => {
                format!("tag {parent_image} as the target image")
            }
            BuildPlan::Synthesize { parent_image } => {
                format!("synthesize the target image on top of {parent_image}")
            }
        }
    }
}

/// Choose a [`BuildPlan`] for an already resolved parent image.
pub fn plan_build(
    config: &BuildConfiguration,
    entrypoint: Option<&str>,
    pipeline_name: &str,
    parent_image: &str,
    default_parent_image: &str,
) -> BuildResult<BuildPlan> {
    let requires_build = requires_build(config, entrypoint);

    if let Some(dockerfile) = config.dockerfile() {
        let dockerfile = dockerfile.to_path_buf();
        return Ok(if requires_build {
            BuildPlan::DockerfileThenSynthesize {
                dockerfile,
                intermediate_image: intermediate_image_name(pipeline_name),
            }
        } else {
            BuildPlan::Dockerfile { dockerfile }
        });
    }

    if requires_build {
        return Ok(BuildPlan::Synthesize {
            parent_image: parent_image.to_string(),
        });
    }

    if parent_image == default_parent_image {
        return Err(BuildError::InsufficientConfiguration);
    }

    Ok(BuildPlan::TagParent {
        parent_image: parent_image.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct PreparedBuild {
    pub plan: BuildPlan,
    pub requirement_files: Vec<RequirementFile>,
    pub dockerfile: Vec<String>,
}

pub struct PipelineImageBuilder<'a> {
    image_builder: &'a dyn ImageBuilder,
    integrations: &'a IntegrationRegistry,
    executor: &'a dyn CommandExecutor,
    settings: BuilderSettings,
    docker_parent_image: Option<String>,
    metrics: MetricsCollector,
}

impl<'a> PipelineImageBuilder<'a> {
    pub fn new(
        image_builder: &'a dyn ImageBuilder,
        integrations: &'a IntegrationRegistry,
        executor: &'a dyn CommandExecutor,
        settings: BuilderSettings,
    ) -> Self {
        Self {
            image_builder,
            integrations,
            executor,
            settings,
            docker_parent_image: None,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_parent_image(mut self, image: Option<String>) -> Self {
        self.docker_parent_image = image;
        self
    }

    pub fn settings(&self) -> &BuilderSettings {
        &self.settings
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    pub fn resolve_parent_image<'c>(&'c self, config: &'c BuildConfiguration) -> &'c str {
        config
            .parent_image()
            .or(self.docker_parent_image.as_deref())
            .unwrap_or(&self.settings.default_parent_image)
    }

    pub fn plan(
        &self,
        pipeline_name: &str,
        config: &BuildConfiguration,
        entrypoint: Option<&str>,
    ) -> BuildResult<BuildPlan> {
        plan_build(
            config,
            entrypoint,
            pipeline_name,
            self.resolve_parent_image(config),
            &self.settings.default_parent_image,
        )
    }

    pub fn prepare(
        &self,
        pipeline_name: &str,
        config: &BuildConfiguration,
        stack: &dyn Stack,
        entrypoint: Option<&str>,
    ) -> BuildResult<PreparedBuild> {
        let plan = self.plan(pipeline_name, config, entrypoint)?;
        let (requirement_files, dockerfile) = match plan.synthesis_parent() {
            Some(parent) => {
                let files = self.gather_requirements(config, stack)?;
                let lines = dockerfile::render(parent, config, &file_names(&files), entrypoint);
                (files, lines)
            }
            None => (Vec::new(), Vec::new()),
        };
        Ok(PreparedBuild {
            plan,
            requirement_files,
            dockerfile,
        })
    }

    #[instrument(skip(self, config, stack), fields(stack = stack.name()))]
    pub fn build(
        &self,
        target_image_name: &str,
        pipeline_name: &str,
        config: &BuildConfiguration,
        stack: &dyn Stack,
        entrypoint: Option<&str>,
    ) -> BuildResult<()> {
        info!("Building Docker image(s) for pipeline `{pipeline_name}`");
        let plan = self.plan(pipeline_name, config, entrypoint)?;
        info!(plan = %plan.summary(), "Selected build strategy");

        match &plan {
            BuildPlan::Dockerfile { dockerfile } => {
                self.warn_ignored_parent(config);
                self.build_dockerfile(target_image_name, dockerfile, config)?;
            }
            BuildPlan::DockerfileThenSynthesize {
                dockerfile,
                intermediate_image,
            } => {
                self.warn_ignored_parent(config);
                self.build_dockerfile(intermediate_image, dockerfile, config)?;
                self.build_synthesized(
                    target_image_name,
                    intermediate_image,
                    config,
                    stack,
                    entrypoint,
                )?;
            }
            BuildPlan::TagParent { parent_image } => {
                let _timer = self.metrics.start_phase("tag");
                self.image_builder.tag(parent_image, target_image_name)?;
                self.metrics.record_tag();
            }
            BuildPlan::Synthesize { parent_image } => {
                self.build_synthesized(target_image_name, parent_image, config, stack, entrypoint)?;
            }
        }

        Ok(())
    }

    fn warn_ignored_parent(&self, config: &BuildConfiguration) {
        if self.resolve_parent_image(config) != self.settings.default_parent_image {
            warn!(
                "You've specified both a Dockerfile and a custom parent image, ignoring the parent image."
            );
        }
    }

    fn build_dockerfile(
        &self,
        image_name: &str,
        dockerfile: &Path,
        config: &BuildConfiguration,
    ) -> BuildResult<()> {
        let _timer = self.metrics.start_phase("dockerfile_build");
        self.image_builder.build(&BuildRequest {
            image_name,
            dockerfile: DockerfileSource::Path(dockerfile),
            build_context_root: config.build_context_root(),
            dockerignore: None,
            extra_files: &[],
            pull: false,
            build_options: Some(config.build_options()),
        })?;
        self.metrics.record_build();
        Ok(())
    }

    fn gather_requirements(
        &self,
        config: &BuildConfiguration,
        stack: &dyn Stack,
    ) -> BuildResult<Vec<RequirementFile>> {
        let _timer = self.metrics.start_phase("gather_requirements");
        RequirementsCollator::new(self.integrations, self.executor).gather(config, stack)
    }

    fn build_synthesized(
        &self,
        target_image_name: &str,
        parent_image: &str,
        config: &BuildConfiguration,
        stack: &dyn Stack,
        entrypoint: Option<&str>,
    ) -> BuildResult<()> {
        let requirement_files = self.gather_requirements(config, stack)?;
        let lines = dockerfile::render(
            parent_image,
            config,
            &file_names(&requirement_files),
            entrypoint,
        );

        // The pinned default never changes under its tag; anything else may
        // have been pushed again since it was last pulled.
        let pull = parent_image != self.settings.default_parent_image
            && !self.image_builder.is_local(parent_image)?;

        let build_context_root = (config.copy_files() || config.copy_profile())
            .then_some(self.settings.source_root.as_path());

        let request = BuildRequest {
            image_name: target_image_name,
            dockerfile: DockerfileSource::Lines(&lines),
            build_context_root,
            dockerignore: config.dockerignore(),
            extra_files: &requirement_files,
            pull,
            build_options: None,
        };

        let _timer = self.metrics.start_phase("synthesized_build");
        {
            let _profile = match build_context_root {
                Some(root) if config.copy_profile() => Some(ActiveProfileCopy::create(
                    root,
                    self.settings.profile_dir.as_deref(),
                    stack.name(),
                )?),
                _ => None,
            };
            self.image_builder.build(&request)?;
        }
        self.metrics.record_build();
        Ok(())
    }
}
