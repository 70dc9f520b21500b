#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use pipeline_image::docker::{BuildRequest, DockerfileSource, ImageBuilder};
use pipeline_image::process::{CommandExecutor, CommandOutput};
use pipeline_image::registry::ContainerRegistry;
use pipeline_image::requirements::RequirementFile;
use pipeline_image::stack::Stack;

#[derive(Debug, Clone, PartialEq)]
pub enum Dockerfile {
    Path(PathBuf),
    Lines(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Build {
        image: String,
        dockerfile: Dockerfile,
        context: Option<PathBuf>,
        extra_files: Vec<RequirementFile>,
        pull: bool,
        with_build_options: bool,
    },
    Tag {
        source: String,
        target: String,
    },
}

impl EngineCall {
    pub fn lines(&self) -> &[String] {
        match self {
            EngineCall::Build {
                dockerfile: Dockerfile::Lines(lines),
                ..
            } => lines,
            other => panic!("expected a synthesized build, got {other:?}"),
        }
    }
}

/// Image builder that records every call instead of talking to an engine.
#[derive(Default)]
pub struct RecordingEngine {
    calls: RefCell<Vec<EngineCall>>,
    local_images: Vec<String>,
    fail_builds: bool,
    watched: Option<PathBuf>,
    watched_during_build: RefCell<Vec<bool>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_image(mut self, image: &str) -> Self {
        self.local_images.push(image.to_string());
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_builds = true;
        self
    }

    /// Record whether `path` exists each time a build runs.
    pub fn watching(mut self, path: &Path) -> Self {
        self.watched = Some(path.to_path_buf());
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.borrow().clone()
    }

    pub fn watched_during_build(&self) -> Vec<bool> {
        self.watched_during_build.borrow().clone()
    }
}

impl ImageBuilder for RecordingEngine {
    fn build(&self, request: &BuildRequest<'_>) -> Result<()> {
        if let Some(path) = &self.watched {
            self.watched_during_build.borrow_mut().push(path.exists());
        }
        self.calls.borrow_mut().push(EngineCall::Build {
            image: request.image_name.to_string(),
            dockerfile: match request.dockerfile {
                DockerfileSource::Path(path) => Dockerfile::Path(path.to_path_buf()),
                DockerfileSource::Lines(lines) => Dockerfile::Lines(lines.to_vec()),
            },
            context: request.build_context_root.map(Path::to_path_buf),
            extra_files: request.extra_files.to_vec(),
            pull: request.pull,
            with_build_options: request.build_options.is_some(),
        });
        if self.fail_builds {
            bail!("engine rejected build of '{}'", request.image_name);
        }
        Ok(())
    }

    fn tag(&self, source_image: &str, target: &str) -> Result<()> {
        self.calls.borrow_mut().push(EngineCall::Tag {
            source: source_image.to_string(),
            target: target.to_string(),
        });
        Ok(())
    }

    fn is_local(&self, image: &str) -> Result<bool> {
        let built = self.calls.borrow().iter().any(|call| {
            matches!(call, EngineCall::Build { image: built, .. } if built == image)
        });
        Ok(built || self.local_images.iter().any(|local| local == image))
    }
}

pub struct FakeRegistry {
    uri: String,
    digest: String,
    pushed: RefCell<Vec<String>>,
}

impl FakeRegistry {
    pub fn new(uri: &str, digest: &str) -> Self {
        Self {
            uri: uri.to_string(),
            digest: digest.to_string(),
            pushed: RefCell::new(Vec::new()),
        }
    }

    pub fn pushed(&self) -> Vec<String> {
        self.pushed.borrow().clone()
    }
}

impl ContainerRegistry for FakeRegistry {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn push_image(&self, image_name: &str) -> Result<String> {
        self.pushed.borrow_mut().push(image_name.to_string());
        Ok(format!("{}@{}", image_name.split(':').next().unwrap_or(image_name), self.digest))
    }
}

pub struct FakeStack {
    pub name: String,
    pub requirements: BTreeSet<String>,
    pub registry: Option<FakeRegistry>,
}

impl FakeStack {
    pub fn local() -> Self {
        Self {
            name: "local".to_string(),
            requirements: BTreeSet::new(),
            registry: None,
        }
    }

    pub fn with_requirements(mut self, requirements: &[&str]) -> Self {
        self.requirements = requirements.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_registry(mut self, registry: FakeRegistry) -> Self {
        self.registry = Some(registry);
        self
    }
}

impl Stack for FakeStack {
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

/// Executor answering known commands with canned output.
#[derive(Default)]
pub struct ScriptedExecutor {
    outputs: HashMap<String, CommandOutput>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, command: &str, code: i32, stdout: &str, stderr: &str) -> Self {
        self.outputs.insert(
            command.to_string(),
            CommandOutput {
                code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, command: &str) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(command.to_string());
        self.outputs
            .get(command)
            .cloned()
            .ok_or_else(|| anyhow!("unexpected command: {command}"))
    }
}
