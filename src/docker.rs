use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::value_to_text;
use crate::dockerfile::{PROFILE_CONFIG_DIR, to_dockerfile};
use crate::process::Cmd;
use crate::requirements::RequirementFile;

pub const STAGED_DOCKERFILE: &str = ".pipeline.Dockerfile";

#[derive(Debug, Clone, Copy)]
pub enum DockerfileSource<'a> {
    Path(&'a Path),
    Lines(&'a [String]),
}

#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub image_name: &'a str,
    pub dockerfile: DockerfileSource<'a>,
    pub build_context_root: Option<&'a Path>,
    pub dockerignore: Option<&'a Path>,
    pub extra_files: &'a [RequirementFile],
    pub pull: bool,
    pub build_options: Option<&'a Map<String, Value>>,
}

pub trait ImageBuilder {
    fn build(&self, request: &BuildRequest<'_>) -> Result<()>;

    fn tag(&self, source_image: &str, target: &str) -> Result<()>;

    fn is_local(&self, image: &str) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct DockerCli {
    docker: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
        }
    }
}

impl DockerCli {
    pub fn new(docker: impl Into<String>) -> Self {
        Self {
            docker: docker.into(),
        }
    }

    fn build_args(&self, request: &BuildRequest<'_>, dockerfile: &Path, context: &Path) -> Cmd {
        let mut cmd = Cmd::new(&self.docker)
            .args(["build", "--tag", request.image_name, "--file"])
            .arg_path(dockerfile);
        if request.pull {
            cmd = cmd.arg("--pull");
        }
        if let Some(options) = request.build_options {
            cmd = cmd.args(option_flags(options));
        }
        cmd.arg_path(context)
    }
}

impl ImageBuilder for DockerCli {
    fn build(&self, request: &BuildRequest<'_>) -> Result<()> {
        let staging = stage_context(request)?;
        let (dockerfile, context) = match (&staging, request.dockerfile) {
            (Some(dir), _) => (dir.path().join(STAGED_DOCKERFILE), dir.path().to_path_buf()),
            (None, DockerfileSource::Path(path)) => (
                path.to_path_buf(),
                request
                    .build_context_root
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from(".")),
            ),
            (None, DockerfileSource::Lines(_)) => unreachable!("synthesized builds are staged"),
        };

        info!(image = request.image_name, "Building Docker image");
        let output = self
            .build_args(request, &dockerfile, &context)
            .error_msg(format!("Failed to build image '{}'", request.image_name))
            .run()?;
        for line in output.stdout.lines().chain(output.stderr.lines()) {
            debug!("{line}");
        }
        info!(image = request.image_name, "Finished building Docker image");
        Ok(())
    }

    fn tag(&self, source_image: &str, target: &str) -> Result<()> {
        Cmd::new(&self.docker)
            .args(["tag", source_image, target])
            .error_msg(format!("Failed to tag '{source_image}' as '{target}'"))
            .run()?;
        Ok(())
    }

    fn is_local(&self, image: &str) -> Result<bool> {
        let output = Cmd::new(&self.docker)
            .args(["image", "inspect", image])
            .allow_fail()
            .run()?;
        Ok(output.success())
    }
}

/// Prepare a temporary build context when the request cannot be built in place.
///
/// User-authored Dockerfiles with a context root and no extra files are built
/// directly. Everything else gets a staging directory holding the context
/// minus ignored paths, then the Dockerfile, the extra files and an ignore
/// file that re-includes them.
fn stage_context(request: &BuildRequest<'_>) -> Result<Option<TempDir>> {
    if let DockerfileSource::Path(_) = request.dockerfile
        && request.build_context_root.is_some()
        && request.extra_files.is_empty()
        && request.dockerignore.is_none()
    {
        return Ok(None);
    }

    let staging = tempfile::Builder::new()
        .prefix("pipeline-image-build")
        .tempdir()
        .context("Failed to create staging directory for Docker build")?;

    let dockerignore = match request.dockerignore {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read dockerignore: {}", path.display()))?,
        ),
        None => None,
    };
    let rules = match &dockerignore {
        Some(content) => IgnoreRules::parse(content)?,
        None => IgnoreRules::default(),
    };

    if let Some(root) = request.build_context_root {
        copy_tree(root, staging.path(), &rules)?;
    }

    let dockerfile_content = match request.dockerfile {
        DockerfileSource::Path(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read Dockerfile: {}", path.display()))?,
        DockerfileSource::Lines(lines) => to_dockerfile(lines),
    };
    fs::write(staging.path().join(STAGED_DOCKERFILE), dockerfile_content)
        .context("Failed to write staged Dockerfile")?;

    for file in request.extra_files {
        fs::write(staging.path().join(&file.name), &file.content)
            .with_context(|| format!("Failed to write build file '{}'", file.name))?;
    }

    if let Some(content) = dockerignore {
        let mut staged = content;
        if !staged.is_empty() && !staged.ends_with('\n') {
            staged.push('\n');
        }
        let mut generated = vec![STAGED_DOCKERFILE.to_string()];
        generated.extend(request.extra_files.iter().map(|file| file.name.clone()));
        if staging.path().join(PROFILE_CONFIG_DIR).exists() {
            generated.push(PROFILE_CONFIG_DIR.to_string());
            generated.push(format!("{PROFILE_CONFIG_DIR}/**"));
        }
        for name in generated {
            staged.push_str(&format!("!{name}\n"));
        }
        fs::write(staging.path().join(".dockerignore"), staged)
            .context("Failed to write staged dockerignore")?;
    }

    Ok(Some(staging))
}

#[derive(Debug, Default)]
struct IgnoreRules {
    rules: Vec<(glob::Pattern, bool)>,
}

impl IgnoreRules {
    fn parse(content: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (pattern, exclude) = match line.strip_prefix('!') {
                Some(rest) => (rest.trim(), false),
                None => (line, true),
            };
            let pattern = pattern.trim_start_matches('/').trim_end_matches('/');
            if pattern.is_empty() {
                continue;
            }
            let pattern = glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid dockerignore pattern '{line}'"))?;
            rules.push((pattern, exclude));
        }
        Ok(Self { rules })
    }

    fn has_exceptions(&self) -> bool {
        self.rules.iter().any(|(_, exclude)| !exclude)
    }

    /// A path is excluded when the last rule matching it or one of its parents excludes.
    fn is_excluded(&self, relative: &Path) -> bool {
        let options = glob::MatchOptions {
            require_literal_separator: true,
            ..glob::MatchOptions::new()
        };
        let mut excluded = false;
        for (pattern, exclude) in &self.rules {
            if relative
                .ancestors()
                .filter(|p| !p.as_os_str().is_empty())
                .any(|p| pattern.matches_path_with(p, options))
            {
                excluded = *exclude;
            }
        }
        excluded
    }

    fn skips(&self, relative: &Path) -> bool {
        !relative.starts_with(PROFILE_CONFIG_DIR) && self.is_excluded(relative)
    }
}

fn copy_tree(source: &Path, destination: &Path, rules: &IgnoreRules) -> Result<()> {
    // Without exceptions an ignored directory can be pruned as a whole.
    let prune = !rules.has_exceptions();
    let walker = WalkDir::new(source).min_depth(1).into_iter().filter_entry(|entry| {
        !(prune
            && entry
                .path()
                .strip_prefix(source)
                .is_ok_and(|relative| rules.skips(relative)))
    });

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", source.display()))?;
        let relative = entry.path().strip_prefix(source)?;
        if rules.skips(relative) {
            continue;
        }
        let target = destination.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        if file_type.is_file() {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    let pointee = fs::read_link(link)?;
    std::os::unix::fs::symlink(&pointee, target)
        .with_context(|| format!("Failed to recreate symlink {}", target.display()))
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, _target: &Path) -> Result<()> {
    debug!(path = %link.display(), "Skipping symlink in build context");
    Ok(())
}

pub fn option_flags(options: &Map<String, Value>) -> Vec<String> {
    let mut flags = Vec::new();
    for (key, value) in options {
        match (key.as_str(), value) {
            ("buildargs", Value::Object(args)) => {
                for (name, arg) in args {
                    flags.push("--build-arg".to_string());
                    flags.push(format!("{name}={}", value_to_text(arg)));
                }
            }
            ("labels", Value::Object(labels)) => {
                for (name, label) in labels {
                    flags.push("--label".to_string());
                    flags.push(format!("{name}={}", value_to_text(label)));
                }
            }
            ("target", Value::String(target)) => {
                flags.push("--target".to_string());
                flags.push(target.clone());
            }
            ("network_mode", Value::String(network)) => {
                flags.push("--network".to_string());
                flags.push(network.clone());
            }
            ("platform", Value::String(platform)) => {
                flags.push("--platform".to_string());
                flags.push(platform.clone());
            }
            ("nocache", Value::Bool(true)) => flags.push("--no-cache".to_string()),
            ("pull", Value::Bool(true)) => flags.push("--pull".to_string()),
            ("nocache" | "pull", Value::Bool(false)) => {}
            (other, _) => warn!(option = other, "Ignoring unsupported build option"),
        }
    }
    flags
}
