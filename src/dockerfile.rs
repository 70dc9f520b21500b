use std::fmt;

use crate::config::{BuildConfiguration, value_to_text};

pub const IMAGE_WORKDIR: &str = "/app";
pub const PROFILE_CONFIG_DIR: &str = ".pipelineconfig";
pub const PROFILE_CONFIG_ENV: &str = "PIPELINE_CONFIG_PATH";

pub fn profile_config_path() -> String {
    format!("{IMAGE_WORKDIR}/{PROFILE_CONFIG_DIR}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    From(String),
    Workdir(String),
    Env { key: String, value: String },
    Copy { source: String, destination: String },
    PipInstall(String),
    MakeWritable,
    Entrypoint(String),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::From(image) => write!(f, "FROM {image}"),
            Instruction::Workdir(path) => write!(f, "WORKDIR {path}"),
            Instruction::Env { key, value } => write!(f, "ENV {key}={value}"),
            Instruction::Copy {
                source,
                destination,
            } => write!(f, "COPY {source} {destination}"),
            Instruction::PipInstall(file) => {
                write!(f, "RUN pip install --no-cache-dir -r {file}")
            }
            Instruction::MakeWritable => f.write_str("RUN chmod -R a+rw ."),
            Instruction::Entrypoint(command) => write!(f, "ENTRYPOINT {command}"),
        }
    }
}

/// Build instructions for an image layered on `parent_image`.
pub fn instructions<S: AsRef<str>>(
    parent_image: &str,
    config: &BuildConfiguration,
    requirement_files: &[S],
    entrypoint: Option<&str>,
) -> Vec<Instruction> {
    let mut steps = vec![
        Instruction::From(parent_image.to_string()),
        Instruction::Workdir(IMAGE_WORKDIR.to_string()),
    ];

    if config.copy_profile() {
        steps.push(Instruction::Env {
            key: PROFILE_CONFIG_ENV.to_string(),
            value: profile_config_path(),
        });
    }

    for (key, value) in config.environment() {
        steps.push(Instruction::Env {
            key: key.to_uppercase(),
            value: value_to_text(value),
        });
    }

    for file in requirement_files {
        let file = file.as_ref();
        steps.push(Instruction::Copy {
            source: file.to_string(),
            destination: ".".to_string(),
        });
        steps.push(Instruction::PipInstall(file.to_string()));
    }

    if config.copy_files() {
        steps.push(Instruction::Copy {
            source: ".".to_string(),
            destination: ".".to_string(),
        });
    } else if config.copy_profile() {
        steps.push(Instruction::Copy {
            source: PROFILE_CONFIG_DIR.to_string(),
            destination: PROFILE_CONFIG_DIR.to_string(),
        });
    }

    steps.push(Instruction::MakeWritable);

    if let Some(entrypoint) = entrypoint.filter(|e| !e.is_empty()) {
        steps.push(Instruction::Entrypoint(entrypoint.to_string()));
    }

    steps
}

pub fn render<S: AsRef<str>>(
    parent_image: &str,
    config: &BuildConfiguration,
    requirement_files: &[S],
    entrypoint: Option<&str>,
) -> Vec<String> {
    instructions(parent_image, config, requirement_files, entrypoint)
        .iter()
        .map(ToString::to_string)
        .collect()
}

pub fn to_dockerfile(lines: &[String]) -> String {
    let mut content = lines.join("\n");
    content.push('\n');
    content
}
