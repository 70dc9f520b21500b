use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::builder::{BuildPlan, PreparedBuild};
use crate::dockerfile::to_dockerfile;
use crate::recipe::Recipe;

/// Snapshot of everything that determines the content of a pipeline image.
#[derive(Debug, Serialize)]
pub struct BuildLock {
    pub recipe_version: u32,
    pub generated_at: DateTime<Utc>,
    pub pipeline: String,
    pub stack: String,
    pub plan: BuildPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_dockerfile_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile_sha256: Option<String>,
    pub requirement_files: Vec<FileLock>,
}

#[derive(Debug, Serialize)]
pub struct FileLock {
    pub name: String,
    pub sha256: String,
}

pub fn build_lock(recipe: &Recipe, prepared: &PreparedBuild) -> Result<BuildLock> {
    let source_dockerfile_sha256 = match &prepared.plan {
        BuildPlan::Dockerfile { dockerfile } | BuildPlan::DockerfileThenSynthesize { dockerfile, .. } => {
            let content = std::fs::read(dockerfile)
                .with_context(|| format!("Failed to read Dockerfile: {}", dockerfile.display()))?;
            Some(sha256_hex(&content))
        }
        BuildPlan::TagParent { .. } | BuildPlan::Synthesize { .. } => None,
    };

    let dockerfile_sha256 = (!prepared.dockerfile.is_empty())
        .then(|| sha256_hex(to_dockerfile(&prepared.dockerfile).as_bytes()));

    Ok(BuildLock {
        recipe_version: recipe.version,
        generated_at: Utc::now(),
        pipeline: recipe.pipeline.clone(),
        stack: recipe.stack.name.clone(),
        plan: prepared.plan.clone(),
        source_dockerfile_sha256,
        dockerfile_sha256,
        requirement_files: prepared
            .requirement_files
            .iter()
            .map(|file| FileLock {
                name: file.name.clone(),
                sha256: sha256_hex(file.content.as_bytes()),
            })
            .collect(),
    })
}

pub fn generate_lock(recipe: &Recipe, prepared: &PreparedBuild, path: &Path) -> Result<BuildLock> {
    let lock = build_lock(recipe, prepared)?;

    let file = File::create(path)
        .with_context(|| format!("Failed to create lockfile: {}", path.display()))?;
    serde_yaml::to_writer(file, &lock)
        .with_context(|| format!("Failed to write lockfile: {}", path.display()))?;

    Ok(lock)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
