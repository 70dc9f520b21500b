use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::dockerfile::PROFILE_CONFIG_DIR;
use crate::error::{BuildError, BuildResult};

pub const ACTIVE_STACK_FILE: &str = "active_stack";

/// Guard owning `<build context>/.pipelineconfig`; the directory is removed on drop.
#[derive(Debug)]
pub struct ActiveProfileCopy {
    path: PathBuf,
}

impl ActiveProfileCopy {
    pub fn create(
        build_context_root: &Path,
        profile_dir: Option<&Path>,
        stack_name: &str,
    ) -> BuildResult<Self> {
        let guard = Self {
            path: build_context_root.join(PROFILE_CONFIG_DIR),
        };
        guard.populate(profile_dir, stack_name).map_err(|source| {
            BuildError::ProfileCopy {
                path: guard.path.clone(),
                source,
            }
        })?;
        debug!(path = %guard.path.display(), "Active profile copied into build context");
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn populate(&self, profile_dir: Option<&Path>, stack_name: &str) -> io::Result<()> {
        if self.path.exists() {
            fs::remove_dir_all(&self.path)?;
        }
        fs::create_dir_all(&self.path)?;

        match profile_dir {
            Some(source) if source.is_dir() => copy_dir(source, &self.path)?,
            Some(source) => warn!(
                profile = %source.display(),
                "Profile directory not found, copying only the active stack"
            ),
            None => {}
        }

        fs::write(self.path.join(ACTIVE_STACK_FILE), format!("{stack_name}\n"))
    }
}

impl Drop for ActiveProfileCopy {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.path)
            && err.kind() != io::ErrorKind::NotFound
        {
            warn!(
                path = %self.path.display(),
                error = %err,
                "Failed to remove profile copy from build context"
            );
        }
    }
}

fn copy_dir(source: &Path, destination: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source).min_depth(1).follow_links(true) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
