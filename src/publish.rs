use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::builder::PipelineImageBuilder;
use crate::config::BuildConfiguration;
use crate::error::{BuildError, BuildResult};
use crate::stack::Stack;

pub type RunRecord = Map<String, Value>;

pub const DOCKER_IMAGE_KEY: &str = "docker_image";

pub fn target_image_name(registry_uri: &str, target_repository: &str, pipeline_name: &str) -> String {
    format!("{registry_uri}/{target_repository}:{pipeline_name}")
}

impl PipelineImageBuilder<'_> {
    /// Build the pipeline image, push it to the stack's container registry and
    /// record the resulting digest in `run_record`.
    #[instrument(skip(self, config, stack, run_record), fields(stack = stack.name()))]
    pub fn build_and_push(
        &self,
        pipeline_name: &str,
        config: &BuildConfiguration,
        stack: &dyn Stack,
        run_record: &mut RunRecord,
        entrypoint: Option<&str>,
    ) -> BuildResult<String> {
        let registry = stack
            .container_registry()
            .ok_or_else(|| BuildError::NoContainerRegistry {
                stack: stack.name().to_string(),
            })?;

        let target = target_image_name(registry.uri(), config.target_repository(), pipeline_name);
        self.build(&target, pipeline_name, config, stack, entrypoint)?;

        let digest = {
            let _timer = self.metrics().start_phase("push");
            registry.push_image(&target)?
        };
        self.metrics().record_push();

        run_record.insert(DOCKER_IMAGE_KEY.to_string(), Value::String(digest.clone()));
        info!(image = %target, digest = %digest, "Recorded pipeline image digest");
        Ok(digest)
    }
}
