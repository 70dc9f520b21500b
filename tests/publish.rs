mod common;

use std::path::PathBuf;

use common::{EngineCall, FakeRegistry, FakeStack, RecordingEngine, ScriptedExecutor};
use pipeline_image::builder::{BuilderSettings, PipelineImageBuilder, default_parent_image};
use pipeline_image::config::BuildConfiguration;
use pipeline_image::error::BuildError;
use pipeline_image::integrations::IntegrationRegistry;
use pipeline_image::publish::{DOCKER_IMAGE_KEY, RunRecord};
use serde_json::json;

fn settings() -> BuilderSettings {
    BuilderSettings {
        default_parent_image: default_parent_image("3.10"),
        source_root: PathBuf::from("/src"),
        profile_dir: None,
    }
}

fn config() -> BuildConfiguration {
    BuildConfiguration::default()
        .with_copy_files(false)
        .with_copy_profile(false)
        .with_packages(["scikit-learn"])
}

#[test]
fn pushed_digest_is_recorded_on_the_run() {
    let engine = RecordingEngine::new();
    let integrations = IntegrationRegistry::with_defaults();
    let executor = ScriptedExecutor::new();
    let builder = PipelineImageBuilder::new(&engine, &integrations, &executor, settings());
    let stack = FakeStack::local()
        .with_registry(FakeRegistry::new("registry.example.com/ml", "sha256:abc123"));

    let mut run = RunRecord::new();
    run.insert("status".to_string(), json!("running"));

    let digest = builder
        .build_and_push("training", &config(), &stack, &mut run, None)
        .unwrap();

    assert_eq!(digest, "registry.example.com/ml/pipeline-image@sha256:abc123");
    assert_eq!(run.get(DOCKER_IMAGE_KEY), Some(&json!(digest)));
    assert_eq!(run.get("status"), Some(&json!("running")));

    let registry = stack.registry.as_ref().unwrap();
    assert_eq!(registry.pushed(), vec!["registry.example.com/ml/pipeline-image:training"]);
    match &engine.calls()[0] {
        EngineCall::Build { image, .. } => {
            assert_eq!(image, "registry.example.com/ml/pipeline-image:training")
        }
        other => panic!("expected build, got {other:?}"),
    }
    assert_eq!(builder.metrics().snapshot().images_pushed, 1);
}

#[test]
fn custom_target_repository_is_used_in_image_name() {
    let engine = RecordingEngine::new();
    let integrations = IntegrationRegistry::with_defaults();
    let executor = ScriptedExecutor::new();
    let builder = PipelineImageBuilder::new(&engine, &integrations, &executor, settings());
    let stack = FakeStack::local().with_registry(FakeRegistry::new("gcr.io/proj", "sha256:1"));

    let mut run = RunRecord::new();
    builder
        .build_and_push(
            "nightly",
            &config().with_target_repository("forecasting"),
            &stack,
            &mut run,
            None,
        )
        .unwrap();

    assert_eq!(
        stack.registry.as_ref().unwrap().pushed(),
        vec!["gcr.io/proj/forecasting:nightly"]
    );
}

#[test]
fn stack_without_registry_cannot_push() {
    let engine = RecordingEngine::new();
    let integrations = IntegrationRegistry::with_defaults();
    let executor = ScriptedExecutor::new();
    let builder = PipelineImageBuilder::new(&engine, &integrations, &executor, settings());

    let mut run = RunRecord::new();
    let err = builder
        .build_and_push("training", &config(), &FakeStack::local(), &mut run, None)
        .unwrap_err();

    match err {
        BuildError::NoContainerRegistry { stack } => assert_eq!(stack, "local"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(engine.calls().is_empty());
    assert!(run.is_empty());
}
