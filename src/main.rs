use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use pipeline_image::builder::{
    BuilderSettings, DEFAULT_PYTHON_VERSION, PipelineImageBuilder, default_parent_image,
};
use pipeline_image::docker::DockerCli;
use pipeline_image::dockerfile::to_dockerfile;
use pipeline_image::integrations::IntegrationRegistry;
use pipeline_image::lockfile::generate_lock;
use pipeline_image::observability::{MetricsCollector, log_snapshot};
use pipeline_image::process::ShellExecutor;
use pipeline_image::publish::RunRecord;
use pipeline_image::recipe::Recipe;
use pipeline_image::stack::ConfiguredStack;
use pipeline_image::validation::{ValidationReport, validate_recipe};
use serde_json::{Value, to_writer_pretty};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_tracing()?;

    match cli.command {
        Commands::Build {
            source,
            tag,
            metrics,
        } => build_command(source, tag, metrics),
        Commands::Push {
            source,
            run_record,
            metrics,
        } => push_command(source, run_record, metrics),
        Commands::Render { source } => render_command(source),
        Commands::Requirements { source } => requirements_command(source),
        Commands::Validate { source } => validate_command(source, false),
        Commands::Lint { source } => validate_command(source, true),
        Commands::Lock { source, output } => lock_command(source, output),
        Commands::ListIntegrations { recipe } => list_integrations(recipe),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "pipeline-image",
                &mut io::stdout(),
            );
            Ok(())
        }
    }
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))
}

struct Loaded {
    recipe: Recipe,
    integrations: IntegrationRegistry,
    stack: ConfiguredStack,
    settings: BuilderSettings,
}

impl Loaded {
    fn from_args(args: &SourceArgs) -> Result<Self> {
        let recipe = Recipe::load(&args.recipe)?;
        let integrations = recipe.integration_registry();
        let stack = ConfiguredStack::from_spec(&recipe.stack, &integrations)
            .with_context(|| format!("Invalid stack '{}'", recipe.stack.name))?;
        let settings = args.settings(recipe.base_dir());
        Ok(Self {
            recipe,
            integrations,
            stack,
            settings,
        })
    }

    fn validate(&self, recipe_path: &Path, strict: bool) -> Result<()> {
        let report = validate_recipe(&self.recipe, &self.integrations, &self.settings);
        report_validation(recipe_path, &report, strict)
    }
}

fn with_builder<T>(
    loaded: &Loaded,
    action: impl FnOnce(&PipelineImageBuilder<'_>) -> Result<T>,
) -> Result<T> {
    let docker = DockerCli::default();
    let executor = ShellExecutor::in_dir(&loaded.settings.source_root);
    let builder = PipelineImageBuilder::new(
        &docker,
        &loaded.integrations,
        &executor,
        loaded.settings.clone(),
    )
    .with_parent_image(loaded.recipe.stack.docker_parent_image.clone());
    action(&builder)
}

fn build_command(source: SourceArgs, tag: Option<String>, metrics: MetricsArgs) -> Result<()> {
    let loaded = Loaded::from_args(&source)?;
    loaded.validate(&source.recipe, false)?;
    let config = loaded.recipe.build_configuration();
    let target = tag.unwrap_or_else(|| {
        format!("{}:{}", config.target_repository(), loaded.recipe.pipeline)
    });

    with_builder(&loaded, |builder| {
        builder.build(
            &target,
            &loaded.recipe.pipeline,
            &config,
            &loaded.stack,
            loaded.recipe.entrypoint(),
        )?;
        info!(image = %target, "Pipeline image ready");
        metrics.emit(&builder.metrics())
    })
}

fn push_command(source: SourceArgs, run_record: Option<PathBuf>, metrics: MetricsArgs) -> Result<()> {
    let loaded = Loaded::from_args(&source)?;
    loaded.validate(&source.recipe, false)?;
    let config = loaded.recipe.build_configuration();

    let mut record = match &run_record {
        Some(path) if path.exists() => read_run_record(path)?,
        _ => RunRecord::new(),
    };

    let digest = with_builder(&loaded, |builder| {
        let digest = builder.build_and_push(
            &loaded.recipe.pipeline,
            &config,
            &loaded.stack,
            &mut record,
            loaded.recipe.entrypoint(),
        )?;
        metrics.emit(&builder.metrics())?;
        Ok(digest)
    })?;

    if let Some(path) = run_record {
        create_parent_dir(&path)?;
        let file = File::create(&path)
            .with_context(|| format!("Failed to create run record: {}", path.display()))?;
        to_writer_pretty(file, &record)
            .with_context(|| format!("Failed to write run record: {}", path.display()))?;
        info!(run_record = %path.display(), "Run record updated");
    }

    println!("{digest}");
    Ok(())
}

fn read_run_record(path: &Path) -> Result<RunRecord> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read run record: {}", path.display()))?;
    match serde_json::from_str::<Value>(&content)
        .with_context(|| format!("Failed to parse run record: {}", path.display()))?
    {
        Value::Object(record) => Ok(record),
        _ => Err(anyhow!("Run record {} must be a JSON object", path.display())),
    }
}

fn render_command(source: SourceArgs) -> Result<()> {
    let loaded = Loaded::from_args(&source)?;
    let config = loaded.recipe.build_configuration();
    let prepared = with_builder(&loaded, |builder| {
        Ok(builder.prepare(
            &loaded.recipe.pipeline,
            &config,
            &loaded.stack,
            loaded.recipe.entrypoint(),
        )?)
    })?;

    println!("# {}", prepared.plan.summary());
    if !prepared.dockerfile.is_empty() {
        print!("{}", to_dockerfile(&prepared.dockerfile));
    }
    Ok(())
}

fn requirements_command(source: SourceArgs) -> Result<()> {
    let loaded = Loaded::from_args(&source)?;
    let config = loaded.recipe.build_configuration();
    let prepared = with_builder(&loaded, |builder| {
        Ok(builder.prepare(
            &loaded.recipe.pipeline,
            &config,
            &loaded.stack,
            loaded.recipe.entrypoint(),
        )?)
    })?;

    if prepared.requirement_files.is_empty() {
        println!("No requirements are installed for this build.");
    }
    for file in &prepared.requirement_files {
        println!("# {}", file.name);
        println!("{}", file.content.trim_end());
    }
    Ok(())
}

fn validate_command(source: SourceArgs, strict: bool) -> Result<()> {
    let loaded = Loaded::from_args(&source)?;
    loaded.validate(&source.recipe, strict)
}

fn report_validation(recipe_path: &Path, report: &ValidationReport, strict: bool) -> Result<()> {
    for warning in &report.warnings {
        warn!(file = %recipe_path.display(), "{warning}");
    }

    if !report.is_ok() {
        for error_msg in &report.errors {
            error!(file = %recipe_path.display(), "{error_msg}");
        }
        return Err(anyhow!(
            "Recipe validation failed with {} error(s)",
            report.errors.len()
        ));
    }

    if strict && !report.warnings.is_empty() {
        return Err(anyhow!(
            "Recipe lint failed with {} warning(s)",
            report.warnings.len()
        ));
    }

    info!(file = %recipe_path.display(), "Recipe validation passed");
    Ok(())
}

fn lock_command(source: SourceArgs, output: PathBuf) -> Result<()> {
    let loaded = Loaded::from_args(&source)?;
    loaded
        .validate(&source.recipe, false)
        .context("Cannot generate lockfile")?;
    let config = loaded.recipe.build_configuration();
    let prepared = with_builder(&loaded, |builder| {
        Ok(builder.prepare(
            &loaded.recipe.pipeline,
            &config,
            &loaded.stack,
            loaded.recipe.entrypoint(),
        )?)
    })?;

    create_parent_dir(&output)?;
    generate_lock(&loaded.recipe, &prepared, &output)?;
    info!(lockfile = %output.display(), "Lockfile generated successfully");
    Ok(())
}

fn list_integrations(recipe: Option<PathBuf>) -> Result<()> {
    let registry = match recipe {
        Some(path) => Recipe::load(&path)?.integration_registry(),
        None => IntegrationRegistry::with_defaults(),
    };
    println!("Available integrations:");
    for name in registry.known_integrations() {
        let requirements = registry.select_requirements(&name)?;
        println!("- {name}: {}", requirements.join(", "));
    }
    Ok(())
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "pipeline-image",
    version,
    about = "Build and publish container images for ML pipelines"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the pipeline image locally.
    Build {
        #[command(flatten)]
        source: SourceArgs,
        /// Image name to build, defaults to `<target_repository>:<pipeline>`.
        #[arg(long)]
        tag: Option<String>,
        #[command(flatten)]
        metrics: MetricsArgs,
    },
    /// Build the pipeline image and push it to the stack's container registry.
    Push {
        #[command(flatten)]
        source: SourceArgs,
        /// JSON run record the image digest is written to.
        #[arg(long = "run-record")]
        run_record: Option<PathBuf>,
        #[command(flatten)]
        metrics: MetricsArgs,
    },
    /// Print the build plan and the synthesized Dockerfile.
    Render {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Print the requirement files that would be installed.
    Requirements {
        #[command(flatten)]
        source: SourceArgs,
    },
    Validate {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Validate and treat warnings as errors.
    Lint {
        #[command(flatten)]
        source: SourceArgs,
    },
    Lock {
        #[command(flatten)]
        source: SourceArgs,
        output: PathBuf,
    },
    ListIntegrations {
        /// Include integrations declared in this recipe.
        #[arg(long)]
        recipe: Option<PathBuf>,
    },
    Completions {
        shell: Shell,
    },
}

#[derive(Args)]
struct SourceArgs {
    recipe: PathBuf,
    /// Build context for synthesized images, defaults to the recipe directory.
    #[arg(long = "source-root")]
    source_root: Option<PathBuf>,
    /// Active profile directory copied into the image.
    #[arg(long = "profile-dir")]
    profile_dir: Option<PathBuf>,
    /// Python version of the default parent image.
    #[arg(long = "python-version", default_value = DEFAULT_PYTHON_VERSION)]
    python_version: String,
}

impl SourceArgs {
    fn settings(&self, recipe_dir: &Path) -> BuilderSettings {
        let defaults = BuilderSettings::default();
        let source_root = self.source_root.clone().unwrap_or_else(|| {
            if recipe_dir.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                recipe_dir.to_path_buf()
            }
        });
        BuilderSettings {
            default_parent_image: default_parent_image(&self.python_version),
            source_root,
            profile_dir: self.profile_dir.clone().or(defaults.profile_dir),
        }
    }
}

#[derive(Args)]
struct MetricsArgs {
    #[arg(long)]
    print_metrics: bool,
    #[arg(long = "metrics-json")]
    metrics_json: Option<PathBuf>,
    #[arg(long = "metrics-prometheus")]
    metrics_prometheus: Option<PathBuf>,
}

impl MetricsArgs {
    fn emit(&self, collector: &MetricsCollector) -> Result<()> {
        if !self.print_metrics && self.metrics_json.is_none() && self.metrics_prometheus.is_none() {
            return Ok(());
        }

        let snapshot = collector.snapshot();
        if self.print_metrics {
            log_snapshot(&snapshot);
        }
        if let Some(path) = &self.metrics_json {
            create_parent_dir(path)?;
            let file = File::create(path)
                .with_context(|| format!("Failed to create metrics file: {}", path.display()))?;
            to_writer_pretty(file, &snapshot)
                .with_context(|| format!("Failed to write metrics JSON: {}", path.display()))?;
            info!(metrics = %path.display(), "Metrics JSON written");
        }
        if let Some(path) = &self.metrics_prometheus {
            create_parent_dir(path)?;
            std::fs::write(path, snapshot.to_prometheus()).with_context(|| {
                format!("Failed to write Prometheus metrics: {}", path.display())
            })?;
            info!(metrics = %path.display(), "Prometheus metrics written");
        }
        Ok(())
    }
}
