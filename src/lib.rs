pub mod builder;
pub mod config;
pub mod docker;
pub mod dockerfile;
pub mod error;
pub mod integrations;
pub mod lockfile;
pub mod observability;
pub mod process;
pub mod profile;
pub mod publish;
pub mod recipe;
pub mod registry;
pub mod requirements;
pub mod stack;
pub mod validation;

pub use builder::{BuildPlan, BuilderSettings, PipelineImageBuilder};
pub use config::BuildConfiguration;
pub use error::{BuildError, BuildResult};
pub use recipe::Recipe;
