pub mod config;
pub mod error;
pub mod graph;
pub mod manifest;
mod misc;
pub mod project;
pub mod registry;
pub mod scheduler;
pub mod target;
pub mod toolchain;

use serde::Deserialize;

pub use config::{ConfigContext, ConfigEntries, ConfigResolver, EffectiveConfig, ResolvedConfigs};
pub use error::{ConfigError, ToolchainError};
pub use graph::DependencyGraph;
pub use misc::{SourcePath, Sources};
pub use project::{Define, ProjectDescriptor, QualifiedName};
pub use registry::ProjectRegistry;
pub use scheduler::{BuildScheduler, CancelToken, NodeStatus, ProjectReport, SessionReport, SkipReason};
pub use target::{TargetPlatform, TargetType};
pub use toolchain::{BuildArtifact, CompileRequest, LinkRequest, ObjectArtifact, Toolchain};

/// Settings that apply to every project of a session.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalOptions {
	pub c_standard: Option<String>,
	pub cpp_standard: Option<String>,
	pub position_independent_code: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
	/// Defaults to the available hardware concurrency.
	pub max_parallelism: Option<usize>,
	pub cancel: CancelToken,
}

/// Registers `descriptors`, validates the graph, resolves every configuration
/// and builds. Configuration errors are reported before anything is built.
pub fn run_session(
	descriptors: Vec<ProjectDescriptor>,
	toolchain: &dyn Toolchain,
	options: &SessionOptions,
) -> Result<SessionReport, ConfigError> {
	let mut registry = ProjectRegistry::new();
	for descriptor in descriptors {
		registry.register(descriptor)?;
	}
	let graph = DependencyGraph::build(registry)?;
	let configs = ConfigResolver::new(&graph).resolve_all()?;

	let mut scheduler = BuildScheduler::new(toolchain).cancel_token(options.cancel.clone());
	if let Some(max_parallelism) = options.max_parallelism {
		scheduler = scheduler.max_parallelism(max_parallelism);
	}
	Ok(scheduler.run(&graph, &configs))
}
