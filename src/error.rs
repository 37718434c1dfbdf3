use thiserror::Error;

use crate::project::QualifiedName;

/// Errors raised while assembling a session, before any project is built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
	#[error("Project \"{name}\" is registered more than once")]
	DuplicateProject { name: QualifiedName },

	#[error("Unknown project \"{name}\"")]
	UnknownProject { name: QualifiedName },

	#[error("Project \"{project}\" depends upon unknown project \"{missing}\"")]
	UnknownDependency { project: QualifiedName, missing: QualifiedName },

	#[error("Cyclic dependency: {}", format_cycle(.cycle))]
	CyclicDependency { cycle: Vec<QualifiedName> },

	#[error(
		"Conflicting define \"{define}\" in \"{project}\": {} from \"{first_origin}\" and {} from \"{second_origin}\"",
		format_value(.first_value),
		format_value(.second_value)
	)]
	ConflictingDefine {
		project: QualifiedName,
		define: String,
		first_value: Option<String>,
		first_origin: QualifiedName,
		second_value: Option<String>,
		second_origin: QualifiedName,
	},

	#[error("Project \"{project}\" has no include directories and no source files")]
	EmptyProject { project: QualifiedName },

	#[error("Invalid include pattern \"{pattern}\" in \"{project}\": {message}")]
	InvalidPattern { project: QualifiedName, pattern: String, message: String },

	#[error("Unknown source type in \"{project}\": {source_file}")]
	UnsupportedSource { project: QualifiedName, source_file: String },

	#[error("Configure step of \"{project}\" failed: {message}")]
	ConfigureFailed { project: QualifiedName, message: String },
}

fn format_cycle(cycle: &[QualifiedName]) -> String {
	cycle.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(" -> ")
}

fn format_value(value: &Option<String>) -> String {
	match value {
		Some(x) => format!("\"{}\"", x),
		None => "no value".to_owned(),
	}
}

/// Failure reported by a toolchain collaborator. The diagnostic is passed
/// through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{diagnostic}")]
pub struct ToolchainError {
	pub diagnostic: String,
}

impl ToolchainError {
	pub fn new(diagnostic: impl Into<String>) -> Self {
		ToolchainError { diagnostic: diagnostic.into() }
	}
}
