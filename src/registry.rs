use std::{collections::HashMap, sync::Arc};

use crate::{
	error::ConfigError,
	project::{ProjectDescriptor, QualifiedName},
};

/// Every project of a build session, in registration order.
///
/// Registration is only possible while the registry is owned directly;
/// [`DependencyGraph::build`](crate::graph::DependencyGraph::build) takes it by
/// value, after which it is only reachable read-only.
#[derive(Debug, Default)]
pub struct ProjectRegistry {
	projects: Vec<Arc<ProjectDescriptor>>,
	index: HashMap<QualifiedName, usize>,
}

impl ProjectRegistry {
	pub fn new() -> Self {
		ProjectRegistry::default()
	}

	pub fn register(&mut self, descriptor: ProjectDescriptor) -> Result<Arc<ProjectDescriptor>, ConfigError> {
		if self.index.contains_key(&descriptor.name) {
			return Err(ConfigError::DuplicateProject { name: descriptor.name });
		}
		log::debug!("Registering {} \"{}\"", descriptor.target_type, descriptor.name);
		let descriptor = Arc::new(descriptor);
		self.index.insert(descriptor.name.clone(), self.projects.len());
		self.projects.push(descriptor.clone());
		Ok(descriptor)
	}

	pub fn lookup(&self, name: &QualifiedName) -> Result<&Arc<ProjectDescriptor>, ConfigError> {
		match self.index.get(name) {
			Some(idx) => Ok(&self.projects[*idx]),
			None => Err(ConfigError::UnknownProject { name: name.clone() }),
		}
	}

	pub fn all(&self) -> &[Arc<ProjectDescriptor>] {
		&self.projects
	}

	pub fn len(&self) -> usize {
		self.projects.len()
	}

	pub fn is_empty(&self) -> bool {
		self.projects.is_empty()
	}

	pub(crate) fn index_of(&self, name: &QualifiedName) -> Option<usize> {
		self.index.get(name).copied()
	}

	pub(crate) fn get(&self, idx: usize) -> &Arc<ProjectDescriptor> {
		&self.projects[idx]
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::target::TargetType;

	fn lib(package: &str, name: &str) -> ProjectDescriptor {
		ProjectDescriptor::new(package, name, ".", TargetType::StaticLibrary)
	}

	#[test]
	fn register_and_lookup() {
		let mut registry = ProjectRegistry::new();
		registry.register(lib("artd", "logger")).unwrap();
		registry.register(lib("artd", "core")).unwrap();
		// Same name in another package is a different project
		registry.register(lib("other", "logger")).unwrap();

		assert_eq!(registry.len(), 3);
		let found = registry.lookup(&QualifiedName::new("artd", "core")).unwrap();
		assert_eq!(found.name.name, "core");

		let names = registry.all().iter().map(|x| x.name.to_string()).collect::<Vec<_>>();
		assert_eq!(names, vec!["artd/logger", "artd/core", "other/logger"]);
	}

	#[test]
	fn duplicate_project() {
		let orders = [
			(TargetType::StaticLibrary, TargetType::Executable),
			(TargetType::Executable, TargetType::StaticLibrary),
		];
		for (first, second) in orders {
			let mut registry = ProjectRegistry::new();
			registry.register(ProjectDescriptor::new("artd", "logger", ".", first)).unwrap();
			let err = registry.register(ProjectDescriptor::new("artd", "logger", ".", second)).unwrap_err();
			assert_eq!(err, ConfigError::DuplicateProject { name: QualifiedName::new("artd", "logger") });
			assert_eq!(registry.len(), 1);
		}
	}

	#[test]
	fn unknown_project() {
		let registry = ProjectRegistry::new();
		let name = QualifiedName::new("artd", "missing");
		assert_eq!(registry.lookup(&name).unwrap_err(), ConfigError::UnknownProject { name });
	}
}
