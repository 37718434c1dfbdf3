use std::{collections::HashMap, path::PathBuf, sync::Arc};

use crate::{
	error::ConfigError,
	graph::DependencyGraph,
	misc::{expand_include_pattern, Sources},
	project::{Define, ProjectDescriptor, QualifiedName},
	target::TargetType,
};

/// Fully merged build configuration of one project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EffectiveConfig {
	pub project: QualifiedName,
	pub target_type: TargetType,
	/// Own directories first, then those of dependencies by increasing
	/// distance.
	pub include_dirs: Vec<PathBuf>,
	pub defines: Vec<Define>,
	pub sources: Sources,
	pub compile_flags: Vec<String>,
	pub link_flags: Vec<String>,
	/// Linkable dependencies, dependents before the projects they use.
	pub link_order: Vec<QualifiedName>,
	/// Set for dynamic libraries and for everything that ends up linked into
	/// one.
	pub position_independent: bool,
}

/// Read-only view handed to a project's configure callback.
pub struct ConfigContext<'a> {
	pub project: &'a ProjectDescriptor,
	pub config: &'a EffectiveConfig,
}

/// Settings a configure callback adds to its project's configuration. They
/// apply to the project itself and are never exported.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigEntries {
	pub defines: Vec<Define>,
	pub compile_flags: Vec<String>,
	pub link_flags: Vec<String>,
}

#[derive(Debug)]
struct OwnConfig {
	public_includes: Vec<PathBuf>,
	private_includes: Vec<PathBuf>,
	sources: Sources,
}

/// Resolved configuration of every project in a session.
#[derive(Clone, Debug)]
pub struct ResolvedConfigs {
	configs: Vec<Arc<EffectiveConfig>>,
}

impl ResolvedConfigs {
	pub fn get(&self, name: &QualifiedName) -> Option<&Arc<EffectiveConfig>> {
		self.configs.iter().find(|x| x.project == *name)
	}

	pub fn len(&self) -> usize {
		self.configs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.configs.is_empty()
	}

	pub(crate) fn at(&self, idx: usize) -> &Arc<EffectiveConfig> {
		&self.configs[idx]
	}
}

struct DefineSet<'a> {
	project: &'a QualifiedName,
	defines: Vec<Define>,
	origins: Vec<QualifiedName>,
}

impl<'a> DefineSet<'a> {
	fn new(project: &'a QualifiedName) -> Self {
		DefineSet { project, defines: Vec::new(), origins: Vec::new() }
	}

	fn add(&mut self, def: &Define, origin: &QualifiedName) -> Result<(), ConfigError> {
		match self.defines.iter().position(|x| x.name == def.name) {
			Some(i) if self.defines[i].value == def.value => Ok(()),
			Some(i) => Err(ConfigError::ConflictingDefine {
				project: self.project.clone(),
				define: def.name.clone(),
				first_value: self.defines[i].value.clone(),
				first_origin: self.origins[i].clone(),
				second_value: def.value.clone(),
				second_origin: origin.clone(),
			}),
			None => {
				self.defines.push(def.clone());
				self.origins.push(origin.clone());
				Ok(())
			}
		}
	}

	fn extend<'d, I>(&mut self, defs: I, origin: &QualifiedName) -> Result<(), ConfigError>
	where
		I: IntoIterator<Item = &'d Define>,
	{
		for def in defs {
			self.add(def, origin)?;
		}
		Ok(())
	}
}

fn push_unique<T: PartialEq + Clone>(dst: &mut Vec<T>, src: &[T]) {
	for x in src {
		if !dst.contains(x) {
			dst.push(x.clone());
		}
	}
}

/// Computes [`EffectiveConfig`]s for the projects of one graph. Results are
/// cached for the lifetime of the resolver, which is one session.
pub struct ConfigResolver<'g> {
	graph: &'g DependencyGraph,
	own: HashMap<usize, Arc<OwnConfig>>,
	resolved: HashMap<usize, Arc<EffectiveConfig>>,
	own_resolutions: usize,
}

impl<'g> ConfigResolver<'g> {
	pub fn new(graph: &'g DependencyGraph) -> Self {
		ConfigResolver { graph, own: HashMap::new(), resolved: HashMap::new(), own_resolutions: 0 }
	}

	/// How many projects had their own declarations (patterns, sources)
	/// resolved so far. Each project counts at most once.
	pub fn resolution_count(&self) -> usize {
		self.own_resolutions
	}

	pub fn resolve(&mut self, name: &QualifiedName) -> Result<Arc<EffectiveConfig>, ConfigError> {
		match self.graph.index_of(name) {
			Some(idx) => self.resolve_index(idx),
			None => Err(ConfigError::UnknownProject { name: name.clone() }),
		}
	}

	/// Resolves every project in build order.
	pub fn resolve_all(&mut self) -> Result<ResolvedConfigs, ConfigError> {
		let graph = self.graph;
		let mut configs = vec![None; graph.len()];
		for idx in graph.order_indices() {
			configs[*idx] = Some(self.resolve_index(*idx)?);
		}
		Ok(ResolvedConfigs { configs: configs.into_iter().flatten().collect() })
	}

	fn resolve_index(&mut self, idx: usize) -> Result<Arc<EffectiveConfig>, ConfigError> {
		if let Some(config) = self.resolved.get(&idx) {
			return Ok(config.clone());
		}
		let graph = self.graph;
		let project = graph.project(idx);
		let own = self.own_config(idx)?;
		let deps = graph.transitive_dependencies_of(idx);

		let mut include_dirs = Vec::new();
		push_unique(&mut include_dirs, &own.public_includes);
		push_unique(&mut include_dirs, &own.private_includes);
		let mut defines = DefineSet::new(&project.name);
		let mut link_flags = Vec::new();
		for (dep, _) in &deps {
			let dep_project = graph.project(*dep);
			let dep_own = self.own_config(*dep)?;
			push_unique(&mut include_dirs, &dep_own.public_includes);
			defines.extend(&dep_project.public_defines, &dep_project.name)?;
			push_unique(&mut link_flags, &dep_project.public_link_flags);
		}
		defines.extend(&project.public_defines, &project.name)?;
		defines.extend(&project.defines, &project.name)?;
		push_unique(&mut link_flags, &project.public_link_flags);

		let mut link_order = deps
			.iter()
			.map(|(dep, _)| *dep)
			.filter(|dep| graph.project(*dep).target_type.is_linkable())
			.collect::<Vec<_>>();
		link_order.sort_by_key(|dep| core::cmp::Reverse(graph.position(*dep)));

		let mut config = EffectiveConfig {
			project: project.name.clone(),
			target_type: project.target_type,
			include_dirs,
			defines: Vec::new(),
			sources: own.sources.clone(),
			compile_flags: Vec::new(),
			link_flags,
			link_order: link_order.into_iter().map(|x| graph.project(x).name.clone()).collect(),
			position_independent: linked_into_shared(graph, idx),
		};

		if let Some(configure) = &project.configure {
			config.defines = defines.defines.clone();
			let entries = match configure(&ConfigContext { project, config: &config }) {
				Ok(x) => x,
				Err(message) => return Err(ConfigError::ConfigureFailed { project: project.name.clone(), message }),
			};
			log::debug!("Configure step of \"{}\" added {:?}", project.name, entries);
			defines.extend(&entries.defines, &project.name)?;
			config.compile_flags.extend(entries.compile_flags);
			config.link_flags.extend(entries.link_flags);
		}
		config.defines = defines.defines;

		let config = Arc::new(config);
		self.resolved.insert(idx, config.clone());
		Ok(config)
	}

	fn own_config(&mut self, idx: usize) -> Result<Arc<OwnConfig>, ConfigError> {
		if let Some(own) = self.own.get(&idx) {
			return Ok(own.clone());
		}
		let graph = self.graph;
		let project = graph.project(idx);
		let public_includes = expand_patterns(project, &project.public_includes)?;
		let private_includes = expand_patterns(project, &project.private_includes)?;
		let sources = match Sources::from_slice(&project.sources, &project.location) {
			Ok(x) => x,
			Err(source_file) => {
				return Err(ConfigError::UnsupportedSource { project: project.name.clone(), source_file })
			}
		};
		if public_includes.is_empty() && private_includes.is_empty() && sources.is_empty() {
			return Err(ConfigError::EmptyProject { project: project.name.clone() });
		}
		if !project.target_type.is_compiled() && !sources.is_empty() {
			log::warn!("Sources of {} \"{}\" will not be compiled", project.target_type, project.name);
		}

		self.own_resolutions += 1;
		log::debug!(
			"Resolved \"{}\": {} include dirs, {} sources",
			project.name,
			public_includes.len() + private_includes.len(),
			sources.len()
		);
		let own = Arc::new(OwnConfig { public_includes, private_includes, sources });
		self.own.insert(idx, own.clone());
		Ok(own)
	}
}

// Whether `idx` or any transitive dependent is a dynamic library
fn linked_into_shared(graph: &DependencyGraph, idx: usize) -> bool {
	let mut seen = vec![false; graph.len()];
	let mut stack = vec![idx];
	while let Some(current) = stack.pop() {
		if graph.project(current).target_type.needs_pic() {
			return true;
		}
		for dependent in graph.dependents_of(current) {
			if !seen[*dependent] {
				seen[*dependent] = true;
				stack.push(*dependent);
			}
		}
	}
	false
}

fn expand_patterns(project: &ProjectDescriptor, patterns: &[String]) -> Result<Vec<PathBuf>, ConfigError> {
	let mut dirs = Vec::new();
	for pattern in patterns {
		let expanded = match expand_include_pattern(&project.location, pattern) {
			Ok(x) => x,
			Err(message) => {
				return Err(ConfigError::InvalidPattern {
					project: project.name.clone(),
					pattern: pattern.clone(),
					message,
				})
			}
		};
		if expanded.is_empty() {
			log::warn!("Include pattern \"{}\" of \"{}\" matched nothing", pattern, project.name);
		}
		push_unique(&mut dirs, &expanded);
	}
	Ok(dirs)
}
