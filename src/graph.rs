use core::cmp::Reverse;
use std::{
	collections::{BinaryHeap, VecDeque},
	sync::Arc,
};

use crate::{
	error::ConfigError,
	project::{ProjectDescriptor, QualifiedName},
	registry::ProjectRegistry,
};

/// Project dependency graph of a session. Nodes are identified by their
/// registration index.
#[derive(Debug)]
pub struct DependencyGraph {
	registry: ProjectRegistry,
	dependencies: Vec<Vec<usize>>,
	dependents: Vec<Vec<usize>>,
	order: Vec<usize>,
	position: Vec<usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
	New,
	OnStack,
	Done,
}

impl DependencyGraph {
	/// Validates every dependency reference and the absence of cycles.
	/// The registry is frozen from here on.
	pub fn build(registry: ProjectRegistry) -> Result<Self, ConfigError> {
		let mut dependencies = Vec::with_capacity(registry.len());
		for project in registry.all() {
			let mut deps = Vec::with_capacity(project.depends_upon.len());
			for dep_name in &project.depends_upon {
				let dep = match registry.index_of(dep_name) {
					Some(x) => x,
					None => {
						return Err(ConfigError::UnknownDependency {
							project: project.name.clone(),
							missing: dep_name.clone(),
						})
					}
				};
				if !deps.contains(&dep) {
					deps.push(dep);
				}
			}
			dependencies.push(deps);
		}

		if let Some(cycle) = find_cycle(&dependencies) {
			return Err(ConfigError::CyclicDependency {
				cycle: cycle.into_iter().map(|x| registry.get(x).name.clone()).collect(),
			});
		}

		let mut dependents = vec![Vec::new(); dependencies.len()];
		for (idx, deps) in dependencies.iter().enumerate() {
			for dep in deps {
				dependents[*dep].push(idx);
			}
		}

		let order = topological_sort(&dependencies, &dependents);
		let mut position = vec![0; order.len()];
		for (pos, idx) in order.iter().enumerate() {
			position[*idx] = pos;
		}
		log::debug!(
			"Build order: {}",
			order.iter().map(|x| registry.get(*x).name.to_string()).collect::<Vec<_>>().join(", ")
		);

		Ok(DependencyGraph { registry, dependencies, dependents, order, position })
	}

	pub fn registry(&self) -> &ProjectRegistry {
		&self.registry
	}

	pub fn len(&self) -> usize {
		self.order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}

	/// Every project after all of its dependencies. Independent projects keep
	/// their registration order.
	pub fn topological_order(&self) -> Vec<&Arc<ProjectDescriptor>> {
		self.order.iter().map(|x| self.registry.get(*x)).collect()
	}

	pub fn direct_dependencies(&self, name: &QualifiedName) -> Result<Vec<&QualifiedName>, ConfigError> {
		let idx = self.node(name)?;
		Ok(self.names(&self.dependencies[idx]))
	}

	/// Ordered by distance from `name`, then by build order.
	pub fn transitive_dependencies(&self, name: &QualifiedName) -> Result<Vec<&QualifiedName>, ConfigError> {
		let idx = self.node(name)?;
		let deps = self.transitive_dependencies_of(idx).into_iter().map(|(x, _)| x).collect::<Vec<_>>();
		Ok(self.names(&deps))
	}

	/// Ordered by build order.
	pub fn direct_dependents(&self, name: &QualifiedName) -> Result<Vec<&QualifiedName>, ConfigError> {
		let idx = self.node(name)?;
		let mut dependents = self.dependents[idx].clone();
		dependents.sort_by_key(|x| self.position[*x]);
		Ok(self.names(&dependents))
	}

	/// Every project affected by a change to `name`, in build order.
	pub fn transitive_dependents(&self, name: &QualifiedName) -> Result<Vec<&QualifiedName>, ConfigError> {
		let idx = self.node(name)?;
		let mut seen = vec![false; self.len()];
		let mut queue = VecDeque::from([idx]);
		let mut found = Vec::new();
		while let Some(current) = queue.pop_front() {
			for dependent in &self.dependents[current] {
				if !seen[*dependent] {
					seen[*dependent] = true;
					found.push(*dependent);
					queue.push_back(*dependent);
				}
			}
		}
		found.sort_by_key(|x| self.position[*x]);
		Ok(self.names(&found))
	}

	fn node(&self, name: &QualifiedName) -> Result<usize, ConfigError> {
		match self.registry.index_of(name) {
			Some(x) => Ok(x),
			None => Err(ConfigError::UnknownProject { name: name.clone() }),
		}
	}

	fn names(&self, nodes: &[usize]) -> Vec<&QualifiedName> {
		nodes.iter().map(|x| &self.registry.get(*x).name).collect()
	}

	pub(crate) fn project(&self, idx: usize) -> &Arc<ProjectDescriptor> {
		self.registry.get(idx)
	}

	pub(crate) fn index_of(&self, name: &QualifiedName) -> Option<usize> {
		self.registry.index_of(name)
	}

	pub(crate) fn order_indices(&self) -> &[usize] {
		&self.order
	}

	pub(crate) fn position(&self, idx: usize) -> usize {
		self.position[idx]
	}

	pub(crate) fn dependencies_of(&self, idx: usize) -> &[usize] {
		&self.dependencies[idx]
	}

	pub(crate) fn dependents_of(&self, idx: usize) -> &[usize] {
		&self.dependents[idx]
	}

	/// `(node, distance)` pairs, breadth-first, sorted by distance then by
	/// build order.
	pub(crate) fn transitive_dependencies_of(&self, idx: usize) -> Vec<(usize, usize)> {
		let mut seen = vec![false; self.len()];
		seen[idx] = true;
		let mut queue = VecDeque::from([(idx, 0)]);
		let mut found = Vec::new();
		while let Some((current, distance)) = queue.pop_front() {
			for dep in &self.dependencies[current] {
				if !seen[*dep] {
					seen[*dep] = true;
					found.push((*dep, distance + 1));
					queue.push_back((*dep, distance + 1));
				}
			}
		}
		found.sort_by_key(|(x, distance)| (*distance, self.position[*x]));
		found
	}
}

// Depth-first over projects in registration order, dependencies in declared
// order. The first node seen again while still on the stack closes the cycle.
fn find_cycle(dependencies: &[Vec<usize>]) -> Option<Vec<usize>> {
	let mut state = vec![Visit::New; dependencies.len()];
	let mut stack = Vec::new();
	for start in 0..dependencies.len() {
		if state[start] == Visit::New {
			if let Some(cycle) = dfs_find_cycle(start, dependencies, &mut state, &mut stack) {
				return Some(cycle);
			}
		}
	}
	None
}

fn dfs_find_cycle(
	node: usize,
	dependencies: &[Vec<usize>],
	state: &mut [Visit],
	stack: &mut Vec<usize>,
) -> Option<Vec<usize>> {
	state[node] = Visit::OnStack;
	stack.push(node);
	for dep in &dependencies[node] {
		match state[*dep] {
			Visit::OnStack => {
				if let Some(start) = stack.iter().position(|x| x == dep) {
					let mut cycle = stack[start..].to_vec();
					cycle.push(*dep);
					return Some(cycle);
				}
			}
			Visit::New => {
				if let Some(cycle) = dfs_find_cycle(*dep, dependencies, state, stack) {
					return Some(cycle);
				}
			}
			Visit::Done => {}
		}
	}
	stack.pop();
	state[node] = Visit::Done;
	None
}

// Kahn's algorithm. The min-heap on registration index keeps independent
// projects in declaration order.
fn topological_sort(dependencies: &[Vec<usize>], dependents: &[Vec<usize>]) -> Vec<usize> {
	let mut remaining = dependencies.iter().map(Vec::len).collect::<Vec<_>>();
	let mut ready = remaining
		.iter()
		.enumerate()
		.filter(|(_, count)| **count == 0)
		.map(|(idx, _)| Reverse(idx))
		.collect::<BinaryHeap<_>>();
	let mut order = Vec::with_capacity(dependencies.len());
	while let Some(Reverse(idx)) = ready.pop() {
		order.push(idx);
		for dependent in &dependents[idx] {
			remaining[*dependent] -= 1;
			if remaining[*dependent] == 0 {
				ready.push(Reverse(*dependent));
			}
		}
	}
	order
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::target::TargetType;

	fn name(n: &str) -> QualifiedName {
		QualifiedName::new("pkg", n)
	}

	fn project(n: &str, deps: &[&str]) -> ProjectDescriptor {
		ProjectDescriptor::new("pkg", n, ".", TargetType::StaticLibrary).depends_upon(deps.iter().map(|x| name(x)))
	}

	fn graph(projects: Vec<ProjectDescriptor>) -> Result<DependencyGraph, ConfigError> {
		let mut registry = ProjectRegistry::new();
		for p in projects {
			registry.register(p).unwrap();
		}
		DependencyGraph::build(registry)
	}

	fn order(graph: &DependencyGraph) -> Vec<String> {
		graph.topological_order().iter().map(|x| x.name.name.clone()).collect()
	}

	fn assert_valid_cycle(cycle: &[QualifiedName], projects: &[ProjectDescriptor]) {
		assert!(cycle.len() >= 2);
		assert_eq!(cycle.first(), cycle.last());
		for pair in cycle.windows(2) {
			let from = projects.iter().find(|x| x.name == pair[0]).unwrap();
			assert!(from.depends_upon.contains(&pair[1]), "{} does not depend on {}", pair[0], pair[1]);
		}
	}

	#[test]
	fn empty_graph() {
		let g = graph(Vec::new()).unwrap();
		assert!(g.is_empty());
		assert!(g.topological_order().is_empty());
	}

	#[test]
	fn linear_chain() {
		let g = graph(vec![project("c", &["b"]), project("b", &["a"]), project("a", &[])]).unwrap();
		assert_eq!(order(&g), vec!["a", "b", "c"]);
	}

	#[test]
	fn ties_follow_declaration_order() {
		let g = graph(vec![
			project("z", &[]),
			project("app", &["y", "z"]),
			project("y", &[]),
			project("x", &[]),
		])
		.unwrap();
		assert_eq!(order(&g), vec!["z", "y", "app", "x"]);
	}

	#[test]
	fn dependencies_before_dependents() {
		let projects = vec![
			project("app", &["net", "log"]),
			project("net", &["core", "log"]),
			project("log", &["core"]),
			project("core", &[]),
			project("tool", &["core"]),
			project("other", &[]),
		];
		let g = graph(projects.clone()).unwrap();
		let order = order(&g);
		assert_eq!(order.len(), projects.len());
		for p in &projects {
			let pos = order.iter().position(|x| *x == p.name.name).unwrap();
			for dep in &p.depends_upon {
				let dep_pos = order.iter().position(|x| *x == dep.name).unwrap();
				assert!(dep_pos < pos, "{} must come before {}", dep, p.name);
			}
		}
	}

	#[test]
	fn unknown_dependency() {
		let err = graph(vec![project("a", &["b"]), project("b", &["missing"])]).unwrap_err();
		assert_eq!(err, ConfigError::UnknownDependency { project: name("b"), missing: name("missing") });
	}

	#[test]
	fn two_node_cycle() {
		let projects = vec![project("a", &["b"]), project("b", &["a"])];
		match graph(projects.clone()).unwrap_err() {
			ConfigError::CyclicDependency { cycle } => {
				assert_eq!(cycle, vec![name("a"), name("b"), name("a")]);
				assert_valid_cycle(&cycle, &projects);
			}
			e => panic!("Expected CyclicDependency, got {:?}", e),
		}
	}

	#[test]
	fn self_dependency() {
		let projects = vec![project("a", &[]), project("b", &["b"])];
		match graph(projects.clone()).unwrap_err() {
			ConfigError::CyclicDependency { cycle } => {
				assert_eq!(cycle, vec![name("b"), name("b")]);
				assert_valid_cycle(&cycle, &projects);
			}
			e => panic!("Expected CyclicDependency, got {:?}", e),
		}
	}

	#[test]
	fn cycle_behind_acyclic_prefix() {
		let projects = vec![
			project("app", &["core", "x"]),
			project("core", &[]),
			project("x", &["y"]),
			project("y", &["z"]),
			project("z", &["x"]),
		];
		match graph(projects.clone()).unwrap_err() {
			ConfigError::CyclicDependency { cycle } => {
				assert_eq!(cycle, vec![name("x"), name("y"), name("z"), name("x")]);
				assert_valid_cycle(&cycle, &projects);
			}
			e => panic!("Expected CyclicDependency, got {:?}", e),
		}
	}

	#[test]
	fn dependents_and_dependencies() {
		let g = graph(vec![
			project("a", &[]),
			project("b", &["a"]),
			project("c", &["a"]),
			project("d", &["b"]),
			project("e", &[]),
		])
		.unwrap();
		let names = |v: Vec<&QualifiedName>| v.into_iter().map(|x| x.name.clone()).collect::<Vec<_>>();

		assert_eq!(names(g.direct_dependents(&name("a")).unwrap()), vec!["b", "c"]);
		assert_eq!(names(g.transitive_dependents(&name("a")).unwrap()), vec!["b", "c", "d"]);
		assert!(g.transitive_dependents(&name("e")).unwrap().is_empty());
		assert_eq!(names(g.direct_dependencies(&name("d")).unwrap()), vec!["b"]);
		assert_eq!(names(g.transitive_dependencies(&name("d")).unwrap()), vec!["b", "a"]);
		assert_eq!(
			g.direct_dependents(&name("nope")).unwrap_err(),
			ConfigError::UnknownProject { name: name("nope") }
		);
	}

	#[test]
	fn repeated_dependency_collapses() {
		let g = graph(vec![project("a", &[]), project("b", &["a", "a"])]).unwrap();
		assert_eq!(g.direct_dependencies(&name("b")).unwrap().len(), 1);
	}
}
