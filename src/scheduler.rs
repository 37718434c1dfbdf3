use core::fmt;
use std::{
	collections::VecDeque, //
	panic::{self, AssertUnwindSafe},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Condvar, Mutex,
	},
	thread,
	time::Duration,
};

use crate::{
	config::{EffectiveConfig, ResolvedConfigs},
	error::ToolchainError,
	graph::DependencyGraph,
	project::{ProjectDescriptor, QualifiedName},
	toolchain::{BuildArtifact, CompileRequest, LinkRequest, Toolchain},
};

// Idle workers re-check the cancel token at this interval
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Shared flag that stops a session from dispatching further work.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
	cancelled: Arc<AtomicBool>,
}

impl CancelToken {
	pub fn new() -> Self {
		CancelToken::default()
	}

	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
	Pending,
	Ready,
	Running,
	Succeeded,
	Failed,
	Skipped,
}

impl NodeStatus {
	pub fn is_terminal(&self) -> bool {
		matches!(self, NodeStatus::Succeeded | NodeStatus::Failed | NodeStatus::Skipped)
	}
}

impl fmt::Display for NodeStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			NodeStatus::Pending => "pending",
			NodeStatus::Ready => "ready",
			NodeStatus::Running => "running",
			NodeStatus::Succeeded => "succeeded",
			NodeStatus::Failed => "FAILED",
			NodeStatus::Skipped => "skipped",
		};
		f.write_str(s)
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
	/// Names the project whose failure caused the skip.
	DependencyFailed(QualifiedName),
	Cancelled,
}

impl fmt::Display for SkipReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SkipReason::DependencyFailed(name) => write!(f, "dependency \"{}\" failed", name),
			SkipReason::Cancelled => f.write_str("cancelled"),
		}
	}
}

#[derive(Clone, Debug)]
pub struct ProjectReport {
	pub name: QualifiedName,
	pub status: NodeStatus,
	pub diagnostic: Option<String>,
	pub skip_reason: Option<SkipReason>,
	pub artifact: Option<BuildArtifact>,
}

/// Outcome of every project in a session, in build order.
#[derive(Clone, Debug)]
pub struct SessionReport {
	pub projects: Vec<ProjectReport>,
	pub cancelled: bool,
}

impl SessionReport {
	pub fn is_success(&self) -> bool {
		!self.cancelled && self.projects.iter().all(|x| x.status == NodeStatus::Succeeded)
	}

	pub fn failures(&self) -> Vec<&ProjectReport> {
		self.projects.iter().filter(|x| x.status == NodeStatus::Failed).collect()
	}

	pub fn skipped(&self) -> Vec<&ProjectReport> {
		self.projects.iter().filter(|x| x.status == NodeStatus::Skipped).collect()
	}

	pub fn get(&self, name: &QualifiedName) -> Option<&ProjectReport> {
		self.projects.iter().find(|x| x.name == *name)
	}
}

impl fmt::Display for SessionReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for project in &self.projects {
			write!(f, "{:>10} {}", project.status.to_string(), project.name)?;
			if let Some(reason) = &project.skip_reason {
				write!(f, " ({})", reason)?;
			}
			if let Some(artifact) = &project.artifact {
				write!(f, " -> {}", artifact.path.display())?;
			}
			writeln!(f)?;
		}
		for failure in self.failures() {
			writeln!(f, "\nError building \"{}\":", failure.name)?;
			if let Some(diagnostic) = &failure.diagnostic {
				writeln!(f, "{}", diagnostic.trim_end())?;
			}
		}
		let count = |status: NodeStatus| self.projects.iter().filter(|x| x.status == status).count();
		write!(
			f,
			"\n{} succeeded, {} failed, {} skipped",
			count(NodeStatus::Succeeded),
			count(NodeStatus::Failed),
			count(NodeStatus::Skipped)
		)?;
		if self.cancelled {
			write!(f, " (cancelled)")?;
		}
		Ok(())
	}
}

struct State {
	status: Vec<NodeStatus>,
	remaining_deps: Vec<usize>,
	ready: VecDeque<usize>,
	unfinished: usize,
	diagnostics: Vec<Option<String>>,
	skip_reasons: Vec<Option<SkipReason>>,
	artifacts: Vec<Option<BuildArtifact>>,
	/// Whether cancellation skipped any project.
	cancelled: bool,
}

impl State {
	fn finish(&mut self, idx: usize, status: NodeStatus) {
		debug_assert!(!self.status[idx].is_terminal());
		self.status[idx] = status;
		self.unfinished -= 1;
	}

	fn skip(&mut self, idx: usize, reason: SkipReason) {
		self.finish(idx, NodeStatus::Skipped);
		self.skip_reasons[idx] = Some(reason);
	}

	fn cancel_waiting(&mut self) {
		self.ready.clear();
		let mut skipped = 0;
		for idx in 0..self.status.len() {
			if matches!(self.status[idx], NodeStatus::Pending | NodeStatus::Ready) {
				self.skip(idx, SkipReason::Cancelled);
				skipped += 1;
			}
		}
		if skipped > 0 {
			log::info!("Build cancelled, skipping {} projects", skipped);
			self.cancelled = true;
		}
	}
}

struct Shared {
	state: Mutex<State>,
	wake: Condvar,
}

/// Dispatches the projects of a graph to a [`Toolchain`] on a fixed pool of
/// worker threads. A project starts only once every dependency succeeded.
pub struct BuildScheduler<'t> {
	toolchain: &'t dyn Toolchain,
	max_parallelism: usize,
	cancel: CancelToken,
}

impl<'t> BuildScheduler<'t> {
	pub fn new(toolchain: &'t dyn Toolchain) -> Self {
		let max_parallelism = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
		BuildScheduler { toolchain, max_parallelism, cancel: CancelToken::new() }
	}

	pub fn max_parallelism(mut self, max_parallelism: usize) -> Self {
		self.max_parallelism = max_parallelism.max(1);
		self
	}

	pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
		self.cancel = cancel;
		self
	}

	pub fn run(&self, graph: &DependencyGraph, configs: &ResolvedConfigs) -> SessionReport {
		let count = graph.len();
		let mut state = State {
			status: vec![NodeStatus::Pending; count],
			remaining_deps: (0..count).map(|x| graph.dependencies_of(x).len()).collect(),
			ready: VecDeque::new(),
			unfinished: count,
			diagnostics: vec![None; count],
			skip_reasons: vec![None; count],
			artifacts: vec![None; count],
			cancelled: false,
		};
		for idx in graph.order_indices() {
			if state.remaining_deps[*idx] == 0 {
				state.status[*idx] = NodeStatus::Ready;
				state.ready.push_back(*idx);
			}
		}
		let shared = Shared { state: Mutex::new(state), wake: Condvar::new() };

		let workers = self.max_parallelism.min(count).max(1);
		log::info!("Building {} projects with {} workers", count, workers);
		thread::scope(|scope| {
			for worker in 0..workers {
				let shared = &shared;
				scope.spawn(move || self.worker(worker, graph, configs, shared));
			}
		});

		let mut state = match shared.state.into_inner() {
			Ok(x) => x,
			Err(poisoned) => poisoned.into_inner(),
		};
		let cancelled = state.cancelled;
		let projects = graph
			.order_indices()
			.iter()
			.map(|idx| ProjectReport {
				name: graph.project(*idx).name.clone(),
				status: state.status[*idx],
				diagnostic: state.diagnostics[*idx].take(),
				skip_reason: state.skip_reasons[*idx].take(),
				artifact: state.artifacts[*idx].take(),
			})
			.collect();
		SessionReport { projects, cancelled }
	}

	fn worker(&self, worker: usize, graph: &DependencyGraph, configs: &ResolvedConfigs, shared: &Shared) {
		loop {
			let (idx, libraries) = {
				let mut state = match shared.state.lock() {
					Ok(x) => x,
					Err(_) => return, // Another worker panicked
				};
				let idx = loop {
					if self.cancel.is_cancelled() {
						state.cancel_waiting();
					}
					if state.unfinished == 0 {
						shared.wake.notify_all();
						return;
					}
					if let Some(idx) = state.ready.pop_front() {
						break idx;
					}
					state = match shared.wake.wait_timeout(state, CANCEL_POLL) {
						Ok((x, _)) => x,
						Err(_) => return,
					};
				};
				for dep in graph.dependencies_of(idx) {
					assert_eq!(
						state.status[*dep],
						NodeStatus::Succeeded,
						"\"{}\" dispatched before its dependency \"{}\" succeeded",
						graph.project(idx).name,
						graph.project(*dep).name
					);
				}
				state.status[idx] = NodeStatus::Running;
				log::debug!("[worker {}] running \"{}\"", worker, graph.project(idx).name);
				(idx, link_libraries(graph, configs.at(idx), &state))
			};

			let project = graph.project(idx);
			let result = panic::catch_unwind(AssertUnwindSafe(|| {
				self.build_project(project, configs.at(idx), &libraries)
			}));
			let result = match result {
				Ok(x) => x,
				Err(_) => Err(ToolchainError::new(format!("Toolchain panicked while building \"{}\"", project.name))),
			};

			let mut state = match shared.state.lock() {
				Ok(x) => x,
				Err(_) => return,
			};
			match result {
				Ok(artifact) => {
					log::debug!("[worker {}] \"{}\" succeeded", worker, project.name);
					state.artifacts[idx] = artifact;
					state.finish(idx, NodeStatus::Succeeded);
					for dependent in graph.dependents_of(idx) {
						state.remaining_deps[*dependent] -= 1;
						if state.remaining_deps[*dependent] == 0 && state.status[*dependent] == NodeStatus::Pending {
							state.status[*dependent] = NodeStatus::Ready;
							state.ready.push_back(*dependent);
						}
					}
				}
				Err(e) => {
					log::debug!("[worker {}] \"{}\" failed", worker, project.name);
					state.diagnostics[idx] = Some(e.diagnostic);
					state.finish(idx, NodeStatus::Failed);
					skip_dependents(graph, idx, &mut state);
				}
			}
			shared.wake.notify_all();
		}
	}

	/// Runs the toolchain steps of one project. Header-only libraries have none.
	fn build_project(
		&self,
		project: &ProjectDescriptor,
		config: &EffectiveConfig,
		libraries: &[BuildArtifact],
	) -> Result<Option<BuildArtifact>, ToolchainError> {
		if !config.target_type.is_compiled() {
			return Ok(None);
		}
		let mut objects = Vec::with_capacity(config.sources.len());
		for source in config.sources.iter() {
			let request = CompileRequest { project, source, config, cancel: &self.cancel };
			objects.push(self.toolchain.compile(&request)?);
		}
		let request = LinkRequest {
			project,
			target_type: config.target_type,
			objects: &objects,
			libraries,
			config,
			cancel: &self.cancel,
		};
		self.toolchain.link(&request).map(Some)
	}
}

// Artifacts of the linkable dependencies, in link order
fn link_libraries(graph: &DependencyGraph, config: &EffectiveConfig, state: &State) -> Vec<BuildArtifact> {
	config
		.link_order
		.iter()
		.filter_map(|name| graph.index_of(name))
		.filter_map(|idx| state.artifacts[idx].clone())
		.collect()
}

// Every transitive dependent is still Pending since `failed` never succeeded
fn skip_dependents(graph: &DependencyGraph, failed: usize, state: &mut State) {
	let failed_name = &graph.project(failed).name;
	let mut queue = VecDeque::from([failed]);
	while let Some(current) = queue.pop_front() {
		for dependent in graph.dependents_of(current) {
			if state.status[*dependent] == NodeStatus::Pending {
				log::debug!("Skipping \"{}\": \"{}\" failed", graph.project(*dependent).name, failed_name);
				state.skip(*dependent, SkipReason::DependencyFailed(failed_name.clone()));
				queue.push_back(*dependent);
			}
		}
	}
}
