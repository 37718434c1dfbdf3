pub(crate) mod compiler;

use std::{
	fs, //
	io,
	path::{Component, Path, PathBuf},
	process,
};

use serde::Deserialize;

use crate::{
	config::EffectiveConfig,
	error::ToolchainError,
	misc::{is_c_source, SourcePath},
	project::{ProjectDescriptor, QualifiedName},
	scheduler::CancelToken,
	target::{TargetPlatform, TargetType},
	GlobalOptions,
};
use compiler::{identify_compiler, identify_linker, Compiler, ExeLinker};

/// An object file produced from one source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectArtifact {
	pub path: PathBuf,
	pub source: PathBuf,
}

/// The final output of a project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildArtifact {
	pub project: QualifiedName,
	pub target_type: TargetType,
	pub path: PathBuf,
}

pub struct CompileRequest<'a> {
	pub project: &'a ProjectDescriptor,
	pub source: &'a SourcePath,
	pub config: &'a EffectiveConfig,
	/// Session cancellation. Observational only: a project that started
	/// running is expected to finish.
	pub cancel: &'a CancelToken,
}

pub struct LinkRequest<'a> {
	pub project: &'a ProjectDescriptor,
	pub target_type: TargetType,
	pub objects: &'a [ObjectArtifact],
	/// Artifacts of linkable dependencies, in link order.
	pub libraries: &'a [BuildArtifact],
	pub config: &'a EffectiveConfig,
	pub cancel: &'a CancelToken,
}

/// Compiles and links on behalf of the scheduler. Called concurrently from
/// every worker thread.
pub trait Toolchain: Send + Sync {
	fn compile(&self, request: &CompileRequest) -> Result<ObjectArtifact, ToolchainError>;
	fn link(&self, request: &LinkRequest) -> Result<BuildArtifact, ToolchainError>;
}

#[derive(Debug, Deserialize)]
pub struct ToolchainFile {
	c_compiler: Option<Vec<String>>,
	cpp_compiler: Option<Vec<String>>,
	static_linker: Option<Vec<String>>,
	exe_linker: Option<Vec<String>>,
	c_compile_flags: Option<Vec<String>>,
	cpp_compile_flags: Option<Vec<String>>,
}

/// A [`Toolchain`] that runs compiler and linker processes.
pub struct CommandToolchain {
	c_compiler: Option<Box<dyn Compiler>>,
	cpp_compiler: Option<Box<dyn Compiler>>,
	static_linker: Option<Vec<String>>,
	exe_linker: Option<Box<dyn ExeLinker>>,
	c_compile_flags: Vec<String>,
	cpp_compile_flags: Vec<String>,
	build_dir: PathBuf,
	options: GlobalOptions,
	platform: TargetPlatform,
}

pub fn read_toolchain(
	toolchain_path: &Path,
	build_dir: &Path,
	options: GlobalOptions,
) -> Result<CommandToolchain, String> {
	let toolchain_toml = match fs::read_to_string(toolchain_path) {
		Ok(x) => x,
		Err(e) => return Err(format!("Error opening toolchain file \"{}\": {}", toolchain_path.display(), e)),
	};

	let toolchain_file = match toml::from_str::<ToolchainFile>(&toolchain_toml) {
		Ok(x) => x,
		Err(e) => return Err(format!("Error reading toolchain file \"{}\": {}", toolchain_path.display(), e)),
	};

	let c_compiler = match toolchain_file.c_compiler {
		Some(x) => match identify_compiler(x) {
			Ok(y) => Some(y),
			Err(e) => return Err(format!("Error identifying C compiler: {}", e)),
		},
		None => None,
	};
	let cpp_compiler = match toolchain_file.cpp_compiler {
		Some(x) => match identify_compiler(x) {
			Ok(y) => Some(y),
			Err(e) => return Err(format!("Error identifying C++ compiler: {}", e)),
		},
		None => None,
	};
	let exe_linker = match toolchain_file.exe_linker {
		Some(x) => match identify_linker(x) {
			Ok(linker) => Some(linker),
			Err(e) => return Err(format!("Error identifying executable linker: {}", e)),
		},
		None => None,
	};

	for (role, compiler) in [("C", &c_compiler), ("C++", &cpp_compiler)] {
		if let Some(compiler) = compiler {
			log::info!("{} compiler: {} {} ({})", role, compiler.id(), compiler.version(), compiler.target());
		}
	}

	// Sanity checks
	if let Some(true) = options.position_independent_code {
		if let Some(ref c_compiler) = c_compiler {
			if c_compiler.position_independent_code_flag().is_none() {
				log::info!("position_independent_code not supported by the specified C compiler");
			}
		}
		if let Some(ref cpp_compiler) = cpp_compiler {
			if cpp_compiler.position_independent_code_flag().is_none() {
				log::info!("position_independent_code not supported by the specified C++ compiler");
			}
		}
	}

	let platform = match c_compiler.as_ref().or(cpp_compiler.as_ref()) {
		Some(x) => TargetPlatform::from_triple(&x.target()),
		None => {
			log::warn!("No compiler in toolchain file \"{}\"; assuming host file names", toolchain_path.display());
			TargetPlatform::from_triple(host_triple())
		}
	};

	Ok(CommandToolchain {
		c_compiler,
		cpp_compiler,
		static_linker: toolchain_file.static_linker,
		exe_linker,
		c_compile_flags: toolchain_file.c_compile_flags.unwrap_or_default(),
		cpp_compile_flags: toolchain_file.cpp_compile_flags.unwrap_or_default(),
		build_dir: build_dir.to_owned(),
		options,
		platform,
	})
}

fn host_triple() -> &'static str {
	match std::env::consts::OS {
		"windows" => "x86_64-pc-windows-msvc",
		"macos" => "aarch64-apple-darwin",
		_ => "x86_64-unknown-linux-gnu",
	}
}

impl CommandToolchain {
	/// `<build-dir>/<package>/<name>`
	pub fn output_dir(&self, name: &QualifiedName) -> PathBuf {
		self.build_dir.join(&name.package).join(&name.name)
	}

	fn object_path(&self, name: &QualifiedName, source: &SourcePath) -> PathBuf {
		// Keep the source's relative layout without escaping the output dir
		let mut path = self.output_dir(name);
		for component in Path::new(&source.name).components() {
			match component {
				Component::Normal(x) => path.push(x),
				Component::ParentDir => path.push("__"),
				Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
			}
		}
		let mut file_name = path.file_name().unwrap_or_default().to_owned();
		file_name.push(&self.platform.obj_ext);
		path.set_file_name(file_name);
		path
	}

	fn compiler_for(&self, source: &SourcePath, name: &QualifiedName) -> Result<(&dyn Compiler, Vec<String>), String> {
		if is_c_source(&source.name) {
			let compiler = match self.c_compiler {
				Some(ref x) => x.as_ref(),
				None => {
					return Err(format!(
						"No C compiler specified in toolchain. A C compiler is required to build C sources in \"{}\".",
						name
					))
				}
			};
			let mut flags = self.c_compile_flags.clone();
			if let Some(c_std) = &self.options.c_standard {
				flags.push(compiler.c_std_flag(c_std)?);
			}
			Ok((compiler, flags))
		} else {
			let compiler = match self.cpp_compiler {
				Some(ref x) => x.as_ref(),
				None => {
					return Err(format!(
						"No C++ compiler specified in toolchain. A C++ compiler is required to build C++ sources in \"{}\".",
						name
					))
				}
			};
			let mut flags = self.cpp_compile_flags.clone();
			if let Some(cpp_std) = &self.options.cpp_standard {
				flags.push(compiler.cpp_std_flag(cpp_std)?);
			}
			Ok((compiler, flags))
		}
	}

	fn exe_linker(&self, name: &QualifiedName) -> Result<&dyn ExeLinker, ToolchainError> {
		match self.exe_linker {
			Some(ref x) => Ok(x.as_ref()),
			None => Err(ToolchainError::new(format!(
				"No exe_linker specified in toolchain. A linker is required to link \"{}\".",
				name
			))),
		}
	}
}

impl Toolchain for CommandToolchain {
	fn compile(&self, request: &CompileRequest) -> Result<ObjectArtifact, ToolchainError> {
		let name = &request.project.name;
		let (compiler, lang_flags) = match self.compiler_for(request.source, name) {
			Ok(x) => x,
			Err(e) => return Err(ToolchainError::new(e)),
		};
		let out = self.object_path(name, request.source);
		create_parent(&out)?;

		let mut command = compiler.cmd();
		command.extend(request.config.defines.iter().map(|x| compiler.define_flag(x)));
		command.extend(request.config.include_dirs.iter().map(|x| compiler.include_flag(x)));
		command.extend(lang_flags);
		if request.config.position_independent || self.options.position_independent_code == Some(true) {
			if let Some(fpic_flag) = compiler.position_independent_code_flag() {
				command.push(fpic_flag);
			}
		}
		command.extend(request.config.compile_flags.iter().cloned());
		command.extend([compiler.out_flag(), out.to_string_lossy().into_owned()]);
		command.extend(["-c".to_owned(), request.source.full.to_string_lossy().into_owned()]);

		run_command(&command)?;
		Ok(ObjectArtifact { path: out, source: request.source.full.clone() })
	}

	fn link(&self, request: &LinkRequest) -> Result<BuildArtifact, ToolchainError> {
		let name = &request.project.name;
		let file_name = match request.target_type.artifact_file_name(&name.name, &self.platform) {
			Some(x) => x,
			None => return Err(ToolchainError::new(format!("Nothing to link for {} \"{}\"", request.target_type, name))),
		};
		let out = self.output_dir(name).join(file_name);
		create_parent(&out)?;
		let objects = request.objects.iter().map(|x| x.path.to_string_lossy().into_owned());
		let libraries = request.libraries.iter().map(|x| x.path.to_string_lossy().into_owned());

		let command = match request.target_type {
			TargetType::StaticLibrary => {
				let static_linker = match &self.static_linker {
					Some(x) => x,
					None => {
						return Err(ToolchainError::new(format!(
							"No static_linker specified in toolchain. A static linker is required to build \"{}\".",
							name
						)))
					}
				};
				// Archivers add to an existing archive instead of replacing it
				match fs::remove_file(&out) {
					Ok(()) => {}
					Err(e) if e.kind() == io::ErrorKind::NotFound => {}
					Err(e) => {
						return Err(ToolchainError::new(format!("Error removing \"{}\": {}", out.display(), e)))
					}
				}
				let mut command = static_linker.clone();
				command.push(out.to_string_lossy().into_owned());
				command.extend(objects);
				command
			}
			TargetType::DynamicLibrary => {
				let exe_linker = self.exe_linker(name)?;
				let mut command = exe_linker.cmd();
				command.push(exe_linker.shared_flag());
				command.extend(objects);
				command.extend(["-o".to_owned(), out.to_string_lossy().into_owned()]);
				command.extend(libraries);
				command.extend(request.config.link_flags.iter().cloned());
				command
			}
			TargetType::Executable => {
				let exe_linker = self.exe_linker(name)?;
				let mut command = exe_linker.cmd();
				if let Some(true) = self.options.position_independent_code {
					if let Some(pie_flag) = exe_linker.position_independent_executable_flag() {
						command.push(pie_flag);
					}
				}
				command.extend(objects);
				command.extend(["-o".to_owned(), out.to_string_lossy().into_owned()]);
				command.extend(libraries);
				command.extend(request.config.link_flags.iter().cloned());
				command
			}
			TargetType::HeaderOnly => {
				return Err(ToolchainError::new(format!("Nothing to link for {} \"{}\"", request.target_type, name)))
			}
		};

		run_command(&command)?;
		Ok(BuildArtifact { project: name.clone(), target_type: request.target_type, path: out })
	}
}

fn create_parent(path: &Path) -> Result<(), ToolchainError> {
	match path.parent() {
		Some(dir) => match fs::create_dir_all(dir) {
			Ok(()) => Ok(()),
			Err(e) => Err(ToolchainError::new(format!("Error creating directory \"{}\": {}", dir.display(), e))),
		},
		None => Ok(()),
	}
}

// Diagnostics are the process's stdout followed by its stderr
fn run_command(command: &[String]) -> Result<(), ToolchainError> {
	let (exe, args) = match command.split_first() {
		Some(x) => x,
		None => return Err(ToolchainError::new("Empty command")),
	};
	log::debug!("{}", command.join(" "));
	let output = match process::Command::new(exe).args(args).output() {
		Ok(x) => x,
		Err(e) => return Err(ToolchainError::new(format!("Error executing \"{}\": {}", exe, e))),
	};
	if output.status.success() {
		return Ok(());
	}
	let mut diagnostic = format!("{}\n", command.join(" "));
	diagnostic += &String::from_utf8_lossy(&output.stdout);
	diagnostic += &String::from_utf8_lossy(&output.stderr);
	diagnostic += &format!("{} exited with {}", exe, output.status);
	Err(ToolchainError::new(diagnostic))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn write_toolchain(dir: &Path, contents: &str) -> PathBuf {
		let path = dir.join("toolchain.toml");
		fs::write(&path, contents).unwrap();
		path
	}

	#[test]
	fn read_toolchain_without_compilers() {
		let tmp = tempfile::tempdir().unwrap();
		let path = write_toolchain(tmp.path(), "static_linker = [\"ar\", \"rcs\"]\ncpp_compile_flags = [\"-Wall\"]\n");
		let toolchain = read_toolchain(&path, &tmp.path().join("build"), GlobalOptions::default()).unwrap();
		assert_eq!(toolchain.static_linker, Some(vec!["ar".to_owned(), "rcs".to_owned()]));
		assert_eq!(toolchain.cpp_compile_flags, vec!["-Wall".to_owned()]);
		assert!(toolchain.c_compiler.is_none());
		assert!(toolchain.exe_linker.is_none());
	}

	#[test]
	fn read_toolchain_errors() {
		let tmp = tempfile::tempdir().unwrap();
		let err = read_toolchain(&tmp.path().join("missing.toml"), tmp.path(), GlobalOptions::default())
			.err()
			.unwrap();
		assert!(err.starts_with("Error opening toolchain file"), "{}", err);

		let path = write_toolchain(tmp.path(), "c_compiler = \"gcc\"\n");
		let err = read_toolchain(&path, tmp.path(), GlobalOptions::default()).err().unwrap();
		assert!(err.starts_with("Error reading toolchain file"), "{}", err);
	}

	#[test]
	fn object_paths_stay_in_output_dir() {
		let tmp = tempfile::tempdir().unwrap();
		let path = write_toolchain(tmp.path(), "");
		let build = tmp.path().join("build");
		let toolchain = read_toolchain(&path, &build, GlobalOptions::default()).unwrap();
		let name = QualifiedName::new("artd", "logger");
		let src = |x: &str| SourcePath { full: PathBuf::from(x), name: x.to_owned() };

		let obj_ext = toolchain.platform.obj_ext.clone();
		assert_eq!(
			toolchain.object_path(&name, &src("src/Logger.cpp")),
			build.join("artd").join("logger").join("src").join(format!("Logger.cpp{}", obj_ext))
		);
		assert_eq!(
			toolchain.object_path(&name, &src("../shared/util.c")),
			build.join("artd").join("logger").join("__").join("shared").join(format!("util.c{}", obj_ext))
		);
	}

	#[test]
	fn missing_compiler_is_a_node_failure() {
		let tmp = tempfile::tempdir().unwrap();
		let path = write_toolchain(tmp.path(), "");
		let toolchain = read_toolchain(&path, tmp.path(), GlobalOptions::default()).unwrap();
		let src = SourcePath { full: tmp.path().join("main.c"), name: "main.c".to_owned() };
		let err = toolchain.compiler_for(&src, &QualifiedName::new("pkg", "app")).err().unwrap();
		assert!(err.starts_with("No C compiler specified"), "{}", err);
	}

	#[cfg(unix)]
	#[test]
	fn failed_command_diagnostic() {
		let err = run_command(&["sh".to_owned(), "-c".to_owned(), "echo oops >&2; exit 3".to_owned()]).unwrap_err();
		assert!(err.diagnostic.starts_with("sh -c echo oops >&2; exit 3\n"), "{}", err.diagnostic);
		assert!(err.diagnostic.contains("oops\n"), "{}", err.diagnostic);
		assert!(err.diagnostic.contains("sh exited with"), "{}", err.diagnostic);
	}
}
