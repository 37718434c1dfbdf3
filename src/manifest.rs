use std::{
	collections::{BTreeMap, HashMap}, //
	fs,
	path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
	config::ConfigEntries,
	project::{Define, ProjectDescriptor, QualifiedName},
	target::TargetType,
	GlobalOptions,
};

pub const BALLISTA_TOML: &str = "ballista.toml";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
	package: PackageManifest,
	options: Option<GlobalOptions>,
	dependencies: Option<BTreeMap<String, DependencyManifest>>,
	project: Option<Vec<ProjectManifest>>,
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
	name: String,
	version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DependencyManifest {
	path: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectManifest {
	name: String,
	path: Option<String>,
	target_type: TargetType,
	#[serde(default)]
	depends_upon: Vec<String>,
	#[serde(default)]
	defines: Vec<String>,
	#[serde(default)]
	public_defines: Vec<String>,
	#[serde(default)]
	public_includes: Vec<String>,
	#[serde(default)]
	private_includes: Vec<String>,
	#[serde(default)]
	public_link_flags: Vec<String>,
	#[serde(default)]
	sources: Vec<String>,
	configure: Option<ConfigureManifest>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigureManifest {
	#[serde(default)]
	defines: Vec<String>,
	#[serde(default)]
	compile_flags: Vec<String>,
	#[serde(default)]
	link_flags: Vec<String>,
}

/// Projects of a root manifest and of every package it depends upon by path,
/// dependencies first.
#[derive(Debug)]
pub struct LoadedManifest {
	pub package: String,
	pub options: GlobalOptions,
	pub projects: Vec<ProjectDescriptor>,
}

fn err_msg<T>(msg: String) -> Result<T, anyhow::Error> {
	Err(anyhow::Error::msg(msg))
}

/// `path` is either a manifest file or a directory containing `ballista.toml`.
pub fn load_manifest(path: &Path) -> Result<LoadedManifest, anyhow::Error> {
	let mut loaded = HashMap::new();
	let mut projects = Vec::new();
	let (package, options) = load_package(path, &mut loaded, &mut projects)?;
	log::info!("Loaded {} projects from {} packages", projects.len(), loaded.len());
	Ok(LoadedManifest { package, options: options.unwrap_or_default(), projects })
}

fn manifest_file(path: &Path) -> PathBuf {
	if path.is_dir() {
		path.join(BALLISTA_TOML)
	} else {
		path.to_owned()
	}
}

// `loaded` maps each manifest directory already read to its package name
fn load_package(
	path: &Path,
	loaded: &mut HashMap<PathBuf, String>,
	projects: &mut Vec<ProjectDescriptor>,
) -> Result<(String, Option<GlobalOptions>), anyhow::Error> {
	let manifest_path = manifest_file(path);
	let manifest_path = match manifest_path.canonicalize() {
		Ok(x) => x,
		Err(e) => return err_msg(format!("Error opening {}: {}", manifest_path.display(), e)),
	};
	let manifest_dir = match manifest_path.parent() {
		Some(x) => x.to_owned(),
		None => return err_msg(format!("Manifest has no parent directory: {}", manifest_path.display())),
	};

	let manifest_toml = match fs::read_to_string(&manifest_path) {
		Ok(x) => x,
		Err(e) => return err_msg(format!("Error opening {}: {}", manifest_path.display(), e)),
	};
	let manifest = match toml::from_str::<Manifest>(&manifest_toml) {
		Ok(x) => x,
		Err(e) => return err_msg(format!("Error reading {}: {}", manifest_path.display(), e)),
	};
	let package = manifest.package.name;
	if package.is_empty() || package.contains('/') {
		return err_msg(format!("Invalid package name \"{}\" in {}", package, manifest_path.display()));
	}
	log::debug!(
		"Package \"{}\" {} at {}",
		package,
		manifest.package.version.as_deref().unwrap_or("(no version)"),
		manifest_dir.display()
	);
	loaded.insert(manifest_dir.clone(), package.clone());

	// Load dependencies before the dependent
	for (name, info) in manifest.dependencies.unwrap_or_default() {
		let dep_path = manifest_dir.join(&info.path);
		let dep_dir = match manifest_file(&dep_path).canonicalize() {
			Ok(x) => x.parent().map(Path::to_path_buf).unwrap_or(x),
			Err(e) => {
				return err_msg(format!(
					"Error opening dependency \"{}\" of \"{}\" at {}: {}",
					name,
					package,
					dep_path.display(),
					e
				))
			}
		};
		let dep_package = match loaded.get(&dep_dir) {
			Some(x) => x.clone(),
			None => load_package(&dep_path, loaded, projects)?.0,
		};
		if dep_package != name {
			return err_msg(format!(
				"Dependency \"{}\" of \"{}\" at {} is package \"{}\"",
				name,
				package,
				dep_dir.display(),
				dep_package
			));
		}
	}

	for project in manifest.project.unwrap_or_default() {
		projects.push(into_descriptor(&package, &manifest_dir, project)?);
	}

	Ok((package, manifest.options))
}

fn into_descriptor(package: &str, manifest_dir: &Path, project: ProjectManifest) -> Result<ProjectDescriptor, anyhow::Error> {
	if project.name.is_empty() || project.name.contains('/') {
		return err_msg(format!("Invalid project name \"{}\" in package \"{}\"", project.name, package));
	}
	let location = match &project.path {
		Some(x) => manifest_dir.join(x),
		None => manifest_dir.to_owned(),
	};

	let mut depends_upon = Vec::with_capacity(project.depends_upon.len());
	for dep in &project.depends_upon {
		if dep.contains('/') {
			match dep.parse::<QualifiedName>() {
				Ok(x) => depends_upon.push(x),
				Err(e) => return err_msg(format!("In \"{}/{}\": {}", package, project.name, e)),
			}
		} else {
			depends_upon.push(QualifiedName::new(package, dep.as_str()));
		}
	}

	let mut descriptor = ProjectDescriptor::new(package, &project.name, location, project.target_type)
		.depends_upon(depends_upon)
		.public_includes(project.public_includes)
		.private_includes(project.private_includes)
		.public_link_flags(project.public_link_flags)
		.sources(project.sources);
	descriptor.defines = parse_defines(package, &project.name, &project.defines)?;
	descriptor.public_defines = parse_defines(package, &project.name, &project.public_defines)?;

	if let Some(configure) = project.configure {
		let entries = ConfigEntries {
			defines: parse_defines(package, &project.name, &configure.defines)?,
			compile_flags: configure.compile_flags,
			link_flags: configure.link_flags,
		};
		descriptor = descriptor.configure(move |_| Ok(entries.clone()));
	}
	Ok(descriptor)
}

fn parse_defines(package: &str, project: &str, defines: &[String]) -> Result<Vec<Define>, anyhow::Error> {
	let mut parsed = Vec::with_capacity(defines.len());
	for def in defines {
		let define = Define::parse(def);
		if define.name.is_empty() {
			return err_msg(format!("Define \"{}\" in \"{}/{}\" has no name", def, package, project));
		}
		parsed.push(define);
	}
	Ok(parsed)
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn write(path: &Path, contents: &str) {
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		fs::write(path, contents).unwrap();
	}

	#[test]
	fn project_tables() {
		let tmp = tempfile::tempdir().unwrap();
		let root = tmp.path();
		write(
			&root.join(BALLISTA_TOML),
			r#"
[package]
name = "artd"

[options]
cpp_standard = "17"

[[project]]
name = "artd-lib-logger"
target_type = "DLL"
defines = ["BUILDING_artd_lib_logger"]
public_includes = ["include/artd/*.h"]
sources = ["Logger.cpp"]

[project.configure]
defines = ["ARTD_SHARED"]

[[project]]
name = "demo"
path = "demo"
target_type = "Executable"
depends_upon = ["artd-lib-logger", "other/util"]
"#,
		);

		let loaded = load_manifest(root).unwrap();
		assert_eq!(loaded.package, "artd");
		assert_eq!(loaded.options.cpp_standard.as_deref(), Some("17"));
		assert_eq!(loaded.projects.len(), 2);

		let logger = &loaded.projects[0];
		assert_eq!(logger.name, QualifiedName::new("artd", "artd-lib-logger"));
		assert_eq!(logger.target_type, TargetType::DynamicLibrary);
		assert_eq!(logger.defines, vec![Define::parse("BUILDING_artd_lib_logger")]);
		assert_eq!(logger.public_includes, vec!["include/artd/*.h".to_owned()]);
		assert!(logger.configure.is_some());

		let demo = &loaded.projects[1];
		assert_eq!(demo.location, root.canonicalize().unwrap().join("demo"));
		assert_eq!(
			demo.depends_upon,
			vec![QualifiedName::new("artd", "artd-lib-logger"), QualifiedName::new("other", "util")]
		);
		assert!(demo.configure.is_none());
	}

	#[test]
	fn path_dependencies_load_first() {
		let tmp = tempfile::tempdir().unwrap();
		let root = tmp.path();
		write(
			&root.join("core/ballista.toml"),
			"[package]\nname = \"core\"\n\n[[project]]\nname = \"base\"\ntarget_type = \"lib\"\nsources = [\"base.c\"]\n",
		);
		write(
			&root.join("net/ballista.toml"),
			"[package]\nname = \"net\"\n[dependencies]\ncore = { path = \"../core\" }\n\n[[project]]\nname = \"sock\"\ntarget_type = \"lib\"\ndepends_upon = [\"core/base\"]\nsources = [\"sock.c\"]\n",
		);
		write(
			&root.join("app/ballista.toml"),
			"[package]\nname = \"app\"\n[dependencies]\nnet = { path = \"../net\" }\ncore = { path = \"../core\" }\n\n[[project]]\nname = \"main\"\ntarget_type = \"exe\"\ndepends_upon = [\"net/sock\", \"core/base\"]\nsources = [\"main.c\"]\n",
		);

		let loaded = load_manifest(&root.join("app/ballista.toml")).unwrap();
		let names = loaded.projects.iter().map(|x| x.name.to_string()).collect::<Vec<_>>();
		// `core` is reached twice but loaded once
		assert_eq!(names, vec!["core/base", "net/sock", "app/main"]);
	}

	#[test]
	fn dependency_name_must_match_package() {
		let tmp = tempfile::tempdir().unwrap();
		let root = tmp.path();
		write(&root.join("core/ballista.toml"), "[package]\nname = \"core\"\n");
		write(&root.join("ballista.toml"), "[package]\nname = \"app\"\n[dependencies]\nbase = { path = \"core\" }\n");
		let err = load_manifest(root).unwrap_err().to_string();
		assert!(err.contains("is package \"core\""), "{}", err);
	}

	#[test]
	fn manifest_errors() {
		let tmp = tempfile::tempdir().unwrap();
		let root = tmp.path();
		let err = load_manifest(root).unwrap_err().to_string();
		assert!(err.starts_with("Error opening"), "{}", err);

		write(&root.join(BALLISTA_TOML), "[package]\nname = \"p\"\n[[project]]\nname = \"x\"\ntarget_type = \"Plugin\"\n");
		let err = load_manifest(root).unwrap_err().to_string();
		assert!(err.starts_with("Error reading"), "{}", err);

		write(&root.join(BALLISTA_TOML), "[package]\nname = \"p\"\n[[project]]\nname = \"a/b\"\ntarget_type = \"exe\"\n");
		let err = load_manifest(root).unwrap_err().to_string();
		assert!(err.starts_with("Invalid project name"), "{}", err);

		write(
			&root.join(BALLISTA_TOML),
			"[package]\nname = \"p\"\n[[project]]\nname = \"x\"\ntarget_type = \"exe\"\ndepends_upon = [\"/y\"]\n",
		);
		let err = load_manifest(root).unwrap_err().to_string();
		assert!(err.starts_with("In \"p/x\""), "{}", err);

		write(
			&root.join(BALLISTA_TOML),
			"[package]\nname = \"p\"\n[[project]]\nname = \"x\"\ntarget_type = \"exe\"\npublic_defines = [\" = 1\"]\n",
		);
		let err = load_manifest(root).unwrap_err().to_string();
		assert_eq!(err, "Define \" = 1\" in \"p/x\" has no name");
	}
}
