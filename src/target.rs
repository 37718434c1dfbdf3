use core::fmt;

use serde::Deserialize;

/// The kind of output a project produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
pub enum TargetType {
	#[serde(alias = "static", alias = "lib")]
	StaticLibrary,
	#[serde(alias = "shared", alias = "dll", alias = "DLL")]
	DynamicLibrary,
	#[serde(alias = "exe")]
	Executable,
	#[serde(alias = "header", alias = "interface")]
	HeaderOnly,
}

impl TargetType {
	/// Whether sources are compiled and a link step runs.
	pub fn is_compiled(&self) -> bool {
		!matches!(self, TargetType::HeaderOnly)
	}

	/// Whether dependents link against this project's artifact.
	pub fn is_linkable(&self) -> bool {
		matches!(self, TargetType::StaticLibrary | TargetType::DynamicLibrary)
	}

	/// Whether objects must be position independent.
	pub fn needs_pic(&self) -> bool {
		matches!(self, TargetType::DynamicLibrary)
	}

	pub fn artifact_file_name(&self, output_name: &str, platform: &TargetPlatform) -> Option<String> {
		match self {
			TargetType::StaticLibrary => {
				Some(format!("{}{}{}", platform.lib_prefix, output_name, platform.static_lib_ext))
			}
			TargetType::DynamicLibrary => {
				Some(format!("{}{}{}", platform.lib_prefix, output_name, platform.shared_lib_ext))
			}
			TargetType::Executable => Some(format!("{}{}", output_name, platform.exe_ext)),
			TargetType::HeaderOnly => None,
		}
	}
}

impl fmt::Display for TargetType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			TargetType::StaticLibrary => "static library",
			TargetType::DynamicLibrary => "dynamic library",
			TargetType::Executable => "executable",
			TargetType::HeaderOnly => "header-only library",
		};
		f.write_str(s)
	}
}

/// File naming conventions of the platform being built for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetPlatform {
	pub obj_ext: String,
	pub lib_prefix: String,
	pub static_lib_ext: String,
	pub shared_lib_ext: String,
	pub exe_ext: String,
}

impl TargetPlatform {
	pub fn from_triple(target_triple: &str) -> TargetPlatform {
		if target_triple.contains("-windows-") || target_triple.ends_with("-windows") {
			TargetPlatform {
				obj_ext: ".obj".to_owned(),
				lib_prefix: String::new(),
				static_lib_ext: ".lib".to_owned(),
				shared_lib_ext: ".dll".to_owned(),
				exe_ext: ".exe".to_owned(),
			}
		} else if target_triple.contains("-apple-") {
			TargetPlatform {
				obj_ext: ".o".to_owned(),
				lib_prefix: "lib".to_owned(),
				static_lib_ext: ".a".to_owned(),
				shared_lib_ext: ".dylib".to_owned(),
				exe_ext: "".to_owned(),
			}
		} else {
			TargetPlatform {
				obj_ext: ".o".to_owned(),
				lib_prefix: "lib".to_owned(),
				static_lib_ext: ".a".to_owned(),
				shared_lib_ext: ".so".to_owned(),
				exe_ext: "".to_owned(),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn artifact_names() {
		let linux = TargetPlatform::from_triple("x86_64-pc-linux-gnu");
		let windows = TargetPlatform::from_triple("x86_64-pc-windows-msvc");

		assert_eq!(
			TargetType::DynamicLibrary.artifact_file_name("logger", &linux),
			Some("liblogger.so".to_owned())
		);
		assert_eq!(
			TargetType::DynamicLibrary.artifact_file_name("logger", &windows),
			Some("logger.dll".to_owned())
		);
		assert_eq!(TargetType::Executable.artifact_file_name("app", &windows), Some("app.exe".to_owned()));
		assert_eq!(TargetType::HeaderOnly.artifact_file_name("hdr", &linux), None);
	}

	#[test]
	fn target_type_aliases() {
		#[derive(Deserialize)]
		struct T {
			target_type: TargetType,
		}
		let t: T = toml::from_str(r#"target_type = "DLL""#).unwrap();
		assert_eq!(t.target_type, TargetType::DynamicLibrary);
		let t: T = toml::from_str(r#"target_type = "StaticLibrary""#).unwrap();
		assert_eq!(t.target_type, TargetType::StaticLibrary);
	}
}
