use super::{Compiler, ExeLinker};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Flavor {
	Clang,
	Gcc,
}

/// Drivers that accept GCC-style command lines.
pub(crate) struct GnuDriver {
	pub(super) flavor: Flavor,
	pub(super) cmd: Vec<String>,
	pub(super) version: String,
	pub(super) target: String,
}

impl GnuDriver {
	// PIC/PIE are implied for Windows targets and the flags are rejected there
	fn target_windows(&self) -> bool {
		self.target.contains("-windows-") || self.target.contains("-mingw")
	}
}

impl Compiler for GnuDriver {
	fn id(&self) -> String {
		match self.flavor {
			Flavor::Clang => "clang".to_owned(),
			Flavor::Gcc => "gcc".to_owned(),
		}
	}

	fn version(&self) -> String {
		self.version.clone()
	}

	fn target(&self) -> String {
		self.target.clone()
	}

	fn cmd(&self) -> Vec<String> {
		self.cmd.clone()
	}

	fn out_flag(&self) -> String {
		"-o".to_owned()
	}

	fn c_std_flag(&self, std: &str) -> Result<String, String> {
		match std {
			"99" | "11" | "17" => Ok(format!("-std=c{std}")),
			"23" if self.flavor == Flavor::Clang => Ok("-std=c2x".to_owned()),
			_ => Err(format!("C standard not supported by compiler: {std}")),
		}
	}

	fn cpp_std_flag(&self, std: &str) -> Result<String, String> {
		match std {
			"11" | "14" | "17" | "20" | "23" => Ok(format!("-std=c++{std}")),
			_ => Err(format!("C++ standard not supported by compiler: {std}")),
		}
	}

	fn position_independent_code_flag(&self) -> Option<String> {
		match self.target_windows() {
			true => None,
			false => Some("-fPIC".to_owned()),
		}
	}
}

impl ExeLinker for GnuDriver {
	fn cmd(&self) -> Vec<String> {
		self.cmd.clone()
	}

	fn shared_flag(&self) -> String {
		"-shared".to_owned()
	}

	fn position_independent_executable_flag(&self) -> Option<String> {
		match self.target_windows() {
			true => None,
			false => Some("-pie".to_owned()),
		}
	}
}
