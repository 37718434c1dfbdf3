mod gnu;

use std::{path::Path, process};

use crate::project::Define;
use gnu::{Flavor, GnuDriver};

const CLANG_ID: &str = "clang version ";
const GCC_ID: &str = "gcc version ";
const TARGET_PREFIX: &str = "Target: ";

pub trait Compiler: Send + Sync {
	fn id(&self) -> String;
	fn version(&self) -> String;
	fn target(&self) -> String;

	fn cmd(&self) -> Vec<String>;
	fn out_flag(&self) -> String;
	fn c_std_flag(&self, std: &str) -> Result<String, String>;
	fn cpp_std_flag(&self, std: &str) -> Result<String, String>;
	fn position_independent_code_flag(&self) -> Option<String>;

	fn define_flag(&self, def: &Define) -> String {
		format!("-D{}", def)
	}

	fn include_flag(&self, dir: &Path) -> String {
		format!("-I{}", dir.display())
	}
}

pub trait ExeLinker: Send + Sync {
	fn cmd(&self) -> Vec<String>;
	fn shared_flag(&self) -> String;
	fn position_independent_executable_flag(&self) -> Option<String>;
}

// The `-v` flag is a shorthand for '--verbose' or '--version --verbose'
// and outputs to stderr instead of stdout
fn version_output(cmd: &[String], role: &str) -> Result<String, String> {
	let (exe, args) = match cmd.split_first() {
		Some(x) => x,
		None => return Err(format!("{} command is empty", role)),
	};
	match process::Command::new(exe).args(args).arg("-v").output() {
		Ok(x) => {
			if !x.status.success() {
				return Err(format!(
					"{} command returned non-success exit code: \"{} -v\": {}",
					role,
					cmd.join(" "),
					x.status
				));
			}
			Ok(String::from_utf8_lossy(&x.stderr).into_owned())
		}
		Err(e) => Err(format!("Error executing {} command \"{} -v\": {}", role.to_lowercase(), cmd.join(" "), e)),
	}
}

pub(super) fn identify_compiler(cmd: Vec<String>) -> Result<Box<dyn Compiler>, String> {
	log::debug!("identify_compiler() cmd: {}", cmd.join(" "));
	let output = version_output(&cmd, "Compiler")?;
	log::debug!("{} -v output: {}", cmd.join(" "), output);

	match identify_output(&output, &cmd)? {
		Some(x) => Ok(x),
		None => Err(format!("Could not identify compiler \"{}\"", cmd.join(" "))),
	}
}

pub(super) fn identify_linker(cmd: Vec<String>) -> Result<Box<dyn ExeLinker>, String> {
	log::debug!("identify_linker() cmd: {}", cmd.join(" "));
	let output = version_output(&cmd, "Linker")?;
	log::debug!("{} -v output: {}", cmd.join(" "), output);

	match identify_output(&output, &cmd)? {
		Some(x) => Ok(x),
		None => Err(format!("Could not identify linker \"{}\"", cmd.join(" "))),
	}
}

fn identify_output(output: &str, cmd: &[String]) -> Result<Option<Box<GnuDriver>>, String> {
	let lines = output.lines().collect::<Vec<&str>>();
	let first_line = match lines.first() {
		None => return Err("Command output empty. Could not identify toolchain".to_owned()),
		Some(x) => x,
	};

	if let Some(clang) = identify_clang(first_line, &lines, cmd)? {
		Ok(Some(clang))
	} else {
		identify_gcc(&lines, cmd)
	}
}

fn find_target(lines: &[&str]) -> Result<String, String> {
	match lines.iter().find(|l| l.starts_with(TARGET_PREFIX)) {
		None => Err(format!("Could not find \"{}\" in compiler output", TARGET_PREFIX)),
		Some(x) => Ok(x[TARGET_PREFIX.len()..].to_owned()),
	}
}

fn identify_clang(first_line: &str, lines: &[&str], cmd: &[String]) -> Result<Option<Box<GnuDriver>>, String> {
	if !first_line.starts_with(CLANG_ID) && !first_line.contains(&(String::from(" ") + CLANG_ID)) {
		return Ok(None);
	}
	log::info!("compiler: clang");
	let version = find_version(first_line, CLANG_ID);
	log::info!("compiler version: {}", version);

	let target = find_target(lines)?;
	log::info!("compiler target: {}", target);

	Ok(Some(Box::new(GnuDriver { flavor: Flavor::Clang, cmd: cmd.to_vec(), version, target })))
}

fn identify_gcc(lines: &[&str], cmd: &[String]) -> Result<Option<Box<GnuDriver>>, String> {
	if let Some(line) = lines.iter().find(|l| l.starts_with(GCC_ID)) {
		log::info!("compiler: gcc");

		let version = find_version(line, GCC_ID);
		log::info!("compiler version: {}", version);

		let target = find_target(lines)?;
		log::info!("compiler target: {}", target);

		Ok(Some(Box::new(GnuDriver { flavor: Flavor::Gcc, cmd: cmd.to_vec(), version, target })))
	} else {
		Ok(None)
	}
}

fn find_version(line: &str, ver_str: &str) -> String {
	let bgn_idx = match line.find(ver_str) {
		Some(x) => x + ver_str.len(),
		None => return String::new(),
	};
	let version = match line[bgn_idx..].find(' ') {
		None => &line[bgn_idx..],
		Some(offset) => &line[bgn_idx..bgn_idx + offset],
	};
	version.to_owned()
}

#[cfg(test)]
mod tests {
	use super::*;

	const CLANG_UBUNTU: &str = "Ubuntu clang version 17.0.0 (++20230911073219+0176e8729ea4-1~exp1~20230911073329.40)
Target: x86_64-pc-linux-gnu
Thread model: posix
InstalledDir: /usr/bin
Found candidate GCC installation: /usr/bin/../lib/gcc/x86_64-linux-gnu/12
Selected GCC installation: /usr/bin/../lib/gcc/x86_64-linux-gnu/12";

	const CLANG_WINDOWS: &str = r"clang version 16.0.1
Target: x86_64-pc-windows-msvc
Thread model: posix
InstalledDir: C:\Program Files\LLVM\bin";

	const GCC_UBUNTU: &str = "Using built-in specs.
COLLECT_GCC=g++
COLLECT_LTO_WRAPPER=/usr/lib/gcc/x86_64-linux-gnu/11/lto-wrapper
Target: x86_64-linux-gnu
Thread model: posix
Supported LTO compression algorithms: zlib zstd
gcc version 11.4.0 (Ubuntu 11.4.0-1ubuntu1~22.04)";

	fn cmd(exe: &str) -> Vec<String> {
		vec![exe.to_owned()]
	}

	#[test]
	fn identify_clang_output() {
		match identify_output(CLANG_UBUNTU, &cmd("clang++")).unwrap() {
			Some(x) => {
				assert_eq!(x.id(), "clang");
				assert_eq!(x.version(), "17.0.0");
				assert_eq!(x.target(), "x86_64-pc-linux-gnu");
				assert_eq!(Compiler::position_independent_code_flag(x.as_ref()), Some("-fPIC".to_owned()));
			}
			None => panic!("Expected clang"),
		}
		match identify_output(CLANG_WINDOWS, &cmd("clang")).unwrap() {
			Some(x) => {
				assert_eq!(x.id(), "clang");
				assert_eq!(x.version(), "16.0.1");
				assert_eq!(Compiler::position_independent_code_flag(x.as_ref()), None);
			}
			None => panic!("Expected clang"),
		}
	}

	#[test]
	fn identify_gcc_output() {
		match identify_output(GCC_UBUNTU, &cmd("g++")).unwrap() {
			Some(x) => {
				assert_eq!(x.id(), "gcc");
				assert_eq!(x.version(), "11.4.0");
				assert_eq!(x.target(), "x86_64-linux-gnu");
				assert_eq!(x.cpp_std_flag("17"), Ok("-std=c++17".to_owned()));
				assert_eq!(x.c_std_flag("11"), Ok("-std=c11".to_owned()));
				assert!(x.c_std_flag("23").is_err());
			}
			None => panic!("Expected gcc"),
		}
	}

	#[test]
	fn unknown_output() {
		assert!(identify_output("tcc version 0.9.27", &cmd("tcc")).unwrap().is_none());
		assert!(identify_output("", &cmd("cc")).is_err());
		assert!(identify_output("clang version 3.0", &cmd("cc")).is_err());
	}

	#[test]
	fn flag_formatting() {
		let gcc = match identify_output(GCC_UBUNTU, &cmd("g++")).unwrap() {
			Some(x) => x,
			None => panic!("Expected gcc"),
		};
		assert_eq!(gcc.define_flag(&Define::parse("BUILDING_LIB")), "-DBUILDING_LIB");
		assert_eq!(gcc.define_flag(&Define::parse("MSG=hello world")), "-DMSG=hello world");
		assert_eq!(gcc.include_flag(Path::new("/src/include")), "-I/src/include");
		assert_eq!(gcc.shared_flag(), "-shared");
	}
}
