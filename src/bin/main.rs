use std::{
	fs, //
	path::PathBuf,
	process::ExitCode,
};

use clap::{value_parser, Arg, Command};

use ballista::{manifest, run_session, toolchain, CancelToken, SessionOptions};

const EXIT_BUILD_FAILED: u8 = 1;
// clap already exits with 2 on usage errors
const EXIT_CONFIG_ERROR: u8 = 3;
const EXIT_CANCELLED: u8 = 130;

const MANIFEST: &str = "manifest";
const BUILD_DIR: &str = "build-dir";
const TOOLCHAIN: &str = "toolchain";
const JOBS: &str = "jobs";

fn cli() -> Command {
	Command::new("ballista")
		.about("Builds every project of a C/C++ workspace in dependency order")
		.version(env!("CARGO_PKG_VERSION"))
		.arg(
			Arg::new(MANIFEST)
				.short('m')
				.long(MANIFEST)
				.value_name("path-to-manifest")
				.help("ballista.toml, or a directory containing one")
				.value_parser(value_parser!(PathBuf))
				.default_value("."),
		)
		.arg(
			Arg::new(BUILD_DIR)
				.short('B')
				.long(BUILD_DIR)
				.value_name("path-to-build")
				.help("Specify the build directory")
				.value_parser(value_parser!(PathBuf))
				.required(true),
		)
		.arg(
			Arg::new(TOOLCHAIN)
				.short('t')
				.long(TOOLCHAIN)
				.value_name("path-to-toolchain")
				.help("Toolchain file naming the compilers and linkers")
				.value_parser(value_parser!(PathBuf))
				.required(true),
		)
		.arg(
			Arg::new(JOBS)
				.short('j')
				.long(JOBS)
				.value_name("N")
				.help("Maximum number of projects built at once (default: number of CPUs)")
				.value_parser(value_parser!(u64).range(1..)),
		)
}

fn main() -> ExitCode {
	env_logger::Builder::from_env(env_logger::Env::default().filter_or("BALLISTA_LOG", "warn"))
		.format_timestamp(None)
		.init();

	let matches = cli().get_matches();
	// Required and defaulted arguments are always present
	let manifest_path = matches.get_one::<PathBuf>(MANIFEST).cloned().unwrap_or_default();
	let build_dir = matches.get_one::<PathBuf>(BUILD_DIR).cloned().unwrap_or_default();
	let toolchain_path = matches.get_one::<PathBuf>(TOOLCHAIN).cloned().unwrap_or_default();
	let max_parallelism = matches.get_one::<u64>(JOBS).map(|x| *x as usize);

	println!(" manifest: {}", manifest_path.display());
	println!("build-dir: {}", build_dir.display());
	println!("toolchain: {}", toolchain_path.display());

	// Check build dir can be created before erroring on anything else
	if let Err(e) = fs::create_dir_all(&build_dir) {
		println!("Error creating directory: {} (path: {})", e, build_dir.display());
		return ExitCode::from(EXIT_CONFIG_ERROR);
	}
	let build_dir = match build_dir.canonicalize() {
		Ok(x) => x,
		Err(e) => {
			println!("Error resolving build directory: {} (path: {})", e, build_dir.display());
			return ExitCode::from(EXIT_CONFIG_ERROR);
		}
	};

	let loaded = match manifest::load_manifest(&manifest_path) {
		Ok(x) => x,
		Err(e) => {
			println!("{}", e);
			return ExitCode::from(EXIT_CONFIG_ERROR);
		}
	};

	let toolchain = match toolchain::read_toolchain(&toolchain_path, &build_dir, loaded.options) {
		Ok(x) => x,
		Err(e) => {
			println!("{}", e);
			return ExitCode::from(EXIT_CONFIG_ERROR);
		}
	};

	let cancel = CancelToken::new();
	let handler_token = cancel.clone();
	if let Err(e) = ctrlc::set_handler(move || {
		eprintln!("\nReceived interrupt signal, finishing running projects...");
		handler_token.cancel();
	}) {
		log::warn!("Could not install interrupt handler: {}", e);
	}

	let options = SessionOptions { max_parallelism, cancel };
	let report = match run_session(loaded.projects, &toolchain, &options) {
		Ok(x) => x,
		Err(e) => {
			println!("Error: {}", e);
			return ExitCode::from(EXIT_CONFIG_ERROR);
		}
	};

	println!("{}", report);
	if report.cancelled {
		ExitCode::from(EXIT_CANCELLED)
	} else if !report.is_success() {
		ExitCode::from(EXIT_BUILD_FAILED)
	} else {
		ExitCode::SUCCESS
	}
}
