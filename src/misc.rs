use std::path::{Component, Path, PathBuf};

use globset::GlobBuilder;
use walkdir::WalkDir;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourcePath {
	pub full: PathBuf,
	pub name: String,
}

pub(crate) fn join_parent(parent_path: &Path, x: &str) -> SourcePath {
	let joined = parent_path.join(x); // If x is absolute, it replaces the current path.
	match joined.try_exists() {
		Ok(true) => match joined.canonicalize() {
			Ok(path) => SourcePath { full: strip_verbatim(path), name: x.to_owned() },
			Err(e) => {
				log::warn!("Could not canonicalize path \"{}\": {}", joined.to_string_lossy(), e);
				SourcePath { full: joined, name: x.to_owned() }
			}
		},
		Ok(false) => {
			log::warn!("Path does not exist: \"{}\"", joined.to_string_lossy());
			SourcePath { full: joined, name: x.to_owned() }
		}
		Err(e) => {
			log::warn!("Existence of path could not be confirmed \"{}\": {}", joined.to_string_lossy(), e);
			SourcePath { full: joined, name: x.to_owned() }
		}
	}
}

// Compilers do not accept `\\?\` prefixed paths
fn strip_verbatim(path: PathBuf) -> PathBuf {
	match path.to_str() {
		Some(s) if s.starts_with(r"\\?\") => PathBuf::from(&s[4..]),
		_ => path,
	}
}

pub(crate) fn is_c_source(src_filename: &str) -> bool {
	src_filename.ends_with(".c") || src_filename.ends_with(".C")
}

pub(crate) fn is_cpp_source(src_filename: &str) -> bool {
	src_filename.ends_with(".cpp") || src_filename.ends_with(".cc") || src_filename.ends_with(".cxx")
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sources {
	pub c: Vec<SourcePath>,
	pub cpp: Vec<SourcePath>,
}

impl Sources {
	pub fn iter(&self) -> impl Iterator<Item = &SourcePath> {
		self.c.iter().chain(self.cpp.iter())
	}

	pub fn is_empty(&self) -> bool {
		self.c.is_empty() && self.cpp.is_empty()
	}

	pub fn len(&self) -> usize {
		self.c.len() + self.cpp.len()
	}

	/// Errors with the offending name when a source is neither C nor C++.
	pub(crate) fn from_slice(sources: &[String], parent_path: &Path) -> Result<Self, String> {
		sources
			.iter()
			.map(|x| join_parent(parent_path, x))
			.try_fold(Sources::default(), |mut acc, src| {
				if acc.iter().any(|x| x.full == src.full) {
					return Ok(acc);
				}
				if is_c_source(&src.name) {
					acc.c.push(src);
				} else if is_cpp_source(&src.name) {
					acc.cpp.push(src);
				} else {
					return Err(src.name);
				}
				Ok(acc)
			})
	}
}

fn is_glob(component: &str) -> bool {
	component.contains(['*', '?', '[', '{'])
}

/// Expands an include pattern relative to `parent_path` into directories.
/// A matched directory is used as is, a matched file contributes the
/// directory containing it. Results keep walk order and are deduplicated.
pub(crate) fn expand_include_pattern(parent_path: &Path, pattern: &str) -> Result<Vec<PathBuf>, String> {
	let pattern_path = Path::new(pattern);
	if !pattern_path.components().any(|c| is_glob(&c.as_os_str().to_string_lossy())) {
		let path = parent_path.join(pattern_path);
		return Ok(if path.is_dir() {
			vec![path]
		} else if path.is_file() {
			path.parent().map(Path::to_path_buf).into_iter().collect()
		} else {
			Vec::new()
		});
	}

	// Walk only below the literal prefix of the pattern
	let mut walk_root = parent_path.to_path_buf();
	for component in pattern_path.components() {
		let s = component.as_os_str().to_string_lossy();
		if is_glob(&s) {
			break;
		}
		match component {
			Component::CurDir => {}
			_ => walk_root.push(component),
		}
	}
	if !walk_root.is_dir() {
		return Ok(Vec::new());
	}

	let absolute = pattern_path.is_absolute();
	let glob_str = pattern.replace('\\', "/");
	let glob_str = glob_str.trim_start_matches("./");
	let matcher = match GlobBuilder::new(glob_str).literal_separator(true).build() {
		Ok(x) => x.compile_matcher(),
		Err(e) => return Err(e.to_string()),
	};

	let mut dirs = Vec::new();
	for entry in WalkDir::new(&walk_root).sort_by_file_name() {
		let entry = match entry {
			Ok(x) => x,
			Err(e) => {
				log::warn!("Error walking \"{}\": {}", walk_root.display(), e);
				continue;
			}
		};
		let candidate = if absolute {
			entry.path().to_path_buf()
		} else {
			match entry.path().strip_prefix(parent_path) {
				Ok(x) => x.to_path_buf(),
				Err(_) => continue,
			}
		};
		if !matcher.is_match(candidate.to_string_lossy().replace('\\', "/")) {
			continue;
		}
		let dir = if entry.file_type().is_dir() {
			entry.path().to_path_buf()
		} else {
			match entry.path().parent() {
				Some(x) => x.to_path_buf(),
				None => continue,
			}
		};
		if !dirs.contains(&dir) {
			dirs.push(dir);
		}
	}
	Ok(dirs)
}
