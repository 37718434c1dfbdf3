use core::{fmt, str::FromStr};
use std::{
	path::{Path, PathBuf}, //
	sync::Arc,
};

use crate::{
	config::{ConfigContext, ConfigEntries},
	target::TargetType,
};

/// `(package, name)`, unique within a session. Written as `package/name`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
	pub package: String,
	pub name: String,
}

impl QualifiedName {
	pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
		QualifiedName { package: package.into(), name: name.into() }
	}
}

impl fmt::Display for QualifiedName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.package, self.name)
	}
}

impl FromStr for QualifiedName {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.split_once('/') {
			Some((package, name)) if !package.is_empty() && !name.is_empty() && !name.contains('/') => {
				Ok(QualifiedName::new(package, name))
			}
			_ => Err(format!("Expected a qualified name of the form \"package/name\", found \"{}\"", s)),
		}
	}
}

/// A preprocessor define, `NAME` or `NAME=VALUE`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Define {
	pub name: String,
	pub value: Option<String>,
}

impl Define {
	pub fn new(name: impl Into<String>, value: Option<String>) -> Self {
		Define { name: name.into(), value }
	}

	pub fn parse(def: &str) -> Define {
		match def.split_once('=') {
			Some((name, value)) => Define::new(name.trim(), Some(value.trim().to_owned())),
			None => Define::new(def.trim(), None),
		}
	}
}

impl fmt::Display for Define {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.value {
			Some(value) => write!(f, "{}={}", self.name, value),
			None => write!(f, "{}", self.name),
		}
	}
}

impl From<&str> for Define {
	fn from(def: &str) -> Self {
		Define::parse(def)
	}
}

/// Runs once a project's merged configuration is known. Receives a read-only
/// view and returns settings to add on top of it.
pub type ConfigureFn = Arc<dyn Fn(&ConfigContext<'_>) -> Result<ConfigEntries, String> + Send + Sync>;

/// Declared properties of one buildable project. Immutable once registered.
#[derive(Clone)]
pub struct ProjectDescriptor {
	pub name: QualifiedName,
	/// Directory that relative includes and sources resolve against.
	pub location: PathBuf,
	pub depends_upon: Vec<QualifiedName>,
	pub defines: Vec<Define>,
	pub public_defines: Vec<Define>,
	pub public_includes: Vec<String>,
	pub private_includes: Vec<String>,
	pub public_link_flags: Vec<String>,
	pub sources: Vec<String>,
	pub target_type: TargetType,
	pub configure: Option<ConfigureFn>,
}

impl fmt::Debug for ProjectDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProjectDescriptor")
			.field("name", &self.name)
			.field("location", &self.location)
			.field("depends_upon", &self.depends_upon)
			.field("defines", &self.defines)
			.field("public_defines", &self.public_defines)
			.field("public_includes", &self.public_includes)
			.field("private_includes", &self.private_includes)
			.field("public_link_flags", &self.public_link_flags)
			.field("sources", &self.sources)
			.field("target_type", &self.target_type)
			.field("configure", &self.configure.as_ref().map(|_| "<fn>"))
			.finish()
	}
}

impl ProjectDescriptor {
	pub fn new(
		package: impl Into<String>,
		name: impl Into<String>,
		location: impl AsRef<Path>,
		target_type: TargetType,
	) -> Self {
		ProjectDescriptor {
			name: QualifiedName::new(package, name),
			location: location.as_ref().to_path_buf(),
			depends_upon: Vec::new(),
			defines: Vec::new(),
			public_defines: Vec::new(),
			public_includes: Vec::new(),
			private_includes: Vec::new(),
			public_link_flags: Vec::new(),
			sources: Vec::new(),
			target_type,
			configure: None,
		}
	}

	pub fn depends_upon<I: IntoIterator<Item = QualifiedName>>(mut self, deps: I) -> Self {
		self.depends_upon.extend(deps);
		self
	}

	pub fn define(mut self, def: impl Into<Define>) -> Self {
		self.defines.push(def.into());
		self
	}

	pub fn public_define(mut self, def: impl Into<Define>) -> Self {
		self.public_defines.push(def.into());
		self
	}

	pub fn public_includes<S: Into<String>, I: IntoIterator<Item = S>>(mut self, patterns: I) -> Self {
		self.public_includes.extend(patterns.into_iter().map(Into::into));
		self
	}

	pub fn private_includes<S: Into<String>, I: IntoIterator<Item = S>>(mut self, patterns: I) -> Self {
		self.private_includes.extend(patterns.into_iter().map(Into::into));
		self
	}

	pub fn public_link_flags<S: Into<String>, I: IntoIterator<Item = S>>(mut self, flags: I) -> Self {
		self.public_link_flags.extend(flags.into_iter().map(Into::into));
		self
	}

	pub fn sources<S: Into<String>, I: IntoIterator<Item = S>>(mut self, sources: I) -> Self {
		self.sources.extend(sources.into_iter().map(Into::into));
		self
	}

	pub fn configure<F>(mut self, configure: F) -> Self
	where
		F: Fn(&ConfigContext<'_>) -> Result<ConfigEntries, String> + Send + Sync + 'static,
	{
		self.configure = Some(Arc::new(configure));
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_qualified_name() {
		let name: QualifiedName = "artd/artd-lib-logger".parse().unwrap();
		assert_eq!(name, QualifiedName::new("artd", "artd-lib-logger"));
		assert_eq!(name.to_string(), "artd/artd-lib-logger");

		assert!("no-package".parse::<QualifiedName>().is_err());
		assert!("/name".parse::<QualifiedName>().is_err());
		assert!("a/b/c".parse::<QualifiedName>().is_err());
	}

	#[test]
	fn parse_define() {
		assert_eq!(Define::parse("BUILDING_LIB"), Define::new("BUILDING_LIB", None));
		assert_eq!(Define::parse("X=1"), Define::new("X", Some("1".to_owned())));
		assert_eq!(Define::parse("MSG=a=b"), Define::new("MSG", Some("a=b".to_owned())));
		assert_eq!(Define::parse("X=").to_string(), "X=");
		assert_eq!(Define::parse(" X = 1 "), Define::parse("X=1"));
		assert_eq!(Define::parse("=1").name, "");
	}
}
