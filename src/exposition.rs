use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::power::PowerReading;

/// Sink for one exposition block per successful cycle
pub trait Publisher {
	fn publish(&mut self, reading: &PowerReading) -> Result<()>;
}

/// Renders readings in the Prometheus text exposition format
pub fn render(reading: &PowerReading, prefix: &str) -> String {
	let cores = format!("{prefix}cpu_power_cores_watts");
	let package = format!("{prefix}cpu_power_package_watts");

	let mut out = format!(
		"# HELP {cores} Average power consumption by all cores of this CPU\n\
		 # TYPE {cores} gauge\n\
		 # HELP {package} Average power consumption by this CPU\n\
		 # TYPE {package} gauge\n"
	);

	for p in &reading.packages {
		out.push_str(&format!("{cores}{{package=\"{}\"}} {:.6}\n", p.package, p.cores_watts));
		out.push_str(&format!("{package}{{package=\"{}\"}} {:.6}\n", p.package, p.package_watts));
	}
	out
}

/// Writes the exposition to a file for the node_exporter textfile collector
///
/// Each block fully replaces the previous one: the content goes to a sibling
/// temporary file which is then renamed over the target.
#[derive(Debug, Clone)]
pub struct TextfilePublisher {
	path: PathBuf,
	prefix: String,
}

impl TextfilePublisher {
	/// Creates the publisher, creating the parent directory if needed
	pub fn new(path: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self> {
		let path = path.into();
		if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
			fs::create_dir_all(dir).map_err(|source| Error::Publish {
				path: dir.to_path_buf(),
				source,
			})?;
		}
		Ok(Self {
			path,
			prefix: prefix.into(),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn write_atomically(&self, content: &str) -> io::Result<()> {
		let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
		tmp_name.push(format!(".{}.tmp", std::process::id()));
		let tmp = self.path.with_file_name(tmp_name);

		let mut file = fs::File::create(&tmp)?;
		let written = (|| {
			file.write_all(content.as_bytes())?;
			file.sync_all()?;
			drop(file);
			fs::rename(&tmp, &self.path)
		})();

		// The temporary file must not outlive a failed write
		if written.is_err() {
			let _ = fs::remove_file(&tmp);
		}
		written
	}
}

impl Publisher for TextfilePublisher {
	fn publish(&mut self, reading: &PowerReading) -> Result<()> {
		let content = render(reading, &self.prefix);
		self.write_atomically(&content).map_err(|source| Error::Publish {
			path: self.path.clone(),
			source,
		})?;
		debug!("Published {} packages to {}", reading.packages.len(), self.path.display());
		Ok(())
	}
}
