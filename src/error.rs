use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop the collector
///
/// Everything here is fatal: a cycle invalidated by counter rollover is not an
/// error and is reported through [`crate::monitor::CycleOutcome`] instead.
#[derive(Debug, Error)]
pub enum Error {
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),

	#[error("failed to read MSR {offset:#x} on cpu {cpu}: {source}")]
	Msr {
		cpu: usize,
		offset: u64,
		#[source]
		source: io::Error,
	},

	#[error("failed to open {} for cpu {cpu}: {source}", path.display())]
	DeviceOpen {
		cpu: usize,
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("unsupported CPU vendor: {0}")]
	UnsupportedCpu(String),

	#[error("no primary cores found in the CPU topology")]
	NoCores,

	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("failed to load the msr driver: {0}")]
	Driver(String),

	#[error("failed to publish metrics to {}: {source}", path.display())]
	Publish {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("elapsed time must be positive, got {0} s")]
	InvalidElapsed(f64),
}

pub type Result<T> = std::result::Result<T, Error>;
