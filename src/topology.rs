use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use log::{debug, info, warn};

use crate::constants::SYSFS_CPU_DIR;
use crate::error::{Error, Result};

/// A tracked logical cpu and the physical package it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalCore {
	pub id: usize,
	pub package: usize,
}

/// What the topology source knows about one logical cpu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreDescriptor {
	pub package: usize,
	/// False for secondary hyperthreads, which are never tracked
	pub primary: bool,
}

/// Source of the logical cpu → package mapping
pub trait TopologySource {
	/// Describes logical cpu `cpu`, or `None` when the system has no such cpu
	fn describe(&self, cpu: usize) -> io::Result<Option<CoreDescriptor>>;

	/// Number of logical cpus present on the system, when the source knows it
	fn present_cpus(&self) -> Option<usize> {
		None
	}
}

/// How logical cpu indices are walked during enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationPolicy {
	/// Walk from 0 and stop at the first missing index (at most `limit` cpus)
	StopAtFirstGap { limit: usize },
	/// Look at every index below `limit`, skipping missing ones
	ScanAll { limit: usize },
}

/// Reads the topology from `/sys/devices/system/cpu/cpu<N>/topology`
#[derive(Debug, Clone)]
pub struct SysfsTopology {
	root: PathBuf,
}

impl Default for SysfsTopology {
	fn default() -> Self {
		Self::new(SYSFS_CPU_DIR)
	}
}

impl SysfsTopology {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}
}

impl TopologySource for SysfsTopology {
	fn describe(&self, cpu: usize) -> io::Result<Option<CoreDescriptor>> {
		let topology_dir = self.root.join(format!("cpu{cpu}/topology"));
		let package = match fs::read_to_string(topology_dir.join("physical_package_id")) {
			Ok(content) => content
				.trim()
				.parse::<usize>()
				.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e),
		};

		// The primary thread is the lowest-numbered sibling; fall back to the
		// even-index convention when the siblings list is unavailable
		let primary = match fs::read_to_string(topology_dir.join("thread_siblings_list")) {
			Ok(list) => parse_cpu_list(&list)?.into_iter().min().is_none_or(|first| first == cpu),
			Err(_) => cpu % 2 == 0,
		};

		Ok(Some(CoreDescriptor { package, primary }))
	}

	fn present_cpus(&self) -> Option<usize> {
		let list = fs::read_to_string(self.root.join("present")).ok()?;
		parse_cpu_list(&list).ok().map(|cpus| cpus.len())
	}
}

/// Parses a kernel cpu list such as `0-3,8,10-11`
pub fn parse_cpu_list(list: &str) -> io::Result<Vec<usize>> {
	let invalid = |item: &str| io::Error::new(io::ErrorKind::InvalidData, format!("invalid cpu list item '{item}'"));
	let mut cpus = Vec::new();
	for item in list.trim().split(',').filter(|s| !s.is_empty()) {
		match item.split_once('-') {
			Some((start, end)) => {
				let start: usize = start.parse().map_err(|_| invalid(item))?;
				let end: usize = end.parse().map_err(|_| invalid(item))?;
				cpus.extend(start..=end);
			},
			None => cpus.push(item.parse().map_err(|_| invalid(item))?),
		}
	}
	Ok(cpus)
}

/// Number of logical cpus enumeration didn't reach, if any
///
/// Compared against the present cpus when known. Otherwise the cpus available
/// to this process are only a lower bound (affinity and cgroups shrink it), so
/// seeing more than that is fine.
pub fn missing_cpus(seen: usize, present: Option<usize>, available: usize) -> Option<usize> {
	present
		.unwrap_or(available)
		.checked_sub(seen)
		.filter(|&missing| missing > 0)
}

/// The tracked cores, in enumeration order, and each package's representative
#[derive(Debug, Clone)]
pub struct CpuTopology {
	cores: Vec<LogicalCore>,
	/// Package id -> first primary core seen for that package
	representatives: BTreeMap<usize, usize>,
}

impl CpuTopology {
	/// Enumerates `source` according to `policy`
	pub fn enumerate(source: &dyn TopologySource, policy: EnumerationPolicy) -> Result<Self> {
		let mut cores = Vec::new();
		let mut seen = 0;

		let limit = match policy {
			EnumerationPolicy::StopAtFirstGap { limit } | EnumerationPolicy::ScanAll { limit } => limit,
		};

		for cpu in 0..limit {
			match source.describe(cpu)? {
				Some(descriptor) => {
					seen += 1;
					if descriptor.primary {
						cores.push(LogicalCore {
							id: cpu,
							package: descriptor.package,
						});
					} else {
						debug!("cpu {cpu} is a secondary thread, not tracked");
					}
				},
				None => match policy {
					EnumerationPolicy::StopAtFirstGap { .. } => {
						debug!("Topology enumeration stopped at missing cpu {cpu}");
						break;
					},
					EnumerationPolicy::ScanAll { .. } => continue,
				},
			}
		}

		if let Some(missing) = missing_cpus(seen, source.present_cpus(), num_cpus::get()) {
			warn!("Enumeration missed {missing} logical cpus, cpu numbering may be non-contiguous");
		}

		let topology = Self::from_cores(cores)?;
		info!(
			"Tracking {} primary cores across {} packages",
			topology.cores.len(),
			topology.representatives.len()
		);
		Ok(topology)
	}

	/// Builds a topology from already known cores, in enumeration order
	pub fn from_cores(cores: Vec<LogicalCore>) -> Result<Self> {
		if cores.is_empty() {
			return Err(Error::NoCores);
		}

		let mut representatives = BTreeMap::new();
		for core in &cores {
			representatives.entry(core.package).or_insert(core.id);
		}

		Ok(Self { cores, representatives })
	}

	pub fn cores(&self) -> &[LogicalCore] {
		&self.cores
	}

	/// Package id -> representative core id, ordered by package
	pub fn representatives(&self) -> &BTreeMap<usize, usize> {
		&self.representatives
	}

	pub fn package_of(&self, cpu: usize) -> Option<usize> {
		self.cores.iter().find(|c| c.id == cpu).map(|c| c.package)
	}
}
