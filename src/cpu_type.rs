use std::fs;

use crate::error::{Error, Result};

/// Represents CPU manufacturer types that can be detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuType {
	/// AMD CPU, the only vendor whose energy MSR layout is supported
	Amd,
	/// Intel CPU, detected only to give a precise error
	Intel,
	/// Any other CPU architecture
	Unsupported,
}

impl CpuType {
	/// Detects the vendor from the contents of `/proc/cpuinfo`
	pub fn from_cpuinfo(cpuinfo: &str) -> Self {
		if cpuinfo.contains("AuthenticAMD") {
			CpuType::Amd
		} else if cpuinfo.contains("GenuineIntel") {
			CpuType::Intel
		} else {
			CpuType::Unsupported
		}
	}
}

/// Detects the CPU manufacturer by reading /proc/cpuinfo
pub fn detect_cpu_type() -> CpuType {
	let cpuinfo = fs::read_to_string("/proc/cpuinfo").unwrap_or_default();
	CpuType::from_cpuinfo(&cpuinfo)
}

/// Fails unless the running CPU exposes the AMD energy MSRs
pub fn require_amd() -> Result<()> {
	match detect_cpu_type() {
		CpuType::Amd => Ok(()),
		other => Err(Error::UnsupportedCpu(format!("{other:?}"))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn vendor_from_cpuinfo() {
		assert_eq!(CpuType::from_cpuinfo("vendor_id\t: AuthenticAMD\n"), CpuType::Amd);
		assert_eq!(CpuType::from_cpuinfo("vendor_id\t: GenuineIntel\n"), CpuType::Intel);
		assert_eq!(CpuType::from_cpuinfo(""), CpuType::Unsupported);
	}
}
