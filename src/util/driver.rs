use std::path::Path;
use std::process::Command;

use log::{info, warn};

use crate::constants::MODPROBE_PATH;
use crate::error::{Error, Result};
use crate::util::msr::device_path;

/// Makes sure the msr driver is loaded, running `modprobe msr` when the
/// device node of cpu 0 is missing
pub fn ensure_msr_driver() -> Result<()> {
	if device_path(0).exists() {
		return Ok(());
	}

	info!("{} not found, loading the msr driver", device_path(0).display());
	let output = Command::new(MODPROBE_PATH)
		.arg("msr")
		.output()
		.map_err(|e| Error::Driver(format!("{MODPROBE_PATH} could not be executed: {e}")))?;

	if !output.status.success() {
		let stderr = String::from_utf8_lossy(&output.stderr);
		return Err(Error::Driver(format!("modprobe exited with {}: {}", output.status, stderr.trim())));
	}
	Ok(())
}

/// Returns true when running as root
pub fn is_root() -> bool {
	// SAFETY: geteuid has no preconditions and can't fail
	unsafe { libc::geteuid() == 0 }
}

/// Logs a hint when the msr devices are likely to be unreadable
pub fn warn_if_unprivileged(device: &Path) {
	if !is_root() {
		warn!(
			"Not running as root, opening {} will probably fail (CAP_SYS_RAWIO is required)",
			device.display()
		);
	}
}
