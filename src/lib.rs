pub mod config;
pub mod constants;
pub mod cpu_type;
pub mod energy;
pub mod error;
pub mod exposition;
pub mod monitor;
pub mod power;
pub mod rollover;
pub mod topology;
pub mod units;
pub mod util;

use log::info;

use crate::config::Config;
use crate::error::Result;
use crate::exposition::TextfilePublisher;
use crate::monitor::PowerMonitor;
use crate::topology::{CpuTopology, SysfsTopology};
use crate::util::driver;
use crate::util::msr::{MsrDevices, device_path};

/// Starts collecting CPU power and publishing it to the configured textfile
///
/// This is the main entry point: startup failures and register read errors
/// are returned, a discarded cycle is not.
pub fn run(config: Config) -> Result<()> {
	if config.check_vendor {
		cpu_type::require_amd()?;
	}
	if config.load_driver {
		driver::ensure_msr_driver()?;
	}
	driver::warn_if_unprivileged(&device_path(0));

	let topology = CpuTopology::enumerate(&SysfsTopology::default(), config.enumeration)?;
	let devices = MsrDevices::open(topology.cores().iter().map(|c| c.id), config.read_retries)?;
	let units = units::calibrate(&devices, &topology)?;

	let mut publisher = TextfilePublisher::new(&config.output, config.metric_prefix.clone())?;
	info!("Publishing to {}", publisher.path().display());

	let monitor = PowerMonitor::new(&devices, &topology, &units, config.corrector, config.interval);
	monitor.run(&mut publisher, config.once)
}
