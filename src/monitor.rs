use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::energy::{EnergyDeltas, EnergySnapshot};
use crate::error::Result;
use crate::exposition::Publisher;
use crate::power::PowerReading;
use crate::rollover::RolloverCorrector;
use crate::topology::CpuTopology;
use crate::units::PackageUnits;
use crate::util::msr::RegisterSource;

/// Outcome of one sampling cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
	/// Both snapshots were consistent
	Reading(PowerReading),
	/// A counter wrapped in a way that can't be trusted, nothing to publish
	Discarded { elapsed: Duration },
}

/// Samples the energy counters of every tracked core in two-snapshot cycles
pub struct PowerMonitor<'a> {
	source: &'a dyn RegisterSource,
	topology: &'a CpuTopology,
	units: &'a PackageUnits,
	corrector: RolloverCorrector,
	interval: Duration,
}

impl<'a> PowerMonitor<'a> {
	/// Creates a monitor over an already opened register source
	pub fn new(
		source: &'a dyn RegisterSource,
		topology: &'a CpuTopology,
		units: &'a PackageUnits,
		corrector: RolloverCorrector,
		interval: Duration,
	) -> Self {
		Self {
			source,
			topology,
			units,
			corrector,
			interval,
		}
	}

	/// Runs one cycle: snapshot, sleep for the interval, snapshot again
	///
	/// The elapsed time covers the whole cycle, both snapshots included, and is
	/// the denominator for every package.
	pub fn sample(&self) -> Result<CycleOutcome> {
		let start = Instant::now();
		let initial_snapshot = EnergySnapshot::read(self.source, self.topology)?;
		thread::sleep(self.interval);
		let final_snapshot = EnergySnapshot::read(self.source, self.topology)?;
		let elapsed = start.elapsed();

		let Some(deltas) =
			EnergyDeltas::between(&initial_snapshot, &final_snapshot, self.topology, &self.corrector, elapsed)
		else {
			return Ok(CycleOutcome::Discarded { elapsed });
		};

		Ok(CycleOutcome::Reading(PowerReading::derive(&deltas, self.units, elapsed)?))
	}

	/// Samples and publishes until a register read fails, or after one cycle if `once`
	///
	/// Publication failures are logged and don't stop the loop.
	pub fn run(&self, publisher: &mut dyn Publisher, once: bool) -> Result<()> {
		info!("Monitoring CPU power every {} ms", self.interval.as_millis());

		loop {
			match self.sample()? {
				CycleOutcome::Reading(reading) => {
					for p in &reading.packages {
						debug!(
							"package {}: cores {:.2} W, package {:.2} W",
							p.package, p.cores_watts, p.package_watts
						);
					}
					// The previous block stays in place, sampling goes on
					if let Err(e) = publisher.publish(&reading) {
						warn!("{e}");
					}
				},
				CycleOutcome::Discarded { elapsed } => {
					warn!(
						"Energy counter rollover during a {:.3} s cycle, discarding this cycle",
						elapsed.as_secs_f64()
					);
				},
			}

			if once {
				return Ok(());
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use clap::Parser;

	use super::*;
	use crate::config::Cli;
	use crate::constants::{AMD_ENERGY_CORE_MSR, AMD_ENERGY_PKG_MSR};
	use crate::error::Error;
	use crate::rollover::RolloverPolicy;
	use crate::topology::LogicalCore;
	use crate::units::CalibrationUnits;
	use crate::util::msr::fake::FakeRegisters;

	#[derive(Default)]
	struct RecordingPublisher {
		published: Vec<PowerReading>,
	}

	impl Publisher for RecordingPublisher {
		fn publish(&mut self, reading: &PowerReading) -> Result<()> {
			self.published.push(reading.clone());
			Ok(())
		}
	}

	fn topology() -> CpuTopology {
		CpuTopology::from_cores(vec![LogicalCore { id: 0, package: 1 }, LogicalCore { id: 2, package: 1 }]).unwrap()
	}

	fn units() -> PackageUnits {
		BTreeMap::from([(1, CalibrationUnits::from_raw(14 << 8))])
	}

	#[test]
	fn cycle_aggregates_cores_and_reads_package_once() {
		let topology = topology();
		let units = units();
		let registers = FakeRegisters::new();
		registers.set(0, AMD_ENERGY_CORE_MSR, &[1_000, 1_500]);
		registers.set(2, AMD_ENERGY_CORE_MSR, &[2_000, 2_300]);
		registers.set(0, AMD_ENERGY_PKG_MSR, &[10_000, 12_000]);
		registers.set(2, AMD_ENERGY_PKG_MSR, &[10_000, 12_000]);

		let corrector = RolloverCorrector::new(32, RolloverPolicy::Discard).unwrap();
		let monitor = PowerMonitor::new(&registers, &topology, &units, corrector, Duration::from_millis(1));

		let CycleOutcome::Reading(reading) = monitor.sample().unwrap() else {
			panic!("cycle should not be discarded");
		};
		let secs = reading.elapsed.as_secs_f64();
		let unit = 0.5_f64.powi(14);
		assert_eq!(reading.packages.len(), 1);
		let p = reading.packages[0];
		assert_eq!(p.package, 1);
		assert!((p.cores_watts - 800.0 * unit / secs).abs() < 1e-9);
		assert!((p.package_watts - 2_000.0 * unit / secs).abs() < 1e-9);
		assert_eq!(registers.reads(2, AMD_ENERGY_PKG_MSR), 0);
	}

	#[test]
	fn wrap_beyond_bound_skips_publication() {
		let topology = topology();
		let units = units();
		let registers = FakeRegisters::new();
		registers.set(0, AMD_ENERGY_CORE_MSR, &[100, 200, 4_294_967_290, 10]);
		registers.set(2, AMD_ENERGY_CORE_MSR, &[100, 200, 300, 400]);
		registers.set(0, AMD_ENERGY_PKG_MSR, &[1_000, 2_000, 3_000, 4_000]);

		let corrector = RolloverCorrector::new(
			32,
			RolloverPolicy::CorrectSingleWrap {
				max_interval: Duration::ZERO,
			},
		)
		.unwrap();
		let monitor = PowerMonitor::new(&registers, &topology, &units, corrector, Duration::from_millis(1));
		let mut publisher = RecordingPublisher::default();

		monitor.run(&mut publisher, true).unwrap();
		assert_eq!(publisher.published.len(), 1);
		let first = publisher.published[0].clone();

		monitor.run(&mut publisher, true).unwrap();
		assert_eq!(publisher.published, vec![first]);
	}

	struct FailingPublisher {
		attempts: usize,
	}

	impl Publisher for FailingPublisher {
		fn publish(&mut self, _reading: &PowerReading) -> Result<()> {
			self.attempts += 1;
			Err(Error::Publish {
				path: "/full/disk.prom".into(),
				source: std::io::Error::other("no space left on device"),
			})
		}
	}

	#[test]
	fn single_wrap_is_corrected_with_default_wrap_bound() {
		let config = Cli::try_parse_from(["epyc-power", "--interval", "20", "--rollover", "correct"])
			.unwrap()
			.into_config()
			.unwrap();
		let topology = CpuTopology::from_cores(vec![LogicalCore { id: 0, package: 1 }]).unwrap();
		let units = units();
		let registers = FakeRegisters::new();
		registers.set(0, AMD_ENERGY_CORE_MSR, &[4_294_967_290, 10]);
		registers.set(0, AMD_ENERGY_PKG_MSR, &[100, 200]);

		let monitor = PowerMonitor::new(&registers, &topology, &units, config.corrector, config.interval);
		let CycleOutcome::Reading(reading) = monitor.sample().unwrap() else {
			panic!("a single wrap within the default bound should be corrected");
		};
		let expected = 16.0 * 0.5_f64.powi(14) / reading.elapsed.as_secs_f64();
		assert!((reading.packages[0].cores_watts - expected).abs() < 1e-9);
	}

	#[test]
	fn publish_failure_does_not_stop_sampling() {
		let topology = topology();
		let units = units();
		let registers = FakeRegisters::new();
		registers.set(0, AMD_ENERGY_CORE_MSR, &[1, 2]);
		registers.set(2, AMD_ENERGY_CORE_MSR, &[1, 2]);
		registers.set(0, AMD_ENERGY_PKG_MSR, &[1, 2]);

		let corrector = RolloverCorrector::new(32, RolloverPolicy::Discard).unwrap();
		let monitor = PowerMonitor::new(&registers, &topology, &units, corrector, Duration::from_millis(1));
		let mut publisher = FailingPublisher { attempts: 0 };

		monitor.run(&mut publisher, true).unwrap();
		monitor.run(&mut publisher, true).unwrap();
		assert_eq!(publisher.attempts, 2);
	}

	#[test]
	fn read_failure_is_fatal() {
		let topology = topology();
		let units = units();
		let registers = FakeRegisters::new();
		registers.set(0, AMD_ENERGY_CORE_MSR, &[1]);

		let corrector = RolloverCorrector::new(32, RolloverPolicy::Discard).unwrap();
		let monitor = PowerMonitor::new(&registers, &topology, &units, corrector, Duration::from_millis(1));
		let mut publisher = RecordingPublisher::default();

		assert!(monitor.run(&mut publisher, false).is_err());
		assert!(publisher.published.is_empty());
	}
}
