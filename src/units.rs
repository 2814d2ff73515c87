use std::collections::BTreeMap;

use log::{info, warn};

use crate::constants::*;
use crate::error::Result;
use crate::topology::CpuTopology;
use crate::util::msr::RegisterSource;

/// Scale factors decoded from the RAPL unit register
///
/// Each factor is `0.5^field`: raw counter units times the factor gives
/// seconds, joules or watts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationUnits {
	pub time_unit: f64,
	pub energy_unit: f64,
	pub power_unit: f64,
}

impl CalibrationUnits {
	/// Decodes the three bitfields of a raw unit register value
	pub fn from_raw(raw: u64) -> Self {
		let field = |mask: u64, shift: u64| 0.5_f64.powi(((raw & mask) >> shift) as i32);
		Self {
			time_unit: field(TIME_UNIT_MASK, TIME_UNIT_SHIFT),
			energy_unit: field(ENERGY_UNIT_MASK, ENERGY_UNIT_SHIFT),
			power_unit: field(POWER_UNIT_MASK, POWER_UNIT_SHIFT),
		}
	}
}

/// Calibration units per package id
pub type PackageUnits = BTreeMap<usize, CalibrationUnits>;

/// Reads the unit register once per package, from its representative core
pub fn calibrate(source: &dyn RegisterSource, topology: &CpuTopology) -> Result<PackageUnits> {
	let mut units = PackageUnits::new();
	for (&package, &cpu) in topology.representatives() {
		let raw = source.read(cpu, AMD_ENERGY_UNIT_MSR)?;
		let decoded = CalibrationUnits::from_raw(raw);
		info!(
			"Package {package}: energy unit {} J, time unit {} s, power unit {} W",
			decoded.energy_unit, decoded.time_unit, decoded.power_unit
		);
		units.insert(package, decoded);
	}

	let mut values = units.values();
	if let Some(first) = values.next() {
		if values.any(|u| u != first) {
			warn!("Packages report different calibration units, each package uses its own");
		}
	}

	Ok(units)
}
