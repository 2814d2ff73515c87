use std::time::Duration;

use crate::energy::EnergyDeltas;
use crate::error::{Error, Result};
use crate::units::PackageUnits;

/// Average power of one package over a sampling cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackagePowerReading {
	pub package: usize,
	/// Sum over the package's tracked cores, in watts
	pub cores_watts: f64,
	/// Whole package, in watts
	pub package_watts: f64,
}

/// Power readings for every known package, ordered by package id
#[derive(Debug, Clone, PartialEq)]
pub struct PowerReading {
	pub packages: Vec<PackagePowerReading>,
	pub elapsed: Duration,
}

/// Converts a raw energy delta into average watts
pub fn watts(delta: impl Into<u128>, energy_unit: f64, elapsed_secs: f64) -> Result<f64> {
	if !(elapsed_secs > 0.0) {
		return Err(Error::InvalidElapsed(elapsed_secs));
	}
	Ok(delta.into() as f64 * energy_unit / elapsed_secs)
}

impl PowerReading {
	/// Derives per-package watts from corrected deltas
	///
	/// A package is reported when both its package delta and its calibration
	/// are known; `cores_watts` is zero if none of its cores were sampled.
	pub fn derive(deltas: &EnergyDeltas, units: &PackageUnits, elapsed: Duration) -> Result<Self> {
		let elapsed_secs = elapsed.as_secs_f64();
		let mut packages = Vec::with_capacity(deltas.packages.len());

		for (&package, &package_delta) in &deltas.packages {
			let Some(unit) = units.get(&package) else {
				continue;
			};
			let cores_delta = deltas.cores.get(&package).copied().unwrap_or(0);
			packages.push(PackagePowerReading {
				package,
				cores_watts: watts(cores_delta, unit.energy_unit, elapsed_secs)?,
				package_watts: watts(package_delta, unit.energy_unit, elapsed_secs)?,
			});
		}

		Ok(Self { packages, elapsed })
	}
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use super::*;
	use crate::units::CalibrationUnits;

	const ENERGY_UNIT_14: f64 = 0.00006103515625;

	#[test]
	fn one_million_units_over_five_seconds() {
		let w = watts(1_000_000u64, ENERGY_UNIT_14, 5.0).unwrap();
		assert!((w - 12.207_031_25).abs() < 1e-9);
	}

	#[test]
	fn doubling_elapsed_halves_watts() {
		let short = watts(123_456u64, ENERGY_UNIT_14, 2.0).unwrap();
		let long = watts(123_456u64, ENERGY_UNIT_14, 4.0).unwrap();
		assert!((short - 2.0 * long).abs() < 1e-12);
	}

	#[test]
	fn zero_elapsed_is_rejected() {
		assert!(matches!(watts(1u64, 1.0, 0.0), Err(Error::InvalidElapsed(_))));
		assert!(watts(1u64, 1.0, f64::NAN).is_err());
	}

	#[test]
	fn wide_core_sum_converts_to_watts() {
		let w = watts(2 * u128::from(u64::MAX), 0.5_f64.powi(16), 1.0).unwrap();
		assert!(w.is_finite() && w > 5.6e14);
	}

	#[test]
	fn derives_both_values_per_package() {
		let deltas = EnergyDeltas {
			cores: BTreeMap::from([(0, 800u128)]),
			packages: BTreeMap::from([(0, 1_600), (1, 320)]),
		};
		let units: PackageUnits = BTreeMap::from([
			(0, CalibrationUnits::from_raw(0)),
			(1, CalibrationUnits::from_raw(1 << 8)),
		]);

		let reading = PowerReading::derive(&deltas, &units, Duration::from_secs(2)).unwrap();
		assert_eq!(
			reading.packages,
			vec![
				PackagePowerReading {
					package: 0,
					cores_watts: 400.0,
					package_watts: 800.0,
				},
				PackagePowerReading {
					package: 1,
					cores_watts: 0.0,
					package_watts: 80.0,
				},
			]
		);
	}
}
