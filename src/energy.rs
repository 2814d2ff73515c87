use std::collections::BTreeMap;
use std::time::Duration;

use crate::constants::{AMD_ENERGY_CORE_MSR, AMD_ENERGY_PKG_MSR};
use crate::error::Result;
use crate::rollover::RolloverCorrector;
use crate::topology::CpuTopology;
use crate::util::msr::RegisterSource;

/// Snapshot of energy readings from CPU registers
///
/// Core counters are keyed by logical cpu. The package counter is broadcast
/// identically to every core of a package, so it is read once from the
/// package's representative core and keyed by package id only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnergySnapshot {
	/// Logical cpu id -> raw core energy counter
	pub cores: BTreeMap<usize, u64>,

	/// Package id -> raw package energy counter
	pub packages: BTreeMap<usize, u64>,
}

impl EnergySnapshot {
	/// Reads every tracked core counter, then one package counter per package
	///
	/// Reads are sequential, so the last core is sampled slightly after the first.
	pub fn read(source: &dyn RegisterSource, topology: &CpuTopology) -> Result<Self> {
		let mut cores = BTreeMap::new();
		for core in topology.cores() {
			cores.insert(core.id, source.read(core.id, AMD_ENERGY_CORE_MSR)?);
		}

		let mut packages = BTreeMap::new();
		for (&package, &cpu) in topology.representatives() {
			packages.insert(package, source.read(cpu, AMD_ENERGY_PKG_MSR)?);
		}

		Ok(Self { cores, packages })
	}
}

/// Corrected energy deltas between two snapshots, in raw counter units
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnergyDeltas {
	/// Package id -> sum of the core deltas of its tracked cores, wide enough
	/// for many full 64-bit deltas
	pub cores: BTreeMap<usize, u128>,
	/// Package id -> package counter delta
	pub packages: BTreeMap<usize, u64>,
}

impl EnergyDeltas {
	/// Corrects and aggregates the deltas between `first` and `second`
	///
	/// Returns `None` when any counter wrapped in a way the corrector can't
	/// trust; the cycle must then be discarded as a whole.
	pub fn between(
		first: &EnergySnapshot,
		second: &EnergySnapshot,
		topology: &CpuTopology,
		corrector: &RolloverCorrector,
		elapsed: Duration,
	) -> Option<Self> {
		let mut deltas = EnergyDeltas::default();

		for core in topology.cores() {
			let (Some(&before), Some(&after)) = (first.cores.get(&core.id), second.cores.get(&core.id)) else {
				continue;
			};
			let delta = corrector.correct(before, after, elapsed)?;
			*deltas.cores.entry(core.package).or_insert(0) += u128::from(delta);
		}

		for (&package, &before) in &first.packages {
			if let Some(&after) = second.packages.get(&package) {
				deltas.packages.insert(package, corrector.correct(before, after, elapsed)?);
			}
		}

		Some(deltas)
	}
}
