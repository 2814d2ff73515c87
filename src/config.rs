use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::constants::*;
use crate::error::{Error, Result};
use crate::rollover::{RolloverCorrector, RolloverPolicy};
use crate::topology::EnumerationPolicy;

/// Per-package CPU power collector for AMD energy MSRs
#[derive(Parser, Debug, Clone)]
#[command(author, version)]
pub struct Cli {
	/// Time between the two snapshots of a cycle, in milliseconds.
	#[arg(short, long, default_value_t = DEFAULT_INTERVAL_MS)]
	pub interval: u64,

	/// Bit width of the energy counters.
	#[arg(long, default_value_t = DEFAULT_COUNTER_WIDTH)]
	pub counter_width: u32,

	/// What to do when a counter wraps during a cycle.
	#[arg(long, value_enum, default_value_t = RolloverMode::Discard)]
	pub rollover: RolloverMode,

	/// Longest cycle, in milliseconds, over which a single wrap is corrected.
	/// Defaults to twice the interval.
	#[arg(long)]
	pub max_wrap_interval: Option<u64>,

	/// How logical cpu numbers are enumerated.
	#[arg(long, value_enum, default_value_t = EnumerationMode::StopAtGap)]
	pub enumeration: EnumerationMode,

	/// Highest number of logical cpus looked at during enumeration.
	#[arg(long, default_value_t = DEFAULT_MAX_CPUS)]
	pub max_cpus: usize,

	/// Exposition file, defaults to $TEMP/prometheus/epyc_power_collector.prom.
	#[arg(short, long)]
	pub output: Option<PathBuf>,

	/// Prefix prepended to every metric name, e.g. "node_".
	#[arg(long, default_value = "")]
	pub metric_prefix: String,

	/// Times a failed register read is retried before giving up.
	#[arg(long, default_value_t = 0)]
	pub read_retries: u32,

	/// Run a single cycle and exit.
	#[arg(long)]
	pub once: bool,

	/// Don't try to load the msr driver.
	#[arg(long)]
	pub no_modprobe: bool,

	/// Don't check that the CPU vendor is AMD.
	#[arg(long)]
	pub skip_vendor_check: bool,
}

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
pub enum RolloverMode {
	/// Discard the cycle on any wrap.
	Discard,
	/// Correct a single wrap within --max-wrap-interval.
	Correct,
}

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
pub enum EnumerationMode {
	/// Stop at the first missing cpu number.
	StopAtGap,
	/// Scan every number up to --max-cpus.
	ScanAll,
}

/// Validated collector settings
#[derive(Debug, Clone)]
pub struct Config {
	pub interval: Duration,
	pub corrector: RolloverCorrector,
	pub enumeration: EnumerationPolicy,
	pub output: PathBuf,
	pub metric_prefix: String,
	pub read_retries: u32,
	pub once: bool,
	pub load_driver: bool,
	pub check_vendor: bool,
}

impl Cli {
	pub fn into_config(self) -> Result<Config> {
		if self.interval == 0 {
			return Err(Error::InvalidConfig("interval must be greater than zero".into()));
		}
		if self.max_cpus == 0 {
			return Err(Error::InvalidConfig("max-cpus must be greater than zero".into()));
		}

		let interval = Duration::from_millis(self.interval);
		let policy = match self.rollover {
			RolloverMode::Discard => RolloverPolicy::Discard,
			RolloverMode::Correct => {
				// A cycle always lasts longer than the interval: the sleep plus two
				// rounds of register reads
				let max_wrap_interval = self.max_wrap_interval.unwrap_or(self.interval.saturating_mul(2));
				if max_wrap_interval <= self.interval {
					return Err(Error::InvalidConfig(format!(
						"max-wrap-interval ({max_wrap_interval} ms) must be longer than the interval ({} ms), \
						 otherwise every wrap would be discarded",
						self.interval
					)));
				}
				let max_interval = Duration::from_millis(max_wrap_interval);
				RolloverPolicy::CorrectSingleWrap { max_interval }
			},
		};

		let enumeration = match self.enumeration {
			EnumerationMode::StopAtGap => EnumerationPolicy::StopAtFirstGap { limit: self.max_cpus },
			EnumerationMode::ScanAll => EnumerationPolicy::ScanAll { limit: self.max_cpus },
		};

		Ok(Config {
			interval,
			corrector: RolloverCorrector::new(self.counter_width, policy)?,
			enumeration,
			output: self.output.unwrap_or_else(default_output),
			metric_prefix: self.metric_prefix,
			read_retries: self.read_retries,
			once: self.once,
			load_driver: !self.no_modprobe,
			check_vendor: !self.skip_vendor_check,
		})
	}
}

/// `$TEMP/prometheus/<file>`, with `/tmp` when `TEMP` is unset
fn default_output() -> PathBuf {
	let temp = std::env::var_os("TEMP").map(PathBuf::from).unwrap_or_else(std::env::temp_dir);
	temp.join("prometheus").join(OUTPUT_FILE_NAME)
}
