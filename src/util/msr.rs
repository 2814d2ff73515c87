use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use log::{debug, warn};

use crate::constants::MSR_DEVICE_DIR;
use crate::error::{Error, Result};

/// Source of raw 64-bit register values for a logical cpu
pub trait RegisterSource {
	/// Reads the register at `offset` on logical cpu `cpu`
	fn read(&self, cpu: usize, offset: u64) -> Result<u64>;
}

/// Table of `/dev/cpu/<N>/msr` handles, opened once and held until drop
#[derive(Debug)]
pub struct MsrDevices {
	devices: BTreeMap<usize, File>,
	retries: u32,
}

impl MsrDevices {
	/// Opens the msr device of every cpu in `cpus`
	///
	/// A cpu that is present in the topology but whose device can't be opened
	/// is fatal: there is no degraded mode.
	pub fn open(cpus: impl IntoIterator<Item = usize>, retries: u32) -> Result<Self> {
		let mut devices = BTreeMap::new();
		for cpu in cpus {
			let path = device_path(cpu);
			let file = File::open(&path).map_err(|source| Error::DeviceOpen { cpu, path, source })?;
			devices.insert(cpu, file);
		}
		debug!("Opened {} msr devices", devices.len());
		Ok(Self { devices, retries })
	}

	pub fn len(&self) -> usize {
		self.devices.len()
	}

	pub fn is_empty(&self) -> bool {
		self.devices.is_empty()
	}
}

impl RegisterSource for MsrDevices {
	fn read(&self, cpu: usize, offset: u64) -> Result<u64> {
		let file = self.devices.get(&cpu).ok_or_else(|| Error::Msr {
			cpu,
			offset,
			source: io::Error::new(io::ErrorKind::NotFound, "no msr handle for this cpu"),
		})?;

		let mut attempt = 0;
		loop {
			match read_msr(file, offset) {
				Ok(value) => return Ok(value),
				Err(e) if attempt < self.retries => {
					attempt += 1;
					warn!("MSR {offset:#x} read on cpu {cpu} failed ({e}), retry {attempt}/{}", self.retries);
				},
				Err(source) => return Err(Error::Msr { cpu, offset, source }),
			}
		}
	}
}

/// Path of the msr character device for a logical cpu
pub fn device_path(cpu: usize) -> PathBuf {
	PathBuf::from(format!("{MSR_DEVICE_DIR}/{cpu}/msr"))
}

/// Reads one MSR as an 8-byte little-endian value at `offset` of an open device
pub fn read_msr(file: &File, offset: u64) -> io::Result<u64> {
	let mut buf = [0u8; 8];
	file.read_exact_at(&mut buf, offset)?;
	Ok(u64::from_le_bytes(buf))
}
