// AMD RAPL MSR addresses
pub const AMD_ENERGY_UNIT_MSR: u64 = 0xC001_0299;
pub const AMD_ENERGY_CORE_MSR: u64 = 0xC001_029A;
pub const AMD_ENERGY_PKG_MSR: u64 = 0xC001_029B;

// Bitfields of the unit register
pub const POWER_UNIT_MASK: u64 = 0x0F;
pub const POWER_UNIT_SHIFT: u64 = 0;
pub const ENERGY_UNIT_MASK: u64 = 0x1F00;
pub const ENERGY_UNIT_SHIFT: u64 = 8;
pub const TIME_UNIT_MASK: u64 = 0xF_0000;
pub const TIME_UNIT_SHIFT: u64 = 16;

// Sysfs and device paths
pub const SYSFS_CPU_DIR: &str = "/sys/devices/system/cpu";
pub const MSR_DEVICE_DIR: &str = "/dev/cpu";
pub const MODPROBE_PATH: &str = "/usr/sbin/modprobe";

// Collection defaults
pub const DEFAULT_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_COUNTER_WIDTH: u32 = 32;
pub const DEFAULT_MAX_CPUS: usize = 1024;
pub const OUTPUT_FILE_NAME: &str = "epyc_power_collector.prom";
