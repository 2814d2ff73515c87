pub mod driver;
pub mod msr;
