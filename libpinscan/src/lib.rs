pub mod idcode;
pub mod interface;
pub mod jtag;
pub mod scan;
pub mod swd;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(feature = "ftdi")]
pub use crate::interface::ftdi_bitbang;
pub use crate::idcode::IdCode;
pub use crate::interface::{Direction, Level, Line, PinBus, Pull};
pub use crate::scan::{scan, Protocol, ScanConfig, ScanError, ScanProgress, ScanResult};
