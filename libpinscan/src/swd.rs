use core::fmt;

use crate::interface::Line;

pub mod dap;
pub mod scan;

/// Role assignment of candidate lines to the serial wire signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwdPins {
    pub swclk: Line,
    pub swdio: Line,
}

impl SwdPins {
    pub fn new(swclk: Line, swdio: Line) -> Self {
        SwdPins { swclk, swdio }
    }
}

impl fmt::Display for SwdPins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SWCLK={} SWDIO={}", self.swclk, self.swdio)
    }
}
