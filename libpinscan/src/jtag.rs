use core::fmt;

use crate::interface::Line;

pub mod chain;
pub mod jtag;
pub mod jtag_state_machine;
pub mod scan;

/// Longest chain the search will look for.
pub const MAX_DEVICES: usize = 32;
/// Widest instruction register assumed for a single TAP.
pub const MAX_IR_LEN: usize = 32;
pub const MAX_IR_CHAIN_LEN: usize = MAX_DEVICES * MAX_IR_LEN;

/// Role assignment of candidate lines to the TAP signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JtagPins {
    pub tck: Line,
    pub tms: Line,
    pub tdi: Line,
    pub tdo: Line,
    pub trst: Option<Line>,
}

impl JtagPins {
    pub fn new(tck: Line, tms: Line, tdi: Line, tdo: Line) -> Self {
        JtagPins {
            tck,
            tms,
            tdi,
            tdo,
            trst: None,
        }
    }

    pub fn uses(&self, line: Line) -> bool {
        [self.tck, self.tms, self.tdi, self.tdo].contains(&line) || self.trst == Some(line)
    }
}

impl fmt::Display for JtagPins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TCK={} TMS={} TDI={} TDO={}",
            self.tck, self.tms, self.tdi, self.tdo
        )?;
        if let Some(trst) = self.trst {
            write!(f, " TRST={}", trst)?;
        }
        Ok(())
    }
}
