use anyhow::{ensure, Context, Result};
use log::{debug, info};

use crate::interface::{read_exact, Direction, Level, Line, PinBus};

/// Lines 0 to 7 map to ADBUS0..ADBUS7.
pub const LINES: usize = 8;

// reads of a sample before the adapter is declared unresponsive
const READ_TRIES: usize = 16;

/// Synchronous bit-bang on the first channel of an FTDI adapter.
///
/// Every line can be switched between input and output on its own. The chip
/// keeps its fixed weak pull-ups on inputs, the requested `Pull` is not
/// applied.
pub struct FtdiBitBang {
    device: safe_ftdi::Context,
    // bit set = output
    direction: u8,
    output: u8,
}

impl FtdiBitBang {
    pub fn new(vid: u16, pid: u16) -> Result<Self> {
        let mut device = safe_ftdi::Context::new().context("failed to create ftdi context")?;
        device
            .open(vid, pid)
            .with_context(|| format!("failed to open {:#06x}:{:#06x}", vid, pid))?;
        device
            .set_baudrate(10000)
            .context("failed to set baudrate")?;
        device
            .set_bitmode(0, safe_ftdi::mpsse::MpsseMode::BITMODE_SYNCBB)
            .context("failed to enter synchronous bit-bang mode")?;
        device
            .purge_usb_rx_buffer()
            .context("failed to purge rx buffer")?;
        info!("opened {:#06x}:{:#06x}, all lines input", vid, pid);

        Ok(FtdiBitBang {
            device,
            direction: 0,
            output: 0,
        })
    }

    /// Put the output byte on the pins and return what the pins read.
    ///
    /// Every byte written in synchronous mode clocks exactly one sample back,
    /// so stale samples are dropped first and the read waits for this one.
    fn transfer(&mut self) -> Result<u8> {
        self.device
            .purge_usb_rx_buffer()
            .context("failed to purge rx buffer")?;
        self.device
            .write_data(&[self.output])
            .context("failed to write pins")?;
        let mut pins = [0u8; 1];
        let device = &self.device;
        read_exact(&mut pins, READ_TRIES, |buf| {
            let n = device.read_data(buf).context("failed to read pins")?;
            Ok(n as usize)
        })?;
        Ok(pins[0])
    }

    fn bit(line: Line) -> Result<u8> {
        ensure!(
            usize::from(line) < LINES,
            "line {} does not exist, the adapter has {}",
            line,
            LINES
        );
        Ok(1 << line)
    }
}

impl PinBus for FtdiBitBang {
    fn set_direction(&mut self, line: Line, direction: Direction) -> Result<()> {
        let bit = Self::bit(line)?;
        let mask = match direction {
            Direction::Output => self.direction | bit,
            Direction::Input(_) => self.direction & !bit,
        };
        if mask == self.direction {
            return Ok(());
        }
        debug!("direction mask {:#010b}", mask);
        self.device
            .set_bitmode(mask, safe_ftdi::mpsse::MpsseMode::BITMODE_SYNCBB)
            .context("failed to set pin directions")?;
        self.direction = mask;
        Ok(())
    }

    fn set_level(&mut self, line: Line, level: Level) -> Result<()> {
        let bit = Self::bit(line)?;
        match level {
            Level::High => self.output |= bit,
            Level::Low => self.output &= !bit,
        }
        self.transfer()?;
        Ok(())
    }

    fn read_level(&mut self, line: Line) -> Result<Level> {
        let bit = Self::bit(line)?;
        let pins = self.transfer()?;
        Ok((pins & bit != 0).into())
    }
}
