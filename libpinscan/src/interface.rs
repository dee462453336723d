use std::time::{Duration, Instant};

use anyhow::{ensure, Result};

#[cfg(feature = "ftdi")]
pub mod ftdi_bitbang;

/// Physical line identifier (GPIO number, adapter pin index, ...)
pub type Line = u8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pull {
    None,
    Up,
    Down,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Output,
    Input(Pull),
}

/// Per-line access to the lines under test.
///
/// Implementations must switch and sample a line within a few microseconds,
/// the protocols are clocked by the caller one bit at a time.
pub trait PinBus {
    fn set_direction(&mut self, line: Line, direction: Direction) -> Result<()>;
    fn set_level(&mut self, line: Line, level: Level) -> Result<()>;
    fn read_level(&mut self, line: Line) -> Result<Level>;

    /// Busy-wait for at least `us` microseconds.
    fn delay_us(&mut self, us: u32) {
        if us == 0 {
            return;
        }
        let deadline = Instant::now() + Duration::from_micros(us.into());
        while Instant::now() < deadline {
            core::hint::spin_loop();
        }
    }

    fn drive(&mut self, line: Line, level: Level) -> Result<()> {
        self.set_direction(line, Direction::Output)?;
        self.set_level(line, level)
    }

    /// Put every line in `lines` back into a high impedance input.
    fn release(&mut self, lines: &[Line], pull: Pull) -> Result<()> {
        for line in lines {
            self.set_direction(*line, Direction::Input(pull))?;
        }
        Ok(())
    }
}

/// Fill `buf` from a reader that may return fewer bytes than asked for, giving
/// up after `tries` reads.
#[cfg_attr(not(feature = "ftdi"), allow(dead_code))]
pub(crate) fn read_exact<F>(buf: &mut [u8], tries: usize, mut read: F) -> Result<()>
where
    F: FnMut(&mut [u8]) -> Result<usize>,
{
    let mut filled = 0;
    for _ in 0..tries {
        if filled == buf.len() {
            break;
        }
        filled += read(&mut buf[filled..])?;
    }
    ensure!(
        filled == buf.len(),
        "got {} of {} bytes after {} reads",
        filled,
        buf.len(),
        tries
    );
    Ok(())
}
