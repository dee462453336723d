//! Structural checks of whatever answers on a role assignment.

use core::slice;

use anyhow::Result;
use log::trace;

use crate::idcode::IdCode;
use crate::interface::PinBus;
use crate::jtag::jtag::{bit_reverse, Jtag};
use crate::jtag::{MAX_DEVICES, MAX_IR_CHAIN_LEN, MAX_IR_LEN};

/// A verified chain: IDCODEs with index 0 nearest TDO, and the total
/// instruction register length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceChain {
    ids: Vec<IdCode>,
    ir_len: usize,
}

impl DeviceChain {
    pub(crate) fn new(ids: Vec<IdCode>, ir_len: usize) -> Self {
        DeviceChain { ids, ir_len }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn first(&self) -> Option<IdCode> {
        self.ids.first().copied()
    }

    pub fn as_slice(&self) -> &[IdCode] {
        &self.ids
    }

    pub fn iter(&self) -> slice::Iter<'_, IdCode> {
        self.ids.iter()
    }

    /// Sum of the IR lengths of every TAP, 0 if it could not be measured.
    pub fn ir_len(&self) -> usize {
        self.ir_len
    }
}

impl<'c> IntoIterator for &'c DeviceChain {
    type Item = &'c IdCode;
    type IntoIter = slice::Iter<'c, IdCode>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

pub fn is_valid_device_id(id: IdCode) -> bool {
    id.is_plausible()
}

impl<'a, B: PinBus> Jtag<'a, B> {
    /// Count the TAPs on the chain through their BYPASS registers.
    ///
    /// Every IR is filled with ones (BYPASS), the bypass path is flooded with
    /// ones and then zeros are fed in; the ones that drain out before the
    /// first zero are the one-bit bypass registers. Returns 0 when TDO never
    /// changes within `MAX_DEVICES` bits.
    pub fn detect_devices(&mut self) -> Result<usize> {
        self.restore_idle()?;
        self.enter_shift_ir()?;
        self.write_tdi(true)?;
        for _ in 0..MAX_IR_CHAIN_LEN {
            self.clock_pulse()?;
        }
        // Exit1-IR, Update-IR, Select-DR, Capture-DR, Shift-DR
        self.tms_sequence(&[true, true, true, false, false])?;

        for _ in 0..MAX_DEVICES {
            self.clock_pulse()?;
        }

        self.write_tdi(false)?;
        let mut count = 0;
        let mut drained = false;
        for _ in 0..=MAX_DEVICES {
            if !self.clock_pulse()? {
                drained = true;
                break;
            }
            count += 1;
        }

        // Exit1-DR, Update-DR, Run-Test/Idle
        self.tms_sequence(&[true, true, false])?;

        trace!("{}: {} bypass bits, drained: {}", self.pins(), count, drained);
        if !drained || count > MAX_DEVICES {
            return Ok(0);
        }
        Ok(count)
    }

    /// Total instruction register length of the chain.
    ///
    /// Equals `detect_devices()` only when every TAP has a one-bit IR. The
    /// chain is left with all IRs loaded with ones (BYPASS).
    pub fn ir_chain_length(&mut self) -> Result<usize> {
        self.restore_idle()?;
        self.enter_shift_ir()?;
        self.write_tdi(true)?;
        for _ in 0..MAX_IR_CHAIN_LEN {
            self.clock_pulse()?;
        }

        self.write_tdi(false)?;
        let mut length = 0;
        let mut drained = false;
        for _ in 0..=MAX_IR_CHAIN_LEN {
            if !self.clock_pulse()? {
                drained = true;
                break;
            }
            length += 1;
        }

        self.write_tdi(true)?;
        for _ in 1..MAX_IR_CHAIN_LEN {
            self.clock_pulse()?;
        }
        // last one on the way to Exit1-IR, then Update-IR, Run-Test/Idle
        self.tms_sequence(&[true, true, false])?;

        if !drained || length > MAX_IR_CHAIN_LEN {
            return Ok(0);
        }
        Ok(length)
    }

    /// Read `count` IDCODEs straight after reset, when every TAP that has
    /// one selects its IDCODE register.
    pub fn device_ids(&mut self, count: usize) -> Result<Vec<IdCode>> {
        self.restore_idle()?;
        self.enter_shift_dr()?;
        self.write_tdi(true)?;
        self.write_tms(false)?;

        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let mut word = 0u32;
            for _ in 0..32 {
                word = (word << 1) | self.clock_pulse()? as u32;
            }
            ids.push(IdCode::new(bit_reverse(word, 32)));
        }

        self.restore_idle()?;
        Ok(ids)
    }

    /// Put `count` TAPs into BYPASS and shift `pattern` through them.
    ///
    /// A chain of exactly `count` TAPs delays the pattern by `count` bits;
    /// shifting `32 + count` bits and keeping the last 32 gives the pattern
    /// back. Returns 0 for a count outside `1..=MAX_DEVICES`.
    pub fn bypass_test(&mut self, count: usize, pattern: u32) -> Result<u32> {
        if count == 0 || count > MAX_DEVICES {
            return Ok(0);
        }
        self.restore_idle()?;
        self.enter_shift_ir()?;
        self.write_tdi(true)?;
        for _ in 0..count * MAX_IR_LEN {
            self.clock_pulse()?;
        }
        // Exit1-IR, Update-IR, Run-Test/Idle
        self.tms_sequence(&[true, true, false])?;

        let echo = self.send_data(pattern, 32 + count)?;
        Ok(bit_reverse(echo, 32))
    }
}
