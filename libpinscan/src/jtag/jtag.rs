use anyhow::Result;
use rust_fsm::*;

use crate::interface::{Direction, Level, PinBus, Pull};
use crate::jtag::jtag_state_machine::{JtagState as JS, JtagStateMachine};
use crate::jtag::JtagPins;

/// Reverse the order of the low `bits` bits of `value`.
pub fn bit_reverse(value: u32, bits: usize) -> u32 {
    match bits {
        0 => 0,
        1..=31 => value.reverse_bits() >> (32 - bits),
        _ => value.reverse_bits(),
    }
}

/// Bit-banged TAP driver bound to one role assignment.
///
/// The driver keeps no knowledge of where the TAP is: every multi-step
/// operation begins from Run-Test/Idle and ends there, reaching it with
/// `restore_idle()` when in doubt. The TMS stream is mirrored into a TAP
/// model only so the walk can be traced and inspected.
pub struct Jtag<'a, B: PinBus> {
    bus: &'a mut B,
    pins: JtagPins,
    half_period_us: u32,
    tms: bool,
    tdo: bool,
    state_machine: StateMachine<JtagStateMachine>,
}

impl<'a, B: PinBus> Jtag<'a, B> {
    /// Claims the lines of `pins`: TCK, TMS and TDI become outputs (TCK low),
    /// TDO an input with `pull`, TRST if present is driven high (released).
    pub fn new(bus: &'a mut B, pins: JtagPins, pull: Pull, half_period_us: u32) -> Result<Self> {
        bus.drive(pins.tck, Level::Low)?;
        bus.drive(pins.tms, Level::Low)?;
        bus.drive(pins.tdi, Level::Low)?;
        bus.set_direction(pins.tdo, Direction::Input(pull))?;
        if let Some(trst) = pins.trst {
            bus.drive(trst, Level::High)?;
        }

        Ok(Jtag {
            bus,
            pins,
            half_period_us,
            tms: false,
            tdo: false,
            state_machine: StateMachine::new(),
        })
    }

    pub fn pins(&self) -> JtagPins {
        self.pins
    }

    /// TAP state as tracked from the TMS stream; meaningful after `restore_idle()`.
    pub fn state(&self) -> JS {
        *self.state_machine.state()
    }

    /// One TCK cycle. TDO is sampled while TCK is high.
    pub fn clock_pulse(&mut self) -> Result<bool> {
        self.bus.set_level(self.pins.tck, Level::High)?;
        self.bus.delay_us(self.half_period_us);
        self.tdo = self.bus.read_level(self.pins.tdo)?.is_high();
        self.bus.set_level(self.pins.tck, Level::Low)?;
        self.bus.delay_us(self.half_period_us);

        // every (state, TMS) pair has a successor
        let _ = self.state_machine.consume(&self.tms);
        Ok(self.tdo)
    }

    pub fn write_tdi(&mut self, tdi: bool) -> Result<()> {
        self.bus.set_level(self.pins.tdi, tdi.into())
    }

    pub fn write_tms(&mut self, tms: bool) -> Result<()> {
        self.tms = tms;
        self.bus.set_level(self.pins.tms, tms.into())
    }

    /// Level sampled on TDO by the last clock pulse.
    pub fn read_bit(&self) -> bool {
        self.tdo
    }

    /// Clock out `tms` one level per cycle.
    pub fn tms_sequence(&mut self, tms: &[bool]) -> Result<()> {
        for level in tms {
            self.write_tms(*level)?;
            self.clock_pulse()?;
        }
        Ok(())
    }

    /// Test-Logic-Reset from any state, then one extra cycle in Run-Test/Idle.
    pub fn restore_idle(&mut self) -> Result<()> {
        self.tms_sequence(&[true, true, true, true, true, false, false])
    }

    /// Run-Test/Idle -> Select-DR -> Capture-DR -> Shift-DR
    pub fn enter_shift_dr(&mut self) -> Result<()> {
        self.tms_sequence(&[true, false, false])
    }

    /// Run-Test/Idle -> Select-DR -> Select-IR -> Capture-IR -> Shift-IR
    pub fn enter_shift_ir(&mut self) -> Result<()> {
        self.tms_sequence(&[true, true, false, false])
    }

    /// Shift `bits` bits of `pattern` out of TDI, LSB first, while sampling
    /// TDO. TMS goes high on the last bit so the TAP leaves the shift state
    /// (Exit1).
    ///
    /// Sampled bits are accumulated MSB first in arrival order and only the
    /// last 32 are kept; use `bit_reverse` to get them back in shift order.
    pub fn shift_array(&mut self, pattern: u32, bits: usize) -> Result<u32> {
        let mut pattern = pattern;
        let mut result = 0u32;
        for i in 1..=bits {
            if i == bits {
                self.write_tms(true)?;
            }
            self.write_tdi(pattern & 1 != 0)?;
            pattern >>= 1;
            result = (result << 1) | self.clock_pulse()? as u32;
        }
        Ok(result)
    }

    /// Shift `bits` of `pattern` through DR and return to Run-Test/Idle via Update-DR.
    pub fn send_data(&mut self, pattern: u32, bits: usize) -> Result<u32> {
        self.enter_shift_dr()?;
        let out = self.shift_array(pattern, bits)?;
        // Exit1-DR -> Update-DR -> Run-Test/Idle
        self.tms_sequence(&[true, false])?;
        Ok(out)
    }
}
