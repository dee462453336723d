use anyhow::Result;
use bitflags::bitflags;
use log::{debug, trace, warn};

use crate::idcode::IdCode;
use crate::interface::{Direction, Level, PinBus, Pull};
use crate::swd::SwdPins;

/// SWD needs at least 50 cycles with SWDIO high.
pub const LINE_RESET_CYCLES: usize = 52 + 10;
pub const JTAG_TO_SWD: u16 = 0xE79E;
pub const SWD_TO_JTAG: u16 = 0xE73C;
pub const ACTIVATION_CODE: u8 = 0x1A;

/// Selection alert that takes an SWJ-DP out of the dormant state.
const SELECTION_ALERT: [u8; 16] = [
    0x92, 0xF3, 0x09, 0x62, 0x95, 0x2D, 0x85, 0x86, 0xE9, 0xAF, 0xDD, 0xE3, 0xA2, 0x0E, 0xBC, 0x19,
];

/// DP register holding the IDCODE on read.
pub const DP_IDCODE: u8 = 0x00;

bitflags! {
    /// Packet request header, bit 0 is sent first.
    pub struct SwdRequest: u8 {
        const START = 1;
        const APNDP = 1 << 1;
        const RNW = 1 << 2;
        const A2 = 1 << 3;
        const A3 = 1 << 4;
        const PARITY = 1 << 5;
        const STOP = 1 << 6;
        const PARK = 1 << 7;
    }
}

impl SwdRequest {
    /// Header for an access to register `addr` (byte address, bits 3:2 used).
    pub fn new(ap: bool, read: bool, addr: u8) -> Self {
        let mut request = SwdRequest::START | SwdRequest::PARK;
        request.set(SwdRequest::APNDP, ap);
        request.set(SwdRequest::RNW, read);
        request.set(SwdRequest::A2, addr & 0b0100 != 0);
        request.set(SwdRequest::A3, addr & 0b1000 != 0);

        let payload = SwdRequest::APNDP | SwdRequest::RNW | SwdRequest::A2 | SwdRequest::A3;
        let parity = (request & payload).bits().count_ones() % 2 == 1;
        request.set(SwdRequest::PARITY, parity);
        request
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ack {
    Ok,
    Wait,
    Fault,
    Invalid(u8),
}

impl From<u8> for Ack {
    fn from(ack: u8) -> Self {
        match ack {
            0b001 => Ack::Ok,
            0b010 => Ack::Wait,
            0b100 => Ack::Fault,
            other => Ack::Invalid(other),
        }
    }
}

/// Bit-banged serial wire driver bound to one role assignment.
pub struct Swd<'a, B: PinBus> {
    bus: &'a mut B,
    pins: SwdPins,
    pull: Pull,
    half_period_us: u32,
}

impl<'a, B: PinBus> Swd<'a, B> {
    /// Claims both lines as outputs, driven high.
    pub fn new(bus: &'a mut B, pins: SwdPins, pull: Pull, half_period_us: u32) -> Result<Self> {
        bus.drive(pins.swdio, Level::High)?;
        bus.drive(pins.swclk, Level::High)?;
        Ok(Swd {
            bus,
            pins,
            pull,
            half_period_us,
        })
    }

    pub fn pins(&self) -> SwdPins {
        self.pins
    }

    /// One SWCLK cycle, the target samples on the rising edge.
    pub fn clock_pulse(&mut self) -> Result<()> {
        self.bus.set_level(self.pins.swclk, Level::Low)?;
        self.bus.delay_us(self.half_period_us);
        self.bus.set_level(self.pins.swclk, Level::High)?;
        self.bus.delay_us(self.half_period_us);
        Ok(())
    }

    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.bus.set_level(self.pins.swdio, bit.into())?;
        self.clock_pulse()
    }

    /// Send the low `bits` bits of `value`, LSB first.
    pub fn write_bits(&mut self, value: u32, bits: usize) -> Result<()> {
        for i in 0..bits {
            self.write_bit((value >> i) & 1 != 0)?;
        }
        Ok(())
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        let bit = self.bus.read_level(self.pins.swdio)?.is_high();
        self.clock_pulse()?;
        Ok(bit)
    }

    pub fn set_read_mode(&mut self) -> Result<()> {
        self.bus
            .set_direction(self.pins.swdio, Direction::Input(self.pull))
    }

    pub fn set_write_mode(&mut self) -> Result<()> {
        self.bus.set_direction(self.pins.swdio, Direction::Output)
    }

    pub fn line_reset(&mut self) -> Result<()> {
        self.set_write_mode()?;
        self.bus.set_level(self.pins.swdio, Level::High)?;
        for _ in 0..LINE_RESET_CYCLES {
            self.clock_pulse()?;
        }
        Ok(())
    }

    /// Wake a dormant SWJ-DP: selection alert followed by the SW-DP
    /// activation code.
    pub fn arm_wake_up(&mut self) -> Result<()> {
        self.set_write_mode()?;
        self.bus.set_level(self.pins.swdio, Level::High)?;
        for _ in 0..8 {
            self.clock_pulse()?;
        }
        for byte in SELECTION_ALERT {
            self.write_bits(byte.into(), 8)?;
        }
        self.write_bits(0, 4)?;
        self.write_bits(ACTIVATION_CODE.into(), 8)
    }

    pub fn jtag_to_swd(&mut self) -> Result<()> {
        self.line_reset()?;
        self.write_bits(JTAG_TO_SWD.into(), 16)
    }

    pub fn swd_to_jtag(&mut self) -> Result<()> {
        self.line_reset()?;
        self.write_bits(SWD_TO_JTAG.into(), 16)
    }

    /// Three ACK bits, LSB first.
    pub fn read_ack(&mut self) -> Result<Ack> {
        let mut ack = 0u8;
        for i in 0..3 {
            ack |= (self.read_bit()? as u8) << i;
        }
        Ok(Ack::from(ack))
    }

    /// Select SWD and read the DP IDCODE. `None` when the target does not
    /// acknowledge the request with OK.
    pub fn read_idcode(&mut self) -> Result<Option<IdCode>> {
        self.arm_wake_up()?;
        self.jtag_to_swd()?;
        self.line_reset()?;
        self.write_bits(0, 4)?;

        let request = SwdRequest::new(false, true, DP_IDCODE);
        self.write_bits(request.bits().into(), 8)?;

        // turnaround
        self.set_read_mode()?;
        self.clock_pulse()?;

        let ack = self.read_ack()?;
        if ack != Ack::Ok {
            trace!("{}: ack {:?}", self.pins, ack);
            return Ok(None);
        }

        let mut value = 0u32;
        let mut parity = false;
        for i in 0..32 {
            let bit = self.read_bit()?;
            parity ^= bit;
            value |= (bit as u32) << i;
        }
        let parity_expected = self.read_bit()?;
        if parity != parity_expected {
            warn!("{}: parity mismatch on IDCODE {:#010x}", self.pins, value);
        }

        self.set_write_mode()?;
        self.clock_pulse()?;

        debug!("{}: IDCODE {:#010x}", self.pins, value);
        Ok(Some(IdCode::new(value)))
    }
}
