//! Simulated targets for exercising the engines without hardware.
//!
//! `FakeBus` models every line as a latch plus a direction. A chain of
//! IEEE 1149.1 TAPs and an SWD-DP can be attached to arbitrary lines; they
//! only react to edges on the line they are really wired to, so a wrong role
//! assignment behaves like it would on a board.

use std::collections::HashMap;

use anyhow::{bail, Result};
use rust_fsm::*;

use crate::interface::{Direction, Level, Line, PinBus, Pull};
use crate::jtag::jtag_state_machine::{JtagState, JtagStateMachine};

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Copy, Debug)]
struct LineState {
    direction: Direction,
    latch: Level,
}

impl Default for LineState {
    fn default() -> Self {
        LineState {
            direction: Direction::Input(Pull::None),
            latch: Level::Low,
        }
    }
}

impl LineState {
    fn level(&self) -> Level {
        match self.direction {
            Direction::Output => self.latch,
            Direction::Input(Pull::Up) => Level::High,
            Direction::Input(_) => Level::Low,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct TapWiring {
    pub tck: Line,
    pub tms: Line,
    pub tdi: Line,
    pub tdo: Line,
    pub trst: Option<Line>,
}

struct SimTap {
    fsm: StateMachine<JtagStateMachine>,
    ir_len: usize,
    idcode: Option<u32>,
    // None until something is written through Update-IR
    ir: Option<u64>,
    shift: u64,
    shift_len: usize,
    tdo: Option<bool>,
}

impl SimTap {
    fn new(ir_len: usize, idcode: Option<u32>) -> Self {
        SimTap {
            fsm: StateMachine::new(),
            ir_len,
            idcode,
            ir: None,
            shift: 0,
            shift_len: 1,
            tdo: None,
        }
    }

    fn state(&self) -> JtagState {
        *self.fsm.state()
    }

    fn reset(&mut self) {
        self.fsm = StateMachine::new();
        self.ir = None;
        self.tdo = None;
    }

    fn rising(&mut self, tms: bool, tdi: bool) {
        match self.state() {
            JtagState::Reset => self.ir = None,
            JtagState::CaptureIR => {
                self.shift = 0b01;
                self.shift_len = self.ir_len;
            }
            JtagState::CaptureDR => match (self.ir, self.idcode) {
                (None, Some(idcode)) => {
                    self.shift = idcode.into();
                    self.shift_len = 32;
                }
                _ => {
                    // every other instruction selects BYPASS
                    self.shift = 0;
                    self.shift_len = 1;
                }
            },
            JtagState::ShiftDR | JtagState::ShiftIR => {
                self.shift = (self.shift >> 1) | ((tdi as u64) << (self.shift_len - 1));
            }
            JtagState::UpdateIR => {
                self.ir = Some(self.shift & ((1 << self.ir_len) - 1));
            }
            _ => {}
        }
        self.fsm.consume(&tms).unwrap();
    }

    fn falling(&mut self) {
        self.tdo = if self.state().is_shift() {
            Some(self.shift & 1 == 1)
        } else {
            None
        };
    }
}

struct TapChain {
    wiring: TapWiring,
    // index 0 drives TDO
    taps: Vec<SimTap>,
}

impl TapChain {
    fn rising(&mut self, tms: bool, tdi: bool) {
        let outputs: Vec<bool> = self.taps.iter().map(|t| t.tdo.unwrap_or(true)).collect();
        let count = self.taps.len();
        for (index, tap) in self.taps.iter_mut().enumerate() {
            let input = if index + 1 < count {
                outputs[index + 1]
            } else {
                tdi
            };
            tap.rising(tms, input);
        }
    }

    fn falling(&mut self) {
        for tap in &mut self.taps {
            tap.falling();
        }
    }

    fn reset(&mut self) {
        for tap in &mut self.taps {
            tap.reset();
        }
    }

    fn tdo(&self) -> Option<bool> {
        self.taps.first().and_then(|t| t.tdo)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SwdMode {
    Jtag,
    Swd,
}

pub(crate) struct SwdTarget {
    swclk: Line,
    swdio: Line,
    idcode: u32,
    ack: u8,
    pub mode: SwdMode,
    pub switched_to_jtag: usize,
    ones: usize,
    armed: bool,
    window: Option<(u16, usize)>,
    header: Option<(u8, usize)>,
    response: Option<(Vec<bool>, usize)>,
    drive: Option<bool>,
}

impl SwdTarget {
    fn feed(&mut self, bit: bool) {
        if bit {
            self.ones += 1;
        } else {
            if self.ones >= 50 {
                self.window = Some((0, 0));
                self.header = None;
                self.armed = self.mode == SwdMode::Swd;
            }
            self.ones = 0;
        }

        if let Some((mut bits, count)) = self.window {
            bits |= (bit as u16) << count;
            self.window = if count + 1 == 16 {
                match bits {
                    0xE79E => {
                        self.mode = SwdMode::Swd;
                        self.armed = false;
                    }
                    0xE73C => {
                        self.mode = SwdMode::Jtag;
                        self.armed = false;
                        self.switched_to_jtag += 1;
                    }
                    _ => {}
                }
                None
            } else {
                Some((bits, count + 1))
            };
        }

        if !self.armed {
            return;
        }
        let (mut header, count) = match self.header {
            Some(header) => header,
            None if bit => (0, 0),
            None => return,
        };
        header |= (bit as u8) << count;
        if count + 1 < 8 {
            self.header = Some((header, count + 1));
            return;
        }
        self.header = None;
        self.armed = false;
        if header == 0xA5 {
            let mut bits: Vec<bool> = (0..3).map(|i| self.ack & (1 << i) != 0).collect();
            if self.ack == 0b001 {
                bits.extend((0..32).map(|i| self.idcode & (1 << i) != 0));
                bits.push(self.idcode.count_ones() % 2 == 1);
            }
            self.window = None;
            self.response = Some((bits, 0));
        }
    }

    fn rising(&mut self, swdio: Option<bool>) {
        if let Some((bits, edge)) = self.response.as_mut() {
            *edge += 1;
            let index = *edge - 1;
            if index < bits.len() {
                self.drive = Some(bits[index]);
            } else {
                self.drive = None;
                self.response = None;
            }
            return;
        }
        if let Some(bit) = swdio {
            self.feed(bit);
        }
    }
}

/// In-memory `PinBus` with optional simulated targets.
#[derive(Default)]
pub(crate) struct FakeBus {
    lines: HashMap<Line, LineState>,
    chain: Option<TapChain>,
    swd: Option<SwdTarget>,
    loopback: Option<(Line, Line)>,
    // operation number that fails, once
    fail_at: Option<usize>,
    pub ops: usize,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a chain of TAPs, `(ir_len, idcode)` each, index 0 nearest TDO.
    pub fn with_chain(mut self, wiring: TapWiring, taps: &[(usize, Option<u32>)]) -> Self {
        let taps = taps
            .iter()
            .map(|(ir_len, idcode)| SimTap::new(*ir_len, *idcode))
            .collect();
        self.chain = Some(TapChain { wiring, taps });
        self
    }

    pub fn with_swd(mut self, swclk: Line, swdio: Line, idcode: u32, ack: u8) -> Self {
        self.swd = Some(SwdTarget {
            swclk,
            swdio,
            idcode,
            ack,
            mode: SwdMode::Jtag,
            switched_to_jtag: 0,
            ones: 0,
            armed: false,
            window: None,
            header: None,
            response: None,
            drive: None,
        });
        self
    }

    /// Whatever is on `from` reads back on `to`.
    pub fn with_loopback(mut self, from: Line, to: Line) -> Self {
        self.loopback = Some((from, to));
        self
    }

    /// The `op`-th bus operation (counting from 1) fails; later ones succeed
    /// again so the lines can still be released.
    pub fn failing_at(mut self, op: usize) -> Self {
        self.fail_at = Some(op);
        self
    }

    fn count_op(&mut self, line: Line) -> Result<()> {
        self.ops += 1;
        if self.fail_at == Some(self.ops) {
            bail!("adapter stopped responding on line {}", line);
        }
        Ok(())
    }

    pub fn swd(&self) -> Option<&SwdTarget> {
        self.swd.as_ref()
    }

    pub fn direction(&self, line: Line) -> Direction {
        self.lines.get(&line).copied().unwrap_or_default().direction
    }

    fn level(&self, line: Line) -> Level {
        self.lines.get(&line).copied().unwrap_or_default().level()
    }

    fn trst_asserted(&self, chain: &TapChain) -> bool {
        let trst = match chain.wiring.trst {
            Some(trst) => trst,
            None => return false,
        };
        let state = self.lines.get(&trst).copied().unwrap_or_default();
        // the target pulls TRST up when nobody drives it
        matches!(
            (state.direction, state.latch),
            (Direction::Output, Level::Low) | (Direction::Input(Pull::Down), _)
        )
    }

    fn update(&mut self, line: Line, change: impl FnOnce(&mut LineState)) {
        let before = self.level(line);
        change(self.lines.entry(line).or_default());
        let after = self.level(line);

        if let Some(mut chain) = self.chain.take() {
            if self.trst_asserted(&chain) {
                chain.reset();
            } else if line == chain.wiring.tck && before != after {
                if after.is_high() {
                    let tms = self.level(chain.wiring.tms).is_high();
                    let tdi = self.level(chain.wiring.tdi).is_high();
                    chain.rising(tms, tdi);
                } else {
                    chain.falling();
                }
            }
            self.chain = Some(chain);
        }

        if let Some(mut swd) = self.swd.take() {
            if line == swd.swclk && before != after && after.is_high() {
                let swdio = match self.direction(swd.swdio) {
                    Direction::Output => Some(self.level(swd.swdio).is_high()),
                    Direction::Input(_) => None,
                };
                swd.rising(swdio);
            }
            self.swd = Some(swd);
        }
    }
}

impl PinBus for FakeBus {
    fn set_direction(&mut self, line: Line, direction: Direction) -> Result<()> {
        self.count_op(line)?;
        self.update(line, |state| state.direction = direction);
        Ok(())
    }

    fn set_level(&mut self, line: Line, level: Level) -> Result<()> {
        self.count_op(line)?;
        self.update(line, |state| state.latch = level);
        Ok(())
    }

    fn read_level(&mut self, line: Line) -> Result<Level> {
        self.count_op(line)?;
        if let Some((from, to)) = self.loopback {
            if line == to {
                return Ok(self.level(from));
            }
        }
        if let Some(chain) = &self.chain {
            if line == chain.wiring.tdo {
                if let Some(bit) = chain.tdo() {
                    return Ok(bit.into());
                }
            }
        }
        if let Some(swd) = &self.swd {
            if line == swd.swdio {
                if let Some(bit) = swd.drive {
                    return Ok(bit.into());
                }
            }
        }
        Ok(self.level(line))
    }

    fn delay_us(&mut self, _us: u32) {}
}
