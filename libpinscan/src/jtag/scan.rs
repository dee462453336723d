use core::ops::ControlFlow;

use anyhow::Result;
use itertools::Itertools;
use log::{debug, info, trace};

use crate::idcode::IdCode;
use crate::interface::{Direction, Level, Line, PinBus, Pull};
use crate::jtag::chain::{is_valid_device_id, DeviceChain};
use crate::jtag::jtag::Jtag;
use crate::jtag::JtagPins;
use crate::scan::{
    bail, check_candidates, permutation_count, Protocol, ScanConfig, ScanError, ScanProgress,
    ScanResult,
};

/// Fresh bypass pattern. All-zero and all-one words are what dead lines
/// produce, so they are never used.
fn random_pattern() -> u32 {
    loop {
        let pattern: u32 = rand::random();
        if pattern != 0 && pattern != u32::MAX {
            return pattern;
        }
    }
}

/// Try every ordered `(TDI, TDO, TCK, TMS)` selection of `candidates` until
/// one passes the bypass echo and yields a plausible IDCODE.
pub fn scan_jtag<B, P>(
    bus: &mut B,
    candidates: &[Line],
    config: &ScanConfig,
    mut progress: P,
) -> Result<ScanResult, ScanError>
where
    B: PinBus,
    P: FnMut(ScanProgress) -> ControlFlow<()>,
{
    check_candidates(candidates, Protocol::Jtag)?;
    let total = permutation_count(candidates.len(), Protocol::Jtag.roles());
    info!(
        "searching {} lines for JTAG, {} role assignments",
        candidates.len(),
        total
    );

    for (index, roles) in candidates.iter().copied().permutations(4).enumerate() {
        let attempted = index + 1;
        let pins = JtagPins::new(roles[2], roles[3], roles[0], roles[1]);

        let ids = match try_pinout(bus, candidates, pins, config) {
            Ok(ids) => ids,
            Err(err) => return Err(bail(bus, candidates, err)),
        };

        if let Some(ids) = ids {
            let (pins, chain) = match finish(bus, candidates, pins, ids, config) {
                Ok(found) => found,
                Err(err) => return Err(bail(bus, candidates, err)),
            };
            info!("JTAG found: {}", pins);
            for (i, id) in chain.iter().enumerate() {
                info!("  IDCODE[{}]: {}", i, id);
            }
            info!("  IR length: {}", chain.ir_len());
            // the search is over, a stop request changes nothing
            let _ = progress(ScanProgress { attempted, total });
            return Ok(ScanResult::Jtag { pins, chain });
        }

        if progress(ScanProgress { attempted, total }).is_break() {
            info!("JTAG search aborted after {} of {}", attempted, total);
            bus.release(candidates, Pull::None)?;
            return Err(ScanError::Aborted { attempted });
        }
    }

    bus.release(candidates, Pull::None)?;
    info!("no JTAG pinout found");
    Ok(ScanResult::NotFound)
}

/// Test one role assignment and return the chain's IDCODEs.
/// `None` means the assignment failed.
fn try_pinout<B: PinBus>(
    bus: &mut B,
    candidates: &[Line],
    pins: JtagPins,
    config: &ScanConfig,
) -> Result<Option<Vec<IdCode>>> {
    bus.release(candidates, config.pull)?;
    let mut jtag = Jtag::new(bus, pins, config.pull, config.jtag_delay_us)?;

    let count = jtag.detect_devices()?;
    if count == 0 {
        trace!("{}: nothing on TDO", pins);
        return Ok(None);
    }

    let pattern = random_pattern();
    let echo = jtag.bypass_test(count, pattern)?;
    if echo != pattern {
        debug!(
            "{}: {} devices but bypass returned {:#010x} for {:#010x}",
            pins, count, echo, pattern
        );
        return Ok(None);
    }

    let ids = jtag.device_ids(count)?;
    match ids.first() {
        Some(id) if is_valid_device_id(*id) => Ok(Some(ids)),
        Some(id) => {
            debug!("{}: bypass passed but IDCODE {:#010x} is implausible", pins, id);
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Look for TRST among the unused lines, measure the IR chain and leave the
/// port configured.
fn finish<B: PinBus>(
    bus: &mut B,
    candidates: &[Line],
    pins: JtagPins,
    ids: Vec<IdCode>,
    config: &ScanConfig,
) -> Result<(JtagPins, DeviceChain)> {
    let mut pins = pins;
    if config.detect_trst {
        if let Some(reference) = ids.first() {
            pins.trst = find_trst(bus, candidates, pins, *reference, config)?;
        }
    }

    for line in candidates.iter().copied().filter(|line| !pins.uses(*line)) {
        bus.set_direction(line, Direction::Input(config.pull))?;
    }
    let mut jtag = Jtag::new(bus, pins, config.pull, config.jtag_delay_us)?;
    let ir_len = jtag.ir_chain_length()?;
    jtag.restore_idle()?;
    Ok((pins, DeviceChain::new(ids, ir_len)))
}

/// Hold each unused line low in turn; the one that changes the IDCODE read
/// back is TRST.
fn find_trst<B: PinBus>(
    bus: &mut B,
    candidates: &[Line],
    pins: JtagPins,
    reference: IdCode,
    config: &ScanConfig,
) -> Result<Option<Line>> {
    for line in candidates.iter().copied().filter(|line| !pins.uses(*line)) {
        bus.drive(line, Level::Low)?;
        bus.delay_us(config.trst_settle_us);

        let ids = Jtag::new(&mut *bus, pins, config.pull, config.jtag_delay_us)?.device_ids(1)?;

        bus.set_direction(line, Direction::Input(config.pull))?;
        bus.delay_us(config.trst_settle_us);

        match ids.first() {
            Some(id) if *id != reference => {
                debug!("line {} held low reads {:#010x} instead of {:#010x}", line, id, reference);
                return Ok(Some(line));
            }
            _ => trace!("line {} is not TRST", line),
        }
    }
    Ok(None)
}
