use core::ops::ControlFlow;

use anyhow::Result;
use itertools::Itertools;
use log::{info, trace};

use crate::idcode::IdCode;
use crate::interface::{Line, PinBus, Pull};
use crate::scan::{
    bail, check_candidates, permutation_count, Protocol, ScanConfig, ScanError, ScanProgress,
    ScanResult,
};
use crate::swd::dap::Swd;
use crate::swd::SwdPins;

/// Try every ordered `(SWCLK, SWDIO)` pair of `candidates` until one answers
/// an IDCODE read with OK.
pub fn scan_swd<B, P>(
    bus: &mut B,
    candidates: &[Line],
    config: &ScanConfig,
    mut progress: P,
) -> Result<ScanResult, ScanError>
where
    B: PinBus,
    P: FnMut(ScanProgress) -> ControlFlow<()>,
{
    check_candidates(candidates, Protocol::Swd)?;
    let total = permutation_count(candidates.len(), Protocol::Swd.roles());
    info!(
        "searching {} lines for SWD, {} role assignments",
        candidates.len(),
        total
    );

    for (index, roles) in candidates.iter().copied().permutations(2).enumerate() {
        let attempted = index + 1;
        let pins = SwdPins::new(roles[0], roles[1]);

        let idcode = match try_pinout(bus, candidates, pins, config) {
            Ok(idcode) => idcode,
            Err(err) => return Err(bail(bus, candidates, err)),
        };

        if let Some(idcode) = idcode {
            info!("SWD found: {}", pins);
            info!("  IDCODE: {}", idcode);
            let _ = progress(ScanProgress { attempted, total });
            return Ok(ScanResult::Swd { pins, idcode });
        }

        if progress(ScanProgress { attempted, total }).is_break() {
            info!("SWD search aborted after {} of {}", attempted, total);
            bus.release(candidates, Pull::None)?;
            return Err(ScanError::Aborted { attempted });
        }
    }

    bus.release(candidates, Pull::None)?;
    info!("no SWD pinout found");
    Ok(ScanResult::NotFound)
}

fn try_pinout<B: PinBus>(
    bus: &mut B,
    candidates: &[Line],
    pins: SwdPins,
    config: &ScanConfig,
) -> Result<Option<IdCode>> {
    bus.release(candidates, config.pull)?;
    let mut swd = Swd::new(bus, pins, config.pull, config.swd_delay_us)?;

    let idcode = match swd.read_idcode()? {
        Some(idcode) => idcode,
        None => {
            trace!("{}: no answer", pins);
            return Ok(None);
        }
    };

    if config.switch_to_jtag {
        swd.swd_to_jtag()?;
    }
    Ok(Some(idcode))
}
