//! Entry point of the pinout search and the types shared by both protocols.

use core::ops::ControlFlow;

use itertools::Itertools;
use log::warn;
use thiserror::Error;

use crate::idcode::IdCode;
use crate::interface::{Line, PinBus, Pull};
use crate::jtag::chain::DeviceChain;
use crate::jtag::JtagPins;
use crate::swd::SwdPins;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Jtag,
    Swd,
}

impl Protocol {
    /// Number of distinct lines a role assignment needs.
    pub fn roles(self) -> usize {
        match self {
            Protocol::Jtag => 4,
            Protocol::Swd => 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ScanConfig {
    /// Pull applied to every candidate line while it is an input.
    pub pull: Pull,
    /// Half TCK period.
    pub jtag_delay_us: u32,
    /// Half SWCLK period.
    pub swd_delay_us: u32,
    /// Look for TRST among the unused candidates once a TAP is found.
    pub detect_trst: bool,
    /// How long a TRST candidate is held low before the IDCODE is re-read.
    pub trst_settle_us: u32,
    /// Switch a discovered SW-DP back to JTAG before returning.
    pub switch_to_jtag: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            pull: Pull::Up,
            jtag_delay_us: 1,
            swd_delay_us: 5,
            detect_trst: true,
            trst_settle_us: 10,
            switch_to_jtag: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanProgress {
    pub attempted: usize,
    pub total: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanResult {
    Jtag { pins: JtagPins, chain: DeviceChain },
    Swd { pins: SwdPins, idcode: IdCode },
    NotFound,
}

impl ScanResult {
    pub fn is_found(&self) -> bool {
        !matches!(self, ScanResult::NotFound)
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{required} candidate lines are required, {provided} given")]
    InsufficientCandidates { required: usize, provided: usize },
    #[error("line {0} is listed more than once")]
    DuplicateCandidate(Line),
    #[error("scan aborted after {attempted} attempts")]
    Aborted { attempted: usize },
    #[error(transparent)]
    Bus(#[from] anyhow::Error),
}

/// Search `candidates` for a `protocol` port.
///
/// `progress` is called after every role assignment tried and may return
/// `ControlFlow::Break(())` to stop the search.
pub fn scan<B, P>(
    bus: &mut B,
    protocol: Protocol,
    candidates: &[Line],
    config: &ScanConfig,
    progress: P,
) -> Result<ScanResult, ScanError>
where
    B: PinBus,
    P: FnMut(ScanProgress) -> ControlFlow<()>,
{
    match protocol {
        Protocol::Jtag => crate::jtag::scan::scan_jtag(bus, candidates, config, progress),
        Protocol::Swd => crate::swd::scan::scan_swd(bus, candidates, config, progress),
    }
}

pub(crate) fn check_candidates(candidates: &[Line], protocol: Protocol) -> Result<(), ScanError> {
    let required = protocol.roles();
    if candidates.len() < required {
        return Err(ScanError::InsufficientCandidates {
            required,
            provided: candidates.len(),
        });
    }
    if let Some(line) = candidates.iter().duplicates().next() {
        return Err(ScanError::DuplicateCandidate(*line));
    }
    Ok(())
}

/// Number of ordered selections of `k` out of `n`.
pub(crate) fn permutation_count(n: usize, k: usize) -> usize {
    (0..k).map(|i| n.saturating_sub(i)).product()
}

/// Release the candidates after a bus failure and hand back the failure.
pub(crate) fn bail<B: PinBus>(bus: &mut B, candidates: &[Line], err: anyhow::Error) -> ScanError {
    if let Err(release) = bus.release(candidates, Pull::None) {
        warn!("failed to release candidate lines: {:#}", release);
    }
    ScanError::Bus(err)
}
