use log::trace;
use rust_fsm::*;

/// The sixteen IEEE 1149.1 TAP controller states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JtagState {
    Reset,
    RunIdle,
    SelectDRScan,
    CaptureDR,
    ShiftDR,
    Exit1DR,
    PauseDR,
    Exit2DR,
    UpdateDR,
    SelectIRScan,
    CaptureIR,
    ShiftIR,
    Exit1IR,
    PauseIR,
    Exit2IR,
    UpdateIR,
}

impl JtagState {
    pub const ALL: [JtagState; 16] = [
        JtagState::Reset,
        JtagState::RunIdle,
        JtagState::SelectDRScan,
        JtagState::CaptureDR,
        JtagState::ShiftDR,
        JtagState::Exit1DR,
        JtagState::PauseDR,
        JtagState::Exit2DR,
        JtagState::UpdateDR,
        JtagState::SelectIRScan,
        JtagState::CaptureIR,
        JtagState::ShiftIR,
        JtagState::Exit1IR,
        JtagState::PauseIR,
        JtagState::Exit2IR,
        JtagState::UpdateIR,
    ];

    /// State entered on the next rising TCK edge with the given TMS level.
    pub fn next(self, tms: bool) -> JtagState {
        use JtagState::*;
        match (self, tms) {
            (Reset, true) => Reset,
            (Reset, false) => RunIdle,

            (RunIdle, true) => SelectDRScan,
            (RunIdle, false) => RunIdle,

            // DR column
            (SelectDRScan, true) => SelectIRScan,
            (SelectDRScan, false) => CaptureDR,
            (CaptureDR, true) => Exit1DR,
            (CaptureDR, false) => ShiftDR,
            (ShiftDR, true) => Exit1DR,
            (ShiftDR, false) => ShiftDR,
            (Exit1DR, true) => UpdateDR,
            (Exit1DR, false) => PauseDR,
            (PauseDR, true) => Exit2DR,
            (PauseDR, false) => PauseDR,
            (Exit2DR, true) => UpdateDR,
            (Exit2DR, false) => ShiftDR,
            (UpdateDR, true) => SelectDRScan,
            (UpdateDR, false) => RunIdle,

            // IR column
            (SelectIRScan, true) => Reset,
            (SelectIRScan, false) => CaptureIR,
            (CaptureIR, true) => Exit1IR,
            (CaptureIR, false) => ShiftIR,
            (ShiftIR, true) => Exit1IR,
            (ShiftIR, false) => ShiftIR,
            (Exit1IR, true) => UpdateIR,
            (Exit1IR, false) => PauseIR,
            (PauseIR, true) => Exit2IR,
            (PauseIR, false) => PauseIR,
            (Exit2IR, true) => UpdateIR,
            (Exit2IR, false) => ShiftIR,
            (UpdateIR, true) => SelectDRScan,
            (UpdateIR, false) => RunIdle,
        }
    }

    pub fn is_shift(self) -> bool {
        matches!(self, JtagState::ShiftDR | JtagState::ShiftIR)
    }
}

#[derive(Debug)]
pub struct JtagStateMachine;

impl StateMachineImpl for JtagStateMachine {
    type Input = bool;
    type State = JtagState;
    type Output = ();

    const INITIAL_STATE: Self::State = JtagState::Reset;

    fn transition(state: &Self::State, input: &Self::Input) -> Option<Self::State> {
        let next = state.next(*input);
        trace!("jtag state change: {:?} -> {:?}", state, next);
        Some(next)
    }

    fn output(_state: &Self::State, _input: &Self::Input) -> Option<Self::Output> {
        None
    }
}
