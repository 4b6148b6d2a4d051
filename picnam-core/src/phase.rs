/// States of the trial timing state machine.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingStart,
    InitialRest,
    StimulusOnset,
    Capturing,
    InterTrial,
    FinalRest,
    Complete,
    Aborted,
}

impl SessionState {
    /// Next state in the normal sequence. `trials_remaining` decides whether
    /// a rest or inter-trial gap leads into another stimulus or the final rest.
    pub fn next(&self, trials_remaining: bool) -> Option<Self> {
        use SessionState::*;
        Some(match self {
            Idle => AwaitingStart,
            AwaitingStart => InitialRest,
            InitialRest | InterTrial if trials_remaining => StimulusOnset,
            InitialRest | InterTrial => FinalRest,
            StimulusOnset => Capturing,
            Capturing => InterTrial,
            FinalRest => Complete,
            Complete | Aborted => return None,
        })
    }

    /// The only state in which a capture window may be open.
    pub fn allows_capture(&self) -> bool {
        matches!(self, Self::Capturing)
    }
}
