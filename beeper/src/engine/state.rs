//! Lifecycle and tone state, and the tone transition function

/// Backend resource lifecycle of a [`ToneEngine`](super::ToneEngine)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// No backend resources held
    #[default]
    Uninitialized,
    /// Device, context, buffers and source all acquired
    Ready,
    /// Teardown in progress
    ShuttingDown,
}

/// What the speaker is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToneState {
    /// Nothing queued (frequency 0)
    #[default]
    Stopped,
    /// Streaming a tone; `frequency` is never 0
    Playing { frequency: u32 },
}

/// Work selected for one poll with a requested frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Same non-zero frequency: refill only once the backend has consumed a buffer
    Sustain { frequency: u32 },
    /// New non-zero frequency: stop, drain and restart immediately
    Retune { from: u32, to: u32 },
    /// Frequency 0: stop and drain, queue nothing
    Silence,
}

impl ToneState {
    /// State for a requested frequency
    pub fn from_frequency(frequency: u32) -> Self {
        if frequency == 0 {
            ToneState::Stopped
        } else {
            ToneState::Playing { frequency }
        }
    }

    /// Current frequency in Hz (0 when stopped)
    pub fn frequency(self) -> u32 {
        match self {
            ToneState::Stopped => 0,
            ToneState::Playing { frequency } => frequency,
        }
    }

    pub fn is_playing(self) -> bool {
        matches!(self, ToneState::Playing { .. })
    }

    /// Classify a request for `requested` Hz against the current state
    pub fn transition(self, requested: u32) -> Transition {
        let current = self.frequency();
        if requested == 0 {
            Transition::Silence
        } else if requested == current {
            Transition::Sustain {
                frequency: requested,
            }
        } else {
            Transition::Retune {
                from: current,
                to: requested,
            }
        }
    }
}

impl Transition {
    /// State reached once the transition has been applied
    pub fn target(self) -> ToneState {
        match self {
            Transition::Sustain { frequency } => ToneState::Playing { frequency },
            Transition::Retune { to, .. } => ToneState::Playing { frequency: to },
            Transition::Silence => ToneState::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_frequency() {
        assert_eq!(ToneState::from_frequency(0), ToneState::Stopped);
        assert_eq!(
            ToneState::from_frequency(440),
            ToneState::Playing { frequency: 440 }
        );
        assert_eq!(ToneState::from_frequency(440).frequency(), 440);
        assert_eq!(ToneState::Stopped.frequency(), 0);
    }

    #[test]
    fn test_transitions_from_stopped() {
        let state = ToneState::Stopped;
        assert_eq!(state.transition(0), Transition::Silence);
        assert_eq!(
            state.transition(440),
            Transition::Retune { from: 0, to: 440 }
        );
    }

    #[test]
    fn test_transitions_from_playing() {
        let state = ToneState::Playing { frequency: 440 };
        assert_eq!(
            state.transition(440),
            Transition::Sustain { frequency: 440 }
        );
        assert_eq!(
            state.transition(880),
            Transition::Retune { from: 440, to: 880 }
        );
        assert_eq!(state.transition(0), Transition::Silence);
    }

    #[test]
    fn test_transition_target_matches_request() {
        for current in [0, 440, 880] {
            let state = ToneState::from_frequency(current);
            for requested in [0, 440, 880, 1000] {
                assert_eq!(
                    state.transition(requested).target(),
                    ToneState::from_frequency(requested)
                );
            }
        }
    }
}
