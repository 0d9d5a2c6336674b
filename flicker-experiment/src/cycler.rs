use crate::error::TrialError;
use flicker_core::{CyclePhase, LayerId};

/// Poll-driven recurring timer rotating visibility through the four-phase
/// presentation cycle. Owns the cycle state exclusively; the phase only
/// changes inside [`poll`](Self::poll).
#[derive(Debug, Clone)]
pub struct StimulusCycler {
    phase_duration_ns: u64,
    run: Option<Run>,
}

#[derive(Debug, Clone)]
struct Run {
    started_ns: u64,
    ticks: u64,
    phase: CyclePhase,
}

impl StimulusCycler {
    pub fn new(phase_duration_ms: u64) -> Result<Self, TrialError> {
        if phase_duration_ms == 0 {
            return Err(TrialError::NonPositiveDuration);
        }
        Ok(Self {
            phase_duration_ns: phase_duration_ms * 1_000_000,
            run: None,
        })
    }

    /// Enters phase 0 with the first layer visible. Restarting resets the cycle.
    pub fn start(&mut self, now_ns: u64) {
        self.run = Some(Run {
            started_ns: now_ns,
            ticks: 0,
            phase: CyclePhase::First,
        });
    }

    /// Advances the phase once per elapsed interval since `start`, catching up
    /// on late polls without skipping any phase. Returns the number of
    /// transitions performed.
    pub fn poll(&mut self, now_ns: u64) -> u32 {
        let Some(run) = &mut self.run else {
            return 0;
        };
        let mut advanced = 0;
        while now_ns.saturating_sub(run.started_ns) >= (run.ticks + 1) * self.phase_duration_ns {
            run.ticks += 1;
            run.phase = run.phase.next();
            advanced += 1;
        }
        advanced
    }

    pub fn visible_layer(&self) -> Option<LayerId> {
        self.run.as_ref().map(|run| run.phase.visible_layer())
    }

    pub fn current_phase(&self) -> Option<CyclePhase> {
        self.run.as_ref().map(|run| run.phase)
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Cancels the cycle. Idempotent and safe before `start`.
    pub fn stop(&mut self) {
        self.run = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn zero_duration_is_rejected() {
        assert_eq!(
            StimulusCycler::new(0).unwrap_err(),
            TrialError::NonPositiveDuration
        );
    }

    #[test]
    fn first_layer_visible_at_start() {
        let mut cycler = StimulusCycler::new(100).unwrap();
        assert_eq!(cycler.visible_layer(), None);
        cycler.start(0);
        assert_eq!(cycler.visible_layer(), Some(LayerId::First));
    }

    #[test]
    fn phases_advance_in_strict_order() {
        let mut cycler = StimulusCycler::new(100).unwrap();
        cycler.start(0);
        let mut seen = vec![cycler.current_phase().unwrap().index()];
        for step in 1..=8 {
            cycler.poll(step * 100_000_000);
            seen.push(cycler.current_phase().unwrap().index());
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 0, 1, 2, 3, 0]);
    }

    #[test]
    fn late_poll_catches_up_without_skipping() {
        let mut cycler = StimulusCycler::new(100).unwrap();
        cycler.start(0);
        // One poll after 5.5 intervals performs all five transitions.
        let advanced = cycler.poll(550_000_000);
        assert_eq!(advanced, 5);
        assert_eq!(cycler.current_phase().unwrap().index(), 1);
        assert_eq!(cycler.visible_layer(), Some(LayerId::Mask));
    }

    #[test]
    fn poll_before_interval_boundary_is_a_no_op() {
        let mut cycler = StimulusCycler::new(100).unwrap();
        cycler.start(0);
        assert_eq!(cycler.poll(99_999_999), 0);
        assert_eq!(cycler.poll(100_000_000), 1);
    }

    #[test]
    fn stop_is_idempotent_and_safe_before_start() {
        let mut cycler = StimulusCycler::new(100).unwrap();
        cycler.stop();
        cycler.start(0);
        cycler.stop();
        cycler.stop();
        assert!(!cycler.is_running());
        assert_eq!(cycler.poll(1_000_000_000), 0);
    }

    proptest! {
        /// Regardless of when polls happen, the current phase index always
        /// equals the total number of transitions modulo four.
        #[test]
        fn phase_tracks_transition_count(offsets in proptest::collection::vec(0u64..400, 1..40)) {
            let mut cycler = StimulusCycler::new(100).unwrap();
            cycler.start(0);
            let mut now = 0u64;
            let mut transitions = 0u64;
            for offset in offsets {
                now += offset * 1_000_000;
                transitions += u64::from(cycler.poll(now));
                prop_assert_eq!(
                    u64::from(cycler.current_phase().unwrap().index()),
                    transitions % 4
                );
            }
        }
    }
}
