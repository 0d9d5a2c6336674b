use crate::config::{ExperimentConfig, TrialSpec};
use crate::error::TrialError;
use crate::monitor::InteractionEvent;
use crate::trial::{FlickerTrial, TrialConfig};
use flicker_core::{
    ImageStimulus, LayerId, Phase, ResponseRecord, SequenceStage, SessionSummary, SurfaceLayout,
    TrialResult,
};
use flicker_timing::{CalibrationStats, Timer};
use serde::Serialize;
use std::io::Write;
use tracing::{debug, info};

/// Frame samples collected before calibration statistics are computed.
const CALIBRATION_SAMPLES: usize = 120;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Advance,
    Click { x: f64, y: f64 },
    CalibrationComplete,
    TrialFinished,
    PhaseComplete,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    Blank { started_ns: u64 },
    Flicker,
    Continue,
}

#[derive(Debug)]
struct ActiveSequence {
    trial_index: usize,
    demo: bool,
    spec: TrialSpec,
    step: Step,
    trial: Option<FlickerTrial<ImageStimulus>>,
}

/// Session state machine sequencing Welcome -> Calibration -> Demonstration
/// -> Experiment -> Debrief. Each experiment sequence runs blank fixation,
/// then the flicker trial (unbounded until a valid click), then waits for
/// input before the next one. Exactly one result row is appended per started
/// experiment trial.
#[derive(Debug)]
pub struct ExperimentSession<P, T>
where
    P: Phase,
    T: Timer<Timestamp = u64>,
{
    pub phase: P,
    pub timer: T,
    pub config: ExperimentConfig,
    trial_list: Vec<TrialSpec>,
    layout: SurfaceLayout,
    current: Option<ActiveSequence>,
    next_trial: usize,
    results: Vec<TrialResult>,
    calibration: Option<CalibrationStats>,
    safe_margin_ns: u64,
    pending_record: Option<ResponseRecord>,
    summary: Option<SessionSummary>,
    finished: bool,
}

#[derive(Serialize)]
struct SessionExport<'a> {
    calibration: Option<&'a CalibrationStats>,
    safe_margin_ns: u64,
    interaction_events: &'a [InteractionEvent],
    summary: Option<&'a SessionSummary>,
    trials: &'a [TrialResult],
}

impl<P, T> ExperimentSession<P, T>
where
    P: Phase,
    T: Timer<Timestamp = u64>,
{
    pub fn new(
        config: ExperimentConfig,
        trial_list: Vec<TrialSpec>,
        layout: SurfaceLayout,
        timer: T,
    ) -> Result<Self, TrialError> {
        config.validate()?;
        for spec in &trial_list {
            if spec.first.trim().is_empty() {
                return Err(TrialError::MissingStimulus(LayerId::First));
            }
            if spec.second.trim().is_empty() {
                return Err(TrialError::MissingStimulus(LayerId::Second));
            }
        }
        Ok(Self {
            phase: P::default(),
            timer,
            config,
            trial_list,
            layout,
            current: None,
            next_trial: 0,
            results: Vec::new(),
            calibration: None,
            safe_margin_ns: 0,
            pending_record: None,
            summary: None,
            finished: false,
        })
    }

    /// Emits every event that is due; the caller feeds them back
    /// through [`handle_event`](Self::handle_event).
    pub fn update(&mut self) -> Result<Vec<SessionEvent>, TrialError> {
        let mut events = Vec::new();
        match self.phase {
            phase if phase.is_welcome() => {}
            phase if phase.requires_calibration() => {
                if self.timer.frame_count() >= CALIBRATION_SAMPLES && self.calibration.is_none() {
                    events.push(SessionEvent::CalibrationComplete);
                }
            }
            phase if phase.is_demonstration() || phase.is_experiment() => {
                let now_ns = self.timer.now();
                let inter_trial_ns = self.config.inter_trial_ms * 1_000_000;
                if let Some(seq) = self.current.as_mut() {
                    match seq.step {
                        Step::Blank { started_ns } => {
                            if now_ns.saturating_sub(started_ns) >= inter_trial_ns {
                                let mask =
                                    &self.config.masks[seq.trial_index % self.config.masks.len()];
                                let trial_config = TrialConfig {
                                    first: ImageStimulus::new(
                                        &seq.spec.first,
                                        seq.spec.flip_x,
                                        self.config.flip_y,
                                    ),
                                    second: ImageStimulus::new(
                                        &seq.spec.second,
                                        seq.spec.flip_x,
                                        self.config.flip_y,
                                    ),
                                    mask: ImageStimulus::upright(mask),
                                    phase_duration_ms: self.config.phase_duration_ms,
                                    response_target: self.config.response_target.clone(),
                                    prompt: self.config.prompt.clone(),
                                    valid_response_factor: self.config.valid_response_factor,
                                };
                                let mut trial = FlickerTrial::new(trial_config)?;
                                trial.begin(&self.layout, now_ns)?;
                                info!(
                                    trial = seq.trial_index,
                                    demo = seq.demo,
                                    start_ns = now_ns,
                                    "trial started"
                                );
                                seq.trial = Some(trial);
                                seq.step = Step::Flicker;
                            }
                        }
                        Step::Flicker => {
                            if let Some(trial) = seq.trial.as_mut() {
                                trial.poll(now_ns);
                            }
                        }
                        Step::Continue => {}
                    }
                }
            }
            _ => {}
        }
        Ok(events)
    }

    pub fn handle_event(&mut self, event: SessionEvent) -> bool {
        match (&self.phase, event) {
            (phase, SessionEvent::Advance) if phase.is_welcome() => self.advance_phase(),

            (phase, SessionEvent::CalibrationComplete) if phase.requires_calibration() => {
                self.apply_calibration();
                self.advance_phase()
            }

            (phase, SessionEvent::Click { x, y })
                if phase.is_demonstration() || phase.is_experiment() =>
            {
                let now_ns = self.timer.now();
                let record = self
                    .current
                    .as_mut()
                    .filter(|seq| seq.step == Step::Flicker)
                    .and_then(|seq| seq.trial.as_mut())
                    .and_then(|trial| trial.handle_click(now_ns, x, y));
                match record {
                    Some(record) => {
                        self.pending_record = Some(record);
                        self.handle_event(SessionEvent::TrialFinished)
                    }
                    None => false,
                }
            }

            (phase, SessionEvent::TrialFinished)
                if phase.is_demonstration() || phase.is_experiment() =>
            {
                self.finish_trial()
            }

            (phase, SessionEvent::Advance)
                if phase.is_demonstration() || phase.is_experiment() =>
            {
                let at_continue = self
                    .current
                    .as_ref()
                    .is_some_and(|seq| seq.step == Step::Continue);
                if !at_continue {
                    return false;
                }
                let was_demo = self.current.as_ref().is_some_and(|seq| seq.demo);
                self.current = None;
                if was_demo || self.next_trial >= self.trial_list.len() {
                    self.handle_event(SessionEvent::PhaseComplete)
                } else {
                    self.start_sequence(self.next_trial, false);
                    true
                }
            }

            (_, SessionEvent::PhaseComplete) => self.advance_phase(),

            (phase, SessionEvent::Advance) if phase.is_debrief() => {
                self.finished = true;
                true
            }

            (_, SessionEvent::Abort) => {
                self.abort();
                true
            }

            _ => false,
        }
    }

    fn advance_phase(&mut self) -> bool {
        let Some(next) = self.phase.next() else {
            return false;
        };
        self.phase = next;
        info!(phase = ?self.phase, "phase entered");
        if self.phase.is_demonstration() {
            self.start_demo_sequence();
        } else if self.phase.is_experiment() {
            // An empty list leaves nothing to run; go straight to debrief.
            if self.trial_list.is_empty() {
                return self.advance_phase();
            }
            self.next_trial = 0;
            self.start_sequence(0, false);
        } else if self.phase.is_debrief() {
            self.summary = Some(SessionSummary::from_results(&self.results));
        }
        true
    }

    fn apply_calibration(&mut self) {
        let stats = self.timer.calibration_stats();
        // Reported with the session; never applied to the cycle timing.
        self.safe_margin_ns = (stats.jitter_ns * 3.0) as u64;
        info!(
            frame_ms = stats.average_frame_time_ns / 1e6,
            fps = stats.effective_fps,
            jitter_ms = stats.jitter_ns / 1e6,
            safe_margin_ns = self.safe_margin_ns,
            "calibration complete"
        );
        self.calibration = Some(stats);
    }

    fn start_demo_sequence(&mut self) {
        let spec = TrialSpec {
            first: self.config.example_first.clone(),
            second: self.config.example_second.clone(),
            flip_x: false,
        };
        self.current = Some(ActiveSequence {
            trial_index: 0,
            demo: true,
            spec,
            step: Step::Blank {
                started_ns: self.timer.now(),
            },
            trial: None,
        });
    }

    fn start_sequence(&mut self, index: usize, demo: bool) {
        let spec = self.trial_list[index].clone();
        self.current = Some(ActiveSequence {
            trial_index: index,
            demo,
            spec,
            step: Step::Blank {
                started_ns: self.timer.now(),
            },
            trial: None,
        });
        self.next_trial = index + 1;
    }

    fn finish_trial(&mut self) -> bool {
        let Some(seq) = self.current.as_mut() else {
            return false;
        };
        let record = self.pending_record.take().unwrap_or_default();
        info!(
            trial = seq.trial_index,
            demo = seq.demo,
            rt_ms = record.rt_ms,
            "response recorded"
        );
        if seq.demo {
            debug!("demonstration result discarded");
        } else {
            self.results.push(TrialResult {
                trial_index: seq.trial_index,
                first: seq.spec.first.clone(),
                second: seq.spec.second.clone(),
                flip_x: seq.spec.flip_x,
                response: record,
                timestamp_ns: self.timer.now(),
            });
        }
        seq.step = Step::Continue;
        true
    }

    /// Finalizes any in-flight trial through the trial's own idempotent
    /// terminate path and jumps to debrief, so partial results still export.
    fn abort(&mut self) {
        if let Some(seq) = self.current.as_mut() {
            if let Some(record) = seq.trial.as_mut().and_then(|trial| trial.terminate()) {
                self.pending_record = Some(record);
                self.finish_trial();
            }
        }
        self.current = None;
        while let Some(next) = self.phase.next() {
            self.phase = next;
        }
        self.summary = Some(SessionSummary::from_results(&self.results));
        info!(trials = self.results.len(), "session aborted");
    }

    /// The layout is re-computed on resize; a trial in flight keeps the
    /// bounding box it attached with.
    pub fn set_layout(&mut self, layout: SurfaceLayout) {
        self.layout = layout;
    }

    pub fn stage(&self) -> Option<SequenceStage> {
        self.current.as_ref().map(|seq| match seq.step {
            Step::Blank { .. } => SequenceStage::Fixation,
            Step::Flicker => SequenceStage::Flicker,
            Step::Continue => SequenceStage::AwaitContinue,
        })
    }

    pub fn visible_stimulus(&self) -> Option<&ImageStimulus> {
        self.current
            .as_ref()
            .and_then(|seq| seq.trial.as_ref())
            .and_then(|trial| trial.visible_stimulus())
    }

    pub fn prompt(&self) -> Option<&str> {
        self.current
            .as_ref()
            .and_then(|seq| seq.trial.as_ref())
            .and_then(|trial| trial.prompt())
    }

    pub fn progress(&self) -> Option<(usize, usize)> {
        if !self.phase.is_experiment() {
            return None;
        }
        self.current
            .as_ref()
            .map(|seq| (seq.trial_index + 1, self.trial_list.len()))
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn calibration(&self) -> Option<&CalibrationStats> {
        self.calibration.as_ref()
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn trial_count(&self) -> usize {
        self.trial_list.len()
    }

    /// Serializes session metadata plus the result rows.
    pub fn export_json<W: Write>(
        &self,
        interaction_events: &[InteractionEvent],
        writer: W,
    ) -> serde_json::Result<()> {
        let export = SessionExport {
            calibration: self.calibration.as_ref(),
            safe_margin_ns: self.safe_margin_ns,
            interaction_events,
            summary: self.summary.as_ref(),
            trials: &self.results,
        };
        serde_json::to_writer_pretty(writer, &export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flicker_core::{BoundingBox, StandardPhase};
    use flicker_timing::VirtualTimer;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn test_layout() -> SurfaceLayout {
        let mut layout = SurfaceLayout::new();
        layout.insert("stimulus", BoundingBox::new(0.0, 0.0, 873.0, 491.0));
        layout
    }

    fn test_session() -> ExperimentSession<StandardPhase, VirtualTimer> {
        let trial_list = vec![
            TrialSpec {
                first: "scene_1a.png".into(),
                second: "scene_1b.png".into(),
                flip_x: false,
            },
            TrialSpec {
                first: "scene_2a.png".into(),
                second: "scene_2b.png".into(),
                flip_x: true,
            },
        ];
        ExperimentSession::new(
            ExperimentConfig::default(),
            trial_list,
            test_layout(),
            VirtualTimer::new(),
        )
        .unwrap()
    }

    fn run_calibration(session: &mut ExperimentSession<StandardPhase, VirtualTimer>) {
        for _ in 0..120 {
            session.timer.record_frame(Duration::from_millis(16));
        }
        let events = session.update().unwrap();
        assert_eq!(events, vec![SessionEvent::CalibrationComplete]);
        assert!(session.handle_event(SessionEvent::CalibrationComplete));
    }

    /// Drives one sequence from fixation through an accepted click.
    fn run_current_trial(
        session: &mut ExperimentSession<StandardPhase, VirtualTimer>,
        click_at_ms: u64,
    ) {
        assert_eq!(session.stage(), Some(SequenceStage::Fixation));
        session.timer.advance(Duration::from_millis(1500));
        session.update().unwrap();
        assert_eq!(session.stage(), Some(SequenceStage::Flicker));

        session.timer.advance(Duration::from_millis(click_at_ms));
        session.update().unwrap();
        assert!(session.handle_event(SessionEvent::Click { x: 400.0, y: 200.0 }));
        assert_eq!(session.stage(), Some(SequenceStage::AwaitContinue));
    }

    #[test]
    fn empty_mask_list_is_rejected() {
        let mut config = ExperimentConfig::default();
        config.masks.clear();
        let err = ExperimentSession::<StandardPhase, VirtualTimer>::new(
            config,
            Vec::new(),
            test_layout(),
            VirtualTimer::new(),
        )
        .unwrap_err();
        assert_eq!(err, TrialError::MissingStimulus(LayerId::Mask));
    }

    #[test]
    fn empty_trial_list_skips_straight_to_debrief() {
        let mut session = ExperimentSession::<StandardPhase, VirtualTimer>::new(
            ExperimentConfig::default(),
            Vec::new(),
            test_layout(),
            VirtualTimer::new(),
        )
        .unwrap();
        session.handle_event(SessionEvent::Advance);
        run_calibration(&mut session);
        // The demonstration still runs on the example pair.
        run_current_trial(&mut session, 400);
        assert!(session.handle_event(SessionEvent::Advance));

        assert!(session.phase.is_debrief());
        assert_eq!(session.results().len(), 0);
        assert_eq!(session.summary().unwrap().trials_run, 0);
    }

    #[test]
    fn full_session_flow_appends_one_result_per_trial() {
        let mut session = test_session();
        assert!(session.phase.is_welcome());
        assert!(session.handle_event(SessionEvent::Advance));
        assert!(session.phase.requires_calibration());

        run_calibration(&mut session);
        assert!(session.phase.is_demonstration());

        // Demonstration trial is run but its result is discarded.
        run_current_trial(&mut session, 400);
        assert!(session.handle_event(SessionEvent::Advance));
        assert!(session.phase.is_experiment());
        assert_eq!(session.results().len(), 0);

        run_current_trial(&mut session, 350);
        assert_eq!(session.progress(), Some((1, 2)));
        assert!(session.handle_event(SessionEvent::Advance));
        run_current_trial(&mut session, 620);
        assert!(session.handle_event(SessionEvent::Advance));

        assert!(session.phase.is_debrief());
        assert_eq!(session.results().len(), 2);
        assert_eq!(session.results()[0].response.rt_ms, Some(350.0));
        assert_eq!(session.results()[1].response.rt_ms, Some(620.0));
        assert!(session.summary().is_some());

        assert!(!session.is_finished());
        assert!(session.handle_event(SessionEvent::Advance));
        assert!(session.is_finished());
    }

    #[test]
    fn premature_click_leaves_trial_running() {
        let mut session = test_session();
        session.handle_event(SessionEvent::Advance);
        run_calibration(&mut session);
        // Still at fixation in the demonstration; Advance must be ignored.
        assert!(!session.handle_event(SessionEvent::Advance));
        assert_eq!(session.stage(), Some(SequenceStage::Fixation));

        session.timer.advance(Duration::from_millis(1500));
        session.update().unwrap();
        session.timer.advance(Duration::from_millis(200));
        session.update().unwrap();
        // 200 ms elapsed <= 300 ms window: no transition.
        assert!(!session.handle_event(SessionEvent::Click { x: 10.0, y: 10.0 }));
        assert_eq!(session.stage(), Some(SequenceStage::Flicker));
    }

    #[test]
    fn abort_mid_trial_exports_partial_results() {
        let mut session = test_session();
        session.handle_event(SessionEvent::Advance);
        run_calibration(&mut session);
        run_current_trial(&mut session, 500);
        session.handle_event(SessionEvent::Advance); // into experiment
        run_current_trial(&mut session, 450);
        session.handle_event(SessionEvent::Advance); // trial 2 fixation

        session.timer.advance(Duration::from_millis(1500));
        session.update().unwrap();
        assert_eq!(session.stage(), Some(SequenceStage::Flicker));
        assert!(session.handle_event(SessionEvent::Abort));

        assert!(session.phase.is_debrief());
        assert_eq!(session.results().len(), 2);
        // The aborted trial contributes the all-None record.
        assert_eq!(session.results()[1].response, ResponseRecord::default());
        assert_eq!(session.summary().unwrap().trials_answered, 1);

        let mut out = Vec::new();
        session.export_json(&[], &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["trials"].as_array().unwrap().len(), 2);
        assert!(value["calibration"].is_object());
    }

    #[test]
    fn masks_rotate_round_robin_by_trial_index() {
        let mut session = test_session();
        session.handle_event(SessionEvent::Advance);
        run_calibration(&mut session);
        run_current_trial(&mut session, 500);
        session.handle_event(SessionEvent::Advance);

        // Trial 0 uses mask_1.
        session.timer.advance(Duration::from_millis(1500));
        session.update().unwrap();
        session.timer.advance(Duration::from_millis(100));
        session.update().unwrap();
        assert_eq!(session.visible_stimulus().unwrap().source, "mask_1.png");
    }
}
