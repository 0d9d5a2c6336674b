use crate::capture::{ClickOutcome, ResponseCapture};
use crate::cycler::StimulusCycler;
use crate::error::TrialError;
use flicker_core::{LayerId, ResponseRecord, Stimulus, SurfaceLayout, TrialState};
use tracing::debug;

/// Declarative configuration of one flicker trial, immutable while it runs.
#[derive(Debug, Clone)]
pub struct TrialConfig<S: Stimulus> {
    pub first: S,
    pub second: S,
    pub mask: S,
    pub phase_duration_ms: u64,
    pub response_target: String,
    pub prompt: Option<String>,
    pub valid_response_factor: u32,
}

impl<S: Stimulus> TrialConfig<S> {
    pub fn validate(&self) -> Result<(), TrialError> {
        if self.phase_duration_ms == 0 {
            return Err(TrialError::NonPositiveDuration);
        }
        for (layer, stimulus) in [
            (LayerId::First, &self.first),
            (LayerId::Second, &self.second),
            (LayerId::Mask, &self.mask),
        ] {
            if stimulus.is_blank() {
                return Err(TrialError::MissingStimulus(layer));
            }
        }
        Ok(())
    }

    pub fn min_valid_elapsed_ns(&self) -> u64 {
        u64::from(self.valid_response_factor) * self.phase_duration_ms * 1_000_000
    }

    pub fn stimulus(&self, layer: LayerId) -> &S {
        match layer {
            LayerId::First => &self.first,
            LayerId::Second => &self.second,
            LayerId::Mask => &self.mask,
        }
    }
}

/// One flicker change-detection trial: cycles the three layers until the
/// first valid click, then finalizes exactly once.
///
/// States run `Idle -> Rendering -> Cycling -> Finalizing -> Done`; no
/// transition skips Cycling, and `terminate` is the single finalization
/// entry, reachable from the valid click and from an external abort.
#[derive(Debug, Clone)]
pub struct FlickerTrial<S: Stimulus> {
    config: TrialConfig<S>,
    state: TrialState,
    cycler: StimulusCycler,
    capture: ResponseCapture,
    started_ns: Option<u64>,
}

impl<S: Stimulus> FlickerTrial<S> {
    /// Validates eagerly; a malformed config never reaches `begin`.
    pub fn new(config: TrialConfig<S>) -> Result<Self, TrialError> {
        config.validate()?;
        let cycler = StimulusCycler::new(config.phase_duration_ms)?;
        Ok(Self {
            config,
            state: TrialState::Idle,
            cycler,
            capture: ResponseCapture::new(),
            started_ns: None,
        })
    }

    /// Resolves the response target against the layout, starts the cycle and
    /// arms the capture. A missing target fails before any timing starts.
    pub fn begin(&mut self, layout: &SurfaceLayout, now_ns: u64) -> Result<(), TrialError> {
        debug_assert_eq!(self.state, TrialState::Idle);
        self.state = TrialState::Rendering;
        let bbox = layout
            .region(&self.config.response_target)
            .ok_or_else(|| TrialError::MissingTarget(self.config.response_target.clone()))?;
        self.cycler.start(now_ns);
        self.capture
            .attach(bbox, now_ns, self.config.min_valid_elapsed_ns());
        self.started_ns = Some(now_ns);
        self.state = TrialState::Cycling;
        Ok(())
    }

    /// Drives the presentation cycle while the trial runs.
    pub fn poll(&mut self, now_ns: u64) -> u32 {
        if self.state == TrialState::Cycling {
            self.cycler.poll(now_ns)
        } else {
            0
        }
    }

    /// Routes a click through the capture. Returns the finished record when
    /// this click completed the trial.
    pub fn handle_click(&mut self, now_ns: u64, x: f64, y: f64) -> Option<ResponseRecord> {
        if self.state != TrialState::Cycling {
            return None;
        }
        match self.capture.handle_click(now_ns, x, y) {
            ClickOutcome::Accepted => self.terminate(),
            ClickOutcome::Premature => {
                debug!(elapsed_ns = now_ns.saturating_sub(self.started_ns.unwrap_or(now_ns)),
                       "premature click ignored");
                None
            }
            ClickOutcome::Detached => None,
        }
    }

    /// Idempotent finalization: stops the cycler and detaches the capture
    /// together. Yields the record exactly once; repeats return `None`.
    /// An aborted, unanswered trial yields the all-`None` record.
    pub fn terminate(&mut self) -> Option<ResponseRecord> {
        if self.state == TrialState::Done {
            return None;
        }
        self.state = TrialState::Finalizing;
        self.cycler.stop();
        self.capture.detach();
        let record = self.capture.take_record();
        self.state = TrialState::Done;
        Some(record)
    }

    pub fn visible_layer(&self) -> Option<LayerId> {
        self.cycler.visible_layer()
    }

    pub fn visible_stimulus(&self) -> Option<&S> {
        self.visible_layer().map(|layer| self.config.stimulus(layer))
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn config(&self) -> &TrialConfig<S> {
        &self.config
    }

    pub fn prompt(&self) -> Option<&str> {
        self.config.prompt.as_deref()
    }
}
