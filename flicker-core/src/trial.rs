use serde::{Deserialize, Serialize};

/// Trial-level state machine. Finalizing is entered exactly once; Done is
/// terminal and marks the single hand-off of the finished record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrialState {
    #[default]
    Idle,
    Rendering,
    Cycling,
    Finalizing,
    Done,
}

/// Display stage of one trial sequence, as seen by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStage {
    Fixation,
    Flicker,
    AwaitContinue,
}

/// The participant's response, populated at most once per trial.
/// All fields stay `None` until the first accepted click and are never
/// overwritten afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub rt_ms: Option<f64>,
    pub click_x: Option<f64>,
    pub click_y: Option<f64>,
}

impl ResponseRecord {
    pub fn is_answered(&self) -> bool {
        self.rt_ms.is_some()
    }
}

/// Recorded result per trial. Field names are the analysis contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_index: usize,
    pub first: String,
    pub second: String,
    pub flip_x: bool,
    #[serde(flatten)]
    pub response: ResponseRecord,
    pub timestamp_ns: u64,
}

/// Aggregate response statistics computed at debrief.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub trials_run: usize,
    pub trials_answered: usize,
    pub response_rate: f64,
    pub mean_rt_ms: Option<f64>,
    pub min_rt_ms: Option<f64>,
    pub max_rt_ms: Option<f64>,
}

impl SessionSummary {
    pub fn from_results(results: &[TrialResult]) -> Self {
        let rts: Vec<f64> = results
            .iter()
            .filter_map(|r| r.response.rt_ms)
            .collect();
        let trials_run = results.len();
        let trials_answered = rts.len();
        let response_rate = if trials_run == 0 {
            0.0
        } else {
            trials_answered as f64 / trials_run as f64
        };
        let mean_rt_ms = if rts.is_empty() {
            None
        } else {
            Some(rts.iter().sum::<f64>() / rts.len() as f64)
        };
        let min_rt_ms = rts.iter().copied().reduce(f64::min);
        let max_rt_ms = rts.iter().copied().reduce(f64::max);
        Self {
            trials_run,
            trials_answered,
            response_rate,
            mean_rt_ms,
            min_rt_ms,
            max_rt_ms,
        }
    }
}
