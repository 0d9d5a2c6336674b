use crate::error::TrialError;
use flicker_core::LayerId;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Session-level settings. The defaults mirror the constants of the original
/// flicker change-detection study.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Duration of each of the four presentation cycle phases.
    pub phase_duration_ms: u64,
    /// Blank fixation period between trials.
    pub inter_trial_ms: u64,
    /// Multiplier on `phase_duration_ms` giving the minimum elapsed time
    /// before a click counts as a response.
    pub valid_response_factor: u32,
    /// Displayed stimulus size in buffer pixels.
    pub stimulus_width: u32,
    pub stimulus_height: u32,
    /// Name of the clickable surface region.
    pub response_target: String,
    /// Optional prompt shown under the stimulus.
    pub prompt: Option<String>,
    /// Mask images, assigned round-robin by trial index.
    pub masks: Vec<String>,
    /// Image pair used for the demonstration trial.
    pub example_first: String,
    pub example_second: String,
    /// Vertical flip applied to every scene image (inverted variant).
    pub flip_y: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            phase_duration_ms: 100,
            inter_trial_ms: 1500,
            valid_response_factor: 3,
            stimulus_width: 873,
            stimulus_height: 491,
            response_target: "stimulus".to_string(),
            prompt: None,
            masks: (1..=5).map(|i| format!("mask_{i}.png")).collect(),
            example_first: "example_a.png".to_string(),
            example_second: "example_b.png".to_string(),
            flip_y: false,
        }
    }
}

impl ExperimentConfig {
    pub fn from_reader(reader: impl Read) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }

    pub fn min_valid_elapsed_ns(&self) -> u64 {
        u64::from(self.valid_response_factor) * self.phase_duration_ms * 1_000_000
    }

    /// Rejects settings no trial could run with. User-supplied config files
    /// go through this before any trial machinery is built.
    pub fn validate(&self) -> Result<(), TrialError> {
        if self.phase_duration_ms == 0 {
            return Err(TrialError::NonPositiveDuration);
        }
        if self.masks.is_empty() || self.masks.iter().any(|m| m.trim().is_empty()) {
            return Err(TrialError::MissingStimulus(LayerId::Mask));
        }
        Ok(())
    }
}

/// One row of the trial list: the image pair and whether it is mirrored.
/// The list file is a JSON array of `[first, second, flip_x]` triples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String, bool)", into = "(String, String, bool)")]
pub struct TrialSpec {
    pub first: String,
    pub second: String,
    pub flip_x: bool,
}

impl From<(String, String, bool)> for TrialSpec {
    fn from((first, second, flip_x): (String, String, bool)) -> Self {
        Self {
            first,
            second,
            flip_x,
        }
    }
}

impl From<TrialSpec> for (String, String, bool) {
    fn from(spec: TrialSpec) -> Self {
        (spec.first, spec.second, spec.flip_x)
    }
}

pub fn load_trial_list(reader: impl Read) -> serde_json::Result<Vec<TrialSpec>> {
    serde_json::from_reader(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_study_constants() {
        let config = ExperimentConfig::default();
        assert_eq!(config.phase_duration_ms, 100);
        assert_eq!(config.inter_trial_ms, 1500);
        assert_eq!(config.valid_response_factor, 3);
        assert_eq!(config.stimulus_width, 873);
        assert_eq!(config.stimulus_height, 491);
        assert_eq!(config.masks.len(), 5);
        assert_eq!(config.min_valid_elapsed_ns(), 300_000_000);
    }

    #[test]
    fn validation_rejects_unrunnable_settings() {
        let mut config = ExperimentConfig::default();
        config.masks.clear();
        assert_eq!(
            config.validate().unwrap_err(),
            TrialError::MissingStimulus(LayerId::Mask)
        );

        let mut config = ExperimentConfig::default();
        config.phase_duration_ms = 0;
        assert_eq!(config.validate().unwrap_err(), TrialError::NonPositiveDuration);

        assert!(ExperimentConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: ExperimentConfig =
            serde_json::from_str(r#"{"phase_duration_ms": 250, "flip_y": true}"#).unwrap();
        assert_eq!(config.phase_duration_ms, 250);
        assert!(config.flip_y);
        assert_eq!(config.response_target, "stimulus");
    }

    #[test]
    fn trial_list_parses_array_of_triples() {
        let json = r#"[["scene_1a.png", "scene_1b.png", false],
                       ["scene_2a.png", "scene_2b.png", true]]"#;
        let list = load_trial_list(json.as_bytes()).unwrap();
        assert_eq!(
            list,
            vec![
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
            ]
        );
    }
}
