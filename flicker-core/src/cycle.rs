use serde::{Deserialize, Serialize};

/// The three visual layers of a flicker trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerId {
    First,
    Second,
    Mask,
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LayerId::First => "first",
            LayerId::Second => "second",
            LayerId::Mask => "mask",
        };
        f.write_str(name)
    }
}

/// The four-step presentation cycle: first image, mask, second image, mask.
///
/// The mask fills both gaps, so exactly one layer is visible at any instant
/// while the cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePhase {
    #[default]
    First,
    MaskAfterFirst,
    Second,
    MaskAfterSecond,
}

impl CyclePhase {
    /// Strict cyclic successor: First -> MaskAfterFirst -> Second -> MaskAfterSecond -> First.
    pub fn next(self) -> Self {
        match self {
            CyclePhase::First => CyclePhase::MaskAfterFirst,
            CyclePhase::MaskAfterFirst => CyclePhase::Second,
            CyclePhase::Second => CyclePhase::MaskAfterSecond,
            CyclePhase::MaskAfterSecond => CyclePhase::First,
        }
    }

    pub fn visible_layer(self) -> LayerId {
        match self {
            CyclePhase::First => LayerId::First,
            CyclePhase::Second => LayerId::Second,
            CyclePhase::MaskAfterFirst | CyclePhase::MaskAfterSecond => LayerId::Mask,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            CyclePhase::First => 0,
            CyclePhase::MaskAfterFirst => 1,
            CyclePhase::Second => 2,
            CyclePhase::MaskAfterSecond => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cycle_is_strictly_periodic() {
        let mut phase = CyclePhase::default();
        let mut indices = Vec::new();
        for _ in 0..9 {
            indices.push(phase.index());
            phase = phase.next();
        }
        assert_eq!(indices, vec![0, 1, 2, 3, 0, 1, 2, 3, 0]);
    }

    #[test]
    fn mask_fills_both_gaps() {
        assert_eq!(CyclePhase::First.visible_layer(), LayerId::First);
        assert_eq!(CyclePhase::MaskAfterFirst.visible_layer(), LayerId::Mask);
        assert_eq!(CyclePhase::Second.visible_layer(), LayerId::Second);
        assert_eq!(CyclePhase::MaskAfterSecond.visible_layer(), LayerId::Mask);
    }
}
