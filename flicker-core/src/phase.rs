/// Defines session phases and their behavior
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + std::fmt::Debug + Default {
    fn allows_input(&self) -> bool;
    fn requires_calibration(&self) -> bool;
    fn next(&self) -> Option<Self>;

    fn is_demonstration(&self) -> bool {
        false
    }
    fn is_experiment(&self) -> bool {
        false
    }
    fn is_welcome(&self) -> bool {
        false
    }
    fn is_debrief(&self) -> bool {
        false
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Default)]
pub enum StandardPhase {
    #[default]
    Welcome,
    Calibration,
    Demonstration,
    Experiment,
    Debrief,
}

impl Phase for StandardPhase {
    fn allows_input(&self) -> bool {
        !matches!(self, Self::Calibration)
    }
    fn requires_calibration(&self) -> bool {
        matches!(self, Self::Calibration)
    }
    fn next(&self) -> Option<Self> {
        use StandardPhase::*;
        Some(match self {
            Welcome => Calibration,
            Calibration => Demonstration,
            Demonstration => Experiment,
            Experiment => Debrief,
            Debrief => return None,
        })
    }

    fn is_demonstration(&self) -> bool {
        matches!(self, StandardPhase::Demonstration)
    }

    fn is_experiment(&self) -> bool {
        matches!(self, StandardPhase::Experiment)
    }

    fn is_welcome(&self) -> bool {
        matches!(self, StandardPhase::Welcome)
    }

    fn is_debrief(&self) -> bool {
        matches!(self, StandardPhase::Debrief)
    }
}
