pub mod cycle;
pub mod phase;
pub mod stimulus;
pub mod surface;
pub mod trial;

pub use cycle::{CyclePhase, LayerId};
pub use phase::{Phase, StandardPhase};
pub use stimulus::{ImageStimulus, Stimulus};
pub use surface::{BoundingBox, SurfaceLayout};
pub use trial::{ResponseRecord, SequenceStage, SessionSummary, TrialResult, TrialState};
