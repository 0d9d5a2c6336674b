pub mod capture;
pub mod config;
pub mod cycler;
pub mod error;
pub mod monitor;
pub mod session;
pub mod simulate;
pub mod trial;

pub use capture::{ClickOutcome, ResponseCapture};
pub use config::{ExperimentConfig, TrialSpec, load_trial_list};
pub use cycler::StimulusCycler;
pub use error::TrialError;
pub use monitor::{InteractionEvent, InteractionKind, InteractionMonitor, UiMode};
pub use session::{ExperimentSession, SessionEvent};
pub use simulate::{SimulationMode, SimulationOptions, simulate};
pub use trial::{FlickerTrial, TrialConfig};
