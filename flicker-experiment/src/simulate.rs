use crate::error::TrialError;
use crate::trial::{FlickerTrial, TrialConfig};
use flicker_core::{BoundingBox, ResponseRecord, Stimulus, SurfaceLayout};
use flicker_timing::Timer;
use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};
use std::time::Duration;
use tracing::debug;

/// Synthetic display surface used by visual simulation; no window required.
const SIM_SURFACE: (f64, f64) = (1024.0, 768.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationMode {
    /// Synthesize a plausible record directly, with no layout or rendering.
    DataOnly,
    /// Run the real trial path and dispatch a synthetic click at the
    /// synthesized latency.
    Visual,
}

/// Pins for deterministic simulated trials. Unpinned values are drawn from
/// the ex-Gaussian latency model and uniform coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationOptions {
    pub rt_ms: Option<f64>,
    /// Normalized click position within the response target.
    pub click: Option<(f64, f64)>,
}

/// Latency model: Normal(500, 50) + Exp(mean 150) ms, resampled until positive.
fn synthesize_latency_ms<R: Rng>(rng: &mut R) -> f64 {
    let normal = Normal::new(500.0, 50.0).expect("valid normal parameters");
    let exp = Exp::new(1.0 / 150.0).expect("valid exponential rate");
    loop {
        let rt = normal.sample(rng) + exp.sample(rng);
        if rt > 0.0 {
            return rt;
        }
    }
}

fn synthesize_record<R: Rng>(options: &SimulationOptions, rng: &mut R) -> ResponseRecord {
    let rt_ms = options.rt_ms.unwrap_or_else(|| synthesize_latency_ms(rng));
    let (click_x, click_y) = options
        .click
        .unwrap_or_else(|| (rng.random_range(0.0..=1.0), rng.random_range(0.0..=1.0)));
    ResponseRecord {
        rt_ms: Some(rt_ms),
        click_x: Some(click_x),
        click_y: Some(click_y),
    }
}

/// Runs one simulated trial. `ready` fires once the trial has been set up
/// (data computed, or the real trial begun), before the synthetic response
/// is produced.
pub fn simulate<S, T, R, F>(
    config: &TrialConfig<S>,
    mode: SimulationMode,
    options: SimulationOptions,
    timer: &mut T,
    rng: &mut R,
    ready: F,
) -> Result<ResponseRecord, TrialError>
where
    S: Stimulus,
    T: Timer<Timestamp = u64>,
    R: Rng,
    F: FnOnce(),
{
    match mode {
        SimulationMode::DataOnly => {
            config.validate()?;
            ready();
            Ok(synthesize_record(&options, rng))
        }
        SimulationMode::Visual => simulate_visual(config, options, timer, rng, ready),
    }
}

fn simulate_visual<S, T, R, F>(
    config: &TrialConfig<S>,
    options: SimulationOptions,
    timer: &mut T,
    rng: &mut R,
    ready: F,
) -> Result<ResponseRecord, TrialError>
where
    S: Stimulus,
    T: Timer<Timestamp = u64>,
    R: Rng,
    F: FnOnce(),
{
    let mut layout = SurfaceLayout::new();
    layout.insert(
        config.response_target.clone(),
        BoundingBox::new(0.0, 0.0, SIM_SURFACE.0, SIM_SURFACE.1),
    );
    let bbox = layout
        .region(&config.response_target)
        .expect("region inserted above");

    let mut trial = FlickerTrial::new(config.clone())?;
    let start_ns = timer.now();
    trial.begin(&layout, start_ns)?;
    ready();

    let synthesized = synthesize_record(&options, rng);
    // Floor the latency just above the validity window so the dispatched
    // click always lands; a shorter one would be rejected and the trial
    // would never end.
    let rt_ns = ((synthesized.rt_ms.unwrap_or(0.0) * 1e6) as u64)
        .max(config.min_valid_elapsed_ns() + 1_000_000);
    let phase_step = Duration::from_millis(config.phase_duration_ms);

    while timer.now().saturating_sub(start_ns) < rt_ns {
        trial.poll(timer.now());
        let remaining_ns = rt_ns - timer.now().saturating_sub(start_ns);
        timer.sleep(phase_step.min(Duration::from_nanos(remaining_ns)));
    }
    trial.poll(timer.now());

    let (nx, ny) = (
        synthesized.click_x.unwrap_or(0.5),
        synthesized.click_y.unwrap_or(0.5),
    );
    let (x, y) = bbox.denormalize(nx, ny);
    debug!(rt_ns, nx, ny, "dispatching synthetic click");
    let record = trial
        .handle_click(timer.now(), x, y)
        .expect("floored latency is past the validity window");
    Ok(record)
}
