use criterion::{Criterion, black_box, criterion_group, criterion_main};
use flicker_core::{BoundingBox, ImageStimulus, SurfaceLayout};
use flicker_experiment::{FlickerTrial, StimulusCycler, TrialConfig};

fn trial_config() -> TrialConfig<ImageStimulus> {
    TrialConfig {
        first: ImageStimulus::upright("scene_a.png"),
        second: ImageStimulus::upright("scene_b.png"),
        mask: ImageStimulus::upright("mask_1.png"),
        phase_duration_ms: 100,
        response_target: "stimulus".to_string(),
        prompt: None,
        valid_response_factor: 3,
    }
}

fn surface_layout() -> SurfaceLayout {
    let mut layout = SurfaceLayout::new();
    layout.insert("stimulus", BoundingBox::new(0.0, 0.0, 873.0, 491.0));
    layout
}

/// The per-frame cost of driving the presentation cycle.
fn bench_cycler_poll(c: &mut Criterion) {
    c.bench_function("cycler_poll", |b| {
        let mut cycler = StimulusCycler::new(100).unwrap();
        cycler.start(0);
        let mut now_ns = 0u64;
        b.iter(|| {
            now_ns += 16_666_667;
            black_box(cycler.poll(black_box(now_ns)));
        });
    });
}

/// Full trial step: begin, a few polls, one accepted click.
fn bench_trial_lifecycle(c: &mut Criterion) {
    let layout = surface_layout();
    c.bench_function("trial_lifecycle", |b| {
        b.iter(|| {
            let mut trial = FlickerTrial::new(trial_config()).unwrap();
            trial.begin(&layout, 0).unwrap();
            for step in 1..=20u64 {
                trial.poll(step * 16_666_667);
            }
            black_box(trial.handle_click(333_333_340, 436.5, 245.5))
        });
    });
}

criterion_group!(benches, bench_cycler_poll, bench_trial_lifecycle);
criterion_main!(benches);
