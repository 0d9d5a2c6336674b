use flicker_core::{BoundingBox, ResponseRecord};

/// Outcome of routing one click through the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// No listener is armed; the click is dropped.
    Detached,
    /// The click landed before the validity window opened. No state change;
    /// the capture stays armed.
    Premature,
    /// The click is past the validity window. The first such click wrote the
    /// record; every one of them asks the trial to terminate.
    Accepted,
}

/// One-shot click listener: validates click timing against the minimum
/// elapsed window and normalizes the position against the armed bounding box.
/// First valid click wins; the record is never overwritten.
#[derive(Debug, Clone, Default)]
pub struct ResponseCapture {
    armed: Option<Armed>,
    record: ResponseRecord,
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    bbox: BoundingBox,
    start_ns: u64,
    min_valid_elapsed_ns: u64,
}

impl ResponseCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the listener. `min_valid_elapsed_ns` is the rejection window
    /// measured from `start_ns`; a click at exactly the window boundary is
    /// still rejected.
    pub fn attach(&mut self, bbox: BoundingBox, start_ns: u64, min_valid_elapsed_ns: u64) {
        self.armed = Some(Armed {
            bbox,
            start_ns,
            min_valid_elapsed_ns,
        });
    }

    pub fn handle_click(&mut self, now_ns: u64, x: f64, y: f64) -> ClickOutcome {
        let Some(armed) = self.armed else {
            return ClickOutcome::Detached;
        };
        let elapsed_ns = now_ns.saturating_sub(armed.start_ns);
        if elapsed_ns <= armed.min_valid_elapsed_ns {
            return ClickOutcome::Premature;
        }
        if !self.record.is_answered() {
            let (nx, ny) = armed.bbox.normalize(x, y);
            self.record = ResponseRecord {
                rt_ms: Some(elapsed_ns as f64 / 1e6),
                click_x: Some(nx),
                click_y: Some(ny),
            };
        }
        ClickOutcome::Accepted
    }

    /// Disarms the listener. Never errors when already detached.
    pub fn detach(&mut self) {
        self.armed = None;
    }

    pub fn is_attached(&self) -> bool {
        self.armed.is_some()
    }

    pub fn record(&self) -> &ResponseRecord {
        &self.record
    }

    pub fn take_record(&mut self) -> ResponseRecord {
        std::mem::take(&mut self.record)
    }
}
