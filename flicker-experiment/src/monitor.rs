use serde::Serialize;
use tracing::warn;

/// Explicit UI-mode value, replacing a free-floating "should be in
/// fullscreen" flag: trial boundaries set it, focus events are judged
/// against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum UiMode {
    Fullscreen,
    #[default]
    Windowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InteractionKind {
    FocusLost,
    FocusGained,
}

/// One focus transition observed during the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InteractionEvent {
    pub kind: InteractionKind,
    pub t_ns: u64,
}

/// Records focus transitions while the session runs; the full event list is
/// exported with the results so analysis can flag distracted participants.
#[derive(Debug, Clone, Default)]
pub struct InteractionMonitor {
    mode: UiMode,
    events: Vec<InteractionEvent>,
}

impl InteractionMonitor {
    pub fn new(mode: UiMode) -> Self {
        Self {
            mode,
            events: Vec::new(),
        }
    }

    pub fn set_mode(&mut self, mode: UiMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> UiMode {
        self.mode
    }

    pub fn record_focus(&mut self, gained: bool, t_ns: u64) {
        let kind = if gained {
            InteractionKind::FocusGained
        } else {
            InteractionKind::FocusLost
        };
        if kind == InteractionKind::FocusLost && self.mode == UiMode::Fullscreen {
            warn!(t_ns, "participant left the experiment window");
        }
        self.events.push(InteractionEvent { kind, t_ns });
    }

    pub fn events(&self) -> &[InteractionEvent] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn focus_transitions_are_recorded_in_order() {
        let mut monitor = InteractionMonitor::new(UiMode::Fullscreen);
        monitor.record_focus(false, 10);
        monitor.record_focus(true, 20);
        assert_eq!(
            monitor.events(),
            &[
                InteractionEvent {
                    kind: InteractionKind::FocusLost,
                    t_ns: 10,
                },
                InteractionEvent {
                    kind: InteractionKind::FocusGained,
                    t_ns: 20,
                },
            ]
        );
    }

    #[test]
    fn mode_is_explicit_state() {
        let mut monitor = InteractionMonitor::default();
        assert_eq!(monitor.mode(), UiMode::Windowed);
        monitor.set_mode(UiMode::Fullscreen);
        assert_eq!(monitor.mode(), UiMode::Fullscreen);
    }
}
