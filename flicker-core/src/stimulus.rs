use flicker_cache::intern;

/// Defines stimuli and their render identity
pub trait Stimulus: Clone + Send + Sync + std::fmt::Debug {
    /// Stable ID keying the render cache for this stimulus content.
    fn cache_id(&self) -> usize;

    /// True when the stimulus carries no renderable content.
    fn is_blank(&self) -> bool {
        false
    }
}

/// A static scene image, optionally mirrored. The original study ran
/// horizontally mirrored and vertically inverted variants of each scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageStimulus {
    pub source: String,
    pub flip_x: bool,
    pub flip_y: bool,
}

impl ImageStimulus {
    pub fn new(source: impl Into<String>, flip_x: bool, flip_y: bool) -> Self {
        Self {
            source: source.into(),
            flip_x,
            flip_y,
        }
    }

    pub fn upright(source: impl Into<String>) -> Self {
        Self::new(source, false, false)
    }
}

impl Stimulus for ImageStimulus {
    fn cache_id(&self) -> usize {
        intern(&self.source)
    }

    fn is_blank(&self) -> bool {
        self.source.trim().is_empty()
    }
}
