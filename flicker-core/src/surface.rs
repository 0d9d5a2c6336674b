use std::collections::HashMap;

/// Screen-space rectangle of a clickable region, in buffer pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Click position as a fraction of this box. The top-left corner maps to
    /// (0, 0) and the bottom-right corner to (1, 1); clicks outside the box
    /// produce values outside that range.
    pub fn normalize(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.left) / self.width, (y - self.top) / self.height)
    }

    /// Inverse of [`normalize`](Self::normalize), used to aim synthetic clicks.
    pub fn denormalize(&self, nx: f64, ny: f64) -> (f64, f64) {
        (self.left + nx * self.width, self.top + ny * self.height)
    }

    pub fn center(&self) -> (f64, f64) {
        self.denormalize(0.5, 0.5)
    }
}

/// Named clickable regions of the display surface for one frame size.
#[derive(Debug, Clone, Default)]
pub struct SurfaceLayout {
    regions: HashMap<String, BoundingBox>,
}

impl SurfaceLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bbox: BoundingBox) {
        self.regions.insert(name.into(), bbox);
    }

    pub fn region(&self, name: &str) -> Option<BoundingBox> {
        self.regions.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn corners_normalize_to_unit_range() {
        let bbox = BoundingBox::new(100.0, 50.0, 873.0, 491.0);
        assert_eq!(bbox.normalize(100.0, 50.0), (0.0, 0.0));
        assert_eq!(bbox.normalize(973.0, 541.0), (1.0, 1.0));
    }

    #[test]
    fn outside_clicks_exceed_unit_range() {
        let bbox = BoundingBox::new(100.0, 100.0, 200.0, 100.0);
        let (nx, ny) = bbox.normalize(50.0, 250.0);
        assert!(nx < 0.0);
        assert!(ny > 1.0);
    }

    #[test]
    fn layout_lookup() {
        let mut layout = SurfaceLayout::new();
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        layout.insert("stimulus", bbox);
        assert_eq!(layout.region("stimulus"), Some(bbox));
        assert_eq!(layout.region("missing"), None);
    }
}
