use crate::images::ImageBank;
use ab_glyph::{Font, FontArc, Glyph, PxScale, ScaleFont, point};
use anyhow::{Result, anyhow};
use flicker_cache::Atom;
use flicker_core::{
    BoundingBox, ImageStimulus, Phase, SequenceStage, SessionSummary, Stimulus, SurfaceLayout,
};
use std::collections::HashMap;
use std::sync::Arc;
use tiny_skia::{
    Color, FilterQuality, Paint, Pixmap, PixmapPaint, PremultipliedColorU8, Rect, Transform,
};

const HEADING_PX: f32 = 32.0;
const BODY_PX: f32 = 24.0;

/// Computes the named clickable regions for a canvas size: the `"stimulus"`
/// region is the configured display rectangle centered on the canvas.
pub fn layout_regions(width: u32, height: u32, stim_width: u32, stim_height: u32) -> SurfaceLayout {
    let mut layout = SurfaceLayout::new();
    layout.insert(
        "stimulus",
        BoundingBox::new(
            (f64::from(width) - f64::from(stim_width)) / 2.0,
            (f64::from(height) - f64::from(stim_height)) / 2.0,
            f64::from(stim_width),
            f64::from(stim_height),
        ),
    );
    layout
}

/// Rasterizes a single text line into a transparent premultiplied pixmap.
pub fn raster_text(text: &str, font_size: f32, font: &FontArc, color: Color) -> Pixmap {
    let scale = PxScale::from(font_size);
    let scaled = font.as_scaled(scale);

    // Lay out with the baseline at the ascent.
    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += scaled.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, scaled.ascent()),
        });
        pen_x += scaled.h_advance(id);
    }

    // Union of outlined pixel bounds.
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for glyph in &glyphs {
        if let Some(outline) = font.outline_glyph(glyph.clone()) {
            let bounds = outline.px_bounds();
            min_x = min_x.min(bounds.min.x);
            min_y = min_y.min(bounds.min.y);
            max_x = max_x.max(bounds.max.x);
            max_y = max_y.max(bounds.max.y);
        }
    }
    if min_x == f32::INFINITY {
        return Pixmap::new(1, 1).expect("1x1 pixmap");
    }

    let width = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let height = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pixmap = Pixmap::new(width, height).expect("text pixmap");

    let rgba = [
        (color.red() * 255.0) as u8,
        (color.green() * 255.0) as u8,
        (color.blue() * 255.0) as u8,
        (color.alpha() * 255.0) as u8,
    ];
    let stride = width as usize;
    let pixels = pixmap.pixels_mut();

    for glyph in &glyphs {
        if let Some(outline) = font.outline_glyph(glyph.clone()) {
            let bounds = outline.px_bounds();
            outline.draw(|x, y, coverage| {
                if coverage <= f32::EPSILON {
                    return;
                }
                let px = (x as f32 + bounds.min.x - min_x).floor() as i32;
                let py = (y as f32 + bounds.min.y - min_y).floor() as i32;
                if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                    return;
                }
                let index = py as usize * stride + px as usize;

                // Premultiply by coverage; keep the denser of overlapping
                // glyph edges rather than blending them twice.
                let alpha = (coverage * rgba[3] as f32 / 255.0).clamp(0.0, 1.0);
                if (alpha * 255.0) as u8 <= pixels[index].alpha() {
                    return;
                }
                let premultiplied = PremultipliedColorU8::from_rgba(
                    (rgba[0] as f32 * alpha) as u8,
                    (rgba[1] as f32 * alpha) as u8,
                    (rgba[2] as f32 * alpha) as u8,
                    (alpha * 255.0) as u8,
                );
                if let Some(value) = premultiplied {
                    pixels[index] = value;
                }
            });
        }
    }

    pixmap
}

struct TextCache {
    font: FontArc,
    size_px: f32,
    map: HashMap<Atom, Arc<Pixmap>>,
}

impl TextCache {
    fn new(font: FontArc, size_px: f32) -> Self {
        Self {
            font,
            size_px,
            map: HashMap::new(),
        }
    }

    fn get_or_render(&mut self, text: &str) -> Arc<Pixmap> {
        let atom = Atom::from(text);
        if let Some(pixmap) = self.map.get(&atom) {
            return Arc::clone(pixmap);
        }
        let pixmap = Arc::new(raster_text(
            text,
            self.size_px,
            &self.font,
            Color::from_rgba8(255, 255, 255, 255),
        ));
        self.map.insert(atom, Arc::clone(&pixmap));
        pixmap
    }
}

/// Software renderer painting session frames into an RGBA buffer.
pub struct SkiaRenderer {
    width: u32,
    height: u32,
    stimulus_size: (u32, u32),
    heading_cache: TextCache,
    body_cache: TextCache,
    pub images: ImageBank,
    canvas: Pixmap,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32, stimulus_size: (u32, u32), font: FontArc) -> Result<Self> {
        let mut canvas =
            Pixmap::new(width, height).ok_or_else(|| anyhow!("zero-sized canvas"))?;
        canvas.fill(Color::from_rgba8(0, 0, 0, 255));
        Ok(Self {
            width,
            height,
            stimulus_size,
            heading_cache: TextCache::new(font.clone(), HEADING_PX),
            body_cache: TextCache::new(font, BODY_PX),
            images: ImageBank::new(),
            canvas,
        })
    }

    pub fn resize(&mut self, new_width: u32, new_height: u32) -> Result<()> {
        self.width = new_width;
        self.height = new_height;
        self.canvas =
            Pixmap::new(new_width, new_height).ok_or_else(|| anyhow!("zero-sized canvas"))?;
        self.canvas.fill(Color::from_rgba8(0, 0, 0, 255));
        Ok(())
    }

    pub fn layout(&self) -> SurfaceLayout {
        layout_regions(
            self.width,
            self.height,
            self.stimulus_size.0,
            self.stimulus_size.1,
        )
    }

    pub fn load_image(&mut self, name: &str, bytes: &[u8]) -> Result<usize> {
        self.images.insert_encoded(name, bytes)
    }

    fn center(&self) -> (f32, f32) {
        (self.width as f32 / 2.0, self.height as f32 / 2.0)
    }

    fn stimulus_bbox(&self) -> BoundingBox {
        self.layout()
            .region("stimulus")
            .expect("layout always carries the stimulus region")
    }

    fn draw_heading(&mut self, text: &str, pos: (f32, f32)) {
        let pixmap = self.heading_cache.get_or_render(text);
        Self::blit_centered(&mut self.canvas, &pixmap, pos);
    }

    fn draw_body(&mut self, text: &str, pos: (f32, f32)) {
        let pixmap = self.body_cache.get_or_render(text);
        Self::blit_centered(&mut self.canvas, &pixmap, pos);
    }

    fn blit_centered(canvas: &mut Pixmap, pixmap: &Pixmap, pos: (f32, f32)) {
        let x = (pos.0 - pixmap.width() as f32 / 2.0).floor() as i32;
        let y = (pos.1 - pixmap.height() as f32 / 2.0).floor() as i32;
        canvas.draw_pixmap(
            x,
            y,
            pixmap.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    fn draw_fixation_cross(&mut self) {
        let (cx, cy) = self.center();
        let mut paint = Paint::default();
        paint.anti_alias = false;
        paint.set_color(Color::from_rgba8(255, 255, 255, 255));
        let arm = 20.0;
        let thickness = 2.0;
        if let Some(horizontal) =
            Rect::from_xywh(cx - arm, cy - thickness / 2.0, arm * 2.0, thickness)
        {
            self.canvas
                .fill_rect(horizontal, &paint, Transform::identity(), None);
        }
        if let Some(vertical) = Rect::from_xywh(cx - thickness / 2.0, cy - arm, thickness, arm * 2.0)
        {
            self.canvas
                .fill_rect(vertical, &paint, Transform::identity(), None);
        }
    }

    /// Blits the stimulus into the stimulus region, applying the mirroring
    /// transforms and scaling to the configured display size.
    fn draw_stimulus(&mut self, stimulus: &ImageStimulus) -> Result<()> {
        let bbox = self.stimulus_bbox();
        let pixmap = self
            .images
            .get(stimulus.cache_id())
            .ok_or_else(|| anyhow!("stimulus image `{}` is not loaded", stimulus.source))?;

        let mut sx = bbox.width as f32 / pixmap.width() as f32;
        let mut sy = bbox.height as f32 / pixmap.height() as f32;
        let mut tx = bbox.left as f32;
        let mut ty = bbox.top as f32;
        if stimulus.flip_x {
            sx = -sx;
            tx += bbox.width as f32;
        }
        if stimulus.flip_y {
            sy = -sy;
            ty += bbox.height as f32;
        }
        let transform = Transform::from_row(sx, 0.0, 0.0, sy, tx, ty);
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        self.canvas
            .draw_pixmap(0, 0, pixmap.as_ref(), &paint, transform, None);
        Ok(())
    }

    pub fn render_frame<P: Phase>(
        &mut self,
        phase: &P,
        stage: Option<SequenceStage>,
        stimulus: Option<&ImageStimulus>,
        prompt: Option<&str>,
        progress: Option<(usize, usize)>,
        summary: Option<&SessionSummary>,
        frame_buffer: &mut [u8],
    ) -> Result<()> {
        self.canvas.fill(Color::from_rgba8(0, 0, 0, 255));
        let (cx, cy) = self.center();

        match phase {
            p if p.is_welcome() => {
                self.draw_heading("WELCOME", (cx, cy - 40.0));
                self.draw_body(
                    "Two images will alternate and change in one spot.",
                    (cx, cy + 10.0),
                );
                self.draw_body("Click where the change occurs.", (cx, cy + 40.0));
                self.draw_body("Press SPACE to begin.", (cx, cy + 90.0));
            }
            p if p.requires_calibration() => {
                self.draw_heading("CALIBRATING...", (cx, cy));
            }
            p if p.is_demonstration() || p.is_experiment() => {
                match stage {
                    Some(SequenceStage::Fixation) => self.draw_fixation_cross(),
                    Some(SequenceStage::Flicker) => {
                        if let Some(stimulus) = stimulus {
                            self.draw_stimulus(stimulus)?;
                        }
                        if let Some(prompt) = prompt {
                            let below = self.stimulus_bbox();
                            let y = (below.top + below.height) as f32 + 40.0;
                            self.draw_body(prompt, (cx, y));
                        }
                    }
                    Some(SequenceStage::AwaitContinue) => {
                        self.draw_body("Press SPACE to continue.", (cx, cy));
                    }
                    None => {}
                }
                if let Some((current, total)) = progress {
                    self.draw_body(&format!("Trial: {current}/{total}"), (70.0, 30.0));
                }
                if p.is_demonstration() {
                    self.draw_heading("DEMONSTRATION", (cx, 30.0));
                }
            }
            p if p.is_debrief() => {
                self.draw_heading("Thank you!", (cx, cy - 80.0));
                if let Some(summary) = summary {
                    self.draw_body(
                        &format!(
                            "Trials answered: {}/{}",
                            summary.trials_answered, summary.trials_run
                        ),
                        (cx, cy - 20.0),
                    );
                    if let Some(mean) = summary.mean_rt_ms {
                        self.draw_body(&format!("Mean response time: {mean:.0} ms"), (cx, cy + 10.0));
                    }
                }
                self.draw_body("Press SPACE to exit.", (cx, cy + 60.0));
            }
            _ => {}
        }

        anyhow::ensure!(
            frame_buffer.len() == self.canvas.data().len(),
            "frame buffer size does not match canvas"
        );
        frame_buffer.copy_from_slice(self.canvas.data());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stimulus_region_is_centered() {
        let layout = layout_regions(1920, 1080, 873, 491);
        let bbox = layout.region("stimulus").unwrap();
        assert_eq!(bbox.left, (1920.0 - 873.0) / 2.0);
        assert_eq!(bbox.top, (1080.0 - 491.0) / 2.0);
        assert_eq!(bbox.width, 873.0);
        assert_eq!(bbox.height, 491.0);
    }

    #[test]
    fn small_canvas_still_yields_a_region() {
        // Smaller window than the stimulus: the region extends off-canvas
        // rather than disappearing, so clicks keep a consistent frame.
        let layout = layout_regions(640, 480, 873, 491);
        let bbox = layout.region("stimulus").unwrap();
        assert!(bbox.left < 0.0);
        assert_eq!(bbox.width, 873.0);
    }
}
