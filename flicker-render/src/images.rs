use anyhow::{Context, Result, anyhow};
use flicker_cache::intern;
use std::collections::HashMap;
use tiny_skia::Pixmap;

/// Decoded stimulus images, converted once to premultiplied pixmaps and
/// cached by interned source name.
#[derive(Debug, Default)]
pub struct ImageBank {
    images: HashMap<usize, Pixmap>,
}

impl ImageBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes an encoded image (PNG etc.) and caches it under `name`.
    pub fn insert_encoded(&mut self, name: &str, bytes: &[u8]) -> Result<usize> {
        let decoded = image::load_from_memory(bytes)
            .with_context(|| format!("failed to decode image `{name}`"))?
            .into_rgba8();
        let (width, height) = decoded.dimensions();
        self.insert_rgba(name, width, height, decoded.as_raw())
    }

    /// Caches straight-alpha RGBA pixels under `name`, premultiplying them.
    pub fn insert_rgba(&mut self, name: &str, width: u32, height: u32, rgba: &[u8]) -> Result<usize> {
        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("image `{name}` has zero dimension"))?;
        anyhow::ensure!(
            rgba.len() == (width * height * 4) as usize,
            "pixel buffer size mismatch for `{name}`"
        );
        for (dst, src) in pixmap.pixels_mut().iter_mut().zip(rgba.chunks_exact(4)) {
            let color = tiny_skia::ColorU8::from_rgba(src[0], src[1], src[2], src[3]);
            *dst = color.premultiply();
        }
        let id = intern(name);
        self.images.insert(id, pixmap);
        Ok(id)
    }

    pub fn get(&self, id: usize) -> Option<&Pixmap> {
        self.images.get(&id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.images.contains_key(&intern(name))
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba_pixels_are_premultiplied() {
        let mut bank = ImageBank::new();
        // One half-transparent red pixel.
        let id = bank.insert_rgba("px.png", 1, 1, &[255, 0, 0, 128]).unwrap();
        let pixmap = bank.get(id).unwrap();
        let px = pixmap.pixels()[0];
        assert_eq!(px.alpha(), 128);
        assert!(px.red() <= 128);
        assert_eq!(px.green(), 0);
    }

    #[test]
    fn lookup_is_by_interned_name() {
        let mut bank = ImageBank::new();
        bank.insert_rgba("mask_1.png", 2, 2, &[0u8; 16]).unwrap();
        assert!(bank.contains("mask_1.png"));
        assert!(!bank.contains("mask_2.png"));
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let mut bank = ImageBank::new();
        assert!(bank.insert_rgba("bad.png", 2, 2, &[0u8; 4]).is_err());
    }
}
