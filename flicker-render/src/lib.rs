mod images;
pub mod render;

pub use images::ImageBank;
pub use render::{SkiaRenderer, layout_regions, raster_text};
