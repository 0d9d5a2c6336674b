mod cache;

pub use cache::{Atom, intern, interned_count, resolve};
