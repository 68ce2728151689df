//! Value types shared across the resource cache.

mod buffer;
mod texture;

pub use buffer::{BufferKind, MapAccess, UsagePattern};
pub use texture::{TextureFilter, TextureParameters, WrapMode};
