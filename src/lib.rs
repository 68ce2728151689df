//! # glcache
//!
//! Context-aware identity and upload cache for GL-style texture and
//! buffer objects.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Texture2d`] - A logical 2D texture with lazily created
//!   per-share-group server handles and generation-tracked uploads
//! - [`GlBuffer`] - A buffer object owned by a single share group
//! - [`GlBackend`](backend::GlBackend) - Trait abstracting the driver:
//!   contexts, share groups, capabilities, and server entry points
//! - [`dds`] - DDS container parsing for DXT1/DXT3/DXT5 payloads
//! - A recording [`MockGl`](backend::mock::MockGl) backend for testing
//!
//! All client-side mutation is deferred: setters only bump generation
//! counters, and `bind()` reconciles the server copy for the current
//! context's share group.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use glcache::backend::mock::MockGl;
//! use glcache::{GlBackend, Texture2d};
//!
//! let gl = Arc::new(MockGl::new());
//! let ctx = gl.create_context();
//! gl.make_current(ctx);
//!
//! let texture = Texture2d::new(gl.clone());
//! texture.set_size(64, 64);
//! assert!(texture.bind());
//! assert!(texture.texture_id(ctx).is_some());
//! ```

pub mod backend;
pub mod buffer;
pub mod dds;
pub mod error;
pub mod lifecycle;
pub mod texture;
pub mod types;

// Re-export main types for convenience
pub use backend::{
    BufferHandle, Capabilities, ContextId, GlBackend, ShareGroupId, TextureHandle,
};
pub use buffer::GlBuffer;
pub use dds::{CompressionFormat, DdsImage};
pub use error::DdsError;
pub use lifecycle::{ContextLifecycle, LifecycleObserver};
pub use texture::Texture2d;
pub use types::{
    BufferKind, MapAccess, TextureFilter, TextureParameters, UsagePattern, WrapMode,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
