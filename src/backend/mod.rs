//! GL driver abstraction layer.
//!
//! The cache never talks to a graphics driver directly. Everything it
//! needs — the ambient "current context" oracle, capability queries and
//! the server entry points for texture and buffer objects — is expressed
//! through the [`GlBackend`] trait, so the cache can run against a real
//! driver binding or against the recording [`MockGl`](mock::MockGl)
//! backend in tests.
//!
//! Contexts are opaque [`ContextId`]s. Contexts that share server-side
//! object identifiers belong to one [`ShareGroupId`]; handles allocated
//! under any context of a group are valid in all of them and invalid
//! everywhere else.

pub mod mock;

use std::num::NonZeroU32;
use std::ptr::NonNull;

use bitflags::bitflags;

use crate::lifecycle::ContextLifecycle;
use crate::types::{BufferKind, MapAccess, TextureParameters, UsagePattern};

/// Identity of a rendering context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

/// Identity of a context-sharing group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShareGroupId(pub u64);

/// Server-side texture object identifier, valid within one share group.
///
/// Non-zero by construction; the "no texture" case is expressed with
/// `Option<TextureHandle>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub NonZeroU32);

/// Server-side buffer object identifier, valid within one share group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub NonZeroU32);

bitflags! {
    /// Driver capability flags.
    ///
    /// Stands in for extension-function probing: a backend resolves its
    /// entry points once and reports what it found here. Every flag maps
    /// to a graceful degradation in the cache rather than a hard error.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Non-power-of-two texture sizes are accepted.
        const NPOT_TEXTURES = 1 << 0;
        /// The server can generate mipmaps on upload.
        const GENERATE_MIPMAP = 1 << 1;
        /// S3TC block-compressed uploads are accepted.
        const S3TC_COMPRESSION = 1 << 2;
        /// Buffer objects exist at all.
        const BUFFER_OBJECTS = 1 << 3;
        /// Buffers can be mapped into client memory.
        const MAP_BUFFER = 1 << 4;
        /// Buffer contents can be read back to the client.
        const BUFFER_READBACK = 1 << 5;
        /// The stream usage hints are understood.
        const STREAM_DRAW = 1 << 6;
        /// The mirrored-repeat wrap mode is understood.
        const MIRRORED_REPEAT = 1 << 7;
        /// The clamp-to-border wrap mode is understood.
        const CLAMP_TO_BORDER = 1 << 8;
    }
}

/// GL driver backend trait.
///
/// All server round-trips are synchronous, bounded and non-cancellable.
/// Operations that touch server objects are only well-defined while a
/// context of the right share group is current; the cache checks that
/// precondition before calling in.
pub trait GlBackend: Send + Sync {
    /// The context current on the calling thread, if any.
    fn current_context(&self) -> Option<ContextId>;

    /// The sharing group a live context belongs to.
    ///
    /// Returns `None` for contexts the backend no longer knows about.
    fn share_group(&self, context: ContextId) -> Option<ShareGroupId>;

    /// Returns true if `a` and `b` share server-side objects.
    fn are_sharing(&self, a: ContextId, b: ContextId) -> bool;

    /// Make `context` current. Returns false if the context is gone.
    fn make_current(&self, context: ContextId) -> bool;

    /// Release the current context without making another current.
    fn done_current(&self);

    /// Driver capability flags. Constant for the backend's lifetime.
    fn capabilities(&self) -> Capabilities;

    /// The context-destruction notifier for this driver.
    fn lifecycle(&self) -> &ContextLifecycle;

    // Texture object entry points.

    /// Allocate a texture handle in the current share group.
    fn gen_texture(&self) -> Option<TextureHandle>;

    /// Delete a texture handle in the current share group.
    fn delete_texture(&self, handle: TextureHandle);

    /// Bind `handle` to the 2D texture target, or unbind with `None`.
    fn bind_texture(&self, handle: Option<TextureHandle>);

    /// Apply the full sampling parameter set to the bound texture.
    fn apply_texture_parameters(&self, params: &TextureParameters);

    /// Upload a full RGBA image, or allocate empty storage when `data`
    /// is `None`.
    fn tex_image_2d(&self, width: u32, height: u32, data: Option<&[u8]>);

    /// Update a sub-rectangle of the bound texture.
    fn tex_sub_image_2d(&self, x: u32, y: u32, width: u32, height: u32, data: &[u8]);

    /// Upload one block-compressed mip level to the bound texture.
    fn compressed_tex_image_2d(
        &self,
        level: u32,
        format: crate::dds::CompressionFormat,
        width: u32,
        height: u32,
        data: &[u8],
    );

    // Buffer object entry points.

    /// Allocate a buffer handle in the current share group.
    fn gen_buffer(&self) -> Option<BufferHandle>;

    /// Delete a buffer handle in the current share group.
    fn delete_buffer(&self, handle: BufferHandle);

    /// Bind `handle` to the target for `kind`, or unbind with `None`.
    fn bind_buffer(&self, kind: BufferKind, handle: Option<BufferHandle>);

    /// Allocate storage for the bound buffer, optionally with contents.
    fn buffer_data(&self, kind: BufferKind, size: usize, data: Option<&[u8]>, usage: UsagePattern);

    /// Replace a byte range of the bound buffer.
    fn buffer_sub_data(&self, kind: BufferKind, offset: usize, data: &[u8]);

    /// Read a byte range of the bound buffer back into `out`.
    fn get_buffer_sub_data(&self, kind: BufferKind, offset: usize, out: &mut [u8]) -> bool;

    /// Size of the bound buffer's storage in bytes.
    fn buffer_size(&self, kind: BufferKind) -> Option<usize>;

    /// Map the bound buffer's storage into client memory.
    ///
    /// The pointer stays valid until [`unmap_buffer`](Self::unmap_buffer)
    /// is called for the same target; accessing it is inherently unsafe
    /// and follows the driver's mapping rules.
    fn map_buffer(&self, kind: BufferKind, access: MapAccess) -> Option<NonNull<u8>>;

    /// Unmap a buffer previously mapped with [`map_buffer`](Self::map_buffer).
    fn unmap_buffer(&self, kind: BufferKind) -> bool;
}

/// Round a texture dimension up to the next power of two.
pub(crate) fn next_power_of_two(value: u32) -> u32 {
    value.max(1).next_power_of_two()
}
