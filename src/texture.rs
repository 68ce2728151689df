//! 2D texture resource manager.
//!
//! [`Texture2d`] holds the client-side state of one logical image —
//! pixels, size, sampling parameters — and a table of per-share-group
//! server handles. Mutations never touch the driver; all deferred
//! synchronization happens in [`bind`](Texture2d::bind), which uploads
//! pixels and applies parameters only when the generation counters say
//! the server copy is stale.
//!
//! Cloning a `Texture2d` aliases the same underlying state: all copies
//! see each other's mutations, and the server handles are deleted when
//! the last copy is dropped.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};

use image::RgbaImage;
use parking_lot::Mutex;

use crate::backend::{
    next_power_of_two, Capabilities, ContextId, GlBackend, ShareGroupId, TextureHandle,
};
use crate::dds::DdsImage;
use crate::error::DdsError;
use crate::lifecycle::LifecycleObserver;
use crate::types::{TextureFilter, TextureParameters, WrapMode};

/// Who owns a binding's server handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ownership {
    /// Allocated by this cache; deleted on teardown.
    Owned,
    /// Wrapped around a caller-supplied handle; never deleted here.
    Literal,
}

/// One share group's view of the texture.
#[derive(Debug)]
struct ContextBinding {
    /// The context the handle was created under (used for teardown).
    context: ContextId,
    handle: TextureHandle,
    /// Image generation last uploaded to this handle.
    image_mark: u64,
    /// Parameter generation last applied to this handle.
    parameter_mark: u64,
    ownership: Ownership,
}

struct TextureState {
    requested_size: Option<(u32, u32)>,
    /// Effective size; rounded up to a power of two once a driver
    /// without NPOT support has been observed.
    size: Option<(u32, u32)>,
    /// True once `size` has been validated against the driver.
    size_checked: bool,
    image: Option<RgbaImage>,
    dds: Option<DdsImage>,
    minify_filter: TextureFilter,
    magnify_filter: TextureFilter,
    horizontal_wrap: WrapMode,
    vertical_wrap: WrapMode,
    generate_mipmap: bool,
    /// Mipmap-generation probe, cached per texture instance.
    mipmap_supported: Option<bool>,
    image_generation: u64,
    parameter_generation: u64,
    flipped: bool,
    /// True once subscribed to the lifecycle notifier.
    registered: bool,
    bindings: HashMap<ShareGroupId, ContextBinding>,
}

impl TextureState {
    fn new() -> Self {
        Self {
            requested_size: None,
            size: None,
            size_checked: false,
            image: None,
            dds: None,
            minify_filter: TextureFilter::LinearMipmapLinear,
            magnify_filter: TextureFilter::Linear,
            horizontal_wrap: WrapMode::Repeat,
            vertical_wrap: WrapMode::Repeat,
            generate_mipmap: true,
            mipmap_supported: None,
            image_generation: 0,
            parameter_generation: 0,
            flipped: false,
            registered: false,
            bindings: HashMap::new(),
        }
    }

    /// Adopt a requested size without validating it against the driver.
    fn set_requested_size(&mut self, width: u32, height: u32) {
        self.requested_size = Some((width, height));
        self.size = Some((width, height));
        self.size_checked = false;
    }

    /// Validate the effective size against the driver, if one is
    /// reachable. Deferred until a context is current so a size set
    /// off-thread stays untouched until first use.
    fn resolve_size(&mut self, backend: &dyn GlBackend) {
        if self.size_checked {
            return;
        }
        let Some((width, height)) = self.requested_size else {
            return;
        };
        if backend.current_context().is_none() {
            return;
        }
        self.size = if backend.capabilities().contains(Capabilities::NPOT_TEXTURES) {
            Some((width, height))
        } else {
            Some((next_power_of_two(width), next_power_of_two(height)))
        };
        self.size_checked = true;
    }
}

struct TextureShared {
    backend: Arc<dyn GlBackend>,
    state: Mutex<TextureState>,
}

impl LifecycleObserver for TextureShared {
    fn share_group_destroyed(&self, group: ShareGroupId) {
        // The driver has already invalidated the handles; just forget
        // the bookkeeping so a later bind starts from scratch.
        let mut state = self.state.lock();
        if state.bindings.remove(&group).is_some() {
            log::trace!("Texture2d: dropped binding for destroyed group {:?}", group);
        }
    }
}

impl Drop for TextureShared {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state
            .bindings
            .values()
            .any(|binding| binding.ownership == Ownership::Owned)
        {
            return;
        }
        let backend = self.backend.as_ref();
        let original = backend.current_context();
        let original_group = original.and_then(|context| backend.share_group(context));

        // Delete handles reachable from the current context in place;
        // everything else needs a context switch.
        let mut deferred = Vec::new();
        for (group, binding) in state.bindings.drain() {
            if binding.ownership == Ownership::Literal {
                continue;
            }
            if Some(group) == original_group {
                backend.delete_texture(binding.handle);
            } else {
                deferred.push(binding);
            }
        }
        if deferred.is_empty() {
            return;
        }
        for binding in deferred {
            if backend.make_current(binding.context) {
                backend.delete_texture(binding.handle);
            } else {
                log::warn!(
                    "Texture2d: context {:?} vanished before teardown, leaking handle {:?}",
                    binding.context,
                    binding.handle
                );
            }
        }
        match original {
            Some(context) => {
                backend.make_current(context);
            }
            None => backend.done_current(),
        }
    }
}

/// A logical 2D texture with per-share-group server handles.
#[derive(Clone)]
pub struct Texture2d {
    shared: Arc<TextureShared>,
}

impl Texture2d {
    /// Create an empty texture tied to `backend`.
    pub fn new(backend: Arc<dyn GlBackend>) -> Self {
        Self {
            shared: Arc::new(TextureShared {
                backend,
                state: Mutex::new(TextureState::new()),
            }),
        }
    }

    /// Wrap a caller-owned server handle from the current context.
    ///
    /// The handle is pinned to the current context's share group; the
    /// texture can never be bound from another group, and teardown
    /// leaves the handle alone. Returns `None` when no context is
    /// current.
    pub fn from_texture_id(
        backend: Arc<dyn GlBackend>,
        handle: TextureHandle,
        size: Option<(u32, u32)>,
    ) -> Option<Self> {
        let context = backend.current_context()?;
        let group = backend.share_group(context)?;

        let mut state = TextureState::new();
        if let Some((width, height)) = size {
            state.set_requested_size(width, height);
        }
        state.bindings.insert(
            group,
            ContextBinding {
                context,
                handle,
                // Marks start current: nothing is ever uploaded into a
                // wrapped handle unless the caller mutates state later.
                image_mark: state.image_generation,
                parameter_mark: state.parameter_generation,
                ownership: Ownership::Literal,
            },
        );
        state.registered = true;

        let shared = Arc::new(TextureShared {
            backend,
            state: Mutex::new(state),
        });
        shared
            .backend
            .lifecycle()
            .subscribe(Arc::downgrade(&shared) as Weak<dyn LifecycleObserver>);
        Some(Self { shared })
    }

    /// True when there is no client image and no server handle.
    pub fn is_null(&self) -> bool {
        let state = self.shared.state.lock();
        state.image.is_none() && state.dds.is_none() && state.bindings.is_empty()
    }

    /// The effective texture size.
    ///
    /// Rounded up to a power of two once a driver that requires it has
    /// been observed; until then this equals [`requested_size`](Self::requested_size).
    pub fn size(&self) -> Option<(u32, u32)> {
        self.shared.state.lock().size
    }

    /// The size passed to [`set_size`](Self::set_size), before rounding.
    pub fn requested_size(&self) -> Option<(u32, u32)> {
        self.shared.state.lock().requested_size
    }

    /// Set the texture size.
    ///
    /// The image is scaled to this size (after any power-of-two
    /// rounding) when uploaded. A repeated identical size is a no-op.
    pub fn set_size(&self, width: u32, height: u32) {
        let mut state = self.shared.state.lock();
        if state.requested_size == Some((width, height)) {
            return;
        }
        state.set_requested_size(width, height);
        state.resolve_size(self.shared.backend.as_ref());
        state.image_generation += 1;
    }

    /// The client-side image, if one is set.
    pub fn image(&self) -> Option<RgbaImage> {
        self.shared.state.lock().image.clone()
    }

    /// Set the client-side image, queued for upload at the next bind.
    ///
    /// Clears any pending compressed image. An image with a zero
    /// dimension behaves like [`clear_image`](Self::clear_image): the
    /// client copy is released without invalidating the server copy.
    pub fn set_image(&self, image: RgbaImage) {
        let mut state = self.shared.state.lock();
        state.dds = None;
        if image.width() == 0 || image.height() == 0 {
            state.image = None;
            return;
        }
        if state.requested_size.is_none() {
            let (width, height) = image.dimensions();
            state.set_requested_size(width, height);
            state.resolve_size(self.shared.backend.as_ref());
        }
        state.image = Some(image);
        state.image_generation += 1;
    }

    /// Release the client image without touching the server copy.
    ///
    /// Typical use: `set_image`, `bind` to force the upload, then
    /// `clear_image` to reclaim client memory.
    pub fn clear_image(&self) {
        self.shared.state.lock().image = None;
    }

    /// Load a DDS compressed image from `path`, queued for upload.
    ///
    /// Only DXT1, DXT3 and DXT5 payloads are supported. On any failure
    /// a warning is logged, `false` is returned and the previous state
    /// is left fully intact. On success the vertical-flip flag is set,
    /// since DDS row order is inverted relative to the GL convention.
    pub fn set_dds_image(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let parsed = std::fs::read(path)
            .map_err(|source| DdsError::Read {
                path: path.to_path_buf(),
                source,
            })
            .and_then(|bytes| DdsImage::parse(&bytes));
        match parsed {
            Ok(dds) => {
                self.adopt_dds(dds);
                true
            }
            Err(err) => {
                log::warn!("Texture2d::set_dds_image({}): {}", path.display(), err);
                false
            }
        }
    }

    /// Ingest an in-memory DDS container. Same semantics as
    /// [`set_dds_image`](Self::set_dds_image).
    pub fn set_dds_data(&self, bytes: &[u8]) -> bool {
        match DdsImage::parse(bytes) {
            Ok(dds) => {
                self.adopt_dds(dds);
                true
            }
            Err(err) => {
                log::warn!("Texture2d::set_dds_data: {}", err);
                false
            }
        }
    }

    fn adopt_dds(&self, dds: DdsImage) {
        let mut state = self.shared.state.lock();
        state.image = None;
        if state.requested_size.is_none() {
            state.set_requested_size(dds.width(), dds.height());
            state.resolve_size(self.shared.backend.as_ref());
        }
        state.dds = Some(dds);
        state.image_generation += 1;
        state.flipped = true;
    }

    /// Copy `image` into the bound texture at `(x, y)` immediately.
    ///
    /// Unlike [`set_image`](Self::set_image) this goes straight to the
    /// server; the texture must already be bound in the current
    /// context, and only that share group's handle is updated.
    pub fn copy_image(&self, image: &RgbaImage, x: u32, y: u32) {
        let backend = self.shared.backend.as_ref();
        if backend.current_context().is_none() {
            return;
        }
        let gl_rows = image::imageops::flip_vertical(image);
        backend.tex_sub_image_2d(x, y, image.width(), image.height(), gl_rows.as_raw());
    }

    /// The minification filter. Defaults to
    /// [`LinearMipmapLinear`](TextureFilter::LinearMipmapLinear).
    pub fn minify_filter(&self) -> TextureFilter {
        self.shared.state.lock().minify_filter
    }

    /// Set the minification filter, applied at the next bind.
    ///
    /// When mipmap generation is off or unsupported, the equivalent
    /// non-mipmap filter is applied instead.
    pub fn set_minify_filter(&self, value: TextureFilter) {
        let mut state = self.shared.state.lock();
        if state.minify_filter != value {
            state.minify_filter = value;
            state.parameter_generation += 1;
        }
    }

    /// The magnification filter. Defaults to [`Linear`](TextureFilter::Linear).
    pub fn magnify_filter(&self) -> TextureFilter {
        self.shared.state.lock().magnify_filter
    }

    /// Set the magnification filter, applied at the next bind.
    pub fn set_magnify_filter(&self, value: TextureFilter) {
        let mut state = self.shared.state.lock();
        if state.magnify_filter != value {
            state.magnify_filter = value;
            state.parameter_generation += 1;
        }
    }

    /// The horizontal wrap mode. Defaults to [`Repeat`](WrapMode::Repeat).
    pub fn horizontal_wrap(&self) -> WrapMode {
        self.shared.state.lock().horizontal_wrap
    }

    /// Set the horizontal wrap mode, applied at the next bind.
    ///
    /// A mode the driver cannot express is replaced with the nearest
    /// supported one; read the property back to see what was kept.
    pub fn set_horizontal_wrap(&self, value: WrapMode) {
        let value = value.supported_by(self.shared.backend.capabilities());
        let mut state = self.shared.state.lock();
        if state.horizontal_wrap != value {
            state.horizontal_wrap = value;
            state.parameter_generation += 1;
        }
    }

    /// The vertical wrap mode. Defaults to [`Repeat`](WrapMode::Repeat).
    pub fn vertical_wrap(&self) -> WrapMode {
        self.shared.state.lock().vertical_wrap
    }

    /// Set the vertical wrap mode, applied at the next bind.
    pub fn set_vertical_wrap(&self, value: WrapMode) {
        let value = value.supported_by(self.shared.backend.capabilities());
        let mut state = self.shared.state.lock();
        if state.vertical_wrap != value {
            state.vertical_wrap = value;
            state.parameter_generation += 1;
        }
    }

    /// Whether mipmaps are generated when the image changes. Defaults
    /// to true.
    pub fn generate_mipmap(&self) -> bool {
        self.shared.state.lock().generate_mipmap
    }

    /// Enable or disable mipmap generation, applied at the next bind.
    pub fn set_generate_mipmap(&self, value: bool) {
        let mut state = self.shared.state.lock();
        if state.generate_mipmap != value {
            state.generate_mipmap = value;
            state.parameter_generation += 1;
        }
    }

    /// True when the pixel source's row order is inverted relative to
    /// the GL convention. Set automatically by DDS ingestion; sampling
    /// code is expected to compensate (e.g. `1.0 - t`).
    pub fn flip_vertically(&self) -> bool {
        self.shared.state.lock().flipped
    }

    /// Set the vertical-flip flag.
    pub fn set_flip_vertically(&self, flip: bool) {
        self.shared.state.lock().flipped = flip;
    }

    /// Bind this texture to the 2D texture target.
    ///
    /// Creates a server handle for the current share group on first
    /// use, then applies stale sampling parameters and uploads stale
    /// pixel data. Returns false when no context is current, the
    /// texture is pinned to a different group, or the server refuses a
    /// handle.
    pub fn bind(&self) -> bool {
        let backend = self.shared.backend.as_ref();
        let Some(context) = backend.current_context() else {
            return false;
        };
        let Some(group) = backend.share_group(context) else {
            return false;
        };

        let mut state = self.shared.state.lock();
        state.resolve_size(backend);

        let mut first_time = false;
        if !state.bindings.contains_key(&group) {
            if state
                .bindings
                .values()
                .any(|binding| binding.ownership == Ownership::Literal)
            {
                // Cannot mint extra handles for an externally owned texture.
                return false;
            }
            let Some(handle) = backend.gen_texture() else {
                return false;
            };
            // One below current forces the first-time upload and
            // parameter apply below.
            let image_mark = state.image_generation.wrapping_sub(1);
            let parameter_mark = state.parameter_generation.wrapping_sub(1);
            state.bindings.insert(
                group,
                ContextBinding {
                    context,
                    handle,
                    image_mark,
                    parameter_mark,
                    ownership: Ownership::Owned,
                },
            );
            if !state.registered {
                backend
                    .lifecycle()
                    .subscribe(Arc::downgrade(&self.shared) as Weak<dyn LifecycleObserver>);
                state.registered = true;
            }
            first_time = true;
        }

        let TextureState {
            bindings,
            mipmap_supported,
            generate_mipmap,
            minify_filter,
            magnify_filter,
            horizontal_wrap,
            vertical_wrap,
            image_generation,
            parameter_generation,
            image,
            dds,
            size,
            ..
        } = &mut *state;
        let Some(binding) = bindings.get_mut(&group) else {
            return false;
        };

        backend.bind_texture(Some(binding.handle));

        if *parameter_generation != binding.parameter_mark {
            binding.parameter_mark = *parameter_generation;
            let supported = *mipmap_supported.get_or_insert_with(|| {
                backend
                    .capabilities()
                    .contains(Capabilities::GENERATE_MIPMAP)
            });
            let mipmap_enabled = *generate_mipmap && supported;
            let minify = if mipmap_enabled {
                *minify_filter
            } else {
                minify_filter.without_mipmaps()
            };
            backend.apply_texture_parameters(&TextureParameters {
                minify_filter: minify,
                magnify_filter: *magnify_filter,
                horizontal_wrap: *horizontal_wrap,
                vertical_wrap: *vertical_wrap,
                generate_mipmap: mipmap_enabled,
            });
        }

        if *image_generation != binding.image_mark {
            binding.image_mark = *image_generation;
            upload(backend, image.as_ref(), dds.as_ref(), *size, first_time);
        }

        true
    }

    /// Unbind the 2D texture target. No handle is deleted; a no-op
    /// when no context is current.
    pub fn release(&self) {
        if self.shared.backend.current_context().is_none() {
            return;
        }
        self.shared.backend.bind_texture(None);
    }

    /// The server handle bound for `context`'s share group, if that
    /// group has ever bound this texture.
    pub fn texture_id(&self, context: ContextId) -> Option<TextureHandle> {
        let group = self.shared.backend.share_group(context)?;
        self.shared
            .state
            .lock()
            .bindings
            .get(&group)
            .map(|binding| binding.handle)
    }
}

impl std::fmt::Debug for Texture2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Texture2d")
            .field("size", &state.size)
            .field("has_image", &state.image.is_some())
            .field("has_dds", &state.dds.is_some())
            .field("bindings", &state.bindings.len())
            .field("flipped", &state.flipped)
            .finish()
    }
}

/// Push the client pixel source into the bound server handle.
fn upload(
    backend: &dyn GlBackend,
    image: Option<&RgbaImage>,
    dds: Option<&DdsImage>,
    size: Option<(u32, u32)>,
    first_time: bool,
) {
    if let Some(dds) = dds {
        if !backend
            .capabilities()
            .contains(Capabilities::S3TC_COMPRESSION)
        {
            log::warn!("Texture2d: driver does not support compressed texture uploads");
            return;
        }
        for level in dds.mip_levels() {
            backend.compressed_tex_image_2d(
                level.level,
                dds.format(),
                level.width,
                level.height,
                level.data,
            );
        }
        return;
    }
    if let Some(image) = image {
        let (width, height) = size.unwrap_or_else(|| image.dimensions());
        let scaled;
        let source = if image.dimensions() == (width, height) {
            image
        } else {
            scaled = image::imageops::resize(
                image,
                width,
                height,
                image::imageops::FilterType::Triangle,
            );
            &scaled
        };
        let gl_rows = image::imageops::flip_vertical(source);
        backend.tex_image_2d(width, height, Some(gl_rows.as_raw()));
    } else if first_time {
        // First creation with a size but no pixels yet: allocate the
        // storage so partial updates have somewhere to land.
        if let Some((width, height)) = size {
            backend.tex_image_2d(width, height, None);
        }
    }
}

static_assertions::assert_impl_all!(Texture2d: Send, Sync);
