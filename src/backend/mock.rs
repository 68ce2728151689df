//! Recording mock backend for tests and development.
//!
//! `MockGl` performs no GPU work. It keeps enough state to behave like a
//! driver — contexts, share groups, a current context, bound targets,
//! buffer storage — and appends every server entry point it sees to a
//! call log the tests can drain and assert on.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::ptr::NonNull;

use parking_lot::Mutex;

use crate::dds::CompressionFormat;
use crate::lifecycle::ContextLifecycle;
use crate::types::{BufferKind, MapAccess, TextureParameters, UsagePattern};

use super::{BufferHandle, Capabilities, ContextId, GlBackend, ShareGroupId, TextureHandle};

/// One recorded server call.
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    /// A texture handle was allocated.
    GenTexture(TextureHandle),
    /// A texture handle was deleted.
    DeleteTexture(TextureHandle),
    /// The 2D texture target was bound or unbound.
    BindTexture(Option<TextureHandle>),
    /// Sampling parameters were applied to the bound texture.
    ApplyParameters(TextureParameters),
    /// A full image upload, or storage allocation when `with_data` is false.
    TexImage {
        /// Upload width in texels.
        width: u32,
        /// Upload height in texels.
        height: u32,
        /// True when pixel data accompanied the call.
        with_data: bool,
    },
    /// A sub-rectangle update of the bound texture.
    TexSubImage {
        /// Destination x offset.
        x: u32,
        /// Destination y offset.
        y: u32,
        /// Update width in texels.
        width: u32,
        /// Update height in texels.
        height: u32,
    },
    /// One block-compressed mip level upload.
    CompressedTexImage {
        /// Mip level index.
        level: u32,
        /// Block-compression variant.
        format: CompressionFormat,
        /// Level width in texels.
        width: u32,
        /// Level height in texels.
        height: u32,
        /// Payload bytes in the call.
        bytes: usize,
    },
    /// A buffer handle was allocated.
    GenBuffer(BufferHandle),
    /// A buffer handle was deleted.
    DeleteBuffer(BufferHandle),
    /// A buffer target was bound or unbound.
    BindBuffer(BufferKind, Option<BufferHandle>),
    /// Buffer storage was (re)allocated.
    BufferData {
        /// Binding target.
        kind: BufferKind,
        /// New storage size in bytes.
        size: usize,
        /// True when contents accompanied the call.
        with_data: bool,
        /// Usage hint passed to the server.
        usage: UsagePattern,
    },
    /// A byte range of a buffer was replaced.
    BufferSubData {
        /// Binding target.
        kind: BufferKind,
        /// Destination byte offset.
        offset: usize,
        /// Bytes written.
        len: usize,
    },
    /// A buffer was mapped.
    MapBuffer(BufferKind, MapAccess),
    /// A buffer was unmapped.
    UnmapBuffer(BufferKind),
    /// A context was made current.
    MakeCurrent(ContextId),
    /// The current context was released.
    DoneCurrent,
}

#[derive(Default)]
struct MockState {
    next_context: u64,
    next_group: u64,
    next_texture: u32,
    next_buffer: u32,
    contexts: HashMap<ContextId, ShareGroupId>,
    current: Option<ContextId>,
    bound_texture: Option<TextureHandle>,
    bound_buffers: HashMap<BufferKind, BufferHandle>,
    buffers: HashMap<BufferHandle, Vec<u8>>,
    calls: Vec<GlCall>,
}

impl MockState {
    fn record(&mut self, call: GlCall) {
        log::trace!("MockGl: {:?}", call);
        self.calls.push(call);
    }
}

/// Recording mock driver backend.
pub struct MockGl {
    caps: Capabilities,
    lifecycle: ContextLifecycle,
    state: Mutex<MockState>,
}

impl MockGl {
    /// Create a mock driver advertising every capability.
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::all())
    }

    /// Create a mock driver advertising exactly `caps`.
    pub fn with_capabilities(caps: Capabilities) -> Self {
        Self {
            caps,
            lifecycle: ContextLifecycle::new(),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Create a context in a fresh share group.
    pub fn create_context(&self) -> ContextId {
        let mut state = self.state.lock();
        state.next_group += 1;
        let group = ShareGroupId(state.next_group);
        Self::insert_context(&mut state, group)
    }

    /// Create a context sharing server objects with `share_with`.
    ///
    /// Returns `None` if `share_with` no longer exists.
    pub fn create_shared_context(&self, share_with: ContextId) -> Option<ContextId> {
        let mut state = self.state.lock();
        let group = *state.contexts.get(&share_with)?;
        Some(Self::insert_context(&mut state, group))
    }

    /// Create a context pinned to an explicit share group.
    ///
    /// Exists so teardown tests can stand up a fresh context "in group B"
    /// after the previous one was destroyed.
    pub fn create_context_in_group(&self, group: ShareGroupId) -> ContextId {
        let mut state = self.state.lock();
        Self::insert_context(&mut state, group)
    }

    fn insert_context(state: &mut MockState, group: ShareGroupId) -> ContextId {
        state.next_context += 1;
        let id = ContextId(state.next_context);
        state.contexts.insert(id, group);
        id
    }

    /// Destroy a context.
    ///
    /// When it was the last context of its share group, fires the
    /// lifecycle notifier the way a driver invalidates the group's
    /// handles, after releasing internal locks.
    pub fn destroy_context(&self, context: ContextId) {
        let group_gone = {
            let mut state = self.state.lock();
            let Some(group) = state.contexts.remove(&context) else {
                return;
            };
            if state.current == Some(context) {
                state.current = None;
            }
            let last_of_group = !state.contexts.values().any(|g| *g == group);
            last_of_group.then_some(group)
        };
        if let Some(group) = group_gone {
            self.lifecycle.notify_destroyed(group);
        }
    }

    /// Drain and return the recorded call log.
    pub fn take_calls(&self) -> Vec<GlCall> {
        std::mem::take(&mut self.state.lock().calls)
    }

    /// Contents of a buffer object, for assertions.
    pub fn buffer_contents(&self, handle: BufferHandle) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&handle).cloned()
    }
}

impl Default for MockGl {
    fn default() -> Self {
        Self::new()
    }
}

impl GlBackend for MockGl {
    fn current_context(&self) -> Option<ContextId> {
        self.state.lock().current
    }

    fn share_group(&self, context: ContextId) -> Option<ShareGroupId> {
        self.state.lock().contexts.get(&context).copied()
    }

    fn are_sharing(&self, a: ContextId, b: ContextId) -> bool {
        let state = self.state.lock();
        match (state.contexts.get(&a), state.contexts.get(&b)) {
            (Some(ga), Some(gb)) => ga == gb,
            _ => false,
        }
    }

    fn make_current(&self, context: ContextId) -> bool {
        let mut state = self.state.lock();
        if !state.contexts.contains_key(&context) {
            return false;
        }
        state.current = Some(context);
        state.record(GlCall::MakeCurrent(context));
        true
    }

    fn done_current(&self) {
        let mut state = self.state.lock();
        state.current = None;
        state.record(GlCall::DoneCurrent);
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn lifecycle(&self) -> &ContextLifecycle {
        &self.lifecycle
    }

    fn gen_texture(&self) -> Option<TextureHandle> {
        let mut state = self.state.lock();
        state.current?;
        state.next_texture += 1;
        let handle = TextureHandle(NonZeroU32::new(state.next_texture)?);
        state.record(GlCall::GenTexture(handle));
        Some(handle)
    }

    fn delete_texture(&self, handle: TextureHandle) {
        let mut state = self.state.lock();
        if state.bound_texture == Some(handle) {
            state.bound_texture = None;
        }
        state.record(GlCall::DeleteTexture(handle));
    }

    fn bind_texture(&self, handle: Option<TextureHandle>) {
        let mut state = self.state.lock();
        state.bound_texture = handle;
        state.record(GlCall::BindTexture(handle));
    }

    fn apply_texture_parameters(&self, params: &TextureParameters) {
        self.state.lock().record(GlCall::ApplyParameters(*params));
    }

    fn tex_image_2d(&self, width: u32, height: u32, data: Option<&[u8]>) {
        self.state.lock().record(GlCall::TexImage {
            width,
            height,
            with_data: data.is_some(),
        });
    }

    fn tex_sub_image_2d(&self, x: u32, y: u32, width: u32, height: u32, _data: &[u8]) {
        self.state.lock().record(GlCall::TexSubImage {
            x,
            y,
            width,
            height,
        });
    }

    fn compressed_tex_image_2d(
        &self,
        level: u32,
        format: CompressionFormat,
        width: u32,
        height: u32,
        data: &[u8],
    ) {
        self.state.lock().record(GlCall::CompressedTexImage {
            level,
            format,
            width,
            height,
            bytes: data.len(),
        });
    }

    fn gen_buffer(&self) -> Option<BufferHandle> {
        let mut state = self.state.lock();
        state.current?;
        state.next_buffer += 1;
        let handle = BufferHandle(NonZeroU32::new(state.next_buffer)?);
        state.buffers.insert(handle, Vec::new());
        state.record(GlCall::GenBuffer(handle));
        Some(handle)
    }

    fn delete_buffer(&self, handle: BufferHandle) {
        let mut state = self.state.lock();
        state.buffers.remove(&handle);
        state.bound_buffers.retain(|_, bound| *bound != handle);
        state.record(GlCall::DeleteBuffer(handle));
    }

    fn bind_buffer(&self, kind: BufferKind, handle: Option<BufferHandle>) {
        let mut state = self.state.lock();
        match handle {
            Some(handle) => {
                state.bound_buffers.insert(kind, handle);
            }
            None => {
                state.bound_buffers.remove(&kind);
            }
        }
        state.record(GlCall::BindBuffer(kind, handle));
    }

    fn buffer_data(&self, kind: BufferKind, size: usize, data: Option<&[u8]>, usage: UsagePattern) {
        let mut state = self.state.lock();
        state.record(GlCall::BufferData {
            kind,
            size,
            with_data: data.is_some(),
            usage,
        });
        let Some(handle) = state.bound_buffers.get(&kind).copied() else {
            log::warn!("MockGl: buffer_data with no buffer bound to {:?}", kind);
            return;
        };
        if let Some(storage) = state.buffers.get_mut(&handle) {
            storage.clear();
            storage.resize(size, 0);
            if let Some(data) = data {
                let len = data.len().min(size);
                storage[..len].copy_from_slice(&data[..len]);
            }
        }
    }

    fn buffer_sub_data(&self, kind: BufferKind, offset: usize, data: &[u8]) {
        let mut state = self.state.lock();
        state.record(GlCall::BufferSubData {
            kind,
            offset,
            len: data.len(),
        });
        let Some(handle) = state.bound_buffers.get(&kind).copied() else {
            log::warn!("MockGl: buffer_sub_data with no buffer bound to {:?}", kind);
            return;
        };
        if let Some(storage) = state.buffers.get_mut(&handle) {
            let end = offset + data.len();
            if end <= storage.len() {
                storage[offset..end].copy_from_slice(data);
            } else {
                log::warn!("MockGl: buffer_sub_data range {}..{} out of bounds", offset, end);
            }
        }
    }

    fn get_buffer_sub_data(&self, kind: BufferKind, offset: usize, out: &mut [u8]) -> bool {
        let state = self.state.lock();
        let Some(handle) = state.bound_buffers.get(&kind) else {
            return false;
        };
        let Some(storage) = state.buffers.get(handle) else {
            return false;
        };
        let end = offset + out.len();
        if end > storage.len() {
            return false;
        }
        out.copy_from_slice(&storage[offset..end]);
        true
    }

    fn buffer_size(&self, kind: BufferKind) -> Option<usize> {
        let state = self.state.lock();
        let handle = state.bound_buffers.get(&kind)?;
        state.buffers.get(handle).map(Vec::len)
    }

    fn map_buffer(&self, kind: BufferKind, access: MapAccess) -> Option<NonNull<u8>> {
        if !self.caps.contains(Capabilities::MAP_BUFFER) {
            return None;
        }
        let mut state = self.state.lock();
        state.record(GlCall::MapBuffer(kind, access));
        let handle = state.bound_buffers.get(&kind).copied()?;
        // Heap storage is stable while mapped: nothing resizes the Vec
        // between map and unmap.
        let storage = state.buffers.get_mut(&handle)?;
        NonNull::new(storage.as_mut_ptr())
    }

    fn unmap_buffer(&self, kind: BufferKind) -> bool {
        if !self.caps.contains(Capabilities::MAP_BUFFER) {
            return false;
        }
        let mut state = self.state.lock();
        state.record(GlCall::UnmapBuffer(kind));
        state.bound_buffers.contains_key(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_groups() {
        let gl = MockGl::new();
        let a = gl.create_context();
        let a2 = gl.create_shared_context(a).unwrap();
        let b = gl.create_context();
        assert!(gl.are_sharing(a, a2));
        assert!(!gl.are_sharing(a, b));
        assert_eq!(gl.share_group(a), gl.share_group(a2));
    }

    #[test]
    fn test_destroy_last_context_fires_lifecycle() {
        use crate::lifecycle::LifecycleObserver;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::{Arc, Weak};

        struct Counter(AtomicUsize);
        impl LifecycleObserver for Counter {
            fn share_group_destroyed(&self, _group: ShareGroupId) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let gl = MockGl::new();
        let a = gl.create_context();
        let a2 = gl.create_shared_context(a).unwrap();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        gl.lifecycle()
            .subscribe(Arc::downgrade(&counter) as Weak<dyn LifecycleObserver>);

        // Group survives while one context remains.
        gl.destroy_context(a);
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
        gl.destroy_context(a2);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_gen_texture_requires_current_context() {
        let gl = MockGl::new();
        assert!(gl.gen_texture().is_none());
        let ctx = gl.create_context();
        assert!(gl.make_current(ctx));
        assert!(gl.gen_texture().is_some());
    }

    #[test]
    fn test_buffer_storage_roundtrip() {
        let gl = MockGl::new();
        let ctx = gl.create_context();
        gl.make_current(ctx);
        let handle = gl.gen_buffer().unwrap();
        gl.bind_buffer(BufferKind::Vertex, Some(handle));
        gl.buffer_data(
            BufferKind::Vertex,
            4,
            Some(&[1, 2, 3, 4]),
            UsagePattern::StaticDraw,
        );
        gl.buffer_sub_data(BufferKind::Vertex, 1, &[9, 9]);

        let mut out = [0u8; 4];
        assert!(gl.get_buffer_sub_data(BufferKind::Vertex, 0, &mut out));
        assert_eq!(out, [1, 9, 9, 4]);
    }
}
