//! Buffer object resource manager.
//!
//! [`GlBuffer`] wraps one server-side buffer object. Unlike textures a
//! buffer is created once, in the share group of whichever context is
//! current at [`create`](GlBuffer::create) time, and stays owned by
//! that group: binding from an unrelated group fails instead of
//! minting a second handle.
//!
//! Cloning a `GlBuffer` aliases the same buffer object; the handle is
//! deleted when the last copy is dropped.

use std::ptr::NonNull;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::{BufferHandle, Capabilities, ContextId, GlBackend, ShareGroupId};
use crate::lifecycle::LifecycleObserver;
use crate::types::{BufferKind, MapAccess, UsagePattern};

struct BufferState {
    usage: UsagePattern,
    handle: Option<BufferHandle>,
    /// Context the handle was created under (used for teardown).
    context: Option<ContextId>,
    /// Share group that owns the handle.
    group: Option<ShareGroupId>,
    registered: bool,
}

struct BufferShared {
    backend: Arc<dyn GlBackend>,
    kind: BufferKind,
    state: Mutex<BufferState>,
}

impl BufferShared {
    /// True when `context` can address the buffer's handle.
    fn reachable_from(&self, state: &BufferState, context: ContextId) -> bool {
        match state.group {
            Some(group) => self.backend.share_group(context) == Some(group),
            None => false,
        }
    }

    /// The handle, provided it is addressable from the current context.
    fn usable_handle(&self, state: &BufferState) -> Option<BufferHandle> {
        let handle = state.handle?;
        let context = self.backend.current_context()?;
        self.reachable_from(state, context).then_some(handle)
    }
}

impl LifecycleObserver for BufferShared {
    fn share_group_destroyed(&self, group: ShareGroupId) {
        let mut state = self.state.lock();
        if state.group == Some(group) {
            log::trace!("GlBuffer: handle lost with destroyed group {:?}", group);
            state.handle = None;
            state.context = None;
            state.group = None;
        }
    }
}

/// Delete `handle` from its owning share group, switching contexts if
/// the current one cannot address it and restoring the previous
/// current context afterwards.
fn delete_owned_handle(
    backend: &dyn GlBackend,
    handle: BufferHandle,
    owner: ContextId,
    group: Option<ShareGroupId>,
) {
    let original = backend.current_context();
    let original_group = original.and_then(|context| backend.share_group(context));

    if original_group.is_some() && original_group == group {
        backend.delete_buffer(handle);
        return;
    }
    if backend.make_current(owner) {
        backend.delete_buffer(handle);
    } else {
        log::warn!(
            "GlBuffer: context {:?} vanished before teardown, leaking handle {:?}",
            owner,
            handle
        );
    }
    match original {
        Some(context) => {
            backend.make_current(context);
        }
        None => backend.done_current(),
    }
}

impl Drop for BufferShared {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let (Some(handle), Some(owner)) = (state.handle, state.context) else {
            return;
        };
        delete_owned_handle(self.backend.as_ref(), handle, owner, state.group);
    }
}

/// A server-side buffer object owned by one share group.
#[derive(Clone)]
pub struct GlBuffer {
    shared: Arc<BufferShared>,
}

impl GlBuffer {
    /// Create a buffer manager for the given binding target.
    ///
    /// No server handle is allocated until [`create`](Self::create).
    pub fn new(backend: Arc<dyn GlBackend>, kind: BufferKind) -> Self {
        Self {
            shared: Arc::new(BufferShared {
                backend,
                kind,
                state: Mutex::new(BufferState {
                    usage: UsagePattern::default(),
                    handle: None,
                    context: None,
                    group: None,
                    registered: false,
                }),
            }),
        }
    }

    /// The binding target, fixed at construction.
    pub fn kind(&self) -> BufferKind {
        self.shared.kind
    }

    /// The usage hint passed to the server on allocation. Defaults to
    /// [`StaticDraw`](UsagePattern::StaticDraw).
    pub fn usage_pattern(&self) -> UsagePattern {
        self.shared.state.lock().usage
    }

    /// Set the usage hint, effective from the next allocation.
    ///
    /// A hint the driver cannot express is downgraded when storage is
    /// allocated; the requested value stays observable here.
    pub fn set_usage_pattern(&self, value: UsagePattern) {
        self.shared.state.lock().usage = value;
    }

    /// Allocate the server handle in the current context's share group.
    ///
    /// Idempotent once created. Returns false when no context is
    /// current, when the driver lacks buffer objects, or when the
    /// server refuses a handle.
    pub fn create(&self) -> bool {
        let backend = self.shared.backend.as_ref();
        let mut state = self.shared.state.lock();
        if state.handle.is_some() {
            return true;
        }
        if !backend
            .capabilities()
            .contains(Capabilities::BUFFER_OBJECTS)
        {
            return false;
        }
        let Some(context) = backend.current_context() else {
            return false;
        };
        let Some(group) = backend.share_group(context) else {
            return false;
        };
        let Some(handle) = backend.gen_buffer() else {
            return false;
        };
        state.handle = Some(handle);
        state.context = Some(context);
        state.group = Some(group);
        if !state.registered {
            backend
                .lifecycle()
                .subscribe(Arc::downgrade(&self.shared) as Weak<dyn LifecycleObserver>);
            state.registered = true;
        }
        true
    }

    /// True once [`create`](Self::create) has succeeded and the handle
    /// is still alive.
    pub fn is_created(&self) -> bool {
        self.shared.state.lock().handle.is_some()
    }

    /// The server handle, if one exists.
    pub fn buffer_id(&self) -> Option<BufferHandle> {
        self.shared.state.lock().handle
    }

    /// Delete the server handle, if any. The manager can be re-created
    /// afterwards, possibly in a different share group.
    pub fn destroy(&self) {
        let mut state = self.shared.state.lock();
        let (Some(handle), Some(owner)) = (state.handle.take(), state.context.take()) else {
            state.group = None;
            return;
        };
        let group = state.group.take();
        delete_owned_handle(self.shared.backend.as_ref(), handle, owner, group);
    }

    /// Bind the buffer to its target in the current context.
    ///
    /// Fails when the buffer is not created or the current context does
    /// not share with the owning group.
    pub fn bind(&self) -> bool {
        let backend = self.shared.backend.as_ref();
        let state = self.shared.state.lock();
        let Some(handle) = state.handle else {
            return false;
        };
        let Some(context) = backend.current_context() else {
            return false;
        };
        if !self.shared.reachable_from(&state, context) {
            log::warn!("GlBuffer::bind: buffer is not valid in the current context");
            return false;
        }
        backend.bind_buffer(self.shared.kind, Some(handle));
        true
    }

    /// Unbind the buffer's target. The handle stays alive.
    pub fn release(&self) {
        let state = self.shared.state.lock();
        if self.shared.usable_handle(&state).is_none() {
            return;
        }
        self.shared.backend.bind_buffer(self.shared.kind, None);
    }

    /// The allocated size in bytes, queried from the server.
    ///
    /// Requires the buffer to be created, reachable, and bound.
    pub fn size(&self) -> Option<usize> {
        let state = self.shared.state.lock();
        self.shared.usable_handle(&state)?;
        self.shared.backend.buffer_size(self.shared.kind)
    }

    /// Allocate `size` bytes of uninitialized storage, discarding any
    /// previous contents. A no-op unless created, reachable, and bound.
    pub fn resize(&self, size: usize) {
        let state = self.shared.state.lock();
        if self.shared.usable_handle(&state).is_none() {
            return;
        }
        let usage = state.usage.supported_by(self.shared.backend.capabilities());
        self.shared
            .backend
            .buffer_data(self.shared.kind, size, None, usage);
    }

    /// Reallocate the storage with `data`. A no-op unless created,
    /// reachable, and bound.
    pub fn write(&self, data: &[u8]) {
        let state = self.shared.state.lock();
        if self.shared.usable_handle(&state).is_none() {
            return;
        }
        let usage = state.usage.supported_by(self.shared.backend.capabilities());
        self.shared
            .backend
            .buffer_data(self.shared.kind, data.len(), Some(data), usage);
    }

    /// Replace `data.len()` bytes at `offset`. A no-op unless created,
    /// reachable, and bound; offsets past the allocation are the
    /// server's problem to reject.
    pub fn write_at(&self, offset: usize, data: &[u8]) {
        let state = self.shared.state.lock();
        if self.shared.usable_handle(&state).is_none() {
            return;
        }
        self.shared
            .backend
            .buffer_sub_data(self.shared.kind, offset, data);
    }

    /// Read `out.len()` bytes from `offset` into `out`.
    ///
    /// Returns false when the driver cannot read buffers back, the
    /// target is write-only (pixel unpack), or the buffer is not
    /// created, reachable, and bound.
    pub fn read_at(&self, offset: usize, out: &mut [u8]) -> bool {
        if !self
            .shared
            .backend
            .capabilities()
            .contains(Capabilities::BUFFER_READBACK)
        {
            return false;
        }
        if !self.shared.kind.supports_readback() {
            return false;
        }
        let state = self.shared.state.lock();
        if self.shared.usable_handle(&state).is_none() {
            return false;
        }
        self.shared
            .backend
            .get_buffer_sub_data(self.shared.kind, offset, out)
    }

    /// Map the buffer's storage into client memory.
    ///
    /// Returns `None` when the driver cannot map buffers or the buffer
    /// is not created, reachable, and bound. The pointer stays valid
    /// until [`unmap`](Self::unmap); the caller must not use the buffer
    /// through the server while mapped.
    pub fn map(&self, access: MapAccess) -> Option<NonNull<u8>> {
        if !self
            .shared
            .backend
            .capabilities()
            .contains(Capabilities::MAP_BUFFER)
        {
            return None;
        }
        let state = self.shared.state.lock();
        self.shared.usable_handle(&state)?;
        self.shared.backend.map_buffer(self.shared.kind, access)
    }

    /// Release a mapping made with [`map`](Self::map). Returns false
    /// when the mapping was lost, in which case the written contents
    /// are undefined.
    pub fn unmap(&self) -> bool {
        let state = self.shared.state.lock();
        if self.shared.usable_handle(&state).is_none() {
            return false;
        }
        self.shared.backend.unmap_buffer(self.shared.kind)
    }

    /// How many `GlBuffer` values alias this buffer object.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }
}

impl std::fmt::Debug for GlBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("GlBuffer")
            .field("kind", &self.shared.kind)
            .field("handle", &state.handle)
            .field("group", &state.group)
            .finish()
    }
}

static_assertions::assert_impl_all!(GlBuffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{GlCall, MockGl};

    #[test]
    fn test_create_requires_context() {
        let gl = Arc::new(MockGl::new());
        let buffer = GlBuffer::new(gl.clone(), BufferKind::Vertex);
        assert!(!buffer.create());

        let ctx = gl.create_context();
        gl.make_current(ctx);
        assert!(buffer.create());
        assert!(buffer.is_created());
        // Idempotent.
        assert!(buffer.create());
    }

    #[test]
    fn test_create_requires_buffer_objects() {
        let gl = Arc::new(MockGl::with_capabilities(
            Capabilities::all() - Capabilities::BUFFER_OBJECTS,
        ));
        let ctx = gl.create_context();
        gl.make_current(ctx);
        let buffer = GlBuffer::new(gl, BufferKind::Vertex);
        assert!(!buffer.create());
    }

    #[test]
    fn test_bind_rejected_from_foreign_group() {
        let gl = Arc::new(MockGl::new());
        let a = gl.create_context();
        let b = gl.create_context();

        gl.make_current(a);
        let buffer = GlBuffer::new(gl.clone(), BufferKind::Index);
        assert!(buffer.create());
        assert!(buffer.bind());

        gl.make_current(b);
        assert!(!buffer.bind());
        // Still usable back in the owning group.
        gl.make_current(a);
        assert!(buffer.bind());
    }

    #[test]
    fn test_stream_draw_downgraded_at_allocation() {
        let gl = Arc::new(MockGl::with_capabilities(
            Capabilities::all() - Capabilities::STREAM_DRAW,
        ));
        let ctx = gl.create_context();
        gl.make_current(ctx);

        let buffer = GlBuffer::new(gl.clone(), BufferKind::Vertex);
        buffer.set_usage_pattern(UsagePattern::StreamDraw);
        // The request stays observable; only the server sees the downgrade.
        assert_eq!(buffer.usage_pattern(), UsagePattern::StreamDraw);

        assert!(buffer.create());
        assert!(buffer.bind());
        buffer.write(&[1, 2]);
        let allocation = gl
            .take_calls()
            .into_iter()
            .find_map(|call| match call {
                GlCall::BufferData { usage, .. } => Some(usage),
                _ => None,
            })
            .unwrap();
        assert_eq!(allocation, UsagePattern::StaticDraw);
    }

    #[test]
    fn test_readback_gating() {
        let gl = Arc::new(MockGl::new());
        let ctx = gl.create_context();
        gl.make_current(ctx);

        let buffer = GlBuffer::new(gl.clone(), BufferKind::PixelUnpack);
        assert!(buffer.create());
        assert!(buffer.bind());
        buffer.write(&[1, 2, 3]);

        // Pixel unpack is write-only.
        let mut out = [0u8; 3];
        assert!(!buffer.read_at(0, &mut out));
    }

    #[test]
    fn test_destroy_from_foreign_context_restores_current() {
        let gl = Arc::new(MockGl::new());
        let a = gl.create_context();
        let b = gl.create_context();

        gl.make_current(a);
        let buffer = GlBuffer::new(gl.clone(), BufferKind::Vertex);
        assert!(buffer.create());
        let handle = buffer.buffer_id().unwrap();

        gl.make_current(b);
        gl.take_calls();
        buffer.destroy();
        assert!(!buffer.is_created());
        assert_eq!(
            gl.take_calls(),
            vec![
                GlCall::MakeCurrent(a),
                GlCall::DeleteBuffer(handle),
                GlCall::MakeCurrent(b),
            ]
        );
        assert_eq!(gl.current_context(), Some(b));
    }

    #[test]
    fn test_drop_deletes_handle() {
        let gl = Arc::new(MockGl::new());
        let ctx = gl.create_context();
        gl.make_current(ctx);

        let buffer = GlBuffer::new(gl.clone(), BufferKind::Vertex);
        assert!(buffer.create());
        let handle = buffer.buffer_id().unwrap();
        let copy = buffer.clone();
        assert_eq!(buffer.ref_count(), 2);

        drop(buffer);
        assert!(!gl
            .take_calls()
            .contains(&GlCall::DeleteBuffer(handle)));
        drop(copy);
        assert!(gl.take_calls().contains(&GlCall::DeleteBuffer(handle)));
    }
}
