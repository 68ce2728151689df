//! Buffer object kinds, usage hints and map access modes.

use crate::backend::Capabilities;

/// The server-side binding target of a buffer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferKind {
    /// Vertex attribute data.
    #[default]
    Vertex,
    /// Element indices for indexed draws.
    Index,
    /// Pixel readback staging (server to client).
    PixelPack,
    /// Pixel upload staging (client to server).
    PixelUnpack,
}

impl BufferKind {
    /// Returns true if this kind supports server-to-client readback.
    pub fn supports_readback(self) -> bool {
        !matches!(self, Self::PixelUnpack)
    }
}

/// Usage hint passed to the server when buffer storage is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UsagePattern {
    /// Set once, drawn a few times.
    StreamDraw,
    /// Set once, read back a few times.
    StreamRead,
    /// Set once, copied a few times.
    StreamCopy,
    /// Set once, drawn many times.
    #[default]
    StaticDraw,
    /// Set once, read back many times.
    StaticRead,
    /// Set once, copied many times.
    StaticCopy,
    /// Modified repeatedly, drawn many times.
    DynamicDraw,
    /// Modified repeatedly, read back many times.
    DynamicRead,
    /// Modified repeatedly, copied many times.
    DynamicCopy,
}

impl UsagePattern {
    /// Downgrade this hint to the nearest one the driver supports.
    ///
    /// Drivers without stream buffers treat `StreamDraw` as `StaticDraw`;
    /// the requested value stays observable on the logical buffer.
    pub fn supported_by(self, caps: Capabilities) -> Self {
        match self {
            Self::StreamDraw if !caps.contains(Capabilities::STREAM_DRAW) => Self::StaticDraw,
            other => other,
        }
    }
}

/// Access mode for [`GlBuffer::map`](crate::GlBuffer::map).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapAccess {
    /// The mapping will only be read.
    ReadOnly,
    /// The mapping will only be written.
    WriteOnly,
    /// The mapping will be read and written.
    ReadWrite,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_draw_downgrade() {
        let caps = Capabilities::all() - Capabilities::STREAM_DRAW;
        assert_eq!(
            UsagePattern::StreamDraw.supported_by(caps),
            UsagePattern::StaticDraw
        );
        assert_eq!(
            UsagePattern::DynamicDraw.supported_by(caps),
            UsagePattern::DynamicDraw
        );
        assert_eq!(
            UsagePattern::StreamDraw.supported_by(Capabilities::all()),
            UsagePattern::StreamDraw
        );
    }

    #[test]
    fn test_readback_kinds() {
        assert!(BufferKind::Vertex.supports_readback());
        assert!(BufferKind::PixelPack.supports_readback());
        assert!(!BufferKind::PixelUnpack.supports_readback());
    }
}
