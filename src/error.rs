//! Error types.

use std::path::PathBuf;

/// Errors produced while ingesting a DDS container.
///
/// These never escape [`Texture2d::set_dds_image`](crate::Texture2d::set_dds_image),
/// which reports them on the warning channel and returns `false`; they
/// are public so [`DdsImage::parse`](crate::dds::DdsImage::parse) can be
/// used directly.
#[derive(Debug, thiserror::Error)]
pub enum DdsError {
    /// The file could not be read.
    #[error("could not read {path}: {source}")]
    Read {
        /// Path that failed to open or read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The buffer does not start with the `"DDS "` tag.
    #[error("not a DDS image")]
    BadMagic,
    /// The buffer ends before the fixed-size header does.
    #[error("DDS header truncated")]
    ShortHeader,
    /// The header declares a zero linear size or zero mip levels.
    #[error("DDS image size or mip-map count is zero")]
    EmptyImage,
    /// The four-CC code is not a supported block-compression variant.
    #[error("unsupported DDS compression format {0:#010x}")]
    UnsupportedFormat(u32),
    /// The pixel payload is shorter than the header promises.
    #[error("DDS payload truncated: expected {expected} bytes, found {actual}")]
    TruncatedPayload {
        /// Bytes the header implies.
        expected: usize,
        /// Bytes actually present after the header.
        actual: usize,
    },
}
