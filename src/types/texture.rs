//! Sampling parameter types for 2D textures.

use crate::backend::Capabilities;

/// Texture filtering mode.
///
/// The mipmap variants are only meaningful as minification filters;
/// magnification filters must be [`Nearest`](Self::Nearest) or
/// [`Linear`](Self::Linear).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    /// Nearest neighbor filtering.
    Nearest,
    /// Linear filtering.
    Linear,
    /// Nearest within a mip level, nearest between levels.
    NearestMipmapNearest,
    /// Nearest within a mip level, linear between levels.
    NearestMipmapLinear,
    /// Linear within a mip level, nearest between levels.
    LinearMipmapNearest,
    /// Linear within a mip level, linear between levels.
    LinearMipmapLinear,
}

impl TextureFilter {
    /// Returns true if this filter samples between mip levels.
    pub fn uses_mipmaps(self) -> bool {
        !matches!(self, Self::Nearest | Self::Linear)
    }

    /// The non-mipmap filter closest to this one.
    ///
    /// Used as the fallback when mipmap generation is disabled or the
    /// driver cannot generate mipmaps.
    pub fn without_mipmaps(self) -> Self {
        match self {
            Self::NearestMipmapNearest | Self::NearestMipmapLinear => Self::Nearest,
            Self::LinearMipmapNearest | Self::LinearMipmapLinear => Self::Linear,
            other => other,
        }
    }
}

/// Texture coordinate wrapping mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    /// Repeat the texture.
    #[default]
    Repeat,
    /// Clamp to the edge texel.
    ClampToEdge,
    /// Clamp to the border color.
    ClampToBorder,
    /// Repeat with every other tile mirrored.
    MirroredRepeat,
}

impl WrapMode {
    /// Downgrade this mode to the nearest one the driver supports.
    pub fn supported_by(self, caps: Capabilities) -> Self {
        match self {
            Self::MirroredRepeat if !caps.contains(Capabilities::MIRRORED_REPEAT) => Self::Repeat,
            Self::ClampToBorder if !caps.contains(Capabilities::CLAMP_TO_BORDER) => {
                Self::ClampToEdge
            }
            other => other,
        }
    }
}

/// The full set of sampling parameters applied to a texture handle.
///
/// Applied in a single server call so callers (and tests) can observe
/// exactly one parameter update per stale generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureParameters {
    /// Minification filter, already downgraded if mipmaps are unavailable.
    pub minify_filter: TextureFilter,
    /// Magnification filter.
    pub magnify_filter: TextureFilter,
    /// Wrap mode for the S (horizontal) coordinate.
    pub horizontal_wrap: WrapMode,
    /// Wrap mode for the T (vertical) coordinate.
    pub vertical_wrap: WrapMode,
    /// Whether the server should generate mipmaps on upload.
    pub generate_mipmap: bool,
}
