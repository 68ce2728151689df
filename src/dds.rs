//! DDS container ingestion.
//!
//! A DDS file is a 4-byte `"DDS "` tag, a fixed-size little-endian
//! header, and a concatenation of block-compressed mip levels. Only the
//! S3TC variants DXT1, DXT3 and DXT5 are accepted; everything else is
//! rejected at parse time so the upload path never sees a format it
//! cannot name to the server.

use bytemuck::{Pod, Zeroable};

use crate::error::DdsError;

const MAGIC: &[u8; 4] = b"DDS ";

const FOURCC_DXT1: u32 = 0x3154_5844;
const FOURCC_DXT3: u32 = 0x3354_5844;
const FOURCC_DXT5: u32 = 0x3554_5844;

/// Block-compression variant of a DDS payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionFormat {
    /// 8 bytes per 4x4 block, 1-bit alpha.
    Dxt1,
    /// 16 bytes per 4x4 block, explicit alpha.
    Dxt3,
    /// 16 bytes per 4x4 block, interpolated alpha.
    Dxt5,
}

impl CompressionFormat {
    fn from_four_cc(four_cc: u32) -> Option<Self> {
        match four_cc {
            FOURCC_DXT1 => Some(Self::Dxt1),
            FOURCC_DXT3 => Some(Self::Dxt3),
            FOURCC_DXT5 => Some(Self::Dxt5),
            _ => None,
        }
    }

    /// Bytes per 4x4 block.
    pub fn block_size(self) -> usize {
        match self {
            Self::Dxt1 => 8,
            Self::Dxt3 | Self::Dxt5 => 16,
        }
    }

    /// Payload size factor relative to the header's linear size when
    /// more than one mip level is present.
    fn payload_factor(self) -> usize {
        match self {
            Self::Dxt1 => 2,
            Self::Dxt3 | Self::Dxt5 => 4,
        }
    }
}

/// The fixed-size header fields this cache consumes, in file order.
///
/// All fields are little-endian u32. Reserved runs are kept so the
/// four-CC lands at its file offset; the real container header is
/// longer, which is why the payload offset comes from `size` rather
/// than from this struct's size.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RawHeader {
    size: u32,
    flags: u32,
    height: u32,
    width: u32,
    linear_size: u32,
    _depth: u32,
    mip_map_count: u32,
    _reserved1: [u32; 11],
    _pf_size: u32,
    _pf_flags: u32,
    four_cc: u32,
    _pf_reserved: [u32; 5],
}

const HEADER_BYTES: usize = std::mem::size_of::<RawHeader>();

/// A parsed, validated block-compressed image.
///
/// Owns the pixel payload; the client image it replaces is freed by the
/// caller. Uploading iterates [`mip_levels`](Self::mip_levels).
#[derive(Debug, Clone)]
pub struct DdsImage {
    width: u32,
    height: u32,
    mip_count: u32,
    format: CompressionFormat,
    data: Vec<u8>,
}

impl DdsImage {
    /// Parse a DDS byte buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self, DdsError> {
        if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
            return Err(DdsError::BadMagic);
        }
        let header_end = MAGIC.len() + HEADER_BYTES;
        if bytes.len() < header_end {
            return Err(DdsError::ShortHeader);
        }
        let raw: RawHeader = bytemuck::pod_read_unaligned(&bytes[MAGIC.len()..header_end]);

        let header_size = u32::from_le(raw.size);
        let width = u32::from_le(raw.width);
        let height = u32::from_le(raw.height);
        let linear_size = u32::from_le(raw.linear_size);
        let mip_count = u32::from_le(raw.mip_map_count);
        let four_cc = u32::from_le(raw.four_cc);

        if linear_size == 0 || mip_count == 0 {
            return Err(DdsError::EmptyImage);
        }
        let format =
            CompressionFormat::from_four_cc(four_cc).ok_or(DdsError::UnsupportedFormat(four_cc))?;

        let expected = if mip_count > 1 {
            linear_size as usize * format.payload_factor()
        } else {
            linear_size as usize
        };
        let payload_start = MAGIC.len() + header_size as usize;
        let available = bytes.len().saturating_sub(payload_start);
        if available < expected {
            return Err(DdsError::TruncatedPayload {
                expected,
                actual: available,
            });
        }

        Ok(Self {
            width,
            height,
            mip_count,
            format,
            data: bytes[payload_start..payload_start + expected].to_vec(),
        })
    }

    /// Width of the largest mip level.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of the largest mip level.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of mip levels in the payload.
    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }

    /// Block-compression variant of the payload.
    pub fn format(&self) -> CompressionFormat {
        self.format
    }

    /// The raw pixel payload, all mip levels concatenated.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Iterate the mip levels in upload order.
    ///
    /// Dimensions halve per level (floor, minimum 1x1); each level spans
    /// `ceil(w/4) * ceil(h/4) * block_size` payload bytes. Iteration
    /// stops early if the payload runs out.
    pub fn mip_levels(&self) -> MipLevels<'_> {
        MipLevels {
            data: &self.data,
            offset: 0,
            width: self.width,
            height: self.height,
            block_size: self.format.block_size(),
            level: 0,
            count: self.mip_count,
        }
    }
}

/// One block-compressed mip level.
#[derive(Debug, Clone, Copy)]
pub struct MipLevel<'a> {
    /// Mip level index, 0 is the largest.
    pub level: u32,
    /// Level width in texels.
    pub width: u32,
    /// Level height in texels.
    pub height: u32,
    /// The level's slice of the payload.
    pub data: &'a [u8],
}

/// Iterator over the mip levels of a [`DdsImage`].
pub struct MipLevels<'a> {
    data: &'a [u8],
    offset: usize,
    width: u32,
    height: u32,
    block_size: usize,
    level: u32,
    count: u32,
}

impl<'a> Iterator for MipLevels<'a> {
    type Item = MipLevel<'a>;

    fn next(&mut self) -> Option<MipLevel<'a>> {
        if self.level >= self.count {
            return None;
        }
        let width = self.width.max(1);
        let height = self.height.max(1);
        let len =
            (width as usize).div_ceil(4) * (height as usize).div_ceil(4) * self.block_size;
        let end = self.offset.checked_add(len)?;
        if end > self.data.len() {
            return None;
        }
        let item = MipLevel {
            level: self.level,
            width,
            height,
            data: &self.data[self.offset..end],
        };
        self.offset = end;
        self.width = width / 2;
        self.height = height / 2;
        self.level += 1;
        Some(item)
    }
}
