//! The packed 4 bits per pixel image file.
//!
//! ```text
//! offset  size  content
//! 0       2     width, little endian
//! 2       2     height, little endian
//! 4       w*h/2 pixels, two per byte
//! ```
//!
//! A file holding only the header is valid and means "nothing to draw".

use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::session::Area;

pub const HEADER_SIZE: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub width: u16,
    pub height: u16,
}

/// Reads the two little endian dimension fields.
pub fn parse_header(bytes: [u8; 4]) -> Header {
    Header {
        width: u16::from_le_bytes([bytes[0], bytes[1]]),
        height: u16::from_le_bytes([bytes[2], bytes[3]]),
    }
}

impl Header {
    pub fn to_bytes(self) -> [u8; 4] {
        let [w0, w1] = self.width.to_le_bytes();
        let [h0, h1] = self.height.to_le_bytes();
        [w0, w1, h0, h1]
    }

    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Both dimensions at the maximum are reserved.
    fn is_unrepresentable(self) -> bool {
        self.width == u16::MAX && self.height == u16::MAX
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Packed4bppError {
    #[error("unable to get file status ({}): {source}", .path.display())]
    StatFailed { path: PathBuf, source: io::Error },
    #[error(
        "file size is smaller than the minimum size of a 4bpp image ({}: {size} bytes, header is {} bytes)",
        .path.display(),
        HEADER_SIZE
    )]
    TooSmall { path: PathBuf, size: u64 },
    #[error("cannot open file ({}): {source}", .path.display())]
    OpenFailed { path: PathBuf, source: io::Error },
    #[error("invalid 4bpp image file, header unreadable ({}): {source}", .path.display())]
    HeaderReadFailed { path: PathBuf, source: io::Error },
    #[error(
        "image resolution {width}x{height} is higher than the maximum allowed (65534x65535 or 65535x65534) ({})",
        .path.display()
    )]
    ResolutionTooHigh {
        path: PathBuf,
        width: u16,
        height: u16,
    },
    #[error(
        "the number of pixels in this 4bpp image is odd ({width}x{height}), it must be even ({})",
        .path.display()
    )]
    OddPixelCount {
        path: PathBuf,
        width: u16,
        height: u16,
    },
    #[error(
        "invalid 4bpp image file ({}): {width}x{height} needs {expected} bytes, file has {actual}",
        .path.display()
    )]
    SizeMismatch {
        path: PathBuf,
        width: u16,
        height: u16,
        expected: u64,
        actual: u64,
    },
    #[error("cannot allocate enough memory for 4bpp image data ({bytes} bytes)")]
    OutOfMemory { bytes: u64 },
    #[error("failed to read 4bpp image data ({}): {source}", .path.display())]
    PayloadReadFailed { path: PathBuf, source: io::Error },
}

impl Packed4bppError {
    /// Stable number of the failure, for callers that report codes.
    pub fn code(&self) -> i32 {
        match self {
            Self::StatFailed { .. } => 2,
            Self::TooSmall { .. } => 3,
            Self::OpenFailed { .. } => 4,
            Self::HeaderReadFailed { .. } => 5,
            Self::ResolutionTooHigh { .. } => 6,
            Self::OddPixelCount { .. } => 7,
            Self::SizeMismatch { .. } => 8,
            Self::OutOfMemory { .. } => 9,
            Self::PayloadReadFailed { .. } => 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packed4bppImage {
    header: Header,
    data: Vec<u8>,
}

impl Packed4bppImage {
    /// `None` when `data` does not hold exactly `width * height / 2` bytes
    /// or the pixel count is odd.
    pub fn from_parts(width: u16, height: u16, data: Vec<u8>) -> Option<Self> {
        let header = Header { width, height };
        let pixels = header.pixel_count();
        if pixels % 2 != 0 || data.len() as u64 != pixels / 2 {
            return None;
        }
        Some(Self { header, data })
    }

    pub fn width(&self) -> u16 {
        self.header.width
    }

    pub fn height(&self) -> u16 {
        self.header.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The area the image covers when drawn at the panel origin.
    pub fn area(&self) -> Area {
        Area::new(0, 0, self.header.width, self.header.height)
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.header.to_bytes())?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE as usize + self.data.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

/// Result of a successful decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded4bpp {
    /// Header only, the panel should be cleared.
    Empty,
    Image(Packed4bppImage),
}

/// Checks `header` against the on-disk `file_size` and returns the payload
/// length. Checks run in a fixed order, the first violation wins.
pub fn validate(path: &Path, header: Header, file_size: u64) -> Result<u64, Packed4bppError> {
    let Header { width, height } = header;
    if header.is_unrepresentable() {
        return Err(Packed4bppError::ResolutionTooHigh {
            path: path.to_path_buf(),
            width,
            height,
        });
    }
    if header.pixel_count() % 2 != 0 {
        return Err(Packed4bppError::OddPixelCount {
            path: path.to_path_buf(),
            width,
            height,
        });
    }

    let expected = header.pixel_count() / 2;
    if width == 0 || height == 0 || file_size != HEADER_SIZE + expected {
        return Err(Packed4bppError::SizeMismatch {
            path: path.to_path_buf(),
            width,
            height,
            expected: HEADER_SIZE + expected,
            actual: file_size,
        });
    }
    Ok(expected)
}

/// Reads and validates a packed 4bpp file.
///
/// The file handle and any partially filled buffer are dropped on every
/// early return.
pub fn decode_4bpp(path: &Path) -> Result<Decoded4bpp, Packed4bppError> {
    let file_size = fs::metadata(path)
        .map_err(|source| Packed4bppError::StatFailed {
            path: path.to_path_buf(),
            source,
        })?
        .len();

    if file_size < HEADER_SIZE {
        return Err(Packed4bppError::TooSmall {
            path: path.to_path_buf(),
            size: file_size,
        });
    }
    if file_size == HEADER_SIZE {
        debug!(path = %path.display(), "4bpp file carries no image data");
        return Ok(Decoded4bpp::Empty);
    }

    let mut file = File::open(path).map_err(|source| Packed4bppError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;

    let mut raw = [0u8; HEADER_SIZE as usize];
    file.read_exact(&mut raw)
        .map_err(|source| Packed4bppError::HeaderReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
    let header = parse_header(raw);
    debug!(width = header.width, height = header.height, file_size, "4bpp header");

    let payload_len = validate(path, header, file_size)?;
    let len = usize::try_from(payload_len)
        .map_err(|_| Packed4bppError::OutOfMemory { bytes: payload_len })?;

    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| Packed4bppError::OutOfMemory { bytes: payload_len })?;
    data.resize(len, 0);
    file.read_exact(&mut data)
        .map_err(|source| Packed4bppError::PayloadReadFailed {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(Decoded4bpp::Image(Packed4bppImage { header, data }))
}
