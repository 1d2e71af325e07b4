//! BMP files drawn into an 8 bits per pixel frame buffer.
//!
//! Parsing is done by [`tinybmp`]; this module only owns the buffer and the
//! coordinate transform between the image and the panel memory.

use std::{
    convert::Infallible,
    fs,
    path::{Path, PathBuf},
};

use embedded_graphics_core::{
    pixelcolor::{Gray8, GrayColor, Rgb888, RgbColor},
    prelude::*,
};
use tinybmp::Bmp;
use tracing::debug;

use crate::session::PanelDescriptor;

pub const WHITE: u8 = 0xff;
pub const BLACK: u8 = 0x00;

#[derive(Debug, thiserror::Error)]
pub enum BitmapError {
    #[error("cannot allocate enough memory for image buffer ({bytes} bytes)")]
    OutOfMemory { bytes: usize },
    #[error("cannot process BMP image ({}): {reason}", .path.display())]
    DecodeFailed { path: PathBuf, reason: String },
}

impl BitmapError {
    /// Stable number of the failure, for callers that report codes.
    pub fn code(&self) -> i32 {
        match self {
            Self::OutOfMemory { .. } => 2,
            Self::DecodeFailed { .. } => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirror {
    None,
    Horizontal,
    Vertical,
    Both,
}

/// Grayscale frame buffer, one byte per pixel, rows stored top to bottom in
/// panel memory order.
#[derive(Clone)]
pub struct Canvas {
    width: u16,
    height: u16,
    rotation: Rotation,
    mirror: Mirror,
    buffer: Vec<u8>,
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rotation", &self.rotation)
            .field("mirror", &self.mirror)
            .finish_non_exhaustive()
    }
}

impl Canvas {
    /// Allocates a `width * height` buffer filled with `background`.
    pub fn new(
        width: u16,
        height: u16,
        rotation: Rotation,
        mirror: Mirror,
        background: u8,
    ) -> Result<Self, BitmapError> {
        let bytes = usize::from(width) * usize::from(height);
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(bytes)
            .map_err(|_| BitmapError::OutOfMemory { bytes })?;
        buffer.resize(bytes, background);
        Ok(Self {
            width,
            height,
            rotation,
            mirror,
            buffer,
        })
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn memory_size(&self) -> Size {
        Size::new(self.width.into(), self.height.into())
    }

    fn memory_index(&self, Point { x, y }: Point) -> Option<usize> {
        let (w, h) = (i32::from(self.width), i32::from(self.height));
        let (mut mx, mut my) = match self.rotation {
            Rotation::Deg0 => (x, y),
            Rotation::Deg90 => (w - y - 1, x),
            Rotation::Deg180 => (w - x - 1, h - y - 1),
            Rotation::Deg270 => (y, h - x - 1),
        };
        if matches!(self.mirror, Mirror::Horizontal | Mirror::Both) {
            mx = w - mx - 1;
        }
        if matches!(self.mirror, Mirror::Vertical | Mirror::Both) {
            my = h - my - 1;
        }
        if mx < 0 || my < 0 || mx >= w || my >= h {
            return None;
        }
        Some(my as usize * usize::from(self.width) + mx as usize)
    }
}

impl OriginDimensions for Canvas {
    /// Drawing size, width and height swap for quarter turns.
    fn size(&self) -> Size {
        match self.rotation {
            Rotation::Deg0 | Rotation::Deg180 => self.memory_size(),
            Rotation::Deg90 | Rotation::Deg270 => {
                Size::new(self.height.into(), self.width.into())
            }
        }
    }
}

impl DrawTarget for Canvas {
    type Color = Gray8;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let size = self.size();
        for Pixel(point, color) in pixels {
            // clip against the drawing size before transforming
            if point.x < 0
                || point.y < 0
                || point.x as u32 >= size.width
                || point.y as u32 >= size.height
            {
                continue;
            }
            if let Some(index) = self.memory_index(point) {
                self.buffer[index] = color.luma();
            }
        }
        Ok(())
    }
}

/// Luma of an RGB color, BT.601 weights, rounded.
pub fn to_gray(color: Rgb888) -> Gray8 {
    let luma = (299 * u32::from(color.r())
        + 587 * u32::from(color.g())
        + 114 * u32::from(color.b())
        + 500)
        / 1000;
    Gray8::new(luma as u8)
}

/// Decodes the BMP at `path` into a panel sized, horizontally mirrored canvas
/// on a white background. Parts of the image outside the panel are dropped.
pub fn decode_bmp(panel: &PanelDescriptor, path: &Path) -> Result<Canvas, BitmapError> {
    let mut canvas = Canvas::new(
        panel.width,
        panel.height,
        Rotation::Deg0,
        Mirror::Horizontal,
        WHITE,
    )?;

    let data = fs::read(path).map_err(|e| BitmapError::DecodeFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let bmp = Bmp::<Rgb888>::from_slice(&data).map_err(|e| BitmapError::DecodeFailed {
        path: path.to_path_buf(),
        reason: format!("{e:?}"),
    })?;
    debug!(size = ?bmp.size(), "decoded BMP header");

    let pixels = bmp.pixels().map(|Pixel(point, color)| Pixel(point, to_gray(color)));
    match canvas.draw_iter(pixels) {
        Ok(()) => Ok(canvas),
        Err(never) => match never {},
    }
}
