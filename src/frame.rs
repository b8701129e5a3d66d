//! Two-plane monochrome frame buffers.
//!
//! The B/W/Red panel composites two 1-bit planes: "black" prints in the
//! foreground ink, "red" in the accent ink. Both planes are packed row-major,
//! eight horizontal pixels per byte with the leftmost pixel in the MSB, and a
//! set bit means *blank*. That is the layout the controller takes on its
//! black RAM, so [`Plane::as_bytes`] is the hardware payload as-is.
//!
//! Each plane is an embedded-graphics [`DrawTarget`] over [`BinaryColor`]:
//! `On` lays ink, `Off` blanks.

use embedded_graphics::{pixelcolor::BinaryColor, prelude::*};
use std::convert::Infallible;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default panel width (7.5" HD)
pub const DEFAULT_WIDTH: u32 = 880;
/// Default panel height (7.5" HD)
pub const DEFAULT_HEIGHT: u32 = 528;
/// Largest accepted width or height, for output files and PBM input alike
pub const MAX_DIMENSION: u32 = 8192;

/// Errors reading or writing frame files.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame IO on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not a binary PBM: {reason}", .path.display())]
    Format { path: PathBuf, reason: String },

    #[error("not a binary PBM: {0}")]
    Malformed(String),

    #[error("frame size {width}x{height} outside 1..={max}", max = MAX_DIMENSION)]
    Dimensions { width: u32, height: u32 },

    #[error("planes differ in size: black {black:?}, red {red:?}")]
    SizeMismatch { black: (u32, u32), red: (u32, u32) },
}

/// Reject sizes no plane should be built with.
pub fn check_dimensions(width: u32, height: u32) -> Result<(), FrameError> {
    if (1..=MAX_DIMENSION).contains(&width) && (1..=MAX_DIMENSION).contains(&height) {
        Ok(())
    } else {
        Err(FrameError::Dimensions { width, height })
    }
}

/// One 1-bit raster plane.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plane {
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl Plane {
    /// A blank plane (all bits set).
    pub fn new(width: u32, height: u32) -> Self {
        // Each row has (width+7)/8 bytes
        let bytes_per_row = width.div_ceil(8);
        let buffer_size = (bytes_per_row * height) as usize;
        Self {
            width,
            height,
            buffer: vec![0xFF; buffer_size],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn bytes_per_row(&self) -> u32 {
        self.width.div_ceil(8)
    }

    /// Packed buffer, 1 = blank.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Lay ink (`true`) or blank (`false`) at a pixel; out-of-range is ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, ink: bool) {
        if x >= self.width || y >= self.height {
            return;
        }

        let byte_index = (y * self.bytes_per_row() + x / 8) as usize;
        let bit_mask = 0x80 >> (x % 8);

        if ink {
            self.buffer[byte_index] &= !bit_mask;
        } else {
            self.buffer[byte_index] |= bit_mask;
        }
    }

    /// True when the pixel carries ink. Out-of-range pixels are blank.
    pub fn is_ink(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let byte_index = (y * self.bytes_per_row() + x / 8) as usize;
        self.buffer[byte_index] & (0x80 >> (x % 8)) == 0
    }

    /// Number of inked pixels.
    pub fn ink_count(&self) -> usize {
        let mut count = 0;
        for y in 0..self.height {
            for x in 0..self.width {
                if self.is_ink(x, y) {
                    count += 1;
                }
            }
        }
        count
    }

    /// Encode as binary PBM (P4). PBM uses 1 for black, so bits are inverted.
    pub fn to_pbm(&self) -> Vec<u8> {
        let mut out = format!("P4\n{} {}\n", self.width, self.height).into_bytes();
        out.reserve(self.buffer.len());
        let tail_bits = self.width % 8;
        let row_len = self.bytes_per_row() as usize;

        if row_len == 0 {
            return out;
        }

        for row in self.buffer.chunks(row_len) {
            for (i, byte) in row.iter().enumerate() {
                let mut inverted = !byte;
                // Padding bits past the right edge stay zero
                if i == row_len - 1 && tail_bits != 0 {
                    inverted &= 0xFFu8 << (8 - tail_bits);
                }
                out.push(inverted);
            }
        }
        out
    }

    /// Decode a binary PBM (P4).
    pub fn from_pbm(data: &[u8]) -> Result<Self, FrameError> {
        let mut pos = 0;
        let mut fields = Vec::with_capacity(3);

        while fields.len() < 3 {
            // Skip whitespace and comments between header fields
            while pos < data.len() {
                match data[pos] {
                    b'#' => {
                        while pos < data.len() && data[pos] != b'\n' {
                            pos += 1;
                        }
                    }
                    c if c.is_ascii_whitespace() => pos += 1,
                    _ => break,
                }
            }
            let start = pos;
            while pos < data.len() && !data[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if start == pos {
                return Err(FrameError::Malformed("truncated header".to_string()));
            }
            fields.push(String::from_utf8_lossy(&data[start..pos]).into_owned());
        }
        // Exactly one whitespace byte separates the header from the raster
        pos += 1;

        if fields[0] != "P4" {
            return Err(FrameError::Malformed(format!("magic {:?}, expected P4", fields[0])));
        }
        let width: u32 = fields[1]
            .parse()
            .map_err(|_| FrameError::Malformed(format!("bad width {:?}", fields[1])))?;
        let height: u32 = fields[2]
            .parse()
            .map_err(|_| FrameError::Malformed(format!("bad height {:?}", fields[2])))?;
        check_dimensions(width, height)?;

        // Size the raster before allocating for it
        let expected = width.div_ceil(8) as usize * height as usize;
        let raster = data.get(pos..).unwrap_or_default();
        if raster.len() < expected {
            return Err(FrameError::Malformed(format!(
                "raster has {} bytes, expected {}",
                raster.len(),
                expected
            )));
        }

        let mut plane = Plane::new(width, height);
        for (dst, src) in plane.buffer.iter_mut().zip(raster) {
            *dst = !src;
        }
        Ok(plane)
    }

    fn write_pbm(&self, path: &Path) -> Result<(), FrameError> {
        fs::write(path, self.to_pbm()).map_err(|source| FrameError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn read_pbm(path: &Path) -> Result<Self, FrameError> {
        let data = fs::read(path).map_err(|source| FrameError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Plane::from_pbm(&data).map_err(|err| match err {
            FrameError::Malformed(reason) => FrameError::Format {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }
}

impl OriginDimensions for Plane {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for Plane {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(Point { x, y }, color) in pixels {
            if x < 0 || y < 0 {
                continue;
            }
            self.set_pixel(x as u32, y as u32, color.is_on());
        }
        Ok(())
    }
}

/// A black plane and a red plane of equal size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub black: Plane,
    pub red: Plane,
}

impl Frame {
    /// A blank frame.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            black: Plane::new(width, height),
            red: Plane::new(width, height),
        }
    }

    pub fn from_planes(black: Plane, red: Plane) -> Result<Self, FrameError> {
        if black.size() != red.size() {
            return Err(FrameError::SizeMismatch {
                black: (black.width, black.height),
                red: (red.width, red.height),
            });
        }
        Ok(Self { black, red })
    }

    pub fn width(&self) -> u32 {
        self.black.width
    }

    pub fn height(&self) -> u32 {
        self.black.height
    }

    /// File names used for an output prefix: `<prefix>-b.pbm`, `<prefix>-r.pbm`.
    pub fn output_paths(prefix: &str) -> (PathBuf, PathBuf) {
        (
            PathBuf::from(format!("{}-b.pbm", prefix)),
            PathBuf::from(format!("{}-r.pbm", prefix)),
        )
    }

    /// Write both planes next to each other under `prefix`.
    pub fn save(&self, prefix: &str) -> Result<(PathBuf, PathBuf), FrameError> {
        let (black_path, red_path) = Self::output_paths(prefix);
        self.black.write_pbm(&black_path)?;
        self.red.write_pbm(&red_path)?;
        Ok((black_path, red_path))
    }

    /// Load a frame previously written with [`Frame::save`] (or any P4 pair).
    pub fn load(black: &Path, red: &Path) -> Result<Self, FrameError> {
        Self::from_planes(Plane::read_pbm(black)?, Plane::read_pbm(red)?)
    }
}
