//! CPU pixel buffers and the frame renderer boundary
//!
//! Capture sources produce and consume [`PixelBuffer`]s: plain CPU-addressable
//! pixel storage with a size in buffer coordinates, a row stride and a fourcc
//! format. The renderer that composites your scene is represented by the
//! [`FrameSource`] trait; the arbiter queries it for freeze snapshots, and
//! Output/Region sources capture from it through a [`FrameHandle`].

use std::fmt;
use std::sync::Arc;

use drm_fourcc::DrmFourcc;

use crate::utils::{Buffer, Rectangle, Size};

/// Errors raised when constructing or blitting a [`PixelBuffer`]
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// The fourcc format has no CPU representation known to this crate
    #[error("unsupported pixel format {0:?}")]
    UnsupportedFormat(DrmFourcc),
    /// Size, stride and data length do not agree
    #[error("buffer dimensions do not match the provided storage")]
    InvalidDimensions,
    /// The target buffer cannot hold the copied contents
    #[error("target buffer is too small for the copied contents")]
    TooSmall,
    /// Source and target pixel formats differ
    #[error("pixel formats of source and target buffers differ")]
    FormatMismatch,
}

/// Returns the number of bytes per pixel of the given format
///
/// Only the 32-bit-per-pixel formats commonly used for scanout are supported
/// at this boundary.
pub fn bytes_per_pixel(format: DrmFourcc) -> Option<usize> {
    match format {
        DrmFourcc::Argb8888
        | DrmFourcc::Xrgb8888
        | DrmFourcc::Abgr8888
        | DrmFourcc::Xbgr8888
        | DrmFourcc::Bgra8888
        | DrmFourcc::Bgrx8888 => Some(4),
        _ => None,
    }
}

/// A CPU pixel buffer
///
/// Rows are laid out top to bottom, `stride` bytes apart; only the first
/// `width * bytes_per_pixel` bytes of each row carry pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    size: Size<i32, Buffer>,
    stride: usize,
    format: DrmFourcc,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Create a zero-filled buffer of the given size and format
    pub fn new(size: Size<i32, Buffer>, format: DrmFourcc) -> Result<PixelBuffer, BufferError> {
        let bpp = bytes_per_pixel(format).ok_or(BufferError::UnsupportedFormat(format))?;
        if !size.w.is_positive() || !size.h.is_positive() {
            return Err(BufferError::InvalidDimensions);
        }
        let stride = size.w as usize * bpp;
        Ok(PixelBuffer {
            size,
            stride,
            format,
            data: vec![0; stride * size.h as usize],
        })
    }

    /// Create a buffer from existing pixel storage
    pub fn from_bytes(
        size: Size<i32, Buffer>,
        format: DrmFourcc,
        stride: usize,
        data: Vec<u8>,
    ) -> Result<PixelBuffer, BufferError> {
        let bpp = bytes_per_pixel(format).ok_or(BufferError::UnsupportedFormat(format))?;
        if !size.w.is_positive() || !size.h.is_positive() {
            return Err(BufferError::InvalidDimensions);
        }
        if stride < size.w as usize * bpp || data.len() < stride * size.h as usize {
            return Err(BufferError::InvalidDimensions);
        }
        Ok(PixelBuffer {
            size,
            stride,
            format,
            data,
        })
    }

    /// Size of this buffer in pixels
    pub fn size(&self) -> Size<i32, Buffer> {
        self.size
    }

    /// The area this buffer covers, located at the origin
    pub fn bounds(&self) -> Rectangle<i32, Buffer> {
        Rectangle::from_size(self.size)
    }

    /// Distance in bytes between the starts of consecutive rows
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Pixel format of this buffer
    pub fn format(&self) -> DrmFourcc {
        self.format
    }

    /// Raw pixel storage
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw pixel storage
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copy out a sub-rectangle of this buffer
    ///
    /// The rectangle is clamped to the buffer bounds; returns `None` if
    /// nothing remains after clamping.
    #[profiling::function]
    pub fn crop(&self, rect: Rectangle<i32, Buffer>) -> Option<PixelBuffer> {
        let rect = self.bounds().intersection(rect)?;
        // bpp cannot fail here, the format was validated at construction
        let bpp = bytes_per_pixel(self.format)?;

        let row_len = rect.size.w as usize * bpp;
        let mut data = Vec::with_capacity(row_len * rect.size.h as usize);
        for row in rect.loc.y..rect.loc.y + rect.size.h {
            let start = row as usize * self.stride + rect.loc.x as usize * bpp;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }

        Some(PixelBuffer {
            size: rect.size,
            stride: row_len,
            format: self.format,
            data,
        })
    }

    /// Blit the full contents of `src` into the top-left corner of this buffer
    ///
    /// The formats must match and this buffer must be at least as large as
    /// `src` in both dimensions.
    #[profiling::function]
    pub fn write_from(&mut self, src: &PixelBuffer) -> Result<(), BufferError> {
        if self.format != src.format {
            return Err(BufferError::FormatMismatch);
        }
        if self.size.w < src.size.w || self.size.h < src.size.h {
            return Err(BufferError::TooSmall);
        }
        // formats match, so both buffers share a bpp
        let bpp = bytes_per_pixel(self.format).ok_or(BufferError::UnsupportedFormat(self.format))?;

        let row_len = src.size.w as usize * bpp;
        for row in 0..src.size.h as usize {
            let from = row * src.stride;
            let to = row * self.stride;
            self.data[to..to + row_len].copy_from_slice(&src.data[from..from + row_len]);
        }
        Ok(())
    }
}

/// Access to the renderer's most recent composited frame
///
/// Implemented by the compositor on whatever hands out the last frame that
/// was presented (the render target of your scene graph, a swapchain wrapper,
/// a test double). The arbiter snapshots this frame for freeze selections,
/// and live Output/Region sources read it on every acquisition.
pub trait FrameSource: fmt::Debug + Send + Sync {
    /// The most recent composited frame, if one has been rendered yet
    fn current_frame(&self) -> Option<Arc<PixelBuffer>>;
}

/// Where Output and Region capture sources take their pixels from
#[derive(Debug, Clone)]
pub enum FrameHandle {
    /// Query the frame renderer anew on every acquisition
    Live(Arc<dyn FrameSource>),
    /// A frame snapshot taken ahead of a freeze selection; acquisitions keep
    /// returning this exact frame
    Frozen(Arc<PixelBuffer>),
}

impl FrameHandle {
    /// The frame captures through this handle should read from right now
    pub fn frame(&self) -> Option<Arc<PixelBuffer>> {
        match self {
            FrameHandle::Live(source) => source.current_frame(),
            FrameHandle::Frozen(frame) => Some(frame.clone()),
        }
    }
}

impl PartialEq for FrameHandle {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FrameHandle::Live(a), FrameHandle::Live(b)) => {
                // compare the data pointers, the vtables are irrelevant
                std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
            }
            (FrameHandle::Frozen(a), FrameHandle::Frozen(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
