//! Capture sources
//!
//! A capture source is the concrete thing a resolved capture context points
//! at: a whole output, a window, a bare surface, or an arbitrary region of
//! the composited scene. All four variants expose the same small contract
//! (a type tag, a capture rectangle in global space, and two ways to get at
//! the pixels), so the arbitration logic never cares what is being captured.
//!
//! Where the pixels come from differs per variant. Output and region sources
//! read the composited frame through a [`FrameHandle`] (live renderer or a
//! frozen snapshot); window and surface sources read the entity's own buffer,
//! independent of the rest of the scene.

use std::sync::Arc;

use crate::buffer::{BufferError, FrameHandle, PixelBuffer};
use crate::output::Output;
use crate::surface::{Surface, Window};
use crate::utils::{IsAlive, Logical, Rectangle};

bitflags::bitflags! {
    /// Kinds of capture sources
    ///
    /// A concrete source always carries exactly one bit; unions of bits form
    /// the hint set a client is willing to accept.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct CaptureSourceType: u32 {
        /// A whole display output
        const OUTPUT = 0x1;
        /// A mapped toplevel window
        const WINDOW = 0x2;
        /// An arbitrary rectangle of the global space
        const REGION = 0x4;
        /// A bare client surface
        const SURFACE = 0x8;
    }
}

/// Errors raised by buffer operations on a capture source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The entity backing this source has been destroyed, or it has no
    /// pixels yet. Terminal for the in-flight copy; a retry will not help.
    #[error("the entity backing this capture source is gone")]
    Unavailable,
    /// The client-supplied buffer cannot hold the captured contents
    #[error("target buffer does not satisfy the capture constraints")]
    BufferConstraints(#[source] BufferError),
}

/// A whole-output capture source
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSource {
    output: Output,
    frames: FrameHandle,
}

impl OutputSource {
    /// Create a source capturing the given output's part of the composited
    /// frame
    pub fn new(output: Output, frames: FrameHandle) -> OutputSource {
        OutputSource { output, frames }
    }

    /// The output backing this source
    pub fn output(&self) -> &Output {
        &self.output
    }

    fn capture_region(&self) -> Rectangle<i32, Logical> {
        self.output.geometry()
    }

    fn acquire_buffer(&self) -> Result<Arc<PixelBuffer>, SourceError> {
        if !self.output.alive() {
            return Err(SourceError::Unavailable);
        }
        let frame = self.frames.frame().ok_or(SourceError::Unavailable)?;
        frame
            .crop(self.capture_region().to_buffer(1))
            .map(Arc::new)
            .ok_or(SourceError::Unavailable)
    }
}

/// A capture source for an arbitrary rectangle of the composited scene
///
/// Owns no buffer of its own; every acquisition is a cropped view of the
/// render target's most recent frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSource {
    frames: FrameHandle,
    region: Rectangle<i32, Logical>,
}

impl RegionSource {
    /// Create a source capturing the given rectangle of the composited frame
    pub fn new(frames: FrameHandle, region: Rectangle<i32, Logical>) -> RegionSource {
        RegionSource { frames, region }
    }

    fn capture_region(&self) -> Rectangle<i32, Logical> {
        self.region
    }

    fn acquire_buffer(&self) -> Result<Arc<PixelBuffer>, SourceError> {
        let frame = self.frames.frame().ok_or(SourceError::Unavailable)?;
        // clamp to what the renderer actually covers
        frame
            .crop(self.region.to_buffer(1))
            .map(Arc::new)
            .ok_or(SourceError::Unavailable)
    }
}

/// A capture source for a single mapped window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSource {
    window: Window,
}

impl WindowSource {
    /// Create a source capturing the given window's own buffer
    pub fn new(window: Window) -> WindowSource {
        WindowSource { window }
    }

    /// The window backing this source
    pub fn window(&self) -> &Window {
        &self.window
    }

    fn acquire_buffer(&self) -> Result<Arc<PixelBuffer>, SourceError> {
        if !self.window.alive() {
            return Err(SourceError::Unavailable);
        }
        self.window
            .surface()
            .current_buffer()
            .ok_or(SourceError::Unavailable)
    }
}

/// A capture source for a bare client surface
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSource {
    surface: Surface,
}

impl SurfaceSource {
    /// Create a source capturing the given surface's own buffer
    pub fn new(surface: Surface) -> SurfaceSource {
        SurfaceSource { surface }
    }

    /// The surface backing this source
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    fn acquire_buffer(&self) -> Result<Arc<PixelBuffer>, SourceError> {
        if !self.surface.alive() {
            return Err(SourceError::Unavailable);
        }
        self.surface.current_buffer().ok_or(SourceError::Unavailable)
    }
}

/// The concrete thing a capture context is bound to
///
/// A flat sum over the four capturable kinds. Equality is identity of the
/// backing entity (plus the rectangle, for regions), which is what makes
/// re-binding the same source to a context detectable.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureSource {
    /// A whole display output
    Output(OutputSource),
    /// A mapped toplevel window
    Window(WindowSource),
    /// An arbitrary rectangle of the composited scene
    Region(RegionSource),
    /// A bare client surface
    Surface(SurfaceSource),
}

impl CaptureSource {
    /// The type tag of this source
    pub fn source_type(&self) -> CaptureSourceType {
        match self {
            CaptureSource::Output(_) => CaptureSourceType::OUTPUT,
            CaptureSource::Window(_) => CaptureSourceType::WINDOW,
            CaptureSource::Region(_) => CaptureSourceType::REGION,
            CaptureSource::Surface(_) => CaptureSourceType::SURFACE,
        }
    }

    /// The rectangle this source occupies in the global space
    pub fn capture_region(&self) -> Rectangle<i32, Logical> {
        match self {
            CaptureSource::Output(source) => source.capture_region(),
            CaptureSource::Window(source) => source.window.geometry(),
            CaptureSource::Region(source) => source.capture_region(),
            CaptureSource::Surface(source) => source.surface.geometry(),
        }
    }

    /// The most current pixel buffer representing this source
    ///
    /// Output and region sources return a crop of the composited frame their
    /// [`FrameHandle`] points at; window and surface sources return the
    /// entity's own buffer.
    pub fn acquire_buffer(&self) -> Result<Arc<PixelBuffer>, SourceError> {
        match self {
            CaptureSource::Output(source) => source.acquire_buffer(),
            CaptureSource::Window(source) => source.acquire_buffer(),
            CaptureSource::Region(source) => source.acquire_buffer(),
            CaptureSource::Surface(source) => source.acquire_buffer(),
        }
    }

    /// Render the current contents of this source into a client-supplied
    /// buffer
    #[profiling::function]
    pub fn copy_into(&self, target: &mut PixelBuffer) -> Result<(), SourceError> {
        let buffer = self.acquire_buffer()?;
        target.write_from(&buffer).map_err(SourceError::BufferConstraints)
    }
}

impl IsAlive for CaptureSource {
    fn alive(&self) -> bool {
        match self {
            CaptureSource::Output(source) => source.output.alive(),
            CaptureSource::Window(source) => source.window.alive(),
            // a region lives as long as something still renders frames for it
            CaptureSource::Region(source) => source.frames.frame().is_some(),
            CaptureSource::Surface(source) => source.surface.alive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FrameSource;
    use drm_fourcc::DrmFourcc;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct StubFrames(Mutex<Option<Arc<PixelBuffer>>>);

    impl StubFrames {
        fn with_frame(frame: PixelBuffer) -> Arc<Self> {
            Arc::new(StubFrames(Mutex::new(Some(Arc::new(frame)))))
        }

        fn render(&self, frame: PixelBuffer) {
            *self.0.lock().unwrap() = Some(Arc::new(frame));
        }
    }

    impl FrameSource for StubFrames {
        fn current_frame(&self) -> Option<Arc<PixelBuffer>> {
            self.0.lock().unwrap().clone()
        }
    }

    fn solid(size: (i32, i32), byte: u8) -> PixelBuffer {
        let mut buffer = PixelBuffer::new(size.into(), DrmFourcc::Argb8888).unwrap();
        buffer.bytes_mut().fill(byte);
        buffer
    }

    #[test]
    fn region_source_crops_the_frame() {
        let frames = StubFrames::with_frame(solid((64, 64), 0xaa));
        let source = CaptureSource::Region(RegionSource::new(
            FrameHandle::Live(frames),
            Rectangle::from(((8, 8), (16, 16))),
        ));

        assert_eq!(source.source_type(), CaptureSourceType::REGION);
        let buffer = source.acquire_buffer().unwrap();
        assert_eq!(buffer.size(), (16, 16).into());
        assert!(buffer.bytes().iter().all(|b| *b == 0xaa));
    }

    #[test]
    fn region_source_without_frame_is_unavailable() {
        let frames: Arc<StubFrames> = Arc::default();
        let source = CaptureSource::Region(RegionSource::new(
            FrameHandle::Live(frames),
            Rectangle::from(((0, 0), (16, 16))),
        ));
        assert!(matches!(source.acquire_buffer(), Err(SourceError::Unavailable)));
    }

    #[test]
    fn live_output_source_sees_new_frames() {
        let frames = StubFrames::with_frame(solid((32, 32), 0x11));
        let output = Output::new(
            "eDP-1".into(),
            "Test display".into(),
            Rectangle::from(((0, 0), (32, 32))),
        );
        let source = CaptureSource::Output(OutputSource::new(output, FrameHandle::Live(frames.clone())));

        assert!(source.acquire_buffer().unwrap().bytes().iter().all(|b| *b == 0x11));
        frames.render(solid((32, 32), 0x22));
        assert!(source.acquire_buffer().unwrap().bytes().iter().all(|b| *b == 0x22));
    }

    #[test]
    fn frozen_output_source_ignores_new_frames() {
        let frames = StubFrames::with_frame(solid((32, 32), 0x11));
        let snapshot = frames.current_frame().unwrap();
        let output = Output::new(
            "eDP-1".into(),
            "Test display".into(),
            Rectangle::from(((0, 0), (32, 32))),
        );
        let source = CaptureSource::Output(OutputSource::new(output, FrameHandle::Frozen(snapshot)));

        frames.render(solid((32, 32), 0x22));
        assert!(source.acquire_buffer().unwrap().bytes().iter().all(|b| *b == 0x11));
    }

    #[test]
    fn destroyed_output_fails_acquisition() {
        let frames = StubFrames::with_frame(solid((32, 32), 0x11));
        let output = Output::new(
            "eDP-1".into(),
            "Test display".into(),
            Rectangle::from(((0, 0), (32, 32))),
        );
        let source = CaptureSource::Output(OutputSource::new(output.clone(), FrameHandle::Live(frames)));

        output.destroy();
        assert!(matches!(source.acquire_buffer(), Err(SourceError::Unavailable)));
        assert!(!source.alive());
    }

    #[test]
    fn window_source_returns_the_window_buffer() {
        let surface = Surface::new(Rectangle::from(((100, 50), (16, 16))));
        surface.attach_buffer(Arc::new(solid((16, 16), 0x42)));
        let window = Window::new(surface, "editor");
        let source = CaptureSource::Window(WindowSource::new(window));

        assert_eq!(source.capture_region(), Rectangle::from(((100, 50), (16, 16))));
        assert!(source.acquire_buffer().unwrap().bytes().iter().all(|b| *b == 0x42));
    }

    #[test]
    fn destroyed_surface_fails_copy() {
        let surface = Surface::new(Rectangle::from(((0, 0), (16, 16))));
        surface.attach_buffer(Arc::new(solid((16, 16), 0x42)));
        let source = CaptureSource::Surface(SurfaceSource::new(surface.clone()));

        surface.destroy();
        let mut target = solid((16, 16), 0);
        assert!(matches!(source.copy_into(&mut target), Err(SourceError::Unavailable)));
    }

    #[test]
    fn copy_into_validates_the_target() {
        let frames = StubFrames::with_frame(solid((32, 32), 0x11));
        let source = CaptureSource::Region(RegionSource::new(
            FrameHandle::Live(frames),
            Rectangle::from(((0, 0), (32, 32))),
        ));

        let mut small = solid((8, 8), 0);
        assert!(matches!(
            source.copy_into(&mut small),
            Err(SourceError::BufferConstraints(BufferError::TooSmall))
        ));

        let mut target = solid((32, 32), 0);
        source.copy_into(&mut target).unwrap();
        assert!(target.bytes().iter().all(|b| *b == 0x11));
    }
}
