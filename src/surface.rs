//! Client surfaces and windows
//!
//! Capture-facing handles for the client entities whose pixels can be taken
//! independently of the rest of the scene. A [`Surface`] owns its most recent
//! composited buffer; the compositor attaches a new buffer whenever the
//! client commits one. A [`Window`] is a mapped toplevel: a surface plus the
//! metadata a selection UI wants to display.
//!
//! Surfaces are also what selection masks refer to; contexts hold them only
//! weakly, so a destroyed mask never outlives arbitration.

use std::{
    hash::{Hash, Hasher},
    sync::{Arc, Mutex, Weak},
};

use tracing::debug;

use crate::buffer::PixelBuffer;
use crate::utils::{AliveTracker, IsAlive, Logical, Rectangle};

#[derive(Debug)]
struct Inner {
    geometry: Rectangle<i32, Logical>,
    buffer: Option<Arc<PixelBuffer>>,
}

/// A client surface, as seen by the capture machinery
#[derive(Debug, Clone)]
pub struct Surface {
    inner: Arc<(Mutex<Inner>, AliveTracker)>,
}

/// Weak variant of a [`Surface`]
#[derive(Debug, Clone)]
pub struct WeakSurface {
    inner: Weak<(Mutex<Inner>, AliveTracker)>,
}

impl Surface {
    /// Create a new surface occupying the given rectangle of the global space
    pub fn new(geometry: Rectangle<i32, Logical>) -> Surface {
        Surface {
            inner: Arc::new((
                Mutex::new(Inner {
                    geometry,
                    buffer: None,
                }),
                AliveTracker::default(),
            )),
        }
    }

    /// The rectangle this surface occupies in the global space
    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        self.inner.0.lock().unwrap().geometry
    }

    /// Update the rectangle this surface occupies in the global space
    pub fn change_geometry(&self, geometry: Rectangle<i32, Logical>) {
        self.inner.0.lock().unwrap().geometry = geometry;
    }

    /// Attach the surface's most recent composited buffer
    pub fn attach_buffer(&self, buffer: Arc<PixelBuffer>) {
        self.inner.0.lock().unwrap().buffer = Some(buffer);
    }

    /// The surface's most recent composited buffer, if any was attached yet
    pub fn current_buffer(&self) -> Option<Arc<PixelBuffer>> {
        self.inner.0.lock().unwrap().buffer.clone()
    }

    /// Mark this surface as gone
    pub fn destroy(&self) {
        debug!("Destroying surface");
        self.inner.1.destroy_notify();
    }

    /// Create a weak reference to this surface
    pub fn downgrade(&self) -> WeakSurface {
        WeakSurface {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl IsAlive for Surface {
    #[inline]
    fn alive(&self) -> bool {
        self.inner.1.alive()
    }
}

impl PartialEq for Surface {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Surface {}

impl Hash for Surface {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl WeakSurface {
    /// Try to retrieve the original [`Surface`], if it still exists
    pub fn upgrade(&self) -> Option<Surface> {
        self.inner.upgrade().map(|inner| Surface { inner })
    }
}

impl PartialEq for WeakSurface {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for WeakSurface {}

/// A mapped toplevel window
///
/// Thin wrapper around the window's primary [`Surface`] carrying the title a
/// selection UI can present. Buffer and geometry access go through the
/// surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    surface: Surface,
    title: Arc<str>,
}

impl Window {
    /// Create a new window from its primary surface and title
    pub fn new(surface: Surface, title: impl Into<Arc<str>>) -> Window {
        Window {
            surface,
            title: title.into(),
        }
    }

    /// The window title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The window's primary surface
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// The rectangle this window occupies in the global space
    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        self.surface.geometry()
    }
}

impl IsAlive for Window {
    #[inline]
    fn alive(&self) -> bool {
        self.surface.alive()
    }
}

impl Hash for Window {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.surface.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drm_fourcc::DrmFourcc;

    #[test]
    fn attached_buffer_is_returned() {
        let surface = Surface::new(Rectangle::from(((10, 10), (200, 100))));
        assert!(surface.current_buffer().is_none());

        let buffer = Arc::new(PixelBuffer::new((200, 100).into(), DrmFourcc::Argb8888).unwrap());
        surface.attach_buffer(buffer.clone());
        assert_eq!(surface.current_buffer().as_deref(), Some(&*buffer));
    }

    #[test]
    fn window_tracks_surface_liveness() {
        let surface = Surface::new(Rectangle::from(((0, 0), (640, 480))));
        let window = Window::new(surface.clone(), "terminal");
        assert!(window.alive());
        surface.destroy();
        assert!(!window.alive());
    }
}
